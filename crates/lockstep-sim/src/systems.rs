//! Reference systems sufficient to exercise rollback, determinism, and
//! hashing in tests: translation, expiration, and iteration-order
//! indexing.
//!
//! None of these carry internal state; their `packetize`/`depacketize`/
//! `hash_into` are all no-ops, which is itself meaningful test coverage --
//! a system's snapshot contribution is allowed to be empty.

use lockstep_ecs::component::{ComponentKind, ComponentTag};
use lockstep_ecs::hash::StateHasher;
use lockstep_ecs::manager::Manager;
use lockstep_ecs::packet::{Packet, PacketError};
use lockstep_ecs::system::ManagerSystem;

/// Advances every entity's `Position` by its `Velocity`, once per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationSystem;

impl ManagerSystem for TranslationSystem {
    fn type_tag(&self) -> &'static str {
        "translation"
    }

    fn update(&mut self, _frame: i64, manager: &mut Manager) {
        let velocity_ids: Vec<_> = manager.components_of_type(ComponentTag::Velocity).collect();
        for velocity_id in velocity_ids {
            let Some(record) = manager.component_record(velocity_id) else { continue };
            let ComponentKind::Velocity(velocity) = &record.kind else { continue };
            let (dx, dy) = (velocity.dx, velocity.dy);
            let entity = record.entity;
            let Some(position_id) = manager.get_component(entity, ComponentTag::Position) else {
                continue;
            };
            if let Some(position_record) = manager.component_record_mut(position_id) {
                if let ComponentKind::Position(position) = &mut position_record.kind {
                    position.x += dx;
                    position.y += dy;
                }
            }
        }
    }

    fn packetize(&self, _packet: &mut Packet) {}

    fn depacketize(&mut self, _packet: &mut Packet) -> Result<(), PacketError> {
        Ok(())
    }

    fn hash_into(&self, _hasher: &mut StateHasher) {}

    fn copy_into(&self) -> Box<dyn ManagerSystem> {
        Box::new(*self)
    }
}

/// Removes any entity whose `Expiration.frame` has been reached or passed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirationSystem;

impl ManagerSystem for ExpirationSystem {
    fn type_tag(&self) -> &'static str {
        "expiration"
    }

    fn update(&mut self, frame: i64, manager: &mut Manager) {
        let expiration_ids: Vec<_> = manager.components_of_type(ComponentTag::Expiration).collect();
        let mut expired_entities = Vec::new();
        for id in expiration_ids {
            if let Some(record) = manager.component_record(id) {
                if let ComponentKind::Expiration(expiration) = &record.kind {
                    if expiration.frame <= frame {
                        expired_entities.push(record.entity);
                    }
                }
            }
        }
        for entity in expired_entities {
            manager.remove_entity(entity);
        }
    }

    fn packetize(&self, _packet: &mut Packet) {}

    fn depacketize(&mut self, _packet: &mut Packet) -> Result<(), PacketError> {
        Ok(())
    }

    fn hash_into(&self, _hasher: &mut StateHasher) {}

    fn copy_into(&self) -> Box<dyn ManagerSystem> {
        Box::new(*self)
    }
}

/// Increments every entity's `Index.value` by one each frame. Exists purely
/// to exercise a second, independently-ordered component stream in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexSystem;

impl ManagerSystem for IndexSystem {
    fn type_tag(&self) -> &'static str {
        "index"
    }

    fn update(&mut self, _frame: i64, manager: &mut Manager) {
        let index_ids: Vec<_> = manager.components_of_type(ComponentTag::Index).collect();
        for id in index_ids {
            if let Some(record) = manager.component_record_mut(id) {
                if let ComponentKind::Index(index) = &mut record.kind {
                    index.value += 1;
                }
            }
        }
    }

    fn packetize(&self, _packet: &mut Packet) {}

    fn depacketize(&mut self, _packet: &mut Packet) -> Result<(), PacketError> {
        Ok(())
    }

    fn hash_into(&self, _hasher: &mut StateHasher) {}

    fn copy_into(&self) -> Box<dyn ManagerSystem> {
        Box::new(*self)
    }
}

/// Registers the full reference system list, in the fixed order the core's
/// determinism invariants require (translation before expiration before
/// index is arbitrary but must be consistent across every peer).
pub fn register_reference_systems(manager: &mut Manager) {
    manager.add_system(Box::new(TranslationSystem));
    manager.add_system(Box::new(ExpirationSystem));
    manager.add_system(Box::new(IndexSystem));
}
