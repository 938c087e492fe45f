//! The entity/component [`Manager`].
//!
//! The Manager is a flat table of component storages keyed by component id
//! (not an archetype/SoA layout) so that rollback snapshots are plain value
//! copies and ascending-id iteration is trivially deterministic. It owns
//! the entity and component id counters, the system list (in declared
//! update order), and the per-frame message outbox.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::component::{ComponentId, ComponentKind, ComponentRecord, ComponentTag};
use crate::entity::{EntityAllocator, EntityId};
use crate::error::ManagerError;
use crate::hash::StateHasher;
use crate::message::{Message, Outbox};
use crate::packet::{Packet, PacketError};
use crate::system::ManagerSystem;

/// Per-system wall-clock timing for the most recent `update()` call.
/// Purely observational -- `Duration`s are never hashed or packetized, and
/// two managers with identical logical state can report different
/// timings.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Wall-clock time per system, in declared execution order.
    pub system_times: Vec<(&'static str, Duration)>,
    pub total_time: Duration,
}

pub struct Manager {
    entities: EntityAllocator,
    next_component: u32,
    components: BTreeMap<ComponentId, ComponentRecord>,
    /// Derived index, rebuilt on depacketize/copy_into; never itself
    /// iterated when producing packetize/hash output.
    entity_components: HashMap<EntityId, Vec<ComponentId>>,
    type_index: HashMap<(EntityId, ComponentTag), ComponentId>,
    systems: Vec<Box<dyn ManagerSystem>>,
    outbox: Outbox,
    last_diagnostics: FrameDiagnostics,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("components", &self.components.len())
            .field("systems", &self.systems.len())
            .finish()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self {
            entities: EntityAllocator::new(),
            next_component: 1,
            components: BTreeMap::new(),
            entity_components: HashMap::new(),
            type_index: HashMap::new(),
            systems: Vec::new(),
            outbox: Outbox::new(),
            last_diagnostics: FrameDiagnostics::default(),
        }
    }

    // -- entities --------------------------------------------------------

    pub fn add_entity(&mut self) -> EntityId {
        self.entities.allocate()
    }

    /// Removes every component with this entity id, broadcasting
    /// `EntityRemoved` before the structural removal.
    pub fn remove_entity(&mut self, entity: EntityId) {
        self.outbox.push(Message::EntityRemoved(entity));
        let owned = self.entity_components.remove(&entity).unwrap_or_default();
        for component_id in owned {
            self.remove_component_quiet(component_id);
        }
        trace!(?entity, "removed entity");
    }

    // -- components --------------------------------------------------------

    pub fn add_component(&mut self, entity: EntityId, kind: ComponentKind) -> ComponentId {
        let tag = kind.tag();
        let id = ComponentId::from_raw(self.next_component);
        self.next_component += 1;

        let record = ComponentRecord {
            id,
            entity,
            enabled: true,
            kind,
        };
        self.components.insert(id, record);
        self.entity_components.entry(entity).or_default().push(id);
        self.type_index.insert((entity, tag), id);
        self.outbox.push(Message::ComponentAdded(id));
        id
    }

    pub fn remove_component(&mut self, component_id: ComponentId) -> Result<(), ManagerError> {
        if !self.components.contains_key(&component_id) {
            return Err(ManagerError::UnknownComponent(component_id));
        }
        self.remove_component_quiet(component_id);
        self.outbox.push(Message::ComponentRemoved(component_id));
        Ok(())
    }

    /// Structural removal without a `ComponentRemoved` broadcast, used when
    /// the cascade is already covered by a preceding `EntityRemoved`.
    fn remove_component_quiet(&mut self, component_id: ComponentId) {
        if let Some(record) = self.components.remove(&component_id) {
            self.type_index.remove(&(record.entity, record.kind.tag()));
            if let Some(siblings) = self.entity_components.get_mut(&record.entity) {
                siblings.retain(|id| *id != component_id);
            }
        }
    }

    pub fn get_component(&self, entity: EntityId, tag: ComponentTag) -> Option<ComponentId> {
        self.type_index.get(&(entity, tag)).copied()
    }

    pub fn component_record(&self, id: ComponentId) -> Option<&ComponentRecord> {
        self.components.get(&id)
    }

    pub fn component_record_mut(&mut self, id: ComponentId) -> Option<&mut ComponentRecord> {
        self.components.get_mut(&id)
    }

    /// Ascending-by-id sequence of every component currently tagged `tag`.
    /// Ascending order is a determinism invariant, not an accident of
    /// storage: `components` is a `BTreeMap<ComponentId, _>`.
    pub fn components_of_type(&self, tag: ComponentTag) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.values().filter(move |r| r.kind.tag() == tag).map(|r| r.id)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // -- systems --------------------------------------------------------

    pub fn add_system(&mut self, system: Box<dyn ManagerSystem>) {
        debug_assert!(
            !self.systems.iter().any(|s| s.type_tag() == system.type_tag()),
            "duplicate system tag '{}'",
            system.type_tag()
        );
        self.systems.push(system);
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Messages queued so far this frame, without consuming them. Systems
    /// may peek at messages raised by systems that ran earlier in the same
    /// `update()` call -- delivery is synchronous within one frame.
    pub fn pending_messages(&self) -> impl Iterator<Item = &Message> {
        self.outbox.iter()
    }

    /// Runs every system's `update(frame)` in declared order, then drains
    /// and returns the messages raised this frame.
    ///
    /// Systems are taken out of `self` for the duration of the call (a
    /// `mem::take` swap) so each system can be given `&mut Manager` without
    /// aliasing itself -- the standard way to let a system borrow the
    /// container that owns it.
    pub fn update(&mut self, frame: i64) -> Vec<Message> {
        let total_start = Instant::now();
        let mut system_times = Vec::with_capacity(self.systems.len());

        let mut systems = std::mem::take(&mut self.systems);
        for system in systems.iter_mut() {
            let start = Instant::now();
            system.update(frame, self);
            system_times.push((system.type_tag(), start.elapsed()));
        }
        self.systems = systems;

        self.last_diagnostics = FrameDiagnostics {
            system_times,
            total_time: total_start.elapsed(),
        };
        self.outbox.drain()
    }

    /// Per-system timing from the most recent `update()` call.
    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.last_diagnostics
    }

    // -- packetize / depacketize / hash / copy_into ----------------------

    pub fn packetize(&self, packet: &mut Packet) {
        packet.write_i32(self.entities.next_raw() as i32);
        packet.write_i32(self.next_component as i32);

        packet.write_u32(self.systems.len() as u32);
        for system in &self.systems {
            packet.write_string(system.type_tag());
            system.packetize(packet);
        }

        packet.write_u32(self.components.len() as u32);
        for record in self.components.values() {
            record.packetize(packet);
        }
    }

    /// Clears existing component/entity state, then rebuilds it from
    /// `packet`. The registered system *list* (types and order) must
    /// already match the peer that produced this packet; only each
    /// system's internal state is replaced.
    pub fn depacketize(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
        let next_entity_raw = packet.read_i32()? as u32;
        let next_component_raw = packet.read_i32()? as u32;

        let system_count = packet.read_u32()?;
        for _ in 0..system_count {
            let tag = packet.read_string()?;
            match self.systems.iter_mut().find(|s| s.type_tag() == tag) {
                Some(system) => system.depacketize(packet)?,
                None => return Err(PacketError::UnknownTypeTag(tag)),
            }
        }

        self.components.clear();
        self.entity_components.clear();
        self.type_index.clear();

        let component_count = packet.read_u32()?;
        for i in 0..component_count {
            // Component ids carry no wire representation (see
            // `ComponentRecord::packetize`); they are re-minted
            // contiguously here, which is safe because nothing depends on
            // their absolute value, only their relative ascending order,
            // which packetize already preserved.
            let id = ComponentId::from_raw(i + 1);
            let record = ComponentRecord::depacketize(packet, id)?;
            self.entity_components.entry(record.entity).or_default().push(id);
            self.type_index.insert((record.entity, record.kind.tag()), id);
            self.components.insert(id, record);
        }

        self.entities = EntityAllocator::restore(next_entity_raw);
        self.next_component = next_component_raw;
        self.outbox = Outbox::new();
        debug!(entities = next_entity_raw, components = component_count, "manager depacketized");
        Ok(())
    }

    pub fn hash(&self, hasher: &mut StateHasher) {
        for system in &self.systems {
            hasher.write_str(system.type_tag());
            system.hash_into(hasher);
        }
        for record in self.components.values() {
            record.hash_into(hasher);
        }
    }

    /// Human-readable JSON dump of every entity's components, keyed by
    /// entity id then component type tag. Meant for offline tooling and
    /// diagnostics (e.g. dumping a trailing state to a file when a
    /// `HashCheck` mismatch is diagnosed); never consulted by `hash`,
    /// `packetize`, or any determinism-sensitive path, and carries no
    /// entity/component id counters of its own.
    pub fn debug_snapshot(&self) -> serde_json::Value {
        let mut by_entity: BTreeMap<u32, serde_json::Map<String, serde_json::Value>> = BTreeMap::new();
        for record in self.components.values() {
            let tag = record.kind.tag();
            let entry = by_entity.entry(record.entity.to_raw()).or_default();
            entry.insert(
                format!("{tag:?}"),
                serde_json::json!({
                    "component_id": record.id.to_raw(),
                    "enabled": record.enabled,
                    "payload": &record.kind,
                }),
            );
        }
        serde_json::json!({ "entities": by_entity })
    }

    /// Deep-copies this Manager's systems and components into `other`,
    /// preserving component ids and id counters. `other` must already have
    /// the same systems registered (same types, same order); only their
    /// internal state is replaced, matching `depacketize`'s contract.
    pub fn copy_into(&self, other: &mut Manager) {
        other.components.clear();
        other.entity_components.clear();
        other.type_index.clear();
        other.outbox = Outbox::new();

        for (i, system) in self.systems.iter().enumerate() {
            if let Some(slot) = other.systems.get_mut(i) {
                *slot = system.copy_into();
            }
        }

        for (id, record) in &self.components {
            other.components.insert(*id, record.clone());
            other.entity_components.entry(record.entity).or_default().push(*id);
            other.type_index.insert((record.entity, record.kind.tag()), *id);
        }

        other.entities = self.entities;
        other.next_component = self.next_component;
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
