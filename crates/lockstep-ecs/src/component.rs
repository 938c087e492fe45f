//! Component types, payloads, and the packetizer registry that backs
//! `write_with_type_info`/`read_with_type_info` at the Manager boundary.
//!
//! Per the core's design notes, components are a closed tagged union
//! (explicit discriminant, static dispatch) rather than an open dynamic
//! registry; the string-tag registry below exists only to keep the wire
//! format's `write_with_type_info` contract, not as the internal dispatch
//! mechanism.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::hash::StateHasher;
use crate::packet::{Packet, PacketError, TypeRegistry};

/// Stable, monotonic-within-a-Manager component id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(u32);

impl ComponentId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

/// Discriminant for a [`ComponentKind`], used by the type index and by
/// callers asking `components_of_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentTag {
    Position,
    Velocity,
    Expiration,
    Index,
}

impl ComponentTag {
    fn wire_tag(self) -> &'static str {
        match self {
            ComponentTag::Position => "position",
            ComponentTag::Velocity => "velocity",
            ComponentTag::Expiration => "expiration",
            ComponentTag::Index => "index",
        }
    }
}

/// Reference component: a 2D position. Advanced by [`crate::system::TranslationSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Reference component: a constant-velocity vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
}

/// Reference component: the frame at which the owning entity should be
/// removed. Consumed by [`crate::system::ExpirationSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Expiration {
    pub frame: i64,
}

/// Reference component: a small per-entity counter, advanced once per
/// frame by [`crate::system::IndexSystem`]. Exists purely to exercise a
/// second, independently-ordered component stream in tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub value: i64,
}

/// Closed union of every component payload the core knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentKind {
    Position(Position),
    Velocity(Velocity),
    Expiration(Expiration),
    Index(Index),
}

impl ComponentKind {
    pub fn tag(&self) -> ComponentTag {
        match self {
            ComponentKind::Position(_) => ComponentTag::Position,
            ComponentKind::Velocity(_) => ComponentTag::Velocity,
            ComponentKind::Expiration(_) => ComponentTag::Expiration,
            ComponentKind::Index(_) => ComponentTag::Index,
        }
    }

    fn packetize_payload(&self, packet: &mut Packet) {
        match self {
            ComponentKind::Position(p) => {
                packet.write_f64(p.x);
                packet.write_f64(p.y);
            }
            ComponentKind::Velocity(v) => {
                packet.write_f64(v.dx);
                packet.write_f64(v.dy);
            }
            ComponentKind::Expiration(e) => packet.write_i64(e.frame),
            ComponentKind::Index(i) => packet.write_i64(i.value),
        }
    }

    fn hash_payload(&self, hasher: &mut StateHasher) {
        match self {
            ComponentKind::Position(p) => {
                hasher.write_f64(p.x);
                hasher.write_f64(p.y);
            }
            ComponentKind::Velocity(v) => {
                hasher.write_f64(v.dx);
                hasher.write_f64(v.dy);
            }
            ComponentKind::Expiration(e) => hasher.write_i64(e.frame),
            ComponentKind::Index(i) => hasher.write_i64(i.value),
        }
    }

    /// Field-by-field copy into a fresh value of the same type. Since no
    /// component owns a reference to anything else, this is equivalent to
    /// (and implemented as) a clone, but kept as a named operation to
    /// mirror the core's `copy_into` contract.
    pub fn copy_into(&self) -> ComponentKind {
        self.clone()
    }
}

fn depacketize_position(p: &mut Packet) -> Result<ComponentKind, PacketError> {
    Ok(ComponentKind::Position(Position {
        x: p.read_f64()?,
        y: p.read_f64()?,
    }))
}

fn depacketize_velocity(p: &mut Packet) -> Result<ComponentKind, PacketError> {
    Ok(ComponentKind::Velocity(Velocity {
        dx: p.read_f64()?,
        dy: p.read_f64()?,
    }))
}

fn depacketize_expiration(p: &mut Packet) -> Result<ComponentKind, PacketError> {
    Ok(ComponentKind::Expiration(Expiration { frame: p.read_i64()? }))
}

fn depacketize_index(p: &mut Packet) -> Result<ComponentKind, PacketError> {
    Ok(ComponentKind::Index(Index { value: p.read_i64()? }))
}

static COMPONENT_REGISTRY: OnceLock<TypeRegistry<ComponentKind>> = OnceLock::new();

/// The process-wide component packetizer registry, built on first use.
pub fn component_registry() -> &'static TypeRegistry<ComponentKind> {
    COMPONENT_REGISTRY.get_or_init(|| {
        TypeRegistry::build(&[
            ("position", depacketize_position as fn(&mut Packet) -> Result<ComponentKind, PacketError>),
            ("velocity", depacketize_velocity as fn(&mut Packet) -> Result<ComponentKind, PacketError>),
            ("expiration", depacketize_expiration as fn(&mut Packet) -> Result<ComponentKind, PacketError>),
            ("index", depacketize_index as fn(&mut Packet) -> Result<ComponentKind, PacketError>),
        ])
    })
}

/// A stored component: its id, owning entity, enabled flag, and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRecord {
    pub id: ComponentId,
    pub entity: EntityId,
    pub enabled: bool,
    pub kind: ComponentKind,
}

impl ComponentRecord {
    /// Writes `type_tag, entity_id, enabled, bytes`. The component id
    /// itself is not written; it is
    /// re-minted contiguously on depacketize (see `Manager::depacketize`),
    /// since the wire layout carries no explicit id field and ids are
    /// never referenced across the wire protocol (only entity ids are).
    pub fn packetize(&self, packet: &mut Packet) {
        let registry = component_registry();
        registry.write_with_type_info(packet, self.kind.tag().wire_tag(), |packet| {
            packet.write_i32(self.entity.to_raw() as i32);
            packet.write_bool(self.enabled);
            self.kind.packetize_payload(packet);
        });
    }

    /// Inverse of `packetize`, given the id this record should take
    /// (assigned by the caller during Manager reconstruction).
    pub fn depacketize(packet: &mut Packet, id: ComponentId) -> Result<Self, PacketError> {
        let registry = component_registry();
        // `read_with_type_info` reads the tag then dispatches to a ctor
        // that only knows how to read the payload; entity_id/enabled are
        // read here, around that call, to keep the payload ctor table
        // generic over component type.
        let tag = packet.read_string()?;
        let entity = EntityId::from_raw(packet.read_i32()? as u32);
        let enabled = packet.read_bool()?;
        let kind = registry.read_with_type_info_tagged(&tag, packet)?;
        Ok(ComponentRecord { id, entity, enabled, kind })
    }

    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.write_str(self.kind.tag().wire_tag());
        hasher.write_u32(self.entity.to_raw());
        hasher.write_bool(self.enabled);
        self.kind.hash_payload(hasher);
    }
}
