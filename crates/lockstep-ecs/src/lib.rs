//! Deterministic ECS core: packet codec, hashing, entities, components,
//! systems, and the [`manager::Manager`] that aggregates them.
//!
//! This crate has no notion of frames, commands, or networking -- that is
//! `lockstep-sim` and `lockstep-net`. It guarantees only one thing, but
//! guarantees it strictly: two `Manager`s built from the same sequence of
//! entity/component/system operations produce byte-equal `packetize()` and
//! `hash()` output.

pub mod component;
pub mod entity;
pub mod error;
pub mod hash;
pub mod manager;
pub mod message;
pub mod packet;
pub mod system;

pub mod prelude {
    pub use crate::component::{
        component_registry, ComponentId, ComponentKind, ComponentRecord, ComponentTag, Expiration, Index, Position,
        Velocity,
    };
    pub use crate::entity::{EntityAllocator, EntityId};
    pub use crate::error::ManagerError;
    pub use crate::hash::{StateHash, StateHasher};
    pub use crate::manager::{FrameDiagnostics, Manager};
    pub use crate::message::{Message, Outbox};
    pub use crate::packet::{Packet, PacketError, TypeRegistry};
    pub use crate::system::ManagerSystem;
}
