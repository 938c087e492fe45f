//! System trait and the registry that lets a [`crate::manager::Manager`]
//! packetize/depacketize/hash systems by the same string-tag mechanism it
//! uses for components.
//!
//! Per the core's design notes, concrete systems are a closed set
//! implemented by the embedding crate (`lockstep-sim`'s reference systems);
//! `lockstep-ecs` only specifies the capability set -- `update`, `packetize`,
//! `depacketize`, `hash_into`, `copy_into` -- and dispatches to it through a
//! trait object, since the Manager must hold a heterogeneous, globally
//! ordered list of systems without knowing their concrete types.

use crate::manager::Manager;
use crate::packet::{Packet, PacketError};

/// A named, ordered per-frame processor.
///
/// Systems hold only a reference to their Manager (passed in on `update`)
/// and optional small internal state; they are subject to the same
/// packetize/depacketize/hash contract as components so the whole Manager
/// can be snapshotted byte-for-byte.
pub trait ManagerSystem: std::fmt::Debug {
    /// Stable wire tag for this system type, e.g. `"translation"`. Must be
    /// registered in [`crate::manager::Manager::add_system`]'s caller-side
    /// [`SystemRegistry`] construction.
    fn type_tag(&self) -> &'static str;

    /// Advance this system by one frame. `manager` is the same Manager the
    /// system is registered on; systems may read/write components and
    /// entities and push messages through it, but must not recurse into
    /// `Manager::update`.
    fn update(&mut self, frame: i64, manager: &mut Manager);

    /// Serialize this system's internal state (not its type tag, which the
    /// Manager writes around this call).
    fn packetize(&self, packet: &mut Packet);

    /// Inverse of `packetize`; replaces internal state in place.
    fn depacketize(&mut self, packet: &mut Packet) -> Result<(), PacketError>;

    /// Feed this system's logical state into the hasher, in the same field
    /// order `packetize` writes them.
    fn hash_into(&self, hasher: &mut crate::hash::StateHasher);

    /// Produce an independent copy of this system carrying the same
    /// internal state, for `Manager::copy_into`.
    fn copy_into(&self) -> Box<dyn ManagerSystem>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::StateHasher;

    #[derive(Debug, Clone, Default)]
    struct CountingSystem {
        ticks: i64,
    }

    impl ManagerSystem for CountingSystem {
        fn type_tag(&self) -> &'static str {
            "counting"
        }

        fn update(&mut self, _frame: i64, _manager: &mut Manager) {
            self.ticks += 1;
        }

        fn packetize(&self, packet: &mut Packet) {
            packet.write_i64(self.ticks);
        }

        fn depacketize(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
            self.ticks = packet.read_i64()?;
            Ok(())
        }

        fn hash_into(&self, hasher: &mut StateHasher) {
            hasher.write_i64(self.ticks);
        }

        fn copy_into(&self) -> Box<dyn ManagerSystem> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn packetize_roundtrip_preserves_state() {
        let mut sys = CountingSystem { ticks: 7 };
        let mut packet = Packet::new();
        sys.packetize(&mut packet);

        let mut restored = CountingSystem::default();
        restored.depacketize(&mut packet).unwrap();
        assert_eq!(restored.ticks, 7);
    }

    #[test]
    fn copy_into_is_independent() {
        let sys = CountingSystem { ticks: 3 };
        let mut copy = sys.copy_into();
        copy.update(0, &mut Manager::new());

        let mut hasher = StateHasher::new();
        copy.hash_into(&mut hasher);
        let copy_hash = hasher.finish();

        let mut hasher = StateHasher::new();
        sys.hash_into(&mut hasher);
        let original_hash = hasher.finish();

        assert_ne!(copy_hash, original_hash);
        assert_eq!(sys.ticks, 3);
    }
}
