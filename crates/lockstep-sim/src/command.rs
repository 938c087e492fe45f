//! Commands: the only unit of state that crosses peers mid-simulation.
//!
//! A [`Command`] carries a target frame, an originating player, an
//! authoritative flag, and a payload. This is the *only* command variant
//! the core supports at its boundary -- there is no separate
//! fire-and-forget "local effect" command; anything that should survive a
//! rollback must be frame-stamped like this.

use lockstep_ecs::component::ComponentTag;
use lockstep_ecs::entity::EntityId;
use lockstep_ecs::hash::StateHasher;
use lockstep_ecs::packet::{Packet, PacketError};

/// Closed union of command payloads this core knows how to apply.
///
/// New gameplay commands are added here as variants, not as a separate
/// dynamic registry -- see the core's design notes on dynamic dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    SpawnEntity { position: (f64, f64), velocity: (f64, f64) },
    SetVelocity { entity: EntityId, dx: f64, dy: f64 },
    SetPosition { entity: EntityId, x: f64, y: f64 },
    RemoveEntity { entity: EntityId },
}

impl CommandPayload {
    /// The `(entity, component)` pair this payload writes, if any. Two
    /// commands in the same frame that return the same target conflict --
    /// last write wins by tie-break order, but the conflict is still worth
    /// counting in `ApplyReport::conflict_count`. `SpawnEntity`/
    /// `RemoveEntity` have no fixed target to collide on, so they are not
    /// tracked here.
    pub fn conflict_target(&self) -> Option<(EntityId, ComponentTag)> {
        match self {
            CommandPayload::SetVelocity { entity, .. } => Some((*entity, ComponentTag::Velocity)),
            CommandPayload::SetPosition { entity, .. } => Some((*entity, ComponentTag::Position)),
            CommandPayload::SpawnEntity { .. } | CommandPayload::RemoveEntity { .. } => None,
        }
    }

    fn wire_tag(&self) -> &'static str {
        match self {
            CommandPayload::SpawnEntity { .. } => "spawn_entity",
            CommandPayload::SetVelocity { .. } => "set_velocity",
            CommandPayload::SetPosition { .. } => "set_position",
            CommandPayload::RemoveEntity { .. } => "remove_entity",
        }
    }

    fn packetize(&self, packet: &mut Packet) {
        match self {
            CommandPayload::SpawnEntity { position, velocity } => {
                packet.write_f64(position.0);
                packet.write_f64(position.1);
                packet.write_f64(velocity.0);
                packet.write_f64(velocity.1);
            }
            CommandPayload::SetVelocity { entity, dx, dy } => {
                packet.write_i32(entity.to_raw() as i32);
                packet.write_f64(*dx);
                packet.write_f64(*dy);
            }
            CommandPayload::SetPosition { entity, x, y } => {
                packet.write_i32(entity.to_raw() as i32);
                packet.write_f64(*x);
                packet.write_f64(*y);
            }
            CommandPayload::RemoveEntity { entity } => {
                packet.write_i32(entity.to_raw() as i32);
            }
        }
    }

    fn depacketize(tag: &str, packet: &mut Packet) -> Result<Self, PacketError> {
        Ok(match tag {
            "spawn_entity" => CommandPayload::SpawnEntity {
                position: (packet.read_f64()?, packet.read_f64()?),
                velocity: (packet.read_f64()?, packet.read_f64()?),
            },
            "set_velocity" => CommandPayload::SetVelocity {
                entity: EntityId::from_raw(packet.read_i32()? as u32),
                dx: packet.read_f64()?,
                dy: packet.read_f64()?,
            },
            "set_position" => CommandPayload::SetPosition {
                entity: EntityId::from_raw(packet.read_i32()? as u32),
                x: packet.read_f64()?,
                y: packet.read_f64()?,
            },
            "remove_entity" => CommandPayload::RemoveEntity {
                entity: EntityId::from_raw(packet.read_i32()? as u32),
            },
            other => return Err(PacketError::UnknownTypeTag(other.to_owned())),
        })
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        match self {
            CommandPayload::SpawnEntity { position, velocity } => {
                hasher.write_f64(position.0);
                hasher.write_f64(position.1);
                hasher.write_f64(velocity.0);
                hasher.write_f64(velocity.1);
            }
            CommandPayload::SetVelocity { entity, dx, dy } => {
                hasher.write_i32(entity.to_raw() as i32);
                hasher.write_f64(*dx);
                hasher.write_f64(*dy);
            }
            CommandPayload::SetPosition { entity, x, y } => {
                hasher.write_i32(entity.to_raw() as i32);
                hasher.write_f64(*x);
                hasher.write_f64(*y);
            }
            CommandPayload::RemoveEntity { entity } => hasher.write_i32(entity.to_raw() as i32),
        }
    }
}

/// A single frame-stamped command. Two commands are equivalent for
/// deduplication purposes iff `(player_number, frame, payload_hash)`
/// agree -- not full payload equality, so the hash is computed once and
/// carried rather than recomputed on every comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub player_number: i32,
    pub frame: i64,
    pub is_authoritative: bool,
    pub command_id: i32,
    pub payload: CommandPayload,
}

impl Command {
    pub fn new(player_number: i32, frame: i64, command_id: i32, payload: CommandPayload) -> Self {
        Self {
            player_number,
            frame,
            is_authoritative: false,
            command_id,
            payload,
        }
    }

    pub fn payload_hash(&self) -> u64 {
        let mut hasher = StateHasher::new();
        self.payload.hash_into(&mut hasher);
        let digest = hasher.finish();
        u64::from_be_bytes(digest.as_bytes()[..8].try_into().expect("8 bytes"))
    }

    /// The `(player_number, frame, payload_hash)` key deduplication
    /// equivalence is defined over.
    pub fn dedup_key(&self) -> (i32, i64, u64) {
        (self.player_number, self.frame, self.payload_hash())
    }

    pub fn packetize(&self, packet: &mut Packet) {
        packet.write_string(self.payload.wire_tag());
        packet.write_i64(self.frame);
        packet.write_i32(self.player_number);
        packet.write_bool(self.is_authoritative);
        packet.write_i32(self.command_id);
        self.payload.packetize(packet);
    }

    pub fn depacketize(packet: &mut Packet) -> Result<Self, PacketError> {
        let tag = packet.read_string()?;
        let frame = packet.read_i64()?;
        let player_number = packet.read_i32()?;
        let is_authoritative = packet.read_bool()?;
        let command_id = packet.read_i32()?;
        let payload = CommandPayload::depacketize(&tag, packet)?;
        Ok(Self {
            player_number,
            frame,
            is_authoritative,
            command_id,
            payload,
        })
    }
}

/// Tie-break order for commands scheduled at the same frame: player number
/// ascending, then insertion order. `sort_key` gives the first component;
/// callers must keep ties in insertion order themselves (a stable sort,
/// which `Vec::sort_by_key` is).
pub fn tie_break_sort_key(command: &Command) -> i32 {
    command.player_number
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_payload() {
        let command = Command::new(
            3,
            42,
            1,
            CommandPayload::SetVelocity {
                entity: EntityId::from_raw(5),
                dx: 1.0,
                dy: -2.0,
            },
        );
        let mut packet = Packet::new();
        command.packetize(&mut packet);
        let decoded = Command::depacketize(&mut packet).unwrap();
        assert_eq!(decoded.payload, command.payload);
        assert_eq!(decoded.frame, command.frame);
        assert_eq!(decoded.player_number, command.player_number);
    }

    #[test]
    fn dedup_key_ignores_command_id_and_authoritative_flag() {
        let mut a = Command::new(1, 10, 1, CommandPayload::RemoveEntity { entity: EntityId::from_raw(1) });
        let mut b = a.clone();
        b.command_id = 2;
        b.is_authoritative = true;
        assert_eq!(a.dedup_key(), b.dedup_key());

        a.payload = CommandPayload::RemoveEntity { entity: EntityId::from_raw(2) };
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
