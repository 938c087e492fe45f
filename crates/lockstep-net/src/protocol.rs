//! Wire framing for the session transport: a one-byte `TssMessage`
//! discriminator followed by a message-specific payload.

use lockstep_ecs::packet::{Packet, PacketError};
use lockstep_sim::command::Command;

use crate::error::ProtocolError;

/// A single framed message exchanged over the session. All integers are
/// big-endian, matching [`Packet`]'s own wire conventions.
#[derive(Debug, Clone, PartialEq)]
pub enum TssMessage {
    Command(Command),
    /// `(frame_1, frame_2, load_or_adjusted_speed)`. A client sends
    /// `frame_2 = 0`; the server replies with its own current frame there.
    Synchronize { frame_1: i64, frame_2: i64, load_or_adjusted_speed: f32 },
    GameStateRequest,
    GameStateResponse { hash: i32, snapshot: Vec<u8> },
    RemoveGameObject { frame: i64, entity_id: i32 },
    HashCheck { frame: i64, hash: i32 },
}

impl TssMessage {
    fn discriminant(&self) -> u8 {
        match self {
            TssMessage::Command(_) => 0,
            TssMessage::Synchronize { .. } => 1,
            TssMessage::GameStateRequest => 2,
            TssMessage::GameStateResponse { .. } => 3,
            TssMessage::RemoveGameObject { .. } => 4,
            TssMessage::HashCheck { .. } => 5,
        }
    }

    pub fn encode(&self) -> Packet {
        let mut packet = Packet::new();
        packet.write_u8(self.discriminant());
        match self {
            TssMessage::Command(command) => command.packetize(&mut packet),
            TssMessage::Synchronize { frame_1, frame_2, load_or_adjusted_speed } => {
                packet.write_i64(*frame_1);
                packet.write_i64(*frame_2);
                packet.write_f32(*load_or_adjusted_speed);
            }
            TssMessage::GameStateRequest => {}
            TssMessage::GameStateResponse { hash, snapshot } => {
                packet.write_i32(*hash);
                packet.write_bytes(snapshot);
            }
            TssMessage::RemoveGameObject { frame, entity_id } => {
                packet.write_i64(*frame);
                packet.write_i32(*entity_id);
            }
            TssMessage::HashCheck { frame, hash } => {
                packet.write_i64(*frame);
                packet.write_i32(*hash);
            }
        }
        packet
    }

    pub fn decode(packet: &mut Packet) -> Result<Self, ProtocolError> {
        let discriminant = packet.read_u8()?;
        Ok(match discriminant {
            0 => TssMessage::Command(Command::depacketize(packet)?),
            1 => TssMessage::Synchronize {
                frame_1: packet.read_i64()?,
                frame_2: packet.read_i64()?,
                load_or_adjusted_speed: packet.read_f32()?,
            },
            2 => TssMessage::GameStateRequest,
            3 => TssMessage::GameStateResponse {
                hash: packet.read_i32()?,
                snapshot: packet.read_bytes()?,
            },
            4 => TssMessage::RemoveGameObject { frame: packet.read_i64()?, entity_id: packet.read_i32()? },
            5 => TssMessage::HashCheck { frame: packet.read_i64()?, hash: packet.read_i32()? },
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// Convenience wrapper: decode-or-log-and-discard, per the
/// packet-malformed policy (warn, drop, never tear down the session).
pub fn try_decode(bytes: &[u8]) -> Option<TssMessage> {
    let mut packet = Packet::from_bytes(bytes.to_vec());
    match TssMessage::decode(&mut packet) {
        Ok(message) => Some(message),
        Err(error) => {
            tracing::warn!(%error, "discarding malformed packet");
            None
        }
    }
}

pub fn packet_error_is_malformed(error: &PacketError) -> bool {
    matches!(
        error,
        PacketError::UnexpectedEof { .. } | PacketError::LengthOutOfBounds { .. } | PacketError::InvalidUtf8
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_sim::command::CommandPayload;

    #[test]
    fn roundtrips_every_variant() {
        let messages = vec![
            TssMessage::Command(Command::new(1, 5, 1, CommandPayload::RemoveEntity { entity: lockstep_ecs::entity::EntityId::from_raw(1) })),
            TssMessage::Synchronize { frame_1: 10, frame_2: 0, load_or_adjusted_speed: 1.0 },
            TssMessage::GameStateRequest,
            TssMessage::GameStateResponse { hash: 42, snapshot: vec![1, 2, 3, 4] },
            TssMessage::RemoveGameObject { frame: 7, entity_id: 3 },
            TssMessage::HashCheck { frame: 100, hash: -7 },
        ];

        for message in messages {
            let mut packet = message.encode();
            let decoded = TssMessage::decode(&mut packet).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let mut packet = Packet::new();
        packet.write_u8(200);
        assert!(matches!(TssMessage::decode(&mut packet), Err(ProtocolError::UnknownMessageType(200))));
    }

    #[test]
    fn try_decode_absorbs_truncated_input() {
        assert!(try_decode(&[0]).is_none());
    }
}
