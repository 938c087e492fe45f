//! Error kinds raised at the protocol/controller boundary.
//!
//! These are the errors that escalate into an explicit recovery action
//! (`invalidate`, request a snapshot, leave the session) rather than being
//! absorbed. Transient wire-level errors (`PacketError`) are logged and
//! dropped at the call site instead of propagated as `ProtocolError` --
//! see `controller.rs`.

use thiserror::Error;

use lockstep_ecs::packet::PacketError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] PacketError),

    #[error("unknown TSS message discriminator {0}")]
    UnknownMessageType(u8),

    #[error("command carries player_number {claimed} but the session identifies the sender as {actual}")]
    PlayerNumberMismatch { claimed: i32, actual: i32 },

    #[error("trailing hash mismatch at frame {frame}")]
    HashMismatch { frame: i64 },

    #[error("GameStateResponse hash does not match its decoded snapshot")]
    SnapshotHashMismatch,
}
