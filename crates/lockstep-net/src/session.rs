//! The external, opaque transport the controller mediates. A real
//! implementation might be a NAT-punched UDP socket, a WebRTC data
//! channel, or an in-process loopback for single-player; the core only
//! needs the capabilities below.

/// A stable identifier for a connected peer, assigned by the session layer
/// (not the controller). Player number 0 is conventionally the server/host
/// in a listen-server topology, but the core makes no assumption about
/// that -- it only ever compares `PlayerId` values for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub i32);

/// An event drained from the session at the top of a controller `update()`
/// call -- events are drained synchronously at the top of `update()`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Joined(PlayerId),
    Left(PlayerId),
    Data { from: PlayerId, bytes: Vec<u8> },
}

/// The capability set a controller needs from its transport. Sessions are
/// never shared across controllers and carry no simulation state
/// themselves -- they are pure message plumbing.
pub trait Session {
    /// This peer's own player number, once the session has one (absent
    /// before the handshake completes).
    fn local_player(&self) -> Option<PlayerId>;

    /// Drains and returns every event queued since the last call. Must not
    /// block.
    fn poll_events(&mut self) -> Vec<SessionEvent>;

    /// Sends `bytes` to a single peer.
    fn send_to(&mut self, player: PlayerId, bytes: &[u8]);

    /// Sends `bytes` to every connected peer except `local_player()`.
    fn broadcast(&mut self, bytes: &[u8]);

    /// Disconnects `player`, e.g. on suspected command injection.
    fn disconnect(&mut self, player: PlayerId);

    /// Leaves the session entirely (self-disconnect), e.g. on a
    /// `snapshot-hash-mismatch`.
    fn leave(&mut self);
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;

    use super::*;

    /// An in-memory `Session` used only by this crate's own tests: records
    /// every outbound send/broadcast/disconnect/leave instead of moving
    /// bytes anywhere, and lets a test inject inbound events.
    #[derive(Debug, Default)]
    pub struct LoopbackSession {
        pub local_player: Option<PlayerId>,
        pub inbox: VecDeque<SessionEvent>,
        pub sent_to: Vec<(PlayerId, Vec<u8>)>,
        pub broadcasts: Vec<Vec<u8>>,
        pub disconnected: Vec<PlayerId>,
        pub left: bool,
    }

    impl LoopbackSession {
        pub fn new(local_player: PlayerId) -> Self {
            Self { local_player: Some(local_player), ..Default::default() }
        }

        pub fn push_event(&mut self, event: SessionEvent) {
            self.inbox.push_back(event);
        }
    }

    impl Session for LoopbackSession {
        fn local_player(&self) -> Option<PlayerId> {
            self.local_player
        }

        fn poll_events(&mut self) -> Vec<SessionEvent> {
            self.inbox.drain(..).collect()
        }

        fn send_to(&mut self, player: PlayerId, bytes: &[u8]) {
            self.sent_to.push((player, bytes.to_vec()));
        }

        fn broadcast(&mut self, bytes: &[u8]) {
            self.broadcasts.push(bytes.to_vec());
        }

        fn disconnect(&mut self, player: PlayerId) {
            self.disconnected.push(player);
        }

        fn leave(&mut self) {
            self.left = true;
        }
    }
}
