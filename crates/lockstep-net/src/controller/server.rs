//! The server controller variant.

use std::collections::{HashMap, VecDeque};

use tracing::{info, warn};

use lockstep_ecs::hash::StateHasher;
use lockstep_ecs::packet::Packet;
use lockstep_sim::command::Command;
use lockstep_sim::tss::{PushOutcome, Tss};

use crate::config::ControllerConfig;
use crate::protocol::TssMessage;
use crate::session::{PlayerId, Session, SessionEvent};

use super::common::Pacing;

/// How many trailing-frame game-state dumps the server keeps around for
/// hash-mismatch diagnostics. Old dumps fall off the front as new ones are
/// recorded; a mismatch is only ever reported for a recent frame, so there
/// is no reason to keep more than a handful.
const STATE_DUMP_RING_CAPACITY: usize = 8;

pub struct ServerController<S: Session> {
    session: S,
    tss: Tss,
    config: ControllerConfig,
    pacing: Pacing,
    client_loads: HashMap<PlayerId, f64>,
    last_hashed_frame: i64,
    adjusted_speed: f64,
    /// Recent trailing-simulation game-state dumps, keyed by frame, oldest
    /// first. Populated alongside each `HashCheck` broadcast and consulted
    /// when a client comes back asking for a snapshot after a mismatch.
    state_dumps: VecDeque<(i64, serde_json::Value)>,
}

impl<S: Session> ServerController<S> {
    pub fn new(session: S, tss: Tss, config: ControllerConfig) -> Self {
        let pacing = Pacing::new(config.load_sample_window);
        Self {
            session,
            tss,
            config,
            pacing,
            client_loads: HashMap::new(),
            last_hashed_frame: i64::MIN,
            adjusted_speed: 1.0,
            state_dumps: VecDeque::with_capacity(STATE_DUMP_RING_CAPACITY),
        }
    }

    /// The most recently recorded game-state dump, if any, with its frame.
    pub fn latest_state_dump(&self) -> Option<&(i64, serde_json::Value)> {
        self.state_dumps.back()
    }

    fn record_state_dump(&mut self, frame: i64) {
        let dump = self.tss.trailing().manager().debug_snapshot();
        self.state_dumps.push_back((frame, dump));
        if self.state_dumps.len() > STATE_DUMP_RING_CAPACITY {
            self.state_dumps.pop_front();
        }
    }

    pub fn tss(&self) -> &Tss {
        &self.tss
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Drains inbound session events, drives the TSS, adjusts its speed,
    /// and broadcasts a periodic `HashCheck`.
    pub fn update(&mut self, dt_ms: f64) {
        self.drain_events();

        let config = &self.config;
        let adjusted_speed = self.adjusted_speed;
        super::common::drive_ticks(&mut self.pacing, config, dt_ms, adjusted_speed, || self.tss.update());

        self.adjust_speed();

        let trailing_frame = self.tss.trailing_frame();
        if self.config.hash_interval_frames > 0
            && trailing_frame % self.config.hash_interval_frames == 0
            && trailing_frame > self.last_hashed_frame
        {
            let mut hasher = StateHasher::new();
            self.tss.hash(&mut hasher);
            let hash = hasher.finish().as_wire_i32();
            self.last_hashed_frame = trailing_frame;
            self.record_state_dump(trailing_frame);
            self.broadcast(&TssMessage::HashCheck { frame: trailing_frame, hash });
        }
    }

    fn drain_events(&mut self) {
        for event in self.session.poll_events() {
            match event {
                SessionEvent::Joined(player) => {
                    info!(player = player.0, "player joined");
                    self.client_loads.insert(player, 0.0);
                }
                SessionEvent::Left(player) => {
                    self.client_loads.insert(player, 0.0);
                    self.adjust_speed();
                }
                SessionEvent::Data { from, bytes } => self.handle_data(from, &bytes),
            }
        }
    }

    fn handle_data(&mut self, from: PlayerId, bytes: &[u8]) {
        let mut packet = Packet::from_bytes(bytes.to_vec());
        let message = match TssMessage::decode(&mut packet) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "discarding malformed packet");
                return;
            }
        };

        match message {
            TssMessage::Command(command) => self.on_command(from, command),
            TssMessage::Synchronize { frame_1, load_or_adjusted_speed, .. } => {
                self.on_synchronize(from, frame_1, load_or_adjusted_speed as f64)
            }
            TssMessage::GameStateRequest => self.on_game_state_request(from),
            // A server never receives these from a client.
            TssMessage::GameStateResponse { .. } | TssMessage::RemoveGameObject { .. } | TssMessage::HashCheck { .. } => {
                warn!(player = from.0, "ignoring server-only message from client");
            }
        }
    }

    fn on_command(&mut self, from: PlayerId, mut command: Command) {
        if command.player_number != from.0 {
            let error = crate::error::ProtocolError::PlayerNumberMismatch { claimed: command.player_number, actual: from.0 };
            warn!(%error, "disconnecting sender");
            self.session.disconnect(from);
            return;
        }

        let current_frame = self.tss.current_frame();
        if command.frame <= current_frame - lockstep_sim::simulation::MAX_PAST_DELAY {
            warn!(frame = command.frame, current_frame, "command too old, dropping");
            return;
        }
        if command.frame > current_frame + self.config.max_command_lead_frames {
            warn!(frame = command.frame, current_frame, "command too future, dropping");
            return;
        }

        command.is_authoritative = true;
        match self.tss.push_command(command.clone()) {
            PushOutcome::Accepted => self.broadcast(&TssMessage::Command(command)),
            PushOutcome::TooOld => warn!(frame = command.frame, "command older than trailing frame, dropping"),
        }
    }

    fn on_synchronize(&mut self, from: PlayerId, client_frame: i64, load: f64) {
        self.client_loads.insert(from, load);
        self.adjust_speed();
        let reply = TssMessage::Synchronize {
            frame_1: client_frame,
            frame_2: self.tss.current_frame(),
            load_or_adjusted_speed: self.adjusted_speed as f32,
        };
        self.send_to(from, &reply);
    }

    /// A client only asks for a fresh snapshot after detecting a `HashCheck`
    /// mismatch, so this doubles as the mismatch-diagnostics hook: log
    /// whatever recent trailing-state dump we have for the offending player
    /// to look at, then serve the authoritative snapshot it actually needs.
    fn on_game_state_request(&mut self, from: PlayerId) {
        if let Some((frame, dump)) = self.latest_state_dump() {
            info!(player = from.0, frame, game_state = %dump, "serving snapshot after presumed hash mismatch");
        }

        let mut hasher = StateHasher::new();
        self.tss.hash(&mut hasher);
        let hash = hasher.finish().as_wire_i32();

        let mut snapshot_packet = Packet::new();
        self.tss.packetize(&mut snapshot_packet);

        let reply = TssMessage::GameStateResponse { hash, snapshot: snapshot_packet.into_bytes() };
        self.send_to(from, &reply);
    }

    /// `worst = max(safe_load, max(client_loads))`; `adjusted_speed =
    /// target_speed / max(worst, 1.0)`.
    fn adjust_speed(&mut self) {
        let safe_load = self.pacing.safe_load(self.config.target_elapsed_ms(), self.config.load_buffer_factor);
        let worst_client = self.client_loads.values().cloned().fold(0.0_f64, f64::max);
        let worst = safe_load.max(worst_client);
        self.adjusted_speed = 1.0 / worst.max(1.0);
    }

    fn send_to(&mut self, player: PlayerId, message: &TssMessage) {
        let bytes = message.encode().into_bytes();
        self.session.send_to(player, &bytes);
    }

    fn broadcast(&mut self, message: &TssMessage) {
        let bytes = message.encode().into_bytes();
        self.session.broadcast(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::LoopbackSession;
    use lockstep_ecs::component::{ComponentKind, Position, Velocity};
    use lockstep_ecs::manager::Manager;
    use lockstep_sim::command::CommandPayload;
    use lockstep_sim::systems::register_reference_systems;

    fn apply(command: &Command, manager: &mut Manager) {
        if let CommandPayload::SpawnEntity { position, velocity } = &command.payload {
            let entity = manager.add_entity();
            manager.add_component(entity, ComponentKind::Position(Position { x: position.0, y: position.1 }));
            manager.add_component(entity, ComponentKind::Velocity(Velocity { dx: velocity.0, dy: velocity.1 }));
        }
    }

    fn fresh_manager() -> Manager {
        let mut manager = Manager::new();
        register_reference_systems(&mut manager);
        manager
    }

    fn fresh_server() -> ServerController<LoopbackSession> {
        let tss = Tss::new(vec![0, 3, 15], fresh_manager, apply);
        let session = LoopbackSession::new(PlayerId(0));
        ServerController::new(session, tss, ControllerConfig::default())
    }

    #[test]
    fn player_number_mismatch_disconnects_sender() {
        let mut server = fresh_server();
        let command = Command::new(3, server.tss().current_frame() + 1, 1, CommandPayload::RemoveEntity {
            entity: lockstep_ecs::entity::EntityId::from_raw(1),
        });
        let bytes = TssMessage::Command(command).encode().into_bytes();
        server.session_mut().push_event(SessionEvent::Data { from: PlayerId(2), bytes });

        server.update(0.0);

        assert_eq!(server.session_mut().disconnected, vec![PlayerId(2)]);
        assert!(server.session_mut().broadcasts.is_empty());
    }

    #[test]
    fn valid_command_is_stamped_authoritative_and_rebroadcast() {
        let mut server = fresh_server();
        let frame = server.tss().current_frame() + 1;
        let command = Command::new(2, frame, 1, CommandPayload::SpawnEntity { position: (0.0, 0.0), velocity: (1.0, 0.0) });
        let bytes = TssMessage::Command(command).encode().into_bytes();
        server.session_mut().push_event(SessionEvent::Data { from: PlayerId(2), bytes });

        server.update(0.0);

        assert_eq!(server.session_mut().broadcasts.len(), 1);
        let mut packet = Packet::from_bytes(server.session_mut().broadcasts[0].clone());
        let decoded = TssMessage::decode(&mut packet).unwrap();
        match decoded {
            TssMessage::Command(c) => assert!(c.is_authoritative),
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn hash_check_records_a_state_dump_keyed_by_frame() {
        let mut config = ControllerConfig::default();
        config.hash_interval_frames = 1;
        let tss = Tss::new(vec![0, 3, 15], fresh_manager, apply);
        let session = LoopbackSession::new(PlayerId(0));
        let mut server = ServerController::new(session, tss, config);

        let elapsed = server.config.target_elapsed_ms();
        server.update(elapsed);

        let (frame, dump) = server.latest_state_dump().expect("a dump should be recorded on the first hash check");
        assert_eq!(*frame, server.tss().trailing_frame());
        assert!(dump["entities"].is_object());
    }

    #[test]
    fn state_dump_ring_is_bounded() {
        let mut config = ControllerConfig::default();
        config.hash_interval_frames = 1;
        let tss = Tss::new(vec![0, 3, 15], fresh_manager, apply);
        let session = LoopbackSession::new(PlayerId(0));
        let mut server = ServerController::new(session, tss, config);

        let elapsed = server.config.target_elapsed_ms();
        for _ in 0..(STATE_DUMP_RING_CAPACITY + 5) {
            server.update(elapsed);
        }

        assert!(server.state_dumps.len() <= STATE_DUMP_RING_CAPACITY);
    }

    #[test]
    fn game_state_request_does_not_panic_without_a_prior_hash_check() {
        let mut server = fresh_server();
        server.session_mut().push_event(SessionEvent::Data { from: PlayerId(2), bytes: TssMessage::GameStateRequest.encode().into_bytes() });

        server.update(0.0);

        assert_eq!(server.session_mut().sent_to.len(), 1);
    }

    #[test]
    fn command_too_future_is_dropped_without_broadcast() {
        let mut server = fresh_server();
        let frame = server.tss().current_frame() + server.config.max_command_lead_frames + 1;
        let command = Command::new(2, frame, 1, CommandPayload::RemoveEntity { entity: lockstep_ecs::entity::EntityId::from_raw(1) });
        let bytes = TssMessage::Command(command).encode().into_bytes();
        server.session_mut().push_event(SessionEvent::Data { from: PlayerId(2), bytes });

        server.update(0.0);

        assert!(server.session_mut().broadcasts.is_empty());
    }
}
