//! The client controller variant.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use lockstep_ecs::hash::StateHasher;
use lockstep_ecs::packet::Packet;
use lockstep_sim::command::{Command, CommandPayload};
use lockstep_sim::tss::{PushOutcome, Tss, TssState};

use crate::config::ControllerConfig;
use crate::protocol::TssMessage;
use crate::session::{PlayerId, Session, SessionEvent};

use super::common::Pacing;

/// Ring of the last `max_frame_diff_samples` `Synchronize` round-trip
/// deltas, with median and population standard deviation over its
/// current contents.
#[derive(Debug)]
struct FrameDiffSamples {
    samples: VecDeque<i64>,
    capacity: usize,
}

impl FrameDiffSamples {
    fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, delta: i64) {
        self.samples.push_back(delta);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    fn median(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<i64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
        } else {
            sorted[mid] as f64
        }
    }

    fn std_dev(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean = self.samples.iter().sum::<i64>() as f64 / self.samples.len() as f64;
        let variance = self.samples.iter().map(|&s| {
            let diff = s as f64 - mean;
            diff * diff
        }).sum::<f64>() / self.samples.len() as f64;
        variance.sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Unconnected,
    Connected,
}

pub struct ClientController<S: Session> {
    session: S,
    tss: Tss,
    config: ControllerConfig,
    pacing: Pacing,
    state: ConnectionState,
    adjusted_speed: f64,
    last_sync_time_ms: f64,
    time_ms: f64,
    frame_diff_samples: FrameDiffSamples,
    server_hashes: HashMap<i64, i32>,
    local_hashes: HashMap<i64, i32>,
    latest_server_hash_frame: i64,
    next_command_id: i32,
    player_number: i32,
    snapshot_requested: bool,
}

impl<S: Session> ClientController<S> {
    pub fn new(session: S, tss: Tss, config: ControllerConfig, player_number: i32) -> Self {
        let pacing = Pacing::new(config.load_sample_window);
        let frame_diff_samples = FrameDiffSamples::new(config.max_frame_diff_samples);
        Self {
            session,
            tss,
            config,
            pacing,
            state: ConnectionState::Connected,
            adjusted_speed: 1.0,
            last_sync_time_ms: 0.0,
            time_ms: 0.0,
            frame_diff_samples,
            server_hashes: HashMap::new(),
            local_hashes: HashMap::new(),
            latest_server_hash_frame: i64::MIN,
            next_command_id: 0,
            player_number,
            snapshot_requested: false,
        }
    }

    pub fn tss(&self) -> &Tss {
        &self.tss
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Skips entirely while unconnected or waiting for a snapshot.
    pub fn update(&mut self, dt_ms: f64) {
        self.time_ms += dt_ms;
        self.drain_events();

        if self.state == ConnectionState::Unconnected || self.tss.state() == TssState::WaitingForSync {
            return;
        }

        let config = &self.config;
        let adjusted_speed = self.adjusted_speed;
        super::common::drive_ticks(&mut self.pacing, config, dt_ms, adjusted_speed, || self.tss.update());

        self.check_trailing_hash();

        if self.time_ms - self.last_sync_time_ms >= self.config.sync_interval_ms as f64 {
            self.last_sync_time_ms = self.time_ms;
            self.send_synchronize();
        }
    }

    fn check_trailing_hash(&mut self) {
        let trailing_frame = self.tss.trailing_frame();
        if self.config.hash_interval_frames <= 0 || trailing_frame % self.config.hash_interval_frames != 0 {
            return;
        }

        let mut hasher = StateHasher::new();
        self.tss.hash(&mut hasher);
        let local_hash = hasher.finish().as_wire_i32();

        if let Some(&server_hash) = self.server_hashes.get(&trailing_frame) {
            if server_hash != local_hash {
                let error = crate::error::ProtocolError::HashMismatch { frame: trailing_frame };
                warn!(%error, local_hash, server_hash, "invalidating");
                self.tss.invalidate();
            }
        } else {
            self.local_hashes.insert(trailing_frame, local_hash);
        }
    }

    fn send_synchronize(&mut self) {
        let safe_load = self.pacing.safe_load(self.config.target_elapsed_ms(), self.config.load_buffer_factor);
        let message = TssMessage::Synchronize {
            frame_1: self.tss.current_frame(),
            frame_2: 0,
            load_or_adjusted_speed: safe_load as f32,
        };
        self.send(&message);
    }

    fn drain_events(&mut self) {
        for event in self.session.poll_events() {
            match event {
                SessionEvent::Joined(_) => self.state = ConnectionState::Connected,
                SessionEvent::Left(_) => self.state = ConnectionState::Unconnected,
                SessionEvent::Data { bytes, .. } => self.handle_data(&bytes),
            }
        }
        if self.tss.state() == TssState::WaitingForSync {
            if !self.snapshot_requested {
                self.snapshot_requested = true;
                self.send(&TssMessage::GameStateRequest);
            }
        } else {
            self.snapshot_requested = false;
        }
    }

    fn handle_data(&mut self, bytes: &[u8]) {
        let mut packet = Packet::from_bytes(bytes.to_vec());
        let message = match TssMessage::decode(&mut packet) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "discarding malformed packet");
                return;
            }
        };

        match message {
            TssMessage::Command(command) => self.on_command(command),
            TssMessage::Synchronize { frame_1, frame_2, load_or_adjusted_speed } => {
                self.on_synchronize(frame_1, frame_2, load_or_adjusted_speed as f64)
            }
            TssMessage::HashCheck { frame, hash } => self.on_hash_check(frame, hash),
            TssMessage::GameStateResponse { hash, snapshot } => self.on_game_state_response(hash, snapshot),
            TssMessage::GameStateRequest | TssMessage::RemoveGameObject { .. } => {
                warn!("ignoring message not meant for a client");
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match self.tss.push_command(command.clone()) {
            PushOutcome::Accepted => {}
            PushOutcome::TooOld => {
                warn!(frame = command.frame, "command older than trailing frame, invalidating");
                self.tss.invalidate();
            }
        }
    }

    /// `latency = (current_frame - sent_frame) / 2`; `delta = server_frame
    /// - current_frame + latency/2`. The sample always feeds the ring (so
    /// `median`/`std_dev` track the live distribution), but the TSS is only
    /// nudged when `delta` clears the outlier filter (`|delta| > 1` and
    /// `delta < median + std_dev`) -- a single spurious sample shouldn't
    /// yank the frame around. The server's `adjusted_speed` is adopted on
    /// every reply regardless, since it reflects the server's own load
    /// rather than this client's frame offset.
    fn on_synchronize(&mut self, sent_frame: i64, server_frame: i64, adjusted_speed: f64) {
        let current_frame = self.tss.current_frame();
        let latency = (current_frame - sent_frame) / 2;
        let delta = server_frame - current_frame + latency / 2;

        self.frame_diff_samples.push(delta);
        let median = self.frame_diff_samples.median();
        let std_dev = self.frame_diff_samples.std_dev();

        if delta.abs() > 1 && (delta as f64) < median + std_dev {
            self.tss.apply_frame_delta(delta);
        }
        self.adjusted_speed = adjusted_speed;
    }

    fn on_hash_check(&mut self, frame: i64, hash: i32) {
        if frame > self.latest_server_hash_frame {
            self.latest_server_hash_frame = frame;
        }
        self.server_hashes.insert(frame, hash);
        if let Some(&local_hash) = self.local_hashes.get(&frame) {
            if local_hash != hash {
                let error = crate::error::ProtocolError::HashMismatch { frame };
                warn!(%error, local_hash, server_hash = hash, "invalidating");
                self.tss.invalidate();
            }
        }
    }

    fn on_game_state_response(&mut self, hash: i32, snapshot: Vec<u8>) {
        let mut packet = Packet::from_bytes(snapshot);
        if let Err(error) = self.tss.depacketize(&mut packet) {
            warn!(%error, "failed to decode game state snapshot, leaving session");
            self.session.leave();
            return;
        }

        let mut hasher = StateHasher::new();
        self.tss.hash(&mut hasher);
        let decoded_hash = hasher.finish().as_wire_i32();
        if decoded_hash != hash {
            let error = crate::error::ProtocolError::SnapshotHashMismatch;
            warn!(%error, claimed = hash, decoded = decoded_hash, "leaving session");
            self.session.leave();
        }
    }

    /// Stamps `player_number` and `frame = current_frame + 1`, applies
    /// tentatively, and forwards to the server. Suppressed while waiting
    /// for a snapshot.
    pub fn push_local_command(&mut self, payload: CommandPayload) {
        if self.tss.state() == TssState::WaitingForSync {
            return;
        }

        let command = Command::new(self.player_number, self.tss.current_frame() + 1, self.next_command_id, payload);
        self.next_command_id += 1;

        match self.tss.push_command(command.clone()) {
            PushOutcome::Accepted => self.send(&TssMessage::Command(command)),
            PushOutcome::TooOld => warn!(frame = command.frame, "local command rejected as too old"),
        }
    }

    fn send(&mut self, message: &TssMessage) {
        let bytes = message.encode().into_bytes();
        self.session.broadcast(&bytes);
    }
}
