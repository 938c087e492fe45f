//! Trailing State Synchronization (TSS): the rollback/resimulation engine.
//!
//! A [`Tss`] owns `N` [`Simulation`] instances at staggered delays behind a
//! leading frame. Late commands are absorbed by resetting the affected
//! simulation from the trailing (most-delayed, authoritative) simulation
//! and replaying forward, rather than mutating history in place -- the
//! trailing simulation never needs to roll back itself, since by
//! construction every accepted command targets a frame at or after it.
//!
//! # Resolved ambiguities (see `DESIGN.md` for the full rationale)
//!
//! - A simulation is "dirty" exactly when a newly pushed command targets a
//!   frame at or before its own `current_frame` (i.e. it has already
//!   advanced past the point the command needed to affect). Dirty
//!   simulations are rebuilt from the trailing simulation's *current*
//!   state (so a trailing advance earlier in the same `update()` call is
//!   visible to the rebuild) and fast-forwarded back up to the frame they
//!   had already reached, then advance the usual one frame further.
//! - Within a single `Simulation::update()`, commands scheduled for the
//!   new frame are applied before systems run that frame. Rollback
//!   correctness is validated via the precise, numbers-free
//!   rollback-equivalence property in `tests/e2e.rs` rather than by
//!   matching any particular illustrative frame numbers.

use tracing::{debug, info, warn};

use lockstep_ecs::hash::StateHasher;
use lockstep_ecs::manager::Manager;
use lockstep_ecs::packet::{Packet, PacketError};

use crate::command::Command;
use crate::simulation::Simulation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TssState {
    Ready,
    RollingForward,
    WaitingForSync,
    Disposed,
}

/// Result of [`Tss::push_command`]: whether the command was accepted, and
/// if not, why -- callers (the controller) decide the recovery action:
/// dropped silently on the server, `invalidate()` on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    TooOld,
}

pub struct Tss {
    delays: Vec<i64>,
    sims: Vec<Simulation>,
    dirty: Vec<Option<i64>>,
    state: TssState,
    command_log: Vec<Command>,
    skip_frames: i64,
}

impl Tss {
    /// `delays` must be non-decreasing and start at 0 (`delays[0] == 0` is
    /// the leading simulation); `manager_factory` builds a fresh Manager
    /// with the same systems registered for every trailing state.
    pub fn new(
        delays: Vec<i64>,
        mut manager_factory: impl FnMut() -> Manager,
        apply_payload: fn(&Command, &mut Manager),
    ) -> Self {
        assert!(!delays.is_empty(), "TSS needs at least a leading simulation");
        assert_eq!(delays[0], 0, "delays[0] must be 0 (the leading simulation)");
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "delays must be non-decreasing");

        // Each simulation starts `delay` frames behind the leading one
        // (which starts at frame 0); frame counters only ever increase, so
        // the offset has to be baked in at construction rather than
        // produced by ticking a trailing simulation "backwards".
        let sims = delays
            .iter()
            .map(|delay| Simulation::new_at_frame(manager_factory(), apply_payload, -delay))
            .collect::<Vec<_>>();
        let dirty = vec![None; sims.len()];

        Self {
            delays,
            sims,
            dirty,
            state: TssState::Ready,
            command_log: Vec::new(),
            skip_frames: 0,
        }
    }

    pub fn current_frame(&self) -> i64 {
        self.sims[0].current_frame()
    }

    pub fn trailing_frame(&self) -> i64 {
        self.sims.last().expect("non-empty").current_frame()
    }

    pub fn state(&self) -> TssState {
        self.state
    }

    pub fn leading(&self) -> &Simulation {
        &self.sims[0]
    }

    pub fn trailing(&self) -> &Simulation {
        self.sims.last().expect("non-empty")
    }

    /// Appends `command` to the top-level log and every simulation whose
    /// frame hasn't yet passed it; marks simulations that already have
    /// dirty.
    pub fn push_command(&mut self, command: Command) -> PushOutcome {
        if command.frame <= self.trailing_frame() {
            warn!(frame = command.frame, trailing_frame = self.trailing_frame(), "command too old for trailing state");
            return PushOutcome::TooOld;
        }

        self.command_log.push(command.clone());
        for (i, sim) in self.sims.iter_mut().enumerate() {
            if sim.current_frame() <= command.frame {
                let _ = sim.push_command(command.clone());
            } else {
                let dirty_from = self.dirty[i].map_or(command.frame, |existing| existing.min(command.frame));
                self.dirty[i] = Some(dirty_from.max(sim.current_frame()));
                debug!(sim = i, frame = command.frame, "marked simulation dirty for rollback");
                if self.state == TssState::Ready {
                    self.state = TssState::RollingForward;
                }
            }
        }
        PushOutcome::Accepted
    }

    /// Drives every simulation forward by one frame, first resolving any
    /// dirty (rolled-back) simulations by rebuilding them from the
    /// trailing simulation and fast-forwarding. No-op while
    /// `WaitingForSync` or `Disposed`.
    pub fn update(&mut self) {
        if matches!(self.state, TssState::WaitingForSync | TssState::Disposed) {
            return;
        }
        if self.skip_frames > 0 {
            self.skip_frames -= 1;
            return;
        }

        let trailing_idx = self.sims.len() - 1;
        let mut rolled_forward = false;

        for i in (0..self.sims.len()).rev() {
            if let Some(target) = self.dirty[i].take() {
                rolled_forward = true;
                if i != trailing_idx {
                    let (left, right) = self.sims.split_at_mut(i + 1);
                    right[trailing_idx - i - 1].copy_into(&mut left[i]);
                }
                while self.sims[i].current_frame() < target {
                    self.sims[i].update();
                }
            }
            self.sims[i].update();
        }

        let floor = self.trailing_frame();
        for sim in &mut self.sims {
            sim.trim_log_below(floor);
        }
        self.command_log.retain(|c| c.frame >= floor);

        if rolled_forward {
            self.state = TssState::Ready;
        }
    }

    /// Nudges the TSS's notion of frame toward a peer's by `delta` frames,
    /// the correction a `Synchronize` round-trip asks for once it clears
    /// the outlier filter. A positive `delta` (we're behind) runs `delta`
    /// extra `update()`s immediately, the same burst-catch-up every dirty
    /// rollback already performs. A negative `delta` (we're ahead) can't
    /// un-simulate frames already committed, so it banks the debt and
    /// `update()` pays it down by skipping that many future ticks instead
    /// of advancing -- the TSS falls `delta` frames behind in real time
    /// until the debt is paid, converging on the peer's frame either way.
    pub fn apply_frame_delta(&mut self, delta: i64) {
        if delta > 0 {
            for _ in 0..delta {
                self.update();
            }
        } else if delta < 0 {
            self.skip_frames += -delta;
        }
    }

    /// Suppresses further `update()`s until re-seeded via `depacketize`.
    pub fn invalidate(&mut self) {
        info!(trailing_frame = self.trailing_frame(), "invalidating TSS, waiting for snapshot");
        self.state = TssState::WaitingForSync;
    }

    pub fn dispose(&mut self) {
        self.state = TssState::Disposed;
    }

    pub fn hash(&self, hasher: &mut StateHasher) {
        self.trailing().hash(hasher);
    }

    /// `i64 current_frame, i64 trailing_frame, u32 delays_count, u32
    /// delays[], <trailing simulation state>, u32 pending_command_count,
    /// <commands>`.
    pub fn packetize(&self, packet: &mut Packet) {
        packet.write_i64(self.current_frame());
        packet.write_i64(self.trailing_frame());
        packet.write_u32(self.delays.len() as u32);
        for delay in &self.delays {
            packet.write_u32(*delay as u32);
        }
        self.trailing().packetize(packet);
        packet.write_u32(self.command_log.len() as u32);
        for command in &self.command_log {
            command.packetize(packet);
        }
    }

    /// Reconstructs the whole TSS from a trailing snapshot plus delta
    /// commands: depacketizes the trailing simulation, then rebuilds every
    /// other simulation by copying the trailing state and replaying
    /// forward to its own delay.
    pub fn depacketize(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
        let leading_frame = packet.read_i64()?;
        let trailing_frame = packet.read_i64()?;
        let delays_count = packet.read_u32()?;
        let mut delays = Vec::with_capacity(delays_count as usize);
        for _ in 0..delays_count {
            delays.push(packet.read_u32()? as i64);
        }

        let trailing_idx = self.sims.len() - 1;
        self.sims[trailing_idx].depacketize(packet)?;
        debug_assert_eq!(self.sims[trailing_idx].current_frame(), trailing_frame);

        self.command_log.clear();
        let pending = packet.read_u32()?;
        for _ in 0..pending {
            self.command_log.push(Command::depacketize(packet)?);
        }

        for i in (0..trailing_idx).rev() {
            let (left, right) = self.sims.split_at_mut(i + 1);
            right[trailing_idx - i - 1].copy_into(&mut left[i]);
            let target = leading_frame - delays.get(i).copied().unwrap_or(0);
            for command in self.command_log.iter().filter(|c| c.frame > self.sims[i].current_frame()) {
                let _ = self.sims[i].push_command(command.clone());
            }
            while self.sims[i].current_frame() < target {
                self.sims[i].update();
            }
        }

        self.delays = delays;
        self.dirty = vec![None; self.sims.len()];
        self.state = TssState::Ready;
        info!(leading_frame, trailing_frame, "TSS re-seeded from snapshot");
        Ok(())
    }
}
