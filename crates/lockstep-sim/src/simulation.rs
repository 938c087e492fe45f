//! The [`Simulation`] façade: a Manager plus a frame counter plus a
//! per-frame command log.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::warn;

use lockstep_ecs::hash::StateHasher;
use lockstep_ecs::manager::Manager;
use lockstep_ecs::packet::{Packet, PacketError};

use crate::command::{tie_break_sort_key, Command};
use crate::error::SimulationError;

/// Summary of the command application phase of the most recent `update()`.
/// Purely observational: it never affects `hash()` or `packetize()`
/// output. `conflict_count` counts `(entity, component)` pairs targeted by
/// more than one command in the same frame (last write wins by tie-break
/// order); `success_count` is how many commands were applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub conflict_count: usize,
    pub success_count: usize,
}

/// How far behind `current_frame` a command may target before it is
/// rejected as too old. TSS applies its own, window-specific policy on
/// top of this (commands older than the trailing frame), but a bare
/// Simulation uses this constant directly.
pub const MAX_PAST_DELAY: i64 = 500;

/// How far ahead of `current_frame` a command may target.
pub const MAX_FUTURE_LEAD: i64 = 50;

/// A Manager, its frame counter, and the per-frame command log that feeds
/// it. `update()` advances the frame by exactly one and applies whatever
/// commands were scheduled for the new frame before running systems.
#[derive(Debug)]
pub struct Simulation {
    manager: Manager,
    current_frame: i64,
    /// Per-frame log, deduplicated by `(player_number, frame, payload_hash)`.
    log: BTreeMap<i64, Vec<Command>>,
    seen: HashSet<(i32, i64, u64)>,
    /// Function that interprets a command's payload as Manager mutations.
    /// Kept as a plain fn pointer (not a trait object) since it has no
    /// state of its own and every Simulation in a process applies commands
    /// identically.
    apply_payload: fn(&Command, &mut Manager),
    last_apply_report: ApplyReport,
}

impl Simulation {
    pub fn new(manager: Manager, apply_payload: fn(&Command, &mut Manager)) -> Self {
        Self::new_at_frame(manager, apply_payload, 0)
    }

    /// Builds a Simulation whose frame counter starts at `start_frame`
    /// rather than 0. Used by the TSS to seed a trailing simulation's
    /// constant negative offset behind the leading one, since
    /// `current_frame` only ever increases once a Simulation exists.
    pub fn new_at_frame(manager: Manager, apply_payload: fn(&Command, &mut Manager), start_frame: i64) -> Self {
        Self {
            manager,
            current_frame: start_frame,
            log: BTreeMap::new(),
            seen: HashSet::new(),
            apply_payload,
            last_apply_report: ApplyReport::default(),
        }
    }

    pub fn current_frame(&self) -> i64 {
        self.current_frame
    }

    /// Conflict/success counts from the command-application phase of the
    /// most recent `update()`.
    pub fn last_apply_report(&self) -> ApplyReport {
        self.last_apply_report
    }

    /// Per-system wall-clock timing from the most recent `update()`,
    /// forwarded from the underlying Manager. Feeds the controller's load
    /// estimator via `FrameDiagnostics::total_time`; purely observational
    /// otherwise.
    pub fn last_diagnostics(&self) -> &lockstep_ecs::manager::FrameDiagnostics {
        self.manager.last_diagnostics()
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut Manager {
        &mut self.manager
    }

    /// Inserts `command` into the per-frame log, in insertion order,
    /// deduplicated by `(player_number, frame, payload_hash)`. Rejects
    /// commands outside `[current_frame - MAX_PAST_DELAY, current_frame +
    /// MAX_FUTURE_LEAD]`.
    pub fn push_command(&mut self, command: Command) -> Result<(), SimulationError> {
        if command.frame <= self.current_frame - MAX_PAST_DELAY {
            warn!(frame = command.frame, current_frame = self.current_frame, "command too old");
            return Err(SimulationError::CommandTooOld {
                frame: command.frame,
                current_frame: self.current_frame,
            });
        }
        if command.frame > self.current_frame + MAX_FUTURE_LEAD {
            warn!(frame = command.frame, current_frame = self.current_frame, "command too future");
            return Err(SimulationError::CommandTooFuture {
                frame: command.frame,
                current_frame: self.current_frame,
            });
        }

        if !self.seen.insert(command.dedup_key()) {
            return Ok(());
        }
        self.log.entry(command.frame).or_default().push(command);
        Ok(())
    }

    /// Retains only commands whose frame is still `>= floor`, discarding
    /// the rest. Called by the owning TSS after each `update()` with the
    /// trailing simulation's current frame as `floor`, since nothing older
    /// than that can ever be replayed again.
    pub fn trim_log_below(&mut self, floor: i64) {
        self.log.retain(|frame, _| *frame >= floor);
        self.seen.retain(|(_, frame, _)| *frame >= floor);
    }

    /// Advances `current_frame` by one, applies any commands scheduled for
    /// the new frame (in tie-break order: player number ascending, then
    /// insertion order), runs every system, then flushes messages.
    pub fn update(&mut self) {
        self.current_frame += 1;
        if let Some(mut due) = self.log.remove(&self.current_frame) {
            due.sort_by_key(tie_break_sort_key);
            self.last_apply_report = apply_report_for(&due);
            for command in &due {
                (self.apply_payload)(command, &mut self.manager);
            }
            // Commands at this frame are replayed verbatim on every
            // roll-forward, so keep them in the log rather than consuming
            // them; `trim_log_below` is the only thing that discards them.
            self.log.insert(self.current_frame, due);
        } else {
            self.last_apply_report = ApplyReport::default();
        }
        self.manager.update(self.current_frame);
    }

    pub fn hash(&self, hasher: &mut StateHasher) {
        hasher.write_i64(self.current_frame);
        self.manager.hash(hasher);
    }

    pub fn packetize(&self, packet: &mut Packet) {
        packet.write_i64(self.current_frame);
        self.manager.packetize(packet);
        let pending: Vec<&Command> = self.log.values().flatten().collect();
        packet.write_u32(pending.len() as u32);
        for command in pending {
            command.packetize(packet);
        }
    }

    pub fn depacketize(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
        self.current_frame = packet.read_i64()?;
        self.manager.depacketize(packet)?;
        self.log.clear();
        self.seen.clear();
        let count = packet.read_u32()?;
        for _ in 0..count {
            let command = Command::depacketize(packet)?;
            self.seen.insert(command.dedup_key());
            self.log.entry(command.frame).or_default().push(command);
        }
        Ok(())
    }

    /// Deep-copies Manager, frame counter, and command log into `other`.
    pub fn copy_into(&self, other: &mut Simulation) {
        self.manager.copy_into(&mut other.manager);
        other.current_frame = self.current_frame;
        other.log = self.log.clone();
        other.seen = self.seen.clone();
        other.last_apply_report = self.last_apply_report;
    }
}

/// Counts `(entity, component)` targets hit by more than one command in
/// `due` and logs each conflict, last-write-wins (the later command in
/// tie-break order overwrites the earlier one simply by applying after
/// it -- this function only reports that it happened).
fn apply_report_for(due: &[Command]) -> ApplyReport {
    let mut seen: HashMap<_, usize> = HashMap::new();
    for command in due {
        if let Some(target) = command.payload.conflict_target() {
            *seen.entry(target).or_insert(0) += 1;
        }
    }
    let conflict_count = seen.values().filter(|&&count| count > 1).count();
    for ((entity, component), count) in seen.iter().filter(|(_, &count)| count > 1) {
        warn!(?entity, ?component, count, "conflicting commands target the same component this frame, last write wins");
    }
    ApplyReport {
        conflict_count,
        success_count: due.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandPayload;
    use crate::systems::register_reference_systems;

    fn apply(command: &Command, manager: &mut Manager) {
        use lockstep_ecs::component::ComponentKind;
        match &command.payload {
            CommandPayload::SpawnEntity { position, velocity } => {
                let entity = manager.add_entity();
                manager.add_component(
                    entity,
                    ComponentKind::Position(lockstep_ecs::component::Position {
                        x: position.0,
                        y: position.1,
                    }),
                );
                manager.add_component(
                    entity,
                    ComponentKind::Velocity(lockstep_ecs::component::Velocity {
                        dx: velocity.0,
                        dy: velocity.1,
                    }),
                );
            }
            CommandPayload::SetVelocity { entity, dx, dy } => {
                if let Some(id) = manager.get_component(*entity, lockstep_ecs::component::ComponentTag::Velocity) {
                    if let Some(record) = manager.component_record_mut(id) {
                        if let ComponentKind::Velocity(v) = &mut record.kind {
                            v.dx = *dx;
                            v.dy = *dy;
                        }
                    }
                }
            }
            CommandPayload::SetPosition { entity, x, y } => {
                if let Some(id) = manager.get_component(*entity, lockstep_ecs::component::ComponentTag::Position) {
                    if let Some(record) = manager.component_record_mut(id) {
                        if let ComponentKind::Position(p) = &mut record.kind {
                            p.x = *x;
                            p.y = *y;
                        }
                    }
                }
            }
            CommandPayload::RemoveEntity { entity } => manager.remove_entity(*entity),
        }
    }

    fn fresh() -> Simulation {
        let mut manager = Manager::new();
        register_reference_systems(&mut manager);
        Simulation::new(manager, apply)
    }

    #[test]
    fn push_command_rejects_out_of_window() {
        let mut sim = fresh();
        for _ in 0..600 {
            sim.update();
        }
        let too_old = Command::new(1, sim.current_frame() - MAX_PAST_DELAY, 1, CommandPayload::RemoveEntity { entity: lockstep_ecs::entity::EntityId::from_raw(1) });
        assert!(matches!(sim.push_command(too_old), Err(SimulationError::CommandTooOld { .. })));

        let too_future = Command::new(1, sim.current_frame() + MAX_FUTURE_LEAD + 1, 1, CommandPayload::RemoveEntity { entity: lockstep_ecs::entity::EntityId::from_raw(1) });
        assert!(matches!(sim.push_command(too_future), Err(SimulationError::CommandTooFuture { .. })));
    }

    #[test]
    fn duplicate_command_does_not_change_hash() {
        let mut a = fresh();
        let mut b = fresh();
        let command = Command::new(1, 1, 1, CommandPayload::SpawnEntity { position: (0.0, 0.0), velocity: (1.0, 0.0) });

        a.push_command(command.clone()).unwrap();
        a.push_command(command.clone()).unwrap();

        b.push_command(command).unwrap();

        for _ in 0..5 {
            a.update();
            b.update();
        }

        let mut ha = StateHasher::new();
        a.hash(&mut ha);
        let mut hb = StateHasher::new();
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn conflicting_commands_on_same_target_are_counted_and_last_write_wins() {
        let mut sim = fresh();
        let entity = {
            let e = sim.manager_mut().add_entity();
            sim.manager_mut().add_component(e, ComponentKind::Position(lockstep_ecs::component::Position { x: 0.0, y: 0.0 }));
            e
        };
        let frame = sim.current_frame() + 1;
        sim.push_command(Command::new(1, frame, 1, CommandPayload::SetPosition { entity, x: 1.0, y: 1.0 })).unwrap();
        sim.push_command(Command::new(2, frame, 2, CommandPayload::SetPosition { entity, x: 9.0, y: 9.0 })).unwrap();

        sim.update();

        assert_eq!(sim.last_apply_report(), ApplyReport { conflict_count: 1, success_count: 2 });
        let id = sim.manager().get_component(entity, lockstep_ecs::component::ComponentTag::Position).unwrap();
        let ComponentKind::Position(p) = &sim.manager().component_record(id).unwrap().kind else { unreachable!() };
        // Tie-break is player_number ascending, so player 2's write (9,9) applies last.
        assert_eq!((p.x, p.y), (9.0, 9.0));
    }

    #[test]
    fn frame_counter_is_monotone() {
        let mut sim = fresh();
        let mut last = sim.current_frame();
        for _ in 0..10 {
            sim.update();
            assert!(sim.current_frame() > last);
            last = sim.current_frame();
        }
    }
}
