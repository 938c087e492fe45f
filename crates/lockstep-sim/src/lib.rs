pub mod command;
pub mod error;
pub mod replay;
pub mod simulation;
pub mod systems;
pub mod tss;

pub mod prelude {
    pub use crate::command::{tie_break_sort_key, Command, CommandPayload};
    pub use crate::error::{SimulationError, TssError};
    pub use crate::replay::{replay_commands, ReplayResult};
    pub use crate::simulation::{ApplyReport, Simulation, MAX_FUTURE_LEAD, MAX_PAST_DELAY};
    pub use crate::systems::{register_reference_systems, ExpirationSystem, IndexSystem, TranslationSystem};
    pub use crate::tss::{PushOutcome, Tss, TssState};
}
