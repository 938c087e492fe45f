//! Error kinds raised by the Simulation façade and the TSS engine.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum SimulationError {
    #[error("command for frame {frame} is older than the acceptable window (current frame {current_frame})")]
    CommandTooOld { frame: i64, current_frame: i64 },

    #[error("command for frame {frame} is further ahead than the acceptable window (current frame {current_frame})")]
    CommandTooFuture { frame: i64, current_frame: i64 },
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum TssError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("TSS cannot roll forward from its trailing state and must be re-seeded from a snapshot")]
    SimulationInvalidated,
}
