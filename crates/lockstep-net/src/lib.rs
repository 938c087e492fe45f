pub mod config;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod session;

pub mod prelude {
    pub use crate::config::ControllerConfig;
    pub use crate::controller::{ClientController, ServerController};
    pub use crate::error::ProtocolError;
    pub use crate::protocol::TssMessage;
    pub use crate::session::{PlayerId, Session, SessionEvent};
}
