//! Controller variants: the stateful glue between a [`Tss`][lockstep_sim::tss::Tss]
//! and an external [`Session`][crate::session::Session].

pub mod client;
pub mod common;
pub mod server;

pub use client::ClientController;
pub use common::{drive_ticks, Pacing};
pub use server::ServerController;
