#![deny(unreachable_pub)]
//! Two-sided grid market making for StandX perpetuals
//!
//! - [`grid`] - the engine: ledger, bands, reconciliation and the strategy loop
//! - [`standx`] - REST gateway to the venue
//! - [`notify`] - operator notifications
//! - [`config`] - file and environment settings
//! - [`runner`] - process wiring, one worker per instrument

pub mod config;
pub mod grid;
pub mod notify;
pub mod runner;
pub mod standx;

pub use config::Settings;
pub use runner::BotRunner;
