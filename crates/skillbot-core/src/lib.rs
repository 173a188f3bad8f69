//! Core domain + lifecycle logic for the skillbot Discord bot.
//!
//! This crate is intentionally framework-agnostic. The Discord client lives
//! behind ports (traits) implemented in the `skillbot-discord` adapter crate;
//! everything here is exercised against those ports, which keeps the
//! connection supervisor and the background task runner testable without a
//! gateway.

pub mod botlog;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod session;
pub mod supervisor;
pub mod tasks;

pub use errors::{Error, Result};
