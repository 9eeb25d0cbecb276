//! `censo-stats` library crate.
//!
//! The binary (`censo`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., future services, notebooks, etc.)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod dictionary;
pub mod domain;
pub mod error;
pub mod io;
pub mod report;
pub mod sanitize;
pub mod schema;
pub mod stats;
