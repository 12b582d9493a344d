//! Attimo: track open items across user-defined categories.
//!
//! The database engine lives in `attimo_db`; this crate adds configuration
//! and the [`control::Controller`] facade used by the CLI.

pub mod config;
pub mod control;

pub use config::AttimoConfig;
pub use control::{Controller, ListRowsOptions, ListRowsResult};
