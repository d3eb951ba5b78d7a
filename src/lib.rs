//! nettune - network and system tuning for Windows.
//!
//! Each tuning module reads a setting, writes the new value, reads it back
//! and reports. The TUI in `app`/`ui` drives the modules through
//! `orchestrator`.

pub mod app;
pub mod backup;
pub mod config;
pub mod error;
pub mod logging;
pub mod modules;
pub mod orchestrator;
pub mod report;
pub mod system;
pub mod ui;

pub use error::{Result, TuneError};
