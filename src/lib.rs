//! Runs Grails build targets from a small declarative configuration and
//! classifies the tool's output into a success, unstable or failure verdict.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag set on interrupt; running processes are killed once it is true.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod dev_utils;
pub mod models;
pub mod state;
pub mod system;
