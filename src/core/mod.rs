// src/core/mod.rs

//! The build engine: configuration, argument assembly and orchestration.

pub mod arguments;
pub mod classifier;
pub mod config_loader;
pub mod installation;
pub mod orchestrator;
pub mod target_parser;
pub mod template;
