// src/core/config_loader.rs

//! # Config Loader
//!
//! Reads `grails-runner.toml` and merges it with command line overrides into the
//! three things a build needs: the [`BuildConfig`], the build variables and the
//! installation registry.

use crate::{
    constants::CONFIG_FILENAME,
    core::installation::StaticRegistry,
    models::{BuildConfig, BuildVariables, RunnerConfigFile},
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why the configuration file could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file '{}' not found.", .0.display())]
    NotFound(PathBuf),
    /// The file exists but could not be read.
    #[error("Failed to read configuration file '{}': {source}", .path.display())]
    Read {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O failure.
        source: io::Error,
    },
    /// The file is not valid TOML or has unknown keys.
    #[error("Failed to parse configuration file '{}': {source}", .path.display())]
    Parse {
        /// The configuration file.
        path: PathBuf,
        /// The TOML error.
        source: toml::de::Error,
    },
}

/// A fully merged configuration, ready to hand to the orchestrator.
#[derive(Debug)]
pub struct RunnerConfig {
    /// Build options, command line over file.
    pub build: BuildConfig,
    /// File variables followed by `-D` defines.
    pub build_variables: BuildVariables,
    /// The configured installations.
    pub registry: StaticRegistry,
}

/// Loads the configuration file.
///
/// With an explicit path the file must exist. Otherwise `grails-runner.toml` in
/// `module_root` is used when present, and an empty configuration when not.
pub fn load(explicit: Option<&Path>, module_root: &Path) -> Result<RunnerConfigFile, ConfigError> {
    let path = match explicit {
        Some(path) if !path.is_file() => return Err(ConfigError::NotFound(path.to_path_buf())),
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = module_root.join(CONFIG_FILENAME);
            if !default_path.is_file() {
                log::debug!(
                    "No {} in {}, using an empty configuration.",
                    CONFIG_FILENAME,
                    module_root.display()
                );
                return Ok(RunnerConfigFile::default());
            }
            default_path
        }
    };

    log::debug!("Loading configuration from {}", path.display());
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse(&content, &path)
}

/// Parses the contents of a configuration file; `path` is used for error messages.
pub fn parse(content: &str, path: &Path) -> Result<RunnerConfigFile, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merges the file with overrides from the command line.
///
/// Non-blank override values replace file values and enabled override flags switch
/// the option on. `defines` are appended after the file's variables.
pub fn resolve(
    file: RunnerConfigFile,
    overrides: &BuildConfig,
    defines: &[(String, String)],
) -> RunnerConfig {
    let build = merge(file.build, overrides);

    let mut build_variables: BuildVariables = file.variables.into_iter().collect();
    build_variables.extend(defines.iter().cloned());

    RunnerConfig {
        build,
        build_variables,
        registry: StaticRegistry::new(file.installations),
    }
}

fn merge(base: BuildConfig, overrides: &BuildConfig) -> BuildConfig {
    let pick = |over: &Option<String>, base: Option<String>| match over {
        Some(value) if !value.trim().is_empty() => Some(value.clone()),
        _ => base,
    };

    BuildConfig {
        targets: pick(&overrides.targets, base.targets),
        installation: pick(&overrides.installation, base.installation),
        grails_work_dir: pick(&overrides.grails_work_dir, base.grails_work_dir),
        project_work_dir: pick(&overrides.project_work_dir, base.project_work_dir),
        project_base_dir: pick(&overrides.project_base_dir, base.project_base_dir),
        server_port: pick(&overrides.server_port, base.server_port),
        properties: pick(&overrides.properties, base.properties),
        force_upgrade: base.force_upgrade || overrides.force_upgrade,
        non_interactive: base.non_interactive || overrides.non_interactive,
        use_wrapper: base.use_wrapper || overrides.use_wrapper,
        plain_output: base.plain_output || overrides.plain_output,
        stack_trace: base.stack_trace || overrides.stack_trace,
        verbose: base.verbose || overrides.verbose,
        refresh_dependencies: base.refresh_dependencies || overrides.refresh_dependencies,
        make_executable: base.make_executable || overrides.make_executable,
    }
}
