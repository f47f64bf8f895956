// src/core/arguments.rs

//! # Argument Assembler
//!
//! Builds the argument vector of one target. The order of the steps is the contract
//! with the build tool and must not change:
//!
//! 1. the executable,
//! 2. `-D` defines for the host build variables,
//! 3. `-D` defines for the computed system properties (work dirs, server port),
//! 4. `-D` defines from the free-form properties string,
//! 5. the target name,
//! 6. the target's extra arguments followed by the enabled option flags,
//! 7. on Windows, the whole vector wrapped into a single `cmd.exe` command line.
//!
//! Every step is a pure function returning its own ordered slice of the vector.

use crate::{
    constants::{
        NON_INTERACTIVE_FLAG, PLAIN_OUTPUT_FLAG, REFRESH_DEPENDENCIES_FLAG, STACKTRACE_FLAG,
        VERBOSE_FLAG,
    },
    core::{
        installation::Executable,
        template::{self, substitute_variables},
    },
    models::{BuildConfig, EnvVars, Platform, TargetSpec, non_blank},
    system::shell,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why an argument vector could not be assembled.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// The resolved launcher or wrapper script is not on disk.
    #[error("{} doesn't exist", .0.display())]
    ExecutableMissing(PathBuf),
    /// Setting the wrapper script's permission bits failed.
    #[error("could not make {} executable: {source}", .path.display())]
    MakeExecutable {
        /// The wrapper script.
        path: PathBuf,
        /// The underlying I/O failure.
        source: std::io::Error,
    },
}

/// Formats a `-Dkey=value` define.
fn define(key: &str, value: &str) -> String {
    format!("-D{}={}", key, value)
}

// --- STEP 1 ---

/// The executable, failing when a file-backed executable does not exist.
pub fn executable_args(executable: &Executable) -> Result<Vec<String>, AssemblyError> {
    if let Some(missing) = executable.missing_path() {
        return Err(AssemblyError::ExecutableMissing(missing.to_path_buf()));
    }
    Ok(vec![executable.program()])
}

// --- STEP 2 ---

/// One `-Dkey=value` per build variable, in order.
pub fn build_variable_defines(build_variables: &[(String, String)]) -> Vec<String> {
    build_variables
        .iter()
        .map(|(key, value)| define(key, value))
        .collect()
}

// --- STEP 3 ---

/// Defines for `grails.work.dir`, `grails.project.work.dir` and `server.port`.
///
/// Overrides are evaluated as templates. `grails.work.dir` defaults to
/// `<workspace>/target`; the other two are only added when configured.
pub fn system_property_defines(
    config: &BuildConfig,
    env: &EnvVars,
    workspace: &Path,
) -> Vec<String> {
    let grails_work_dir = match non_blank(&config.grails_work_dir) {
        Some(dir) => template::evaluate(env, dir),
        None => workspace.join("target").to_string_lossy().into_owned(),
    };

    let mut defines = vec![define("grails.work.dir", &grails_work_dir)];
    if let Some(dir) = non_blank(&config.project_work_dir) {
        defines.push(define("grails.project.work.dir", &template::evaluate(env, dir)));
    }
    if let Some(port) = non_blank(&config.server_port) {
        defines.push(define("server.port", &template::evaluate(env, port)));
    }
    defines
}

// --- STEP 4 ---

/// Defines parsed from the newline-separated `key=value` properties string, in order.
///
/// Build variables are substituted first, then each value is evaluated as a template.
pub fn property_defines(
    properties: &str,
    env: &EnvVars,
    build_variables: &[(String, String)],
) -> Vec<String> {
    let resolved = substitute_variables(properties, |name| {
        build_variables
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    });

    resolved
        .lines()
        .filter_map(parse_property_line)
        .map(|(key, value)| define(key, &template::evaluate(env, value)))
        .collect()
}

/// Splits a property line on its first `=` or `:`. Blank lines and `#`/`!` comments
/// are skipped silently; lines without a key are skipped with a warning.
fn parse_property_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }

    let Some(separator) = line.find(|c: char| c == '=' || c == ':') else {
        log::warn!("Ignoring property line without '=': '{}'", line);
        return None;
    };
    let (key, value) = line.split_at(separator);
    let key = key.trim();
    if key.is_empty() {
        log::warn!("Ignoring property line without a key: '{}'", line);
        return None;
    }
    Some((key, value.get(1..).unwrap_or("").trim()))
}

// --- STEPS 5 & 6 ---

/// The option flags in their fixed order, each with whether it is enabled.
fn option_flags(config: &BuildConfig) -> [(&'static str, bool); 5] {
    [
        (NON_INTERACTIVE_FLAG, config.non_interactive),
        (PLAIN_OUTPUT_FLAG, config.plain_output),
        (STACKTRACE_FLAG, config.stack_trace),
        (VERBOSE_FLAG, config.verbose),
        (REFRESH_DEPENDENCIES_FLAG, config.refresh_dependencies),
    ]
}

/// The target's evaluated extra arguments, then every enabled option flag.
///
/// Nothing already present in `accumulated` (or added earlier by this step) is
/// appended twice, so a flag the user typed after the target is not repeated.
pub fn option_args(
    config: &BuildConfig,
    env: &EnvVars,
    extra_args: &[String],
    accumulated: &[String],
) -> Vec<String> {
    let mut added: Vec<String> = Vec::new();
    let present = |added: &[String], arg: &str| {
        accumulated.iter().chain(added.iter()).any(|a| a == arg)
    };

    for arg in extra_args {
        let evaluated = template::evaluate(env, arg);
        if !present(&added, &evaluated) {
            added.push(evaluated);
        }
    }
    for (flag, enabled) in option_flags(config) {
        if enabled && !present(&added, flag) {
            added.push(flag.to_string());
        }
    }
    added
}

// --- STEP 7 ---

/// Wraps the argument vector in `cmd.exe /C` on Windows.
pub fn platform_command(args: Vec<String>, platform: Platform) -> Vec<String> {
    match platform {
        Platform::Unix => args,
        Platform::Windows => shell::to_windows_command(&args),
    }
}

// --- COMPOSITION ---

/// Assembles the complete argument vector for one target.
pub fn assemble(
    config: &BuildConfig,
    env: &EnvVars,
    build_variables: &[(String, String)],
    workspace: &Path,
    executable: &Executable,
    target: &TargetSpec,
    platform: Platform,
) -> Result<Vec<String>, AssemblyError> {
    let mut args = executable_args(executable)?;
    args.extend(build_variable_defines(build_variables));
    args.extend(system_property_defines(config, env, workspace));
    if let Some(properties) = config.properties.as_deref() {
        args.extend(property_defines(properties, env, build_variables));
    }
    args.push(target.name.clone());
    let options = option_args(config, env, &target.args, &args);
    args.extend(options);

    log::debug!("Assembled arguments for '{}': {:?}", target.name, args);
    Ok(platform_command(args, platform))
}
