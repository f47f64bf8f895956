// src/core/installation.rs

//! Grails installations: the registry, home validation and executable selection.

use crate::{
    constants::{
        GRAILS_EXECUTABLE, GRAILS_EXECUTABLE_WINDOWS, GRAILS_HOME_VAR, PATH_VAR, WRAPPER_MODE,
        WRAPPER_SCRIPT, WRAPPER_SCRIPT_WINDOWS,
    },
    models::{BuildConfig, EnvVars, Platform, non_blank},
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why an installation home looks unusable.
#[derive(Error, Debug)]
pub enum InstallationError {
    /// The home is missing or not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    /// The home has no `bin/grails` launcher.
    #[error("{0} doesn't look like a Grails directory")]
    NotAGrailsHome(PathBuf),
}

/// A Grails installation translated for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledExecutable {
    /// The installation home, exported as `GRAILS_HOME`.
    pub home: PathBuf,
    /// The launcher inside `home`.
    pub path: PathBuf,
}

/// Read-only lookup of configured Grails installations.
pub trait InstallationRegistry {
    /// Looks up an installation by name, expanding its home against `env`.
    /// Returns `None` when no installation has that name.
    fn resolve_executable(
        &self,
        name: &str,
        env: &EnvVars,
        platform: Platform,
    ) -> Option<InstalledExecutable>;
}

/// Registry backed by a fixed name-to-home table, e.g. from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    homes: HashMap<String, String>,
}

impl StaticRegistry {
    /// A registry over installation name to home directory.
    pub fn new(homes: HashMap<String, String>) -> Self {
        Self { homes }
    }
}

impl InstallationRegistry for StaticRegistry {
    fn resolve_executable(
        &self,
        name: &str,
        env: &EnvVars,
        platform: Platform,
    ) -> Option<InstalledExecutable> {
        let template = self.homes.get(name)?;
        let home = PathBuf::from(expand_home(template, env));
        if let Err(e) = validate_home(&home) {
            log::warn!("Installation '{}': {}", name, e);
        }
        let path = executable_in_home(&home, platform);
        Some(InstalledExecutable { home, path })
    }
}

/// Expands `~`, `$VAR` and `${VAR}` in an installation home. Unknown variables are
/// left as typed.
fn expand_home(template: &str, env: &EnvVars) -> String {
    shellexpand::full_with_context_no_errors(
        template,
        || dirs::home_dir().map(|p| p.to_string_lossy().into_owned()),
        |name| env.get(name).cloned(),
    )
    .into_owned()
}

/// Checks that `home` is a directory containing `bin/grails` or `bin/grails.bat`.
pub fn validate_home(home: &Path) -> Result<(), InstallationError> {
    if !home.is_dir() {
        return Err(InstallationError::NotADirectory(home.to_path_buf()));
    }
    let bin = home.join("bin");
    if !bin.join(GRAILS_EXECUTABLE).exists() && !bin.join(GRAILS_EXECUTABLE_WINDOWS).exists() {
        return Err(InstallationError::NotAGrailsHome(home.to_path_buf()));
    }
    Ok(())
}

/// Path of the platform's launcher under `home/bin`.
pub fn executable_in_home(home: &Path, platform: Platform) -> PathBuf {
    home.join("bin").join(match platform {
        Platform::Unix => GRAILS_EXECUTABLE,
        Platform::Windows => GRAILS_EXECUTABLE_WINDOWS,
    })
}

// --- EXECUTABLE SELECTION ---

/// How the build tool is invoked for this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executable {
    /// A bare command name, found through `PATH` at launch time.
    Command(String),
    /// The launcher of a configured installation.
    Installed(InstalledExecutable),
    /// The project-local wrapper script.
    Wrapper(PathBuf),
}

impl Executable {
    /// The first element of the argument vector.
    pub fn program(&self) -> String {
        match self {
            Self::Command(name) => name.clone(),
            Self::Installed(installed) => installed.path.to_string_lossy().into_owned(),
            Self::Wrapper(path) => path.to_string_lossy().into_owned(),
        }
    }

    /// The path of a file-backed executable that does not exist (right now).
    pub fn missing_path(&self) -> Option<&Path> {
        let path = match self {
            Self::Command(_) => return None,
            Self::Installed(installed) => installed.path.as_path(),
            Self::Wrapper(path) => path.as_path(),
        };
        (!path.exists()).then_some(path)
    }
}

/// Picks the executable: the wrapper script in wrapper mode, else the named
/// installation, else the bare command for the platform.
pub fn select_executable(
    config: &BuildConfig,
    registry: &dyn InstallationRegistry,
    env: &EnvVars,
    work_dir: &Path,
    platform: Platform,
) -> Executable {
    if config.use_wrapper {
        let script = match platform {
            Platform::Unix => WRAPPER_SCRIPT,
            Platform::Windows => WRAPPER_SCRIPT_WINDOWS,
        };
        return Executable::Wrapper(work_dir.join(script));
    }

    if let Some(name) = non_blank(&config.installation) {
        match registry.resolve_executable(name, env, platform) {
            Some(installed) => return Executable::Installed(installed),
            None => log::warn!(
                "Grails installation '{}' is not configured; using the command on PATH.",
                name
            ),
        }
    }

    Executable::Command(
        match platform {
            Platform::Unix => GRAILS_EXECUTABLE,
            Platform::Windows => GRAILS_EXECUTABLE_WINDOWS,
        }
        .to_string(),
    )
}

/// Sets the wrapper script's permission bits so it can be launched.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(WRAPPER_MODE))
}

#[cfg(not(unix))]
pub fn make_executable(path: &Path) -> io::Result<()> {
    log::debug!(
        "Ignoring make-executable for {} (mode {:o}) on this platform.",
        path.display(),
        WRAPPER_MODE
    );
    Ok(())
}

// --- ENVIRONMENT ---

/// Builds the environment of the launched process.
///
/// Starts from the host environment with the build variables laid over it. When an
/// installation is used, `GRAILS_HOME` points at its home and its `bin` directory is
/// prepended to `PATH`.
pub fn resolve_environment(base: &EnvVars, executable: &Executable, platform: Platform) -> EnvVars {
    let mut env = base.clone();
    if let Executable::Installed(installed) = executable {
        env.insert(
            GRAILS_HOME_VAR.to_string(),
            installed.home.to_string_lossy().into_owned(),
        );
        prepend_path(&mut env, &installed.home.join("bin"), platform);
    }
    env
}

fn prepend_path(env: &mut EnvVars, dir: &Path, platform: Platform) {
    let key = env
        .keys()
        .find(|k| match platform {
            Platform::Windows => k.eq_ignore_ascii_case(PATH_VAR),
            Platform::Unix => k.as_str() == PATH_VAR,
        })
        .cloned()
        .unwrap_or_else(|| PATH_VAR.to_string());

    let dir = dir.to_string_lossy();
    let value = match env.get(&key).filter(|v| !v.is_empty()) {
        Some(existing) => format!("{}{}{}", dir, platform.path_separator(), existing),
        None => dir.into_owned(),
    };
    env.insert(key, value);
}
