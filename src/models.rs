// src/models.rs

//! Data types shared by the build pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// The environment visible to a build: variable name to value.
pub type EnvVars = HashMap<String, String>;

/// Host build variables, passed through as `-D` defines in the order given.
pub type BuildVariables = Vec<(String, String)>;

// --- USER CONFIGURATION ---

/// The declarative options of one Grails build step.
///
/// Constructed once from the configuration file and the command line, never
/// mutated afterwards. String options are "blank" when absent or whitespace-only.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildConfig {
    /// Raw targets specification, e.g. `"test-app -clean" war`.
    pub targets: Option<String>,
    /// Name of the Grails installation to use. `None` means the bare command.
    pub installation: Option<String>,
    /// Value of `grails.work.dir`; defaults to `<workspace>/target`.
    pub grails_work_dir: Option<String>,
    /// Value of `grails.project.work.dir`.
    pub project_work_dir: Option<String>,
    /// Project directory, relative to the module root.
    pub project_base_dir: Option<String>,
    /// Value of `server.port`.
    pub server_port: Option<String>,
    /// Newline-separated `key=value` system properties.
    pub properties: Option<String>,
    /// Run `upgrade --non-interactive` before the targets.
    pub force_upgrade: bool,
    /// Append `--non-interactive` to every target.
    pub non_interactive: bool,
    /// Use the project's `grailsw` wrapper instead of an installation.
    pub use_wrapper: bool,
    /// Append `--plain-output` to every target.
    pub plain_output: bool,
    /// Append `--stacktrace` to every target.
    pub stack_trace: bool,
    /// Append `--verbose` to every target.
    pub verbose: bool,
    /// Append `--refresh-dependencies` to every target.
    pub refresh_dependencies: bool,
    /// Set the executable bit on the wrapper script before running it.
    pub make_executable: bool,
}

/// Returns the trimmed value of an optional string, or `None` when it is blank.
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// --- TARGETS ---

/// One target to run, with the extra arguments typed after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// Target name, e.g. `test-app`.
    pub name: String,
    /// Arguments following the name, in order.
    pub args: Vec<String>,
}

impl TargetSpec {
    /// A target with the given name and arguments.
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The ordered list of targets of one build, consumed once.
pub type TargetInvocation = Vec<TargetSpec>;

// --- PLATFORM & ENCODING ---

/// The platform the external build tool is launched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Any Unix-like system; commands run directly.
    Unix,
    /// Windows; commands run through `cmd.exe /C`.
    Windows,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// Separator between entries of the `PATH` variable.
    pub fn path_separator(self) -> &'static str {
        match self {
            Self::Unix => ":",
            Self::Windows => ";",
        }
    }
}

/// Character set used to decode the build tool's output for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// UTF-8, the default.
    #[default]
    Utf8,
    /// ISO-8859-1.
    Latin1,
    /// US-ASCII.
    Ascii,
}

impl Charset {
    /// Parses a charset label such as `UTF-8` or `ISO-8859-1`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Self::Latin1),
            "us-ascii" | "ascii" => Some(Self::Ascii),
            _ => None,
        }
    }

    /// Decodes bytes to text. Invalid sequences are replaced, never rejected.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Self::Ascii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
        }
    }
}

// --- BUILD CONTEXT & RESULTS ---

/// Everything the host build supplies to one invocation.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Workspace of the build; `<workspace>/target` is the default Grails work dir.
    pub workspace: PathBuf,
    /// Root of the checked-out module; the base of the working directory.
    pub module_root: PathBuf,
    /// Ambient environment of the host build.
    pub environment: EnvVars,
    /// Build variables of the host, passed through as `-D` defines.
    pub build_variables: BuildVariables,
    /// Encoding of the build tool's output.
    pub charset: Charset,
    /// Platform the build tool is launched on.
    pub platform: Platform,
}

/// What one external process launch produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Exit code of the process.
    pub exit_code: i32,
    /// Whether the output contained the failed-tests marker.
    pub tests_failed: bool,
}

/// The verdict for a single target, deciding whether the build goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetVerdict {
    /// The target passed; run the next one.
    Continue,
    /// The target failed with failing tests; stop as unstable.
    Unstable,
    /// The target failed outright; stop as a failure.
    Failed,
}

impl ExecutionOutcome {
    /// Exit code 0 continues; otherwise failed tests make the target unstable.
    pub fn verdict(&self) -> TargetVerdict {
        match (self.exit_code, self.tests_failed) {
            (0, _) => TargetVerdict::Continue,
            (_, true) => TargetVerdict::Unstable,
            (_, false) => TargetVerdict::Failed,
        }
    }
}

/// Terminal result of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    /// Every target passed.
    Success,
    /// A target failed because tests failed.
    Unstable,
    /// A target failed, or the build could not be prepared.
    Failure,
}

impl BuildResult {
    /// Process exit code reported by the command line front end.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Unstable => 3,
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "SUCCESS",
            Self::Unstable => "UNSTABLE",
            Self::Failure => "FAILURE",
        };
        f.write_str(label)
    }
}

// --- CONFIG FILE ---

/// Deserialized structure of a `grails-runner.toml` file.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfigFile {
    /// The `[build]` table.
    pub build: BuildConfig,
    /// Installation name to Grails home directory.
    pub installations: HashMap<String, String>,
    /// Build variables, passed as `-D` defines and visible in `env`.
    pub variables: std::collections::BTreeMap<String, String>,
}
