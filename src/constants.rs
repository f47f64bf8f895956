// src/constants.rs

//! Names, flags and limits shared across the crate.

/// Default name of the configuration file, looked up in the module root.
pub const CONFIG_FILENAME: &str = "grails-runner.toml";

/// Grails launcher name on Unix.
pub const GRAILS_EXECUTABLE: &str = "grails";
/// Grails launcher name on Windows.
pub const GRAILS_EXECUTABLE_WINDOWS: &str = "grails.bat";

/// Project-local wrapper script name on Unix.
pub const WRAPPER_SCRIPT: &str = "grailsw";
/// Project-local wrapper script name on Windows.
pub const WRAPPER_SCRIPT_WINDOWS: &str = "grailsw.bat";

/// Environment variable pointing at the selected installation.
pub const GRAILS_HOME_VAR: &str = "GRAILS_HOME";

/// Search path variable; an installation's `bin` is prepended to it.
pub const PATH_VAR: &str = "PATH";

/// Case-insensitive marker the build tool prints when tests fail.
pub const TESTS_FAILED_MARKER: &str = "tests failed";

/// Number of recent output lines the classifier keeps for look-back.
pub const OUTPUT_WINDOW_CAPACITY: usize = 200;

/// Target prepended when `force-upgrade` is set.
pub const UPGRADE_TARGET: &str = "upgrade";

// Per-target flags, appended in this order.

/// Flag for `non-interactive`.
pub const NON_INTERACTIVE_FLAG: &str = "--non-interactive";
/// Flag for `plain-output`.
pub const PLAIN_OUTPUT_FLAG: &str = "--plain-output";
/// Flag for `stack-trace`.
pub const STACKTRACE_FLAG: &str = "--stacktrace";
/// Flag for `verbose`.
pub const VERBOSE_FLAG: &str = "--verbose";
/// Flag for `refresh-dependencies`.
pub const REFRESH_DEPENDENCIES_FLAG: &str = "--refresh-dependencies";

/// Permission bits applied to the wrapper script with `make-executable`.
pub const WRAPPER_MODE: u32 = 0o744;
