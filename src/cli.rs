// src/cli.rs

//! Command line interface of the `grails-runner` binary.

use crate::models::{BuildConfig, Charset};
use clap::Parser;
use std::path::PathBuf;

/// grails-runner: runs Grails build targets and reports SUCCESS, UNSTABLE or FAILURE.
///
/// Options are read from `grails-runner.toml` in the module root (or `--config`)
/// and can be overridden from the command line.
///
/// Exit codes: 0 on success, 3 when tests failed, 1 on any other failure, 130 when
/// interrupted.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Targets to run, e.g. `clean "test-app -unit" war`.
    #[arg(short, long)]
    pub targets: Option<String>,

    /// Name of a Grails installation from the `[installations]` table.
    #[arg(short, long)]
    pub installation: Option<String>,

    /// Value of `grails.work.dir` (default: `<workspace>/target`).
    #[arg(long)]
    pub grails_work_dir: Option<String>,

    /// Value of `grails.project.work.dir`.
    #[arg(long)]
    pub project_work_dir: Option<String>,

    /// Project directory, relative to the module root.
    #[arg(long)]
    pub project_base_dir: Option<String>,

    /// Value of `server.port`.
    #[arg(long)]
    pub server_port: Option<String>,

    /// Newline-separated `key=value` system properties.
    #[arg(long)]
    pub properties: Option<String>,

    /// Build variable passed as `-DKEY=VALUE` and visible to templates. Repeatable.
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_define)]
    pub defines: Vec<(String, String)>,

    /// Run `upgrade --non-interactive` before the targets.
    #[arg(long)]
    pub force_upgrade: bool,

    /// Pass `--non-interactive` to every target.
    #[arg(long)]
    pub non_interactive: bool,

    /// Use the project's `grailsw` wrapper instead of an installation.
    #[arg(long)]
    pub use_wrapper: bool,

    /// Pass `--plain-output` to every target.
    #[arg(long)]
    pub plain_output: bool,

    /// Pass `--stacktrace` to every target.
    #[arg(long)]
    pub stack_trace: bool,

    /// Pass `--verbose` to every target.
    #[arg(long)]
    pub verbose: bool,

    /// Pass `--refresh-dependencies` to every target.
    #[arg(long)]
    pub refresh_dependencies: bool,

    /// Set the executable bit on the wrapper script before running it.
    #[arg(long)]
    pub make_executable: bool,

    /// Build workspace (default: current directory).
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Root of the checked-out module (default: current directory).
    #[arg(long)]
    pub module_root: Option<PathBuf>,

    /// Character set of the tool's output.
    #[arg(long, default_value = "utf-8", value_parser = parse_charset)]
    pub charset: Charset,

    /// Configuration file to use instead of `<module-root>/grails-runner.toml`.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// The build options given on the command line, to lay over the file's.
    pub fn overrides(&self) -> BuildConfig {
        BuildConfig {
            targets: self.targets.clone(),
            installation: self.installation.clone(),
            grails_work_dir: self.grails_work_dir.clone(),
            project_work_dir: self.project_work_dir.clone(),
            project_base_dir: self.project_base_dir.clone(),
            server_port: self.server_port.clone(),
            properties: self.properties.clone(),
            force_upgrade: self.force_upgrade,
            non_interactive: self.non_interactive,
            use_wrapper: self.use_wrapper,
            plain_output: self.plain_output,
            stack_trace: self.stack_trace,
            verbose: self.verbose,
            refresh_dependencies: self.refresh_dependencies,
            make_executable: self.make_executable,
        }
    }
}

fn parse_define(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => Ok((key.trim().to_string(), val.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", value)),
    }
}

fn parse_charset(value: &str) -> Result<Charset, String> {
    Charset::from_label(value).ok_or_else(|| format!("unsupported charset '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_and_defines() {
        let cli = Cli::try_parse_from([
            "grails-runner",
            "-t",
            "clean \"test-app -unit\"",
            "-DBUILD_NUMBER=7",
            "-D",
            "url=http://host/?a=b",
            "--non-interactive",
            "--charset",
            "ISO-8859-1",
        ])
        .unwrap();

        assert_eq!(cli.targets.as_deref(), Some("clean \"test-app -unit\""));
        assert_eq!(
            cli.defines,
            vec![
                ("BUILD_NUMBER".to_string(), "7".to_string()),
                ("url".to_string(), "http://host/?a=b".to_string()),
            ]
        );
        assert_eq!(cli.charset, Charset::Latin1);

        let overrides = cli.overrides();
        assert!(overrides.non_interactive);
        assert!(!overrides.verbose);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["grails-runner"]).unwrap();
        assert_eq!(cli.charset, Charset::Utf8);
        assert!(cli.defines.is_empty());
        assert_eq!(cli.overrides(), BuildConfig::default());
    }

    #[test]
    fn test_malformed_define_and_charset_are_rejected() {
        assert!(Cli::try_parse_from(["grails-runner", "-D", "NOVALUE"]).is_err());
        assert!(Cli::try_parse_from(["grails-runner", "-D", "=x"]).is_err());
        assert!(Cli::try_parse_from(["grails-runner", "--charset", "ebcdic"]).is_err());
    }
}
