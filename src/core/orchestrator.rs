// src/core/orchestrator.rs

//! # Invocation Orchestrator
//!
//! Drives one build: resolves the environment, the working directory and the
//! executable once, then runs the targets strictly one after another. Each target's
//! output is mirrored to the listener through a [`ClassifyingWriter`], and the exit
//! code together with the tests-failed flag decides whether the next target runs.
//!
//! [`BuildInvoker::perform`] never returns an error. Every fatal path writes a
//! message to the listener and ends the build as [`BuildResult::Failure`].

use crate::{
    core::{
        arguments::{self, AssemblyError},
        classifier::{ClassifyingWriter, TestFailureClassifier},
        installation::{self, Executable, InstallationRegistry},
        target_parser,
    },
    dev_utils::BlockTimer,
    models::{
        BuildConfig, BuildContext, BuildResult, EnvVars, ExecutionOutcome, TargetSpec,
        TargetVerdict, non_blank,
    },
    state::{Invocation, InvocationEvent},
    system::{executor::ProcessLauncher, shell},
};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;

/// Everything resolved once per build, before the first target runs.
#[derive(Debug)]
struct PreparedBuild {
    executable: Executable,
    environment: EnvVars,
    work_dir: PathBuf,
}

/// Runs builds against an installation registry and a process launcher.
pub struct BuildInvoker<'a> {
    registry: &'a dyn InstallationRegistry,
    launcher: &'a dyn ProcessLauncher,
}

impl fmt::Debug for BuildInvoker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildInvoker").finish_non_exhaustive()
    }
}

impl<'a> BuildInvoker<'a> {
    /// An invoker resolving installations in `registry` and launching through `launcher`.
    pub fn new(registry: &'a dyn InstallationRegistry, launcher: &'a dyn ProcessLauncher) -> Self {
        Self { registry, launcher }
    }

    /// Runs every target of `config` and returns the overall result. Build output
    /// and the tool's own output are written to `listener`.
    pub fn perform(
        &self,
        config: &BuildConfig,
        context: &BuildContext,
        listener: &mut (dyn Write + Send),
    ) -> BuildResult {
        let mut invocation = Invocation::new();
        invocation.advance(InvocationEvent::Start);

        let targets = target_parser::targets_to_run(config);
        if targets.is_empty() {
            report(listener, "ERROR: No targets to run!");
            invocation.advance(InvocationEvent::Prepared { targets: 0 });
            return invocation.result().unwrap_or(BuildResult::Failure);
        }

        let prepared = match self.prepare(config, context) {
            Ok(prepared) => prepared,
            Err(e) => {
                report(listener, &format!("FATAL: {}", e));
                invocation.advance(InvocationEvent::Fatal);
                return invocation.result().unwrap_or(BuildResult::Failure);
            }
        };
        invocation.advance(InvocationEvent::Prepared {
            targets: targets.len(),
        });

        while let Some(index) = invocation.current_target() {
            let event = match targets.get(index) {
                Some(target) => self.run_target(config, context, &prepared, target, listener),
                None => InvocationEvent::Fatal,
            };
            invocation.advance(event);
        }

        let result = invocation.result().unwrap_or(BuildResult::Failure);
        log::info!("Build finished: {}", result);
        result
    }

    /// Resolves the environment, the working directory and the executable.
    fn prepare(
        &self,
        config: &BuildConfig,
        context: &BuildContext,
    ) -> Result<PreparedBuild, AssemblyError> {
        let mut base_env = context.environment.clone();
        base_env.extend(context.build_variables.iter().cloned());

        let work_dir = match non_blank(&config.project_base_dir) {
            Some(dir) => context.module_root.join(dir),
            None => context.module_root.clone(),
        };
        log::debug!("Working directory: {}", work_dir.display());

        let executable = installation::select_executable(
            config,
            self.registry,
            &base_env,
            &work_dir,
            context.platform,
        );
        log::debug!("Selected executable: {:?}", executable);

        if let Executable::Wrapper(script) = &executable {
            if config.make_executable && script.exists() {
                installation::make_executable(script).map_err(|source| {
                    AssemblyError::MakeExecutable {
                        path: script.clone(),
                        source,
                    }
                })?;
            }
        }

        let environment =
            installation::resolve_environment(&base_env, &executable, context.platform);
        Ok(PreparedBuild {
            executable,
            environment,
            work_dir,
        })
    }

    /// Assembles, launches and classifies a single target.
    fn run_target(
        &self,
        config: &BuildConfig,
        context: &BuildContext,
        prepared: &PreparedBuild,
        target: &TargetSpec,
        listener: &mut (dyn Write + Send),
    ) -> InvocationEvent {
        let args = match arguments::assemble(
            config,
            &prepared.environment,
            &context.build_variables,
            &context.workspace,
            &prepared.executable,
            target,
            context.platform,
        ) {
            Ok(args) => args,
            Err(e) => {
                report(listener, &format!("FATAL: {}", e));
                return InvocationEvent::Fatal;
            }
        };

        report(
            listener,
            &format!("→ {}", shell::display_command(&args, context.platform)),
        );
        let _timer = BlockTimer::new(format!("target {}", target.name));

        let mut writer =
            ClassifyingWriter::new(&mut *listener, TestFailureClassifier::new(context.charset));
        let run = self
            .launcher
            .run(&args, &prepared.environment, &prepared.work_dir, &mut writer);
        let finished = writer.finish();

        let exit_code = match run {
            Ok(code) => code,
            Err(e) => {
                report(listener, &format!("FATAL: command execution failed: {}", e));
                return InvocationEvent::Fatal;
            }
        };
        let classifier = match finished {
            Ok(classifier) => classifier,
            Err(e) => {
                report(listener, &format!("FATAL: command execution failed: {}", e));
                return InvocationEvent::Fatal;
            }
        };

        let outcome = ExecutionOutcome {
            exit_code,
            tests_failed: classifier.did_tests_fail(),
        };
        log::debug!("Target '{}' finished: {:?}", target.name, outcome);
        if outcome.exit_code != 0 {
            log::debug!(
                "Last output of '{}':\n{}",
                target.name,
                classifier.recent_lines().collect::<Vec<_>>().join("\n")
            );
        }

        match outcome.verdict() {
            TargetVerdict::Continue => InvocationEvent::TargetPassed,
            TargetVerdict::Unstable => {
                report(
                    listener,
                    &format!(
                        "Tests failed in target '{}'; marking build unstable",
                        target.name
                    ),
                );
                InvocationEvent::TargetUnstable
            }
            TargetVerdict::Failed => {
                report(
                    listener,
                    &format!(
                        "Target '{}' failed with exit code {}",
                        target.name, outcome.exit_code
                    ),
                );
                InvocationEvent::Fatal
            }
        }
    }
}

/// Writes one line of build output. A broken listener is logged, not fatal.
fn report(listener: &mut (dyn Write + Send), message: &str) {
    if let Err(e) = writeln!(listener, "{}", message) {
        log::warn!("Failed to write build output: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::installation::InstalledExecutable;
    use crate::models::{Charset, Platform};
    use crate::system::executor::ExecutionError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;

    // --- FAKES ---

    #[derive(Default)]
    struct FakeRegistry {
        installed: Option<InstalledExecutable>,
    }

    impl InstallationRegistry for FakeRegistry {
        fn resolve_executable(
            &self,
            _name: &str,
            _env: &EnvVars,
            _platform: Platform,
        ) -> Option<InstalledExecutable> {
            self.installed.clone()
        }
    }

    struct Launch {
        argv: Vec<String>,
        env: EnvVars,
        cwd: PathBuf,
    }

    /// Replays scripted `(exit code, output)` pairs and records every launch.
    #[derive(Default)]
    struct FakeLauncher {
        script: RefCell<VecDeque<Result<(i32, &'static str), &'static str>>>,
        launches: RefCell<Vec<Launch>>,
    }

    impl FakeLauncher {
        fn replying(replies: &[(i32, &'static str)]) -> Self {
            Self {
                script: RefCell::new(replies.iter().copied().map(Ok).collect()),
                ..Default::default()
            }
        }

        fn failing(message: &'static str) -> Self {
            Self {
                script: RefCell::new(VecDeque::from([Err(message)])),
                ..Default::default()
            }
        }

        fn argvs(&self) -> Vec<String> {
            self.launches
                .borrow()
                .iter()
                .map(|launch| launch.argv.join(" "))
                .collect()
        }
    }

    impl ProcessLauncher for FakeLauncher {
        fn run(
            &self,
            argv: &[String],
            env: &EnvVars,
            cwd: &Path,
            sink: &mut (dyn Write + Send),
        ) -> Result<i32, ExecutionError> {
            self.launches.borrow_mut().push(Launch {
                argv: argv.to_vec(),
                env: env.clone(),
                cwd: cwd.to_path_buf(),
            });
            match self.script.borrow_mut().pop_front() {
                Some(Ok((code, output))) => {
                    sink.write_all(output.as_bytes())
                        .map_err(|e| ExecutionError::Output(argv.join(" "), e))?;
                    Ok(code)
                }
                Some(Err(message)) => Err(ExecutionError::CommandFailed(
                    argv.join(" "),
                    std::io::Error::other(message),
                )),
                None => Ok(0),
            }
        }
    }

    // --- HELPERS ---

    fn context(workspace: &Path) -> BuildContext {
        BuildContext {
            workspace: workspace.to_path_buf(),
            module_root: workspace.to_path_buf(),
            environment: EnvVars::from([("PATH".to_string(), "/usr/bin".to_string())]),
            build_variables: Vec::new(),
            charset: Charset::Utf8,
            platform: Platform::Unix,
        }
    }

    fn targets(spec: &str) -> BuildConfig {
        BuildConfig {
            targets: Some(spec.to_string()),
            grails_work_dir: Some("/tmp".to_string()),
            ..Default::default()
        }
    }

    fn perform(
        config: &BuildConfig,
        context: &BuildContext,
        registry: &FakeRegistry,
        launcher: &FakeLauncher,
    ) -> (BuildResult, String) {
        let mut output: Vec<u8> = Vec::new();
        let result = BuildInvoker::new(registry, launcher).perform(config, context, &mut output);
        (result, String::from_utf8_lossy(&output).into_owned())
    }

    // --- TESTS ---

    #[test]
    fn test_no_targets_fails_without_launching() {
        let launcher = FakeLauncher::default();
        let (result, output) = perform(
            &BuildConfig::default(),
            &context(Path::new("/ws")),
            &FakeRegistry::default(),
            &launcher,
        );

        assert_eq!(result, BuildResult::Failure);
        assert!(output.contains("ERROR: No targets to run!"));
        assert!(launcher.launches.borrow().is_empty());
    }

    #[test]
    fn test_build_variables_become_defines_and_env() {
        let mut ctx = context(Path::new("/ws"));
        ctx.build_variables = vec![("defaultTarget".to_string(), "test-app".to_string())];
        let launcher = FakeLauncher::replying(&[(0, "BUILD SUCCESSFUL\n")]);

        let (result, output) = perform(
            &targets("test-app"),
            &ctx,
            &FakeRegistry::default(),
            &launcher,
        );

        assert_eq!(result, BuildResult::Success);
        assert_eq!(
            launcher.argvs(),
            vec!["grails -DdefaultTarget=test-app -Dgrails.work.dir=/tmp test-app"]
        );
        let launches = launcher.launches.borrow();
        let launch = launches.first().unwrap();
        assert_eq!(launch.env.get("defaultTarget").map(String::as_str), Some("test-app"));
        assert_eq!(launch.cwd, Path::new("/ws"));
        assert!(output.contains("→ grails -DdefaultTarget=test-app"));
        assert!(output.contains("BUILD SUCCESSFUL"));
    }

    #[test]
    fn test_default_work_dir_is_workspace_target() {
        let launcher = FakeLauncher::replying(&[(0, "")]);
        let config = BuildConfig {
            targets: Some("compile".to_string()),
            ..Default::default()
        };
        perform(&config, &context(Path::new("/ws")), &FakeRegistry::default(), &launcher);

        assert_eq!(
            launcher.argvs(),
            vec![format!(
                "grails -Dgrails.work.dir={} compile",
                Path::new("/ws").join("target").display()
            )]
        );
    }

    #[test]
    fn test_targets_run_in_order_with_force_upgrade_first() {
        let launcher = FakeLauncher::replying(&[(0, ""), (0, ""), (0, "")]);
        let config = BuildConfig {
            force_upgrade: true,
            ..targets("clean \"war target/app.war\"")
        };
        let (result, _) = perform(
            &config,
            &context(Path::new("/ws")),
            &FakeRegistry::default(),
            &launcher,
        );

        assert_eq!(result, BuildResult::Success);
        assert_eq!(
            launcher.argvs(),
            vec![
                "grails -Dgrails.work.dir=/tmp upgrade --non-interactive",
                "grails -Dgrails.work.dir=/tmp clean",
                "grails -Dgrails.work.dir=/tmp war target/app.war",
            ]
        );
    }

    #[test]
    fn test_failure_with_tests_failed_marker_is_unstable_and_stops() {
        let launcher =
            FakeLauncher::replying(&[(1, "Running tests...\nTests FAILED - view reports\n")]);
        let (result, output) = perform(
            &targets("test-app war"),
            &context(Path::new("/ws")),
            &FakeRegistry::default(),
            &launcher,
        );

        assert_eq!(result, BuildResult::Unstable);
        assert_eq!(launcher.launches.borrow().len(), 1);
        assert!(output.contains("Tests failed in target 'test-app'; marking build unstable"));
    }

    #[test]
    fn test_failure_without_marker_fails_and_stops() {
        let launcher = FakeLauncher::replying(&[(0, ""), (1, "Compilation error\n")]);
        let (result, output) = perform(
            &targets("clean test-app war"),
            &context(Path::new("/ws")),
            &FakeRegistry::default(),
            &launcher,
        );

        assert_eq!(result, BuildResult::Failure);
        assert_eq!(launcher.launches.borrow().len(), 2);
        assert!(output.contains("Target 'test-app' failed with exit code 1"));
    }

    #[test]
    fn test_marker_with_zero_exit_code_is_success() {
        let launcher = FakeLauncher::replying(&[(0, "0 tests failed\n")]);
        let (result, _) = perform(
            &targets("test-app"),
            &context(Path::new("/ws")),
            &FakeRegistry::default(),
            &launcher,
        );
        assert_eq!(result, BuildResult::Success);
    }

    #[test]
    fn test_launch_error_is_fatal() {
        let launcher = FakeLauncher::failing("permission denied");
        let (result, output) = perform(
            &targets("test-app war"),
            &context(Path::new("/ws")),
            &FakeRegistry::default(),
            &launcher,
        );

        assert_eq!(result, BuildResult::Failure);
        assert_eq!(launcher.launches.borrow().len(), 1);
        assert!(output.contains("FATAL: command execution failed:"));
        assert!(output.contains("permission denied"));
    }

    #[test]
    fn test_missing_wrapper_is_fatal_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::default();
        let config = BuildConfig {
            use_wrapper: true,
            ..targets("test-app")
        };
        let (result, output) = perform(
            &config,
            &context(dir.path()),
            &FakeRegistry::default(),
            &launcher,
        );

        assert_eq!(result, BuildResult::Failure);
        assert!(launcher.launches.borrow().is_empty());
        assert!(output.contains(&format!(
            "FATAL: {} doesn't exist",
            dir.path().join("grailsw").display()
        )));
    }

    #[test]
    fn test_wrapper_runs_from_project_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("app");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(project.join("grailsw"), "#!/bin/sh\n").unwrap();

        let launcher = FakeLauncher::replying(&[(0, "")]);
        let config = BuildConfig {
            use_wrapper: true,
            make_executable: true,
            project_base_dir: Some("app".to_string()),
            ..targets("test-app")
        };
        let (result, _) = perform(
            &config,
            &context(dir.path()),
            &FakeRegistry::default(),
            &launcher,
        );

        assert_eq!(result, BuildResult::Success);
        let launches = launcher.launches.borrow();
        let launch = launches.first().unwrap();
        assert_eq!(launch.cwd, project);
        assert_eq!(
            launch.argv.first().map(String::as_str),
            Some(&*project.join("grailsw").to_string_lossy())
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(project.join("grailsw"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o744);
        }
    }

    #[test]
    fn test_installation_sets_grails_home() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join("bin")).unwrap();
        std::fs::write(home.path().join("bin").join("grails"), "#!/bin/sh\n").unwrap();
        let registry = FakeRegistry {
            installed: Some(InstalledExecutable {
                home: home.path().to_path_buf(),
                path: home.path().join("bin").join("grails"),
            }),
        };

        let launcher = FakeLauncher::replying(&[(0, "")]);
        let config = BuildConfig {
            installation: Some("grails-2".to_string()),
            ..targets("test-app")
        };
        perform(&config, &context(Path::new("/ws")), &registry, &launcher);

        let launches = launcher.launches.borrow();
        let launch = launches.first().unwrap();
        assert_eq!(
            launch.env.get("GRAILS_HOME").map(String::as_str),
            Some(&*home.path().to_string_lossy())
        );
        assert!(launch.env.get("PATH").unwrap().ends_with(":/usr/bin"));
    }

    #[test]
    fn test_windows_builds_run_through_cmd() {
        let mut ctx = context(Path::new("C:\\ws"));
        ctx.platform = Platform::Windows;
        let launcher = FakeLauncher::replying(&[(0, "")]);
        perform(&targets("war"), &ctx, &FakeRegistry::default(), &launcher);

        assert_eq!(
            launcher.argvs(),
            vec!["cmd.exe /C \"grails.bat -Dgrails.work.dir=/tmp war && exit %%ERRORLEVEL%%\""]
        );
    }

    // --- END TO END ---

    #[cfg(unix)]
    mod with_mock_grails {
        use super::*;
        use crate::core::installation::StaticRegistry;
        use crate::system::executor::SystemLauncher;
        use std::collections::HashMap;
        use std::os::unix::fs::PermissionsExt;

        fn mock_home(body: &str) -> tempfile::TempDir {
            let home = tempfile::tempdir().unwrap();
            let bin = home.path().join("bin");
            std::fs::create_dir(&bin).unwrap();
            let script = bin.join("grails");
            std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            home
        }

        fn run_with(body: &str, spec: &str) -> (BuildResult, String) {
            let home = mock_home(body);
            let workspace = tempfile::tempdir().unwrap();
            let registry = StaticRegistry::new(HashMap::from([(
                "mock".to_string(),
                home.path().to_string_lossy().into_owned(),
            )]));
            let launcher = SystemLauncher::default();
            let config = BuildConfig {
                installation: Some("mock".to_string()),
                ..targets(spec)
            };
            let mut ctx = context(workspace.path());
            ctx.environment = std::env::vars().collect();

            let mut output: Vec<u8> = Vec::new();
            let result =
                BuildInvoker::new(&registry, &launcher).perform(&config, &ctx, &mut output);
            (result, String::from_utf8_lossy(&output).into_owned())
        }

        #[test]
        fn test_echo_build_succeeds() {
            let (result, output) = run_with(
                "echo \"args: $*\"; echo \"home: $GRAILS_HOME\"",
                "test-app",
            );
            assert_eq!(result, BuildResult::Success);
            assert!(output.contains("args: -Dgrails.work.dir=/tmp test-app"));
            assert!(output.contains("home: /"));
        }

        #[test]
        fn test_build_failed_is_failure() {
            let (result, _) = run_with("echo 'Compilation error' 1>&2; exit 1", "test-app war");
            assert_eq!(result, BuildResult::Failure);
        }

        #[test]
        fn test_tests_failed_is_unstable() {
            let (result, output) =
                run_with("echo 'Tests FAILED - view reports'; exit 1", "test-app war");
            assert_eq!(result, BuildResult::Unstable);
            assert_eq!(output.matches("→ ").count(), 1);
        }
    }
}
