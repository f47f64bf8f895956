// src/system/executor.rs

//! Launching the build tool and streaming its output.

use crate::{CancellationToken, models::EnvVars};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Size of the buffer used to copy child output.
const FORWARD_CHUNK_SIZE: usize = 8 * 1024;

/// Why a process could not be run to completion.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The argument vector was empty.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The working directory is missing.
    #[error("Working directory '{}' does not exist.", .0.display())]
    MissingWorkingDirectory(PathBuf),
    /// Spawning or waiting for the process failed.
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, #[source] io::Error),
    /// Forwarding the process output failed.
    #[error("Output of command '{0}' could not be read: {1}")]
    Output(String, #[source] io::Error),
    /// The process was killed after cancellation.
    #[error("Command '{command}' was interrupted.")]
    Interrupted {
        /// The program that was running.
        command: String,
    },
}

/// Blocking execution of an external process.
pub trait ProcessLauncher {
    /// Runs `argv` with exactly `env` in `cwd`, streaming its stdout and stderr into
    /// `sink` until it exits. Returns the exit code.
    fn run(
        &self,
        argv: &[String],
        env: &EnvVars,
        cwd: &Path,
        sink: &mut (dyn Write + Send),
    ) -> Result<i32, ExecutionError>;
}

/// Launches real processes, killing them when the cancellation token is set.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher {
    cancellation_token: CancellationToken,
}

impl SystemLauncher {
    /// A launcher that kills its child once `cancellation_token` is set.
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self { cancellation_token }
    }
}

impl ProcessLauncher for SystemLauncher {
    fn run(
        &self,
        argv: &[String],
        env: &EnvVars,
        cwd: &Path,
        sink: &mut (dyn Write + Send),
    ) -> Result<i32, ExecutionError> {
        let (program, args) = argv.split_first().ok_or(ExecutionError::EmptyCommand)?;
        if !cwd.is_dir() {
            return Err(ExecutionError::MissingWorkingDirectory(cwd.to_path_buf()));
        }
        let clean_cwd = dunce::simplified(cwd);

        let mut command = StdCommand::new(program);
        add_args(&mut command, program, args);
        command
            .current_dir(clean_cwd)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("Spawning '{}' in {}", program, clean_cwd.display());
        let mut spawned = command
            .spawn()
            .map_err(|e| ExecutionError::CommandFailed(program.clone(), e))?;
        let stdout = spawned.stdout.take();
        let stderr = spawned.stderr.take();

        // Whatever happens below, the child is killed if still running and reaped.
        let child = scopeguard::guard(Mutex::new(spawned), |child| {
            let mut child = child.into_inner().unwrap_or_else(PoisonError::into_inner);
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    log::warn!("Failed to kill child process {}: {}", child.id(), e);
                }
            }
            child.wait().ok();
        });

        let sink = Mutex::new(sink);
        let finished = AtomicBool::new(false);
        let (forwarded, interrupted) = thread::scope(|scope| {
            let watcher =
                scope.spawn(|| watch_for_cancellation(&child, &self.cancellation_token, &finished));
            let stderr_reader = stderr.map(|pipe| scope.spawn(|| forward_output(pipe, &sink)));

            let stdout_result = stdout.map_or(Ok(()), |pipe| forward_output(pipe, &sink));
            let stderr_result = match stderr_reader {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked"))),
                None => Ok(()),
            };

            finished.store(true, Ordering::SeqCst);
            let interrupted = watcher.join().unwrap_or(false);
            (stdout_result.and(stderr_result), interrupted)
        });

        if interrupted {
            return Err(ExecutionError::Interrupted {
                command: program.clone(),
            });
        }
        forwarded.map_err(|e| ExecutionError::Output(program.clone(), e))?;

        let status = child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .wait()
            .map_err(|e| ExecutionError::CommandFailed(program.clone(), e))?;
        let code = exit_code(status);
        log::debug!("'{}' exited with code {}", program, code);
        Ok(code)
    }
}

/// `cmd.exe` receives its command line verbatim; everything else gets normal quoting.
#[cfg(windows)]
fn add_args(command: &mut StdCommand, program: &str, args: &[String]) {
    use std::os::windows::process::CommandExt;
    if program.eq_ignore_ascii_case("cmd.exe") {
        for arg in args {
            command.raw_arg(arg);
        }
    } else {
        command.args(args);
    }
}

#[cfg(not(windows))]
fn add_args(command: &mut StdCommand, _program: &str, args: &[String]) {
    command.args(args);
}

/// Copies a pipe into the shared sink chunk by chunk as soon as bytes arrive.
///
/// Each chunk is written and flushed under the lock, so stdout and stderr never
/// interleave inside a chunk. Line splitting is left to the sink.
fn forward_output<R: Read>(
    mut pipe: R,
    sink: &Mutex<&mut (dyn Write + Send)>,
) -> io::Result<()> {
    let mut buffer = [0u8; FORWARD_CHUNK_SIZE];
    loop {
        let read = match pipe.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_all(chunk)?;
        sink.flush()?;
    }
}

/// Polls the cancellation token until the output is drained. Returns `true` if the
/// child was killed because of it.
fn watch_for_cancellation(
    child: &Mutex<Child>,
    cancellation_token: &CancellationToken,
    finished: &AtomicBool,
) -> bool {
    while !finished.load(Ordering::SeqCst) {
        if cancellation_token.load(Ordering::SeqCst) {
            let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
            log::debug!(
                "Cancellation requested, killing child process (PID: {})...",
                child.id()
            );
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill child process {}: {}", child.id(), e);
            }
            return true;
        }
        // Wait briefly to avoid a tight loop consuming CPU.
        thread::sleep(Duration::from_millis(100));
    }
    false
}

/// The process exit code; on Unix a signal death maps to `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
