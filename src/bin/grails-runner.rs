// src/bin/grails-runner.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use grails_runner::{
    CancellationToken,
    cli::Cli,
    core::{config_loader, orchestrator::BuildInvoker},
    models::{BuildContext, BuildResult, Platform},
    system::executor::SystemLauncher,
};
use std::env;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The main entry point of `grails-runner`.
/// It sets up logging and Ctrl+C handling, runs the build, and maps the verdict
/// (or an error) to the process exit code.
fn main() {
    env_logger::init();
    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(cancellation_token.clone());

    match run(Cli::parse(), &cancellation_token) {
        Ok(result) => {
            if cancellation_token.load(Ordering::SeqCst) {
                // Interrupted: exit silently with the shell's code for SIGINT.
                std::process::exit(130);
            }
            let verdict = match result {
                BuildResult::Success => result.to_string().green().bold(),
                BuildResult::Unstable => result.to_string().yellow().bold(),
                BuildResult::Failure => result.to_string().red().bold(),
            };
            println!("\nFinished: {}", verdict);
            std::process::exit(result.exit_code());
        }
        Err(e) => {
            // --- Centralized Error Handling ---
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli, cancellation_token: &CancellationToken) -> Result<BuildResult> {
    log::debug!("CLI args parsed: {:?}", cli);

    let current_dir = env::current_dir().context("Could not determine the current directory")?;
    let module_root = cli.module_root.clone().unwrap_or_else(|| current_dir.clone());
    let workspace = cli.workspace.clone().unwrap_or(current_dir);

    let file = config_loader::load(cli.config.as_deref(), &module_root)?;
    let config = config_loader::resolve(file, &cli.overrides(), &cli.defines);

    let context = BuildContext {
        workspace,
        module_root,
        environment: env::vars().collect(),
        build_variables: config.build_variables,
        charset: cli.charset,
        platform: Platform::host(),
    };

    let launcher = SystemLauncher::new(cancellation_token.clone());
    let invoker = BuildInvoker::new(&config.registry, &launcher);
    let mut stdout = io::stdout();
    Ok(invoker.perform(&config.build, &context, &mut stdout))
}

/// Sets the cancellation token on Ctrl+C (and SIGTERM on Unix).
///
/// The listener runs a small tokio runtime on its own thread so the build itself
/// stays fully synchronous.
fn spawn_interrupt_listener(cancellation_token: CancellationToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("Ctrl+C handling disabled: {}", e);
                return;
            }
        };

        runtime.block_on(async move {
            if wait_for_interrupt().await {
                log::debug!("Interrupt received, cancelling the build.");
                cancellation_token.store(true, Ordering::SeqCst);
            }
        });
    });
}

/// Resolves once an interrupt arrives. Returns `false` if no handler could be installed.
async fn wait_for_interrupt() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            return tokio::select! {
                result = tokio::signal::ctrl_c() => result.is_ok(),
                _ = sigterm.recv() => true,
            };
        }
    }
    match tokio::signal::ctrl_c().await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Ctrl+C handling disabled: {}", e);
            false
        }
    }
}
