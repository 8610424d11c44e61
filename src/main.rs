mod assembler;
mod bootstrap;
mod config;
mod conversion;
mod dispatch;
mod error;
mod interpreter;
mod run_manager;
mod session;
mod subsystem;
mod vis;

use clap::Parser;
use config::{AppConfig, Cli};
use error::BootstrapError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = match AppConfig::resolve(&cli) {
        Ok(c) => c,
        Err(e) => return fail(e.into()),
    };
    if let Some(path) = &cfg.config_path {
        tracing::debug!(path = %path.display(), "configuration loaded");
    }

    match bootstrap::run(&cfg) {
        Ok(report) => {
            tracing::info!(
                mode = %report.mode,
                transitions = ?report.transitions,
                session = ?report.session,
                "run completed"
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn fail(e: BootstrapError) -> ExitCode {
    tracing::error!(error = %e, status = e.exit_status(), "fatal");
    eprintln!("error: {}", e);
    e.exit_code()
}
