//! City VM daemon entry point.
//!
//! One positional argument: the configuration file. Exit code 0 on a clean
//! shutdown, 1 for configuration, bootstrap or snapshot-load failures; a
//! termination signal re-kills the process with itself after the final
//! snapshot.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use city_cli::Supervisor;

#[derive(Parser)]
#[command(name = "cityd", about = "Persistent JavaScript world server", version)]
struct Cli {
    /// Path to the JSON configuration file
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut supervisor = match Supervisor::boot(&cli.config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    match supervisor.run() {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}
