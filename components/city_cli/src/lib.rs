//! Supervisor for the City VM.
//!
//! The thin shell around the interpreter: it loads the configuration,
//! selects the newest snapshot (or the startup sources when none exists),
//! drives the stepper in bounded slices, takes periodic and requested
//! checkpoints, runs retention, and turns termination signals into an
//! orderly snapshot-then-exit.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod signals;
mod supervisor;

pub use config::Config;
pub use error::{CliError, CliResult};
pub use signals::{install_handlers, reraise, take_pending};
pub use supervisor::{discover_sources, Supervisor};
