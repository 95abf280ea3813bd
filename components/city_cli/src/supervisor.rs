//! The supervisor: boot, run loop, checkpoints and shutdown.

use chrono::Utc;
use nix::sys::signal::Signal;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use interpreter::{Interpreter, NativeRegistry, RunOutcome};

use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::signals;

/// Steps taken between timer/signal checks; small enough that pause and
/// checkpoint requests feel immediate, large enough to stay cheap.
const STEP_SLICE: usize = 10_000;
/// Sleep while the program is idle (done, or waiting on a pending call).
const IDLE_SLEEP: Duration = Duration::from_millis(50);

/// Startup sources in lexical order: files matching `^(core|db|test).*\.js$`.
pub fn discover_sources(dir: &Path) -> CliResult<Vec<PathBuf>> {
    let pattern = regex::Regex::new(r"^(core|db|test).*\.js$").expect("static pattern");
    let mut sources = Vec::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| CliError::Database(format!("cannot read {}: {}", dir.display(), e)))?;
    for entry in entries {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if pattern.is_match(name) {
                sources.push(entry.path());
            }
        }
    }
    sources.sort();
    Ok(sources)
}

fn fresh_registry() -> NativeRegistry {
    let mut registry = NativeRegistry::new();
    builtins::register_natives(&mut registry);
    registry
}

/// The running world: configuration plus the one interpreter instance.
pub struct Supervisor {
    config: Config,
    db_dir: PathBuf,
    interp: Interpreter,
}

impl Supervisor {
    /// Boots from a configuration file: restores the newest snapshot, or
    /// builds a fresh world from the startup sources.
    pub fn boot(config_path: &Path) -> CliResult<Supervisor> {
        let config = Config::load(config_path)?;
        let db_dir = config.database_dir(config_path);
        if !db_dir.is_dir() {
            return Err(CliError::Database(format!(
                "{} is not a directory",
                db_dir.display()
            )));
        }

        let interp = match snapshot::latest_snapshot(&db_dir)? {
            Some(file) => {
                info!(snapshot = %file.path.display(), "restoring snapshot");
                snapshot::read_snapshot(&file.path, fresh_registry())?
            }
            None => {
                let sources = discover_sources(&db_dir)?;
                if sources.is_empty() {
                    return Err(CliError::MissingSources(format!(
                        "no .city snapshot and no startup files in {}",
                        db_dir.display()
                    )));
                }
                let mut interp = Interpreter::new();
                interp.natives = fresh_registry();
                builtins::install_globals(&mut interp);
                // Frames run newest-first, so push in reverse lexical
                // order to execute in lexical order.
                for path in sources.iter().rev() {
                    let text = std::fs::read_to_string(path)?;
                    interp.create_thread_for_src(&text).map_err(|e| {
                        CliError::Parse(format!("{}: {}", path.display(), e))
                    })?;
                }
                info!(files = sources.len(), "booted from startup sources");
                interp
            }
        };

        Ok(Supervisor {
            config,
            db_dir,
            interp,
        })
    }

    /// The interpreter, for embedding and tests.
    pub fn interpreter(&mut self) -> &mut Interpreter {
        &mut self.interp
    }

    /// The resolved database directory.
    pub fn database_dir(&self) -> &Path {
        &self.db_dir
    }

    fn drain_logs(&mut self) {
        for line in self.interp.drain_log() {
            info!(target: "city", "{}", line);
        }
    }

    /// Takes one checkpoint: pause, write, retention, resume. Write
    /// failures are logged and execution continues; the partial file is
    /// already gone.
    pub fn checkpoint(&mut self) {
        self.interp.pause();
        match snapshot::write_snapshot(&self.interp, &self.db_dir, Utc::now()) {
            Ok(path) => {
                info!(snapshot = %path.display(), "checkpoint written");
                if let Some(max_bytes) = self.config.max_directory_bytes() {
                    match snapshot::enforce_retention(
                        &self.db_dir,
                        max_bytes,
                        self.config.checkpoint_min_files,
                        self.config.checkpoint_interval.max(1.0),
                        Utc::now(),
                    ) {
                        Ok(deleted) => {
                            for path in deleted {
                                info!(snapshot = %path.display(), "retention deleted snapshot");
                            }
                        }
                        Err(e) => warn!("retention failed: {}", e),
                    }
                }
            }
            Err(e) => error!("checkpoint failed: {}", e),
        }
        self.interp.resume();
    }

    /// Drives the world until shutdown. Returns the exit code; on a
    /// termination signal the process is re-signaled and this does not
    /// return.
    pub fn run(&mut self) -> CliResult<i32> {
        signals::install_handlers()
            .map_err(|e| CliError::Database(format!("cannot install signal handlers: {}", e)))?;
        let mut last_checkpoint = Instant::now();

        loop {
            let outcome = match self.interp.run_slice(STEP_SLICE) {
                Ok(outcome) => outcome,
                Err(fatal) => {
                    self.drain_logs();
                    return Err(CliError::Fatal(fatal));
                }
            };
            self.drain_logs();

            match outcome {
                None => {} // budget exhausted, still working
                Some(RunOutcome::Done) | Some(RunOutcome::Paused) => {
                    std::thread::sleep(IDLE_SLEEP);
                }
                Some(RunOutcome::Uncaught(value)) => {
                    let shown = interpreter::to_string_value(&self.interp.heap, &value);
                    warn!("uncaught exception: {}", shown);
                }
            }

            if let Some(code) = self.interp.take_shutdown_request() {
                info!(code, "shutdown requested from inside the world");
                if self.config.checkpoint_at_shutdown {
                    self.checkpoint();
                }
                return Ok(code);
            }
            if self.interp.take_checkpoint_request() {
                self.checkpoint();
                last_checkpoint = Instant::now();
            }

            if let Some(sig) = signals::take_pending() {
                match sig {
                    Signal::SIGHUP => {
                        info!("SIGHUP: immediate checkpoint");
                        self.checkpoint();
                        last_checkpoint = Instant::now();
                    }
                    Signal::SIGTERM | Signal::SIGINT => {
                        info!(signal = %sig, "terminating");
                        if self.config.checkpoint_at_shutdown {
                            self.checkpoint();
                        }
                        signals::reraise(sig).map_err(|e| {
                            CliError::Database(format!("cannot re-raise signal: {}", e))
                        })?;
                        return Ok(0);
                    }
                    _ => {}
                }
            }

            if self.config.checkpoint_interval > 0.0
                && last_checkpoint.elapsed().as_secs_f64() >= self.config.checkpoint_interval
            {
                self.checkpoint();
                last_checkpoint = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Value;
    use std::fs;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_boot_without_sources_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), r#"{ "databaseDirectory": "." }"#);
        match Supervisor::boot(&config) {
            Err(CliError::MissingSources(_)) => {}
            other => panic!("expected MissingSources, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_boot_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), r#"{ "databaseDirectory": "nowhere" }"#);
        assert!(matches!(
            Supervisor::boot(&config),
            Err(CliError::Database(_))
        ));
    }

    #[test]
    fn test_startup_files_run_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("core_10_second.js"), "order += 'b';").unwrap();
        fs::write(dir.path().join("core_00_first.js"), "var order = 'a';").unwrap();
        fs::write(dir.path().join("db_data.js"), "order += 'c'; order;").unwrap();
        fs::write(dir.path().join("ignored.txt"), "not js").unwrap();
        fs::write(dir.path().join("other.js"), "order += 'X';").unwrap();

        let config = write_config(dir.path(), r#"{ "databaseDirectory": "." }"#);
        let mut supervisor = Supervisor::boot(&config).unwrap();
        let interp = supervisor.interpreter();
        assert_eq!(interp.run().unwrap(), RunOutcome::Done);
        assert_eq!(interp.value(), &Value::String("abc".to_string()));
    }

    #[test]
    fn test_discover_sources_pattern() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["core.js", "db1.js", "test_x.js", "corey.js", "xcore.js", "db.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let names: Vec<String> = discover_sources(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["core.js", "corey.js", "db1.js", "test_x.js"]);
    }

    #[test]
    fn test_checkpoint_and_reboot_resume_state() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("core.js"),
            "var x = 0; for (var i = 0; i < 3; i++) x += i;",
        )
        .unwrap();
        let config = write_config(dir.path(), r#"{ "databaseDirectory": "." }"#);

        let mut first = Supervisor::boot(&config).unwrap();
        // Step partway into the loop, then checkpoint.
        for _ in 0..25 {
            let _ = first.interpreter().step().unwrap();
        }
        first.checkpoint();

        // A second boot restores the snapshot instead of the sources and
        // finishes the loop with the same result.
        let mut second = Supervisor::boot(&config).unwrap();
        let interp = second.interpreter();
        assert_eq!(interp.run().unwrap(), RunOutcome::Done);
        interp.append_code("x;").unwrap();
        assert_eq!(interp.run().unwrap(), RunOutcome::Done);
        assert_eq!(interp.value(), &Value::Number(3.0));
    }

    #[test]
    fn test_shutdown_request_is_observed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("core.js"), "cc.log('up'); cc.shutdown(7);").unwrap();
        let config = write_config(
            dir.path(),
            r#"{ "databaseDirectory": ".", "checkpointAtShutdown": false }"#,
        );
        let mut supervisor = Supervisor::boot(&config).unwrap();
        let interp = supervisor.interpreter();
        assert_eq!(interp.run().unwrap(), RunOutcome::Done);
        assert_eq!(interp.drain_log(), vec!["up".to_string()]);
        assert_eq!(interp.take_shutdown_request(), Some(7));
    }

    #[test]
    fn test_checkpoint_requested_from_world() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("core.js"), "var x = 5; cc.checkpoint();").unwrap();
        let config = write_config(dir.path(), r#"{ "databaseDirectory": "." }"#);
        let mut supervisor = Supervisor::boot(&config).unwrap();
        assert_eq!(
            supervisor.interpreter().run().unwrap(),
            RunOutcome::Done
        );
        assert!(supervisor.interpreter().take_checkpoint_request());
        supervisor.checkpoint();
        assert_eq!(
            snapshot::list_snapshots(supervisor.database_dir())
                .unwrap()
                .len(),
            1
        );
    }
}
