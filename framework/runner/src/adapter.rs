use anyhow::{bail, Context};
use hpath_core::prelude::{CancelListener, JobCancelledError};
use hpath_model::{Config, SimulationOutput};
use std::env;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{JobError, SimulationError};

/// Environment variable naming the simulation engine executable.
pub const HPATH_ENGINE_PATH_ENV: &str = "HPATH_ENGINE_PATH";

/// A discrete-event simulation engine.
///
/// The engine is a black box: it takes a scenario's configuration and the index of the replication
/// to run, and records the traces of that run.
///
/// A run must stop soon after `cancel` fires, returning [SimulationError::Interrupted].
pub trait SimulationEngine: Send + Sync {
    fn run(
        &self,
        config: &Config,
        replication: u32,
        cancel: &CancelListener,
    ) -> Result<SimulationOutput, SimulationError>;
}

/// Runs every replication of a scenario on an engine.
#[derive(Clone)]
pub struct SimulationAdapter {
    engine: Arc<dyn SimulationEngine>,
}

impl SimulationAdapter {
    pub fn new(engine: Arc<dyn SimulationEngine>) -> Self {
        Self { engine }
    }

    /// Run `config.num_reps` replications in order.
    ///
    /// Cancellation is checked before each replication and passed on to the engine, which stops
    /// the replication in progress.
    pub fn run_replications(
        &self,
        config: &Config,
        cancel: &CancelListener,
    ) -> Result<Vec<SimulationOutput>, JobError> {
        let mut outputs = Vec::with_capacity(config.num_reps as usize);
        for replication in 0..config.num_reps {
            if cancel.is_cancelled() {
                log::debug!(
                    "Stopping {} before replication {replication} of {}",
                    config.name,
                    config.num_reps
                );
                return Err(JobCancelledError::default().into());
            }

            let output = match self.engine.run(config, replication, cancel) {
                Err(SimulationError::Interrupted { .. }) => {
                    return Err(JobCancelledError::default().into())
                }
                result => result?,
            };
            log::trace!(
                "Replication {replication} of {} recorded {} specimens",
                config.name,
                output.specimens.len()
            );
            outputs.push(output);
        }

        Ok(outputs)
    }
}

/// Get the path to the engine executable from [HPATH_ENGINE_PATH_ENV].
pub fn engine_path() -> anyhow::Result<PathBuf> {
    match env::var(HPATH_ENGINE_PATH_ENV).ok().as_deref() {
        Some("") => bail!("'{HPATH_ENGINE_PATH_ENV}' set to empty string"),
        None => bail!("'{HPATH_ENGINE_PATH_ENV}' is not set, it should name the simulation engine"),
        Some(path) => {
            let engine_path = PathBuf::from(path);
            if !engine_path.exists() {
                bail!(
                    "Engine path set with '{HPATH_ENGINE_PATH_ENV}={path}' but it doesn't exist",
                    path = engine_path.display()
                );
            }
            Ok(engine_path)
        }
    }
}

/// An engine run as an external process, once per replication.
///
/// The process is started as `<program> <args>... --replication <n>`, reads the scenario
/// configuration as JSON on stdin and must write one [SimulationOutput] as JSON to stdout. A
/// non-zero exit is an engine failure, reported with whatever the process wrote to stderr.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let program = engine_path().context("No simulation engine configured")?;
        Ok(Self::new(program, Vec::new()))
    }
}

/// How often a running engine process is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn read_to_end(stream: Option<impl Read + Send + 'static>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.read_to_end(&mut buf) {
                log::warn!("Failed to read engine output: {e}");
            }
        }
        buf
    })
}

fn join_output(reader: JoinHandle<Vec<u8>>) -> Vec<u8> {
    reader.join().unwrap_or_default()
}

fn stop(child: &mut Child) -> std::io::Result<()> {
    child.kill()?;
    child.wait()?;
    Ok(())
}

impl SimulationEngine for ProcessEngine {
    fn run(
        &self,
        config: &Config,
        replication: u32,
        cancel: &CancelListener,
    ) -> Result<SimulationOutput, SimulationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--replication")
            .arg(replication.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drained on their own threads so a chatty engine never blocks on a full pipe
        let stdout = read_to_end(child.stdout.take());
        let stderr = read_to_end(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            let written = serde_json::to_writer(&mut stdin, config)
                .map_err(std::io::Error::from)
                .and_then(|_| stdin.flush());
            if let Err(e) = written {
                stop(&mut child)?;
                return Err(e.into());
            }
        }

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                log::debug!(
                    "Stopping engine process {} on replication {replication}",
                    child.id()
                );
                stop(&mut child)?;
                return Err(SimulationError::Interrupted { replication });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = join_output(stdout);
        let stderr = join_output(stderr);
        if !status.success() {
            return Err(SimulationError::Engine {
                replication,
                message: format!(
                    "exited with {status}: {}",
                    String::from_utf8_lossy(&stderr).trim()
                ),
            });
        }

        serde_json::from_slice(&stdout).map_err(|source| SimulationError::InvalidOutput {
            replication,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpath_core::prelude::CancelHandle;
    use hpath_model::SharedParams;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingEngine {
        runs: AtomicU32,
    }

    impl SimulationEngine for CountingEngine {
        fn run(
            &self,
            _config: &Config,
            replication: u32,
            _cancel: &CancelListener,
        ) -> Result<SimulationOutput, SimulationError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if replication == 2 {
                return Err(SimulationError::Engine {
                    replication,
                    message: "no staff on shift".to_string(),
                });
            }
            Ok(SimulationOutput::default())
        }
    }

    fn config(num_reps: u32) -> Config {
        Config::new(
            "baseline".to_string(),
            "baseline.toml".to_string(),
            &SharedParams {
                sim_hours: 24,
                num_reps,
                confidence_intervals: false,
            },
            BTreeMap::new(),
        )
    }

    #[test]
    fn runs_every_replication() {
        let engine = Arc::new(CountingEngine::default());
        let adapter = SimulationAdapter::new(engine.clone());

        let outputs = adapter
            .run_replications(&config(2), &CancelHandle::new().new_listener())
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(engine.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn engine_failure_stops_the_run() {
        let engine = Arc::new(CountingEngine::default());
        let adapter = SimulationAdapter::new(engine.clone());

        let err = adapter
            .run_replications(&config(5), &CancelHandle::new().new_listener())
            .unwrap_err();

        assert!(matches!(
            err,
            JobError::Simulation(SimulationError::Engine { replication: 2, .. })
        ));
        assert_eq!(engine.runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cancelled_run_starts_no_replication() {
        let engine = Arc::new(CountingEngine::default());
        let adapter = SimulationAdapter::new(engine.clone());
        let handle = CancelHandle::new();
        handle.cancel();

        let err = adapter
            .run_replications(&config(3), &handle.new_listener())
            .unwrap_err();

        assert!(matches!(err, JobError::Cancelled(_)));
        assert_eq!(engine.runs.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt as _;

        let path = dir.join("engine.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn process_engine_reads_output_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            r#"cat > /dev/null
echo '{"wips": [], "resources": [], "specimens": {"specimen.1": {"reception_start": 1.0}}}'"#,
        );

        let output = ProcessEngine::new(program, Vec::new())
            .run(&config(1), 0, &CancelHandle::new().new_listener())
            .unwrap();

        assert_eq!(output.specimens.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn process_engine_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "cat > /dev/null\necho 'rota is empty' >&2\nexit 3");

        let err = ProcessEngine::new(program, Vec::new())
            .run(&config(1), 4, &CancelHandle::new().new_listener())
            .unwrap_err();

        match err {
            SimulationError::Engine {
                replication,
                message,
            } => {
                assert_eq!(replication, 4);
                assert!(message.contains("rota is empty"));
            }
            other => panic!("Expected engine failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn cancelled_process_engine_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "cat > /dev/null\nexec sleep 30");
        let handle = CancelHandle::new();
        let listener = handle.new_listener();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            handle.cancel();
        });

        let start = std::time::Instant::now();
        let err = ProcessEngine::new(program, Vec::new())
            .run(&config(1), 0, &listener)
            .unwrap_err();

        assert!(matches!(
            err,
            SimulationError::Interrupted { replication: 0 }
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
        canceller.join().unwrap();
    }

    #[test]
    fn engine_path_must_exist() {
        env::set_var(HPATH_ENGINE_PATH_ENV, "/non/existent/path/to/engine");
        assert!(engine_path().is_err());
    }
}
