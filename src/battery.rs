//! External test battery adapter.
//!
//! Feeds a sample to dieharder on stdin and classifies its combined output.
//! A run passes only when every selected sub-test prints `PASSED` and none
//! prints `FAILED`.

use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};

const PASS_MARKER: &str = "PASSED";
const FAIL_MARKER: &str = "FAILED";

/// How long pipes may stay open after the battery exits.
const PIPE_GRACE: Duration = Duration::from_secs(1);

/// Verdict and captured output from one battery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatteryRun {
    pub diagnostic: String,
    pub verdict: bool,
}

impl BatteryRun {
    pub const fn pass(diagnostic: String) -> Self {
        Self {
            diagnostic,
            verdict: true,
        }
    }

    pub const fn fail(diagnostic: String) -> Self {
        Self {
            diagnostic,
            verdict: false,
        }
    }
}

/// A randomness test suite run as a black box.
pub trait Battery {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Runs the battery on `data`. Never fails: problems become a negative
    /// verdict with the reason in the diagnostic.
    fn run(&self, data: &[u8]) -> BatteryRun;
}

/// Configuration for the dieharder adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DieharderConfig {
    /// Path to the dieharder binary.
    pub binary: PathBuf,
    /// Sub-test selectors passed to `-d`. 15 is the dieharder runs test,
    /// 101 the STS runs test.
    pub tests: Vec<String>,
    /// Generator selector passed to `-g`; 200 reads raw bytes from stdin.
    pub generator: String,
    /// Per sub-test wall-clock limit.
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for DieharderConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("dieharder"),
            tests: vec!["15".to_string(), "101".to_string()],
            generator: "200".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Runs dieharder once per configured sub-test.
#[derive(Debug, Clone, Default)]
pub struct Dieharder {
    config: DieharderConfig,
}

impl Dieharder {
    pub const fn new(config: DieharderConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &DieharderConfig {
        &self.config
    }

    fn run_subtest(&self, test: &str, data: &Arc<[u8]>) -> Result<String> {
        let mut command = Command::new(&self.config.binary);
        command.args(["-d", test, "-g", self.config.generator.as_str()]);

        let output = execute_with_stdin(&mut command, data, self.config.timeout).map_err(|e| {
            HarnessError::Subprocess {
                battery: self.name().to_string(),
                reason: format!("dieharder -d {test}: {e}"),
            }
        })?;

        if !output.status.success() {
            return Err(HarnessError::Subprocess {
                battery: self.name().to_string(),
                reason: format!(
                    "dieharder -d {test} exited {}: {}",
                    output.status.code().unwrap_or(-1),
                    output.text.chars().take(500).collect::<String>()
                ),
            });
        }
        Ok(output.text)
    }
}

impl Battery for Dieharder {
    fn name(&self) -> &str {
        "dieharder"
    }

    fn run(&self, data: &[u8]) -> BatteryRun {
        let data: Arc<[u8]> = Arc::from(data);
        let mut diagnostic = String::new();

        for test in &self.config.tests {
            debug!(test = %test, bytes = data.len(), "running dieharder sub-test");
            let output = match self.run_subtest(test, &data) {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, "dieharder produced no verdict");
                    diagnostic.push_str(&e.to_string());
                    return BatteryRun::fail(diagnostic);
                }
            };
            let passed = classify(&output);
            diagnostic.push_str(&output);
            if !passed {
                return BatteryRun::fail(diagnostic);
            }
        }

        BatteryRun::pass(diagnostic)
    }
}

/// PASS only if the output has a success marker and no failure marker.
#[inline]
#[must_use]
pub fn classify(output: &str) -> bool {
    output.contains(PASS_MARKER) && !output.contains(FAIL_MARKER)
}

struct CombinedOutput {
    status: ExitStatus,
    text: String,
}

/// Runs `work` on its own thread; the result arrives on the receiver.
fn spawn_bounded<T, F>(work: F) -> Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(work());
    });
    rx
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Receiver<Vec<u8>> {
    spawn_bounded(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            if let Err(e) = source.read_to_end(&mut buf) {
                warn!(error = %e, "failed reading battery output");
            }
        }
        buf
    })
}

/// Waits for a helper thread until `deadline`, or `PIPE_GRACE` if that is later.
fn join_by<T>(rx: &Receiver<T>, deadline: Instant, what: &str) -> std::io::Result<T> {
    let wait = deadline
        .saturating_duration_since(Instant::now())
        .max(PIPE_GRACE);
    rx.recv_timeout(wait).map_err(|_| {
        std::io::Error::new(
            ErrorKind::TimedOut,
            format!("battery exited but its {what} pipe stayed open"),
        )
    })
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Writes `data` to the child's stdin and collects stdout+stderr, killing the
/// child if it outlives `timeout`. Pipes held open by the child's own
/// children are abandoned once the deadline passes.
fn execute_with_stdin(
    command: &mut Command,
    data: &Arc<[u8]>,
    timeout: Duration,
) -> std::io::Result<CombinedOutput> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdin = child.stdin.take();
    let input = Arc::clone(data);
    let writer = spawn_bounded(move || -> std::io::Result<()> {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        match stdin.write_all(&input) {
            // The battery may stop reading once it has enough data.
            Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        }
    });
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let start = Instant::now();
    let deadline = start + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > timeout {
                    kill_and_reap(&mut child);
                    return Err(std::io::Error::new(
                        ErrorKind::TimedOut,
                        format!("timed out after {}s", timeout.as_secs_f64()),
                    ));
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(e);
            }
        }
    };

    if let Err(e) = join_by(&writer, deadline, "stdin")? {
        warn!(error = %e, "failed writing sample to battery stdin");
    }
    let mut text = String::from_utf8_lossy(&join_by(&stdout, deadline, "stdout")?).into_owned();
    text.push_str(&String::from_utf8_lossy(&join_by(&stderr, deadline, "stderr")?));

    Ok(CombinedOutput { status, text })
}

/// Checks dieharder can be started and returns its version banner.
pub fn check_dieharder_available(config: &DieharderConfig) -> Result<String> {
    let output = Command::new(&config.binary).arg("-h").output().map_err(|e| {
        HarnessError::Subprocess {
            battery: "dieharder".to_string(),
            reason: format!("failed to run {} -h: {e}", config.binary.display()),
        }
    })?;

    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    text.lines()
        .find(|l| l.to_lowercase().contains("dieharder version"))
        .or_else(|| text.lines().find(|l| !l.trim().is_empty()))
        .map(|l| l.trim().to_string())
        .ok_or_else(|| HarnessError::Subprocess {
            battery: "dieharder".to_string(),
            reason: "dieharder printed nothing".to_string(),
        })
}

/// Finds the dieharder binary via `DIEHARDER_BIN` or `PATH`.
pub fn find_dieharder_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DIEHARDER_BIN") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join("dieharder"))
            .find(|candidate| candidate.is_file())
    })
}
