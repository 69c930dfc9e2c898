//! RDFox engine sessions.
//!
//! The engine is driven through its shell: a session script is written into
//! the workspace root and RDFox is started as
//! `<executable> <args..> sandbox <root> "exec probs-runner-session.rdfox"`.
//! Output is streamed to `tracing` and the most recent lines are kept as
//! diagnostics for error reports.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use probs_runner_shared::{EngineSection, PrefixMap, ProbsError, Result};

use crate::staging::Workspace;

/// File name of the generated session script inside the workspace root.
pub const SESSION_SCRIPT: &str = "probs-runner-session.rdfox";

/// Number of output lines kept for diagnostics.
const DIAGNOSTIC_LINES: usize = 40;

/// How long a graceful `quit` is given before the process is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// How long to wait for output readers after the process has exited.
const READER_DRAIN: Duration = Duration::from_secs(2);

/// Line RDFox prints once its REST endpoint accepts connections.
static ENDPOINT_READY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"successfully started at port number/service name (\S+)")
        .expect("endpoint readiness regex")
});

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How the engine is launched.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Executable name or path.
    pub executable: String,
    /// Arguments placed before `sandbox <root> ...`.
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_section(&EngineSection::default())
    }
}

impl EngineConfig {
    pub fn from_section(section: &EngineSection) -> Self {
        Self {
            executable: section.executable.clone(),
            args: section.args.clone(),
        }
    }
}

/// When a session counts as having done its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The engine runs its script to completion and exits with success.
    Exit,
    /// The engine stays up serving its REST endpoint.
    Endpoint,
}

/// The script a session runs: prefix declarations, then stage commands.
#[derive(Debug, Clone)]
pub struct SessionScript {
    pub prefixes: PrefixMap,
    pub lines: Vec<String>,
    pub readiness: Readiness,
}

impl SessionScript {
    pub fn new(lines: Vec<String>, readiness: Readiness) -> Self {
        Self {
            prefixes: PrefixMap::new(),
            lines,
            readiness,
        }
    }

    pub fn with_prefixes(mut self, prefixes: PrefixMap) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Script text. Run-to-completion scripts end with `quit`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.prefixes.script_lines().iter().chain(&self.lines) {
            out.push_str(line);
            out.push('\n');
        }
        if self.readiness == Readiness::Exit {
            out.push_str("quit\n");
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Launches RDFox sessions.
#[derive(Debug, Clone, Default)]
pub struct RdfoxEngine {
    config: EngineConfig,
}

impl RdfoxEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Write `script` into `workspace` and start the engine on it.
    ///
    /// The returned session owns the workspace; call
    /// [`EngineSession::await_ready`] before using its outputs.
    #[instrument(skip_all, fields(root = %workspace.root().display(), readiness = ?script.readiness))]
    pub async fn run(&self, workspace: Workspace, script: &SessionScript) -> Result<EngineSession> {
        let script_path = workspace.root().join(SESSION_SCRIPT);
        std::fs::write(&script_path, script.render())
            .map_err(|e| ProbsError::io(&script_path, e))?;

        info!(executable = %self.config.executable, "starting engine");

        let mut child = Command::new(&self.config.executable)
            .args(&self.config.args)
            .arg("sandbox")
            .arg(workspace.root())
            .arg(format!("exec {SESSION_SCRIPT}"))
            .current_dir(workspace.root())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProbsError::engine(
                    format!(
                        "failed to spawn engine: {e}. Is `{}` installed?",
                        self.config.executable
                    ),
                    Vec::new(),
                )
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProbsError::engine("failed to capture engine stdout", Vec::new()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProbsError::engine("failed to capture engine stderr", Vec::new()))?;

        // A run-to-completion script never reads stdin; closing it keeps a
        // script without `quit` from hanging the shell.
        let stdin = child.stdin.take();
        let stdin = match script.readiness {
            Readiness::Endpoint => stdin,
            Readiness::Exit => None,
        };

        let tail = Arc::new(Mutex::new(OutputTail::new(DIAGNOSTIC_LINES)));
        let (ready_tx, ready_rx) = oneshot::channel();
        let readers = vec![
            tokio::spawn(watch_output(stdout, tail.clone(), Some(ready_tx))),
            tokio::spawn(watch_output(stderr, tail.clone(), None)),
        ];

        Ok(EngineSession {
            child,
            stdin,
            readiness: script.readiness,
            ready_rx: Some(ready_rx),
            endpoint: None,
            tail,
            readers,
            workspace,
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A running engine process and the workspace it runs in.
///
/// Dropping the session kills the process if it is still alive, then
/// removes the workspace if it is ephemeral.
pub struct EngineSession {
    child: Child,
    stdin: Option<ChildStdin>,
    readiness: Readiness,
    ready_rx: Option<oneshot::Receiver<String>>,
    endpoint: Option<String>,
    tail: Arc<Mutex<OutputTail>>,
    readers: Vec<JoinHandle<()>>,
    workspace: Workspace,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("pid", &self.child.id())
            .field("readiness", &self.readiness)
            .field("endpoint", &self.endpoint)
            .field("root", &self.workspace.root())
            .finish()
    }
}

impl EngineSession {
    /// Wait until the session meets its readiness condition.
    ///
    /// For [`Readiness::Exit`] this waits for the process to exit and fails
    /// on a non-zero status. For [`Readiness::Endpoint`] it waits for the
    /// endpoint announcement and fails if the process exits first.
    pub async fn await_ready(&mut self) -> Result<()> {
        match self.readiness {
            Readiness::Exit => {
                let status = self.child.wait().await.map_err(|e| {
                    ProbsError::engine(format!("failed to wait for engine: {e}"), Vec::new())
                })?;
                self.drain_readers().await;
                if !status.success() {
                    return Err(ProbsError::engine(
                        format!("engine {}", describe_status(status)),
                        self.diagnostics(),
                    ));
                }
                info!(%status, "engine finished");
                Ok(())
            }
            Readiness::Endpoint => {
                let Some(ready_rx) = self.ready_rx.take() else {
                    return Ok(());
                };

                let outcome = tokio::select! {
                    biased;
                    announced = ready_rx => Outcome::Announced(announced.ok()),
                    status = self.child.wait() => Outcome::Exited(status.ok()),
                };

                match outcome {
                    Outcome::Announced(Some(endpoint)) => {
                        info!(%endpoint, "endpoint started");
                        self.endpoint = Some(endpoint);
                        Ok(())
                    }
                    Outcome::Announced(None) => {
                        // Output closed without an announcement; the process
                        // is on its way out.
                        let status = self.child.wait().await.ok();
                        self.drain_readers().await;
                        Err(ProbsError::engine(
                            format!(
                                "engine closed its output before the endpoint started ({})",
                                status.map_or_else(|| "unknown status".into(), describe_status)
                            ),
                            self.diagnostics(),
                        ))
                    }
                    Outcome::Exited(status) => {
                        self.drain_readers().await;
                        Err(ProbsError::engine(
                            format!(
                                "engine exited before the endpoint started ({})",
                                status.map_or_else(|| "unknown status".into(), describe_status)
                            ),
                            self.diagnostics(),
                        ))
                    }
                }
            }
        }
    }

    /// Port or service name the endpoint announced, once ready.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn root(&self) -> &Path {
        self.workspace.root()
    }

    /// Absolute path of a `/`-separated path inside the workspace.
    pub fn output_path(&self, relative: &str) -> PathBuf {
        self.workspace.path(relative)
    }

    /// The most recent engine output lines, oldest first.
    pub fn diagnostics(&self) -> Vec<String> {
        lock_tail(&self.tail).lines()
    }

    /// Ask the engine to quit, killing it if it does not exit in time.
    #[instrument(skip_all, fields(pid = ?self.child.id()))]
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(b"quit\n").await {
                debug!("engine stdin already closed: {e}");
            }
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!(%status, "engine exited"),
            Ok(Err(e)) => warn!("engine wait error: {e}"),
            Err(_) => {
                warn!("engine did not quit in time, killing");
                self.child.kill().await.map_err(|e| {
                    ProbsError::engine(format!("failed to kill engine: {e}"), self.diagnostics())
                })?;
            }
        }
        self.drain_readers().await;
        Ok(())
    }

    async fn drain_readers(&mut self) {
        for reader in self.readers.drain(..) {
            if tokio::time::timeout(READER_DRAIN, reader).await.is_err() {
                debug!("engine output reader did not finish");
            }
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            warn!(pid = ?self.child.id(), "engine still running at teardown, killing");
            if let Err(e) = self.child.start_kill() {
                warn!("failed to kill engine: {e}");
            }
        }
        for reader in &self.readers {
            reader.abort();
        }
    }
}

enum Outcome {
    Announced(Option<String>),
    Exited(Option<ExitStatus>),
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with status {code}"),
        None => format!("terminated ({status})"),
    }
}

// ---------------------------------------------------------------------------
// Output capture
// ---------------------------------------------------------------------------

/// Bounded buffer of recent output lines.
#[derive(Debug)]
struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

fn lock_tail(tail: &Mutex<OutputTail>) -> std::sync::MutexGuard<'_, OutputTail> {
    tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forward engine output to the log and the diagnostics tail. When `ready`
/// is set, the first endpoint announcement is sent through it.
async fn watch_output<R>(
    stream: R,
    tail: Arc<Mutex<OutputTail>>,
    mut ready: Option<oneshot::Sender<String>>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "probs_runner::rdfox", "{line}");
                if let Some(caps) = ENDPOINT_READY_RE.captures(&line) {
                    if let Some(tx) = ready.take() {
                        let endpoint = caps[1].trim_end_matches(['.', ',']).to_string();
                        let _ = tx.send(endpoint);
                    }
                }
                lock_tail(&tail).push(line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("engine output read error: {e}");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
