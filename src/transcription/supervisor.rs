//! Spawning and supervision of the worker process.
//!
//! The supervisor owns the child process exclusively. Once started, a background task reads
//! the child's stdout and stderr line by line, and for every line, in arrival order:
//!
//! 1. pushes the line to the [`LogSink`],
//! 2. parses it into [`ProgressEvent`](super::ProgressEvent)s,
//! 3. applies those events to the [`ProgressTracker`].
//!
//! When both streams reach end-of-file the task waits for the process to exit, classifies the
//! exit status, and publishes the terminal [`RunState`]. Observers can poll [`ProcessSupervisor::state`]
//! or watch for changes through [`ProcessSupervisor::subscribe`].
//!
//! Cancellation kills the child and waits for the OS to confirm its exit before the run is
//! reported as cancelled, so no worker is ever left behind. No timeout is applied to a run.

use super::log_parser::parse;
use super::log_sink::LogSink;
use super::progress_tracker::ProgressTracker;
use super::run_state::{FailureCause, RunState, SupervisorError};
use core::fmt::{Debug, Formatter};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Log target for the supervisor
const LOG_TARGET: &str = "supervisor";

/// Environment forced on the worker so its output arrives promptly and as UTF-8.
const WORKER_ENV: [(&str, &str); 2] = [("PYTHONUNBUFFERED", "1"), ("PYTHONIOENCODING", "utf-8")];

type LineResult = io::Result<String>;

struct ActiveRun {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    pid: Option<u32>,
}

/// Runs one worker process at a time and keeps its log and progress up to date.
pub struct ProcessSupervisor {
    sink: Arc<LogSink>,
    tracker: ProgressTracker,
    state: Arc<watch::Sender<RunState>>,
    active: Mutex<Option<ActiveRun>>,
    env: Vec<(String, String)>,
}

impl Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("sink", &self.sink)
            .field("tracker", &self.tracker)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            sink: Arc::new(LogSink::new()),
            tracker: ProgressTracker::new(),
            state: Arc::new(state),
            active: Mutex::new(None),
            env: Vec::new(),
        }
    }

    /// Add an environment variable for every worker launched by this supervisor.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Shared handle to the queue of lines read from the worker.
    #[must_use]
    pub fn sink(&self) -> Arc<LogSink> {
        Arc::clone(&self.sink)
    }

    /// Shared handle to the progress counters of the current run.
    #[must_use]
    pub fn tracker(&self) -> ProgressTracker {
        self.tracker.clone()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Receive every subsequent state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// OS process id of the current or most recent worker.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.active.lock().expect("lock poisoned").as_ref().and_then(|run| run.pid)
    }

    /// Launch the worker described by `command` (executable followed by its arguments).
    ///
    /// The supervisor must be idle. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyRunning`] if a worker is active,
    /// [`SupervisorError::NotIdle`] if a finished run was not [`reset`](Self::reset), and
    /// [`SupervisorError::Spawn`] if the executable cannot be launched. A spawn failure also
    /// moves the supervisor to [`RunState::Failed`].
    pub fn start<S: AsRef<str>>(&self, command: &[S]) -> Result<(), SupervisorError> {
        let mut active = self.active.lock().expect("lock poisoned");

        match self.state() {
            RunState::Idle => {}
            RunState::Running => return Err(SupervisorError::AlreadyRunning),
            other => return Err(SupervisorError::NotIdle(other)),
        }

        let Some((program, args)) = command.split_first() else {
            return Err(SupervisorError::EmptyCommand);
        };
        let program = program.as_ref();
        if program.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }

        log::info!(
            target: LOG_TARGET,
            "Spawning worker: {}",
            command.iter().map(AsRef::<str>::as_ref).collect::<Vec<_>>().join(" ")
        );

        self.tracker.start();

        let spawned = Command::new(program)
            .args(args.iter().map(AsRef::<str>::as_ref))
            .envs(WORKER_ENV)
            .envs(self.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not launch '{program}': {e}");
                let message = e.to_string();
                let _ = self.state.send_replace(RunState::Failed(FailureCause::Spawn {
                    program: program.to_owned(),
                    message: message.clone(),
                }));
                return Err(SupervisorError::Spawn {
                    program: program.to_owned(),
                    message,
                });
            }
        };

        let pid = child.id();
        log::debug!(target: LOG_TARGET, "Worker started with pid {pid:?}");

        let (lines_tx, lines_rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, lines_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, lines_tx.clone())));
        }
        drop(lines_tx);

        let run = Run {
            child,
            lines: lines_rx,
            readers,
            sink: Arc::clone(&self.sink),
            tracker: self.tracker.clone(),
            last_line: None,
        };

        // Publish `Running` before the task exists so its terminal state can never be overwritten.
        let _ = self.state.send_replace(RunState::Running);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let outcome = run.supervise(cancel_rx).await;
            log::info!(target: LOG_TARGET, "Worker run {outcome}");
            let _ = state.send_replace(outcome);
        });

        *active = Some(ActiveRun {
            cancel: Some(cancel_tx),
            task: Some(task),
            pid,
        });

        Ok(())
    }

    /// Stop the running worker and wait until it has exited.
    ///
    /// Returns the resulting state, which is [`RunState::Cancelled`] unless the worker had
    /// already finished on its own. Concurrent callers all wait for the worker to exit and see
    /// the same state. Does nothing when no worker is running.
    pub async fn cancel(&self) -> RunState {
        let (cancel, task) = match self.active.lock().expect("lock poisoned").as_mut() {
            Some(run) => (run.cancel.take(), run.task.take()),
            None => (None, None),
        };

        if let Some(cancel) = cancel {
            let _ = cancel.send(());
        }

        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    log::error!(target: LOG_TARGET, "Supervisor task failed: {e}");
                    let _ = self.state.send_replace(RunState::Failed(FailureCause::Internal {
                        message: format!("supervisor task failed: {e}"),
                    }));
                }
                self.state()
            }

            // Another caller is already stopping this run; wait for the same outcome.
            None => self.wait().await,
        }
    }

    /// Wait until the current run reaches a terminal state.
    ///
    /// Returns immediately with the current state when no worker is running.
    pub async fn wait(&self) -> RunState {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(|state| !state.is_running()).await.map(|state| state.clone());
        result.unwrap_or_else(|_| self.state())
    }

    /// Return a finished supervisor to [`RunState::Idle`] and clear its progress counters.
    ///
    /// Lines still queued in the sink are left for the consumer to drain.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyRunning`] while a worker is active.
    pub fn reset(&self) -> Result<(), SupervisorError> {
        let mut active = self.active.lock().expect("lock poisoned");
        if self.state().is_running() {
            return Err(SupervisorError::AlreadyRunning);
        }

        *active = None;
        self.tracker.reset();
        let _ = self.state.send_replace(RunState::Idle);
        Ok(())
    }
}

/// State owned by the background task for a single run.
struct Run {
    child: Child,
    lines: mpsc::UnboundedReceiver<LineResult>,
    readers: Vec<JoinHandle<()>>,
    sink: Arc<LogSink>,
    tracker: ProgressTracker,
    last_line: Option<String>,
}

impl Run {
    async fn supervise(mut self, mut cancel: oneshot::Receiver<()>) -> RunState {
        loop {
            tokio::select! {
                biased;

                // A dropped sender means the supervisor is gone, which also ends the run.
                _ = &mut cancel => return self.terminate().await,

                line = self.lines.recv() => match line {
                    Some(Ok(line)) => self.handle_line(line),
                    Some(Err(e)) => {
                        log::warn!(target: LOG_TARGET, "Could not read worker output: {e}");
                        if let Err(wait_err) = self.kill_and_reap().await {
                            log::error!(target: LOG_TARGET, "Could not confirm worker exit: {wait_err}");
                        }
                        return RunState::Failed(FailureCause::StreamRead { message: e.to_string() });
                    }
                    None => break,
                },
            }
        }

        log::debug!(target: LOG_TARGET, "Worker output closed, waiting for exit");

        tokio::select! {
            biased;
            _ = &mut cancel => self.terminate().await,
            status = self.child.wait() => self.classify(status),
        }
    }

    fn handle_line(&mut self, line: String) {
        let events = parse(&line);

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            self.last_line = Some(trimmed.to_owned());
        }

        self.sink.push(line);
        self.tracker.apply_all(events);
    }

    fn classify(&mut self, status: io::Result<ExitStatus>) -> RunState {
        match status {
            Ok(status) if status.success() => RunState::Succeeded,
            Ok(status) => {
                log::debug!(target: LOG_TARGET, "Worker exited unsuccessfully: {status}");
                RunState::Failed(FailureCause::NonZeroExit {
                    code: status.code(),
                    last_line: self.last_line.take(),
                })
            }
            Err(e) => RunState::Failed(FailureCause::Internal {
                message: format!("could not wait for worker exit: {e}"),
            }),
        }
    }

    async fn terminate(&mut self) -> RunState {
        log::info!(target: LOG_TARGET, "Cancelling worker process");

        match self.kill_and_reap().await {
            Ok(status) => {
                log::debug!(target: LOG_TARGET, "Worker stopped: {status}");

                // Keep whatever the readers had already delivered.
                while let Ok(Ok(line)) = self.lines.try_recv() {
                    self.handle_line(line);
                }

                RunState::Cancelled
            }
            Err(e) => RunState::Failed(FailureCause::Internal {
                message: format!("could not confirm worker exit: {e}"),
            }),
        }
    }

    async fn kill_and_reap(&mut self) -> io::Result<ExitStatus> {
        // Fails harmlessly when the child has already exited; the wait below still reaps it.
        if let Err(e) = self.child.start_kill() {
            log::debug!(target: LOG_TARGET, "Kill request not delivered: {e}");
        }

        let status = self.child.wait().await;

        // A grandchild may still hold the pipes open; nothing more is read after this point.
        for reader in &self.readers {
            reader.abort();
        }

        status
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(stream: R, tx: mpsc::UnboundedSender<LineResult>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                if tx.send(Ok(decode_line(&buf))).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

/// Strip the line terminator and decode, replacing invalid UTF-8 sequences.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
