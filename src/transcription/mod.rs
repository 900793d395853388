//! Supervision of an external transcription worker.
//!
//! This module launches the worker process, reads its combined output, and turns that output
//! into two things a presentation layer can poll at its own pace:
//!
//! - a FIFO of timestamped log lines ([`LogSink`]), and
//! - progress counters with a remaining-time estimate ([`ProgressTracker`]).
//!
//! # Implementation Model
//!
//! [`ProcessSupervisor`] owns the child process. A background task reads stdout and stderr,
//! and for each line pushes it to the sink, runs it through [`parse`] and applies the
//! resulting [`ProgressEvent`]s to the tracker. When the process ends, the task publishes a
//! terminal [`RunState`]. Failures never escape as panics or errors from the background task;
//! they are reported through [`RunState::Failed`].
//!
//! Nothing here writes to the terminal. The `commands` module drives the display.

mod log_parser;
mod log_sink;
mod options;
mod progress_tracker;
mod run_state;
mod supervisor;

pub use log_parser::{ProgressEvent, parse};
pub use log_sink::{LogLine, LogSink};
pub use options::{Language, TranscriptionOptions, WhisperModel};
pub use progress_tracker::{ProgressSnapshot, ProgressTracker, format_hms};
pub use run_state::{FailureCause, RunState, SupervisorError};
pub use supervisor::ProcessSupervisor;
