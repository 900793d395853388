//! Command-line interface and orchestration for autotranscript
//!
//! This module turns command-line arguments into a transcription run and presents the run
//! while it happens. The engine in [`crate::transcription`] never touches the terminal;
//! everything visible is produced here.
//!
//! ## Commands
//!
//! - **transcribe**: Build the worker command line from the arguments and configuration, start
//!   the worker, print its output with timestamps, and show progress until it ends. Ctrl-C
//!   cancels the worker and waits for it to exit.
//! - **init**: Write the default configuration file.
//!
//! Printing and progress redraws are driven by timers here, at the configured refresh interval.

mod common;
mod config;
mod host;
mod init;
mod progress_reporter;
mod run;
mod transcribe;

pub use common::{ColorMode, LogLevel};
pub use config::Config;
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use run::run;
pub use transcribe::{TranscribeArgs, transcribe};
