//! A command-line front end for Whisper-based transcription and translation.
//!
//! # Overview
//!
//! `autotranscript` launches a transcription worker (by default `python -u autosub.py`) on an
//! audio or video file, streams the worker's output to the terminal with timestamps, and shows
//! how far along the transcription is and how much time is left.
//!
//! # Quick Start
//!
//! ```bash
//! autotranscript transcribe lecture.mp4
//! ```
//!
//! # Basic Usage
//!
//! **Pick a model and language:**
//! ```bash
//! autotranscript transcribe interview.wav --model large-v3 --language ja
//! ```
//!
//! **Translate to English:**
//! ```bash
//! autotranscript transcribe clip.mkv --language zh --translate
//! ```
//!
//! **Translate with OpenAI:**
//! ```bash
//! OPENAI_API_KEY=sk-... autotranscript transcribe clip.mkv --translate --openai
//! ```
//!
//! **Keep a copy of the output:**
//! ```bash
//! autotranscript transcribe talk.mp4 --log-file talk.log
//! ```
//!
//! Press Ctrl-C to cancel; the worker is stopped before the command returns.
//!
//! # Configuration
//!
//! Generate a configuration file with the defaults:
//!
//! ```bash
//! autotranscript init
//! ```
//!
//! This writes `autotranscript.toml`, which is picked up from the current directory
//! (or pass `--config <PATH>`). It sets the worker command, the default model and language,
//! and how often output and progress are refreshed.
//!
//! # Progress
//!
//! Until the worker announces how many segments it produced, progress shows "Preparing...".
//! After that, each finished segment advances the bar and the remaining time is estimated
//! from the average time per segment so far.
//!
//! # Diagnostics
//!
//! Use `--log-level debug` (or `RUST_LOG`) to see what the tool itself is doing. The progress
//! bar is hidden while diagnostic logging is on.

use autotranscript::{Host, run};
use std::io::Write;
use std::io::{stderr, stdout};

/// Default host that runs real OS commands.
#[derive(Debug, Clone, Default)]
struct RealHost;

impl Host for RealHost {
    fn output(&mut self) -> impl Write {
        stdout()
    }

    fn error(&mut self) -> impl Write {
        stderr()
    }

    fn exit(&mut self, code: i32) {
        std::process::exit(code);
    }
}

#[tokio::main]
async fn main() -> Result<(), ohno::AppError> {
    run(&mut RealHost, std::env::args()).await
}
