use super::Host;
use super::common::{ColorMode, LogLevel, init_logging};
use super::config::Config;
use super::progress_reporter::ProgressReporter;
use crate::Result;
use crate::transcription::{Language, LogLine, LogSink, ProcessSupervisor, RunState, TranscriptionOptions, WhisperModel};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use owo_colors::{AnsiColors, OwoColorize};
use std::fs::{File, OpenOptions};
use std::io::Write;

const LOG_TARGET: &str = "transcribe";

/// Delay before the progress display appears, so short runs don't flash it.
const PROGRESS_DELAY: Duration = Duration::from_millis(300);

/// Exit code reported when the user interrupts a run.
const CANCELLED_EXIT_CODE: i32 = 130;

#[derive(Args, Debug)]
pub struct TranscribeArgs {
    /// Audio or video file to transcribe
    #[arg(value_name = "FILE")]
    pub file: Utf8PathBuf,

    /// Speech-recognition model [default: from configuration, normally `small`]
    #[arg(long, short = 'm', value_name = "MODEL")]
    pub model: Option<WhisperModel>,

    /// Spoken language of the input [default: from configuration, normally `auto`]
    #[arg(long, short = 'l', value_name = "LANG")]
    pub language: Option<Language>,

    /// Translate the transcript to English
    #[arg(long, short = 't')]
    pub translate: bool,

    /// Use OpenAI for translation (needs an API key)
    #[arg(long)]
    pub openai: bool,

    /// OpenAI API key, passed to the worker as `OPENAI_API_KEY`
    #[arg(long, value_name = "KEY", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Path to configuration file [default: autotranscript.toml]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Also append the worker output to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<Utf8PathBuf>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none")]
    pub log_level: LogLevel,
}

impl TranscribeArgs {
    /// The API key to hand to the worker, if OpenAI was requested and a key is available.
    fn openai_key(&self) -> Option<&str> {
        if !self.openai {
            return None;
        }

        self.openai_api_key.as_deref().filter(|key| !key.trim().is_empty())
    }
}

/// Writes worker output to the host and, optionally, to a log file.
struct Transcript {
    log_file: Option<File>,
}

impl Transcript {
    fn open(log_file: Option<&Utf8PathBuf>) -> Result<Self> {
        let log_file = match log_file {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .into_app_err_with(|| format!("opening log file '{path}'"))?,
            ),
            None => None,
        };

        Ok(Self { log_file })
    }

    fn write_lines<H: Host>(&mut self, host: &mut H, lines: &[LogLine]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        {
            let mut out = host.output();
            for line in lines {
                let _ = writeln!(out, "{line}");
            }
        }

        if let Some(file) = &mut self.log_file {
            for line in lines {
                writeln!(file, "{line}").into_app_err("writing to the log file")?;
            }
        }

        Ok(())
    }

    fn flush<H: Host>(&mut self, host: &mut H, reporter: &ProgressReporter, sink: &LogSink) -> Result<()> {
        let lines = sink.drain_available();
        if lines.is_empty() {
            return Ok(());
        }

        reporter.suspend(|| self.write_lines(host, &lines))
    }

    /// Print a final status line. `color` only applies to the terminal copy.
    fn status<H: Host>(&mut self, host: &mut H, text: impl Into<String>, color: Option<AnsiColors>, is_error: bool) {
        let line = LogLine::new(text);
        let shown = match color {
            Some(color) => line.to_string().color(color).to_string(),
            None => line.to_string(),
        };

        let _ = if is_error {
            writeln!(host.error(), "{shown}")
        } else {
            writeln!(host.output(), "{shown}")
        };

        if let Some(file) = &mut self.log_file {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Run one transcription to completion, printing worker output and progress as it goes.
///
/// Ctrl-C cancels the worker; this returns only after the worker process has exited.
///
/// # Errors
///
/// Returns an error if the configuration or options are invalid, the log file cannot be
/// written, or the worker fails.
pub async fn transcribe<H: Host>(host: &mut H, args: &TranscribeArgs) -> Result<()> {
    init_logging(args.log_level);

    let config = Config::load(Utf8Path::new("."), args.config.as_ref())?;

    if args.openai && args.openai_key().is_none() {
        let _ = writeln!(
            host.error(),
            "warning: --openai needs an API key (--openai-api-key or OPENAI_API_KEY); continuing without OpenAI"
        );
    }

    let options = TranscriptionOptions {
        input: args.file.clone(),
        model: args.model.unwrap_or(config.default_model),
        language: args.language.unwrap_or(config.default_language),
        translate: args.translate,
        openai: args.openai_key().is_some(),
    };
    let command = options.command_line(&config.worker_command)?;

    let mut transcript = Transcript::open(args.log_file.as_ref())?;

    let mut supervisor = ProcessSupervisor::new();
    if let Some(key) = args.openai_key() {
        supervisor = supervisor.with_env("OPENAI_API_KEY", key);
    }

    let sink = supervisor.sink();
    sink.push("Starting transcription process...");
    sink.push(format!("Selected file: {}", args.file.file_name().unwrap_or(args.file.as_str())));
    if options.openai {
        sink.push("Using OpenAI for translation");
    }

    let use_colors = args.color.use_colors_for_output();
    let delay = (args.log_level == LogLevel::None).then_some(PROGRESS_DELAY);
    let reporter = ProgressReporter::new(supervisor.tracker(), delay, config.refresh_interval(), args.color.use_colors_for_progress());

    if let Err(e) = supervisor.start(&command) {
        transcript.flush(host, &reporter, &sink)?;
        reporter.done();
        return Err(report_failure(host, &mut transcript, &e.to_string(), use_colors));
    }

    let outcome = supervise(host, &supervisor, &reporter, &mut transcript, config.refresh_interval()).await?;

    transcript.flush(host, &reporter, &sink)?;
    reporter.done();

    let color = |color: AnsiColors| use_colors.then_some(color);
    match outcome {
        RunState::Succeeded => {
            transcript.status(host, "Transcription completed", color(AnsiColors::Green), false);
            Ok(())
        }
        RunState::Cancelled => {
            transcript.status(host, "Transcription cancelled", color(AnsiColors::Yellow), false);
            host.exit(CANCELLED_EXIT_CODE);
            Ok(())
        }
        RunState::Failed(cause) => Err(report_failure(host, &mut transcript, &cause.to_string(), use_colors)),
        other => Err(app_err!("transcription ended in an unexpected state: {other}")),
    }
}

/// Print worker output until the run ends, cancelling it on Ctrl-C.
async fn supervise<H: Host>(
    host: &mut H,
    supervisor: &ProcessSupervisor,
    reporter: &ProgressReporter,
    transcript: &mut Transcript,
    period: Duration,
) -> Result<RunState> {
    let sink = supervisor.sink();
    let mut ticker = tokio::time::interval(period);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ctrl_c_available = true;

    loop {
        tokio::select! {
            state = supervisor.wait() => return Ok(state),

            _ = ticker.tick() => {
                if let Err(e) = transcript.flush(host, reporter, &sink) {
                    let _ = supervisor.cancel().await;
                    return Err(e);
                }
            }

            signal = &mut ctrl_c, if ctrl_c_available => match signal {
                Ok(()) => {
                    log::info!(target: LOG_TARGET, "Interrupted, stopping the worker");
                    return Ok(supervisor.cancel().await);
                }
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Could not listen for Ctrl-C: {e}");
                    ctrl_c_available = false;
                }
            },
        }
    }
}

fn report_failure<H: Host>(host: &mut H, transcript: &mut Transcript, cause: &str, use_colors: bool) -> ohno::AppError {
    transcript.status(host, format!("ERROR: {cause}"), use_colors.then_some(AnsiColors::Red), true);
    app_err!("transcription failed: {cause}")
}
