use core::fmt::{Display, Formatter, Result as FmtResult};

/// Lifecycle of the worker process owned by a [`ProcessSupervisor`](super::ProcessSupervisor).
///
/// `Idle -> Running -> {Succeeded, Failed, Cancelled}`. Terminal states stay put until the
/// supervisor is explicitly reset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed(FailureCause),
    Cancelled,
}

impl RunState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(cause) => write!(f, "failed: {cause}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why a run ended in [`RunState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The worker executable could not be launched.
    Spawn { program: String, message: String },

    /// Reading the worker's output failed mid-run.
    StreamRead { message: String },

    /// The worker ran to completion but reported failure.
    ///
    /// `code` is `None` when the process was terminated by a signal. `last_line` is the last
    /// non-blank line the worker printed, which is usually its error message.
    NonZeroExit { code: Option<i32>, last_line: Option<String> },

    /// The supervising task itself failed.
    Internal { message: String },
}

impl Display for FailureCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Spawn { program, message } => write!(f, "could not launch '{program}': {message}"),
            Self::StreamRead { message } => write!(f, "could not read worker output: {message}"),
            Self::NonZeroExit { code, last_line } => {
                match code {
                    Some(code) => write!(f, "worker exited with status {code}")?,
                    None => write!(f, "worker was terminated by a signal")?,
                }

                if let Some(line) = last_line {
                    write!(f, ": {line}")?;
                }

                Ok(())
            }
            Self::Internal { message } => write!(f, "{message}"),
        }
    }
}

/// Errors returned synchronously by supervisor operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// A worker is already running under this supervisor.
    AlreadyRunning,

    /// The previous run has ended but the supervisor was not reset.
    NotIdle(RunState),

    /// The command line has no executable.
    EmptyCommand,

    /// The worker executable could not be launched.
    Spawn { program: String, message: String },
}

impl Display for SupervisorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::AlreadyRunning => write!(f, "a worker process is already running"),
            Self::NotIdle(state) => write!(f, "the previous run has not been reset (state: {state})"),
            Self::EmptyCommand => write!(f, "the worker command is empty"),
            Self::Spawn { program, message } => write!(f, "could not launch '{program}': {message}"),
        }
    }
}

impl std::error::Error for SupervisorError {}
