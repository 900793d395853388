//! autotranscript crate
//!
//! This crate is an implementation detail of the `autotranscript` tool. The [`transcription`]
//! module is usable on its own to supervise any line-oriented worker process; the rest of the
//! API is fluid and may change without warning and in a semver-incompatible way.

/// Result type alias using `ohno::AppError` as the default error type.
pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[doc(hidden)]
pub mod commands;

pub mod transcription;

pub use commands::{Host, run};
