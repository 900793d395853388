//! Extraction of progress events from worker output lines.
//!
//! The worker emits free-form diagnostic text. Two line shapes carry progress information:
//!
//! - `Transcribed <N> segments` declares how many segments the run will produce.
//! - `<start> --> <end>` at the start of a line marks one finished segment.
//!
//! Everything else is opaque log text and produces no events.

use regex::Regex;
use std::sync::LazyLock;

static TOTAL_DECLARED_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Transcribed (\d+) segments").expect("invalid regex"));

static SEGMENT_COMPLETED_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+\.\d+) --> (\d+\.\d+)").expect("invalid regex"));

/// A structured progress signal extracted from one line of worker output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The worker announced the total number of segments for this run.
    TotalDeclared(u64),

    /// The worker finished one more segment.
    SegmentCompleted,
}

/// Parse one line of worker output into zero or more progress events.
///
/// Both shapes are checked independently, so a line that happens to match both yields both
/// events, in declaration-then-completion order. Unrecognized lines yield nothing.
#[must_use]
pub fn parse(line: &str) -> Vec<ProgressEvent> {
    let mut events = Vec::new();

    if line.contains("Transcribed")
        && line.contains("segments")
        && let Some(total) = TOTAL_DECLARED_REGEX
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    {
        events.push(ProgressEvent::TotalDeclared(total));
    }

    if SEGMENT_COMPLETED_REGEX.is_match(line.trim()) {
        events.push(ProgressEvent::SegmentCompleted);
    }

    events
}
