use crate::transcription::{ProgressSnapshot, ProgressTracker};
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

const PREFIX: &str = "Transcribing";

const DETERMINATE_TEMPLATE: &str = "{prefix:>12.bold.cyan} [{bar:25}] {msg}";
const DETERMINATE_TEMPLATE_NO_COLOR: &str = "{prefix:>12} [{bar:25}] {msg}";
const INDETERMINATE_TEMPLATE: &str = "{prefix:>12.bold.cyan} {spinner} {msg}";
const INDETERMINATE_TEMPLATE_NO_COLOR: &str = "{prefix:>12} {spinner} {msg}";

#[derive(Debug)]
struct DisplayState {
    /// `None` keeps the display hidden for good.
    visible_after: Option<Instant>,
    visible: AtomicBool,
    preparing: AtomicBool,
}

/// Terminal progress display fed by a [`ProgressTracker`].
///
/// A background task polls the tracker at a fixed period. While no segment total is known the
/// display is a spinner reading "Preparing..."; afterwards it is a bar of processed segments with
/// the remaining-time estimate as its message. The display stays hidden until `delay` has passed.
pub struct ProgressReporter {
    bar: ProgressBar,
    state: Arc<DisplayState>,
    refresh_task: JoinHandle<()>,
}

impl ProgressReporter {
    /// Start displaying progress from `tracker`, refreshing every `period`.
    ///
    /// A `delay` of `None` never shows the display, which is what you want while log output
    /// goes to the same terminal. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(tracker: ProgressTracker, delay: Option<Duration>, period: Duration, use_colors: bool) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_prefix(PREFIX);

        let state = Arc::new(DisplayState {
            visible_after: delay.map(|delay| Instant::now() + delay),
            visible: AtomicBool::new(false),
            preparing: AtomicBool::new(true),
        });

        set_preparing_style(&bar, use_colors);

        Self {
            refresh_task: tokio::spawn(refresh_task(bar.clone(), Arc::clone(&state), tracker, period, use_colors)),
            bar,
            state,
        }
    }

    /// Run `f` with the progress display temporarily cleared, so `f` can print freely.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.bar.suspend(f)
    }

    /// Stop refreshing and clear the progress display.
    pub fn done(&self) {
        self.refresh_task.abort();
        if self.state.visible.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.refresh_task.abort();
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("bar", &self.bar)
            .field("state", &self.state)
            .field("refresh_task", &"<task>")
            .finish()
    }
}

fn set_preparing_style(bar: &ProgressBar, use_colors: bool) {
    let template = if use_colors { INDETERMINATE_TEMPLATE } else { INDETERMINATE_TEMPLATE_NO_COLOR };
    bar.set_style(
        ProgressStyle::default_spinner()
            .template(template)
            .expect("could not create progress bar style"),
    );
}

fn set_counting_style(bar: &ProgressBar, use_colors: bool) {
    let template = if use_colors { DETERMINATE_TEMPLATE } else { DETERMINATE_TEMPLATE_NO_COLOR };
    bar.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .expect("could not create progress bar style")
            .progress_chars("=> "),
    );
}

/// Apply one snapshot to the bar, switching between spinner and bar when needed.
fn render(bar: &ProgressBar, state: &DisplayState, snapshot: &ProgressSnapshot, use_colors: bool) {
    let preparing = snapshot.is_preparing();
    if state.preparing.swap(preparing, Ordering::Relaxed) != preparing {
        if preparing {
            set_preparing_style(bar, use_colors);
        } else {
            set_counting_style(bar, use_colors);
        }
    }

    if preparing {
        bar.tick();
    } else {
        bar.set_length(snapshot.total_segments);
        bar.set_position(snapshot.processed_segments.min(snapshot.total_segments));
    }

    bar.set_message(snapshot.to_string());
}

/// Background refresh task that periodically updates the progress display.
async fn refresh_task(bar: ProgressBar, state: Arc<DisplayState>, tracker: ProgressTracker, period: Duration, use_colors: bool) {
    let mut interval = tokio::time::interval(period);
    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !state.visible.load(Ordering::Relaxed)
            && let Some(visible_after) = state.visible_after
            && Instant::now() >= visible_after
        {
            state.visible.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        }

        if state.visible.load(Ordering::Relaxed) {
            render(&bar, &state, &tracker.snapshot(), use_colors);
        }
    }
}
