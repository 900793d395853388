//! Integration tests for `ProcessSupervisor` driving real child processes.
//!
//! The workers are small `sh` scripts, so these tests only run on Unix.

#![cfg(unix)]

use autotranscript::transcription::{FailureCause, ProcessSupervisor, RunState, SupervisorError};
use core::time::Duration;
use std::time::Instant;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn drained_texts(supervisor: &ProcessSupervisor) -> Vec<String> {
    supervisor
        .sink()
        .drain_available()
        .into_iter()
        .map(|line| line.text().to_string())
        .collect()
}

#[tokio::test]
async fn test_silent_success() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("exit 0")).unwrap();

    assert_eq!(supervisor.wait().await, RunState::Succeeded);
    assert!(supervisor.sink().is_empty());

    let tracker = supervisor.tracker();
    assert_eq!(tracker.total_segments(), 0);
    assert_eq!(tracker.processed_segments(), 0);
    assert_eq!(tracker.fraction(), None);
    assert_eq!(tracker.estimate(), None);
}

#[tokio::test]
async fn test_non_zero_exit_fails() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("exit 1")).unwrap();

    let state = supervisor.wait().await;
    assert_eq!(
        state,
        RunState::Failed(FailureCause::NonZeroExit {
            code: Some(1),
            last_line: None,
        })
    );
}

#[tokio::test]
async fn test_failure_carries_last_line() {
    let supervisor = ProcessSupervisor::new();
    supervisor
        .start(&sh("{ echo 'Loading model'; echo 'FileNotFoundError: missing.mp4'; echo ''; } >&2; exit 3"))
        .unwrap();

    let RunState::Failed(FailureCause::NonZeroExit { code, last_line }) = supervisor.wait().await else {
        panic!("expected a non-zero exit");
    };
    assert_eq!(code, Some(3));
    assert_eq!(last_line.as_deref(), Some("FileNotFoundError: missing.mp4"));
    assert_eq!(drained_texts(&supervisor), ["Loading model", "FileNotFoundError: missing.mp4", ""]);
}

#[tokio::test]
async fn test_killed_by_signal_has_no_code() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("kill -9 $$")).unwrap();

    let state = supervisor.wait().await;
    assert_eq!(
        state,
        RunState::Failed(FailureCause::NonZeroExit {
            code: None,
            last_line: None,
        })
    );
}

#[tokio::test]
async fn test_progress_lines_drive_tracker() {
    let supervisor = ProcessSupervisor::new();
    supervisor
        .start(&sh(
            "printf 'Loading model small\\nTranscribed 3 segments\\n0.00 --> 1.00 one\\n1.00 --> 2.00 two\\n2.00 --> 3.00 three\\n'",
        ))
        .unwrap();

    assert_eq!(supervisor.wait().await, RunState::Succeeded);

    let tracker = supervisor.tracker();
    assert_eq!(tracker.total_segments(), 3);
    assert_eq!(tracker.processed_segments(), 3);
    assert_eq!(tracker.fraction(), Some(1.0));
    assert!(tracker.estimate().is_some());

    assert_eq!(
        drained_texts(&supervisor),
        [
            "Loading model small",
            "Transcribed 3 segments",
            "0.00 --> 1.00 one",
            "1.00 --> 2.00 two",
            "2.00 --> 3.00 three",
        ]
    );
}

#[tokio::test]
async fn test_stderr_is_merged() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("echo to-stdout; echo to-stderr >&2")).unwrap();

    assert_eq!(supervisor.wait().await, RunState::Succeeded);

    let mut texts = drained_texts(&supervisor);
    texts.sort();
    assert_eq!(texts, ["to-stderr", "to-stdout"]);
}

#[tokio::test]
async fn test_line_endings_and_invalid_utf8() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("printf 'crlf\\r\\ncaf\\351\\nlast'")).unwrap();

    assert_eq!(supervisor.wait().await, RunState::Succeeded);
    assert_eq!(drained_texts(&supervisor), ["crlf", "caf\u{fffd}", "last"]);
}

#[tokio::test]
async fn test_worker_environment() {
    let supervisor = ProcessSupervisor::new().with_env("OPENAI_API_KEY", "sk-test");
    supervisor
        .start(&sh("echo \"$PYTHONUNBUFFERED $PYTHONIOENCODING $OPENAI_API_KEY\""))
        .unwrap();

    assert_eq!(supervisor.wait().await, RunState::Succeeded);
    assert_eq!(drained_texts(&supervisor), ["1 utf-8 sk-test"]);
}

#[tokio::test]
async fn test_spawn_failure() {
    let supervisor = ProcessSupervisor::new();
    let result = supervisor.start(&["/nonexistent/autosub-worker", "input.mp4"]);

    assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
    assert!(matches!(supervisor.wait().await, RunState::Failed(FailureCause::Spawn { .. })));
    assert!(supervisor.sink().is_empty());
}

#[tokio::test]
async fn test_cancel_stops_worker() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("echo started; exec sleep 30")).unwrap();
    let pid = supervisor.pid().unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let begin = Instant::now();
    assert_eq!(supervisor.cancel().await, RunState::Cancelled);
    assert!(begin.elapsed() < Duration::from_secs(10));
    assert_eq!(supervisor.state(), RunState::Cancelled);

    // The worker has been reaped by the time cancel returns
    if cfg!(target_os = "linux") {
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }

    assert_eq!(drained_texts(&supervisor), ["started"]);
}

#[tokio::test]
async fn test_cancel_is_distinct_from_failure() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("exec sleep 30")).unwrap();

    let state = supervisor.cancel().await;
    assert_eq!(state, RunState::Cancelled);
    assert!(!matches!(state, RunState::Failed(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_cancels_both_wait_for_exit() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("exec sleep 30")).unwrap();
    let pid = supervisor.pid().unwrap();

    let (first, second) = tokio::join!(supervisor.cancel(), supervisor.cancel());
    assert_eq!(first, RunState::Cancelled);
    assert_eq!(second, RunState::Cancelled);

    if cfg!(target_os = "linux") {
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }
}

#[tokio::test]
async fn test_cancel_after_exit_keeps_outcome() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("exit 0")).unwrap();

    assert_eq!(supervisor.wait().await, RunState::Succeeded);
    assert_eq!(supervisor.cancel().await, RunState::Succeeded);
}

#[tokio::test]
async fn test_single_flight() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("exec sleep 30")).unwrap();

    assert_eq!(supervisor.start(&sh("exit 0")), Err(SupervisorError::AlreadyRunning));
    assert_eq!(supervisor.reset(), Err(SupervisorError::AlreadyRunning));
    assert!(supervisor.state().is_running());

    assert_eq!(supervisor.cancel().await, RunState::Cancelled);
}

#[tokio::test]
async fn test_reset_allows_next_run() {
    let supervisor = ProcessSupervisor::new();
    supervisor.start(&sh("echo 'Transcribed 5 segments'")).unwrap();
    assert_eq!(supervisor.wait().await, RunState::Succeeded);
    assert_eq!(supervisor.tracker().total_segments(), 5);

    assert!(matches!(
        supervisor.start(&sh("exit 0")),
        Err(SupervisorError::NotIdle(RunState::Succeeded))
    ));

    supervisor.reset().unwrap();
    assert_eq!(supervisor.state(), RunState::Idle);
    assert_eq!(supervisor.tracker().total_segments(), 0);

    supervisor.start(&sh("echo again")).unwrap();
    assert_eq!(supervisor.wait().await, RunState::Succeeded);
    assert_eq!(drained_texts(&supervisor), ["Transcribed 5 segments", "again"]);
}

#[tokio::test]
async fn test_subscribe_sees_terminal_state() {
    let supervisor = ProcessSupervisor::new();
    let mut rx = supervisor.subscribe();
    assert_eq!(*rx.borrow_and_update(), RunState::Idle);

    supervisor.start(&sh("exit 0")).unwrap();
    let state = rx.wait_for(RunState::is_terminal).await.unwrap().clone();
    assert_eq!(state, RunState::Succeeded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lines_can_be_drained_while_running() {
    let supervisor = ProcessSupervisor::new();
    supervisor
        .start(&sh("echo 'Transcribed 2 segments'; echo '0.00 --> 1.00 a'; sleep 1; echo '1.00 --> 2.00 b'"))
        .unwrap();

    let sink = supervisor.sink();
    let tracker = supervisor.tracker();
    let mut early = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while early.len() < 2 && Instant::now() < deadline {
        early.extend(sink.drain_available());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(early.len(), 2);
    assert_eq!(tracker.total_segments(), 2);
    assert!(supervisor.state().is_running());

    assert_eq!(supervisor.wait().await, RunState::Succeeded);
    assert_eq!(tracker.processed_segments(), 2);
    assert_eq!(drained_texts(&supervisor), ["1.00 --> 2.00 b"]);
}
