//! Client-side polling loop for tracked tasks.
//!
//! `track` spawns one independent loop per task id: an immediate read, then a
//! fixed-interval poll until a terminal snapshot, the overall timeout budget,
//! a run of transport failures, or a local cancel. A read that comes back
//! NotFound gets exactly one recovery attempt (the fast tier may simply have
//! evicted the entry) before the task is reported as lost. Each terminal
//! condition surfaces as a distinct `PollError` class so callers can choose
//! an appropriate next action.

#![allow(dead_code)] // consumed by polling clients, not by the server binary

pub mod http;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::models::task::ProgressView;

/// The read request itself could not complete (connection refused, 5xx,
/// malformed body). Retried up to a bounded count.
#[derive(Debug, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Outcome of a plain progress read.
#[derive(Debug)]
pub enum ReadOutcome {
    Snapshot(ProgressView),
    /// Fast tier had no entry; the poller tries recovery next.
    NotFound,
}

/// Outcome of a recovery request.
#[derive(Debug)]
pub enum RecoverOutcome {
    Found(ProgressView),
    Recovered(ProgressView),
    NotFound,
}

/// Boundary the poll loop reads through; implemented over HTTP by
/// [`http::HttpProgressTransport`] and by scripted fakes in tests.
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    async fn read_progress(&self, task_id: Uuid) -> Result<ReadOutcome, TransportError>;
    async fn recover_progress(&self, task_id: Uuid) -> Result<RecoverOutcome, TransportError>;
}

/// Why a tracked task stopped without completing.
#[derive(Debug, Error, PartialEq)]
pub enum PollError {
    /// The operation itself failed; carries the server-reported message.
    #[error("task failed: {0}")]
    Operation(String),
    /// Neither tier knows the task: likely expired, or never submitted.
    #[error("task not found; it may have expired or was never submitted")]
    NotFound,
    /// The overall watch budget elapsed; the operation may still be running.
    #[error("timed out waiting for the task to finish")]
    Timeout,
    /// Consecutive transport failures exceeded the retry budget.
    #[error("giving up after {0} consecutive transport failures")]
    RetriesExhausted(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    /// Overall budget from tracking start, independent of the retry counter.
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
            max_retries: 3,
        }
    }
}

/// Local per-task state. `GivenUp` covers not-found, timeout, retry
/// exhaustion, and local cancel; `Failed` is a server-reported operation
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Completed,
    Failed,
    GivenUp,
}

pub struct PollCallbacks {
    /// Invoked once per non-terminal snapshot.
    pub on_progress: Box<dyn FnMut(&ProgressView) + Send>,
    /// Invoked at most once, with the full terminal snapshot (result payload
    /// included).
    pub on_complete: Box<dyn FnOnce(ProgressView) + Send>,
    /// Invoked at most once, with the terminal error class.
    pub on_error: Box<dyn FnOnce(PollError) + Send>,
}

/// Handle to one tracked task. Dropping it does not stop the loop; `cancel`
/// does, locally only — the server-side execution unit keeps running.
pub struct TrackHandle {
    state: Arc<Mutex<PollState>>,
    stop: Arc<Notify>,
    join: JoinHandle<()>,
}

impl TrackHandle {
    pub fn state(&self) -> PollState {
        *self.state.lock().unwrap()
    }

    /// Stops polling and marks local state immediately. No callback fires;
    /// the caller initiated the stop.
    pub fn cancel(&self) {
        transition(&self.state, PollState::GivenUp);
        self.stop.notify_one();
    }

    /// Waits for the poll loop to finish.
    pub async fn finished(self) {
        let _ = self.join.await;
    }
}

/// Starts tracking `task_id`. Tasks tracked concurrently poll independently;
/// there is no shared polling lock.
pub fn track(
    transport: Arc<dyn ProgressTransport>,
    task_id: Uuid,
    config: PollConfig,
    callbacks: PollCallbacks,
) -> TrackHandle {
    let state = Arc::new(Mutex::new(PollState::Polling));
    let stop = Arc::new(Notify::new());
    let join = tokio::spawn(poll_loop(
        transport,
        task_id,
        config,
        callbacks,
        state.clone(),
        stop.clone(),
    ));
    TrackHandle { state, stop, join }
}

/// Moves out of `Polling` exactly once; later transitions lose the race and
/// must not fire callbacks.
fn transition(state: &Mutex<PollState>, next: PollState) -> bool {
    let mut current = state.lock().unwrap();
    if *current == PollState::Polling {
        *current = next;
        true
    } else {
        false
    }
}

enum Round {
    View(ProgressView),
    GiveUp(PollError),
    TransportFailure(TransportError),
}

async fn poll_loop(
    transport: Arc<dyn ProgressTransport>,
    task_id: Uuid,
    config: PollConfig,
    callbacks: PollCallbacks,
    state: Arc<Mutex<PollState>>,
    stop: Arc<Notify>,
) {
    let deadline = Instant::now() + config.timeout;
    let mut failures: u32 = 0;
    let mut on_progress = callbacks.on_progress;
    let mut on_complete = Some(callbacks.on_complete);
    let mut on_error = Some(callbacks.on_error);

    loop {
        let round = match transport.read_progress(task_id).await {
            Ok(ReadOutcome::Snapshot(view)) => Round::View(view),
            // NotFound gets exactly one recovery attempt before escalation.
            Ok(ReadOutcome::NotFound) => match transport.recover_progress(task_id).await {
                Ok(RecoverOutcome::Found(view)) | Ok(RecoverOutcome::Recovered(view)) => {
                    Round::View(view)
                }
                Ok(RecoverOutcome::NotFound) => Round::GiveUp(PollError::NotFound),
                Err(e) => Round::TransportFailure(e),
            },
            Err(e) => Round::TransportFailure(e),
        };

        match round {
            Round::View(view) => {
                failures = 0;
                if let Some(message) = view.error.clone() {
                    if transition(&state, PollState::Failed) {
                        if let Some(cb) = on_error.take() {
                            cb(PollError::Operation(message));
                        }
                    }
                    return;
                }
                if view.completed {
                    if transition(&state, PollState::Completed) {
                        if let Some(cb) = on_complete.take() {
                            cb(view);
                        }
                    }
                    return;
                }
                (on_progress)(&view);
            }
            Round::GiveUp(err) => {
                if transition(&state, PollState::GivenUp) {
                    if let Some(cb) = on_error.take() {
                        cb(err);
                    }
                }
                return;
            }
            Round::TransportFailure(e) => {
                failures += 1;
                debug!(%task_id, failures, "progress poll failed: {e}");
                if failures >= config.max_retries {
                    if transition(&state, PollState::GivenUp) {
                        if let Some(cb) = on_error.take() {
                            cb(PollError::RetriesExhausted(failures));
                        }
                    }
                    return;
                }
            }
        }

        tokio::select! {
            _ = stop.notified() => {
                // state already marked by cancel()
                return;
            }
            _ = time::sleep_until(deadline) => {
                if transition(&state, PollState::GivenUp) {
                    if let Some(cb) = on_error.take() {
                        cb(PollError::Timeout);
                    }
                }
                return;
            }
            _ = time::sleep(config.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::VecDeque;

    fn view(task_id: Uuid, progress: u8, completed: bool, error: Option<&str>) -> ProgressView {
        ProgressView {
            task_id,
            progress,
            status: format!("at {progress}"),
            stage: "1/1".to_string(),
            error: error.map(str::to_string),
            completed,
            elapsed_time: 1,
            estimated_remaining: None,
            timestamp: Utc::now().timestamp(),
            result: Default::default(),
        }
    }

    enum ReadScript {
        View(ProgressView),
        NotFound,
        Fail,
    }

    enum RecoverScript {
        Found(ProgressView),
        Recovered(ProgressView),
        NotFound,
    }

    /// Feeds a fixed script of responses; once the read script is exhausted
    /// it repeats `stuck` forever (or fails, if none is set).
    struct ScriptedTransport {
        reads: Mutex<VecDeque<ReadScript>>,
        recovers: Mutex<VecDeque<RecoverScript>>,
        stuck: Option<ProgressView>,
    }

    impl ScriptedTransport {
        fn new(reads: Vec<ReadScript>, recovers: Vec<RecoverScript>) -> Arc<Self> {
            Arc::new(ScriptedTransport {
                reads: Mutex::new(reads.into()),
                recovers: Mutex::new(recovers.into()),
                stuck: None,
            })
        }

        fn stuck_at(view: ProgressView) -> Arc<Self> {
            Arc::new(ScriptedTransport {
                reads: Mutex::new(VecDeque::new()),
                recovers: Mutex::new(VecDeque::new()),
                stuck: Some(view),
            })
        }
    }

    #[async_trait]
    impl ProgressTransport for ScriptedTransport {
        async fn read_progress(&self, _task_id: Uuid) -> Result<ReadOutcome, TransportError> {
            match self.reads.lock().unwrap().pop_front() {
                Some(ReadScript::View(v)) => Ok(ReadOutcome::Snapshot(v)),
                Some(ReadScript::NotFound) => Ok(ReadOutcome::NotFound),
                Some(ReadScript::Fail) => Err(TransportError("scripted failure".to_string())),
                None => match &self.stuck {
                    Some(v) => Ok(ReadOutcome::Snapshot(v.clone())),
                    None => Err(TransportError("script exhausted".to_string())),
                },
            }
        }

        async fn recover_progress(&self, _task_id: Uuid) -> Result<RecoverOutcome, TransportError> {
            match self.recovers.lock().unwrap().pop_front() {
                Some(RecoverScript::Found(v)) => Ok(RecoverOutcome::Found(v)),
                Some(RecoverScript::Recovered(v)) => Ok(RecoverOutcome::Recovered(v)),
                Some(RecoverScript::NotFound) | None => Ok(RecoverOutcome::NotFound),
            }
        }
    }

    struct Recorder {
        progress: Arc<Mutex<Vec<u8>>>,
        completed: Arc<Mutex<Option<ProgressView>>>,
        error: Arc<Mutex<Option<PollError>>>,
    }

    impl Recorder {
        fn new() -> (Self, PollCallbacks) {
            let progress = Arc::new(Mutex::new(Vec::new()));
            let completed = Arc::new(Mutex::new(None));
            let error = Arc::new(Mutex::new(None));
            let callbacks = PollCallbacks {
                on_progress: {
                    let progress = progress.clone();
                    Box::new(move |v| progress.lock().unwrap().push(v.progress))
                },
                on_complete: {
                    let completed = completed.clone();
                    Box::new(move |v| *completed.lock().unwrap() = Some(v))
                },
                on_error: {
                    let error = error.clone();
                    Box::new(move |e| *error.lock().unwrap() = Some(e))
                },
            };
            (
                Recorder {
                    progress,
                    completed,
                    error,
                },
                callbacks,
            )
        }
    }

    fn fast_config() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
            max_retries: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_then_completion_stops_polling() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new(
            vec![
                ReadScript::View(view(id, 10, false, None)),
                ReadScript::View(view(id, 30, false, None)),
                ReadScript::View(view(id, 100, true, None)),
            ],
            vec![],
        );
        let (recorder, callbacks) = Recorder::new();

        let handle = track(transport, id, fast_config(), callbacks);
        handle.finished().await;

        assert_eq!(*recorder.progress.lock().unwrap(), vec![10, 30]);
        let completed = recorder.completed.lock().unwrap().clone().unwrap();
        assert_eq!(completed.progress, 100);
        assert!(recorder.error.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_carries_result_payload() {
        use crate::models::task::ResultValue;

        let id = Uuid::new_v4();
        let mut terminal = view(id, 100, true, None);
        terminal
            .result
            .insert("job_id".to_string(), ResultValue::Text("j-42".to_string()));
        let transport = ScriptedTransport::new(vec![ReadScript::View(terminal)], vec![]);
        let (recorder, callbacks) = Recorder::new();

        let handle = track(transport, id, fast_config(), callbacks);
        handle.finished().await;

        let completed = recorder.completed.lock().unwrap().clone().unwrap();
        assert_eq!(
            completed.result["job_id"],
            ResultValue::Text("j-42".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_fires_error_callback() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new(
            vec![
                ReadScript::View(view(id, 40, false, None)),
                ReadScript::View(view(id, 40, false, Some("scrape failed"))),
            ],
            vec![],
        );
        let (recorder, callbacks) = Recorder::new();

        let handle = track(transport, id, fast_config(), callbacks);
        let state = {
            let state = handle.state.clone();
            handle.finished().await;
            let s = *state.lock().unwrap();
            s
        };

        assert_eq!(state, PollState::Failed);
        assert_eq!(
            *recorder.error.lock().unwrap(),
            Some(PollError::Operation("scrape failed".to_string()))
        );
        assert!(recorder.completed.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_continues_polling() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new(
            vec![
                ReadScript::NotFound,
                ReadScript::View(view(id, 100, true, None)),
            ],
            vec![RecoverScript::Found(view(id, 40, false, None))],
        );
        let (recorder, callbacks) = Recorder::new();

        let handle = track(transport, id, fast_config(), callbacks);
        handle.finished().await;

        // the recovered snapshot counted as a normal progress read
        assert_eq!(*recorder.progress.lock().unwrap(), vec![40]);
        assert!(recorder.completed.lock().unwrap().is_some());
        assert!(recorder.error.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecoverable_not_found_gives_up() {
        let id = Uuid::new_v4();
        let transport =
            ScriptedTransport::new(vec![ReadScript::NotFound], vec![RecoverScript::NotFound]);
        let (recorder, callbacks) = Recorder::new();

        let handle = track(transport, id, fast_config(), callbacks);
        let state = handle.state.clone();
        handle.finished().await;

        assert_eq!(*state.lock().unwrap(), PollState::GivenUp);
        assert_eq!(*recorder.error.lock().unwrap(), Some(PollError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_despite_steady_progress() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::stuck_at(view(id, 50, false, None));
        let (recorder, callbacks) = Recorder::new();
        let config = PollConfig {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        };

        let started = Instant::now();
        let handle = track(transport, id, config, callbacks);
        handle.finished().await;

        assert_eq!(*recorder.error.lock().unwrap(), Some(PollError::Timeout));
        // fires at the budget, not after some extra interval drift
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert!(recorder.completed.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_transport_failures_exhaust_retries() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new(
            vec![ReadScript::Fail, ReadScript::Fail, ReadScript::Fail],
            vec![],
        );
        let (recorder, callbacks) = Recorder::new();

        let started = Instant::now();
        let handle = track(transport, id, fast_config(), callbacks);
        handle.finished().await;

        assert_eq!(
            *recorder.error.lock().unwrap(),
            Some(PollError::RetriesExhausted(3))
        );
        // gave up right after the third failure, well before the timeout
        assert!(started.elapsed() < fast_config().timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_counter() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new(
            vec![
                ReadScript::Fail,
                ReadScript::Fail,
                ReadScript::View(view(id, 20, false, None)),
                ReadScript::Fail,
                ReadScript::Fail,
                ReadScript::View(view(id, 100, true, None)),
            ],
            vec![],
        );
        let (recorder, callbacks) = Recorder::new();

        let handle = track(transport, id, fast_config(), callbacks);
        handle.finished().await;

        assert!(recorder.completed.lock().unwrap().is_some());
        assert!(recorder.error.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling_without_callbacks() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::stuck_at(view(id, 50, false, None));
        let (recorder, callbacks) = Recorder::new();

        let handle = track(transport, id, fast_config(), callbacks);
        // let the first poll land
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
        assert_eq!(handle.state(), PollState::GivenUp);
        handle.finished().await;

        assert!(recorder.completed.lock().unwrap().is_none());
        assert!(recorder.error.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_tasks_poll_independently() {
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        let transport_a = ScriptedTransport::new(
            vec![
                ReadScript::View(view(id_a, 10, false, None)),
                ReadScript::View(view(id_a, 100, true, None)),
            ],
            vec![],
        );
        let transport_b =
            ScriptedTransport::new(vec![ReadScript::View(view(id_b, 100, true, None))], vec![]);

        let (rec_a, cb_a) = Recorder::new();
        let (rec_b, cb_b) = Recorder::new();

        let handle_a = track(transport_a, id_a, fast_config(), cb_a);
        let handle_b = track(transport_b, id_b, fast_config(), cb_b);
        handle_a.finished().await;
        handle_b.finished().await;

        assert_eq!(
            rec_a.completed.lock().unwrap().clone().unwrap().task_id,
            id_a
        );
        assert_eq!(
            rec_b.completed.lock().unwrap().clone().unwrap().task_id,
            id_b
        );
    }
}
