//! Scrape job lifecycle: start, track, cancel, dismiss.
//!
//! ```text
//! Idle --start()--> Starting --ok--> Tracking --terminal poll--> Terminal
//!                      |                |                           |
//!                      +--error--> Idle +--cancel()--> Terminal     +--dismiss()--> Idle
//! ```
//!
//! The controller owns the poller, so the polling loop outlives any view
//! that observes it. Views subscribe to state changes and may be closed and
//! reopened (`dismiss()` / `restore()` while tracking) without affecting the
//! job or the loop. A single controller tracks at most one job at a time.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::poller::{JobPoller, PollEvent, PollerConfig};
use crate::api::JobApi;
use crate::error::JobError;
use crate::models::{Job, JobStatus};

/// Where the controller is in the job lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    /// No job.
    Idle,
    /// The start request is in flight.
    Starting { source_id: i64 },
    /// A live job is being polled.
    Tracking {
        /// Latest snapshot.
        job: Job,
        /// Polls failed since the last successful one.
        poll_failures: u32,
        /// The view was closed while the job keeps running.
        minimized: bool,
    },
    /// The job is completed, failed or cancelled. The snapshot is final.
    Terminal { job: Job },
}

impl ControllerState {
    /// The cached snapshot, if any.
    #[cfg(test)]
    pub const fn job(&self) -> Option<&Job> {
        match self {
            Self::Tracking { job, .. } | Self::Terminal { job } => Some(job),
            Self::Idle | Self::Starting { .. } => None,
        }
    }

    /// Whether the single job slot is occupied.
    #[cfg(test)]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Starting { .. } | Self::Tracking { .. })
    }
}

/// Result of a local cancellation.
#[derive(Debug)]
pub struct Cancellation {
    /// The snapshot as it was forced to `Cancelled`.
    pub job: Job,
    /// The best-effort server-side cancel request. Awaiting it is optional.
    pub request: JoinHandle<()>,
}

type TerminalHook = Box<dyn Fn(&Job) + Send + Sync>;

struct Inner {
    state: ControllerState,
    poller: Option<JobPoller>,
    /// Bumped whenever a poller is replaced or stopped; events from older
    /// pollers are discarded.
    generation: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ControllerState>,
    on_terminal: OnceLock<TerminalHook>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut Inner, state: ControllerState) {
        inner.state = state;
        self.publish(&inner.state);
    }

    fn publish(&self, state: &ControllerState) {
        self.state_tx.send_replace(state.clone());
    }

    /// Must be called without holding the lock.
    fn fire_terminal(&self, job: &Job) {
        if let Some(hook) = self.on_terminal.get() {
            hook(job);
        }
    }

    fn apply(&self, generation: u64, event: PollEvent) {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.generation != generation {
            debug!("discarding poll event from a stopped poller");
            return;
        }
        if !matches!(inner.state, ControllerState::Tracking { .. }) {
            return;
        }

        match event {
            PollEvent::Snapshot(job) => {
                if let ControllerState::Tracking {
                    job: ref mut cached,
                    ref mut poll_failures,
                    ..
                } = inner.state
                {
                    *cached = job;
                    *poll_failures = 0;
                }
                self.publish(&inner.state);
            }
            PollEvent::Transient(err) => {
                if let ControllerState::Tracking {
                    ref mut poll_failures,
                    ..
                } = inner.state
                {
                    *poll_failures += 1;
                    debug!(failures = *poll_failures, error = %err, "poll failed");
                }
                self.publish(&inner.state);
            }
            PollEvent::Finished(job) => {
                info!(
                    job_id = %job.job_id,
                    status = %job.status,
                    new = job.new_count,
                    updated = job.updated_count,
                    errors = job.error_count,
                    "scrape job finished"
                );
                inner.poller = None;
                self.set_state(inner, ControllerState::Terminal { job: job.clone() });
                drop(guard);
                self.fire_terminal(&job);
            }
        }
    }
}

/// Resets a start that was abandoned mid-request back to `Idle`.
struct StartGuard<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.shared.lock();
        if inner.generation == self.generation
            && matches!(inner.state, ControllerState::Starting { .. })
        {
            debug!("start request abandoned");
            self.shared.set_state(&mut inner, ControllerState::Idle);
        }
    }
}

/// Drives one scrape job at a time through its lifecycle.
pub struct JobController<A: JobApi> {
    api: Arc<A>,
    config: PollerConfig,
    shared: Arc<Shared>,
}

impl<A: JobApi> JobController<A> {
    pub fn new(api: Arc<A>, config: PollerConfig) -> Self {
        let (state_tx, _) = watch::channel(ControllerState::Idle);
        Self {
            api,
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ControllerState::Idle,
                    poller: None,
                    generation: 0,
                }),
                state_tx,
                on_terminal: OnceLock::new(),
            }),
        }
    }

    /// Register a callback run once each time a job reaches a terminal
    /// state, e.g. to refresh views derived from the scraped data.
    /// Only the first registered hook is kept.
    #[must_use]
    pub fn on_terminal(self, hook: impl Fn(&Job) + Send + Sync + 'static) -> Self {
        if self.shared.on_terminal.set(Box::new(hook)).is_err() {
            warn!("terminal hook already registered, ignoring");
        }
        self
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        self.shared.lock().state.clone()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.shared.state_tx.subscribe()
    }

    /// Start a scrape job for `source_id` and begin polling it.
    ///
    /// Rejected while another job is starting or being tracked. A finished
    /// job is dismissed implicitly. On failure the controller is back to
    /// `Idle` and nothing is polled.
    pub async fn start(&self, source_id: i64) -> Result<Job, JobError> {
        let generation = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            match &inner.state {
                ControllerState::Starting { source_id: busy } => {
                    return Err(JobError::AlreadyTracking(format!("source {busy}")));
                }
                ControllerState::Tracking { job, .. } => {
                    return Err(JobError::AlreadyTracking(job.job_id.clone()));
                }
                ControllerState::Idle | ControllerState::Terminal { .. } => {}
            }
            inner.poller = None;
            inner.generation += 1;
            self.shared
                .set_state(inner, ControllerState::Starting { source_id });
            inner.generation
        };

        let mut start_guard = StartGuard {
            shared: &self.shared,
            generation,
            armed: true,
        };

        info!(source_id, "starting scrape job");
        let response = self.api.start_job(source_id).await;
        start_guard.armed = false;

        let mut guard = self.shared.lock();
        let inner = &mut *guard;

        let started = match response {
            Ok(started) => started,
            Err(err) => {
                warn!(source_id, error = %err, "failed to start scrape job");
                self.shared.set_state(inner, ControllerState::Idle);
                return Err(JobError::StartFailed(err));
            }
        };

        let already_running = started.already_running();
        let job = started.job;

        if job.is_terminal() {
            self.shared
                .set_state(inner, ControllerState::Terminal { job: job.clone() });
            drop(guard);
            self.shared.fire_terminal(&job);
            return Ok(job);
        }

        if already_running {
            info!(job_id = %job.job_id, "job already running, attaching");
        } else {
            info!(job_id = %job.job_id, source = %job.source_name, "scrape job started");
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        inner.poller = Some(JobPoller::spawn(
            Arc::clone(&self.api),
            job.job_id.clone(),
            self.config,
            move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.apply(generation, event);
                }
            },
        ));
        self.shared.set_state(
            inner,
            ControllerState::Tracking {
                job: job.clone(),
                poll_failures: 0,
                minimized: false,
            },
        );

        Ok(job)
    }

    /// Cancel the tracked job.
    ///
    /// Takes effect locally right away: polling stops and the job is marked
    /// `Cancelled`. The server-side cancel request runs in the background
    /// and its outcome is only logged. Must be called from within a Tokio
    /// runtime.
    pub fn cancel(&self) -> Result<Cancellation, JobError> {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;

        let ControllerState::Tracking { job, .. } = &inner.state else {
            return Err(JobError::NotTracking);
        };
        let mut job = job.clone();

        inner.generation += 1;
        if let Some(poller) = inner.poller.take() {
            poller.stop();
        }
        job.mark_cancelled(Utc::now());
        self.shared
            .set_state(inner, ControllerState::Terminal { job: job.clone() });
        drop(guard);

        info!(job_id = %job.job_id, "scrape job cancelled");

        let api = Arc::clone(&self.api);
        let job_id = job.job_id.clone();
        let request = tokio::spawn(async move {
            match api.cancel_job(&job_id).await {
                Ok(()) => debug!(job_id = %job_id, "server acknowledged cancellation"),
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "server-side cancellation failed");
                }
            }
        });

        self.shared.fire_terminal(&job);
        Ok(Cancellation { job, request })
    }

    /// Close the job view.
    ///
    /// A finished job is cleared and the controller returns to `Idle`. A
    /// live job is only minimized: polling continues and the slot stays
    /// occupied. Safe to call repeatedly; ignored while starting.
    #[allow(dead_code)]
    pub fn dismiss(&self) {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;

        match inner.state {
            ControllerState::Tracking {
                ref mut minimized, ..
            } => {
                if !*minimized {
                    *minimized = true;
                    debug!("job view minimized, polling continues");
                    self.shared.publish(&inner.state);
                }
            }
            ControllerState::Terminal { .. } => {
                inner.poller = None;
                self.shared.set_state(inner, ControllerState::Idle);
            }
            ControllerState::Idle => inner.poller = None,
            ControllerState::Starting { .. } => {}
        }
    }

    /// Re-open a minimized job view. Returns whether anything changed.
    #[allow(dead_code)]
    pub fn restore(&self) -> bool {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;

        if let ControllerState::Tracking {
            ref mut minimized, ..
        } = inner.state
        {
            if *minimized {
                *minimized = false;
                self.shared.publish(&inner.state);
                return true;
            }
        }
        false
    }

    /// Wait until the tracked job is terminal. Returns `None` if the
    /// controller is or becomes idle first.
    pub async fn wait_for_terminal(&self) -> Option<Job> {
        let mut rx = self.subscribe();
        loop {
            match &*rx.borrow_and_update() {
                ControllerState::Terminal { job } => return Some(job.clone()),
                ControllerState::Idle => return None,
                ControllerState::Starting { .. } | ControllerState::Tracking { .. } => {}
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl<A: JobApi> Drop for JobController<A> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        inner.poller = None;
    }
}

/// Map a terminal snapshot to the caller-facing result: a failed job is an
/// error carrying the backend's message verbatim.
pub fn outcome(job: Job) -> Result<Job, JobError> {
    if job.status == JobStatus::Failed {
        return Err(JobError::JobFailed {
            message: job
                .error_message
                .unwrap_or_else(|| "unknown error".to_string()),
            job_id: job.job_id,
        });
    }
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::jobs::presenter::JobView;
    use crate::jobs::testing::{running, with_status, ScriptedApi};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time;

    const TICK: Duration = Duration::from_millis(2000);

    fn controller(api: &Arc<ScriptedApi>) -> (JobController<ScriptedApi>, Arc<AtomicUsize>) {
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&hook_calls);
        let controller = JobController::new(Arc::clone(api), PollerConfig::every(TICK))
            .on_terminal(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        (controller, hook_calls)
    }

    async fn after_ticks(n: u32) {
        time::sleep(TICK * n + Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_job_stops_polling() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.push_fetch(Ok(running("job-1", 5, 50, 10)));
        let mut done = running("job-1", 50, 50, 100);
        done.status = JobStatus::Completed;
        done.new_count = 12;
        api.push_fetch(Ok(done));

        let (controller, hook_calls) = controller(&api);
        controller.start(1).await.unwrap();
        assert!(controller.state().is_busy());

        after_ticks(1).await;
        let state = controller.state();
        let view = JobView::from_job(state.job().unwrap());
        assert_eq!(view.progress_line(), "10%, 5/50");

        time::sleep(TICK).await;
        match controller.state() {
            ControllerState::Terminal { job } => {
                assert_eq!(job.status, JobStatus::Completed);
                assert_eq!(job.new_count, 12);
            }
            other => panic!("expected terminal state, got {other:?}"),
        }

        after_ticks(2).await;
        assert_eq!(api.fetch_count(), 2);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_failure_keeps_tracking() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.push_fetch(Err(ApiError::Timeout(TICK)));
        api.push_fetch(Ok(running("job-1", 1, 0, 0)));

        let (controller, hook_calls) = controller(&api);
        controller.start(1).await.unwrap();

        after_ticks(1).await;
        assert!(matches!(
            controller.state(),
            ControllerState::Tracking { poll_failures: 1, .. }
        ));

        time::sleep(TICK).await;
        match controller.state() {
            ControllerState::Tracking {
                job, poll_failures, ..
            } => {
                assert_eq!(job.status, JobStatus::Running);
                assert_eq!(poll_failures, 0);
            }
            other => panic!("expected tracking state, got {other:?}"),
        }
        assert_eq!(api.fetch_count(), 2);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_leaves_controller_idle() {
        let api = Arc::new(ScriptedApi::default());
        api.push_start(Err(ApiError::Status {
            status: 500,
            message: "Internal Server Error".to_string(),
        }));

        let (controller, _) = controller(&api);
        let err = controller.start(1).await.unwrap_err();
        assert!(matches!(err, JobError::StartFailed(ref e) if e.status() == Some(500)));
        assert_eq!(controller.state(), ControllerState::Idle);

        after_ticks(3).await;
        assert_eq!(api.fetch_count(), 0);
        assert!(controller.state().job().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected_while_tracking() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.push_started(with_status("job-2", JobStatus::Pending));

        let (controller, _) = controller(&api);
        controller.start(1).await.unwrap();

        let err = controller.start(2).await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyTracking(ref id) if id == "job-1"));
        assert_eq!(api.start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_rejected_while_starting() {
        let api = Arc::new(ScriptedApi::default());
        api.hold_starts();
        api.push_started(with_status("job-1", JobStatus::Pending));

        let (controller, _) = controller(&api);
        let controller = Arc::new(controller);
        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.start(1).await }
        });
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(controller.state(), ControllerState::Starting { source_id: 1 });

        let err = controller.start(2).await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyTracking(ref busy) if busy == "source 1"));
        assert_eq!(api.start_count(), 1);

        api.open_starts();
        let job = first.await.unwrap().unwrap();
        assert_eq!(job.job_id, "job-1");
        assert!(matches!(controller.state(), ControllerState::Tracking { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_start_returns_to_idle() {
        let api = Arc::new(ScriptedApi::default());
        api.hold_starts();
        api.push_started(with_status("job-1", JobStatus::Pending));

        let (controller, hook_calls) = controller(&api);
        let controller = Arc::new(controller);
        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.start(1).await }
        });
        time::sleep(Duration::from_millis(1)).await;
        assert!(controller.state().is_busy());

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(controller.state(), ControllerState::Idle);

        api.open_starts();
        let job = controller.start(1).await.unwrap();
        assert_eq!(job.job_id, "job-1");
        assert!(matches!(controller.state(), ControllerState::Tracking { .. }));
        assert_eq!(api.start_count(), 2);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_immediate_and_stops_polling() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        for _ in 0..5 {
            api.push_fetch(Ok(running("job-1", 5, 50, 10)));
        }

        let (controller, hook_calls) = controller(&api);
        controller.start(1).await.unwrap();
        after_ticks(1).await;
        assert_eq!(api.fetch_count(), 1);

        let cancellation = controller.cancel().unwrap();
        assert_eq!(cancellation.job.status, JobStatus::Cancelled);
        assert!(cancellation.job.finished_at.is_some());
        assert!(matches!(
            controller.state(),
            ControllerState::Terminal { ref job } if job.status == JobStatus::Cancelled
        ));

        cancellation.request.await.unwrap();
        assert_eq!(api.cancelled_ids(), vec!["job-1".to_string()]);

        after_ticks(3).await;
        assert_eq!(api.fetch_count(), 1);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_survives_failed_server_request() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.fail_cancels();

        let (controller, _) = controller(&api);
        controller.start(1).await.unwrap();
        let cancellation = controller.cancel().unwrap();
        cancellation.request.await.unwrap();

        assert_eq!(
            controller.state().job().map(|j| j.status),
            Some(JobStatus::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_poll_cannot_override_cancel() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.set_fetch_delay(Duration::from_millis(500));
        api.push_fetch(Ok(with_status("job-1", JobStatus::Completed)));

        let config = PollerConfig {
            interval: TICK,
            fetch_timeout: TICK,
        };
        let controller = JobController::new(Arc::clone(&api), config);
        controller.start(1).await.unwrap();

        // The fetch is now in flight.
        time::sleep(TICK + Duration::from_millis(100)).await;
        assert_eq!(api.fetch_count(), 1);
        controller.cancel().unwrap();

        after_ticks(2).await;
        assert_eq!(
            controller.state().job().map(|j| j.status),
            Some(JobStatus::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_requires_a_tracked_job() {
        let api = Arc::new(ScriptedApi::default());
        let (controller, _) = controller(&api);
        assert!(matches!(controller.cancel(), Err(JobError::NotTracking)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimize_keeps_polling() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.push_fetch(Ok(running("job-1", 5, 50, 10)));
        api.push_fetch(Ok(running("job-1", 10, 50, 20)));

        let (controller, _) = controller(&api);
        controller.start(1).await.unwrap();

        controller.dismiss();
        controller.dismiss();
        assert!(matches!(
            controller.state(),
            ControllerState::Tracking { minimized: true, .. }
        ));
        assert!(controller.state().is_busy());

        after_ticks(2).await;
        assert_eq!(api.fetch_count(), 2);

        assert!(controller.restore());
        assert!(!controller.restore());
        match controller.state() {
            ControllerState::Tracking { job, minimized, .. } => {
                assert!(!minimized);
                assert_eq!(job.processed, 10);
            }
            other => panic!("expected tracking state, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_terminal_returns_to_idle() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.push_fetch(Ok(with_status("job-1", JobStatus::Failed)));
        api.push_started(with_status("job-2", JobStatus::Pending));

        let (controller, _) = controller(&api);
        controller.start(1).await.unwrap();
        let finished = controller.wait_for_terminal().await.unwrap();

        let err = outcome(finished).unwrap_err();
        assert!(err.to_string().contains("Source website 1 not found"));

        controller.dismiss();
        assert_eq!(controller.state(), ControllerState::Idle);
        controller.dismiss();
        assert_eq!(controller.state(), ControllerState::Idle);

        controller.start(1).await.unwrap();
        assert_eq!(
            controller.state().job().map(|j| j.job_id.as_str()),
            Some("job-2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_from_terminal_dismisses_previous_job() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.push_started(with_status("job-2", JobStatus::Pending));

        let (controller, _) = controller(&api);
        controller.start(1).await.unwrap();
        controller.cancel().unwrap();

        let job = controller.start(1).await.unwrap();
        assert_eq!(job.job_id, "job-2");
        assert!(matches!(controller.state(), ControllerState::Tracking { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_start_response_skips_polling() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Completed));

        let (controller, hook_calls) = controller(&api);
        controller.start(1).await.unwrap();

        after_ticks(2).await;
        assert_eq!(api.fetch_count(), 0);
        assert!(matches!(controller.state(), ControllerState::Terminal { .. }));
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_controller_stops_polling() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        for _ in 0..5 {
            api.push_fetch(Ok(running("job-1", 1, 10, 10)));
        }

        let (controller, _) = controller(&api);
        controller.start(1).await.unwrap();
        drop(controller);

        after_ticks(3).await;
        assert_eq!(api.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_transitions() {
        let api = Arc::new(ScriptedApi::default());
        api.push_started(with_status("job-1", JobStatus::Pending));
        api.push_fetch(Ok(with_status("job-1", JobStatus::Completed)));

        let (controller, _) = controller(&api);
        let rx = controller.subscribe();
        assert_eq!(*rx.borrow(), ControllerState::Idle);

        controller.start(1).await.unwrap();
        assert!(matches!(*rx.borrow(), ControllerState::Tracking { .. }));

        let job = controller.wait_for_terminal().await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(matches!(*rx.borrow(), ControllerState::Terminal { .. }));
    }

    #[test]
    fn test_outcome_passes_non_failed_jobs() {
        for status in [JobStatus::Completed, JobStatus::Cancelled] {
            assert!(outcome(with_status("j", status)).is_ok());
        }
        assert!(matches!(
            outcome(with_status("j", JobStatus::Failed)),
            Err(JobError::JobFailed { ref job_id, .. }) if job_id == "j"
        ));
    }
}
