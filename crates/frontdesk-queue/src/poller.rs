//! Notification Poller — surfaces each newly assigned task at most once per
//! session and suppresses re-surfacing while an acknowledgment settles.
//!
//! One [`PollSession`] per client session. All mutable state lives behind a
//! synchronous mutex that is released before every store call, so the store
//! round-trip is the only suspension point. Dropping a pending call never
//! strands the session: a cancelled check rolls back, and an acknowledge
//! write runs on its own task and settles the session when it finishes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use frontdesk_core::error::{FrontDeskError, Result};
use frontdesk_core::types::TaskSummary;

use crate::tasks::TaskDispatcher;

/// Surfaced ids remembered per session; the oldest are forgotten first.
pub const MAX_SURFACED: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Checking,
    Surfaced,
    Acknowledging,
    CoolingDown,
}

/// Result of an accept/queue action on a surfaced task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    /// This call wrote `acknowledged_at`.
    Acknowledged,
    /// The same id is already being written; no second write was issued.
    AlreadyInFlight,
    /// The id was acknowledged moments ago and is still cooling down.
    AlreadyAcknowledged,
}

#[derive(Debug)]
struct AckWindow {
    state: PollState,
    /// Ids this session has already shown, capped at [`MAX_SURFACED`].
    surfaced: HashSet<String>,
    surfaced_order: VecDeque<String>,
    in_flight: Option<String>,
    last_acked: Option<String>,
    cooldown_until: Option<Instant>,
    /// Bumped per check so a result that raced an acknowledge can be dropped.
    check_seq: u64,
}

impl AckWindow {
    fn new() -> Self {
        Self {
            state: PollState::Idle,
            surfaced: HashSet::new(),
            surfaced_order: VecDeque::new(),
            in_flight: None,
            last_acked: None,
            cooldown_until: None,
            check_seq: 0,
        }
    }

    /// Leave `CoolingDown` once the window has elapsed.
    fn settle(&mut self, now: Instant) {
        if self.state == PollState::CoolingDown
            && self.cooldown_until.is_none_or(|until| now >= until)
        {
            self.state = PollState::Idle;
            self.cooldown_until = None;
        }
    }

    fn remember(&mut self, task_id: &str) {
        if !self.surfaced.insert(task_id.to_string()) {
            return;
        }
        self.surfaced_order.push_back(task_id.to_string());
        while self.surfaced_order.len() > MAX_SURFACED {
            if let Some(oldest) = self.surfaced_order.pop_front() {
                self.surfaced.remove(&oldest);
            }
        }
    }
}

fn lock_window(window: &Mutex<AckWindow>) -> MutexGuard<'_, AckWindow> {
    // The window holds plain data; a panic mid-update cannot leave it torn.
    window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Puts a check that never got its store result back to where it started.
struct CheckGuard<'a> {
    window: &'a Mutex<AckWindow>,
    seq: u64,
    resume: PollState,
    armed: bool,
}

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut window = lock_window(self.window);
        if window.state == PollState::Checking && window.check_seq == self.seq {
            window.state = self.resume;
            tracing::debug!("Poll check cancelled; back to {:?}", self.resume);
        }
    }
}

/// Apply the result of an acknowledge write to the session.
fn finish_acknowledge(
    window: &Mutex<AckWindow>,
    assignee: &str,
    task_id: &str,
    cooldown: Duration,
    result: &Result<()>,
) {
    let mut window = lock_window(window);
    window.in_flight = None;
    match result {
        Ok(()) => {
            window.state = PollState::CoolingDown;
            window.last_acked = Some(task_id.to_string());
            window.cooldown_until = Some(Instant::now() + cooldown);
            tracing::info!("👍 {} acknowledged task {}", assignee, task_id);
        }
        Err(e) => {
            window.state = PollState::Surfaced;
            tracing::warn!("⚠️ Acknowledge of {} by {} failed: {e}", task_id, assignee);
        }
    }
}

/// Per-session poll state machine.
pub struct PollSession {
    assignee: String,
    dispatcher: TaskDispatcher,
    cooldown: Duration,
    window: Arc<Mutex<AckWindow>>,
}

impl PollSession {
    pub fn new(assignee: impl Into<String>, dispatcher: TaskDispatcher, cooldown: Duration) -> Self {
        Self {
            assignee: assignee.into(),
            dispatcher,
            cooldown,
            window: Arc::new(Mutex::new(AckWindow::new())),
        }
    }

    pub fn assignee(&self) -> &str {
        &self.assignee
    }

    pub fn state(&self) -> PollState {
        let mut window = self.lock();
        window.settle(Instant::now());
        window.state
    }

    pub fn has_surfaced(&self, task_id: &str) -> bool {
        self.lock().surfaced.contains(task_id)
    }

    fn lock(&self) -> MutexGuard<'_, AckWindow> {
        lock_window(&self.window)
    }

    /// One poll tick. Returns the newest unacknowledged task for this
    /// session's assignee only if it has never been surfaced here before.
    ///
    /// Yields nothing while acknowledging or cooling down. Store failures are
    /// logged and swallowed; the next tick tries again. If this future is
    /// dropped mid-read, nothing is marked surfaced.
    pub async fn check_for_new(&self) -> Option<TaskSummary> {
        let mut guard = {
            let mut window = self.lock();
            window.settle(Instant::now());
            let resume = match window.state {
                PollState::Idle | PollState::Surfaced => window.state,
                PollState::Checking | PollState::Acknowledging | PollState::CoolingDown => {
                    return None;
                }
            };
            window.state = PollState::Checking;
            window.check_seq += 1;
            CheckGuard {
                window: &self.window,
                seq: window.check_seq,
                resume,
                armed: true,
            }
        };

        let result = self.dispatcher.newest_unacknowledged(&self.assignee).await;
        guard.armed = false;
        let (seq, resume) = (guard.seq, guard.resume);

        let mut window = self.lock();
        if window.state != PollState::Checking || window.check_seq != seq {
            tracing::debug!("Discarding stale poll result for {}", self.assignee);
            return None;
        }
        let candidate = match result {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!("⚠️ Poll for {} failed: {e}", self.assignee);
                window.state = resume;
                return None;
            }
        };
        match candidate {
            Some(task) if !window.surfaced.contains(&task.id) => {
                window.remember(&task.id);
                window.state = PollState::Surfaced;
                tracing::info!("🔔 Surfacing task {} to {}", task.id, self.assignee);
                Some(task.summary())
            }
            _ => {
                window.state = resume;
                None
            }
        }
    }

    /// Accept or queue a surfaced task.
    ///
    /// A store failure leaves the session in `Surfaced` and returns
    /// `Acknowledge`; retrying is the caller's decision. The write runs on
    /// its own task, so it completes even if this future is dropped.
    pub async fn acknowledge(&self, task_id: &str) -> Result<AckOutcome> {
        {
            let mut window = self.lock();
            window.settle(Instant::now());
            match window.in_flight.as_deref() {
                Some(id) if id == task_id => return Ok(AckOutcome::AlreadyInFlight),
                Some(other) => {
                    return Err(FrontDeskError::Acknowledge {
                        task_id: task_id.to_string(),
                        reason: format!("acknowledge of task '{other}' still in flight"),
                    });
                }
                None => {}
            }
            if window.state == PollState::CoolingDown
                && window.last_acked.as_deref() == Some(task_id)
            {
                return Ok(AckOutcome::AlreadyAcknowledged);
            }
            window.remember(task_id);
            window.in_flight = Some(task_id.to_string());
            window.state = PollState::Acknowledging;
        }

        let write = {
            let window = self.window.clone();
            let dispatcher = self.dispatcher.clone();
            let assignee = self.assignee.clone();
            let cooldown = self.cooldown;
            let task_id = task_id.to_string();
            tokio::spawn(async move {
                let result = dispatcher.acknowledge(&task_id).await.map(|_| ());
                finish_acknowledge(&window, &assignee, &task_id, cooldown, &result);
                result
            })
        };

        match write.await {
            Ok(Ok(())) => Ok(AckOutcome::Acknowledged),
            Ok(Err(e)) => Err(e),
            Err(e) => {
                let mut window = self.lock();
                if window.in_flight.as_deref() == Some(task_id) {
                    window.in_flight = None;
                    window.state = PollState::Surfaced;
                }
                Err(FrontDeskError::Acknowledge {
                    task_id: task_id.to_string(),
                    reason: format!("acknowledge task ended early: {e}"),
                })
            }
        }
    }
}

/// Owns the stop signal and join handle of a running poll loop.
pub struct PollerHandle {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Cancel the timer. An acknowledge already running on the session is
    /// not affected.
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            tracing::warn!("Poll loop ended abnormally: {e}");
        }
    }
}

/// Run `check_for_new` every `period` and push new summaries to `sink`.
/// Missed ticks are delayed, never bunched. The loop ends on
/// [`PollerHandle::stop`] or when the sink is dropped.
pub fn spawn_poller(
    session: Arc<PollSession>,
    period: Duration,
    sink: mpsc::Sender<TaskSummary>,
) -> PollerHandle {
    let stop = Arc::new(Notify::new());
    let signal = stop.clone();

    let task = tokio::spawn(async move {
        tracing::info!(
            "⏰ Poller started for {} (every {}ms)",
            session.assignee(),
            period.as_millis()
        );
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = signal.notified() => break,
                _ = interval.tick() => {
                    let Some(summary) = session.check_for_new().await else {
                        continue;
                    };
                    if sink.send(summary).await.is_err() {
                        tracing::debug!("Poll sink for {} closed", session.assignee());
                        break;
                    }
                }
            }
        }
        tracing::info!("⏹️ Poller stopped for {}", session.assignee());
    });

    PollerHandle { stop, task }
}

struct SessionEntry {
    session: Arc<PollSession>,
    last_seen: Instant,
}

/// Per-process poll sessions keyed by `(assignee, session id)`.
///
/// Sessions not touched for `idle_ttl` are swept on the next lookup, unless
/// a caller still holds them.
pub struct SessionRegistry {
    dispatcher: TaskDispatcher,
    cooldown: Duration,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<(String, String), SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(dispatcher: TaskDispatcher, cooldown: Duration, idle_ttl: Duration) -> Self {
        Self {
            dispatcher,
            cooldown,
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Existing session or a fresh one with an empty surfaced-set.
    pub fn session(&self, assignee: &str, session_id: &str) -> Arc<PollSession> {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| {
            now.duration_since(entry.last_seen) < self.idle_ttl
                || Arc::strong_count(&entry.session) > 1
        });
        if sessions.len() < before {
            tracing::debug!("Evicted {} idle poll session(s)", before - sessions.len());
        }

        let entry = sessions
            .entry((assignee.to_string(), session_id.to_string()))
            .or_insert_with(|| SessionEntry {
                session: Arc::new(PollSession::new(assignee, self.dispatcher.clone(), self.cooldown)),
                last_seen: now,
            });
        entry.last_seen = now;
        entry.session.clone()
    }

    /// End a session, e.g. when its client logs out. An acknowledge already
    /// running on it still completes.
    pub fn remove(&self, assignee: &str, session_id: &str) -> bool {
        let removed = self
            .lock()
            .remove(&(assignee.to_string(), session_id.to_string()))
            .is_some();
        if removed {
            tracing::info!("👋 Poll session {session_id} for {assignee} closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
