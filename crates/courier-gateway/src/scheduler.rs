//! Task scheduler — immediate acknowledgment plus bounded concurrent
//! execution with per-operation-kind timeouts.
//!
//! One task's failure, timeout, or cancellation never blocks admission of new
//! tasks or touches other in-flight tasks; every submission yields exactly
//! one terminal notification.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use courier_types::config::SchedulerConfig;
use courier_types::task::{SchedulerStats, TaskContext, TaskRecord, TaskSnapshot, TaskStatus};

use crate::notify::Notifier;

/// Completed tasks retained for observability; oldest-by-completion evicted.
const HISTORY_CAP: usize = 100;

struct ActiveTask {
    record: TaskRecord,
    handle: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    notifier: Arc<dyn Notifier>,
    max_concurrent: usize,
    default_timeout: Duration,
    timeouts: HashMap<String, Duration>,

    active: Mutex<HashMap<Uuid, ActiveTask>>,
    history: Mutex<VecDeque<TaskRecord>>,

    total_submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    pub fn new(config: &SchedulerConfig, notifier: Arc<dyn Notifier>) -> Self {
        let timeouts = config
            .task_timeouts
            .iter()
            .map(|(k, secs)| (k.clone(), Duration::from_secs(*secs)))
            .collect();
        Self {
            inner: Arc::new(SchedulerInner {
                notifier,
                max_concurrent: config.max_concurrent_tasks,
                default_timeout: Duration::from_secs(config.default_timeout_secs),
                timeouts,
                active: Mutex::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
                total_submitted: AtomicU64::new(0),
                succeeded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                timed_out: AtomicU64::new(0),
            }),
        }
    }

    /// Submit an operation. The caller gets an immediate acknowledgment (or a
    /// capacity-exceeded notice, in which case no task is created and `None`
    /// is returned); the handler then runs as an independent task under the
    /// operation kind's timeout budget.
    pub async fn submit<F, Fut>(&self, context: TaskContext, handler: F) -> Option<Uuid>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let record = TaskRecord::new(context.clone());
        let id = record.id;
        let short_id = record.short_id();

        // Admission check and insertion under one lock acquisition, so the
        // non-terminal count can never exceed the ceiling.
        {
            let mut active = self.inner.active.lock().unwrap();
            if active.len() >= self.inner.max_concurrent {
                drop(active);
                warn!(
                    kind = %context.kind,
                    caller = %context.caller,
                    ceiling = self.inner.max_concurrent,
                    "task admission refused, at capacity"
                );
                self.inner
                    .notifier
                    .deliver(
                        &context.destination,
                        &format!(
                            "System at capacity: {} concurrent tasks already running. \
                             Please wait for some to finish and try again.",
                            self.inner.max_concurrent
                        ),
                    )
                    .await;
                return None;
            }
            active.insert(
                id,
                ActiveTask {
                    record,
                    handle: None,
                },
            );
        }
        self.inner.total_submitted.fetch_add(1, Ordering::Relaxed);

        let budget = self.inner.timeout_for(&context.kind);
        self.inner
            .notifier
            .deliver(
                &context.destination,
                &format!(
                    "Processing `{}` (task `{short_id}`), expected completion {}. \
                     You can keep using other commands meanwhile.",
                    context.kind,
                    eta_bucket(budget)
                ),
            )
            .await;
        info!(task = %short_id, kind = %context.kind, caller = %context.caller, "task submitted");

        let future = handler(context);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            inner.run_task(id, budget, future).await;
        });
        // The task may already have finished and removed itself; then the
        // handle is simply not retained.
        if let Some(entry) = self.inner.active.lock().unwrap().get_mut(&id) {
            entry.handle = Some(handle);
        }
        Some(id)
    }

    /// Cancel an active task by exact id or unique short-id prefix. Returns
    /// whether a task was found and cancelled.
    pub async fn cancel(&self, id_or_prefix: &str) -> bool {
        let needle = id_or_prefix.trim();
        if needle.is_empty() {
            return false;
        }
        let entry = {
            let mut active = self.inner.active.lock().unwrap();
            let matches: Vec<Uuid> = active
                .keys()
                .filter(|id| {
                    id.to_string() == needle || id.simple().to_string().starts_with(needle)
                })
                .copied()
                .collect();
            match matches.as_slice() {
                [id] => active.remove(id),
                _ => None,
            }
        };
        let Some(entry) = entry else {
            return false;
        };

        if let Some(handle) = entry.handle {
            handle.abort();
        }
        let mut record = entry.record;
        let short_id = record.short_id();
        let kind = record.context.kind.clone();
        let destination = record.context.destination.clone();
        record.status = TaskStatus::Cancelled;
        record.completed_at = Some(Utc::now());
        record.error = Some("cancelled by user".into());
        self.inner.push_history(record);
        self.inner.failed.fetch_add(1, Ordering::Relaxed);

        info!(task = %short_id, %kind, "task cancelled");
        self.inner
            .notifier
            .deliver(
                &destination,
                &format!("Task `{short_id}` cancelled: `{kind}` was stopped."),
            )
            .await;
        true
    }

    /// Aggregate counters since start.
    pub fn status(&self) -> SchedulerStats {
        let (active_tasks, pending_tasks, running_tasks) = {
            let active = self.inner.active.lock().unwrap();
            let pending = active
                .values()
                .filter(|t| t.record.status == TaskStatus::Pending)
                .count();
            let running = active
                .values()
                .filter(|t| t.record.status == TaskStatus::Running)
                .count();
            (active.len(), pending, running)
        };
        let total = self.inner.total_submitted.load(Ordering::Relaxed);
        let succeeded = self.inner.succeeded.load(Ordering::Relaxed);
        SchedulerStats {
            active_tasks,
            pending_tasks,
            running_tasks,
            capacity_used_percent: (active_tasks as f64 / self.inner.max_concurrent as f64)
                * 100.0,
            total_submitted: total,
            succeeded,
            failed: self.inner.failed.load(Ordering::Relaxed),
            timed_out: self.inner.timed_out.load(Ordering::Relaxed),
            success_rate: (succeeded as f64 / total.max(1) as f64) * 100.0,
        }
    }

    /// Snapshots of the currently active tasks.
    pub fn active_tasks(&self) -> Vec<TaskSnapshot> {
        let now = Utc::now();
        let active = self.inner.active.lock().unwrap();
        active
            .values()
            .map(|t| TaskSnapshot {
                short_id: t.record.short_id(),
                kind: t.record.context.kind.clone(),
                status: t.record.status,
                caller: t.record.context.caller.clone(),
                destination: t.record.context.destination.clone(),
                elapsed_secs: (now - t.record.created_at).num_milliseconds() as f64 / 1000.0,
                timeout_secs: self.inner.timeout_for(&t.record.context.kind).as_secs(),
            })
            .collect()
    }

    /// Completed-history snapshot, in completion order (oldest first).
    pub fn history(&self) -> Vec<TaskRecord> {
        self.inner.history.lock().unwrap().iter().cloned().collect()
    }
}

impl SchedulerInner {
    fn timeout_for(&self, kind: &str) -> Duration {
        self.timeouts.get(kind).copied().unwrap_or(self.default_timeout)
    }

    async fn run_task(
        self: Arc<Self>,
        id: Uuid,
        budget: Duration,
        future: impl Future<Output = Result<String>>,
    ) {
        let (short_id, kind, destination) = {
            let mut active = self.active.lock().unwrap();
            // Already cancelled before it started.
            let Some(entry) = active.get_mut(&id) else {
                return;
            };
            entry.record.status = TaskStatus::Running;
            entry.record.started_at = Some(Utc::now());
            (
                entry.record.short_id(),
                entry.record.context.kind.clone(),
                entry.record.context.destination.clone(),
            )
        };
        info!(task = %short_id, %kind, "task running");
        let started = Utc::now();

        // Dropping the future on timeout is the cancellation signal; a
        // handler that ignores it is still retired from the active set.
        let (status, result, err, notice) = match tokio::time::timeout(budget, future).await {
            Ok(Ok(output)) => {
                let elapsed = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;
                info!(task = %short_id, %kind, elapsed, "task completed");
                let notice = format!("Task `{short_id}` completed ({elapsed:.1}s)\n\n{output}");
                (TaskStatus::Completed, Some(output), None, notice)
            }
            Ok(Err(e)) => {
                error!(task = %short_id, %kind, error = %format!("{e:#}"), "task failed");
                let msg = format!("{e:#}");
                let notice = format!(
                    "Task `{short_id}` failed: `{kind}` hit an error:\n{msg}\n\
                     Check the command and try again."
                );
                (TaskStatus::Failed, None, Some(msg), notice)
            }
            Err(_) => {
                warn!(task = %short_id, %kind, budget_secs = budget.as_secs(), "task timed out");
                let msg = format!("timed out after {} seconds", budget.as_secs());
                let notice = format!(
                    "Task `{short_id}` timed out: `{kind}` exceeded its {}s budget. \
                     You can try running it again.",
                    budget.as_secs()
                );
                (TaskStatus::TimedOut, None, Some(msg), notice)
            }
        };

        if self.finalize(id, status, result, err) {
            self.notifier.deliver(&destination, &notice).await;
        }
    }

    /// Move a task from the active table to history with its terminal status.
    /// Returns false if the task was already retired (cancelled). The
    /// aggregate counters move with the removal, so a task retired by a
    /// concurrent `cancel` is counted exactly once.
    fn finalize(
        &self,
        id: Uuid,
        status: TaskStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> bool {
        let Some(entry) = self.active.lock().unwrap().remove(&id) else {
            return false;
        };
        match status {
            TaskStatus::Completed => self.succeeded.fetch_add(1, Ordering::Relaxed),
            TaskStatus::TimedOut => self.timed_out.fetch_add(1, Ordering::Relaxed),
            _ => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        let mut record = entry.record;
        record.status = status;
        record.completed_at = Some(Utc::now());
        record.result = result;
        record.error = error;
        self.push_history(record);
        true
    }

    fn push_history(&self, record: TaskRecord) {
        let mut history = self.history.lock().unwrap();
        // Pushed in completion order, so the front is oldest-by-completion.
        history.push_back(record);
        while history.len() > HISTORY_CAP {
            history.pop_front();
        }
    }
}

/// Human estimate bucket derived from the operation's timeout budget.
fn eta_bucket(budget: Duration) -> &'static str {
    match budget.as_secs() {
        0..=30 => "shortly",
        31..=120 => "in 1-2 minutes",
        121..=300 => "in 2-5 minutes",
        _ => "in several minutes",
    }
}
