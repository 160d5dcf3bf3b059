use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a task came from and where its results go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    /// Display name of the user who triggered the operation.
    pub caller: String,
    /// Destination identifier for result delivery (chat id).
    pub destination: String,
    /// Operation kind, used to select the timeout budget.
    pub kind: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are final; no task re-enters `Running` afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One scheduled background operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub context: TaskContext,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(context: TaskContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// First 8 hex chars of the id, as shown to users.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

/// Read-only view of one active task, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub short_id: String,
    pub kind: String,
    pub status: TaskStatus,
    pub caller: String,
    pub destination: String,
    pub elapsed_secs: f64,
    pub timeout_secs: u64,
}

/// Aggregate scheduler counters since start.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub active_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub capacity_used_percent: f64,
    pub total_submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub success_rate: f64,
}
