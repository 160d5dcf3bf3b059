use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration surface consumed by the orchestration core. Supplied at
/// construction time; the core never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WebSocket URL of the already-running chat-client process.
    pub url: String,
    pub connect_attempts: u32,
    pub connect_delay_secs: u64,
    /// How long `send_command` waits for a correlated response.
    pub request_timeout_secs: u64,
    /// Seconds to wait after asking the supervisor to relaunch the process.
    pub restart_grace_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5225".into(),
            connect_attempts: 30,
            connect_delay_secs: 2,
            request_timeout_secs: 30,
            restart_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Admission ceiling: tasks in non-terminal state.
    pub max_concurrent_tasks: usize,
    pub default_timeout_secs: u64,
    /// Per-operation-kind timeout budgets, in seconds.
    #[serde(default = "default_task_timeouts")]
    pub task_timeouts: HashMap<String, u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 50,
            default_timeout_secs: 300,
            task_timeouts: default_task_timeouts(),
        }
    }
}

fn default_task_timeouts() -> HashMap<String, u64> {
    [
        // fast interactive commands
        ("ping", 5),
        ("help", 10),
        ("commands", 10),
        ("status", 15),
        // medium data fetches
        ("plugins", 30),
        ("nist", 30),
        ("contacts", 30),
        ("groups", 30),
        // slow external services
        ("advice", 60),
        ("song", 90),
        ("ai", 120),
        ("ask", 120),
        ("transcribe", 180),
        ("youtube", 300),
        ("loupe", 600),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Path to the external transfer binary.
    pub bin_path: PathBuf,
    /// Root under which per-session temp directories are created.
    pub temp_dir: PathBuf,
    /// Wall-clock budget for one subprocess invocation.
    pub timeout_secs: u64,
    pub max_file_size: u64,
    pub retry_attempts: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            bin_path: PathBuf::from("xftp"),
            temp_dir: std::env::temp_dir().join("courier-xfer"),
            timeout_secs: 300,
            max_file_size: 1024 * 1024 * 1024, // 1 GiB
            retry_attempts: 3,
        }
    }
}
