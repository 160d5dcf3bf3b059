//! Courier gateway — the orchestration core of the chat-automation bot.
//!
//! Three cooperating pieces:
//! - [`client::ChatClient`] speaks the chat CLI's WebSocket protocol:
//!   correlated request/response frames plus asynchronous event dispatch,
//!   with corruption detection and external-process restart.
//! - [`scheduler::TaskScheduler`] runs long operations as bounded concurrent
//!   tasks with per-kind timeouts and completion notices.
//! - [`transfer::TransferClient`] drives the external file-transfer binary
//!   for validated, verified, securely cleaned-up downloads.

pub mod client;
pub mod config;
pub mod notify;
pub mod outbound;
pub mod scheduler;
pub mod supervisor;
pub mod transfer;

pub use client::{ChatClient, ClientStats, EventHandler};
pub use notify::{ChatNotifier, Notifier};
pub use scheduler::TaskScheduler;
pub use supervisor::{CommandSupervisor, NoopSupervisor, ProcessSupervisor};
pub use transfer::TransferClient;
