//! Result-delivery callback — the sole channel through which the core talks
//! back to the outside world. Message routing beyond this point is the
//! caller's concern.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::client::ChatClient;

/// Delivers a text payload to a destination (acknowledgments, completions,
/// timeouts, failures, capacity notices). Implementations must not fail the
/// caller; delivery problems are theirs to log.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, destination: &str, text: &str);
}

/// Production notifier: routes payloads through the connection gateway as
/// chat messages.
pub struct ChatNotifier {
    client: Arc<ChatClient>,
}

impl ChatNotifier {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn deliver(&self, destination: &str, text: &str) {
        if let Err(e) = self.client.send_message(destination, text).await {
            error!(destination, error = %e, "failed to deliver notification");
        }
    }
}
