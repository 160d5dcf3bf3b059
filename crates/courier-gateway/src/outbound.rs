//! Outbound chat messages: `@{contact} text` command frames, with long
//! messages split at natural break points.

use anyhow::Result;
use courier_types::wire::ResponseFrame;
use std::time::Duration;
use tracing::info;

use crate::client::ChatClient;

/// The chat client rejects messages longer than this.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Delay between chunks of a split message, to avoid flooding.
const CHUNK_DELAY: Duration = Duration::from_millis(500);

impl ChatClient {
    /// Send a text message to a contact or chat, splitting messages over
    /// [`MAX_MESSAGE_LEN`] into parts with `(part i/n)` markers.
    pub async fn send_message(&self, destination: &str, text: &str) -> Result<()> {
        let chunks = split_message(text, MAX_MESSAGE_LEN);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            let body = if total > 1 {
                format!("{chunk}\n\n--- (part {}/{total}) ---", i + 1)
            } else {
                chunk.clone()
            };
            self.send_command(&format!("@{destination} {body}"), false)
                .await?;
            if i + 1 < total {
                tokio::time::sleep(CHUNK_DELAY).await;
            }
        }
        if total > 1 {
            info!(destination, parts = total, "sent split message");
        }
        Ok(())
    }

    /// Accept an incoming contact request by number.
    pub async fn accept_contact_request(&self, request_number: u64) -> Result<()> {
        self.send_command(&format!("/ac {request_number}"), false)
            .await?;
        info!(request_number, "accepted contact request");
        Ok(())
    }

    /// Connect to an address or invitation link, awaiting the response.
    pub async fn connect_to_address(&self, address: &str) -> Result<Option<ResponseFrame>> {
        self.send_command(&format!("/c {address}"), true).await
    }
}

/// Split at paragraph boundaries where possible, falling back to hard splits
/// for oversized paragraphs. The split reserves headroom for part markers.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }
    // Leave room for the appended part marker.
    let budget = max_len.saturating_sub(32).max(1);

    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n") {
        for piece in hard_split(paragraph, budget) {
            let sep = if current.is_empty() { 0 } else { 2 };
            if current.len() + sep + piece.len() > budget {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Slice an oversized paragraph into budget-sized pieces on char boundaries.
fn hard_split(paragraph: &str, budget: usize) -> Vec<&str> {
    if paragraph.len() <= budget {
        return vec![paragraph];
    }
    let mut pieces = Vec::new();
    let mut rest = paragraph;
    while rest.len() > budget {
        let mut cut = budget;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}
