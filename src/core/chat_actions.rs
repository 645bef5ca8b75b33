// Chat actions - the side effects the core asks the chat platform to perform.
//
// The core never talks to a chat platform directly. Services return or trigger
// actions through this port, and the platform layer implements it.
// Every action is best-effort: callers log failures and carry on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Platform rejected {action}: {reason}")]
    Rejected { action: &'static str, reason: String },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Side effects on a chat. `chat_id` identifies the group; `channel_id` is
/// the conversation a message was posted in (equal to `chat_id` on platforms
/// without sub-channels).
#[async_trait]
pub trait ChatActions: Send + Sync {
    /// Revoke posting rights pending verification.
    async fn restrict(
        &self,
        chat_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), ActionError>;

    /// Restore full posting rights.
    async fn unrestrict(&self, chat_id: u64, user_id: u64) -> Result<(), ActionError>;

    /// Silence a user as a rule punishment.
    async fn mute(
        &self,
        chat_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), ActionError>;

    /// Remove the user from the chat.
    async fn remove(&self, chat_id: u64, user_id: u64) -> Result<(), ActionError>;

    /// Post a notice to the chat.
    async fn send_text(&self, chat_id: u64, text: &str) -> Result<(), ActionError>;

    async fn delete_message(
        &self,
        chat_id: u64,
        channel_id: u64,
        message_id: u64,
    ) -> Result<(), ActionError>;

    /// Privately notify the bot administrator.
    async fn notify_admin(&self, text: &str) -> Result<(), ActionError>;
}

/// `start + secs`, saturating instead of overflowing.
pub fn deadline_after(start: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Log a failed action without interrupting the caller.
pub fn log_failure(result: Result<(), ActionError>, chat_id: u64, user_id: u64) {
    if let Err(e) = result {
        tracing::warn!(chat_id, user_id, "Chat action failed: {}", e);
    }
}
