// Join-verification domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrong answers allowed before the user is removed.
pub const MAX_ATTEMPTS: u32 = 3;

/// Longest challenge window, matching Discord's 28-day timeout cap.
pub const MAX_TIMEOUT_SECS: u64 = 28 * 24 * 60 * 60;

/// Registry key: one challenge per user per chat.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct ChallengeKey {
    pub chat_id: u64,
    pub user_id: u64,
}

impl ChallengeKey {
    pub fn new(chat_id: u64, user_id: u64) -> Self {
        Self { chat_id, user_id }
    }
}

/// An in-progress join challenge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeState {
    pub chat_id: u64,
    pub user_id: u64,
    pub expected_answer: String,
    pub start_time: DateTime<Utc>,
    pub attempt_count: u32,
}

impl ChallengeState {
    pub fn key(&self) -> ChallengeKey {
        ChallengeKey::new(self.chat_id, self.user_id)
    }

    pub fn attempts_remaining(&self) -> u32 {
        MAX_ATTEMPTS.saturating_sub(self.attempt_count)
    }
}

/// Per-chat verification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupVerificationPolicy {
    pub enabled: bool,
    pub question: String,
    pub expected_answer: String,
    pub timeout_secs: u64,
    /// Sent on every join; `{user}` and `{group_name}` are substituted.
    pub welcome_message: Option<String>,
}

impl Default for GroupVerificationPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            question: String::new(),
            expected_answer: String::new(),
            timeout_secs: 300,
            welcome_message: None,
        }
    }
}

impl GroupVerificationPolicy {
    /// Timeout clamped to `1..=MAX_TIMEOUT_SECS`, for policies that were
    /// stored before the bound existed.
    pub fn effective_timeout_secs(&self) -> u64 {
        self.timeout_secs.clamp(1, MAX_TIMEOUT_SECS)
    }

    pub fn render_welcome(&self, user: &str, group_name: &str) -> Option<String> {
        self.welcome_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(|m| m.replace("{user}", user).replace("{group_name}", group_name))
    }
}

/// What a join did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Verification is off for this chat
    NotRequired,
    /// A new challenge was created
    Challenged,
    /// A challenge for this user was already pending
    AlreadyPending,
}

/// What an incoming message did to a pending challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The user has no pending challenge; the message is ordinary traffic
    NoChallenge,
    Verified,
    Retry { remaining: u32 },
    Kicked,
}

/// What a fired timeout did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutOutcome {
    Kicked,
    /// Entry was gone or the user had already answered
    NoOp,
}
