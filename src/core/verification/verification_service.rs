// Join-verification state machine.
//
// Per (chat, user): NoChallenge -> Pending -> Verified | Kicked
//
// - Admit:   join with verification enabled creates a Pending entry,
//            restricts the user and schedules a timeout.
// - Answer:  any message from a Pending user counts as an attempt.
// - Timeout: kicks only if the entry it was scheduled for still exists
//            with zero attempts.
//
// Answer and Timeout race on the same key. Both go through the registry's
// atomic operations, so whichever removes the entry first is the only
// resolution. Platform calls happen after the registry decision and their
// failures never undo it.

use super::registry::{EntryFate, VerificationRegistry};
use super::verification_models::{
    AnswerOutcome, ChallengeKey, ChallengeState, GroupVerificationPolicy, JoinOutcome,
    TimeoutOutcome, MAX_ATTEMPTS, MAX_TIMEOUT_SECS,
};
use crate::core::chat_actions::{deadline_after, log_failure, ChatActions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Per-chat verification policy overrides.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// The chat's override, if it has one.
    async fn get_policy(
        &self,
        chat_id: u64,
    ) -> Result<Option<GroupVerificationPolicy>, VerificationError>;

    async fn save_policy(
        &self,
        chat_id: u64,
        policy: GroupVerificationPolicy,
    ) -> Result<(), VerificationError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct VerificationService<P: PolicyStore, A: ChatActions> {
    registry: VerificationRegistry,
    policies: P,
    actions: Arc<A>,
    /// Used for chats without an override
    default_policy: GroupVerificationPolicy,
}

impl<P, A> VerificationService<P, A>
where
    P: PolicyStore + 'static,
    A: ChatActions + 'static,
{
    pub fn new(policies: P, actions: Arc<A>, default_policy: GroupVerificationPolicy) -> Self {
        Self {
            registry: VerificationRegistry::new(),
            policies,
            actions,
            default_policy,
        }
    }

    pub fn registry(&self) -> &VerificationRegistry {
        &self.registry
    }

    /// Whether this user currently has a challenge to answer.
    pub fn is_pending(&self, chat_id: u64, user_id: u64) -> bool {
        self.registry.contains(&ChallengeKey::new(chat_id, user_id))
    }

    /// The chat's policy, falling back to the process-wide default.
    pub async fn policy_for(
        &self,
        chat_id: u64,
    ) -> Result<GroupVerificationPolicy, VerificationError> {
        Ok(self
            .policies
            .get_policy(chat_id)
            .await?
            .unwrap_or_else(|| self.default_policy.clone()))
    }

    /// Store a per-chat override. Enabled policies need a question and answer.
    pub async fn set_policy(
        &self,
        chat_id: u64,
        policy: GroupVerificationPolicy,
    ) -> Result<(), VerificationError> {
        if policy.enabled {
            if policy.question.trim().is_empty() {
                return Err(VerificationError::InvalidPolicy(
                    "question must not be empty".to_string(),
                ));
            }
            if policy.expected_answer.is_empty() {
                return Err(VerificationError::InvalidPolicy(
                    "answer must not be empty".to_string(),
                ));
            }
        }
        if policy.timeout_secs == 0 || policy.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(VerificationError::InvalidPolicy(format!(
                "timeout must be between 1 and {} seconds",
                MAX_TIMEOUT_SECS
            )));
        }
        self.policies.save_policy(chat_id, policy).await
    }

    /// Handle a member joining: greet them and, if the chat requires it,
    /// start a challenge.
    pub async fn on_join(
        self: &Arc<Self>,
        chat_id: u64,
        user_id: u64,
        display_name: &str,
        chat_title: &str,
    ) -> Result<JoinOutcome, VerificationError> {
        let policy = self.policy_for(chat_id).await?;

        if let Some(welcome) = policy.render_welcome(display_name, chat_title) {
            log_failure(
                self.actions.send_text(chat_id, &welcome).await,
                chat_id,
                user_id,
            );
        }

        if !policy.enabled {
            return Ok(JoinOutcome::NotRequired);
        }

        Ok(self.admit(chat_id, user_id, display_name, &policy).await)
    }

    /// Create a challenge unless one is already pending for this key.
    pub async fn admit(
        self: &Arc<Self>,
        chat_id: u64,
        user_id: u64,
        display_name: &str,
        policy: &GroupVerificationPolicy,
    ) -> JoinOutcome {
        let start_time = Utc::now();
        let timeout_secs = policy.effective_timeout_secs();
        let until = deadline_after(start_time, timeout_secs);
        let state = ChallengeState {
            chat_id,
            user_id,
            expected_answer: policy.expected_answer.clone(),
            start_time,
            attempt_count: 0,
        };
        let key = state.key();

        if !self.registry.insert_if_absent(state) {
            tracing::debug!(chat_id, user_id, "Challenge already pending");
            return JoinOutcome::AlreadyPending;
        }

        tracing::info!(
            chat_id,
            user_id,
            timeout_secs,
            "Verification challenge started"
        );

        log_failure(
            self.actions.restrict(chat_id, user_id, until).await,
            chat_id,
            user_id,
        );

        let question = format!(
            "👋 Welcome {}!\nTo make sure you're not a bot, please answer the following question:\n\n{}",
            display_name, policy.question
        );
        log_failure(
            self.actions.send_text(chat_id, &question).await,
            chat_id,
            user_id,
        );

        self.schedule_timeout(key, start_time, Duration::from_secs(timeout_secs));
        JoinOutcome::Challenged
    }

    /// Detached timeout; it re-checks the registry when it fires, so it
    /// needs no cancellation handle. `started_at` ties it to one challenge.
    fn schedule_timeout(
        self: &Arc<Self>,
        key: ChallengeKey,
        started_at: DateTime<Utc>,
        after: Duration,
    ) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            service
                .on_timeout(key.chat_id, key.user_id, started_at)
                .await;
        });
    }

    /// Treat a message as a challenge answer if the user has a pending entry.
    pub async fn on_message(
        &self,
        chat_id: u64,
        user_id: u64,
        display_name: &str,
        text: &str,
    ) -> AnswerOutcome {
        let key = ChallengeKey::new(chat_id, user_id);

        let outcome = self.registry.mutate_if_present(&key, |state| {
            state.attempt_count += 1;
            if text == state.expected_answer {
                (AnswerOutcome::Verified, EntryFate::Remove)
            } else if state.attempt_count >= MAX_ATTEMPTS {
                (AnswerOutcome::Kicked, EntryFate::Remove)
            } else {
                (
                    AnswerOutcome::Retry {
                        remaining: state.attempts_remaining(),
                    },
                    EntryFate::Keep,
                )
            }
        });

        let Some(outcome) = outcome else {
            return AnswerOutcome::NoChallenge;
        };

        match &outcome {
            AnswerOutcome::Verified => {
                tracing::info!(chat_id, user_id, "User passed verification");
                log_failure(
                    self.actions.unrestrict(chat_id, user_id).await,
                    chat_id,
                    user_id,
                );
                let notice = format!("✅ Verified! Welcome to the group, {}!", display_name);
                log_failure(
                    self.actions.send_text(chat_id, &notice).await,
                    chat_id,
                    user_id,
                );
            }
            AnswerOutcome::Kicked => {
                tracing::info!(chat_id, user_id, "User failed verification, removing");
                log_failure(
                    self.actions.remove(chat_id, user_id).await,
                    chat_id,
                    user_id,
                );
            }
            AnswerOutcome::Retry { remaining } => {
                let notice = format!(
                    "❌ Wrong answer, {} attempt{} remaining.",
                    remaining,
                    if *remaining == 1 { "" } else { "s" }
                );
                log_failure(
                    self.actions.send_text(chat_id, &notice).await,
                    chat_id,
                    user_id,
                );
            }
            AnswerOutcome::NoChallenge => {}
        }

        outcome
    }

    /// Fired once per challenge. Kicks only users who never answered;
    /// anyone who tried keeps their slot until the three-strike rule
    /// resolves them. A timer left over from an earlier challenge for the
    /// same user (`started_at` differs) does nothing.
    pub async fn on_timeout(
        &self,
        chat_id: u64,
        user_id: u64,
        started_at: DateTime<Utc>,
    ) -> TimeoutOutcome {
        let key = ChallengeKey::new(chat_id, user_id);

        let expired = self.registry.remove_if(&key, |state| {
            state.start_time == started_at && state.attempt_count == 0
        });
        match expired {
            Some(_) => {
                tracing::info!(chat_id, user_id, "Verification timed out, removing user");
                log_failure(
                    self.actions.remove(chat_id, user_id).await,
                    chat_id,
                    user_id,
                );
                TimeoutOutcome::Kicked
            }
            None => TimeoutOutcome::NoOp,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
