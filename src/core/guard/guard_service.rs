// Guard service - routes inbound chat events to verification or classification
// and carries out the resulting punishments.
//
// NO Discord dependencies here; the platform layer builds an `InboundMessage`
// and the side effects go through `ChatActions`.

use crate::core::chat_actions::{deadline_after, log_failure, ChatActions};
use crate::core::moderation::{
    AuditSink, ModerationService, RuleAction, RuleStore, Verdict, ViolationRecord,
    MAX_MUTE_DURATION_SECS,
};
use crate::core::verification::{
    AnswerOutcome, JoinOutcome, PolicyStore, VerificationError, VerificationService,
};
use chrono::Utc;
use std::sync::Arc;

/// A chat message as the guard sees it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: u64,
    /// Conversation the message was posted in
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: u64,
    pub username: String,
    /// Message text or media caption
    pub text: String,
    /// Name of an attached document, if any
    pub file_name: Option<String>,
}

/// What the guard did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Consumed as a verification answer
    Answer(AnswerOutcome),
    Clean,
    /// Deleted and punished
    Violation(Verdict),
}

pub struct GuardService<S, P, A>
where
    S: RuleStore + AuditSink,
    P: PolicyStore,
    A: ChatActions,
{
    moderation: Arc<ModerationService<S>>,
    verification: Arc<VerificationService<P, A>>,
    actions: Arc<A>,
}

impl<S, P, A> GuardService<S, P, A>
where
    S: RuleStore + AuditSink,
    P: PolicyStore + 'static,
    A: ChatActions + 'static,
{
    pub fn new(
        moderation: Arc<ModerationService<S>>,
        verification: Arc<VerificationService<P, A>>,
        actions: Arc<A>,
    ) -> Self {
        Self {
            moderation,
            verification,
            actions,
        }
    }

    pub fn moderation(&self) -> &Arc<ModerationService<S>> {
        &self.moderation
    }

    pub fn verification(&self) -> &Arc<VerificationService<P, A>> {
        &self.verification
    }

    /// A member joined `chat_id`.
    pub async fn on_join(
        &self,
        chat_id: u64,
        user_id: u64,
        display_name: &str,
        chat_title: &str,
    ) -> Result<JoinOutcome, VerificationError> {
        self.verification
            .on_join(chat_id, user_id, display_name, chat_title)
            .await
    }

    /// Handle one message. Users with a pending challenge are answering it;
    /// everyone else is classified.
    pub async fn on_message(&self, msg: &InboundMessage) -> MessageOutcome {
        let answer = self
            .verification
            .on_message(msg.chat_id, msg.user_id, &msg.username, &msg.text)
            .await;
        if answer != AnswerOutcome::NoChallenge {
            return MessageOutcome::Answer(answer);
        }

        let verdict = self
            .moderation
            .classify(&msg.text, msg.file_name.as_deref());
        if !verdict.matched {
            return MessageOutcome::Clean;
        }

        self.punish(msg, &verdict).await;
        MessageOutcome::Violation(verdict)
    }

    async fn punish(&self, msg: &InboundMessage, verdict: &Verdict) {
        let action = verdict
            .action
            .unwrap_or(self.moderation.settings().default_action);
        let keyword = verdict.keyword.clone().unwrap_or_default();

        let record = ViolationRecord {
            id: 0,
            user_id: msg.user_id,
            username: msg.username.clone(),
            chat_id: msg.chat_id,
            message_text: msg.text.clone(),
            rule_id: verdict.rule_id,
            keyword: keyword.clone(),
            action,
            created_at: Utc::now(),
        };
        if let Err(e) = self.moderation.record_violation(record).await {
            tracing::error!(
                chat_id = msg.chat_id,
                user_id = msg.user_id,
                "Failed to record violation: {}",
                e
            );
        }

        log_failure(
            self.actions
                .delete_message(msg.chat_id, msg.channel_id, msg.message_id)
                .await,
            msg.chat_id,
            msg.user_id,
        );

        let punished = match action {
            RuleAction::Mute => {
                let secs = self
                    .moderation
                    .settings()
                    .mute_duration_secs
                    .min(MAX_MUTE_DURATION_SECS);
                let until = deadline_after(Utc::now(), secs);
                self.actions.mute(msg.chat_id, msg.user_id, until).await
            }
            RuleAction::Kick => self.actions.remove(msg.chat_id, msg.user_id).await,
        };
        log_failure(punished, msg.chat_id, msg.user_id);

        tracing::info!(
            chat_id = msg.chat_id,
            user_id = msg.user_id,
            rule_id = verdict.rule_id,
            kind = %verdict.kind,
            action = %action,
            "Violation by {}: keyword '{}'",
            msg.username,
            keyword
        );

        let notice = format!(
            "🚨 Violation detected\n\nUser: {} ({})\nChat: {}\nKeyword: {}\nMatch: {}\nAction: {}\nMessage: {}",
            msg.username,
            msg.user_id,
            msg.chat_id,
            keyword,
            verdict.kind,
            action,
            truncate(&msg.text, 200)
        );
        log_failure(
            self.actions.notify_admin(&notice).await,
            msg.chat_id,
            msg.user_id,
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
