// Discord implementation of the core's chat-action port.
//
// Chat ids are guild ids. Verification restriction uses a quarantine role
// (members under a communication timeout cannot post their answer); rule
// punishments use real timeouts.

use crate::core::chat_actions::{ActionError, ChatActions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub struct DiscordChatActions {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    /// Role that hides the server from unverified members
    unverified_role: Option<serenity::RoleId>,
    /// Who receives violation reports
    admin_user: Option<serenity::UserId>,
}

impl DiscordChatActions {
    pub fn new(
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        unverified_role: Option<u64>,
        admin_user: Option<u64>,
    ) -> Self {
        Self {
            http,
            cache,
            unverified_role: unverified_role.map(serenity::RoleId::new),
            admin_user: admin_user.map(serenity::UserId::new),
        }
    }

    fn quarantine_role(&self) -> Result<serenity::RoleId, ActionError> {
        self.unverified_role
            .ok_or(ActionError::NotConfigured("UNVERIFIED_ROLE_ID"))
    }
}

fn rejected(action: &'static str) -> impl FnOnce(serenity::Error) -> ActionError {
    move |e| ActionError::Rejected {
        action,
        reason: e.to_string(),
    }
}

#[async_trait]
impl ChatActions for DiscordChatActions {
    /// The role stays until `unrestrict` or the member is removed, so
    /// `until` is not needed here.
    async fn restrict(
        &self,
        chat_id: u64,
        user_id: u64,
        _until: DateTime<Utc>,
    ) -> Result<(), ActionError> {
        let role = self.quarantine_role()?;
        self.http
            .add_member_role(
                serenity::GuildId::new(chat_id),
                serenity::UserId::new(user_id),
                role,
                Some("Pending join verification"),
            )
            .await
            .map_err(rejected("restrict"))
    }

    async fn unrestrict(&self, chat_id: u64, user_id: u64) -> Result<(), ActionError> {
        let role = self.quarantine_role()?;
        self.http
            .remove_member_role(
                serenity::GuildId::new(chat_id),
                serenity::UserId::new(user_id),
                role,
                Some("Passed join verification"),
            )
            .await
            .map_err(rejected("unrestrict"))
    }

    async fn mute(
        &self,
        chat_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), ActionError> {
        let timeout_until = serenity::Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|e| ActionError::Rejected {
                action: "mute",
                reason: e.to_string(),
            })?;

        serenity::GuildId::new(chat_id)
            .edit_member(
                &self.http,
                serenity::UserId::new(user_id),
                serenity::EditMember::new().disable_communication_until_datetime(timeout_until),
            )
            .await
            .map(|_| ())
            .map_err(rejected("mute"))
    }

    async fn remove(&self, chat_id: u64, user_id: u64) -> Result<(), ActionError> {
        serenity::GuildId::new(chat_id)
            .kick(&self.http, serenity::UserId::new(user_id))
            .await
            .map_err(rejected("remove"))
    }

    /// Posts to the guild's system channel.
    async fn send_text(&self, chat_id: u64, text: &str) -> Result<(), ActionError> {
        // Cache guard must be dropped before awaiting.
        let channel = self
            .cache
            .guild(serenity::GuildId::new(chat_id))
            .and_then(|guild| guild.system_channel_id)
            .ok_or(ActionError::NotConfigured("system channel"))?;

        channel
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(rejected("send_text"))
    }

    async fn delete_message(
        &self,
        _chat_id: u64,
        channel_id: u64,
        message_id: u64,
    ) -> Result<(), ActionError> {
        serenity::ChannelId::new(channel_id)
            .delete_message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(rejected("delete_message"))
    }

    async fn notify_admin(&self, text: &str) -> Result<(), ActionError> {
        let admin = self
            .admin_user
            .ok_or(ActionError::NotConfigured("ADMIN_USER_ID"))?;

        admin
            .direct_message(&self.http, serenity::CreateMessage::new().content(text))
            .await
            .map(|_| ())
            .map_err(rejected("notify_admin"))
    }
}
