// Discord layer - commands, event handlers and the chat-action adapter.

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "verification/commands.rs"]
pub mod verification;

use crate::core::guard::GuardService;
use crate::core::moderation::ModerationService;
use crate::core::verification::VerificationService;
use crate::infra::moderation::SqliteModerationStore;
use crate::infra::verification::SqlitePolicyStore;
use moderation::DiscordChatActions;
use std::sync::Arc;

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub type Moderation = ModerationService<SqliteModerationStore>;
pub type Verification = VerificationService<SqlitePolicyStore, DiscordChatActions>;
pub type Guard = GuardService<SqliteModerationStore, SqlitePolicyStore, DiscordChatActions>;

/// Data that's shared across all commands.
pub struct Data {
    pub guard: Arc<Guard>,
    pub moderation: Arc<Moderation>,
    pub verification: Arc<Verification>,
}

/// Every slash command the bot registers.
pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        moderation::commands::keyword(),
        moderation::commands::violations(),
        moderation::commands::reload(),
        moderation::commands::modstatus(),
        verification::verification(),
    ]
}
