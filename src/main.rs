// This is the entry point of the group guard bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases)
// - `discord/` = Discord-specific adapters (commands, events, chat actions)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;
mod settings;

use crate::core::guard::GuardService;
use crate::core::moderation::ModerationService;
use crate::core::verification::VerificationService;
use crate::discord::moderation::events as guard_events;
use crate::discord::moderation::DiscordChatActions;
use crate::discord::{Data, Error};
use crate::infra::moderation::SqliteModerationStore;
use crate::infra::verification::SqlitePolicyStore;
use crate::settings::Settings;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = guard_events::handle_message(ctx, new_message, data).await {
                tracing::error!("Error handling message: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = guard_events::handle_member_join(ctx, new_member, data).await {
                tracing::error!("Error handling member join: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

async fn connect(data_dir: &str) -> anyhow::Result<Pool<Sqlite>> {
    let db_path = format!("{}/guard.db", data_dir);
    SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", db_path))
        .await
        .with_context(|| format!("Failed to open database at {}", db_path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let settings = Settings::from_env()?;

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    std::fs::create_dir_all(&settings.data_dir)
        .context("Failed to create data directory for SQLite files")?;
    let pool = connect(&settings.data_dir).await?;

    let moderation_store = SqliteModerationStore::new(pool.clone());
    moderation_store.migrate().await?;
    let policy_store = SqlitePolicyStore::new(pool);
    policy_store.migrate().await?;

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Services that act on the chat need the client's http and cache, so the
    // composition root lives in `setup`.

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let token = settings.discord_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // ============================================================
                // DEPENDENCY INJECTION
                // ============================================================
                let actions = Arc::new(DiscordChatActions::new(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    settings.unverified_role_id,
                    settings.admin_user_id,
                ));
                if settings.unverified_role_id.is_none() {
                    tracing::warn!(
                        "UNVERIFIED_ROLE_ID is not set; verification cannot restrict new members"
                    );
                }

                let moderation = Arc::new(ModerationService::new(
                    moderation_store,
                    settings.moderation.clone(),
                ));
                let rule_count = moderation.reload().await?;

                let verification = Arc::new(VerificationService::new(
                    policy_store,
                    Arc::clone(&actions),
                    settings.default_policy.clone(),
                ));

                let guard = Arc::new(GuardService::new(
                    Arc::clone(&moderation),
                    Arc::clone(&verification),
                    actions,
                ));

                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                tracing::info!(
                    rules = rule_count,
                    verification = settings.default_policy.enabled,
                    "Bot is ready"
                );

                Ok(Data {
                    guard,
                    moderation,
                    verification,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
