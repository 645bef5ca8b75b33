// Join-verification slash commands - per-server policy overrides.

use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Join verification settings.
#[poise::command(
    slash_command,
    subcommands("show", "set"),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn verification(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - shows help
    Ok(())
}

/// Show this server's verification policy.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    let policy = ctx
        .data()
        .verification
        .policy_for(guild_id.get())
        .await
        .map_err(|e| Error::from(e.to_string()))?;
    let pending = ctx
        .data()
        .verification
        .registry()
        .count_for_chat(guild_id.get());

    let status = if policy.enabled {
        "✅ Enabled"
    } else {
        "❌ Disabled"
    };
    let or_none = |s: &str| {
        if s.trim().is_empty() {
            "*(not set)*".to_string()
        } else {
            s.to_string()
        }
    };

    let embed = serenity::CreateEmbed::new()
        .title("🔐 Join Verification")
        .color(if policy.enabled { 0x00FF00 } else { 0xFF0000 })
        .field("Status", status, true)
        .field("Timeout", format!("{} seconds", policy.timeout_secs), true)
        .field("Pending Challenges", pending.to_string(), true)
        .field("Question", or_none(&policy.question), false)
        .field("Answer", format!("||{}||", or_none(&policy.expected_answer)), false)
        .field(
            "Welcome Message",
            or_none(policy.welcome_message.as_deref().unwrap_or_default()),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Change this server's verification policy.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Require new members to answer a question"] enabled: Option<bool>,
    #[description = "Question asked to new members"] question: Option<String>,
    #[description = "Exact expected answer (case-sensitive)"] answer: Option<String>,
    #[description = "Seconds before silent members are removed (default: 300)"]
    timeout_secs: Option<u64>,
    #[description = "Sent on every join; {user} and {group_name} are replaced"]
    welcome_message: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let service = &ctx.data().verification;

    let mut policy = service
        .policy_for(guild_id.get())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    if let Some(v) = enabled {
        policy.enabled = v;
    }
    if let Some(v) = question {
        policy.question = v;
    }
    if let Some(v) = answer {
        policy.expected_answer = v;
    }
    if let Some(v) = timeout_secs {
        policy.timeout_secs = v;
    }
    if let Some(v) = welcome_message {
        policy.welcome_message = Some(v).filter(|m| !m.trim().is_empty());
    }

    service
        .set_policy(guild_id.get(), policy.clone())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    tracing::info!(
        chat_id = guild_id.get(),
        enabled = policy.enabled,
        "Verification policy updated"
    );

    ctx.say(format!(
        "✅ Verification {} (timeout: {} seconds).",
        if policy.enabled { "enabled" } else { "disabled" },
        policy.timeout_secs
    ))
    .await?;
    Ok(())
}
