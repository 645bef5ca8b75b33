// Moderation slash commands - rule administration and violation review.

use crate::core::moderation::{
    MatchKind, NewRule, RuleAction, DEFAULT_VIOLATION_LIMIT, MAX_VIOLATION_LIMIT,
};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Longest listing that fits in an embed description.
const EMBED_DESCRIPTION_LIMIT: usize = 4000;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum MatchChoice {
    Exact,
    Fuzzy,
    Regex,
}

impl From<MatchChoice> for MatchKind {
    fn from(choice: MatchChoice) -> Self {
        match choice {
            MatchChoice::Exact => MatchKind::Exact,
            MatchChoice::Fuzzy => MatchKind::Fuzzy,
            MatchChoice::Regex => MatchKind::Regex,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ActionChoice {
    Mute,
    Kick,
}

impl From<ActionChoice> for RuleAction {
    fn from(choice: ActionChoice) -> Self {
        match choice {
            ActionChoice::Mute => RuleAction::Mute,
            ActionChoice::Kick => RuleAction::Kick,
        }
    }
}

/// Manage the keyword filter.
#[poise::command(
    slash_command,
    subcommands("add", "list", "delete"),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn keyword(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - shows help
    Ok(())
}

/// Add a filter keyword.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Keyword, @username or regular expression"] keyword: String,
    #[description = "How the keyword is matched (default: exact)"] match_type: Option<
        MatchChoice,
    >,
    #[description = "What happens to offenders (default: mute)"] action: Option<ActionChoice>,
) -> Result<(), Error> {
    let rule = ctx
        .data()
        .moderation
        .add_rule(NewRule {
            pattern: keyword,
            match_kind: match_type.map(Into::into).unwrap_or(MatchKind::Exact),
            action: action.map(Into::into).unwrap_or(RuleAction::Mute),
        })
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    tracing::info!(
        rule_id = rule.id,
        admin_id = ctx.author().id.get(),
        "Rule added: {}",
        rule.pattern
    );

    ctx.say(format!(
        "✅ Keyword added\n• ID: {}\n• Keyword: `{}`\n• Match: {}\n• Action: {}",
        rule.id, rule.pattern, rule.match_kind, rule.action
    ))
    .await?;
    Ok(())
}

/// List active filter keywords.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let rules = ctx
        .data()
        .moderation
        .list_rules()
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    if rules.is_empty() {
        ctx.say("📋 No keywords configured.").await?;
        return Ok(());
    }

    let mut description = String::new();
    for rule in &rules {
        let line = format!(
            "`{}` • `{}` ({}, {})\n",
            rule.id, rule.pattern, rule.match_kind, rule.action
        );
        if description.len() + line.len() > EMBED_DESCRIPTION_LIMIT {
            description.push_str("…");
            break;
        }
        description.push_str(&line);
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("📋 Filter Keywords ({})", rules.len()))
        .description(description)
        .color(0x5865F2);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Deactivate a filter keyword by id.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Keyword id from /keyword list"] id: i64,
) -> Result<(), Error> {
    ctx.data()
        .moderation
        .deactivate_rule(id)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    tracing::info!(rule_id = id, admin_id = ctx.author().id.get(), "Rule deactivated");
    ctx.say(format!("✅ Keyword {} deleted.", id)).await?;
    Ok(())
}

/// Show recent violations.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn violations(
    ctx: Context<'_>,
    #[description = "How many to show (default: 10, max: 50)"] limit: Option<u32>,
) -> Result<(), Error> {
    let records = ctx
        .data()
        .moderation
        .recent_violations(limit)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    if records.is_empty() {
        ctx.say("📋 No violations recorded.").await?;
        return Ok(());
    }

    let mut description = String::new();
    for record in &records {
        let line = format!(
            "**{}** ({}) • `{}` → {} • <t:{}:R>\n",
            record.username,
            record.user_id,
            record.keyword,
            record.action,
            record.created_at.timestamp()
        );
        if description.len() + line.len() > EMBED_DESCRIPTION_LIMIT {
            description.push_str("…");
            break;
        }
        description.push_str(&line);
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("🚨 Recent Violations ({})", records.len()))
        .description(description)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Showing up to {} entries",
            limit.unwrap_or(DEFAULT_VIOLATION_LIMIT).clamp(1, MAX_VIOLATION_LIMIT)
        )))
        .color(0xFF0000);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Reload filter rules from the database.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn reload(ctx: Context<'_>) -> Result<(), Error> {
    let count = ctx
        .data()
        .moderation
        .reload()
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say(format!("✅ Reloaded {} active keyword(s).", count))
        .await?;
    Ok(())
}

/// Show moderation status.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn modstatus(ctx: Context<'_>) -> Result<(), Error> {
    let status = ctx
        .data()
        .moderation
        .status()
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let last_violation = status
        .last_violation
        .map(|at| format!("<t:{}:R>", at.timestamp()))
        .unwrap_or_else(|| "Never".to_string());

    let embed = serenity::CreateEmbed::new()
        .title("🛡️ Moderation Status")
        .color(0x00FF00)
        .field("Active Keywords", status.active_rules.to_string(), true)
        .field("Last Violation", last_violation, true)
        .field("Default Action", status.default_action.to_string(), true)
        .field(
            "Mute Duration",
            format!("{} minutes", status.mute_duration_secs / 60),
            true,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
