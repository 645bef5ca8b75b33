// Discord event routing - translates gateway events into guard calls.

use crate::core::guard::{InboundMessage, MessageOutcome};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

/// Route a guild message through verification and classification.
pub async fn handle_message(
    _ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    // Skip bots
    if msg.author.bot {
        return Ok(());
    }

    // Only guild messages are moderated
    let chat_id = match msg.guild_id {
        Some(id) => id.get(),
        None => return Ok(()),
    };

    let inbound = InboundMessage {
        chat_id,
        channel_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        user_id: msg.author.id.get(),
        username: msg.author.name.clone(),
        text: msg.content.clone(),
        file_name: msg.attachments.first().map(|a| a.filename.clone()),
    };

    match data.guard.on_message(&inbound).await {
        MessageOutcome::Clean => {}
        MessageOutcome::Answer(outcome) => {
            tracing::debug!(chat_id, user_id = inbound.user_id, ?outcome, "Answer handled");
        }
        MessageOutcome::Violation(verdict) => {
            tracing::debug!(
                chat_id,
                user_id = inbound.user_id,
                kind = %verdict.kind,
                "Message removed"
            );
        }
    }

    Ok(())
}

/// Greet a new member and start verification if the guild requires it.
pub async fn handle_member_join(
    ctx: &serenity::Context,
    member: &serenity::Member,
    data: &Data,
) -> Result<(), Error> {
    if member.user.bot {
        return Ok(());
    }

    let guild_id = member.guild_id;
    let chat_title = ctx
        .cache
        .guild(guild_id)
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| "the server".to_string());
    let display_name = member.display_name().to_string();

    let outcome = data
        .guard
        .on_join(
            guild_id.get(),
            member.user.id.get(),
            &display_name,
            &chat_title,
        )
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    tracing::debug!(
        chat_id = guild_id.get(),
        user_id = member.user.id.get(),
        ?outcome,
        "Member join handled"
    );
    Ok(())
}
