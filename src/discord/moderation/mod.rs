pub mod chat_actions;
pub mod commands;
pub mod events;

pub use chat_actions::DiscordChatActions;
