// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "chat_actions.rs"]
pub mod chat_actions;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "verification/mod.rs"]
pub mod verification;

#[path = "guard/mod.rs"]
pub mod guard;
