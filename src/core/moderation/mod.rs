// Core moderation module - rule-based content classification.

pub mod classifier;
pub mod moderation_models;
pub mod moderation_service;

pub use moderation_models::*;
pub use moderation_service::*;
