// Runtime configuration, read from the environment (and `.env` via dotenv).

use crate::core::moderation::{ModerationSettings, RuleAction, MAX_MUTE_DURATION_SECS};
use crate::core::verification::{GroupVerificationPolicy, MAX_TIMEOUT_SECS};
use anyhow::{bail, Context, Result};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    /// Folder holding the SQLite databases
    pub data_dir: String,
    /// Receives a DM for every violation
    pub admin_user_id: Option<u64>,
    /// Quarantine role given to members until they pass verification
    pub unverified_role_id: Option<u64>,
    pub moderation: ModerationSettings,
    /// Used for servers that have not set their own policy
    pub default_policy: GroupVerificationPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let discord_token = get("DISCORD_TOKEN").context(
            "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
        )?;

        let moderation = ModerationSettings {
            mute_duration_secs: parse_or(&get, "MUTE_DURATION_SECS", 3600)?,
            log_violations: parse_or(&get, "LOG_VIOLATIONS", true)?,
            default_action: match get("DEFAULT_ACTION") {
                Some(raw) => raw
                    .parse::<RuleAction>()
                    .map_err(anyhow::Error::msg)
                    .context("Invalid DEFAULT_ACTION")?,
                None => RuleAction::Mute,
            },
        };

        let default_policy = GroupVerificationPolicy {
            enabled: parse_or(&get, "VERIFICATION_ENABLED", false)?,
            question: get("VERIFICATION_QUESTION").unwrap_or_default(),
            expected_answer: get("VERIFICATION_ANSWER").unwrap_or_default(),
            timeout_secs: parse_or(&get, "VERIFICATION_TIMEOUT_SECS", 300)?,
            welcome_message: get("WELCOME_MESSAGE"),
        };
        if default_policy.enabled
            && (default_policy.question.is_empty() || default_policy.expected_answer.is_empty())
        {
            bail!("VERIFICATION_ENABLED requires VERIFICATION_QUESTION and VERIFICATION_ANSWER");
        }
        if default_policy.timeout_secs == 0 || default_policy.timeout_secs > MAX_TIMEOUT_SECS {
            bail!("VERIFICATION_TIMEOUT_SECS must be between 1 and {MAX_TIMEOUT_SECS}");
        }
        if moderation.mute_duration_secs > MAX_MUTE_DURATION_SECS {
            bail!("MUTE_DURATION_SECS must be at most {MAX_MUTE_DURATION_SECS}");
        }

        Ok(Self {
            discord_token,
            data_dir: get("DATA_DIR").unwrap_or_else(|| "data".to_string()),
            admin_user_id: parse_opt(&get, "ADMIN_USER_ID")?,
            unverified_role_id: parse_opt(&get, "UNVERIFIED_ROLE_ID")?,
            moderation,
            default_policy,
        })
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("Invalid value for {key}"))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[("DISCORD_TOKEN", "abc")]).unwrap();
        assert_eq!(settings.data_dir, "data");
        assert_eq!(settings.moderation.mute_duration_secs, 3600);
        assert!(settings.moderation.log_violations);
        assert_eq!(settings.moderation.default_action, RuleAction::Mute);
        assert!(!settings.default_policy.enabled);
        assert_eq!(settings.default_policy.timeout_secs, 300);
        assert!(settings.admin_user_id.is_none());
    }

    #[test]
    fn test_token_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let settings = load(&[
            ("DISCORD_TOKEN", "abc"),
            ("ADMIN_USER_ID", "1234"),
            ("MUTE_DURATION_SECS", "60"),
            ("LOG_VIOLATIONS", "false"),
            ("DEFAULT_ACTION", "Kick"),
            ("VERIFICATION_ENABLED", "true"),
            ("VERIFICATION_QUESTION", "2+2?"),
            ("VERIFICATION_ANSWER", "4"),
            ("WELCOME_MESSAGE", "Hi {user}"),
        ])
        .unwrap();
        assert_eq!(settings.admin_user_id, Some(1234));
        assert_eq!(settings.moderation.mute_duration_secs, 60);
        assert!(!settings.moderation.log_violations);
        assert_eq!(settings.moderation.default_action, RuleAction::Kick);
        assert!(settings.default_policy.enabled);
        assert_eq!(settings.default_policy.expected_answer, "4");
        assert_eq!(
            settings.default_policy.welcome_message.as_deref(),
            Some("Hi {user}")
        );
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("MUTE_DURATION_SECS", "soon")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("LOG_VIOLATIONS", "yes")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("DEFAULT_ACTION", "ban")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("VERIFICATION_ENABLED", "true")]).is_err());
    }

    #[test]
    fn test_durations_are_bounded() {
        assert!(load(&[
            ("DISCORD_TOKEN", "abc"),
            ("VERIFICATION_TIMEOUT_SECS", "10000000000000")
        ])
        .is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("VERIFICATION_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("MUTE_DURATION_SECS", "2419201")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("MUTE_DURATION_SECS", "2419200")]).is_ok());
    }
}
