// Moderation domain models - rules, snapshots, verdicts and audit records.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts verdicts into deletes, timeouts and kicks.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a rule's keyword is compared against message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Whole-token match after punctuation stripping, or raw substring
    Exact,
    /// Case-insensitive substring
    Fuzzy,
    /// Regular expression against the original-case text
    Regex,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Fuzzy => "fuzzy",
            MatchKind::Regex => "regex",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(MatchKind::Exact),
            "fuzzy" => Ok(MatchKind::Fuzzy),
            "regex" => Ok(MatchKind::Regex),
            other => Err(format!("unknown match kind '{other}' (expected exact, fuzzy or regex)")),
        }
    }
}

/// What happens to the author of a violating message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Mute,
    Kick,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Mute => "mute",
            RuleAction::Kick => "kick",
        }
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mute" => Ok(RuleAction::Mute),
            "kick" => Ok(RuleAction::Kick),
            other => Err(format!("unknown action '{other}' (expected mute or kick)")),
        }
    }
}

/// A classification rule as stored by the rule store.
///
/// Rules are never hard-deleted; deactivation flips `active` and the
/// rule drops out of the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub pattern: String,
    pub match_kind: MatchKind,
    pub action: RuleAction,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a rule (the store assigns id and timestamp).
#[derive(Debug, Clone)]
pub struct NewRule {
    pub pattern: String,
    pub match_kind: MatchKind,
    pub action: RuleAction,
}

/// A rule prepared for evaluation. Regex rules carry their compiled
/// pattern, or `None` when the pattern does not compile.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    /// Lower-cased pattern used by exact/fuzzy matching
    pub pattern_lower: String,
    /// Pattern with a leading `@` removed, for handle comparisons
    pub handle: String,
    pub regex: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: Rule) -> Self {
        let regex = match rule.match_kind {
            MatchKind::Regex => match Regex::new(&rule.pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(rule_id = rule.id, "Rule pattern does not compile: {}", e);
                    None
                }
            },
            _ => None,
        };

        Self {
            pattern_lower: rule.pattern.to_lowercase(),
            handle: rule.pattern.trim_start_matches('@').to_string(),
            regex,
            rule,
        }
    }
}

/// Immutable, ordered view of the active rules. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    rules: Vec<CompiledRule>,
}

impl RuleSnapshot {
    /// Build a snapshot, keeping store order and dropping inactive or blank rules.
    pub fn new(rules: Vec<Rule>) -> Self {
        let rules = rules
            .into_iter()
            .filter(|r| r.active && !r.pattern.trim().is_empty())
            .map(CompiledRule::compile)
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Why a verdict matched. The last three are synthetic kinds derived
/// from inspecting the message rather than chosen by the rule author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictKind {
    Exact,
    Fuzzy,
    Regex,
    Link,
    Username,
    AdHeuristic,
    /// Not a violation
    None,
}

impl From<MatchKind> for VerdictKind {
    fn from(kind: MatchKind) -> Self {
        match kind {
            MatchKind::Exact => VerdictKind::Exact,
            MatchKind::Fuzzy => VerdictKind::Fuzzy,
            MatchKind::Regex => VerdictKind::Regex,
        }
    }
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictKind::Exact => write!(f, "exact"),
            VerdictKind::Fuzzy => write!(f, "fuzzy"),
            VerdictKind::Regex => write!(f, "regex"),
            VerdictKind::Link => write!(f, "link"),
            VerdictKind::Username => write!(f, "username"),
            VerdictKind::AdHeuristic => write!(f, "ad + username"),
            VerdictKind::None => write!(f, "none"),
        }
    }
}

/// Outcome of classifying one message or filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub matched: bool,
    pub rule_id: Option<i64>,
    pub keyword: Option<String>,
    pub kind: VerdictKind,
    pub action: Option<RuleAction>,
}

impl Verdict {
    /// A "no violation" verdict
    pub fn clean() -> Self {
        Self {
            matched: false,
            rule_id: None,
            keyword: None,
            kind: VerdictKind::None,
            action: None,
        }
    }

    /// A verdict produced by `rule` for the given reason.
    pub fn hit(rule: &Rule, kind: VerdictKind) -> Self {
        Self {
            matched: true,
            rule_id: Some(rule.id),
            keyword: Some(rule.pattern.clone()),
            kind,
            action: Some(rule.action),
        }
    }
}

/// One audit log entry, written after a positive verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Assigned by the store; 0 before insertion
    pub id: i64,
    pub user_id: u64,
    pub username: String,
    pub chat_id: u64,
    pub message_text: String,
    pub rule_id: Option<i64>,
    pub keyword: String,
    pub action: RuleAction,
    pub created_at: DateTime<Utc>,
}

/// Longest mute Discord accepts (28 days).
pub const MAX_MUTE_DURATION_SECS: u64 = 28 * 24 * 60 * 60;

/// Process-wide moderation settings.
#[derive(Debug, Clone)]
pub struct ModerationSettings {
    /// How long a mute lasts, in seconds
    pub mute_duration_secs: u64,
    /// Whether violations are written to the audit sink
    pub log_violations: bool,
    /// Informational default shown in status output
    pub default_action: RuleAction,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            mute_duration_secs: 3600,
            log_violations: true,
            default_action: RuleAction::Mute,
        }
    }
}

/// Summary returned by the status command.
#[derive(Debug, Clone)]
pub struct ModerationStatus {
    pub active_rules: usize,
    pub last_violation: Option<DateTime<Utc>>,
    pub default_action: RuleAction,
    pub mute_duration_secs: u64,
}
