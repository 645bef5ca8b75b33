// Moderation service - owns the active rule snapshot and the rule/audit ports.
//
// This service handles:
// - Classifying messages against the current snapshot
// - Hot-reloading the snapshot from the rule store
// - Rule administration (add, list, deactivate)
// - Violation audit records
//
// NO Discord dependencies here - just pure domain logic.

use super::classifier;
use super::moderation_models::{
    MatchKind, ModerationSettings, ModerationStatus, NewRule, Rule, RuleSnapshot, Verdict,
    ViolationRecord,
};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Default and maximum page sizes for the violation log.
pub const DEFAULT_VIOLATION_LIMIT: u32 = 10;
pub const MAX_VIOLATION_LIMIT: u32 = 50;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Rule {0} not found")]
    RuleNotFound(i64),
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// Source of classification rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules in evaluation order.
    async fn active_rules(&self) -> Result<Vec<Rule>, ModerationError>;

    /// Persist a new, active rule.
    async fn add_rule(&self, rule: NewRule) -> Result<Rule, ModerationError>;

    /// Soft-delete a rule. Returns `false` if no active rule had that id.
    async fn deactivate_rule(&self, id: i64) -> Result<bool, ModerationError>;
}

/// Destination for violation records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_violation(&self, record: ViolationRecord) -> Result<(), ModerationError>;

    /// Most recent violations first.
    async fn recent_violations(&self, limit: u32) -> Result<Vec<ViolationRecord>, ModerationError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationService<S: RuleStore + AuditSink> {
    store: S,
    /// Swapped wholesale on reload. Readers never wait on a writer.
    snapshot: ArcSwap<RuleSnapshot>,
    settings: ModerationSettings,
}

impl<S: RuleStore + AuditSink> ModerationService<S> {
    /// Create the service with an empty snapshot. Call `reload` to load rules.
    pub fn new(store: S, settings: ModerationSettings) -> Self {
        Self {
            store,
            snapshot: ArcSwap::from_pointee(RuleSnapshot::default()),
            settings,
        }
    }

    pub fn settings(&self) -> &ModerationSettings {
        &self.settings
    }

    /// The snapshot every classification started from now will use.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.snapshot.load_full()
    }

    /// Atomically replace the active snapshot.
    pub fn update_rules(&self, snapshot: RuleSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Pull active rules from the store and swap them in.
    /// Returns the number of rules in the new snapshot.
    pub async fn reload(&self) -> Result<usize, ModerationError> {
        let rules = self.store.active_rules().await?;
        let snapshot = RuleSnapshot::new(rules);
        let count = snapshot.len();
        self.update_rules(snapshot);
        tracing::info!(rules = count, "Moderation rules reloaded");
        Ok(count)
    }

    /// Classify a message against the snapshot captured at entry.
    pub fn classify(&self, text: &str, file_name: Option<&str>) -> Verdict {
        let snapshot = self.snapshot();
        classifier::classify(text, file_name, &snapshot)
    }

    /// Validate and store a rule, then reload.
    pub async fn add_rule(&self, rule: NewRule) -> Result<Rule, ModerationError> {
        let pattern = rule.pattern.trim().to_string();
        if pattern.is_empty() {
            return Err(ModerationError::InvalidRule(
                "pattern must not be empty".to_string(),
            ));
        }
        if rule.match_kind == MatchKind::Regex {
            if let Err(e) = regex::Regex::new(&pattern) {
                return Err(ModerationError::InvalidRule(format!(
                    "pattern does not compile: {e}"
                )));
            }
        }

        let stored = self.store.add_rule(NewRule { pattern, ..rule }).await?;
        self.reload().await?;
        Ok(stored)
    }

    /// Soft-delete a rule, then reload.
    pub async fn deactivate_rule(&self, id: i64) -> Result<(), ModerationError> {
        if !self.store.deactivate_rule(id).await? {
            return Err(ModerationError::RuleNotFound(id));
        }
        self.reload().await?;
        Ok(())
    }

    /// Rules as the store currently holds them.
    pub async fn list_rules(&self) -> Result<Vec<Rule>, ModerationError> {
        self.store.active_rules().await
    }

    /// Write a violation to the audit sink if logging is enabled.
    pub async fn record_violation(&self, record: ViolationRecord) -> Result<(), ModerationError> {
        if !self.settings.log_violations {
            return Ok(());
        }
        self.store.record_violation(record).await
    }

    /// Recent violations; `None` means the default page size, and the
    /// limit is clamped to `1..=MAX_VIOLATION_LIMIT`.
    pub async fn recent_violations(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<ViolationRecord>, ModerationError> {
        let limit = limit
            .unwrap_or(DEFAULT_VIOLATION_LIMIT)
            .clamp(1, MAX_VIOLATION_LIMIT);
        self.store.recent_violations(limit).await
    }

    pub async fn status(&self) -> Result<ModerationStatus, ModerationError> {
        let last_violation = self
            .store
            .recent_violations(1)
            .await?
            .first()
            .map(|v| v.created_at);

        Ok(ModerationStatus {
            active_rules: self.snapshot().len(),
            last_violation,
            default_action: self.settings.default_action,
            mute_duration_secs: self.settings.mute_duration_secs,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::{RuleAction, VerdictKind};
    use chrono::Utc;
    use std::sync::Mutex;

    /// In-memory store for testing
    struct MockModerationStore {
        rules: Mutex<Vec<Rule>>,
        violations: Mutex<Vec<ViolationRecord>>,
    }

    impl MockModerationStore {
        fn new() -> Self {
            Self {
                rules: Mutex::new(Vec::new()),
                violations: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RuleStore for MockModerationStore {
        async fn active_rules(&self) -> Result<Vec<Rule>, ModerationError> {
            Ok(self
                .rules
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.active)
                .cloned()
                .collect())
        }

        async fn add_rule(&self, rule: NewRule) -> Result<Rule, ModerationError> {
            let mut rules = self.rules.lock().unwrap();
            let stored = Rule {
                id: rules.len() as i64 + 1,
                pattern: rule.pattern,
                match_kind: rule.match_kind,
                action: rule.action,
                active: true,
                created_at: Utc::now(),
            };
            rules.push(stored.clone());
            Ok(stored)
        }

        async fn deactivate_rule(&self, id: i64) -> Result<bool, ModerationError> {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.id == id && r.active) {
                Some(rule) => {
                    rule.active = false;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    #[async_trait]
    impl AuditSink for MockModerationStore {
        async fn record_violation(&self, record: ViolationRecord) -> Result<(), ModerationError> {
            self.violations.lock().unwrap().push(record);
            Ok(())
        }

        async fn recent_violations(
            &self,
            limit: u32,
        ) -> Result<Vec<ViolationRecord>, ModerationError> {
            Ok(self
                .violations
                .lock()
                .unwrap()
                .iter()
                .rev()
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }

    fn new_rule(pattern: &str, match_kind: MatchKind, action: RuleAction) -> NewRule {
        NewRule {
            pattern: pattern.to_string(),
            match_kind,
            action,
        }
    }

    fn violation(user_id: u64) -> ViolationRecord {
        ViolationRecord {
            id: 0,
            user_id,
            username: format!("user{user_id}"),
            chat_id: 1,
            message_text: "spam".to_string(),
            rule_id: Some(1),
            keyword: "spam".to_string(),
            action: RuleAction::Mute,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_add_rule_reloads_snapshot() {
        let service = ModerationService::new(MockModerationStore::new(), Default::default());
        assert!(!service.classify("buy now", None).matched);

        service
            .add_rule(new_rule("buy", MatchKind::Fuzzy, RuleAction::Mute))
            .await
            .unwrap();

        let verdict = service.classify("buy now", None);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::Fuzzy);
    }

    #[tokio::test]
    async fn test_deactivated_rule_stops_matching() {
        let service = ModerationService::new(MockModerationStore::new(), Default::default());
        let rule = service
            .add_rule(new_rule("buy", MatchKind::Fuzzy, RuleAction::Mute))
            .await
            .unwrap();

        service.deactivate_rule(rule.id).await.unwrap();

        assert!(!service.classify("buy now", None).matched);
        assert!(matches!(
            service.deactivate_rule(rule.id).await,
            Err(ModerationError::RuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_rules_are_rejected() {
        let service = ModerationService::new(MockModerationStore::new(), Default::default());

        let blank = service
            .add_rule(new_rule("   ", MatchKind::Exact, RuleAction::Mute))
            .await;
        assert!(matches!(blank, Err(ModerationError::InvalidRule(_))));

        let bad_regex = service
            .add_rule(new_rule("(", MatchKind::Regex, RuleAction::Mute))
            .await;
        assert!(matches!(bad_regex, Err(ModerationError::InvalidRule(_))));

        assert!(service.list_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_captured_snapshot_survives_swap() {
        let service = ModerationService::new(MockModerationStore::new(), Default::default());
        service
            .add_rule(new_rule("old", MatchKind::Fuzzy, RuleAction::Mute))
            .await
            .unwrap();

        let captured = service.snapshot();
        service.update_rules(RuleSnapshot::default());

        assert_eq!(captured.len(), 1);
        assert!(service.snapshot().is_empty());
        assert!(classifier::classify("old news", None, &captured).matched);
        assert!(!service.classify("old news", None).matched);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_see_whole_snapshots_during_swaps() {
        let service = Arc::new(ModerationService::new(
            MockModerationStore::new(),
            Default::default(),
        ));
        let rules: Vec<Rule> = ["alpha", "beta", "gamma"]
            .iter()
            .enumerate()
            .map(|(i, pattern)| Rule {
                id: i as i64 + 1,
                pattern: pattern.to_string(),
                match_kind: MatchKind::Fuzzy,
                action: RuleAction::Mute,
                active: true,
                created_at: Utc::now(),
            })
            .collect();

        let writer = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                for round in 0..500 {
                    if round % 2 == 0 {
                        service.update_rules(RuleSnapshot::new(rules.clone()));
                    } else {
                        service.update_rules(RuleSnapshot::default());
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let snapshot = service.snapshot();
                        assert!(snapshot.is_empty() || snapshot.len() == 3);
                        let hit = classifier::classify("gamma ray", None, &snapshot).matched;
                        assert_eq!(hit, snapshot.len() == 3);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert!(service.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_violation_logging_respects_setting() {
        let settings = ModerationSettings {
            log_violations: false,
            ..Default::default()
        };
        let service = ModerationService::new(MockModerationStore::new(), settings);
        service.record_violation(violation(1)).await.unwrap();
        assert!(service.recent_violations(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_violations_limit_is_clamped() {
        let service = ModerationService::new(MockModerationStore::new(), Default::default());
        for user_id in 0..60 {
            service.record_violation(violation(user_id)).await.unwrap();
        }

        assert_eq!(service.recent_violations(None).await.unwrap().len(), 10);
        assert_eq!(service.recent_violations(Some(0)).await.unwrap().len(), 1);
        assert_eq!(service.recent_violations(Some(500)).await.unwrap().len(), 50);

        let newest = service.recent_violations(Some(1)).await.unwrap();
        assert_eq!(newest[0].user_id, 59);
    }

    #[tokio::test]
    async fn test_status_reports_rules_and_last_violation() {
        let service = ModerationService::new(MockModerationStore::new(), Default::default());
        let status = service.status().await.unwrap();
        assert_eq!(status.active_rules, 0);
        assert!(status.last_violation.is_none());

        service
            .add_rule(new_rule("x", MatchKind::Exact, RuleAction::Kick))
            .await
            .unwrap();
        service.record_violation(violation(4)).await.unwrap();

        let status = service.status().await.unwrap();
        assert_eq!(status.active_rules, 1);
        assert!(status.last_violation.is_some());
        assert_eq!(status.default_action, RuleAction::Mute);
        assert_eq!(status.mute_duration_secs, 3600);
    }
}
