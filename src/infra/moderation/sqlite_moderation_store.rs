// SQLite-backed rule store and violation log.
//
// Tables:
// - moderation_rules: Classification rules (soft-deleted via is_active)
// - violations: Audit log of punished messages

use crate::core::moderation::{
    AuditSink, ModerationError, NewRule, Rule, RuleAction, RuleStore, ViolationRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                keyword TEXT NOT NULL,
                match_type TEXT NOT NULL DEFAULT 'exact',
                action TEXT NOT NULL DEFAULT 'mute',
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS violations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                chat_id INTEGER NOT NULL,
                message_text TEXT NOT NULL,
                rule_id INTEGER,
                keyword TEXT NOT NULL,
                action TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_violations_created
                ON violations(created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn rule_from_row(row: &SqliteRow) -> Result<Rule, ModerationError> {
    let match_type: String = row.get("match_type");
    let action: String = row.get("action");
    let created_at: String = row.get("created_at");

    Ok(Rule {
        id: row.get("id"),
        pattern: row.get("keyword"),
        match_kind: match_type.parse().map_err(ModerationError::StorageError)?,
        action: action.parse().map_err(ModerationError::StorageError)?,
        active: row.get("is_active"),
        created_at: parse_timestamp(&created_at),
    })
}

#[async_trait]
impl RuleStore for SqliteModerationStore {
    async fn active_rules(&self) -> Result<Vec<Rule>, ModerationError> {
        let rows = sqlx::query(
            r#"
            SELECT id, keyword, match_type, action, is_active, created_at
            FROM moderation_rules
            WHERE is_active = 1
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in &rows {
            match rule_from_row(row) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!("Skipping unreadable rule row: {}", e),
            }
        }
        Ok(rules)
    }

    async fn add_rule(&self, rule: NewRule) -> Result<Rule, ModerationError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO moderation_rules (keyword, match_type, action, is_active, created_at)
            VALUES (?, ?, ?, 1, ?)
            "#,
        )
        .bind(&rule.pattern)
        .bind(rule.match_kind.as_str())
        .bind(rule.action.as_str())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(Rule {
            id: result.last_insert_rowid(),
            pattern: rule.pattern,
            match_kind: rule.match_kind,
            action: rule.action,
            active: true,
            created_at,
        })
    }

    async fn deactivate_rule(&self, id: i64) -> Result<bool, ModerationError> {
        let result = sqlx::query(
            "UPDATE moderation_rules SET is_active = 0 WHERE id = ? AND is_active = 1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditSink for SqliteModerationStore {
    async fn record_violation(&self, record: ViolationRecord) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO violations
                (user_id, username, chat_id, message_text, rule_id, keyword, action, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.user_id as i64)
        .bind(&record.username)
        .bind(record.chat_id as i64)
        .bind(&record.message_text)
        .bind(record.rule_id)
        .bind(&record.keyword)
        .bind(record.action.as_str())
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn recent_violations(&self, limit: u32) -> Result<Vec<ViolationRecord>, ModerationError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, username, chat_id, message_text, rule_id, keyword, action, created_at
            FROM violations
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let action: String = row.get("action");
            let created_at: String = row.get("created_at");
            records.push(ViolationRecord {
                id: row.get("id"),
                user_id: row.get::<i64, _>("user_id") as u64,
                username: row.get("username"),
                chat_id: row.get::<i64, _>("chat_id") as u64,
                message_text: row.get("message_text"),
                rule_id: row.get("rule_id"),
                keyword: row.get("keyword"),
                action: action.parse().unwrap_or(RuleAction::Mute),
                created_at: parse_timestamp(&created_at),
            });
        }
        Ok(records)
    }
}
