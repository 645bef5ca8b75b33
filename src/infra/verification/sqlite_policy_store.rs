// SQLite-backed per-chat verification settings.

use crate::core::verification::{GroupVerificationPolicy, PolicyStore, VerificationError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

pub struct SqlitePolicyStore {
    pool: Pool<Sqlite>,
}

impl SqlitePolicyStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), VerificationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS group_settings (
                chat_id INTEGER PRIMARY KEY,
                verification_enabled BOOLEAN NOT NULL DEFAULT 0,
                verification_question TEXT NOT NULL DEFAULT '',
                verification_answer TEXT NOT NULL DEFAULT '',
                verification_timeout INTEGER NOT NULL DEFAULT 300,
                welcome_message TEXT,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerificationError::StorageError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn get_policy(
        &self,
        chat_id: u64,
    ) -> Result<Option<GroupVerificationPolicy>, VerificationError> {
        let row = sqlx::query(
            r#"
            SELECT verification_enabled, verification_question, verification_answer,
                   verification_timeout, welcome_message
            FROM group_settings
            WHERE chat_id = ?
            "#,
        )
        .bind(chat_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VerificationError::StorageError(e.to_string()))?;

        Ok(row.map(|row| GroupVerificationPolicy {
            enabled: row.get("verification_enabled"),
            question: row.get("verification_question"),
            expected_answer: row.get("verification_answer"),
            timeout_secs: row.get::<i64, _>("verification_timeout").max(1) as u64,
            welcome_message: row.get("welcome_message"),
        }))
    }

    async fn save_policy(
        &self,
        chat_id: u64,
        policy: GroupVerificationPolicy,
    ) -> Result<(), VerificationError> {
        sqlx::query(
            r#"
            INSERT INTO group_settings
                (chat_id, verification_enabled, verification_question, verification_answer,
                 verification_timeout, welcome_message, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                verification_enabled = excluded.verification_enabled,
                verification_question = excluded.verification_question,
                verification_answer = excluded.verification_answer,
                verification_timeout = excluded.verification_timeout,
                welcome_message = excluded.welcome_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(chat_id as i64)
        .bind(policy.enabled)
        .bind(&policy.question)
        .bind(&policy.expected_answer)
        .bind(policy.timeout_secs as i64)
        .bind(&policy.welcome_message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| VerificationError::StorageError(e.to_string()))?;
        Ok(())
    }
}
