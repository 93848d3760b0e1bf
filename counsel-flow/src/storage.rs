use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;

use crate::error::Result;
use crate::session::Session;

/// Trait for persisting sessions across turns.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory implementation of [`SessionStorage`].
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS counseling_sessions (
    id TEXT PRIMARY KEY,
    profile JSONB NOT NULL DEFAULT 'null'::jsonb,
    latest_report JSONB NOT NULL DEFAULT 'null'::jsonb,
    report_history JSONB NOT NULL DEFAULT '[]'::jsonb,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)"#;

const UPSERT_SQL: &str = r#"
INSERT INTO counseling_sessions (id, profile, latest_report, report_history, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (id) DO UPDATE SET
    profile = EXCLUDED.profile,
    latest_report = EXCLUDED.latest_report,
    report_history = EXCLUDED.report_history,
    updated_at = EXCLUDED.updated_at"#;

const SELECT_SQL: &str = r#"
SELECT profile, latest_report, report_history, created_at, updated_at
FROM counseling_sessions WHERE id = $1"#;

/// PostgreSQL implementation of [`SessionStorage`]. Sessions are stored as
/// JSONB columns and upserted whole, matching the update-once-per-turn model.
pub struct PostgresSessionStorage {
    pool: PgPool,
}

impl PostgresSessionStorage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::query(CREATE_TABLE_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStorage for PostgresSessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        sqlx::query(UPSERT_SQL)
            .bind(&session.id)
            .bind(serde_json::to_value(&session.profile)?)
            .bind(serde_json::to_value(&session.latest_report)?)
            .bind(serde_json::to_value(&session.report_history)?)
            .bind(session.created_at)
            .bind(session.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let Some(row) = sqlx::query(SELECT_SQL)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let profile: serde_json::Value = row.try_get("profile")?;
        let latest_report: serde_json::Value = row.try_get("latest_report")?;
        let report_history: serde_json::Value = row.try_get("report_history")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(Some(Session {
            id: id.to_string(),
            profile: serde_json::from_value(profile)?,
            latest_report: serde_json::from_value(latest_report)?,
            report_history: serde_json::from_value(report_history)?,
            created_at,
            updated_at,
        }))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM counseling_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
