//! SQLite-based persistence store

use crate::persistence::{PersistenceBackend, RunSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use uuid::Uuid;

const COLUMNS: &str = "id, workflow, concurrency_group, trigger_kind, git_ref, sha, status, \
                       failed_stage, error, inputs, started_at, completed_at";

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        // every connection to `:memory:` opens a separate database
        let pool = if db_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
        } else {
            SqlitePool::connect(&format!("sqlite://{}?mode=rwc", db_path)).await
        }
        .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sitepipe")
            .join("runs.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        Self::new(&db_path.to_string_lossy()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workflow TEXT NOT NULL,
                concurrency_group TEXT NOT NULL,
                trigger_kind TEXT NOT NULL,
                git_ref TEXT NOT NULL,
                sha TEXT,
                status TEXT NOT NULL,
                failed_stage TEXT,
                error TEXT,
                inputs TEXT NOT NULL DEFAULT '{}',
                started_at TEXT NOT NULL,
                completed_at TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_workflow ON runs(workflow);
            CREATE INDEX IF NOT EXISTS idx_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn row_to_summary(row: &SqliteRow) -> Result<RunSummary> {
        let failed_stage = row
            .get::<Option<String>, _>("failed_stage")
            .map(|s| s.parse().map_err(anyhow::Error::msg))
            .transpose()?;

        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            workflow: row.get("workflow"),
            concurrency_group: row.get("concurrency_group"),
            trigger: row
                .get::<String, _>("trigger_kind")
                .parse()
                .map_err(anyhow::Error::msg)?,
            git_ref: row.get("git_ref"),
            sha: row.get("sha"),
            status: row
                .get::<String, _>("status")
                .parse()
                .map_err(anyhow::Error::msg)?,
            failed_stage,
            error: row.get("error"),
            inputs: serde_json::from_str(&row.get::<String, _>("inputs"))
                .context("Corrupt inputs column")?,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, workflow, concurrency_group, trigger_kind, git_ref, sha, status,
             failed_stage, error, inputs, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(&run.workflow)
        .bind(&run.concurrency_group)
        .bind(run.trigger.as_str())
        .bind(&run.git_ref)
        .bind(&run.sha)
        .bind(run.status.as_str())
        .bind(run.failed_stage.map(|s| s.as_str()))
        .bind(&run.error)
        .bind(serde_json::to_string(&run.inputs)?)
        .bind(Self::to_naive(run.started_at))
        .bind(run.completed_at.map(Self::to_naive))
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?1", COLUMNS))
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::row_to_summary).transpose()
    }

    async fn list_runs(&self, workflow: &str) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs WHERE workflow = ?1 ORDER BY started_at DESC",
            COLUMNS
        ))
        .bind(workflow)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT workflow
            FROM runs
            ORDER BY workflow ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list workflows")?;

        Ok(rows.iter().map(|row| row.get("workflow")).collect())
    }
}
