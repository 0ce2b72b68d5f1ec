//! SQLite history store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use vgen_models::{GenerationRecord, GenerationStatus, ReqKey, TaskId};

use crate::error::{HistoryError, HistoryResult};
use crate::store::{timeout_message, HistoryPage, HistoryQuery, HistoryStore};

const ACTIVE_STATUSES: &str = "('pending', 'processing')";

/// SQLite-backed history store.
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (or create) the database and ensure the schema exists.
    pub async fn new(database_url: &str) -> HistoryResult<Self> {
        info!("Opening history database at {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(HistoryError::Database)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> HistoryResult<()> {
        debug!("Initializing history schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generations (
                task_id TEXT PRIMARY KEY,
                prompt TEXT NOT NULL,
                duration INTEGER NOT NULL,
                fps INTEGER NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                seed INTEGER,
                first_frame_url TEXT,
                last_frame_url TEXT,
                resolution TEXT NOT NULL,
                version TEXT NOT NULL,
                req_key TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                video_url TEXT,
                video_name TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_generations_status_created
             ON generations (status, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn create(&self, record: &GenerationRecord) -> HistoryResult<()> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO generations (
                task_id, prompt, duration, fps, width, height, seed,
                first_frame_url, last_frame_url, resolution, version, req_key,
                status, video_url, video_name, error_message, created_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.task_id.as_str())
        .bind(&record.prompt)
        .bind(record.duration as i64)
        .bind(record.fps as i64)
        .bind(record.width as i64)
        .bind(record.height as i64)
        .bind(record.seed)
        .bind(&record.first_frame_url)
        .bind(&record.last_frame_url)
        .bind(&record.resolution)
        .bind(&record.version)
        .bind(record.req_key.as_ref().map(ReqKey::as_str))
        .bind(record.status.as_str())
        .bind(&record.video_url)
        .bind(&record.video_name)
        .bind(&record.error_message)
        .bind(record.created_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HistoryError::Duplicate(record.task_id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> HistoryResult<Option<GenerationRecord>> {
        let row = sqlx::query("SELECT * FROM generations WHERE task_id = ?")
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    async fn list(&self, query: &HistoryQuery) -> HistoryResult<HistoryPage> {
        let (rows, total) = match query.status {
            Some(status) => {
                let rows = sqlx::query(
                    "SELECT * FROM generations WHERE status = ?
                     ORDER BY created_at DESC, task_id ASC LIMIT ? OFFSET ?",
                )
                .bind(status.as_str())
                .bind(query.limit as i64)
                .bind(query.offset as i64)
                .fetch_all(&self.pool)
                .await?;

                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM generations WHERE status = ?")
                        .bind(status.as_str())
                        .fetch_one(&self.pool)
                        .await?;
                (rows, total)
            }
            None => {
                let rows = sqlx::query(
                    "SELECT * FROM generations
                     ORDER BY created_at DESC, task_id ASC LIMIT ? OFFSET ?",
                )
                .bind(query.limit as i64)
                .bind(query.offset as i64)
                .fetch_all(&self.pool)
                .await?;

                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generations")
                    .fetch_one(&self.pool)
                    .await?;
                (rows, total)
            }
        };

        let items = rows
            .iter()
            .map(row_to_record)
            .collect::<HistoryResult<Vec<_>>>()?;

        Ok(HistoryPage {
            total: total as u64,
            items,
        })
    }

    async fn delete(&self, task_id: &TaskId) -> HistoryResult<bool> {
        let result = sqlx::query("DELETE FROM generations WHERE task_id = ?")
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_processing(&self, task_id: &TaskId) -> HistoryResult<bool> {
        let result = sqlx::query(
            "UPDATE generations SET status = 'processing'
             WHERE task_id = ? AND status = 'pending'",
        )
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        task_id: &TaskId,
        video_url: &str,
        video_name: Option<&str>,
    ) -> HistoryResult<bool> {
        let name = video_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{task_id}.mp4"));

        let result = sqlx::query(&format!(
            "UPDATE generations
             SET status = 'completed', video_url = ?, video_name = ?, completed_at = ?
             WHERE task_id = ? AND status IN {ACTIVE_STATUSES}"
        ))
        .bind(video_url)
        .bind(name)
        .bind(Utc::now())
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail(&self, task_id: &TaskId, error: &str) -> HistoryResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE generations
             SET status = 'failed', error_message = ?, completed_at = ?
             WHERE task_id = ? AND status IN {ACTIVE_STATUSES}"
        ))
        .bind(error)
        .bind(Utc::now())
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn sweep_timed_out(&self, deadline: Duration) -> HistoryResult<u32> {
        let cutoff = Utc::now() - deadline;

        // Fetch first so each record gets an elapsed-time message
        let stale: Vec<(String, DateTime<Utc>)> = sqlx::query_as(&format!(
            "SELECT task_id, created_at FROM generations
             WHERE status IN {ACTIVE_STATUSES} AND created_at < ?"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut swept = 0u32;
        for (task_id, created_at) in stale {
            let minutes = (Utc::now() - created_at).num_seconds() as f64 / 60.0;
            let applied = self
                .fail(&TaskId::from(task_id), &timeout_message(minutes))
                .await?;
            if applied {
                swept += 1;
            }
        }

        if swept > 0 {
            info!(count = swept, "Swept timed-out generation tasks");
        }
        Ok(swept)
    }
}

fn row_to_record(row: &SqliteRow) -> HistoryResult<GenerationRecord> {
    let status_raw: String = row.try_get("status")?;
    let status = GenerationStatus::parse(&status_raw)
        .ok_or_else(|| HistoryError::corrupt(format!("unknown status '{status_raw}'")))?;

    Ok(GenerationRecord {
        task_id: TaskId::from(row.try_get::<String, _>("task_id")?),
        prompt: row.try_get("prompt")?,
        duration: row.try_get::<i64, _>("duration")? as u32,
        fps: row.try_get::<i64, _>("fps")? as u32,
        width: row.try_get::<i64, _>("width")? as u32,
        height: row.try_get::<i64, _>("height")? as u32,
        seed: row.try_get("seed")?,
        first_frame_url: row.try_get("first_frame_url")?,
        last_frame_url: row.try_get("last_frame_url")?,
        resolution: row.try_get("resolution")?,
        version: row.try_get("version")?,
        req_key: row
            .try_get::<Option<String>, _>("req_key")?
            .map(ReqKey::from),
        status,
        video_url: row.try_get("video_url")?,
        video_name: row.try_get("video_name")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}
