use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::model::{NotificationEntry, SyncState};
use crate::model::{BoardColumn, JobRecord, JobStatus};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = url["sqlite:".len()..].trim_start_matches("//");
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match path_part.strip_prefix("~/") {
        Some(tail) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), tail),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn job_from_row(row: &SqliteRow) -> Result<JobRecord> {
    let status_str: String = row.get("status");
    let column_str: String = row.get("board_column");
    Ok(JobRecord {
        id: row.get("id"),
        title: row.get("title"),
        description: row.try_get("description").ok(),
        budget: row.get("budget"),
        currency: row.get("currency"),
        category: row.get("category"),
        tag_id: row.get("tag_id"),
        created_at: row.try_get("created_at").ok(),
        inserted_at: row.try_get("inserted_at").ok(),
        url: row.get("url"),
        raw_data: row.get("raw_data"),
        status: JobStatus::parse(&status_str)
            .with_context(|| format!("unknown job status {:?}", status_str))?,
        board_column: BoardColumn::parse(&column_str)
            .with_context(|| format!("unknown board column {:?}", column_str))?,
        notes: row.get("notes"),
        priority: row.get("priority"),
        analysis: row.try_get("analysis").ok(),
        synced: row.get::<i64, _>("synced") != 0,
        project_item_id: row
            .try_get::<Option<String>, _>("project_item_id")
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty()),
        synced_at: row
            .try_get::<Option<DateTime<Utc>>, _>("synced_at")
            .ok()
            .flatten(),
    })
}

const JOB_COLUMNS: &str = "id, title, description, budget, currency, category, tag_id, \
     created_at, inserted_at, url, raw_data, status, board_column, notes, priority, \
     analysis, synced, project_item_id, synced_at";

/// Insert-or-replace the record under its source id. The caller supplies the
/// full row; re-ingestion must merge against [`get_job`] first so that sync
/// state and user edits survive the replace.
#[instrument(skip_all, fields(job_id = %record.id))]
pub async fn upsert_job(pool: &Pool, record: &JobRecord) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO jobs \
         (id, title, description, budget, currency, category, tag_id, created_at, inserted_at, \
          url, raw_data, status, board_column, notes, priority, analysis, synced, \
          project_item_id, synced_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.title)
    .bind(&record.description)
    .bind(record.budget)
    .bind(&record.currency)
    .bind(&record.category)
    .bind(&record.tag_id)
    .bind(&record.created_at)
    .bind(&record.inserted_at)
    .bind(&record.url)
    .bind(&record.raw_data)
    .bind(record.status.as_str())
    .bind(record.board_column.as_str())
    .bind(&record.notes)
    .bind(record.priority)
    .bind(&record.analysis)
    .bind(record.synced as i64)
    .bind(&record.project_item_id)
    .bind(record.synced_at)
    .execute(pool)
    .await
    .context("failed to upsert job")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_job(pool: &Pool, id: &str) -> Result<Option<JobRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(job_from_row).transpose()
}

/// Record a successful mirror into the sync target. Idempotent when called
/// again with the same item id.
#[instrument(skip_all, fields(job_id = %id))]
pub async fn mark_synced(pool: &Pool, id: &str, project_item_id: &str) -> Result<()> {
    sqlx::query("UPDATE jobs SET synced = 1, project_item_id = ?, synced_at = ? WHERE id = ?")
        .bind(project_item_id)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("failed to mark job synced")?;
    Ok(())
}

/// True only when the sync flag is set AND an external item id is present;
/// a flag alone could be a partial write and does not count.
#[instrument(skip_all)]
pub async fn is_synced(pool: &Pool, id: &str) -> Result<bool> {
    let row = sqlx::query("SELECT synced, project_item_id FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else { return Ok(false) };
    let state = SyncState {
        synced: row.get::<i64, _>("synced") != 0,
        project_item_id: row.try_get("project_item_id").ok(),
    };
    Ok(state.is_synced())
}

#[instrument(skip_all, fields(job_id = %id))]
pub async fn set_status(pool: &Pool, id: &str, status: JobStatus) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist analyzer output and advance the job to `analyzed`.
#[instrument(skip_all, fields(job_id = %id))]
pub async fn save_analysis(pool: &Pool, id: &str, analysis: &str) -> Result<()> {
    sqlx::query("UPDATE jobs SET analysis = ?, status = ? WHERE id = ?")
        .bind(analysis)
        .bind(JobStatus::Analyzed.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all, fields(job_id = %id))]
pub async fn mark_notified(pool: &Pool, id: &str) -> Result<()> {
    set_status(pool, id, JobStatus::Notified).await
}

/// Explicit user action; the ingestion path never calls this.
#[instrument(skip_all, fields(job_id = %id))]
pub async fn set_board_column(pool: &Pool, id: &str, column: BoardColumn) -> Result<()> {
    sqlx::query("UPDATE jobs SET board_column = ? WHERE id = ?")
        .bind(column.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn jobs_by_column(pool: &Pool, column: BoardColumn) -> Result<Vec<JobRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM jobs WHERE board_column = ? \
         ORDER BY priority DESC, created_at DESC",
        JOB_COLUMNS
    ))
    .bind(column.as_str())
    .fetch_all(pool)
    .await?;
    rows.iter().map(job_from_row).collect()
}

#[instrument(skip_all)]
pub async fn jobs_by_status(pool: &Pool, status: JobStatus) -> Result<Vec<JobRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM jobs WHERE status = ? ORDER BY created_at DESC",
        JOB_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    rows.iter().map(job_from_row).collect()
}

#[instrument(skip_all)]
pub async fn jobs_by_category(pool: &Pool, category: &str) -> Result<Vec<JobRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM jobs WHERE category = ? ORDER BY created_at DESC",
        JOB_COLUMNS
    ))
    .bind(category)
    .fetch_all(pool)
    .await?;
    rows.iter().map(job_from_row).collect()
}

/// Jobs still pending whose budget clears the analysis gate.
#[instrument(skip_all)]
pub async fn unanalyzed_jobs(pool: &Pool, min_budget: i64) -> Result<Vec<JobRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM jobs WHERE status = ? AND budget >= ? ORDER BY created_at DESC",
        JOB_COLUMNS
    ))
    .bind(JobStatus::Pending.as_str())
    .bind(min_budget)
    .fetch_all(pool)
    .await?;
    rows.iter().map(job_from_row).collect()
}

/// Append-only audit trail; nothing in this crate reads it back except
/// operators and tests.
#[instrument(skip_all, fields(job_id = %job_id, channel = %channel))]
pub async fn log_notification(
    pool: &Pool,
    job_id: &str,
    channel: &str,
    outcome: &str,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO notification_log (job_id, channel, outcome, error) VALUES (?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(channel)
    .bind(outcome)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn notification_log(pool: &Pool, job_id: &str) -> Result<Vec<NotificationEntry>> {
    let rows = sqlx::query(
        "SELECT id, job_id, channel, outcome, error, created_at \
         FROM notification_log WHERE job_id = ? ORDER BY id ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| NotificationEntry {
            id: row.get("id"),
            job_id: row.get("job_id"),
            channel: row.get("channel"),
            outcome: row.get("outcome"),
            error: row.try_get("error").ok().flatten(),
            created_at: row.get("created_at"),
        })
        .collect())
}
