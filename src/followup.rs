//! Collaborator boundaries for analysis and outbound notification.
//!
//! The analyzer and the notification channels live outside this crate; this
//! module only decides which jobs are eligible, persists whatever comes
//! back, and keeps the audit trail.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::classify::HIGH_VALUE_BUDGET;
use crate::db;
use crate::model::{JobRecord, JobStatus};

/// External analyzer; returns an opaque analysis text for one job.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, job: &JobRecord) -> Result<String>;
}

/// External notification channel for jobs that are already analyzed.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &str;
    async fn notify(&self, job: &JobRecord) -> Result<()>;
}

/// Run the analyzer over every pending job whose budget clears the
/// high-value gate. Per-job failures mark that job `error` and move on.
/// Returns the number of jobs analyzed.
#[instrument(skip_all)]
pub async fn analyze_pending(pool: &SqlitePool, analyzer: &dyn Analyzer) -> Result<usize> {
    let jobs = db::unanalyzed_jobs(pool, HIGH_VALUE_BUDGET).await?;
    let mut analyzed = 0;
    for job in &jobs {
        match analyzer.analyze(job).await {
            Ok(text) => {
                db::save_analysis(pool, &job.id, &text).await?;
                analyzed += 1;
            }
            Err(err) => {
                warn!(?err, job_id = %job.id, "analysis failed");
                db::set_status(pool, &job.id, JobStatus::Error).await?;
            }
        }
    }
    info!(candidates = jobs.len(), analyzed, "analysis pass complete");
    Ok(analyzed)
}

/// Push every analyzed job through one notification channel, appending an
/// audit row per attempt. Returns the number of jobs notified.
#[instrument(skip_all)]
pub async fn notify_analyzed(pool: &SqlitePool, notifier: &dyn Notifier) -> Result<usize> {
    let jobs = db::jobs_by_status(pool, JobStatus::Analyzed).await?;
    let mut notified = 0;
    for job in &jobs {
        match notifier.notify(job).await {
            Ok(()) => {
                db::log_notification(pool, &job.id, notifier.channel(), "sent", None).await?;
                db::mark_notified(pool, &job.id).await?;
                notified += 1;
            }
            Err(err) => {
                let msg = err.to_string();
                warn!(error = %msg, job_id = %job.id, "notification failed");
                db::log_notification(pool, &job.id, notifier.channel(), "failed", Some(&msg))
                    .await?;
            }
        }
    }
    info!(candidates = jobs.len(), notified, "notification pass complete");
    Ok(notified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoardColumn;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn record(id: &str, budget: i64) -> JobRecord {
        JobRecord {
            id: id.into(),
            title: "t".into(),
            description: None,
            budget,
            currency: "THB".into(),
            category: "IT Solutions".into(),
            tag_id: "tag".into(),
            created_at: None,
            inserted_at: None,
            url: format!("https://jobboard.fastwork.co/jobs/{}", id),
            raw_data: json!({}).to_string(),
            status: JobStatus::Pending,
            board_column: BoardColumn::Inbox,
            notes: String::new(),
            priority: 0,
            analysis: None,
            synced: false,
            project_item_id: None,
            synced_at: None,
        }
    }

    struct ScriptedAnalyzer {
        fail_for: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Analyzer for ScriptedAnalyzer {
        async fn analyze(&self, job: &JobRecord) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if job.id == self.fail_for {
                Err(anyhow!("model unavailable"))
            } else {
                Ok(format!("analysis of {}", job.id))
            }
        }
    }

    struct FlakyNotifier;

    #[async_trait]
    impl Notifier for FlakyNotifier {
        fn channel(&self) -> &str {
            "telegram"
        }

        async fn notify(&self, job: &JobRecord) -> Result<()> {
            if job.id == "bad" {
                Err(anyhow!("chat unreachable"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn analysis_gates_on_budget_and_status() {
        let pool = setup_pool().await;
        db::upsert_job(&pool, &record("low", 4_000)).await.unwrap();
        db::upsert_job(&pool, &record("high", 25_000)).await.unwrap();
        db::upsert_job(&pool, &record("flaky", 30_000)).await.unwrap();

        let analyzer = ScriptedAnalyzer {
            fail_for: "flaky",
            calls: AtomicUsize::new(0),
        };
        let analyzed = analyze_pending(&pool, &analyzer).await.unwrap();

        // Only the two high-value jobs are eligible; one of them fails.
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(analyzed, 1);
        assert_eq!(
            db::get_job(&pool, "high").await.unwrap().unwrap().status,
            JobStatus::Analyzed
        );
        assert_eq!(
            db::get_job(&pool, "flaky").await.unwrap().unwrap().status,
            JobStatus::Error
        );
        assert_eq!(
            db::get_job(&pool, "low").await.unwrap().unwrap().status,
            JobStatus::Pending
        );

        // A second pass re-touches nothing that is settled.
        let analyzed = analyze_pending(&pool, &analyzer).await.unwrap();
        assert_eq!(analyzed, 0);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn notification_marks_and_logs_outcomes() {
        let pool = setup_pool().await;
        db::upsert_job(&pool, &record("ok", 25_000)).await.unwrap();
        db::upsert_job(&pool, &record("bad", 25_000)).await.unwrap();
        db::save_analysis(&pool, "ok", "a").await.unwrap();
        db::save_analysis(&pool, "bad", "a").await.unwrap();

        let notified = notify_analyzed(&pool, &FlakyNotifier).await.unwrap();
        assert_eq!(notified, 1);

        assert_eq!(
            db::get_job(&pool, "ok").await.unwrap().unwrap().status,
            JobStatus::Notified
        );
        // A failed channel leaves the job analyzed for the next pass.
        assert_eq!(
            db::get_job(&pool, "bad").await.unwrap().unwrap().status,
            JobStatus::Analyzed
        );

        let log = db::notification_log(&pool, "bad").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, "failed");
        assert_eq!(log[0].error.as_deref(), Some("chat unreachable"));
    }
}
