//! The ingestion cycle: FETCH -> CLASSIFY_FILTER -> CAP -> PERSIST -> SYNC.
//!
//! Strictly sequential; the only concurrency control is the advisory
//! "already running" token that makes an overlapping invocation skip.

use anyhow::{anyhow, Result};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::board::BoardService;
use crate::classify::derive_budget;
use crate::config::{Category, Config};
use crate::db;
use crate::model::JobRecord;
use crate::source::JobSource;

/// Per-cycle counts. A cycle always reports these, even when it partially
/// failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub eligible: usize,
    pub persisted: usize,
    pub synced: usize,
    pub errors: usize,
}

/// Everything a cycle attempted, so callers can decide what to analyze or
/// notify next.
#[derive(Debug)]
pub struct CycleOutcome {
    pub jobs: Vec<JobRecord>,
    pub report: CycleReport,
}

pub struct Pipeline {
    cfg: Config,
    running: AtomicBool,
}

/// Releases the running token on every exit path.
struct RunToken<'a>(&'a AtomicBool);

impl Drop for RunToken<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Pipeline {
    pub fn new(cfg: Config) -> Self {
        Pipeline {
            cfg,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Run one ingestion cycle. Returns `Ok(None)` when a previous cycle is
    /// still running (the invocation skips outright rather than queueing).
    #[instrument(skip_all)]
    pub async fn run_cycle(
        &self,
        pool: &SqlitePool,
        source: &dyn JobSource,
        board: Option<&dyn BoardService>,
        limit: usize,
        category_keys: Option<&[String]>,
    ) -> Result<Option<CycleOutcome>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("previous cycle still running, skipping this one");
            return Ok(None);
        }
        let _token = RunToken(&self.running);

        let categories = self.selected_categories(category_keys)?;
        let mut report = CycleReport::default();

        // FETCH: over-fetch per category so budget filtering still leaves
        // enough to fill the cap.
        let page_size = page_size_for(limit, categories.len(), self.cfg.source.page_size);
        let mut listings = Vec::new();
        for category in &categories {
            let outcome = source.fetch_page(category, page_size).await;
            if outcome.success {
                info!(
                    category = %category.label,
                    count = outcome.listings.len(),
                    "fetched category"
                );
                listings.extend(outcome.listings);
            } else {
                warn!(
                    category = %category.label,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "category fetch failed, continuing with the rest"
                );
                report.errors += 1;
            }
        }
        report.fetched = listings.len();

        // CLASSIFY_FILTER: a minimum of exactly 0 bypasses filtering.
        let min_budget = self.cfg.filter.min_budget;
        let mut classified: Vec<_> = listings
            .into_iter()
            .map(|l| {
                let budget = derive_budget(&l);
                (l, budget)
            })
            .collect();
        if min_budget > 0 {
            classified.retain(|(_, budget)| *budget >= min_budget);
        }
        report.eligible = classified.len();

        // CAP: keep the source's own newest-first order.
        classified.truncate(limit);

        // PERSIST: merge against the stored row so sync state and user edits
        // survive re-ingestion.
        let mut jobs = Vec::with_capacity(classified.len());
        let mut persisted_ids = Vec::new();
        for (listing, budget) in &classified {
            let record = JobRecord::from_listing(listing, *budget, &self.cfg.filter.currency);
            let merged = match db::get_job(pool, &record.id).await {
                Ok(Some(prev)) => record.carry_over(&prev),
                Ok(None) => record,
                Err(err) => {
                    warn!(?err, job_id = %record.id, "failed to read existing job");
                    report.errors += 1;
                    jobs.push(record);
                    continue;
                }
            };
            match db::upsert_job(pool, &merged).await {
                Ok(()) => {
                    report.persisted += 1;
                    persisted_ids.push(merged.id.clone());
                }
                Err(err) => {
                    warn!(?err, job_id = %merged.id, "failed to persist job");
                    report.errors += 1;
                }
            }
            jobs.push(merged);
        }

        // SYNC: gated per job on the persisted ledger; a board that fails to
        // initialize kills only this phase.
        if let Some(board) = board {
            match board.ensure_ready().await {
                Ok(()) => {
                    self.sync_jobs(pool, board, &jobs, &persisted_ids, &mut report)
                        .await;
                }
                Err(err) => {
                    warn!(?err, "board initialization failed, skipping sync phase");
                    report.errors += 1;
                }
            }
        }

        info!(
            fetched = report.fetched,
            eligible = report.eligible,
            persisted = report.persisted,
            synced = report.synced,
            errors = report.errors,
            "cycle complete"
        );
        Ok(Some(CycleOutcome { jobs, report }))
    }

    async fn sync_jobs(
        &self,
        pool: &SqlitePool,
        board: &dyn BoardService,
        jobs: &[JobRecord],
        persisted_ids: &[String],
        report: &mut CycleReport,
    ) {
        let delay = Duration::from_millis(self.cfg.app.sync_delay_ms);
        for job in jobs {
            // Never mirror a job whose ledger row is missing; the flag is the
            // only thing standing between us and duplicate items.
            if !persisted_ids.contains(&job.id) {
                continue;
            }
            match db::is_synced(pool, &job.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!(?err, job_id = %job.id, "failed to read sync state");
                    report.errors += 1;
                    continue;
                }
            }

            match board.create_item(job).await {
                Ok(created) => {
                    if let Err(err) = db::mark_synced(pool, &job.id, &created.item_id).await {
                        warn!(?err, job_id = %job.id, "failed to record sync state");
                        report.errors += 1;
                    } else {
                        info!(
                            job_id = %job.id,
                            item_id = %created.item_id,
                            kind = created.kind.as_str(),
                            "mirrored job onto the board"
                        );
                        report.synced += 1;
                    }
                }
                Err(err) => {
                    warn!(?err, job_id = %job.id, "failed to mirror job");
                    report.errors += 1;
                }
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn selected_categories(&self, keys: Option<&[String]>) -> Result<Vec<Category>> {
        let enabled = self.cfg.enabled_categories();
        let selected: Vec<Category> = match keys {
            None => enabled.into_iter().cloned().collect(),
            Some(keys) => {
                let mut out = Vec::new();
                for key in keys {
                    match self.cfg.category_by_key(key) {
                        Some(cat) => out.push(cat.clone()),
                        None => return Err(anyhow!("unknown category key: {}", key)),
                    }
                }
                out
            }
        };
        if selected.is_empty() {
            return Err(anyhow!("no categories selected"));
        }
        Ok(selected)
    }
}

/// Rows to request per category: enough to fill the cap after filtering, but
/// never below the configured page size.
fn page_size_for(limit: usize, categories: usize, configured: u32) -> u32 {
    let per_category = limit.div_ceil(categories.max(1)) + 10;
    (per_category as u32).max(configured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_overfetches_for_attrition() {
        // 30 jobs over 4 categories: 8 each, plus the filter buffer.
        assert_eq!(page_size_for(30, 4, 20), 20);
        assert_eq!(page_size_for(100, 4, 20), 35);
        assert_eq!(page_size_for(5, 1, 20), 20);
        assert_eq!(page_size_for(0, 0, 20), 20);
    }
}
