use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use fastwork_sync::board::model::{CreatedItem, ItemKind};
use fastwork_sync::board::BoardService;
use fastwork_sync::config::{self, Category, Config};
use fastwork_sync::db;
use fastwork_sync::model::{BoardColumn, JobRecord};
use fastwork_sync::pipeline::Pipeline;
use fastwork_sync::source::model::Listing;
use fastwork_sync::source::{FetchOutcome, JobSource};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.app.sync_delay_ms = 0;
    cfg
}

fn listing(category: &Category, id: &str, budget: Option<i64>) -> Listing {
    let mut raw = json!({ "id": id, "title": format!("job {}", id) });
    if let Some(b) = budget {
        raw["budget"] = json!(b);
    }
    Listing::from_raw(raw, &category.label, &category.id).unwrap()
}

/// Canned job board: listings per category id, plus categories that fail.
#[derive(Default)]
struct StubSource {
    listings: HashMap<String, Vec<Listing>>,
    failing: HashSet<String>,
}

impl StubSource {
    fn with_listings(&mut self, category: &Category, listings: Vec<Listing>) -> &mut Self {
        self.listings.insert(category.id.clone(), listings);
        self
    }

    fn failing(&mut self, category: &Category) -> &mut Self {
        self.failing.insert(category.id.clone());
        self
    }
}

#[async_trait]
impl JobSource for StubSource {
    async fn fetch_page(&self, category: &Category, _page_size: u32) -> FetchOutcome {
        if self.failing.contains(&category.id) {
            return FetchOutcome {
                listings: Vec::new(),
                meta: json!({}),
                success: false,
                error: Some("connection reset".into()),
            };
        }
        FetchOutcome {
            listings: self.listings.get(&category.id).cloned().unwrap_or_default(),
            meta: json!({}),
            success: true,
            error: None,
        }
    }
}

/// Records every create call; optionally refuses to initialize or sleeps to
/// hold a cycle open.
struct RecordingBoard {
    created: Arc<Mutex<Vec<(String, i64)>>>,
    ready_error: Option<String>,
    create_delay: Duration,
}

impl RecordingBoard {
    fn new() -> Self {
        RecordingBoard {
            created: Arc::new(Mutex::new(Vec::new())),
            ready_error: None,
            create_delay: Duration::ZERO,
        }
    }

    fn broken(message: &str) -> Self {
        RecordingBoard {
            ready_error: Some(message.to_string()),
            ..RecordingBoard::new()
        }
    }

    async fn created(&self) -> Vec<(String, i64)> {
        self.created.lock().await.clone()
    }
}

#[async_trait]
impl BoardService for RecordingBoard {
    async fn ensure_ready(&self) -> Result<()> {
        match &self.ready_error {
            Some(msg) => Err(anyhow!("{}", msg)),
            None => Ok(()),
        }
    }

    async fn create_item(&self, job: &JobRecord) -> Result<CreatedItem> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let mut created = self.created.lock().await;
        created.push((job.id.clone(), job.budget));
        Ok(CreatedItem {
            item_id: format!("PVTI_{}", created.len()),
            kind: if job.budget > 10_000 {
                ItemKind::Issue
            } else {
                ItemKind::Draft
            },
            issue_url: None,
        })
    }
}

#[tokio::test]
async fn filters_by_budget_and_caps_the_run() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let cat = cfg.source.categories[0].clone();
    let keys = vec![cat.key.clone()];

    let mut source = StubSource::default();
    source.with_listings(
        &cat,
        vec![
            listing(&cat, "none", None),
            listing(&cat, "small", Some(3_000)),
            listing(&cat, "edge", Some(5_000)),
            listing(&cat, "big", Some(20_000)),
        ],
    );
    let board = RecordingBoard::new();

    let pipeline = Pipeline::new(cfg);
    let outcome = pipeline
        .run_cycle(&pool, &source, Some(&board), 10, Some(keys.as_slice()))
        .await
        .unwrap()
        .expect("cycle should not be skipped");

    assert_eq!(outcome.report.fetched, 4);
    assert_eq!(outcome.report.eligible, 2);
    assert_eq!(outcome.report.persisted, 2);
    assert_eq!(outcome.report.synced, 2);
    assert_eq!(outcome.report.errors, 0);

    let ids: Vec<_> = outcome.jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["edge", "big"]);

    assert!(db::get_job(&pool, "edge").await.unwrap().is_some());
    assert!(db::get_job(&pool, "small").await.unwrap().is_none());
    assert!(db::is_synced(&pool, "big").await.unwrap());
}

#[tokio::test]
async fn zero_minimum_budget_bypasses_filtering() {
    let pool = setup_pool().await;
    let mut cfg = test_config();
    cfg.filter.min_budget = 0;
    let cat = cfg.source.categories[0].clone();
    let keys = vec![cat.key.clone()];

    let mut source = StubSource::default();
    source.with_listings(
        &cat,
        vec![listing(&cat, "none", None), listing(&cat, "tiny", Some(100))],
    );

    let pipeline = Pipeline::new(cfg);
    let outcome = pipeline
        .run_cycle(&pool, &source, None, 10, Some(keys.as_slice()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.report.eligible, 2);
    assert_eq!(outcome.report.persisted, 2);
    assert_eq!(outcome.report.synced, 0);
}

#[tokio::test]
async fn second_cycle_creates_nothing_new() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let cat = cfg.source.categories[0].clone();
    let keys = vec![cat.key.clone()];

    let mut source = StubSource::default();
    source.with_listings(
        &cat,
        vec![
            listing(&cat, "a", Some(8_000)),
            listing(&cat, "b", Some(40_000)),
        ],
    );
    let board = RecordingBoard::new();
    let pipeline = Pipeline::new(cfg);

    let first = pipeline
        .run_cycle(&pool, &source, Some(&board), 10, Some(keys.as_slice()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.report.synced, 2);

    // Unchanged source: the persisted ledger suppresses every re-create.
    let second = pipeline
        .run_cycle(&pool, &source, Some(&board), 10, Some(keys.as_slice()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.report.persisted, 2);
    assert_eq!(second.report.synced, 0);
    assert_eq!(board.created().await.len(), 2);
}

#[tokio::test]
async fn one_failing_category_leaves_the_rest_persisted() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let cats = cfg.source.categories.clone();
    assert_eq!(cats.len(), 4);

    let mut source = StubSource::default();
    source
        .with_listings(&cats[0], vec![listing(&cats[0], "a0", Some(9_000))])
        .failing(&cats[1])
        .with_listings(&cats[2], vec![listing(&cats[2], "a2", Some(9_000))])
        .with_listings(&cats[3], vec![listing(&cats[3], "a3", Some(9_000))]);

    let pipeline = Pipeline::new(cfg);
    let outcome = pipeline
        .run_cycle(&pool, &source, None, 10, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.report.fetched, 3);
    assert_eq!(outcome.report.persisted, 3);
    assert_eq!(outcome.report.errors, 1);
    for id in ["a0", "a2", "a3"] {
        assert!(db::get_job(&pool, id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn board_init_failure_skips_sync_but_keeps_persisting() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let cat = cfg.source.categories[0].clone();
    let keys = vec![cat.key.clone()];

    let mut source = StubSource::default();
    source.with_listings(&cat, vec![listing(&cat, "a", Some(9_000))]);
    let board = RecordingBoard::broken("bad credentials");

    let pipeline = Pipeline::new(cfg);
    let outcome = pipeline
        .run_cycle(&pool, &source, Some(&board), 10, Some(keys.as_slice()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.report.persisted, 1);
    assert_eq!(outcome.report.synced, 0);
    assert!(outcome.report.errors >= 1);
    assert!(board.created().await.is_empty());
    assert!(!db::is_synced(&pool, "a").await.unwrap());
}

#[tokio::test]
async fn reingestion_preserves_user_placement_and_sync_state() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let cat = cfg.source.categories[0].clone();
    let keys = vec![cat.key.clone()];

    let mut source = StubSource::default();
    source.with_listings(&cat, vec![listing(&cat, "a", Some(9_000))]);
    let board = RecordingBoard::new();
    let pipeline = Pipeline::new(cfg);

    pipeline
        .run_cycle(&pool, &source, Some(&board), 10, Some(keys.as_slice()))
        .await
        .unwrap()
        .unwrap();

    // The user files the job away; the next ingestion must not undo that.
    db::set_board_column(&pool, "a", BoardColumn::Interested)
        .await
        .unwrap();

    pipeline
        .run_cycle(&pool, &source, Some(&board), 10, Some(keys.as_slice()))
        .await
        .unwrap()
        .unwrap();

    let job = db::get_job(&pool, "a").await.unwrap().unwrap();
    assert_eq!(job.board_column, BoardColumn::Interested);
    assert!(job.synced);
    assert_eq!(board.created().await.len(), 1);
}

#[tokio::test]
async fn overlapping_cycle_skips_instead_of_queueing() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let cat = cfg.source.categories[0].clone();
    let keys = vec![cat.key.clone()];

    let mut source = StubSource::default();
    source.with_listings(&cat, vec![listing(&cat, "a", Some(9_000))]);
    let source = Arc::new(source);

    let board = Arc::new(RecordingBoard {
        create_delay: Duration::from_millis(300),
        ..RecordingBoard::new()
    });
    let pipeline = Arc::new(Pipeline::new(cfg));

    let first = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let pool = pool.clone();
        let source = Arc::clone(&source);
        let board = Arc::clone(&board);
        let keys = keys.clone();
        async move {
            pipeline
                .run_cycle(&pool, source.as_ref(), Some(board.as_ref()), 10, Some(keys.as_slice()))
                .await
        }
    });

    // Give the first cycle time to take the token, then try to overlap.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = pipeline
        .run_cycle(&pool, source.as_ref(), Some(board.as_ref()), 10, Some(keys.as_slice()))
        .await
        .unwrap();
    assert!(second.is_none(), "overlapping cycle must skip outright");

    let first = first.await.unwrap().unwrap().unwrap();
    assert_eq!(first.report.synced, 1);

    // The token is released once the first cycle finishes.
    let third = pipeline
        .run_cycle(&pool, source.as_ref(), Some(board.as_ref()), 10, Some(keys.as_slice()))
        .await
        .unwrap();
    assert!(third.is_some());
}
