use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Category, Source};
use crate::source::model::{JobResponse, JobsResponse, Listing};

pub mod model;

const JOB_PAGE_BASE: &str = "https://jobboard.fastwork.co/jobs";

/// Canonical public URL for a listing.
pub fn job_url(id: &str) -> String {
    format!("{}/{}", JOB_PAGE_BASE, id)
}

/// Result of one page fetch. Transport and non-2xx failures surface here as
/// `success = false` with an error description; this boundary never returns
/// `Err`.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub listings: Vec<Listing>,
    pub meta: Value,
    pub success: bool,
    pub error: Option<String>,
}

impl FetchOutcome {
    fn failed(error: String) -> Self {
        FetchOutcome {
            listings: Vec::new(),
            meta: Value::Null,
            success: false,
            error: Some(error),
        }
    }
}

/// Result of a single-job detail lookup, same failure contract as
/// [`FetchOutcome`].
#[derive(Debug, Default)]
pub struct DetailOutcome {
    pub job: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
}

/// Seam for the job board. The pipeline fetches one category partition at a
/// time; a failure in one partition never aborts the others.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch_page(&self, category: &Category, page_size: u32) -> FetchOutcome;
}

#[derive(Debug, Clone)]
pub struct FastworkClient {
    http: Client,
    base_url: Url,
}

impl FastworkClient {
    pub fn from_config(cfg: &Source) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.api_base)?;
        let http = Client::builder()
            .user_agent("fastwork-sync/0.1")
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(FastworkClient { http, base_url })
    }

    fn jobs_endpoint(&self) -> anyhow::Result<Url> {
        // The API base ends without a slash ("…/api"); join() would eat the
        // last path segment, so append manually.
        Url::parse(&format!("{}/jobs", self.base_url.as_str().trim_end_matches('/')))
            .map_err(Into::into)
    }

    /// One page of one category, newest first.
    pub async fn fetch_jobs(&self, category: &Category, page: u32, page_size: u32) -> FetchOutcome {
        let endpoint = match self.jobs_endpoint() {
            Ok(u) => u,
            Err(err) => return FetchOutcome::failed(err.to_string()),
        };

        let params: Vec<(String, String)> = vec![
            ("page".into(), page.to_string()),
            ("page_size".into(), page_size.to_string()),
            ("order_by[]".into(), "inserted_at".into()),
            ("order_directions[]".into(), "desc".into()),
            ("filters[0][field]".into(), "tag_id".into()),
            ("filters[0][value]".into(), category.id.clone()),
        ];

        debug!(category = %category.label, page, page_size, "fetching jobs page");
        let res = match self.http.get(endpoint).query(&params).send().await {
            Ok(res) => res,
            Err(err) => {
                warn!(?err, category = %category.label, "job board request failed");
                return FetchOutcome::failed(err.to_string());
            }
        };
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, category = %category.label, "job board error response");
            return FetchOutcome::failed(format!("job board error {}: {}", status, body));
        }

        let payload: JobsResponse = match res.json().await {
            Ok(p) => p,
            Err(err) => return FetchOutcome::failed(format!("invalid response JSON: {}", err)),
        };

        // A response without `data` is a failed fetch, not a panic.
        let Some(data) = payload.data else {
            return FetchOutcome::failed("response missing data".into());
        };

        let listings = data
            .into_iter()
            .filter_map(|raw| Listing::from_raw(raw, &category.label, &category.id))
            .collect();

        FetchOutcome {
            listings,
            meta: payload.meta.unwrap_or(Value::Null),
            success: true,
            error: None,
        }
    }

    /// Single-job detail lookup; used by operators, same failure shape.
    pub async fn fetch_details(&self, job_id: &str) -> DetailOutcome {
        let endpoint = match self.jobs_endpoint() {
            Ok(u) => u,
            Err(err) => {
                return DetailOutcome {
                    job: None,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        };
        let url = format!("{}/{}", endpoint, job_id);

        let res = match self.http.get(url).send().await {
            Ok(res) => res,
            Err(err) => {
                return DetailOutcome {
                    job: None,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        };
        if !res.status().is_success() {
            return DetailOutcome {
                job: None,
                success: false,
                error: Some(format!("job board error {}", res.status())),
            };
        }
        match res.json::<JobResponse>().await {
            Ok(payload) => DetailOutcome {
                success: payload.data.is_some(),
                job: payload.data,
                error: None,
            },
            Err(err) => DetailOutcome {
                job: None,
                success: false,
                error: Some(format!("invalid response JSON: {}", err)),
            },
        }
    }
}

#[async_trait]
impl JobSource for FastworkClient {
    async fn fetch_page(&self, category: &Category, page_size: u32) -> FetchOutcome {
        self.fetch_jobs(category, 1, page_size).await
    }
}
