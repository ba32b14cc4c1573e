//! Wire models for the job-board API.
//!
//! Listings are read-only and re-fetched every cycle; the typed fields below
//! are the ones the pipeline cares about, and `raw` keeps the untouched JSON
//! for persistence and later inspection.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// `GET /jobs` response envelope.
#[derive(Debug, Deserialize)]
pub struct JobsResponse {
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// `GET /jobs/{id}` response envelope.
#[derive(Debug, Deserialize)]
pub struct JobResponse {
    #[serde(default)]
    pub data: Option<Value>,
}

/// Typed slice of one raw listing.
#[derive(Debug, Deserialize)]
struct WireListing {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    budget: Option<f64>,
    #[serde(default)]
    budget_min: Option<f64>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    budget_text: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    inserted_at: Option<String>,
}

/// An ephemeral job posting, tagged with the category partition it was
/// fetched from.
#[derive(Debug, Clone)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub budget_min: Option<f64>,
    pub price: Option<f64>,
    pub budget_text: Option<String>,
    pub created_at: Option<String>,
    pub inserted_at: Option<String>,
    pub category: String,
    pub tag_id: String,
    pub raw: Value,
}

impl Listing {
    /// Parse a raw listing object. A listing without an id is malformed and
    /// yields `None` (logged, not fatal).
    pub fn from_raw(raw: Value, category_label: &str, tag_id: &str) -> Option<Listing> {
        let wire: WireListing = match serde_json::from_value(raw.clone()) {
            Ok(w) => w,
            Err(err) => {
                warn!(?err, "skipping malformed listing");
                return None;
            }
        };
        let title = wire
            .title
            .or(wire.name)
            .unwrap_or_else(|| "(untitled)".to_string());
        Some(Listing {
            id: wire.id,
            title,
            description: wire.description,
            budget: wire.budget,
            budget_min: wire.budget_min,
            price: wire.price,
            budget_text: wire.budget_text,
            created_at: wire.created_at,
            inserted_at: wire.inserted_at,
            category: category_label.to_string(),
            tag_id: tag_id.to_string(),
            raw,
        })
    }
}
