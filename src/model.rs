use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::model::Listing;

/// Processing lifecycle of a stored job. Monotonic
/// `pending -> analyzed -> notified`; `error` is reachable from any state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Analyzed,
    Notified,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Analyzed => "analyzed",
            JobStatus::Notified => "notified",
            JobStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "analyzed" => Some(JobStatus::Analyzed),
            "notified" => Some(JobStatus::Notified),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }
}

/// User-facing workflow stage. Only ever changed by explicit user action;
/// the ingestion path leaves it alone after the initial `Inbox`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BoardColumn {
    Inbox,
    Interested,
    Proposed,
    Archived,
}

impl BoardColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardColumn::Inbox => "inbox",
            BoardColumn::Interested => "interested",
            BoardColumn::Proposed => "proposed",
            BoardColumn::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbox" => Some(BoardColumn::Inbox),
            "interested" => Some(BoardColumn::Interested),
            "proposed" => Some(BoardColumn::Proposed),
            "archived" => Some(BoardColumn::Archived),
            _ => None,
        }
    }
}

/// Durable, locally-owned representation of a listing after classification.
/// Keyed by the source job id, which is stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub budget: i64,
    pub currency: String,
    pub category: String,
    pub tag_id: String,
    /// Timestamps as the source API returned them (sometimes zone-less).
    pub created_at: Option<String>,
    pub inserted_at: Option<String>,
    pub url: String,
    /// Verbatim JSON copy of the raw listing.
    pub raw_data: String,
    pub status: JobStatus,
    pub board_column: BoardColumn,
    pub notes: String,
    pub priority: i64,
    pub analysis: Option<String>,
    pub synced: bool,
    pub project_item_id: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Build a fresh record from a classified listing. Status and column get
    /// their first-insert defaults; re-ingestion merges via
    /// [`JobRecord::carry_over`].
    pub fn from_listing(listing: &Listing, budget: i64, currency: &str) -> Self {
        JobRecord {
            id: listing.id.clone(),
            title: listing.title.clone(),
            description: listing.description.clone(),
            budget,
            currency: currency.to_string(),
            category: listing.category.clone(),
            tag_id: listing.tag_id.clone(),
            created_at: listing.created_at.clone(),
            inserted_at: listing.inserted_at.clone(),
            url: crate::source::job_url(&listing.id),
            raw_data: listing.raw.to_string(),
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

    /// Merge state owned by previous runs (and by the user) into a freshly
    /// ingested record, so that upserting never loses the sync ledger, the
    /// board placement, notes, priority, or a stored analysis.
    pub fn carry_over(mut self, prev: &JobRecord) -> Self {
        self.status = prev.status;
        self.board_column = prev.board_column;
        self.notes = prev.notes.clone();
        self.priority = prev.priority;
        self.analysis = prev.analysis.clone();
        self.synced = prev.synced;
        self.project_item_id = prev.project_item_id.clone();
        self.synced_at = prev.synced_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing(id: &str, title: &str) -> Listing {
        Listing {
            id: id.into(),
            title: title.into(),
            description: Some("desc".into()),
            budget: None,
            budget_min: None,
            price: None,
            budget_text: None,
            created_at: None,
            inserted_at: Some("2024-05-01T07:00:00".into()),
            category: "Web Development".into(),
            tag_id: "tag-1".into(),
            raw: json!({"id": id, "title": title}),
        }
    }

    #[test]
    fn status_round_trip() {
        for s in [
            JobStatus::Pending,
            JobStatus::Analyzed,
            JobStatus::Notified,
            JobStatus::Error,
        ] {
            assert_eq!(JobStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn column_round_trip() {
        for c in [
            BoardColumn::Inbox,
            BoardColumn::Interested,
            BoardColumn::Proposed,
            BoardColumn::Archived,
        ] {
            assert_eq!(BoardColumn::parse(c.as_str()), Some(c));
        }
        assert_eq!(BoardColumn::parse(""), None);
    }

    #[test]
    fn fresh_record_defaults() {
        let rec = JobRecord::from_listing(&listing("j1", "Build an app"), 12_000, "THB");
        assert_eq!(rec.status, JobStatus::Pending);
        assert_eq!(rec.board_column, BoardColumn::Inbox);
        assert!(!rec.synced);
        assert_eq!(rec.url, "https://jobboard.fastwork.co/jobs/j1");
    }

    #[test]
    fn carry_over_preserves_user_and_sync_state() {
        let mut prev = JobRecord::from_listing(&listing("j1", "Old title"), 5_000, "THB");
        prev.board_column = BoardColumn::Interested;
        prev.notes = "talked to client".into();
        prev.priority = 2;
        prev.synced = true;
        prev.project_item_id = Some("PVTI_x".into());

        let merged =
            JobRecord::from_listing(&listing("j1", "New title"), 6_000, "THB").carry_over(&prev);
        assert_eq!(merged.title, "New title");
        assert_eq!(merged.budget, 6_000);
        assert_eq!(merged.board_column, BoardColumn::Interested);
        assert_eq!(merged.notes, "talked to client");
        assert_eq!(merged.priority, 2);
        assert!(merged.synced);
        assert_eq!(merged.project_item_id.as_deref(), Some("PVTI_x"));
    }
}
