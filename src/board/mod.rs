use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::classify::{derive_tags, size_bucket, HIGH_VALUE_BUDGET};
use crate::config::Github;
use crate::model::JobRecord;
use crate::board::model::{
    BoardSchema, ClearReport, CreatedItem, FieldRole, FieldValue, GraphQlEnvelope, IssueCreated,
    ItemKind, PageInfo, ProjectField, WireField,
};

pub mod model;

const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";
const GITHUB_REST_BASE: &str = "https://api.github.com";

const PROJECT_QUERY: &str = r#"
query($owner: String!, $projectNumber: Int!) {
  user(login: $owner) {
    projectV2(number: $projectNumber) {
      id
      title
      fields(first: 20) {
        nodes {
          ... on ProjectV2Field { id name dataType }
          ... on ProjectV2SingleSelectField { id name dataType options { id name } }
        }
      }
    }
  }
}"#;

const ADD_DRAFT_MUTATION: &str = r#"
mutation($projectId: ID!, $title: String!, $body: String!) {
  addProjectV2DraftIssue(input: { projectId: $projectId, title: $title, body: $body }) {
    projectItem { id }
  }
}"#;

const ADD_BY_CONTENT_MUTATION: &str = r#"
mutation($projectId: ID!, $contentId: ID!) {
  addProjectV2ItemByContentId(input: { projectId: $projectId, contentId: $contentId }) {
    item { id }
  }
}"#;

const SET_FIELD_MUTATION: &str = r#"
mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $value: ProjectV2FieldValue!) {
  updateProjectV2ItemFieldValue(
    input: { projectId: $projectId, itemId: $itemId, fieldId: $fieldId, value: $value }
  ) {
    projectV2Item { id }
  }
}"#;

const LIST_ITEMS_QUERY: &str = r#"
query($owner: String!, $projectNumber: Int!, $after: String) {
  user(login: $owner) {
    projectV2(number: $projectNumber) {
      items(first: 100, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes { id }
      }
    }
  }
}"#;

const DELETE_ITEM_MUTATION: &str = r#"
mutation($projectId: ID!, $itemId: ID!) {
  deleteProjectV2Item(input: { projectId: $projectId, itemId: $itemId }) {
    deletedItemId
  }
}"#;

const VIEWER_QUERY: &str = "query { viewer { login } }";

/// Seam for the sync target. The client performs no cross-run dedup; the
/// at-most-once guarantee lives with the orchestrator's `is_synced` check.
#[async_trait]
pub trait BoardService: Send + Sync {
    /// Resolve board identity and schema; failure here is fatal to the whole
    /// sync phase of a cycle.
    async fn ensure_ready(&self) -> Result<()>;

    /// Mirror one job onto the board. One-shot per call by design.
    async fn create_item(&self, job: &JobRecord) -> Result<CreatedItem>;
}

pub struct GithubProjects {
    http: Client,
    graphql_url: Url,
    rest_base: Url,
    token: String,
    owner: String,
    project_number: i64,
    issues_repo: String,
    schema: OnceCell<BoardSchema>,
}

impl fmt::Debug for GithubProjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubProjects")
            .field("owner", &self.owner)
            .field("project_number", &self.project_number)
            .finish_non_exhaustive()
    }
}

impl GithubProjects {
    pub fn from_config(cfg: &Github) -> Result<Self> {
        let (owner, project_number) = parse_project_url(&cfg.project_url)?;
        let http = Client::builder()
            .user_agent("fastwork-sync/0.1")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(GithubProjects {
            http,
            graphql_url: Url::parse(GITHUB_GRAPHQL_URL).expect("valid GraphQL URL"),
            rest_base: Url::parse(GITHUB_REST_BASE).expect("valid REST URL"),
            token: cfg.token.clone(),
            owner,
            project_number,
            issues_repo: cfg.issues_repo.clone(),
            schema: OnceCell::new(),
        })
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let res = self
            .http
            .post(self.graphql_url.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .context("failed to reach GitHub GraphQL API")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("github error {}: {}", status, body));
        }

        let envelope: GraphQlEnvelope = res
            .json()
            .await
            .context("invalid GitHub GraphQL response JSON")?;
        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            return Err(anyhow!(
                "graphql errors: {}",
                serde_json::to_string(&errors).unwrap_or_default()
            ));
        }
        envelope.data.ok_or_else(|| anyhow!("graphql response without data"))
    }

    /// Resolved board schema, fetched on first use and cached for the
    /// process lifetime.
    async fn schema(&self) -> Result<&BoardSchema> {
        self.schema
            .get_or_try_init(|| self.resolve_schema())
            .await
            .context("failed to initialize the project board")
    }

    async fn resolve_schema(&self) -> Result<BoardSchema> {
        let data = self
            .graphql(
                PROJECT_QUERY,
                json!({ "owner": self.owner, "projectNumber": self.project_number }),
            )
            .await?;

        let project = data
            .pointer("/user/projectV2")
            .filter(|p| !p.is_null())
            .ok_or_else(|| {
                anyhow!(
                    "project not found: users/{}/projects/{}",
                    self.owner,
                    self.project_number
                )
            })?;

        let project_id = project
            .pointer("/id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("project response missing id"))?
            .to_string();
        let title = project
            .pointer("/title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut fields = HashMap::new();
        let nodes = project
            .pointer("/fields/nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for node in nodes {
            let Ok(field) = serde_json::from_value::<WireField>(node) else {
                continue;
            };
            let Some(role) = field_role_for(&field.name) else {
                continue;
            };
            let options = field
                .options
                .into_iter()
                .map(|o| (o.name, o.id))
                .collect::<HashMap<_, _>>();
            fields.insert(role, ProjectField { id: field.id, options });
        }

        info!(
            project = %title,
            fields = fields.len(),
            "resolved project board schema"
        );
        Ok(BoardSchema { project_id, title, fields })
    }

    async fn create_draft(&self, schema: &BoardSchema, title: &str, body: &str) -> Result<String> {
        let data = self
            .graphql(
                ADD_DRAFT_MUTATION,
                json!({ "projectId": schema.project_id, "title": title, "body": body }),
            )
            .await?;
        data.pointer("/addProjectV2DraftIssue/projectItem/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("draft mutation response missing item id"))
    }

    /// High-value path: a real issue in the companion repo, attached to the
    /// board by content id.
    async fn create_issue(
        &self,
        schema: &BoardSchema,
        job: &JobRecord,
        title: &str,
        body: &str,
    ) -> Result<CreatedItem> {
        let mut labels = vec![job.category.clone()];
        labels.extend(derive_tags(
            &job.title,
            job.description.as_deref().unwrap_or(""),
            job.budget,
            &job.category,
        ));
        labels.retain(|l| !l.is_empty());

        let endpoint = self
            .rest_base
            .join(&format!("repos/{}/issues", self.issues_repo))
            .context("invalid issues repo path")?;
        let res = self
            .http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&json!({ "title": title, "body": body, "labels": labels }))
            .send()
            .await
            .context("failed to reach GitHub issues API")?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("failed to create issue {}: {}", status, text));
        }
        let issue: IssueCreated = res.json().await.context("invalid issue response JSON")?;

        let data = self
            .graphql(
                ADD_BY_CONTENT_MUTATION,
                json!({ "projectId": schema.project_id, "contentId": issue.node_id }),
            )
            .await?;
        let item_id = data
            .pointer("/addProjectV2ItemByContentId/item/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("attach mutation response missing item id"))?;

        info!(
            job_id = %job.id,
            issue = issue.number,
            url = %issue.html_url,
            "created issue and attached it to the board"
        );
        Ok(CreatedItem {
            item_id,
            kind: ItemKind::Issue,
            issue_url: Some(issue.html_url),
        })
    }

    async fn set_field(
        &self,
        schema: &BoardSchema,
        item_id: &str,
        field_id: &str,
        value: &FieldValue,
    ) -> Result<()> {
        self.graphql(
            SET_FIELD_MUTATION,
            json!({
                "projectId": schema.project_id,
                "itemId": item_id,
                "fieldId": field_id,
                "value": value.encode(),
            }),
        )
        .await?;
        Ok(())
    }

    /// Best-effort field pass; each update stands alone and a failure is
    /// logged without touching the others or the creation result.
    async fn populate_fields(&self, schema: &BoardSchema, item_id: &str, job: &JobRecord) {
        for (field_id, value) in planned_updates(schema, job) {
            if let Err(err) = self.set_field(schema, item_id, &field_id, &value).await {
                warn!(?err, job_id = %job.id, field_id, "field update failed");
            }
        }
    }

    /// Administrative sweep: list every item page by page and delete them one
    /// at a time, tolerating individual failures.
    pub async fn clear(&self) -> Result<ClearReport> {
        let schema = self.schema().await?;
        let ids = self.list_item_ids().await?;
        let mut report = ClearReport {
            found: ids.len(),
            deleted: 0,
        };
        for id in ids {
            match self
                .graphql(
                    DELETE_ITEM_MUTATION,
                    json!({ "projectId": schema.project_id, "itemId": id }),
                )
                .await
            {
                Ok(_) => report.deleted += 1,
                Err(err) => warn!(?err, item_id = %id, "failed to delete project item"),
            }
        }
        info!(found = report.found, deleted = report.deleted, "cleared project board");
        Ok(report)
    }

    async fn list_item_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data = self
                .graphql(
                    LIST_ITEMS_QUERY,
                    json!({
                        "owner": self.owner,
                        "projectNumber": self.project_number,
                        "after": cursor,
                    }),
                )
                .await?;
            let items = data
                .pointer("/user/projectV2/items")
                .cloned()
                .ok_or_else(|| anyhow!("items response missing connection"))?;
            if let Some(nodes) = items.pointer("/nodes").and_then(Value::as_array) {
                ids.extend(
                    nodes
                        .iter()
                        .filter_map(|n| n.pointer("/id").and_then(Value::as_str))
                        .map(str::to_string),
                );
            }
            let page: PageInfo = serde_json::from_value(
                items.pointer("/pageInfo").cloned().unwrap_or(Value::Null),
            )
            .context("items response missing pageInfo")?;
            if !page.has_next_page {
                break;
            }
            cursor = page.end_cursor;
        }
        Ok(ids)
    }

    /// Connection check; returns the authenticated login.
    pub async fn viewer(&self) -> Result<String> {
        let data = self.graphql(VIEWER_QUERY, json!({})).await?;
        data.pointer("/viewer/login")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("viewer response missing login"))
    }
}

#[async_trait]
impl BoardService for GithubProjects {
    async fn ensure_ready(&self) -> Result<()> {
        self.schema().await.map(|_| ())
    }

    async fn create_item(&self, job: &JobRecord) -> Result<CreatedItem> {
        let schema = self.schema().await?;
        let title = format_title(job);
        let body = format_body(job);

        let created = if routes_to_issue(job.budget) {
            self.create_issue(schema, job, &title, &body).await?
        } else {
            let item_id = self.create_draft(schema, &title, &body).await?;
            info!(job_id = %job.id, item_id = %item_id, "created draft item on the board");
            CreatedItem {
                item_id,
                kind: ItemKind::Draft,
                issue_url: None,
            }
        };

        self.populate_fields(schema, &created.item_id, job).await;
        Ok(created)
    }
}

/// Low-value jobs are numerous and transient, so they stay cheap draft
/// items; anything above the threshold earns a durable, labeled issue.
pub fn routes_to_issue(budget: i64) -> bool {
    budget > HIGH_VALUE_BUDGET
}

fn parse_project_url(url: &str) -> Result<(String, i64)> {
    let tail = url
        .split_once("github.com/users/")
        .map(|(_, tail)| tail)
        .ok_or_else(|| anyhow!("invalid project URL: {}", url))?;
    let (owner, rest) = tail
        .split_once("/projects/")
        .ok_or_else(|| anyhow!("invalid project URL: {}", url))?;
    let number: i64 = rest
        .trim_end_matches('/')
        .parse()
        .map_err(|_| anyhow!("invalid project number in URL: {}", url))?;
    if owner.is_empty() {
        return Err(anyhow!("invalid project URL: {}", url));
    }
    Ok((owner.to_string(), number))
}

/// Fuzzy, case-insensitive mapping of a field's display name onto a semantic
/// role. Later board fields win on a name collision.
fn field_role_for(name: &str) -> Option<FieldRole> {
    let n = name.to_lowercase();
    if n.contains("budget") {
        Some(FieldRole::Budget)
    } else if n.contains("category") {
        Some(FieldRole::Category)
    } else if n.contains("tag") || n.contains("label") {
        Some(FieldRole::Tags)
    } else if n.contains("status") {
        Some(FieldRole::Status)
    } else if n.contains("size") {
        Some(FieldRole::Size)
    } else if n.contains("start") && (n.contains("date") || n.contains("time")) {
        Some(FieldRole::StartDate)
    } else if (n.contains("end") && (n.contains("date") || n.contains("time")))
        || n.contains("deadline")
    {
        Some(FieldRole::EndDate)
    } else {
        None
    }
}

/// The field writes a created item should receive, in a fixed order. Pure so
/// the routing of values to roles is testable without a network.
pub fn planned_updates(schema: &BoardSchema, job: &JobRecord) -> Vec<(String, FieldValue)> {
    let mut updates = Vec::new();

    if job.budget > 0 {
        if let Some(field) = schema.field(FieldRole::Budget) {
            updates.push((
                field.id.clone(),
                FieldValue::Text(format!("{} {}", format_thousands(job.budget), job.currency)),
            ));
        }
    }

    if !job.category.is_empty() {
        if let Some(field) = schema.field(FieldRole::Category) {
            updates.push((field.id.clone(), FieldValue::Text(job.category.clone())));
        }
    }

    if job.budget > 0 {
        if let Some(field) = schema.field(FieldRole::Size) {
            let bucket = size_bucket(job.budget);
            match field.options.get(bucket.as_str()) {
                Some(option_id) => {
                    updates.push((field.id.clone(), FieldValue::SingleSelect(option_id.clone())))
                }
                None => warn!(bucket = bucket.as_str(), "size field has no matching option"),
            }
        }
    }

    if let Some(field) = schema.field(FieldRole::StartDate) {
        if let Some(date) = job.inserted_at.as_deref().and_then(parse_source_date) {
            updates.push((field.id.clone(), FieldValue::Date(date)));
        }
    }

    if let Some(field) = schema.field(FieldRole::EndDate) {
        if let Some(date) = extract_end_date(job) {
            updates.push((field.id.clone(), FieldValue::Date(date)));
        }
    }

    if let Some(field) = schema.field(FieldRole::Tags) {
        let tags = derive_tags(
            &job.title,
            job.description.as_deref().unwrap_or(""),
            job.budget,
            &job.category,
        );
        if !tags.is_empty() {
            updates.push((field.id.clone(), FieldValue::Text(tags.join(", "))));
        }
    }

    updates
}

pub fn format_title(job: &JobRecord) -> String {
    if job.budget > 0 {
        format!("[{} {}] {}", format_thousands(job.budget), job.currency, job.title)
    } else {
        job.title.clone()
    }
}

pub fn format_body(job: &JobRecord) -> String {
    let budget = if job.budget > 0 {
        format!("{} {}", format_thousands(job.budget), job.currency)
    } else {
        "Not specified".to_string()
    };
    let start = job
        .inserted_at
        .as_deref()
        .and_then(parse_source_date)
        .map(|d| d.to_string())
        .unwrap_or_else(|| "Not specified".to_string());
    let end = extract_end_date(job)
        .map(|d| d.to_string())
        .unwrap_or_else(|| "Not specified".to_string());

    let mut sections = vec![
        "## Job Details".to_string(),
        format!("**Title:** {}", job.title),
        format!("**Budget:** {}", budget),
        format!("**Size:** {}", size_bucket(job.budget).as_str()),
        format!(
            "**Category:** {}",
            if job.category.is_empty() { "Other" } else { job.category.as_str() }
        ),
        format!("**Start Date:** {}", start),
        format!("**End Date:** {}", end),
        format!("**Source URL:** [View Job]({})", job.url),
        String::new(),
        "## Description".to_string(),
        job.description
            .clone()
            .unwrap_or_else(|| "No description provided".to_string()),
        String::new(),
        format!("- **Job ID:** {}", job.id),
    ];

    let tags = derive_tags(
        &job.title,
        job.description.as_deref().unwrap_or(""),
        job.budget,
        &job.category,
    );
    if !tags.is_empty() {
        sections.push(format!(
            "**Tags:** {}",
            tags.iter()
                .map(|t| format!("`{}`", t))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    sections.join("\n")
}

fn format_thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if n < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Source timestamps are sometimes zone-less; try RFC 3339 first, then the
/// naive forms the board actually emits.
fn parse_source_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Deadline from the raw listing (`deadline_at`, then `expired_at`), else 30
/// days after insertion.
fn extract_end_date(job: &JobRecord) -> Option<NaiveDate> {
    if let Ok(raw) = serde_json::from_str::<Value>(&job.raw_data) {
        for key in ["deadline_at", "expired_at"] {
            if let Some(date) = raw.get(key).and_then(Value::as_str).and_then(parse_source_date)
            {
                return Some(date);
            }
        }
    }
    job.inserted_at
        .as_deref()
        .and_then(parse_source_date)
        .map(|d| d + Duration::days(30))
}
