//! Budget derivation and job classification.
//!
//! Everything here is a pure function over a listing (or the fields of a
//! stored record); the pipeline and the board client both call into this
//! module so the two stay in agreement about what a budget means.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::source::model::Listing;

/// Budgets strictly above this (in THB) are promoted to full tracked issues
/// on the sync target, and are the cutoff for analysis eligibility.
pub const HIGH_VALUE_BUDGET: i64 = 10_000;

/// Thousands-grouped amount followed by a currency marker, e.g. "12,500 THB"
/// or "5,000 บาท".
static BUDGET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,3}(?:,\d{3})*)\s*(?:บาท|THB|baht)").unwrap());

/// Derive a numeric budget from whichever representation the listing carries.
///
/// Precedence: explicit `budget`, then `budget_min`, then `price`, then a
/// best-effort text match over budget text / description / title. A result
/// of 0 means "unspecified", never a real zero-cost job.
pub fn derive_budget(listing: &Listing) -> i64 {
    if let Some(b) = listing.budget {
        return b as i64;
    }
    if let Some(b) = listing.budget_min {
        return b as i64;
    }
    if let Some(b) = listing.price {
        return b as i64;
    }

    let candidates = [
        listing.budget_text.as_deref(),
        listing.description.as_deref(),
        Some(listing.title.as_str()),
    ];
    for text in candidates.into_iter().flatten() {
        if let Some(caps) = BUDGET_RE.captures(text) {
            if let Ok(v) = caps[1].replace(',', "").parse::<i64>() {
                return v;
            }
        }
    }

    0
}

/// Discrete size classification derived from budget. The boundaries are
/// half-open and load-bearing: the bucket is written to the sync target as a
/// single-select value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBucket {
    Xs,
    S,
    M,
    L,
    Xl,
}

impl SizeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Xs => "XS",
            SizeBucket::S => "S",
            SizeBucket::M => "M",
            SizeBucket::L => "L",
            SizeBucket::Xl => "XL",
        }
    }
}

pub fn size_bucket(budget: i64) -> SizeBucket {
    if budget < 5_000 {
        SizeBucket::Xs
    } else if budget < 15_000 {
        SizeBucket::S
    } else if budget < 30_000 {
        SizeBucket::M
    } else if budget < 60_000 {
        SizeBucket::L
    } else {
        SizeBucket::Xl
    }
}

/// Lowercase, whitespace to hyphens, strip everything else that is not
/// alphanumeric or a hyphen.
pub fn slugify(s: &str) -> String {
    static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    static JUNK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9-]").unwrap());
    let lowered = s.to_lowercase();
    let hyphenated = WS.replace_all(&lowered, "-");
    JUNK.replace_all(&hyphenated, "").into_owned()
}

/// Tag set for a job: one budget tier, the slugified category, and content
/// tags triggered by substring matches over title + description (urgency is
/// detected in both English and Thai).
pub fn derive_tags(title: &str, description: &str, budget: i64, category: &str) -> Vec<String> {
    let mut tags = Vec::new();

    if budget >= 50_000 {
        tags.push("high-budget".to_string());
    } else if budget >= 20_000 {
        tags.push("medium-budget".to_string());
    } else if budget > 0 {
        tags.push("low-budget".to_string());
    } else {
        tags.push("no-budget".to_string());
    }

    if !category.is_empty() {
        let slug = slugify(category);
        if !slug.is_empty() {
            tags.push(slug);
        }
    }

    let content = format!("{} {}", title, description).to_lowercase();
    if content.contains("urgent") || content.contains("ด่วน") {
        tags.push("urgent".to_string());
    }
    if content.contains("remote") || content.contains("wfh") || content.contains("work from home")
    {
        tags.push("remote".to_string());
    }
    if content.contains("full time") || content.contains("full-time") {
        tags.push("full-time".to_string());
    }
    if content.contains("part time") || content.contains("part-time") {
        tags.push("part-time".to_string());
    }

    tags
}
