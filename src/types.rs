use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One product card extracted from a report.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Candidate {
    pub title: String,
    #[serde(default)]
    pub candidate_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub primary_terms: Vec<String>,
    #[serde(default)]
    pub ebay_links: Vec<String>,
    #[serde(default)]
    pub source_links: Vec<String>,
    pub sell_price: Option<f64>,
    pub landed_cost: Option<f64>,
    pub margin_pct: Option<f64>,
    pub roi_pct: Option<f64>,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub source_report_path: String,
    #[serde(default)]
    pub source_report_label: String,
    /// First line of the card (the heading), 1-based
    #[serde(default)]
    pub start_line: usize,
    /// Last line belonging to the card, inclusive
    #[serde(default)]
    pub end_line: usize,
    #[serde(default)]
    pub rank: usize,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SourceReport {
    pub path: String,
    pub label: String,
    pub candidate_count: usize,
    pub modified_at: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ParsedReport {
    pub title: String,
    pub date: String,
    pub market: String,
    pub theme: String,
    pub compliance: String,
    pub candidates: Vec<Candidate>,
    pub agent_team: Vec<String>,
    pub summary_lines: Vec<String>,
    #[serde(default)]
    pub source_reports: Vec<SourceReport>,
}

/// Semantic category of a single URL, derived from host and path shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCategory {
    EbayItem,
    EbaySearch,
    EbayCategory,
    EbayOther,
    AliexpressSearch,
    AliexpressOther,
    AlibabaDisallowed,
    Other,
}

impl LinkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkCategory::EbayItem => "ebay_item",
            LinkCategory::EbaySearch => "ebay_search",
            LinkCategory::EbayCategory => "ebay_category",
            LinkCategory::EbayOther => "ebay_other",
            LinkCategory::AliexpressSearch => "aliexpress_search",
            LinkCategory::AliexpressOther => "aliexpress_other",
            LinkCategory::AlibabaDisallowed => "alibaba_disallowed",
            LinkCategory::Other => "other",
        }
    }

    /// eBay hosts block automated checks, so their network failures are softened
    pub fn is_ebay(&self) -> bool {
        matches!(
            self,
            LinkCategory::EbayItem
                | LinkCategory::EbaySearch
                | LinkCategory::EbayCategory
                | LinkCategory::EbayOther
        )
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Ok,
    Warn,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => write!(f, "OK"),
            Verdict::Warn => write!(f, "WARN"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// One URL occurrence inside a candidate card
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LinkRecord {
    pub report: PathBuf,
    pub candidate: String,
    pub line: usize,
    pub url: String,
    pub category: LinkCategory,
    pub keyword_overlap: usize,
    pub status_code: Option<u16>,
    pub final_url: Option<String>,
    pub fetch_error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub failures: Vec<String>,
}

impl LinkRecord {
    /// Failures dominate warnings, warnings dominate a clean result.
    pub fn verdict(&self) -> Verdict {
        if !self.failures.is_empty() {
            Verdict::Fail
        } else if !self.warnings.is_empty() {
            Verdict::Warn
        } else {
            Verdict::Ok
        }
    }
}

/// Counts of link verdicts for one document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuditSummary {
    pub ok: usize,
    pub warn: usize,
    pub fail: usize,
    pub total: usize,
}

impl AuditSummary {
    pub fn from_records(records: &[LinkRecord]) -> Self {
        let mut summary = AuditSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.verdict() {
                Verdict::Ok => summary.ok += 1,
                Verdict::Warn => summary.warn += 1,
                Verdict::Fail => summary.fail += 1,
            }
        }
        summary
    }

    pub fn is_failing(&self) -> bool {
        self.fail > 0
    }
}

impl fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok={} warn={} fail={} total={}",
            self.ok, self.warn, self.fail, self.total
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchLabel {
    Exact,
    Similar,
    Weak,
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLabel::Exact => write!(f, "EXACT"),
            MatchLabel::Similar => write!(f, "SIMILAR"),
            MatchLabel::Weak => write!(f, "WEAK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lane {
    TrafficSeed,
    CoreMargin,
}

/// Listing evidence for one candidate, written to evidence.json
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EvidenceRow {
    pub candidate_id: String,
    pub title: String,
    pub source_report: String,
    pub ebay_listing_url: String,
    pub ebay_validation_url: String,
    pub aliexpress_listing_url: String,
    pub match_score: f64,
    pub match_label: MatchLabel,
    pub accepted_differences: String,
    pub estimated_margin_pct: Option<f64>,
    pub sourcing_route: String,
    pub lane: Lane,
}

/// Run manifest written next to the evidence sidecar
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunManifest {
    pub run_id: String,
    pub created_at: String,
    pub candidate_count: usize,
    pub status: String,
    pub source_reports: Vec<String>,
    pub evidence_path: String,
}
