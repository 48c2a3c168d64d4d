//! Link Audit Module
//!
//! Extracts every URL inside each candidate card, verifies it over the network
//! and assigns an OK/WARN/FAIL verdict.
//!
//! Features:
//! - GET with browser user agent, per-attempt timeout
//! - Exponential backoff with retry for 429/5xx and connection-level errors
//! - Bounded worker pool; identical URLs are fetched once
//! - eBay-aware verdicts: bot-blocking status codes only warn
//! - Markdown audit report

use crate::classify::{classify_link, find_urls};
use crate::config::AuditConfig;
use crate::matching::tokenize;
use crate::parser::parse_report;
use crate::types::{AuditSummary, Candidate, LinkCategory, LinkRecord, ParsedReport, Verdict};
use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::header::ACCEPT_LANGUAGE;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, warn};
use url::Url;

/// Words ignored when matching candidate keywords against URL text
pub const LINK_STOPWORDS: &[&str] = &[
    "and", "the", "for", "with", "set", "kit", "inch", "in", "tier", "slide", "out", "piece", "pc",
    "pcs", "plus", "new",
];

/// Backoff stops doubling after this many retries
const MAX_BACKOFF_DOUBLINGS: u32 = 6;

/// Result of fetching one URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub status_code: Option<u16>,
    pub final_url: Option<String>,
    pub error: Option<String>,
}

impl FetchOutcome {
    fn failed(error: String) -> Self {
        FetchOutcome {
            status_code: None,
            final_url: None,
            error: Some(error),
        }
    }
}

/// Audit results for one report document
#[derive(Debug, Clone)]
pub struct ReportAudit {
    pub report: PathBuf,
    pub records: Vec<LinkRecord>,
    pub summary: AuditSummary,
}

impl ReportAudit {
    pub fn failures(&self) -> impl Iterator<Item = &LinkRecord> {
        self.records.iter().filter(|r| r.verdict() == Verdict::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LinkRecord> {
        self.records.iter().filter(|r| r.verdict() == Verdict::Warn)
    }
}

/// Keywords describing a candidate: its title plus primary terms
pub fn candidate_keywords(candidate: &Candidate) -> HashSet<String> {
    let mut combined = candidate.title.clone();
    for term in &candidate.primary_terms {
        combined.push(' ');
        combined.push_str(term);
    }
    tokenize(&combined, LINK_STOPWORDS)
}

/// Number of candidate keywords found in the URL's decoded path and query
pub fn url_keyword_overlap(url: &str, keywords: &HashSet<String>) -> usize {
    let raw = match Url::parse(url) {
        Ok(parsed) => format!("{} {}", parsed.path(), parsed.query().unwrap_or("")),
        Err(_) => url.to_string(),
    };
    let decoded = urlencoding::decode(&raw)
        .map(|text| text.into_owned())
        .unwrap_or(raw);
    let text = decoded.replace(['-', '_', '+'], " ");

    tokenize(&text, LINK_STOPWORDS).intersection(keywords).count()
}

/// One record per URL occurrence inside each candidate card
pub fn extract_link_records(report: &Path, text: &str, parsed: &ParsedReport) -> Vec<LinkRecord> {
    let lines: Vec<&str> = text.lines().collect();
    let mut records = Vec::new();

    for candidate in &parsed.candidates {
        let keywords = candidate_keywords(candidate);
        let first = candidate.start_line.max(1);
        let last = candidate.end_line.min(lines.len());

        for line_no in first..=last {
            let line = match lines.get(line_no - 1) {
                Some(line) => line,
                None => continue,
            };
            for url in find_urls(line) {
                let keyword_overlap = if keywords.is_empty() {
                    0
                } else {
                    url_keyword_overlap(url, &keywords)
                };
                records.push(LinkRecord {
                    report: report.to_path_buf(),
                    candidate: candidate.title.clone(),
                    line: line_no,
                    url: url.to_string(),
                    category: classify_link(url),
                    keyword_overlap,
                    status_code: None,
                    final_url: None,
                    fetch_error: None,
                    warnings: Vec::new(),
                    failures: Vec::new(),
                });
            }
        }
    }

    records
}

/// HTTP client shared by every fetch in a run
pub fn build_client(audit: &AuditConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(audit.timeout())
        .user_agent(audit.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(audit.max_redirects))
        .build()
        .context("Failed to build HTTP client")
}

/// Check if status code indicates a transient error worth retrying
fn is_transient_status(status_code: u16) -> bool {
    matches!(status_code, 429 | 500 | 502 | 503 | 504)
}

fn is_transient_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

fn describe_error(e: &reqwest::Error) -> String {
    let kind = if e.is_timeout() {
        "Request timed out"
    } else if e.is_connect() {
        "Connection failed"
    } else if e.is_redirect() {
        "Too many redirects"
    } else {
        "Request failed"
    };
    format!("{}: {}", kind, e)
}

fn backoff_delay(audit: &AuditConfig, attempt: u32) -> Duration {
    let doublings = (attempt.saturating_sub(1)).min(MAX_BACKOFF_DOUBLINGS);
    Duration::from_millis(audit.backoff_ms.saturating_mul(1u64 << doublings))
}

/// Fetch one URL, retrying transient failures with exponential backoff
///
/// Network faults never propagate; they come back in `FetchOutcome::error`.
pub async fn fetch_url(client: &reqwest::Client, url: &str, audit: &AuditConfig) -> FetchOutcome {
    let mut last = FetchOutcome::default();

    for attempt in 0..=audit.retries {
        if attempt > 0 {
            let delay = backoff_delay(audit, attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        debug!(url, attempt, "fetching link");

        let response = client
            .get(url)
            .header(ACCEPT_LANGUAGE, audit.accept_language.as_str())
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let status_code = status.as_u16();
                let final_url = resp.url().to_string();

                if status_code < 400 {
                    return FetchOutcome {
                        status_code: Some(status_code),
                        final_url: Some(final_url),
                        error: None,
                    };
                }

                last = FetchOutcome {
                    status_code: Some(status_code),
                    final_url: Some(final_url),
                    error: Some(format!(
                        "HTTP Error {}: {}",
                        status_code,
                        status.canonical_reason().unwrap_or("Unknown")
                    )),
                };

                if is_transient_status(status_code) && attempt < audit.retries {
                    warn!(url, status_code, attempt, "transient HTTP status, retrying");
                    continue;
                }
                return last;
            }
            Err(e) => {
                last = FetchOutcome::failed(describe_error(&e));
                if is_transient_error(&e) && attempt < audit.retries {
                    warn!(url, attempt, error = %e, "fetch failed, retrying");
                    continue;
                }
                warn!(url, error = %e, "fetch failed");
                return last;
            }
        }
    }

    last
}

/// Fetch every record's URL with at most `workers` requests in flight
///
/// Each distinct URL is fetched once and its outcome is copied to every record
/// that carries it.
pub async fn check_records_network(records: &mut [LinkRecord], audit: &AuditConfig) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let client = build_client(audit)?;
    let shared = Arc::new(audit.clone());

    let mut url_cache: HashMap<String, Vec<usize>> = HashMap::new();
    let mut unique_urls: Vec<String> = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        url_cache
            .entry(record.url.clone())
            .or_insert_with(|| {
                unique_urls.push(record.url.clone());
                Vec::new()
            })
            .push(idx);
    }
    debug!(links = records.len(), unique = unique_urls.len(), "checking links");

    let outcomes: Vec<(String, FetchOutcome)> = stream::iter(unique_urls)
        .map(|url| {
            let client = client.clone();
            let audit = Arc::clone(&shared);
            async move {
                let task_url = url.clone();
                let handle = tokio::spawn(async move { fetch_url(&client, &task_url, &audit).await });
                let outcome = task_outcome(&url, handle.await);
                (url, outcome)
            }
        })
        .buffer_unordered(audit.worker_count())
        .collect()
        .await;

    merge_outcomes(records, &url_cache, outcomes);
    Ok(())
}

/// A fetch task that panicked or was cancelled counts as a fetch error
fn task_outcome(url: &str, joined: Result<FetchOutcome, JoinError>) -> FetchOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(url, error = %e, "link check task failed");
            FetchOutcome::failed(format!("link check task failed: {}", e))
        }
    }
}

/// Copy each URL's outcome onto every record that carries it
fn merge_outcomes(
    records: &mut [LinkRecord],
    url_cache: &HashMap<String, Vec<usize>>,
    outcomes: Vec<(String, FetchOutcome)>,
) {
    for (url, outcome) in outcomes {
        if let Some(indices) = url_cache.get(&url) {
            for &idx in indices {
                let record = &mut records[idx];
                record.status_code = outcome.status_code;
                record.final_url = outcome.final_url.clone();
                record.fetch_error = outcome.error.clone();
            }
        }
    }
}

/// Assign warnings and failures to a record from its category, keyword overlap
/// and fetch outcome
pub fn evaluate_record(record: &mut LinkRecord) {
    if record.category == LinkCategory::AlibabaDisallowed {
        record.failures.push("disallowed source domain".to_string());
        return;
    }

    if record.category == LinkCategory::EbayItem {
        record
            .warnings
            .push("fragile direct item link; prefer durable search link".to_string());
    }

    if record.category != LinkCategory::EbayItem && record.keyword_overlap == 0 {
        let checked = matches!(
            record.category,
            LinkCategory::EbaySearch
                | LinkCategory::EbayCategory
                | LinkCategory::EbayOther
                | LinkCategory::AliexpressSearch
                | LinkCategory::AliexpressOther
        );
        if checked {
            record
                .warnings
                .push("no keyword correspondence between candidate and URL".to_string());
        }
    }

    let is_ebay = record.category.is_ebay();

    let code = match record.status_code {
        Some(code) => code,
        None => {
            if record.fetch_error.is_some() {
                if is_ebay {
                    record
                        .warnings
                        .push("eBay URL could not be verified from this runtime".to_string());
                } else {
                    record.failures.push("network error while fetching URL".to_string());
                }
            }
            return;
        }
    };

    if (200..400).contains(&code) {
        return;
    }

    if is_ebay && matches!(code, 403 | 429 | 500 | 503) {
        record.warnings.push(format!(
            "eBay returned HTTP {} (often bot/rate-limit/proxy sensitive)",
            code
        ));
        return;
    }

    if matches!(code, 404 | 410 | 451) {
        record.failures.push(format!("HTTP {}", code));
        return;
    }

    if code >= 400 {
        if is_ebay {
            record.warnings.push(format!("eBay returned HTTP {}", code));
        } else {
            record.failures.push(format!("HTTP {}", code));
        }
    }
}

/// Full audit of one document: extract, optionally fetch, evaluate, summarize
pub async fn audit_report(path: &Path, text: &str, audit: &AuditConfig, check_network: bool) -> Result<ReportAudit> {
    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parsed = parse_report(text, &path.display().to_string(), &label);

    let mut records = extract_link_records(path, text, &parsed);
    if check_network && !records.is_empty() {
        check_records_network(&mut records, audit)
            .await
            .with_context(|| format!("Failed to check links in {:?}", path))?;
    }

    for record in records.iter_mut() {
        evaluate_record(record);
    }

    let summary = AuditSummary::from_records(&records);
    Ok(ReportAudit {
        report: path.to_path_buf(),
        records,
        summary,
    })
}

/// One console line for a failing or warning record; None when it is clean
pub fn format_record_line(record: &LinkRecord, report_display: &str) -> Option<String> {
    match record.verdict() {
        Verdict::Fail => Some(format!(
            "[FAIL] {}:{} | {} | {} | {}",
            report_display,
            record.line,
            record.candidate,
            record.url,
            record.failures.join("; ")
        )),
        Verdict::Warn => {
            let code = record
                .status_code
                .map(|c| format!("HTTP {}", c))
                .unwrap_or_else(|| "NO_HTTP_STATUS".to_string());
            Some(format!(
                "[WARN] {}:{} | {} | {} | {} | {}",
                report_display,
                record.line,
                record.candidate,
                record.url,
                code,
                record.warnings.join("; ")
            ))
        }
        Verdict::Ok => None,
    }
}

/// Generate a markdown audit report covering every audited document
pub fn generate_audit_report(audits: &[ReportAudit]) -> String {
    let mut report = String::from("# Link Audit Report\n\n");
    report.push_str(&format!("Generated: {}\n\n", Utc::now().format("%Y-%m-%d %H:%M UTC")));

    let mut total = AuditSummary::default();
    for audit in audits {
        total.ok += audit.summary.ok;
        total.warn += audit.summary.warn;
        total.fail += audit.summary.fail;
        total.total += audit.summary.total;
    }

    report.push_str("## Summary\n\n");
    report.push_str(&format!("- Reports audited: {}\n", audits.len()));
    report.push_str(&format!("- Links checked: {}\n", total.total));
    report.push_str(&format!("- OK: {}\n", total.ok));
    report.push_str(&format!("- Warnings: {}\n", total.warn));
    report.push_str(&format!("- **Failures**: {}\n", total.fail));
    report.push('\n');

    report.push_str("| Report | OK | Warn | Fail | Total |\n");
    report.push_str("|--------|----|------|------|-------|\n");
    for audit in audits {
        report.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            audit.report.display(),
            audit.summary.ok,
            audit.summary.warn,
            audit.summary.fail,
            audit.summary.total
        ));
    }
    report.push('\n');

    let failures: Vec<_> = audits.iter().flat_map(|a| a.failures()).collect();
    if !failures.is_empty() {
        report.push_str("## Failures\n\n");
        report.push_str("| Location | Candidate | URL | Category | Reasons |\n");
        report.push_str("|----------|-----------|-----|----------|---------|\n");
        for record in &failures {
            report.push_str(&format!(
                "| {}:{} | {} | {} | {} | {} |\n",
                record.report.display(),
                record.line,
                record.candidate,
                truncate_url(&record.url, 60),
                record.category,
                record.failures.join("; ")
            ));
        }
        report.push('\n');
    }

    let warnings: Vec<_> = audits.iter().flat_map(|a| a.warnings()).collect();
    if !warnings.is_empty() {
        report.push_str("## Warnings\n\n");
        report.push_str("| Location | Candidate | URL | HTTP Code | Reasons |\n");
        report.push_str("|----------|-----------|-----|-----------|---------|\n");
        for record in &warnings {
            let http_code = record.status_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
            report.push_str(&format!(
                "| {}:{} | {} | {} | {} | {} |\n",
                record.report.display(),
                record.line,
                record.candidate,
                truncate_url(&record.url, 50),
                http_code,
                record.warnings.join("; ")
            ));
        }
        report.push('\n');
    }

    let redirects: Vec<_> = audits
        .iter()
        .flat_map(|a| a.records.iter())
        .filter(|r| r.final_url.as_deref().map(|f| f != r.url).unwrap_or(false))
        .collect();
    if !redirects.is_empty() {
        report.push_str("## Redirects\n\n");
        report.push_str("| Original URL | Final URL |\n");
        report.push_str("|--------------|-----------|\n");
        for record in &redirects {
            let final_url = record.final_url.as_deref().unwrap_or("-");
            report.push_str(&format!(
                "| {} | {} |\n",
                truncate_url(&record.url, 40),
                truncate_url(final_url, 40)
            ));
        }
        report.push('\n');
    }

    report
}

/// Truncate URL for display purposes
fn truncate_url(url: &str, max_len: usize) -> String {
    if url.chars().count() > max_len {
        format!("{}...", url.chars().take(max_len.saturating_sub(3)).collect::<String>())
    } else {
        url.to_string()
    }
}
