//! Candidate Report Parser
//!
//! Turns one candidate-card markdown report into a `ParsedReport`.
//!
//! The format is human-authored and inconsistent, so parsing never fails:
//! lines that match no known prefix are skipped. State lives in an explicit
//! `ParseState` value threaded through `step`, one call per line.

use crate::types::{Candidate, ParsedReport, SourceReport};
use regex::Regex;
use std::sync::OnceLock;

const CANDIDATE_HEADING: &str = "## Candidate Card - ";
const AGENT_TEAM_HEADING: &str = "## Agent Team Used";
const SUMMARY_HEADING: &str = "## Portfolio Summary";

const PRIMARY_TERMS_PREFIXES: &[&str] = &["- Primary search terms used:", "- Primary search terms:"];

/// Which link list a link block feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkBlock {
    Ebay,
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Root,
    AgentTeam,
    Summary,
    Candidate,
    LinkBlock(LinkBlock),
}

/// Accumulators for a single pass
struct ParseContext<'a> {
    report: ParsedReport,
    current: Option<Candidate>,
    source_path: &'a str,
    source_label: &'a str,
    theme_from_scope: bool,
}

impl ParseContext<'_> {
    /// Move the in-progress candidate into the report, closing its span at `end_line`
    fn flush(&mut self, end_line: usize) {
        if let Some(mut candidate) = self.current.take() {
            candidate.end_line = end_line.max(candidate.start_line);
            self.report.candidates.push(candidate);
        }
    }
}

/// Parse a full report document
pub fn parse_report(text: &str, source_path: &str, source_label: &str) -> ParsedReport {
    let mut ctx = ParseContext {
        report: ParsedReport::default(),
        current: None,
        source_path,
        source_label,
        theme_from_scope: false,
    };

    let mut state = ParseState::Root;
    let mut line_count = 0;
    for (idx, raw) in text.lines().enumerate() {
        line_count = idx + 1;
        state = step(state, &mut ctx, line_count, raw.trim());
    }
    ctx.flush(line_count);

    ctx.report
}

/// Process one trimmed line and return the next state
fn step(state: ParseState, ctx: &mut ParseContext<'_>, line_no: usize, line: &str) -> ParseState {
    if apply_header_field(&mut ctx.report, &mut ctx.theme_from_scope, line) {
        return state;
    }

    if let Some(title) = line.strip_prefix(CANDIDATE_HEADING) {
        ctx.flush(line_no - 1);
        ctx.current = Some(Candidate {
            title: title.trim().to_string(),
            source_report_path: ctx.source_path.to_string(),
            source_report_label: ctx.source_label.to_string(),
            start_line: line_no,
            end_line: line_no,
            ..Default::default()
        });
        return ParseState::Candidate;
    }

    if line.starts_with(AGENT_TEAM_HEADING) {
        ctx.flush(line_no - 1);
        return ParseState::AgentTeam;
    }
    if line.starts_with(SUMMARY_HEADING) {
        ctx.flush(line_no - 1);
        return ParseState::Summary;
    }

    if let Some(title) = line.strip_prefix("# ") {
        ctx.flush(line_no - 1);
        if ctx.report.title.is_empty() {
            ctx.report.title = title.trim().to_string();
        }
        return ParseState::Root;
    }
    if line == "##" || line.starts_with("## ") {
        ctx.flush(line_no - 1);
        return ParseState::Root;
    }

    match state {
        ParseState::Root => ParseState::Root,
        ParseState::AgentTeam => {
            if let Some(member) = line.strip_prefix("- ") {
                ctx.report.agent_team.push(member.trim().to_string());
            }
            ParseState::AgentTeam
        }
        ParseState::Summary => {
            if let Some(summary) = line.strip_prefix("- ") {
                ctx.report.summary_lines.push(summary.trim().to_string());
            }
            ParseState::Summary
        }
        ParseState::Candidate => match ctx.current.as_mut() {
            Some(candidate) => apply_candidate_line(candidate, line),
            None => ParseState::Root,
        },
        ParseState::LinkBlock(block) => {
            let candidate = match ctx.current.as_mut() {
                Some(candidate) => candidate,
                None => return ParseState::Root,
            };
            if let Some(url) = link_bullet_url(line) {
                match block {
                    LinkBlock::Ebay => candidate.ebay_links.push(url.to_string()),
                    LinkBlock::Source => candidate.source_links.push(url.to_string()),
                }
                return state;
            }
            // Anything other than a URL bullet ends the block
            apply_candidate_line(candidate, line)
        }
    }
}

/// Header metadata recognized anywhere in the document, written once each
fn apply_header_field(report: &mut ParsedReport, theme_from_scope: &mut bool, line: &str) -> bool {
    if let Some(value) = field_value(line, "Date:") {
        set_once(&mut report.date, value);
        return true;
    }
    if let Some(value) = field_value(line, "Market:") {
        set_once(&mut report.market, value);
        return true;
    }
    if let Some(value) = field_value(line, "Theme:") {
        if report.theme.is_empty() || *theme_from_scope {
            report.theme = value.to_string();
            *theme_from_scope = false;
        }
        return true;
    }
    if let Some(value) = field_value(line, "Scope:") {
        if report.theme.is_empty() {
            report.theme = value.to_string();
            *theme_from_scope = true;
        }
        return true;
    }
    if let Some(value) = field_value(line, "Compliance:") {
        set_once(&mut report.compliance, value);
        return true;
    }
    false
}

fn set_once(slot: &mut String, value: &str) {
    if slot.is_empty() {
        *slot = value.to_string();
    }
}

fn field_value<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix).map(str::trim)
}

/// Text after the first colon of a `- Label: value` line
fn after_colon(line: &str) -> String {
    line.split_once(':')
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}

/// Populate one candidate field from a line inside its card
fn apply_candidate_line(candidate: &mut Candidate, line: &str) -> ParseState {
    if line.starts_with("- Candidate ID:") {
        candidate.candidate_id = after_colon(line);
        return ParseState::Candidate;
    }
    if line.starts_with("- Category:") {
        candidate.category = after_colon(line);
        return ParseState::Candidate;
    }
    if PRIMARY_TERMS_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        candidate.primary_terms = extract_primary_terms(line);
        return ParseState::Candidate;
    }
    if line.starts_with("- eBay comp links") {
        return ParseState::LinkBlock(LinkBlock::Ebay);
    }
    if line.starts_with("- Source links") {
        return ParseState::LinkBlock(LinkBlock::Source);
    }
    if line.starts_with("- Gate D quick economics:") {
        candidate.sell_price = parse_money(line, "sell");
        candidate.landed_cost = parse_money(line, "landed");
        candidate.margin_pct = parse_percent(line, "margin");
        candidate.roi_pct = parse_percent(line, "ROI");
        return ParseState::Candidate;
    }
    if let Some(rest) = line.strip_prefix("- Expected sell price:") {
        candidate.sell_price = first_number(rest);
        return ParseState::Candidate;
    }
    if let Some(rest) = line.strip_prefix("- Landed cost") {
        candidate.landed_cost = first_number(rest);
        return ParseState::Candidate;
    }
    if let Some(rest) = line.strip_prefix("- Estimated margin:") {
        candidate.margin_pct = first_percent(rest);
        return ParseState::Candidate;
    }
    if line.starts_with("- Notes") {
        if candidate.roi_pct.is_none() {
            candidate.roi_pct = notes_roi(line);
        }
        return ParseState::Candidate;
    }
    if line.starts_with("- Decision:") {
        candidate.decision = after_colon(line);
        return ParseState::Candidate;
    }
    ParseState::Candidate
}

/// URL of a `- http...` bullet, if the line is one
pub fn link_bullet_url(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("- ")?.trim_start();
    if !(rest.starts_with("http://") || rest.starts_with("https://")) {
        return None;
    }
    rest.split_whitespace().next()
}

/// Backtick-delimited terms, left to right, backticks stripped
pub fn extract_primary_terms(line: &str) -> Vec<String> {
    static TERMS: OnceLock<Option<Regex>> = OnceLock::new();
    let re = match TERMS.get_or_init(|| Regex::new(r"`([^`]+)`").ok()) {
        Some(re) => re,
        None => return Vec::new(),
    };
    re.captures_iter(line)
        .map(|caps| caps[1].trim().to_string())
        .filter(|term| !term.is_empty())
        .collect()
}

/// `sell ~$24.99` / `landed ~$9.80` style amounts
fn parse_money(line: &str, key: &str) -> Option<f64> {
    static MONEY: OnceLock<Option<Regex>> = OnceLock::new();
    let re = MONEY
        .get_or_init(|| Regex::new(r"(?i)(sell|landed) ~\$(\d[\d,]*(?:\.\d+)?)").ok())
        .as_ref()?;
    keyed_value(re, line, key)
}

/// `margin ~38%` / `ROI ~120%` style percentages; the `%` is required
fn parse_percent(line: &str, key: &str) -> Option<f64> {
    static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PERCENT
        .get_or_init(|| Regex::new(r"(?i)(margin|ROI) ~(-?\d+(?:\.\d+)?)%").ok())
        .as_ref()?;
    keyed_value(re, line, key)
}

/// Value of the first match whose key group equals `key`, ignoring case
fn keyed_value(re: &Regex, line: &str, key: &str) -> Option<f64> {
    re.captures_iter(line)
        .find(|caps| caps[1].eq_ignore_ascii_case(key))
        .and_then(|caps| parse_decimal(&caps[2]))
}

fn first_number(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NUMBER.get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").ok()).as_ref()?;
    re.find(text).and_then(|m| parse_decimal(m.as_str()))
}

fn first_percent(text: &str) -> Option<f64> {
    static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PERCENT.get_or_init(|| Regex::new(r"(-?\d+(?:\.\d+)?)\s*%").ok()).as_ref()?;
    re.captures(text).and_then(|caps| parse_decimal(&caps[1]))
}

fn notes_roi(line: &str) -> Option<f64> {
    static ROI: OnceLock<Option<Regex>> = OnceLock::new();
    let re = ROI.get_or_init(|| Regex::new(r"(?i)ROI\s+(-?\d+(?:\.\d+)?)%").ok()).as_ref()?;
    re.captures(line).and_then(|caps| parse_decimal(&caps[1]))
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.replace(',', "").parse::<f64>().ok()
}

/// Merge several parsed reports into one aggregate view without touching the inputs
pub fn combine_reports(parsed: &[ParsedReport], source_reports: Vec<SourceReport>) -> ParsedReport {
    if parsed.len() == 1 {
        let mut single = parsed[0].clone();
        single.source_reports = source_reports;
        return single;
    }

    let mut combined = ParsedReport {
        title: format!("eBay Candidate Dashboard ({} reports)", parsed.len()),
        theme: format!("Aggregated across {} report files", parsed.len()),
        compliance: "Mixed by source report. Review each report before launch.".to_string(),
        ..Default::default()
    };

    combined.date = parsed
        .iter()
        .map(|report| report.date.as_str())
        .filter(|date| !date.is_empty())
        .max()
        .unwrap_or("-")
        .to_string();

    let mut markets: Vec<&str> = parsed
        .iter()
        .map(|report| report.market.as_str())
        .filter(|market| !market.is_empty())
        .collect();
    markets.sort_unstable();
    markets.dedup();
    combined.market = if markets.is_empty() {
        "-".to_string()
    } else {
        markets.join(", ")
    };

    for report in parsed {
        combined.candidates.extend(report.candidates.iter().cloned());
        for member in &report.agent_team {
            if !combined.agent_team.contains(member) {
                combined.agent_team.push(member.clone());
            }
        }
    }

    combined.summary_lines = vec![
        format!("Report files loaded: {}", source_reports.len()),
        format!("Total candidates loaded: {}", combined.candidates.len()),
        "Candidates ranked by margin and ROI across all loaded reports".to_string(),
    ];
    combined.source_reports = source_reports;
    combined
}
