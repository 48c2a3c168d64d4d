//! Match Scoring Module
//!
//! Estimates how well a candidate's paired marketplace and supplier links
//! correspond to the product it claims. Signals:
//! - token overlap between title/terms and the query text of both URLs
//! - character-sequence similarity of the title and the supplier query
//! - a coarse presence signal for having both listing URLs
//!
//! Also picks the listing URLs used as evidence and tags the traffic lane.

use crate::classify::{is_domain, ALIEXPRESS_HOST_TOKEN, EBAY_HOST_TOKEN};
use crate::config::{LaneConfig, ScoringConfig};
use crate::normalize::{build_sold_search_url, build_supplier_search_url};
use crate::types::{Candidate, EvidenceRow, Lane, MatchLabel, ParsedReport};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Words too generic to count as product evidence
pub const SCORER_STOPWORDS: &[&str] = &[
    "and", "the", "for", "with", "set", "kit", "new", "inch", "in", "to", "of", "on", "by", "from",
    "pack",
];

/// Query parameters that carry the search text, in priority order
const QUERY_KEYS: &[&str] = &["SearchText", "_nkw", "q", "query"];

const ACCEPTED_DIFFERENCES: &str =
    "Allowed: photo angle/background/packaging only; core function and specs must align.";
const SOURCING_ROUTE: &str = "ALIEXPRESS_FIRST_EBAY_SOLD_CONFIRMED";

/// Lower-cased alphanumeric runs of three or more characters, minus stopwords
pub fn tokenize(text: &str, stopwords: &[&str]) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|token| token.len() > 2 && !stopwords.contains(token))
        .map(str::to_string)
        .collect()
}

/// Human-readable query text carried by a URL
///
/// The first non-empty search parameter wins; otherwise the de-slugged path.
pub fn query_from_url(url: &str) -> String {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return deslug(url),
    };

    for key in QUERY_KEYS {
        let value = parsed
            .query_pairs()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.into_owned());
        if let Some(value) = value {
            return value;
        }
    }

    deslug(parsed.path())
}

fn deslug(path: &str) -> String {
    let spaced = path.replace(['-', '_', '+'], " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

/// Ratcliff/Obershelp character similarity, 2·matches / total length
///
/// Matches are found by taking the longest contiguous common block and
/// recursing on the pieces to its left and right.
fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let b2j = char_positions(b);
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, &b2j, (alo, ahi), (blo, bhi));
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

/// Positions of each char in `b`; in texts of 200+ chars, chars making up
/// more than 1% of the text are left out
fn char_positions(b: &[char]) -> HashMap<char, Vec<usize>> {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, &c) in b.iter().enumerate() {
        b2j.entry(c).or_default().push(j);
    }
    if b.len() >= 200 {
        let limit = b.len() / 100 + 1;
        b2j.retain(|_, positions| positions.len() <= limit);
    }
    b2j
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as (i, j, size)
///
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best) = (alo, blo, 0);
    let mut run_lengths: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        for &j in b2j.get(c).map(Vec::as_slice).unwrap_or_default() {
            if j < blo {
                continue;
            }
            if j >= bhi {
                break;
            }
            let prev = if j > 0 { run_lengths.get(&(j - 1)).copied().unwrap_or(0) } else { 0 };
            let k = prev + 1;
            next.insert(j, k);
            if k > best {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best = k;
            }
        }
        run_lengths = next;
    }

    // chars dropped from the index can still extend a block
    while best_i > alo && best_j > blo && a[best_i - 1] == b[best_j - 1] {
        best_i -= 1;
        best_j -= 1;
        best += 1;
    }
    while best_i + best < ahi && best_j + best < bhi && a[best_i + best] == b[best_j + best] {
        best += 1;
    }

    (best_i, best_j, best)
}

/// Score the correspondence between a candidate and its listing URLs
///
/// Result is clamped to [0, 1] and rounded to four decimals.
pub fn score_match(
    title: &str,
    terms: &[String],
    ebay_url: &str,
    source_url: &str,
    scoring: &ScoringConfig,
) -> f64 {
    let mut base = String::from(title);
    for term in terms {
        base.push(' ');
        base.push_str(term);
    }
    let base_tokens = tokenize(base.trim(), SCORER_STOPWORDS);

    let ebay_text = query_from_url(ebay_url);
    let source_text = query_from_url(source_url);
    let url_tokens = tokenize(&format!("{} {}", ebay_text, source_text), SCORER_STOPWORDS);

    let overlap = base_tokens.intersection(&url_tokens).count() as f64 / base_tokens.len().max(1) as f64;
    let sequence = sequence_ratio(&title.to_lowercase(), &source_text.to_lowercase());
    let presence = if !ebay_url.is_empty() && !source_url.is_empty() {
        scoring.presence_both
    } else {
        scoring.presence_partial
    };

    let score = scoring.overlap_weight * overlap
        + scoring.sequence_weight * sequence
        + scoring.presence_weight * presence;
    (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

impl MatchLabel {
    pub fn from_score(score: f64, scoring: &ScoringConfig) -> Self {
        if score >= scoring.exact_threshold {
            MatchLabel::Exact
        } else if score >= scoring.similar_threshold {
            MatchLabel::Similar
        } else {
            MatchLabel::Weak
        }
    }
}

/// First term if any, else the title
fn fallback_query<'a>(title: &'a str, terms: &'a [String]) -> &'a str {
    let query = terms.first().map(|t| t.trim()).unwrap_or_else(|| title.trim());
    if query.is_empty() {
        title
    } else {
        query
    }
}

/// First AliExpress link, else a supplier search for the first term
pub fn choose_supplier_url(title: &str, terms: &[String], source_links: &[String]) -> String {
    source_links
        .iter()
        .find(|link| is_domain(link, ALIEXPRESS_HOST_TOKEN))
        .cloned()
        .unwrap_or_else(|| build_supplier_search_url(fallback_query(title, terms)))
}

/// First eBay link, else a sold search for the first term
pub fn choose_marketplace_url(title: &str, terms: &[String], ebay_links: &[String]) -> String {
    ebay_links
        .iter()
        .find(|link| is_domain(link, EBAY_HOST_TOKEN))
        .cloned()
        .unwrap_or_else(|| build_sold_search_url(fallback_query(title, terms)))
}

fn nkw_param(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let value = parsed
        .query_pairs()
        .find(|(k, v)| k == "_nkw" && !v.is_empty())
        .map(|(_, v)| v.into_owned());
    value
}

/// Sold + completed search used to validate demand
///
/// Validation always goes through a search, even when the chosen listing is a
/// direct item page.
pub fn marketplace_validation_url(
    title: &str,
    terms: &[String],
    chosen: &str,
    ebay_links: &[String],
) -> String {
    let from_links = ebay_links
        .iter()
        .filter(|link| is_domain(link, EBAY_HOST_TOKEN))
        .find_map(|link| nkw_param(link));
    if let Some(query) = from_links {
        return build_sold_search_url(&query);
    }

    if is_domain(chosen, EBAY_HOST_TOKEN) {
        if let Some(query) = nkw_param(chosen) {
            return build_sold_search_url(&query);
        }
    }

    build_sold_search_url(fallback_query(title, terms))
}

/// Evidence row for one candidate, lane not yet assigned
pub fn evidence_row(candidate: &Candidate, scoring: &ScoringConfig) -> EvidenceRow {
    let terms = &candidate.primary_terms;
    let source = choose_supplier_url(&candidate.title, terms, &candidate.source_links);
    let ebay = choose_marketplace_url(&candidate.title, terms, &candidate.ebay_links);
    let validation = marketplace_validation_url(&candidate.title, terms, &ebay, &candidate.ebay_links);
    let score = score_match(&candidate.title, terms, &ebay, &source, scoring);

    EvidenceRow {
        candidate_id: candidate.candidate_id.clone(),
        title: candidate.title.clone(),
        source_report: candidate.source_report_path.clone(),
        ebay_listing_url: ebay,
        ebay_validation_url: validation,
        aliexpress_listing_url: source,
        match_score: score,
        match_label: MatchLabel::from_score(score, scoring),
        accepted_differences: ACCEPTED_DIFFERENCES.to_string(),
        estimated_margin_pct: candidate.margin_pct,
        sourcing_route: SOURCING_ROUTE.to_string(),
        lane: Lane::CoreMargin,
    }
}

/// One evidence row per candidate across all reports, lanes assigned
pub fn build_evidence(reports: &[ParsedReport], scoring: &ScoringConfig, lanes: &LaneConfig) -> Vec<EvidenceRow> {
    let mut rows: Vec<EvidenceRow> = reports
        .iter()
        .flat_map(|report| report.candidates.iter())
        .map(|candidate| evidence_row(candidate, scoring))
        .collect();
    assign_lanes(&mut rows, lanes);
    rows
}

/// Tag the rows nearest the break-even margin as traffic seeds
pub fn assign_lanes(rows: &mut [EvidenceRow], lanes: &LaneConfig) {
    if rows.is_empty() {
        return;
    }

    let share = lanes.traffic_share.clamp(0.0, 1.0);
    let target_count = ((rows.len() as f64 * share).round_ties_even() as usize).max(1);

    let margins: Vec<Option<f64>> = rows.iter().map(|row| row.estimated_margin_pct).collect();
    let mut eligible: Vec<(usize, f64)> = margins
        .iter()
        .enumerate()
        .filter_map(|(idx, margin)| margin.map(|m| (idx, m)))
        .filter(|(_, m)| *m >= lanes.margin_min && *m <= lanes.margin_max)
        .collect();

    if eligible.is_empty() {
        eligible = margins
            .iter()
            .enumerate()
            .filter_map(|(idx, margin)| margin.map(|m| (idx, m)))
            .collect();
        eligible.sort_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));
    }

    eligible.sort_by(|a, b| {
        (a.1 - lanes.target_margin)
            .abs()
            .total_cmp(&(b.1 - lanes.target_margin).abs())
    });
    let chosen: HashSet<usize> = eligible.iter().take(target_count).map(|(idx, _)| *idx).collect();

    for (idx, row) in rows.iter_mut().enumerate() {
        row.lane = if chosen.contains(&idx) {
            Lane::TrafficSeed
        } else {
            Lane::CoreMargin
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_tokenize_drops_short_and_stopwords() {
        let tokens = tokenize("The 3-Pack Bamboo Set, for kitchen!", SCORER_STOPWORDS);
        let mut sorted: Vec<_> = tokens.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["bamboo", "kitchen"]);
    }

    #[test]
    fn test_query_from_url_priority() {
        assert_eq!(
            query_from_url("https://www.aliexpress.us/wholesale?SearchText=wireless+mouse&q=other"),
            "wireless mouse"
        );
        assert_eq!(
            query_from_url("https://www.ebay.com/sch/i.html?_nkw=bamboo%20board&LH_Sold=1"),
            "bamboo board"
        );
        assert_eq!(query_from_url("https://example.com/search?q=&query=desk+lamp"), "desk lamp");
        assert_eq!(
            query_from_url("https://www.aliexpress.com/w/wholesale-bamboo_cutting-board.html"),
            "/w/wholesale bamboo cutting board.html"
        );
        assert_eq!(query_from_url(""), "");
    }

    #[test]
    fn test_wireless_mouse_is_exact() {
        let scoring = ScoringConfig::default();
        let score = score_match(
            "Wireless Mouse",
            &terms(&["wireless mouse"]),
            "https://www.ebay.com/sch/i.html?_nkw=wireless+mouse",
            "https://www.aliexpress.us/wholesale?SearchText=wireless%20mouse",
            &scoring,
        );
        assert!((score - 0.9625).abs() < 1e-9, "score {}", score);
        assert_eq!(MatchLabel::from_score(score, &scoring), MatchLabel::Exact);
    }

    #[test]
    fn test_sequence_ratio_prefers_longest_block() {
        // " desk" is taken first, which leaves only "led" on its left
        assert!((sequence_ratio("led desk lamp", "led kitchen lamp desk") - 16.0 / 34.0).abs() < 1e-12);
        assert!(
            (sequence_ratio("bamboo cutting board", "bamboo kitchen board cutting") - 28.0 / 48.0).abs()
                < 1e-12
        );
        assert!((sequence_ratio("food cover set", "food kitchen set cover") - 20.0 / 36.0).abs() < 1e-12);
        assert_eq!(sequence_ratio("wireless mouse", "wireless mouse"), 1.0);
        assert_eq!(sequence_ratio("", ""), 1.0);
        assert_eq!(sequence_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_reordered_supplier_query_is_similar() {
        let scoring = ScoringConfig::default();
        let score = score_match(
            "LED Desk Lamp",
            &terms(&["led desk lamp"]),
            "https://www.ebay.com/sch/i.html?_nkw=led+desk+lamp",
            "https://www.aliexpress.us/wholesale?SearchText=led+kitchen+lamp+desk",
            &scoring,
        );
        assert!((score - 0.7772).abs() < 1e-9, "score {}", score);
        assert_eq!(MatchLabel::from_score(score, &scoring), MatchLabel::Similar);
    }

    #[test]
    fn test_long_text_skips_popular_chars() {
        let a = "x".repeat(250);
        let b = format!("{}{}", "x".repeat(240), "yyyyyyyyyy");
        assert!((sequence_ratio(&a, &b) - 480.0 / 500.0).abs() < 1e-12);
    }

    #[test]
    fn test_unrelated_links_are_weak() {
        let scoring = ScoringConfig::default();
        let score = score_match(
            "Wireless Mouse",
            &[],
            "https://www.ebay.com/itm/123456",
            "",
            &scoring,
        );
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(MatchLabel::from_score(score, &scoring), MatchLabel::Weak);
    }

    #[test]
    fn test_score_stays_in_unit_range() {
        let scoring = ScoringConfig {
            overlap_weight: 3.0,
            ..Default::default()
        };
        let score = score_match(
            "Desk Lamp",
            &terms(&["desk lamp"]),
            "https://www.ebay.com/sch/i.html?_nkw=desk+lamp",
            "https://www.aliexpress.us/wholesale?SearchText=desk+lamp",
            &scoring,
        );
        assert_eq!(score, 1.0);

        let empty = score_match("", &[], "", "", &ScoringConfig::default());
        assert!((0.0..=1.0).contains(&empty));
    }

    #[test]
    fn test_label_thresholds() {
        let scoring = ScoringConfig::default();
        assert_eq!(MatchLabel::from_score(0.80, &scoring), MatchLabel::Exact);
        assert_eq!(MatchLabel::from_score(0.7999, &scoring), MatchLabel::Similar);
        assert_eq!(MatchLabel::from_score(0.65, &scoring), MatchLabel::Similar);
        assert_eq!(MatchLabel::from_score(0.6499, &scoring), MatchLabel::Weak);
    }

    #[test]
    fn test_choose_urls_prefer_report_links() {
        let links = terms(&[
            "https://www.alibaba.com/product/1.html",
            "https://www.aliexpress.com/item/22.html",
        ]);
        assert_eq!(
            choose_supplier_url("Desk Lamp", &[], &links),
            "https://www.aliexpress.com/item/22.html"
        );
        assert_eq!(
            choose_supplier_url("Desk Lamp", &terms(&["led desk lamp"]), &[]),
            "https://www.aliexpress.us/wholesale?SearchText=led+desk+lamp"
        );
        assert_eq!(
            choose_marketplace_url("Desk Lamp", &[], &[]),
            "https://www.ebay.com/sch/i.html?_nkw=Desk+Lamp&LH_Sold=1&LH_Complete=1&_sop=13"
        );
    }

    #[test]
    fn test_validation_url_reuses_nkw() {
        let links = terms(&[
            "https://www.ebay.com/itm/1",
            "https://www.ebay.com/sch/i.html?_nkw=led+lamp&_sacat=0",
        ]);
        let url = marketplace_validation_url("Desk Lamp", &[], "https://www.ebay.com/itm/1", &links);
        assert_eq!(url, "https://www.ebay.com/sch/i.html?_nkw=led+lamp&LH_Sold=1&LH_Complete=1&_sop=13");

        let direct = marketplace_validation_url(
            "Desk Lamp",
            &terms(&["desk lamp"]),
            "https://www.ebay.com/itm/1",
            &terms(&["https://www.ebay.com/itm/1"]),
        );
        assert!(direct.contains("_nkw=desk+lamp"));
    }

    fn row(margin: Option<f64>) -> EvidenceRow {
        EvidenceRow {
            candidate_id: String::new(),
            title: String::new(),
            source_report: String::new(),
            ebay_listing_url: String::new(),
            ebay_validation_url: String::new(),
            aliexpress_listing_url: String::new(),
            match_score: 0.0,
            match_label: MatchLabel::Weak,
            accepted_differences: String::new(),
            estimated_margin_pct: margin,
            sourcing_route: String::new(),
            lane: Lane::CoreMargin,
        }
    }

    #[test]
    fn test_assign_lanes_nearest_target() {
        let margins = [
            Some(-5.0),
            Some(0.0),
            Some(2.5),
            Some(3.5),
            Some(8.0),
            Some(15.0),
            Some(20.0),
            Some(30.0),
            None,
            Some(4.0),
        ];
        let mut rows: Vec<_> = margins.iter().map(|m| row(*m)).collect();
        assign_lanes(&mut rows, &LaneConfig::default());

        let seeds: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.lane == Lane::TrafficSeed)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(seeds, vec![2, 3]);
    }

    #[test]
    fn test_assign_lanes_fallback_outside_range() {
        let mut rows = vec![row(Some(20.0)), row(Some(-30.0)), row(None)];
        assign_lanes(&mut rows, &LaneConfig::default());
        assert_eq!(rows[0].lane, Lane::TrafficSeed);
        assert_eq!(rows[1].lane, Lane::CoreMargin);
        assert_eq!(rows[2].lane, Lane::CoreMargin);
    }

    #[test]
    fn test_build_evidence() {
        let report = ParsedReport {
            candidates: vec![Candidate {
                title: "Wireless Mouse".to_string(),
                candidate_id: "C-01".to_string(),
                primary_terms: terms(&["wireless mouse"]),
                ebay_links: terms(&["https://www.ebay.com/sch/i.html?_nkw=wireless+mouse"]),
                source_links: terms(&["https://www.aliexpress.us/wholesale?SearchText=wireless+mouse"]),
                margin_pct: Some(3.0),
                source_report_path: "reports/a.md".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let rows = build_evidence(&[report], &ScoringConfig::default(), &LaneConfig::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].candidate_id, "C-01");
        assert_eq!(rows[0].match_label, MatchLabel::Exact);
        assert_eq!(rows[0].lane, Lane::TrafficSeed);
        assert_eq!(rows[0].source_report, "reports/a.md");
        assert!(rows[0].ebay_validation_url.contains("LH_Sold=1"));
    }
}
