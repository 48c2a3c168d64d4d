//! Link Normalization Module
//!
//! Rewrites fragile report links into evergreen search URLs:
//! - eBay item/other comp links become sold + completed searches
//! - alibaba.com links become AliExpress wholesale searches
//!
//! Rewriting happens on the raw text, one URL substring at a time, so every
//! other byte of the document (indentation, bullet style, line endings) is
//! preserved. Queries are seeded from the candidate's primary terms, then its
//! cleaned title.

use crate::classify::{classify_link, find_urls, is_domain, EBAY_HOST_TOKEN};
use crate::parser::{link_bullet_url, parse_report};
use crate::types::{Candidate, LinkCategory};
use std::collections::HashSet;
use url::form_urlencoded;

const EBAY_SOLD_SEARCH_BASE: &str = "https://www.ebay.com/sch/i.html";
const ALIEXPRESS_SEARCH_BASE: &str = "https://www.aliexpress.us/wholesale";

const EBAY_BLOCK_PREFIX: &str = "- eBay comp links";

const EBAY_FALLBACK_QUERY: &str = "ebay comp";
const ALIEXPRESS_FALLBACK_QUERY: &str = "aliexpress product";

/// Which link families to rewrite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub ebay: bool,
    pub source: bool,
}

impl NormalizeOptions {
    pub fn any(&self) -> bool {
        self.ebay || self.source
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub text: String,
    pub ebay_replacements: usize,
    pub source_replacements: usize,
}

impl NormalizeOutcome {
    pub fn total(&self) -> usize {
        self.ebay_replacements + self.source_replacements
    }
}

/// Sold + completed eBay search, newest first
pub fn build_sold_search_url(query: &str) -> String {
    let qs = form_urlencoded::Serializer::new(String::new())
        .append_pair("_nkw", query)
        .append_pair("LH_Sold", "1")
        .append_pair("LH_Complete", "1")
        .append_pair("_sop", "13")
        .finish();
    format!("{}?{}", EBAY_SOLD_SEARCH_BASE, qs)
}

/// AliExpress wholesale search
pub fn build_supplier_search_url(query: &str) -> String {
    let qs = form_urlencoded::Serializer::new(String::new())
        .append_pair("SearchText", query)
        .finish();
    format!("{}?{}", ALIEXPRESS_SEARCH_BASE, qs)
}

/// Strip parenthesized notes and punctuation from a card title
///
/// "Bamboo Cutting Board (3 pc) - Natural" -> "Bamboo Cutting Board Natural"
pub fn normalize_title_for_query(title: &str) -> String {
    let mut without_parens = String::with_capacity(title.len());
    let mut depth = 0usize;
    for c in title.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => without_parens.push(c),
            _ => {}
        }
    }

    let cleaned: String = without_parens
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    normalize_text(&cleaned)
}

/// Seed queries for one candidate: primary terms in order, then the cleaned title
///
/// Case-insensitive duplicates and blanks are dropped.
pub fn seed_queries(primary_terms: &[String], title: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut seeds = Vec::new();
    let title_query = normalize_title_for_query(title);

    for value in primary_terms.iter().map(String::as_str).chain(std::iter::once(title_query.as_str())) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            seeds.push(trimmed.to_string());
        }
    }
    seeds
}

/// Rewrite eBay comp links and disallowed supplier links in a report
pub fn normalize_report_text(text: &str, options: &NormalizeOptions) -> NormalizeOutcome {
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    let mut ebay_replacements = 0;
    let mut source_replacements = 0;

    if options.any() {
        let report = parse_report(text, "", "");
        for candidate in &report.candidates {
            let seeds = seed_queries(&candidate.primary_terms, &candidate.title);
            if options.ebay {
                ebay_replacements += rewrite_ebay_links(&mut lines, candidate, &seeds);
            }
            if options.source {
                source_replacements += rewrite_disallowed_links(&mut lines, candidate, &seeds);
            }
        }
    }

    NormalizeOutcome {
        text: lines.concat(),
        ebay_replacements,
        source_replacements,
    }
}

/// 0-based line indices covered by a candidate card
fn card_range(candidate: &Candidate, line_count: usize) -> std::ops::Range<usize> {
    let start = candidate.start_line.saturating_sub(1).min(line_count);
    let end = candidate.end_line.min(line_count);
    start..end.max(start)
}

fn seed_at<'a>(seeds: &'a [String], idx: usize, fallback: &'a str) -> &'a str {
    if seeds.is_empty() {
        fallback
    } else {
        &seeds[idx % seeds.len()]
    }
}

/// Replace eBay item/other links found in the card's comp-link blocks
fn rewrite_ebay_links(lines: &mut [String], candidate: &Candidate, seeds: &[String]) -> usize {
    let range = card_range(candidate, lines.len());
    let mut rewritten = 0;
    let mut designated = 0;
    let mut idx = range.start;

    while idx < range.end {
        if !lines[idx].trim().starts_with(EBAY_BLOCK_PREFIX) {
            idx += 1;
            continue;
        }

        idx += 1;
        while idx < range.end {
            let url = match link_bullet_url(lines[idx].trim()) {
                Some(url) => url.to_string(),
                None => break,
            };
            let category = classify_link(&url);
            if is_domain(&url, EBAY_HOST_TOKEN)
                && matches!(category, LinkCategory::EbayItem | LinkCategory::EbayOther)
            {
                let new_url = build_sold_search_url(seed_at(seeds, designated, EBAY_FALLBACK_QUERY));
                designated += 1;
                if replace_once(&mut lines[idx], &url, &new_url) {
                    rewritten += 1;
                }
            }
            idx += 1;
        }
    }

    rewritten
}

/// Replace every alibaba.com URL on the card's bullet lines
fn rewrite_disallowed_links(lines: &mut [String], candidate: &Candidate, seeds: &[String]) -> usize {
    let range = card_range(candidate, lines.len());
    let mut rewritten = 0;
    let mut designated = 0;

    for line in &mut lines[range] {
        if !is_bullet(line) {
            continue;
        }
        let disallowed: Vec<String> = find_urls(line)
            .into_iter()
            .filter(|url| classify_link(url) == LinkCategory::AlibabaDisallowed)
            .map(str::to_string)
            .collect();

        for url in disallowed {
            let new_url = build_supplier_search_url(seed_at(seeds, designated, ALIEXPRESS_FALLBACK_QUERY));
            designated += 1;
            if replace_once(line, &url, &new_url) {
                rewritten += 1;
            }
        }
    }

    rewritten
}

/// `- x`, `* x` or `1. x` list items
fn is_bullet(line: &str) -> bool {
    matches!(line.trim_start().chars().next(), Some(c) if c == '-' || c == '*' || c.is_ascii_digit())
}

/// Swap the first occurrence of `old` for `new`; true when the line changed
fn replace_once(line: &mut String, old: &str, new: &str) -> bool {
    if old == new {
        return false;
    }
    match line.find(old) {
        Some(pos) => {
            line.replace_range(pos..pos + old.len(), new);
            true
        }
        None => false,
    }
}

/// Normalize text for comparison (collapse whitespace, trim)
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAMBOO: &str = "\
# Sprint

## Candidate Card - Bamboo Cutting Board
- Primary search terms used: `bamboo cutting board`
- eBay comp links (3-5):
  - https://www.ebay.com/itm/123456789
- Source links:
  - https://www.alibaba.com/product-detail/Bamboo-Board_1600.html
- Decision: GREENLIGHT
";

    fn both() -> NormalizeOptions {
        NormalizeOptions { ebay: true, source: true }
    }

    #[test]
    fn test_build_urls() {
        assert_eq!(
            build_sold_search_url("bamboo cutting board"),
            "https://www.ebay.com/sch/i.html?_nkw=bamboo+cutting+board&LH_Sold=1&LH_Complete=1&_sop=13"
        );
        assert_eq!(
            build_supplier_search_url("bamboo cutting board"),
            "https://www.aliexpress.us/wholesale?SearchText=bamboo+cutting+board"
        );
        assert_eq!(
            build_supplier_search_url("a&b"),
            "https://www.aliexpress.us/wholesale?SearchText=a%26b"
        );
    }

    #[test]
    fn test_normalize_title_for_query() {
        assert_eq!(
            normalize_title_for_query("Bamboo Cutting Board (3 pc) - Natural!"),
            "Bamboo Cutting Board Natural"
        );
        assert_eq!(normalize_title_for_query("(only notes)"), "");
    }

    #[test]
    fn test_seed_queries_dedup_and_order() {
        let terms = vec![
            "LED Strip".to_string(),
            "led strip".to_string(),
            "usb led strip".to_string(),
        ];
        let seeds = seed_queries(&terms, "LED Strip (5m)");
        assert_eq!(seeds, vec!["LED Strip", "usb led strip"]);
        assert!(seed_queries(&[], "()").is_empty());
    }

    #[test]
    fn test_bamboo_example() {
        let outcome = normalize_report_text(BAMBOO, &both());
        assert_eq!(outcome.ebay_replacements, 1);
        assert_eq!(outcome.source_replacements, 1);
        assert!(outcome.text.contains(
            "  - https://www.ebay.com/sch/i.html?_nkw=bamboo+cutting+board&LH_Sold=1&LH_Complete=1&_sop=13\n"
        ));
        assert!(outcome
            .text
            .contains("  - https://www.aliexpress.us/wholesale?SearchText=bamboo+cutting+board\n"));
        assert!(!outcome.text.contains("alibaba.com"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let first = normalize_report_text(BAMBOO, &both());
        let second = normalize_report_text(&first.text, &both());
        assert_eq!(second.total(), 0);
        assert_eq!(second.text, first.text);
    }

    #[test]
    fn test_formatting_preserved() {
        let text = "## Candidate Card - Desk Lamp\r\n- eBay comp links (3-5):\r\n    - https://www.ebay.com/itm/42   \r\n- Decision: HOLD";
        let outcome = normalize_report_text(text, &both());
        assert_eq!(outcome.ebay_replacements, 1);
        assert_eq!(
            outcome.text,
            "## Candidate Card - Desk Lamp\r\n- eBay comp links (3-5):\r\n    - https://www.ebay.com/sch/i.html?_nkw=Desk+Lamp&LH_Sold=1&LH_Complete=1&_sop=13   \r\n- Decision: HOLD"
        );
    }

    #[test]
    fn test_seeds_cycle_across_links() {
        let text = "\
## Candidate Card - Adjustable Phone Stand
- Primary search terms: `phone stand`, `desk phone holder`
- eBay comp links (3-5):
  - https://www.ebay.com/itm/1
  - https://www.ebay.com/itm/2
  - https://www.ebay.com/sch/i.html?_nkw=keep+me
  - https://www.ebay.com/itm/3
  - https://www.ebay.com/itm/4
";
        let outcome = normalize_report_text(text, &NormalizeOptions { ebay: true, source: false });
        assert_eq!(outcome.ebay_replacements, 4);
        let lines: Vec<&str> = outcome.text.lines().collect();
        assert!(lines[3].contains("_nkw=phone+stand&"));
        assert!(lines[4].contains("_nkw=desk+phone+holder&"));
        assert!(lines[5].contains("_nkw=keep+me"));
        assert!(lines[6].contains("_nkw=Adjustable+Phone+Stand&"));
        assert!(lines[7].contains("_nkw=phone+stand&"));
    }

    #[test]
    fn test_links_outside_block_untouched() {
        let text = "\
## Candidate Card - Phone Stand
- Notes: saw https://www.ebay.com/itm/77 yesterday
- eBay comp links (3-5):
  - https://www.aliexpress.us/item/5.html
";
        let outcome = normalize_report_text(text, &NormalizeOptions { ebay: true, source: false });
        assert_eq!(outcome.ebay_replacements, 0);
        assert_eq!(outcome.text, text);
    }

    #[test]
    fn test_disabled_options_change_nothing() {
        let outcome = normalize_report_text(BAMBOO, &NormalizeOptions::default());
        assert_eq!(outcome.total(), 0);
        assert_eq!(outcome.text, BAMBOO);
    }

    #[test]
    fn test_fallback_seed_when_title_empty() {
        let text = "## Candidate Card - (tbd)\n- Source links:\n  - https://alibaba.com/x\n";
        let outcome = normalize_report_text(text, &NormalizeOptions { ebay: false, source: true });
        assert!(outcome.text.contains("SearchText=aliexpress+product"));
    }

    #[test]
    fn test_disallowed_links_only_on_bullets() {
        let text = "\
## Candidate Card - Desk Lamp
See https://www.alibaba.com/lamp.html for context
- Notes: backup https://www.alibaba.com/lamp2.html
1. https://www.alibaba.com/lamp3.html
";
        let outcome = normalize_report_text(text, &NormalizeOptions { ebay: false, source: true });
        assert_eq!(outcome.source_replacements, 2);
        let lines: Vec<&str> = outcome.text.lines().collect();
        assert!(lines[1].contains("alibaba.com/lamp.html"));
        assert!(lines[2].contains("SearchText=Desk+Lamp"));
        assert!(lines[3].contains("SearchText=Desk+Lamp"));
    }
}
