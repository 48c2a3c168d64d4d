//! Link Classification Module
//!
//! Maps a URL to a `LinkCategory` from its host and path shape alone.
//! No network access happens here; unparseable input is `Other`.

use crate::types::LinkCategory;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Host token for the resale marketplace
pub const EBAY_HOST_TOKEN: &str = "ebay.";

/// Host token for the approved supplier
pub const ALIEXPRESS_HOST_TOKEN: &str = "aliexpress.";

/// Competitor sourcing domain that reports must not link to
pub const DISALLOWED_HOST_TOKEN: &str = "alibaba.com";

/// Classify a URL into its link category
pub fn classify_link(url: &str) -> LinkCategory {
    let (host, path) = match host_and_path(url) {
        Some(parts) => parts,
        None => return LinkCategory::Other,
    };

    if host.contains(EBAY_HOST_TOKEN) {
        if path.starts_with("/itm/") {
            return LinkCategory::EbayItem;
        }
        if path.starts_with("/sch/i.html") {
            return LinkCategory::EbaySearch;
        }
        if path.starts_with("/b/") {
            return LinkCategory::EbayCategory;
        }
        return LinkCategory::EbayOther;
    }

    if host.contains(ALIEXPRESS_HOST_TOKEN) {
        if path.starts_with("/wholesale") || path.contains("/w/wholesale") {
            return LinkCategory::AliexpressSearch;
        }
        return LinkCategory::AliexpressOther;
    }

    if host.contains(DISALLOWED_HOST_TOKEN) {
        return LinkCategory::AlibabaDisallowed;
    }

    LinkCategory::Other
}

/// True when the URL's host carries the given domain token
pub fn is_domain(url: &str, token: &str) -> bool {
    host_and_path(url)
        .map(|(host, _)| host.contains(token))
        .unwrap_or(false)
}

/// Every http(s) URL occurring in a line of text, in order
///
/// Trailing punctuation that markdown puts after a bare URL is not part of it.
pub fn find_urls(line: &str) -> Vec<&str> {
    static URLS: OnceLock<Option<Regex>> = OnceLock::new();
    let re = match URLS.get_or_init(|| Regex::new(r"https?://[^\s)]+").ok()) {
        Some(re) => re,
        None => return Vec::new(),
    };
    re.find_iter(line)
        .map(|m| m.as_str().trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '>' | ']' | '"' | '\'' | '`')))
        .filter(|url| !url.is_empty())
        .collect()
}

/// Lowercased host and path, or None when the text is not an absolute URL
fn host_and_path(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some((host, parsed.path().to_lowercase()))
}
