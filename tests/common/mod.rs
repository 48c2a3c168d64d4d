#![allow(dead_code)]

use candidate_evidence::config::AuditConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Audit settings for tests: no backoff sleeps, short timeout.
pub fn fast_audit_config(retries: u32) -> AuditConfig {
    AuditConfig {
        timeout_secs: 5.0,
        retries,
        workers: 4,
        backoff_ms: 0,
        ..Default::default()
    }
}

/// A one-card report whose source links block holds `urls`.
pub fn single_card_report(title: &str, term: &str, urls: &[String]) -> String {
    let mut text = format!(
        "# Test Report\nDate: 2026-03-01\n\n## Candidate Card - {}\n- Primary search terms used: `{}`\n- Source links:\n",
        title, term
    );
    for url in urls {
        text.push_str(&format!("  - {}\n", url));
    }
    text.push_str("- Decision: HOLD\n");
    text
}

/// Mounts a GET mock at `url_path` answering with `status`.
pub async fn mount_status(server: &MockServer, url_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Mounts a GET mock at `url_path` answering `status` for the first `times` requests only.
pub async fn mount_status_times(server: &MockServer, url_path: &str, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .mount(server)
        .await;
}
