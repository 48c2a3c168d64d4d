//! Run configuration
//!
//! Defaults reproduce the link guard and exact-match pipeline behavior. An
//! optional YAML file overrides any subset of fields; CLI flags are applied on
//! top by the binaries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub audit: AuditConfig,
    pub scoring: ScoringConfig,
    pub lanes: LaneConfig,
}

/// Network verification settings for the link audit
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Per-attempt timeout in seconds
    pub timeout_secs: f64,
    /// Extra attempts after the first one, transient failures only
    pub retries: u32,
    /// Maximum fetches in flight
    pub workers: usize,
    /// Base delay for exponential backoff between attempts
    pub backoff_ms: u64,
    pub max_redirects: usize,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 12.0,
            retries: 1,
            workers: 12,
            backoff_ms: 500,
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

impl AuditConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(Duration::from_secs(12))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}

/// Match-score weights and label thresholds
///
/// These are heuristic defaults with no calibration data behind them; tune
/// them per market rather than treating them as fixed business rules.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub overlap_weight: f64,
    pub sequence_weight: f64,
    pub presence_weight: f64,
    /// Presence signal when both listing URLs exist
    pub presence_both: f64,
    /// Presence signal when either listing URL is missing
    pub presence_partial: f64,
    pub exact_threshold: f64,
    pub similar_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            overlap_weight: 0.50,
            sequence_weight: 0.35,
            presence_weight: 0.15,
            presence_both: 0.75,
            presence_partial: 0.20,
            exact_threshold: 0.80,
            similar_threshold: 0.65,
        }
    }
}

/// Traffic-seed lane selection
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LaneConfig {
    /// Share of candidates tagged TRAFFIC_SEED
    pub traffic_share: f64,
    pub margin_min: f64,
    pub margin_max: f64,
    /// Break-even margin the traffic lane aims for
    pub target_margin: f64,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            traffic_share: 0.15,
            margin_min: -2.0,
            margin_max: 12.0,
            target_margin: 3.0,
        }
    }
}

/// Load configuration from a YAML file, or defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => return Ok(Config::default()),
    };

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;

    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config YAML {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.audit.retries, 1);
        assert_eq!(config.audit.workers, 12);
        assert_eq!(config.audit.timeout(), Duration::from_secs(12));
        assert_eq!(config.scoring.exact_threshold, 0.80);
        assert_eq!(config.lanes.traffic_share, 0.15);
    }

    #[test]
    fn test_unusable_timeout_falls_back() {
        for secs in [0.0, -3.0, f64::NAN, f64::INFINITY, 1e20] {
            let audit = AuditConfig {
                timeout_secs: secs,
                ..Default::default()
            };
            assert_eq!(audit.timeout(), Duration::from_secs(12), "timeout_secs {}", secs);
        }
        let audit = AuditConfig {
            timeout_secs: 0.25,
            ..Default::default()
        };
        assert_eq!(audit.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.yml");
        fs::write(&path, "audit:\n  workers: 4\nscoring:\n  similar_threshold: 0.7\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.audit.workers, 4);
        assert_eq!(config.audit.retries, 1);
        assert_eq!(config.scoring.similar_threshold, 0.7);
        assert_eq!(config.scoring.overlap_weight, 0.50);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        fs::write(&path, "audit: [not, a, map]\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
        assert!(load_config(Some(&dir.path().join("missing.yml"))).is_err());
    }

    #[test]
    fn test_bad_timeout_falls_back() {
        let audit = AuditConfig { timeout_secs: -1.0, workers: 0, ..Default::default() };
        assert_eq!(audit.timeout(), Duration::from_secs(12));
        assert_eq!(audit.worker_count(), 1);
    }
}
