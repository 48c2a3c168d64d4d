//! Exact-Match Evidence Binary
//!
//! Scores every candidate's marketplace/supplier link pair and writes:
//! - `<reports>/.evidence/<run_id>/evidence.json`
//! - `<reports>/.runs/<run_id>/manifest.json`

use anyhow::Result;
use candidate_evidence::config::{load_config, Config};
use candidate_evidence::matching::build_evidence;
use candidate_evidence::storage;
use candidate_evidence::{MatchLabel, RunManifest};
use chrono::{Local, SecondsFormat, Utc};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "exact_match",
    version,
    about = "Enrich candidates with exact-match listing evidence"
)]
struct Cli {
    /// Markdown report file or directory
    input_path: PathBuf,

    /// Run ID (default: local timestamp)
    #[arg(long)]
    run_id: Option<String>,

    /// Manifest status value
    #[arg(long, default_value = "complete")]
    status: String,

    /// Minimum score for a SIMILAR match [default: 0.65]
    #[arg(long)]
    threshold: Option<f64>,

    /// Share of candidates to tag as TRAFFIC_SEED [default: 0.15]
    #[arg(long)]
    traffic_share: Option<f64>,

    /// Minimum margin % for the traffic lane [default: -2]
    #[arg(long, allow_hyphen_values = true)]
    traffic_margin_min: Option<f64>,

    /// Maximum margin % for the traffic lane [default: 12]
    #[arg(long, allow_hyphen_values = true)]
    traffic_margin_max: Option<f64>,

    /// Target break-even margin % for the traffic lane [default: 3]
    #[arg(long, allow_hyphen_values = true)]
    traffic_target_margin: Option<f64>,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.scoring.similar_threshold = threshold;
        }
        if let Some(share) = self.traffic_share {
            config.lanes.traffic_share = share;
        }
        if let Some(min) = self.traffic_margin_min {
            config.lanes.margin_min = min;
        }
        if let Some(max) = self.traffic_margin_max {
            config.lanes.margin_max = max;
        }
        if let Some(target) = self.traffic_target_margin {
            config.lanes.target_margin = target;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let md_paths = storage::resolve_input_paths(&cli.input_path)?;
    let root = storage::reports_root(&md_paths);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| Local::now().format("%Y%m%d-%H%M%S").to_string());
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false);

    let mut reports = Vec::with_capacity(md_paths.len());
    for path in &md_paths {
        let (parsed, _) = storage::load_report(path)?;
        info!(path = %path.display(), candidates = parsed.candidates.len(), "parsed report");
        reports.push(parsed);
    }

    let rows = build_evidence(&reports, &config.scoring, &config.lanes);

    let evidence_path = root.join(".evidence").join(&run_id).join("evidence.json");
    let manifest_path = root.join(".runs").join(&run_id).join("manifest.json");
    storage::save_evidence(&evidence_path, &rows)?;

    let manifest = RunManifest {
        run_id: run_id.clone(),
        created_at,
        candidate_count: rows.len(),
        status: cli.status.clone(),
        source_reports: md_paths.iter().map(|p| storage::display_path(p)).collect(),
        evidence_path: storage::display_path(&evidence_path),
    };
    storage::save_manifest(&manifest_path, &manifest)?;

    let count = |label: MatchLabel| rows.iter().filter(|r| r.match_label == label).count();
    println!("run_id: {}", run_id);
    println!("manifest: {}", manifest_path.display());
    println!("evidence: {}", evidence_path.display());
    println!(
        "matches: exact={} similar={} weak={} total={}",
        count(MatchLabel::Exact),
        count(MatchLabel::Similar),
        count(MatchLabel::Weak),
        rows.len()
    );

    Ok(())
}
