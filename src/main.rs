//! Report Link Guard
//!
//! Audits the links inside candidate-card reports and optionally rewrites
//! fragile ones into durable search URLs before auditing.

use anyhow::Result;
use candidate_evidence::config::{load_config, Config};
use candidate_evidence::link_health::{audit_report, format_record_line, generate_audit_report, ReportAudit};
use candidate_evidence::normalize::{normalize_report_text, NormalizeOptions};
use candidate_evidence::storage;
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "report-link-guard",
    version,
    about = "Audit and optionally normalize links in candidate-card markdown reports"
)]
struct Cli {
    /// Markdown report path(s), directory path(s), or glob(s)
    reports: Vec<String>,

    /// Include all markdown files from reports/ or ebay-arbitrage-plugin/reports/
    #[arg(long)]
    all_reports: bool,

    /// Per-request timeout in seconds [default: 12]
    #[arg(long)]
    timeout: Option<f64>,

    /// Retry count for transient network failures [default: 1]
    #[arg(long)]
    retries: Option<u32>,

    /// Concurrent link checks [default: 12]
    #[arg(long)]
    workers: Option<usize>,

    /// Run structural/relevance checks only, no HTTP requests
    #[arg(long)]
    skip_network: bool,

    /// Replace eBay comp links with sold-search URLs based on primary terms
    #[arg(long)]
    normalize_ebay_links: bool,

    /// Replace alibaba.com links with AliExpress search URLs based on primary terms
    #[arg(long)]
    normalize_source_links: bool,

    /// Write normalized content back to file (requires a --normalize-* flag)
    #[arg(long)]
    write: bool,

    /// Exit non-zero if warnings are present
    #[arg(long)]
    strict_warnings: bool,

    /// Also write the audit as a markdown report to this file
    #[arg(long)]
    markdown_out: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            ebay: self.normalize_ebay_links,
            source: self.normalize_source_links,
        }
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(timeout) = self.timeout {
            config.audit.timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.audit.retries = retries;
        }
        if let Some(workers) = self.workers {
            config.audit.workers = workers;
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
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
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli) -> Result<u8> {
    let options = cli.normalize_options();
    if cli.write && !options.any() {
        eprintln!("--write requires --normalize-ebay-links or --normalize-source-links");
        return Ok(2);
    }
    if cli.reports.is_empty() && !cli.all_reports {
        eprintln!("provide report path(s) or use --all-reports");
        return Ok(2);
    }

    let mut config = load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let mut targets = cli.reports.clone();
    if cli.all_reports {
        targets.extend(storage::default_report_targets(Path::new("")));
    }

    let resolved = storage::resolve_report_paths(&targets)?;
    let mut all_warnings = 0;
    let mut all_failures = 0;

    for missing in &resolved.missing {
        warn!(path = %missing.display(), "missing report");
        eprintln!("missing report: {}", missing.display());
        all_failures += 1;
    }

    if resolved.reports.is_empty() {
        eprintln!("no report files matched");
        return Ok(if all_failures == 0 { 2 } else { 1 });
    }

    let mut audits = Vec::with_capacity(resolved.reports.len());
    for path in &resolved.reports {
        let audit = process_report(path, cli, &options, &config).await?;
        print_results(&audit);
        all_warnings += audit.summary.warn;
        all_failures += audit.summary.fail;
        audits.push(audit);
    }

    if let Some(out) = &cli.markdown_out {
        storage::write_report(out, &generate_audit_report(&audits))?;
        println!("\nwrote audit report: {}", out.display());
    }

    info!(reports = audits.len(), warnings = all_warnings, failures = all_failures, "audit finished");

    if all_failures > 0 {
        return Ok(1);
    }
    if cli.strict_warnings && all_warnings > 0 {
        return Ok(1);
    }
    Ok(0)
}

async fn process_report(path: &Path, cli: &Cli, options: &NormalizeOptions, config: &Config) -> Result<ReportAudit> {
    info!(path = %path.display(), "auditing report");
    let original = storage::read_report(path)?;
    let mut working = original.clone();

    if options.any() {
        let outcome = normalize_report_text(&original, options);
        println!(
            "\n{}: normalized {} eBay comp link(s), {} source link(s)",
            path.display(),
            outcome.ebay_replacements,
            outcome.source_replacements
        );
        if cli.write && outcome.text != original {
            storage::write_report(path, &outcome.text)?;
            println!("{}: wrote normalized content", path.display());
        }
        working = outcome.text;
    }

    audit_report(path, &working, &config.audit, !cli.skip_network).await
}

fn print_results(audit: &ReportAudit) {
    let shown = audit.report.display().to_string();
    println!("\nReport: {}", shown);
    println!("Links checked: {}", audit.records.len());

    for record in audit.failures().chain(audit.warnings()) {
        if let Some(line) = format_record_line(record, &shown) {
            println!("{}", line);
        }
    }

    println!("Summary: {}", audit.summary);
}
