use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use tracing::warn;

use crate::parser::parse_report;
use crate::{EvidenceRow, ParsedReport, RunManifest, SourceReport};

/// Report directories picked up by `--all-reports`, relative to `root`
const DEFAULT_REPORT_DIRS: &[&str] = &["reports", "ebay-arbitrage-plugin/reports"];

/// Report files found for a set of inputs, plus inputs that matched nothing
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolvedReports {
    pub reports: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

fn has_wildcard(target: &str) -> bool {
    target.contains(['*', '?', '[', ']'])
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// `<dir>/*.md` glob targets for the default report directories that exist
pub fn default_report_targets(root: &Path) -> Vec<String> {
    DEFAULT_REPORT_DIRS
        .iter()
        .map(|dir| root.join(dir))
        .filter(|dir| dir.is_dir())
        .map(|dir| dir.join("*.md").to_string_lossy().into_owned())
        .collect()
}

/// Recursively collect markdown files under a directory, sorted
fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {:?}", dir))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read entry in {:?}", dir))?;
        paths.push(entry.path());
    }
    paths.sort();

    for path in paths {
        if path.is_dir() {
            collect_markdown(&path, out)?;
        } else if path.is_file() && is_markdown(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Expand report inputs: files as-is, directories recursively, glob patterns
///
/// Only `.md` files are kept. Duplicates (same canonical path) are dropped,
/// first occurrence wins.
pub fn resolve_report_paths(targets: &[String]) -> Result<ResolvedReports> {
    let mut resolved = ResolvedReports::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for target in targets {
        let path = PathBuf::from(target);
        let mut matches = Vec::new();

        if path.exists() {
            if path.is_dir() {
                collect_markdown(&path, &mut matches)?;
            } else if path.is_file() {
                matches.push(path);
            }
        } else if has_wildcard(target) {
            let entries = glob::glob(target)
                .with_context(|| format!("Invalid report pattern {:?}", target))?;
            for entry in entries {
                match entry {
                    Ok(candidate) if candidate.is_file() => matches.push(candidate),
                    Ok(_) => {}
                    Err(e) => warn!(pattern = %target, error = %e, "unreadable glob match"),
                }
            }
            matches.sort();
        } else {
            resolved.missing.push(path);
            continue;
        }

        for candidate in matches {
            if !is_markdown(&candidate) {
                continue;
            }
            let key = fs::canonicalize(&candidate).unwrap_or_else(|_| candidate.clone());
            if seen.insert(key) {
                resolved.reports.push(candidate);
            }
        }
    }

    Ok(resolved)
}

/// Input for the evidence pipeline: one `.md` file, or the `*.md` files of a directory
pub fn resolve_input_paths(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        if !is_markdown(input) {
            bail!("input file must be .md: {}", input.display());
        }
        return Ok(vec![input.to_path_buf()]);
    }

    if input.is_dir() {
        let mut paths = Vec::new();
        let entries = fs::read_dir(input)
            .with_context(|| format!("Failed to read directory {:?}", input))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to read entry in {:?}", input))?
                .path();
            if path.is_file() && is_markdown(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        if paths.is_empty() {
            bail!("no markdown reports in: {}", input.display());
        }
        return Ok(paths);
    }

    bail!("input path not found: {}", input.display())
}

/// Directory that receives `.evidence/` and `.runs/`
///
/// The first report living directly in a `reports` directory decides; otherwise
/// the first report's parent.
pub fn reports_root(paths: &[PathBuf]) -> PathBuf {
    let in_reports_dir = paths.iter().find_map(|path| {
        let parent = path.parent()?;
        let name = parent.file_name()?.to_string_lossy().to_lowercase();
        (name == "reports").then(|| parent.to_path_buf())
    });

    in_reports_dir
        .or_else(|| paths.first().and_then(|p| p.parent()).map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Path relative to the working directory when possible, with forward slashes
pub fn display_path(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let shown = std::env::current_dir()
        .ok()
        .and_then(|cwd| fs::canonicalize(cwd).ok())
        .and_then(|cwd| absolute.strip_prefix(&cwd).ok().map(Path::to_path_buf))
        .unwrap_or(absolute);
    shown.to_string_lossy().replace('\\', "/")
}

pub fn read_report(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read report from {:?}", path))
}

pub fn write_report(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text)
        .with_context(|| format!("Failed to write report to {:?}", path))?;
    Ok(())
}

/// Parse one report file and describe it for the aggregate view
pub fn load_report(path: &Path) -> Result<(ParsedReport, SourceReport)> {
    let text = read_report(path)?;
    let shown = display_path(path);
    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| shown.clone());

    let parsed = parse_report(&text, &shown, &label);

    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("Failed to read modification time of {:?}", path))?;
    let modified_at = DateTime::<Local>::from(modified).format("%Y-%m-%d %H:%M").to_string();

    let source = SourceReport {
        path: shown,
        label,
        candidate_count: parsed.candidates.len(),
        modified_at,
    };
    Ok((parsed, source))
}

pub fn save_evidence(path: &Path, rows: &[EvidenceRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create evidence directory {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(rows)
        .context("Failed to serialize evidence rows")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write evidence to {:?}", path))?;
    Ok(())
}

pub fn save_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create run directory {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(manifest)
        .context("Failed to serialize run manifest")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write manifest to {:?}", path))?;
    Ok(())
}
