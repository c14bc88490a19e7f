//! PMC archive listing and unit selection
//!
//! Parses the HTTP directory listing of the archive and picks which bundles
//! a run attempts.

use std::fmt;
use std::sync::LazyLock;

use indicatif::ProgressBar;
use regex::Regex;
use synmine_core::{RetryPolicy, StreamError, fetch_text};

/// `PMC{start}_PMC{end}` in a bundle name
static PMC_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?<lead>PMC(?<start>\d+))_PMC(?<end>\d+)").expect("invalid range pattern")
});

/// One remote bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub name: String,
    pub url: String,
    pub size_bytes: Option<u64>,
    /// Numeric start of the PMC id range
    pub start_id: u64,
    pub end_id: u64,
}

impl WorkUnit {
    /// Leading id as written in the name (`PMC11890001`)
    pub fn start_pmc_id(&self) -> String {
        leading_pmc_id(&self.name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("PMC{}", self.start_id))
    }
}

/// `(start, end)` from a name containing `PMC{a}_PMC{b}`
pub fn parse_range(name: &str) -> Option<(u64, u64)> {
    let caps = PMC_RANGE.captures(name)?;
    Some((caps["start"].parse().ok()?, caps["end"].parse().ok()?))
}

/// `PMC{a}` exactly as it appears in the name, leading zeros included
pub fn leading_pmc_id(name: &str) -> Option<&str> {
    PMC_RANGE
        .captures(name)
        .and_then(|caps| caps.name("lead"))
        .map(|m| m.as_str())
}

/// `start_from` that names no bundle and holds no PMC range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStart(pub String);

impl fmt::Display for UnknownStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start bundle {} is not in the listing and has no PMC{{a}}_PMC{{b}} range",
            self.0
        )
    }
}

impl std::error::Error for UnknownStart {}

/// Numeric part of `PMC123` / `pmc:PMC123` / `123`
pub fn pmc_number(id: &str) -> Option<u64> {
    let id = id.strip_prefix("pmc:").unwrap_or(id);
    let digits = id.strip_prefix("PMC").unwrap_or(id);
    digits.parse().ok()
}

/// Fetch the listing at `base_url`, retrying transient failures.
pub fn fetch_listing(
    base_url: &str,
    retry: &RetryPolicy,
    pb: &ProgressBar,
) -> Result<Vec<WorkUnit>, StreamError> {
    log::info!("Fetching directory listing from {base_url}");
    let html = retry.run("listing", pb, |_| fetch_text(base_url))?;
    let units = parse_listing(&html, base_url);
    log::info!("Listing contains {} bundles", units.len());
    Ok(units)
}

/// Parse an HTML directory listing for `.xml.gz` bundles with a PMC range.
///
/// Ordered by numeric start id, ties by name.
pub fn parse_listing(html: &str, base_url: &str) -> Vec<WorkUnit> {
    let mut units = Vec::new();

    // Lines like: <a href="PMC1_PMC100.xml.gz">PMC1_PMC100.xml.gz</a>  2024-01-01 10:00  19M
    for line in html.lines() {
        let mut rest = line;
        while let Some(start) = rest.find("href=\"") {
            rest = &rest[start + 6..];
            let Some(end) = rest.find('"') else {
                break;
            };
            let href = &rest[..end];
            rest = &rest[end..];

            if !href.ends_with(".xml.gz") {
                continue;
            }
            let name = href.rsplit('/').next().unwrap_or(href);
            let Some((start_id, end_id)) = parse_range(name) else {
                continue;
            };
            let url = if href.starts_with("http://") || href.starts_with("https://") {
                href.to_string()
            } else {
                format!("{}/{}", base_url.trim_end_matches('/'), href)
            };

            units.push(WorkUnit {
                name: name.to_string(),
                url,
                size_bytes: parse_size_from_line(line),
                start_id,
                end_id,
            });
        }
    }

    units.sort_by(|a, b| a.start_id.cmp(&b.start_id).then_with(|| a.name.cmp(&b.name)));
    units.dedup_by(|a, b| a.name == b.name);
    units
}

/// Parse size from listing line (e.g., "19M" or "4.5K")
fn parse_size_from_line(line: &str) -> Option<u64> {
    let tail = line.rsplit("</a>").next()?;
    tail.split_whitespace().rev().find_map(parse_size_string)
}

fn parse_size_string(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('K') {
        (n, 1024u64)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1024 * 1024 * 1024)
    } else if s.chars().all(|c| c.is_ascii_digit()) {
        (s, 1)
    } else {
        return None;
    };

    num_str
        .parse::<f64>()
        .ok()
        .map(|n| (n * multiplier as f64) as u64)
}

/// Apply the start cursor and the file limit.
///
/// `start_from` wins over the tracked id. A `start_from` containing a PMC
/// range starts at the first unit whose start id is at least that range's
/// start, and selects nothing when every unit is ordered before it. Any
/// other value must match a unit name exactly. Without `start_from`, units
/// at or below `last_processed` are skipped.
pub fn select_units(
    units: Vec<WorkUnit>,
    start_from: Option<&str>,
    last_processed: Option<&str>,
    max_files: Option<usize>,
) -> Result<Vec<WorkUnit>, UnknownStart> {
    let skip = match start_from {
        Some(from) => start_index(&units, from)?,
        None => match last_processed.and_then(pmc_number) {
            Some(last) => {
                let i = units.partition_point(|u| u.start_id <= last);
                if i > 0 {
                    log::info!("Resuming after PMC{last}: skipping {i} processed bundle(s)");
                }
                i
            }
            None => 0,
        },
    };

    let mut selected: Vec<WorkUnit> = units.into_iter().skip(skip).collect();
    if let Some(max) = max_files {
        selected.truncate(max);
    }
    Ok(selected)
}

fn start_index(units: &[WorkUnit], start_from: &str) -> Result<usize, UnknownStart> {
    if let Some(i) = units.iter().position(|u| u.name == start_from) {
        log::info!("Starting from bundle: {}", units[i].name);
        return Ok(i);
    }
    let Some((start, _)) = parse_range(start_from) else {
        return Err(UnknownStart(start_from.to_string()));
    };
    match units.iter().position(|u| u.start_id >= start) {
        Some(i) => {
            log::info!("Starting from bundle: {}", units[i].name);
            Ok(i)
        }
        None => {
            log::warn!("No bundle with PMC id >= {start}; nothing to process");
            Ok(units.len())
        }
    }
}
