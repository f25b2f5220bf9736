//! Progress and error detection in converter log output.
//!
//! Each external tool gets a [`LogProfile`]: the progress line patterns it
//! prints and the markers that mean it has failed.

use std::sync::LazyLock;

use regex::Regex;

use super::round2;
use crate::jobs::JobKind;

/// Schwarzwald indexing lines, e.g. `[12:00:01] indexing: 1.5M / 3M points`.
static SCHWARZWALD_INDEXING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\]\s*indexing:\s*",
        r"(?P<current>[\d.,_']+)\s*(?P<current_unit>[kKMGB])?",
        r"\s*/\s*",
        r"(?P<total>[\d.,_']+)\s*(?P<total_unit>[kKMGB])?",
    ))
    .unwrap()
});

/// Bracketed percentages at the start of a line, e.g. `[55%] Processed 3 tiles`.
static BRACKETED_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[\s*(?P<current>[\d.]+)\s*%\s*\]").unwrap());

const SCHWARZWALD_ERROR_MARKERS: &[&str] = &[
    "ERROR",
    "Error:",
    "error:",
    "terminate called",
    "Segmentation fault",
];

/// A progress line pattern.
///
/// The regex must capture `current` and may capture `total`, `current_unit`
/// and `total_unit`. Without a `total` capture the value is read against
/// `default_total`.
#[derive(Debug, Clone, Copy)]
pub struct ProgressPattern {
    regex: &'static LazyLock<Regex>,
    default_total: f64,
}

impl ProgressPattern {
    /// Percentage of a single matching line.
    pub fn extract(&self, line: &str) -> Option<f64> {
        let captures = self.regex.captures(line)?;

        let current = parse_quantity(
            captures.name("current")?.as_str(),
            captures.name("current_unit").map(|m| m.as_str()),
        )?;
        let total = match captures.name("total") {
            Some(total) => parse_quantity(
                total.as_str(),
                captures.name("total_unit").map(|m| m.as_str()),
            )?,
            None => self.default_total,
        };
        normalize_progress(current, total)
    }
}

/// What a single log line says about the job.
#[derive(Debug, Clone, PartialEq)]
pub enum LineSignal {
    Progress(f64),
    Error,
}

/// Progress patterns and error markers of one external tool.
#[derive(Debug, Clone)]
pub struct LogProfile {
    tool: &'static str,
    patterns: Vec<ProgressPattern>,
    error_markers: &'static [&'static str],
}

impl LogProfile {
    /// Profile for Schwarzwald point cloud tiling.
    pub fn schwarzwald() -> Self {
        Self {
            tool: "Schwarzwald",
            patterns: vec![
                ProgressPattern {
                    regex: &SCHWARZWALD_INDEXING,
                    default_total: 100.0,
                },
                ProgressPattern {
                    regex: &BRACKETED_PERCENT,
                    default_total: 100.0,
                },
            ],
            error_markers: SCHWARZWALD_ERROR_MARKERS,
        }
    }

    /// Profile of the tool that converts `kind`, if its log carries progress.
    pub fn for_kind(kind: JobKind) -> Option<Self> {
        match kind {
            JobKind::Cloud => Some(Self::schwarzwald()),
            JobKind::Model | JobKind::Splat | JobKind::Ifc => None,
        }
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    pub fn inspect_line(&self, line: &str) -> Option<LineSignal> {
        if self.error_markers.iter().any(|marker| line.contains(marker)) {
            return Some(LineSignal::Error);
        }
        self.patterns
            .iter()
            .find_map(|pattern| pattern.extract(line))
            .map(LineSignal::Progress)
    }
}

/// Parse a number with optional thousands separators and magnitude suffix.
///
/// Separators `,` `_` and `'` are stripped. Suffixes: `K`/`k` thousands,
/// `M` millions, `G`/`B` billions.
///
/// # Examples
/// ```ignore
/// assert_eq!(parse_quantity("1.5", Some("M")), Some(1_500_000.0));
/// assert_eq!(parse_quantity("12,345", None), Some(12_345.0));
/// ```
pub fn parse_quantity(number: &str, unit: Option<&str>) -> Option<f64> {
    let cleaned: String = number
        .chars()
        .filter(|c| !matches!(*c, ',' | '_' | '\''))
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    let scale = match unit.map(str::trim) {
        None | Some("") => 1.0,
        Some("K" | "k") => 1e3,
        Some("M") => 1e6,
        Some("G" | "B") => 1e9,
        Some(_) => return None,
    };
    Some(value * scale)
}

/// `current / total` as a percentage, rounded to two decimals and clamped to [0, 100].
pub fn normalize_progress(current: f64, total: f64) -> Option<f64> {
    if !current.is_finite() || !total.is_finite() || total <= 0.0 {
        return None;
    }
    Some(round2(current / total * 100.0).clamp(0.0, 100.0))
}
