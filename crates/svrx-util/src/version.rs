//! Version Matcher
//!
//! Pure helpers over semantic versions and npm-style ranges. Plugins declare
//! the svrx core versions they support with npm range syntax; the parsing of
//! individual comparators is delegated to the `semver` crate after the npm
//! forms (bare versions, hyphen ranges, `x` wildcards, `||` unions) have been
//! normalized into its syntax.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SvrxError};

/// A single published or installed candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Plugin version string
    pub version: String,
    /// Core-version range the candidate declares compatibility with
    #[serde(default)]
    pub core_range: Option<String>,
}

impl VersionEntry {
    pub fn new(version: impl Into<String>, core_range: Option<&str>) -> Self {
        Self {
            version: version.into(),
            core_range: core_range.map(str::to_string),
        }
    }
}

/// Parse a version leniently (`v1.2.3` and `=1.2.3` are accepted)
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('=')
        .unwrap_or(trimmed)
        .trim_start_matches(['v', 'V']);
    Version::parse(trimmed).ok()
}

/// Parse a version, failing with `InvalidVersion`
pub fn require_version(input: &str) -> Result<Version> {
    parse_version(input).ok_or_else(|| SvrxError::InvalidVersion {
        version: input.to_string(),
    })
}

/// An npm-style range: a union of comparator sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl Range {
    /// Check whether `version` lies inside the range
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The range as originally written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Range {
    type Err = SvrxError;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = || SvrxError::InvalidVersion {
            version: input.to_string(),
        };

        let mut alternatives = Vec::new();
        for set in input.split("||") {
            let normalized = normalize_set(set).ok_or_else(invalid)?;
            let req = if normalized.is_empty() {
                VersionReq::STAR
            } else {
                VersionReq::parse(&normalized).map_err(|_| invalid())?
            };
            alternatives.push(req);
        }

        Ok(Self {
            raw: input.trim().to_string(),
            alternatives,
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

const OPERATORS: [&str; 8] = [">=", "<=", "~>", "^", "~", ">", "<", "="];

/// Turn one npm comparator set into `semver` syntax (comma separated)
fn normalize_set(set: &str) -> Option<String> {
    let set = set.trim();

    // Hyphen range: `1.2.3 - 2.3`
    if let Some((low, high)) = set.split_once(" - ") {
        let low = Partial::parse(low.trim())?;
        let high = Partial::parse(high.trim())?;
        let mut comparators = Vec::new();
        if !low.is_any() {
            comparators.push(format!(">={}", low.filled()));
        }
        // `<=2` already means `<3.0.0` for a partial upper bound
        if !high.is_any() {
            comparators.push(format!("<={}", high.text));
        }
        return Some(comparators.join(", "));
    }

    // Glue detached operators to their version: `>= 1.0.0`
    let mut tokens: Vec<String> = Vec::new();
    let mut pending: Option<&str> = None;
    for token in set.split_whitespace() {
        if OPERATORS.contains(&token) {
            pending = Some(token);
            continue;
        }
        match pending.take() {
            Some(op) => tokens.push(format!("{}{}", op, token)),
            None => tokens.push(token.to_string()),
        }
    }
    if pending.is_some() {
        return None;
    }

    let mut comparators = Vec::new();
    for token in tokens {
        let op = OPERATORS
            .iter()
            .find(|op| token.starts_with(**op))
            .copied()
            .unwrap_or("");
        let partial = Partial::parse(&token[op.len()..])?;
        let op = match op {
            "~>" => "~",
            // A bare version is exact; a bare partial matches its prefix
            "" => "=",
            other => other,
        };

        if partial.is_any() {
            match op {
                // `<*` and `>*` match nothing in npm
                "<" | ">" => return Some("<0.0.0-0".to_string()),
                _ => continue,
            }
        }
        comparators.push(format!("{}{}", op, partial.text));
    }

    Some(comparators.join(", "))
}

/// A possibly partial version with `x`/`*` components removed
struct Partial {
    text: String,
    parts: usize,
}

impl Partial {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim().trim_start_matches(['v', 'V']);
        if input.is_empty() {
            return None;
        }

        let (core, rest) = match input.find(['-', '+']) {
            Some(idx) => input.split_at(idx),
            None => (input, ""),
        };

        let mut kept = Vec::new();
        for part in core.split('.') {
            if matches!(part, "x" | "X" | "*") {
                break;
            }
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            kept.push(part);
        }
        if kept.len() > 3 {
            return None;
        }

        // Pre-release/build only make sense on a full version
        let suffix = if kept.len() == 3 { rest } else { "" };
        Some(Self {
            text: format!("{}{}", kept.join("."), suffix),
            parts: kept.len(),
        })
    }

    fn is_any(&self) -> bool {
        self.parts == 0
    }

    /// Missing components filled with zeroes
    fn filled(&self) -> String {
        let mut text = self.text.clone();
        for _ in self.parts..3 {
            text.push_str(".0");
        }
        text
    }
}

/// Check whether the core version satisfies a declared range.
///
/// An undeclared range is compatible with every core; a malformed one with
/// none.
pub fn satisfies(core: &Version, range: Option<&str>) -> bool {
    let Some(range) = range else {
        return true;
    };

    match range.parse::<Range>() {
        Ok(range) => range.matches(core),
        Err(_) => {
            tracing::warn!(range, "ignoring malformed compatibility range");
            false
        }
    }
}

/// Remove duplicate versions, keeping the first occurrence
pub fn dedupe_entries(entries: Vec<VersionEntry>) -> Vec<VersionEntry> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|entry| match parse_version(&entry.version) {
            Some(v) => seen.insert(v),
            None => false,
        })
        .collect()
}

/// Sort entries by semantic version, highest first. Invalid versions sink.
pub fn sort_descending(entries: &mut [VersionEntry]) {
    entries.sort_by(|a, b| parse_version(&b.version).cmp(&parse_version(&a.version)));
}

/// Pick the highest candidate whose core range contains `core`.
///
/// When a version appears twice the later entry's range is used.
pub fn best_fit(candidates: &[VersionEntry], core: &Version) -> Option<String> {
    let mut by_version: BTreeMap<Version, &VersionEntry> = BTreeMap::new();
    for entry in candidates {
        if let Some(version) = parse_version(&entry.version) {
            by_version.insert(version, entry);
        }
    }

    by_version
        .into_iter()
        .rev()
        .find(|(_, entry)| satisfies(core, entry.core_range.as_deref()))
        .map(|(_, entry)| entry.version.clone())
}

/// Compare two optional versions; `None` sorts lowest
pub fn is_newer(candidate: Option<&str>, current: Option<&str>) -> bool {
    match (candidate.and_then(parse_version), current.and_then(parse_version)) {
        (Some(candidate), Some(current)) => candidate > current,
        (Some(_), None) => true,
        _ => false,
    }
}
