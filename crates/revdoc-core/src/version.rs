//! Filename version parsing and latest-revision resolution.
//!
//! A version token is a `v` followed by one or more ASCII digits, matched
//! case-insensitively anywhere in the identifier: `report_v2.docx`,
//! `Plan-V10-final.pdf`. The first token decides the version; every token
//! is stripped to form the base name used as the grouping key.
//!
//! # Example
//!
//! ```rust
//! use revdoc_core::version::{resolve_latest, VersionPolicy};
//!
//! let group = resolve_latest(
//!     &["doc_v1.docx", "doc_v10.docx", "doc_v2.docx"],
//!     &VersionPolicy::BestEffort,
//! );
//! assert_eq!(group.latest_for("doc_.docx"), Some("doc_v10.docx"));
//! ```

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)v(\d+)").expect("version token pattern is valid")
});

/// Which identifiers take part in version resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionPolicy {
    /// Every identifier is eligible; unmarked ones count as version 0.
    #[default]
    BestEffort,
    /// Only identifiers containing this marker (case-insensitive) are
    /// eligible. Everything else is excluded before grouping.
    StrictMarker(String),
}

impl VersionPolicy {
    pub fn is_eligible(&self, identifier: &str) -> bool {
        match self {
            VersionPolicy::BestEffort => true,
            VersionPolicy::StrictMarker(marker) => identifier
                .to_lowercase()
                .contains(&marker.to_lowercase()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VersionPolicy::BestEffort => "best-effort",
            VersionPolicy::StrictMarker(_) => "strict-marker",
        }
    }
}

/// The grouping key and version derived from one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub base_name: String,
    pub version: u64,
}

/// Parse both attributes in one pass.
pub fn parse(identifier: &str) -> ParsedIdentifier {
    ParsedIdentifier {
        base_name: base_name(identifier),
        version: extract_version(identifier),
    }
}

/// Numeric value of the first `v<digits>` token, or `0` when there is none.
///
/// Digit runs that overflow `u64` saturate to `u64::MAX`.
pub fn extract_version(identifier: &str) -> u64 {
    VERSION_TOKEN
        .captures(identifier)
        .and_then(|caps| caps.get(1))
        .map(|digits| digits.as_str().parse::<u64>().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Identifier with every version token removed, lowercased.
///
/// Only meant as a grouping key, not for display.
pub fn base_name(identifier: &str) -> String {
    VERSION_TOKEN.replace_all(identifier, "").to_lowercase()
}

/// Mapping from base name to the identifier selected as latest.
///
/// Iterates in the order base names were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionGroup {
    members: IndexMap<String, String>,
}

impl VersionGroup {
    pub fn latest_for(&self, base_name: &str) -> Option<&str> {
        self.members.get(base_name).map(String::as_str)
    }

    /// True when `identifier` is the member selected for its base name.
    pub fn is_current(&self, identifier: &str) -> bool {
        self.latest_for(&base_name(identifier)) == Some(identifier)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Outcome of resolving a collection of items.
#[derive(Debug, Clone)]
pub struct Resolution<T> {
    /// Selected item per base name, in first-seen order.
    pub latest: IndexMap<String, T>,
    /// Eligible items that lost to a newer (or earlier equal) revision.
    pub superseded: Vec<T>,
    /// Items rejected by the policy before grouping.
    pub excluded: Vec<T>,
}

impl<T> Resolution<T> {
    pub fn eligible_count(&self) -> usize {
        self.latest.len() + self.superseded.len()
    }

    /// The base name → identifier view of this resolution.
    pub fn group(&self, key: impl Fn(&T) -> &str) -> VersionGroup {
        VersionGroup {
            members: self
                .latest
                .iter()
                .map(|(base, item)| (base.clone(), key(item).to_string()))
                .collect(),
        }
    }
}

/// Resolve plain identifiers into a [`VersionGroup`].
pub fn resolve_latest<S: AsRef<str>>(identifiers: &[S], policy: &VersionPolicy) -> VersionGroup {
    resolve_latest_by(identifiers.iter(), |s| s.as_ref(), policy).group(|s| s.as_ref())
}

/// Group `items` by the base name of `key(item)` and keep the highest version.
///
/// A later item replaces the current pick only when its version is strictly
/// greater, so equal versions resolve to the first one seen.
pub fn resolve_latest_by<T, I, F>(items: I, key: F, policy: &VersionPolicy) -> Resolution<T>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> &str,
{
    let mut latest: IndexMap<String, T> = IndexMap::new();
    let mut superseded = Vec::new();
    let mut excluded = Vec::new();

    for item in items {
        let identifier = key(&item);
        if !policy.is_eligible(identifier) {
            tracing::debug!(identifier, policy = policy.name(), "excluded by version policy");
            excluded.push(item);
            continue;
        }

        let parsed = parse(identifier);
        match latest.get_mut(&parsed.base_name) {
            Some(current) => {
                if parsed.version > extract_version(key(current)) {
                    let older = std::mem::replace(current, item);
                    superseded.push(older);
                } else {
                    superseded.push(item);
                }
            }
            None => {
                latest.insert(parsed.base_name, item);
            }
        }
    }

    Resolution {
        latest,
        superseded,
        excluded,
    }
}
