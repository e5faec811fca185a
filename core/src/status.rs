#![deny(missing_docs)]

//! # Status-Code Partitioning
//!
//! Resolves the response keys of one operation (`200`, `4XX`, `default`) into
//! disjoint sets of concrete status codes.
//!
//! Exact codes claim first, then classes, then `default`. Inside a tier the
//! declaration order decides, which is why `status_kind_comparer` only ranks
//! tiers and relies on a stable sort for the rest.

use crate::error::{AppError, AppResult};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

/// Every status code a response key can claim.
pub const STATUS_CODES: RangeInclusive<u16> = 100..=599;

/// A declared response grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// An exact three-digit code.
    Code(u16),
    /// Every code sharing the leading digit (`4XX` -> `Class(4)`).
    Class(u8),
    /// The `default` marker.
    Default,
}

impl StatusKind {
    /// Parses a response key as written in the document.
    pub fn parse(key: &str) -> AppResult<Self> {
        static CLASS_RE: OnceLock<Regex> = OnceLock::new();
        let class_re =
            CLASS_RE.get_or_init(|| Regex::new(r"^([1-5])[xX]{2}$").expect("Invalid regex"));

        if key == "default" {
            return Ok(Self::Default);
        }
        if let Some(caps) = class_re.captures(key) {
            let digit = caps[1].parse::<u8>().map_err(|e| {
                AppError::Document(format!("Invalid status class '{}': {}", key, e))
            })?;
            return Ok(Self::Class(digit));
        }
        if key.len() == 3 && key.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(code) = key.parse::<u16>() {
                if STATUS_CODES.contains(&code) {
                    return Ok(Self::Code(code));
                }
            }
        }
        Err(AppError::Document(format!(
            "Invalid response status key '{}'",
            key
        )))
    }

    /// Precedence tier: exact codes, then classes, then default.
    pub fn tier(&self) -> u8 {
        match self {
            Self::Code(_) => 0,
            Self::Class(_) => 1,
            Self::Default => 2,
        }
    }

    /// True when `code` belongs to this key before any claiming happens.
    pub fn covers(&self, code: u16) -> bool {
        match self {
            Self::Code(own) => *own == code,
            Self::Class(digit) => code / 100 == u16::from(*digit),
            Self::Default => true,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{}", code),
            Self::Class(digit) => write!(f, "{}XX", digit),
            Self::Default => f.write_str("default"),
        }
    }
}

impl Serialize for StatusKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Orders response keys by precedence tier only.
///
/// Keys of the same tier compare `Equal`; sort with a stable sort so they
/// keep their declaration order. Unparseable keys sort last.
pub fn status_kind_comparer(a: &str, b: &str) -> Ordering {
    let rank = |key: &str| StatusKind::parse(key).map(|k| k.tier()).unwrap_or(u8::MAX);
    rank(a).cmp(&rank(b))
}

/// Sorts keys in place with `status_kind_comparer`.
pub fn sort_status_keys<S: AsRef<str>>(keys: &mut [S]) {
    keys.sort_by(|a, b| status_kind_comparer(a.as_ref(), b.as_ref()));
}

/// Resolves the declared keys of one operation into disjoint code sets.
///
/// The result is in processing order (sorted by `status_kind_comparer`). A key
/// that finds nothing left in the pool resolves to an empty set.
pub fn partition_status_codes<S: AsRef<str>>(
    keys: &[S],
) -> AppResult<Vec<(String, StatusKind, BTreeSet<u16>)>> {
    let mut parsed = keys
        .iter()
        .map(|key| Ok((key.as_ref().to_string(), StatusKind::parse(key.as_ref())?)))
        .collect::<AppResult<Vec<_>>>()?;
    parsed.sort_by_key(|(_, kind)| kind.tier());

    let mut pool: BTreeSet<u16> = STATUS_CODES.collect();
    let mut out = Vec::with_capacity(parsed.len());
    for (key, kind) in parsed {
        let claimed = take_status_codes(&mut pool, kind);
        out.push((key, kind, claimed));
    }
    Ok(out)
}

/// Removes and returns every pool member `kind` covers.
pub fn take_status_codes(pool: &mut BTreeSet<u16>, kind: StatusKind) -> BTreeSet<u16> {
    let claimed: BTreeSet<u16> = pool.iter().copied().filter(|c| kind.covers(*c)).collect();
    for code in &claimed {
        pool.remove(code);
    }
    claimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(StatusKind::parse("200").unwrap(), StatusKind::Code(200));
        assert_eq!(StatusKind::parse("4XX").unwrap(), StatusKind::Class(4));
        assert_eq!(StatusKind::parse("5xx").unwrap(), StatusKind::Class(5));
        assert_eq!(StatusKind::parse("default").unwrap(), StatusKind::Default);
        assert!(StatusKind::parse("600").is_err());
        assert!(StatusKind::parse("6XX").is_err());
        assert!(StatusKind::parse("20").is_err());
        assert!(StatusKind::parse("Default").is_err());
    }

    #[test]
    fn test_partition_is_disjoint_and_covering() {
        let parts = partition_status_codes(&["default", "4XX", "200"]).unwrap();
        let keys: Vec<&str> = parts.iter().map(|(k, _, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["200", "4XX", "default"]);

        let ok = &parts[0].2;
        let client = &parts[1].2;
        let rest = &parts[2].2;
        assert_eq!(ok.iter().copied().collect::<Vec<_>>(), vec![200]);
        assert_eq!(client.len(), 100);
        assert!(client.iter().all(|c| (400..=499).contains(c)));
        assert!(ok.is_disjoint(client));
        assert!(ok.is_disjoint(rest));
        assert!(client.is_disjoint(rest));

        let mut union = BTreeSet::new();
        union.extend(ok);
        union.extend(client);
        union.extend(rest);
        assert_eq!(union, STATUS_CODES.collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_exact_code_inside_class_is_excluded_from_class() {
        let parts = partition_status_codes(&["4XX", "404"]).unwrap();
        assert_eq!(parts[0].0, "404");
        assert_eq!(parts[1].2.len(), 99);
        assert!(!parts[1].2.contains(&404));
    }

    #[test]
    fn test_only_default_claims_everything() {
        let parts = partition_status_codes(&["default"]).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].2, STATUS_CODES.collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_exhausted_key_resolves_to_empty_set() {
        let mut keys: Vec<String> = (200..=299).map(|c| c.to_string()).collect();
        keys.push("2XX".to_string());
        let parts = partition_status_codes(&keys).unwrap();
        let last = parts.last().unwrap();
        assert_eq!(last.0, "2XX");
        assert!(last.2.is_empty());
    }

    #[test]
    fn test_comparer_keeps_declaration_order_within_tier() {
        let mut keys = vec!["default", "404", "2XX", "200", "4XX"];
        sort_status_keys(&mut keys);
        assert_eq!(keys, vec!["404", "200", "2XX", "4XX", "default"]);
    }
}
