//! Key names and restore targets.
//!
//! Keys are `/`-separated paths. A target is either one literal key or a
//! prefix ending in `/`; the two never match each other, so `/a` and `/a/x`
//! are disjoint targets.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RewindError, RewindResult};

/// Path separator for hierarchical keys.
pub const SEPARATOR: char = '/';

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/?[A-Za-z0-9_.\-/]+$").expect("valid key pattern"));

/// Validate a literal key name.
pub fn validate_key(key: &str) -> RewindResult<()> {
    if key.is_empty() {
        return Err(RewindError::invalid_key(key, "empty"));
    }
    if key.ends_with(SEPARATOR) {
        return Err(RewindError::invalid_key(key, "keys cannot end with '/'"));
    }
    if key.contains("//") {
        return Err(RewindError::invalid_key(key, "empty path segment"));
    }
    if !KEY_PATTERN.is_match(key) {
        return Err(RewindError::invalid_key(key, "unsupported characters"));
    }
    Ok(())
}

/// What a preview or restore operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Target {
    /// Exactly one key.
    Key(String),
    /// Every key strictly under this prefix. Always ends with `/`.
    Prefix(String),
}

impl Target {
    /// Parse user input: a trailing `/` makes a prefix, anything else a key.
    pub fn parse(input: &str) -> RewindResult<Self> {
        let input = input.trim();
        if input == "/" {
            return Ok(Self::Prefix(input.to_string()));
        }
        match input.strip_suffix(SEPARATOR) {
            Some(stem) => {
                validate_key(stem)?;
                Ok(Self::Prefix(input.to_string()))
            }
            None => {
                validate_key(input)?;
                Ok(Self::Key(input.to_string()))
            }
        }
    }

    /// The scope to list versions under.
    pub fn scope(&self) -> &str {
        match self {
            Self::Key(name) | Self::Prefix(name) => name,
        }
    }

    /// Whether this target names a prefix.
    pub fn is_prefix(&self) -> bool {
        matches!(self, Self::Prefix(_))
    }

    /// Whether `key` belongs to this target.
    ///
    /// With `recurse = false` a prefix only matches its immediate children.
    pub fn matches(&self, key: &str, recurse: bool) -> bool {
        match self {
            Self::Key(name) => name == key,
            Self::Prefix(prefix) => match key.strip_prefix(prefix.as_str()) {
                Some(rest) if !rest.is_empty() => recurse || !rest.contains(SEPARATOR),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_and_prefix() {
        assert_eq!(Target::parse("/a").unwrap(), Target::Key("/a".into()));
        assert_eq!(Target::parse("/a/").unwrap(), Target::Prefix("/a/".into()));
        assert_eq!(Target::parse("/").unwrap(), Target::Prefix("/".into()));
        assert_eq!(Target::parse("plain").unwrap(), Target::Key("plain".into()));
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(Target::parse("").is_err());
        assert!(Target::parse("/a//b").is_err());
        assert!(Target::parse("/a b").is_err());
        assert!(Target::parse("/a//").is_err());
    }

    #[test]
    fn test_key_does_not_match_children() {
        let target = Target::parse("/a").unwrap();
        assert!(target.matches("/a", true));
        assert!(!target.matches("/a/x", true));
        assert!(!target.matches("/ab", true));
    }

    #[test]
    fn test_prefix_never_matches_itself() {
        let target = Target::parse("/a/").unwrap();
        assert!(!target.matches("/a", true));
        assert!(!target.matches("/a/", true));
        assert!(target.matches("/a/x", false));
        assert!(!target.matches("/ab/x", true));
    }

    #[test]
    fn test_prefix_depth() {
        let target = Target::parse("/a/").unwrap();
        assert!(target.matches("/a/b/1", true));
        assert!(!target.matches("/a/b/1", false));
    }
}
