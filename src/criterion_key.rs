use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Position of a criterion inside a rubric: section index, then criterion index.
///
/// Stored documents key ratings and justifications by the text form `"section-criterion"`
/// (e.g. `"0-2"`). That text form only exists at the serde boundary; everything inside the
/// crate works with the two integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CriterionKey {
    pub section: usize,
    pub criterion: usize,
}

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)-(\d+)\s*$").expect("criterion key pattern is valid")
});

impl CriterionKey {
    /// Key of criterion `criterion` in section `section`, both zero-based.
    pub fn new(section: usize, criterion: usize) -> Self {
        CriterionKey { section, criterion }
    }
}

impl fmt::Display for CriterionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.section, self.criterion)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A stored key that is not of the form `"<section>-<criterion>"`.
pub struct ParseCriterionKeyError(pub String);

impl fmt::Display for ParseCriterionKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid criterion key {:?}", self.0)
    }
}

impl std::error::Error for ParseCriterionKeyError {}

impl FromStr for CriterionKey {
    type Err = ParseCriterionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = KEY_PATTERN
            .captures(s)
            .ok_or_else(|| ParseCriterionKeyError(s.to_string()))?;
        let section = captures[1]
            .parse()
            .map_err(|_| ParseCriterionKeyError(s.to_string()))?;
        let criterion = captures[2]
            .parse()
            .map_err(|_| ParseCriterionKeyError(s.to_string()))?;
        Ok(CriterionKey { section, criterion })
    }
}

impl Serialize for CriterionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CriterionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
