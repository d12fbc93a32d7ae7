//! Friendly identifiers
//!
//! ID Format: `{Prefix}-{digits}` (e.g., `T-00042`, `C-007`, `A-1`).
//! - Prefix: one or more ASCII letters, one per entity type
//! - Digits: a sequence number, zero-padded to a fixed width
//!
//! The width is whatever the original ID used, so `T-00042` renumbered to 43
//! becomes `T-00043`. Numbers that outgrow the width simply get longer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid friendly ID format: expected '{{Letters}}-{{digits}}', got '{0}'")]
    InvalidFriendlyId(String),

    #[error("Friendly ID sequence out of range: {0}")]
    SequenceOverflow(String),
}

/// A parsed human-facing ID such as `T-00001`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FriendlyId {
    prefix: String,
    number: u64,
    width: usize,
}

impl FriendlyId {
    /// Creates an ID from its parts
    pub fn new(prefix: impl Into<String>, number: u64, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            number,
            width,
        }
    }

    /// Returns the letter prefix (e.g., `T`)
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the numeric sequence
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Returns the zero-padding width of the numeric part
    pub fn width(&self) -> usize {
        self.width
    }

    /// Same prefix and padding, different sequence number
    pub fn with_number(&self, number: u64) -> Self {
        Self {
            prefix: self.prefix.clone(),
            number,
            width: self.width,
        }
    }

    /// Returns the ID following `max`, keeping this ID's prefix and width
    pub fn successor_of(&self, max: u64) -> Result<Self, IdError> {
        let next = max
            .checked_add(1)
            .ok_or_else(|| IdError::SequenceOverflow(self.to_string()))?;
        Ok(self.with_number(next))
    }
}

impl fmt::Display for FriendlyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:0width$}", self.prefix, self.number, width = self.width)
    }
}

impl FromStr for FriendlyId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, digits) = s
            .split_once('-')
            .ok_or_else(|| IdError::InvalidFriendlyId(s.to_string()))?;

        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(IdError::InvalidFriendlyId(s.to_string()));
        }

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdError::InvalidFriendlyId(s.to_string()));
        }

        let number = digits
            .parse::<u64>()
            .map_err(|_| IdError::SequenceOverflow(s.to_string()))?;

        Ok(Self {
            prefix: prefix.to_string(),
            number,
            width: digits.len(),
        })
    }
}

impl TryFrom<String> for FriendlyId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FriendlyId> for String {
    fn from(id: FriendlyId) -> Self {
        id.to_string()
    }
}

/// Highest sequence number among well-formed IDs carrying `prefix`
///
/// Malformed IDs and IDs with other prefixes are ignored.
pub fn max_sequence<'a>(prefix: &str, ids: impl IntoIterator<Item = &'a str>) -> Option<u64> {
    ids.into_iter()
        .filter_map(|s| s.parse::<FriendlyId>().ok())
        .filter(|id| id.prefix() == prefix)
        .map(|id| id.number())
        .max()
}
