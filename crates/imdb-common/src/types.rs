//! Common types used across the workspace

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// Normalized IMDb title identifier (`tt` followed by 7 or 8 digits).
///
/// Accepts the bare numeric form as well, so `"0000001"` and `"tt0000001"`
/// parse to the same id.
///
/// # Examples
///
/// ```rust
/// use imdb_common::ImdbId;
///
/// let id: ImdbId = "0000001".parse().unwrap();
/// assert_eq!(id.as_str(), "tt0000001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImdbId(String);

impl ImdbId {
    pub const PREFIX: &'static str = "tt";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric part without the `tt` prefix
    pub fn digits(&self) -> &str {
        &self.0[Self::PREFIX.len()..]
    }
}

impl std::str::FromStr for ImdbId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(Self::PREFIX).unwrap_or(s);

        let valid = (7..=8).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit());
        if !valid {
            return Err(CommonError::InvalidImdbId(s.to_string()));
        }

        Ok(Self(format!("{}{}", Self::PREFIX, digits)))
    }
}

impl TryFrom<String> for ImdbId {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImdbId> for String {
    fn from(id: ImdbId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ImdbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImdbId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
