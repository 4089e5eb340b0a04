//! Taxon concept identifiers.
//!
//! A GUID is an opaque, globally unique string (usually an LSID such as
//! `urn:lsid:biodiversity.org.au:afd.taxon:1234`). It is the row key of the
//! concept store and the identity field of every index document.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Stable, non-blank taxon concept identifier.
///
/// # Examples
///
/// ```
/// use taxonstore::Guid;
///
/// let guid = Guid::parse("urn:lsid:example.org:taxon:1").unwrap();
/// assert_eq!(guid.as_str(), "urn:lsid:example.org:taxon:1");
/// assert!(Guid::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guid(String);

impl Guid {
    /// Parses a GUID, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidGuid` if the input is blank.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidGuid);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Parses an optional GUID; `None` is treated like a blank string.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidGuid` if the input is absent or blank.
    pub fn parse_opt(raw: Option<&str>) -> Result<Self, ValidationError> {
        raw.map_or(Err(ValidationError::InvalidGuid), Self::parse)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the GUID, returning the owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Guid {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Guid {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.0
    }
}

impl AsRef<str> for Guid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
