use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, RosterError};

pub const MAX_IDENTIFIER_LEN: usize = 8;

/// Lowercased person handle used as the key for both the record cache
/// and the asset store.
///
/// Any string of 1..=8 characters is a valid key and is taken literally
/// apart from lowercasing; whitespace is kept. Whether the handle is purely
/// alphanumeric is a caller-side pre-filter, see [`Identifier::is_alphanumeric`].
#[derive(
    Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = raw.to_lowercase();
        let len = normalized.chars().count();
        if len == 0 || len > MAX_IDENTIFIER_LEN {
            return Err(RosterError::InvalidIdentifier(raw.to_owned()));
        }
        Ok(Self(normalized))
    }

    /// Build an identifier from the local part of an email-like address,
    /// dropping every non-alphanumeric character.
    pub fn from_email(address: &str) -> Result<Self> {
        let local = address.split('@').next().unwrap_or_default();
        let stripped: String =
            local.chars().filter(|c| c.is_alphanumeric()).collect();
        Self::new(&stripped)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_alphanumeric(&self) -> bool {
        self.0.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = RosterError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
