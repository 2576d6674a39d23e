use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::id::Identifier;

/// Which provider answered for an identifier.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Directory,
    RemoteApi,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Directory => f.write_str("DIRECTORY"),
            Source::RemoteApi => f.write_str("REMOTE_API"),
        }
    }
}

/// One resolved person.
///
/// Fields the providers return beyond name, identifier and photo are kept
/// verbatim in `extra` and flattened back out on serialization.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(alias = "net_id")]
    pub identifier: Identifier,
    pub full_name: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_link: Option<Url>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProfileRecord {
    pub fn new(
        identifier: Identifier,
        full_name: String,
        source: Source,
        photo_link: Option<Url>,
    ) -> Self {
        Self {
            identifier,
            full_name,
            source,
            photo_link,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// True if the photo reference contains the placeholder sentinel,
    /// or if there is no photo reference at all.
    pub fn lacks_real_photo(&self, placeholder: &str) -> bool {
        match &self.photo_link {
            Some(link) => link.as_str().contains(placeholder),
            None => true,
        }
    }
}
