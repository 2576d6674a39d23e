use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::atomic;
use crate::http::PortraitFetcher;
use crate::id::Identifier;
use crate::wsse::{self, Credentials};

const LOG_PREFIX: &str = "[asset-store]";

/// What happened on a [`AssetStore::fetch_into`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    /// Bytes were downloaded and written.
    Stored,
    /// A complete file was already in place; nothing was downloaded.
    AlreadyPresent,
    /// Download or write failed; the store is unchanged.
    Failed(String),
}

impl AssetOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, AssetOutcome::Stored | AssetOutcome::AlreadyPresent)
    }
}

/// One portrait file per identifier under a fixed directory.
///
/// Files are write-once: a non-empty file is never truncated or replaced.
/// A zero-byte file, left over by a crashed run, counts as absent.
pub struct AssetStore {
    root: PathBuf,
    extension: String,
    fetcher: Arc<dyn PortraitFetcher>,
}

impl AssetStore {
    pub fn new(
        root: impl Into<PathBuf>,
        extension: impl Into<String>,
        fetcher: Arc<dyn PortraitFetcher>,
    ) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            fetcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, id: &Identifier) -> PathBuf {
        self.root.join(self.file_name(id))
    }

    /// Single path component for `id`. Separators and anything else that
    /// is not URL-safe are percent-encoded, so the file always lands
    /// directly under the root.
    pub fn file_name(&self, id: &Identifier) -> String {
        format!("{}.{}", urlencoding::encode(id.as_str()), self.extension)
    }

    pub fn has_complete(&self, id: &Identifier) -> bool {
        match fs::metadata(self.path(id)) {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Download `url` into the slot for `id` unless a complete file is
    /// already there. Never raises.
    pub async fn fetch_into(
        &self,
        id: &Identifier,
        url: &Url,
        credentials: &Credentials,
    ) -> AssetOutcome {
        if self.has_complete(id) {
            log::debug!("{} {} already present", LOG_PREFIX, id);
            return AssetOutcome::AlreadyPresent;
        }

        let headers = match wsse::headers(credentials) {
            Ok(headers) => headers,
            Err(e) => return self.failed(id, e.to_string()),
        };
        let bytes = match self.fetcher.fetch(url, headers).await {
            Ok(bytes) => bytes,
            Err(e) => return self.failed(id, e.to_string()),
        };
        if bytes.is_empty() {
            return self.failed(id, format!("{} returned no data", url));
        }

        self.write(id, &bytes)
    }

    fn write(&self, id: &Identifier, bytes: &[u8]) -> AssetOutcome {
        let path = self.path(id);
        if let Err(e) = self.discard_empty(&path) {
            return self.failed(id, e.to_string());
        }
        match atomic::write_once(&path, bytes) {
            Ok(true) => {
                log::info!(
                    "{} stored {} bytes for {}",
                    LOG_PREFIX,
                    bytes.len(),
                    id
                );
                AssetOutcome::Stored
            }
            // lost a race with another writer
            Ok(false) => AssetOutcome::AlreadyPresent,
            Err(e) => self.failed(id, e.to_string()),
        }
    }

    fn discard_empty(&self, path: &Path) -> std::io::Result<()> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.len() == 0 => {
                log::warn!(
                    "{} removing empty leftover {}",
                    LOG_PREFIX,
                    path.display()
                );
                fs::remove_file(path)
            }
            _ => Ok(()),
        }
    }

    fn failed(&self, id: &Identifier, reason: String) -> AssetOutcome {
        log::warn!("{} could not store {}: {}", LOG_PREFIX, id, reason);
        AssetOutcome::Failed(reason)
    }
}
