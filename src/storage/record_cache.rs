use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::atomic;
use crate::directory::DirectorySource;
use crate::id::Identifier;
use crate::profile::{ProfileRecord, Source};
use crate::{Result, RosterError};

const LOG_PREFIX: &str = "[record-cache]";
const STORAGE_VERSION: i32 = 1;

/// On-disk shape of the cache: a version tag and the sorted entries, so the
/// file diffs cleanly between runs.
#[derive(Serialize, Deserialize)]
struct CacheData {
    version: i32,
    entries: BTreeMap<Identifier, ProfileRecord>,
}

/// Identifier to profile mapping that survives across runs.
///
/// Reading never fails: an absent, unreadable or foreign file gives an empty
/// cache. Nothing is written until [`RecordCache::save`] is called.
pub struct RecordCache {
    path: PathBuf,
    entries: BTreeMap<Identifier, ProfileRecord>,
}

impl RecordCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the cache file and then merge one bulk roster from `directory`.
    pub async fn load(
        path: impl Into<PathBuf>,
        directory: &dyn DirectorySource,
        placeholder: &str,
    ) -> Self {
        let mut cache = Self::read(path);
        match directory.roster().await {
            Ok(records) => {
                let merged = cache.ingest(records, placeholder);
                log::info!(
                    "{} merged {} directory records",
                    LOG_PREFIX,
                    merged
                );
            }
            Err(e) => {
                log::warn!("{} directory roster unavailable: {}", LOG_PREFIX, e)
            }
        }
        cache
    }

    /// Read the cache file only.
    pub fn read(path: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(path);
        match read_fs(&cache.path) {
            Ok(Some(entries)) => {
                log::info!(
                    "{} {} entries read from {}",
                    LOG_PREFIX,
                    entries.len(),
                    cache.path.display()
                );
                cache.entries = entries;
            }
            Ok(None) => {
                log::debug!(
                    "{} no cache at {}, starting empty",
                    LOG_PREFIX,
                    cache.path.display()
                );
            }
            Err(e) => {
                log::warn!(
                    "{} ignoring unreadable cache {}: {}",
                    LOG_PREFIX,
                    cache.path.display(),
                    e
                );
            }
        }
        cache
    }

    /// Drop directory records without a real portrait, then merge the rest.
    /// Returns how many records were merged.
    pub fn ingest(
        &mut self,
        records: Vec<ProfileRecord>,
        placeholder: &str,
    ) -> usize {
        let total = records.len();
        let usable: Vec<ProfileRecord> = records
            .into_iter()
            .filter(|r| !r.lacks_real_photo(placeholder))
            .collect();
        log::debug!(
            "{} {} of {} directory records carry a portrait",
            LOG_PREFIX,
            usable.len(),
            total
        );
        let merged = usable.len();
        self.merge_bulk(usable);
        merged
    }

    /// Insert every record under its identifier. Later records win over
    /// earlier ones and over anything already cached.
    pub fn merge_bulk(&mut self, records: impl IntoIterator<Item = ProfileRecord>) {
        for record in records {
            if let Some(previous) = self.entries.get(&record.identifier) {
                if previous.source == Source::RemoteApi {
                    log::debug!(
                        "{} directory record replaces remote entry for {}",
                        LOG_PREFIX,
                        record.identifier
                    );
                }
            }
            self.entries.insert(record.identifier.clone(), record);
        }
    }

    pub fn get(&self, id: &Identifier) -> Option<&ProfileRecord> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, record: ProfileRecord) {
        self.entries.insert(record.identifier.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the whole mapping as pretty JSON, replacing the previous file
    /// in one step.
    pub fn save(&self) -> Result<()> {
        let data = CacheData {
            version: STORAGE_VERSION,
            entries: self.entries.clone(),
        };
        let mut bytes = serde_json::to_vec_pretty(&data)?;
        bytes.push(b'\n');
        atomic::write_replace(&self.path, &bytes)?;

        log::info!(
            "{} {} entries have been written to {}",
            LOG_PREFIX,
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn read_fs(path: &Path) -> Result<Option<BTreeMap<Identifier, ProfileRecord>>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = fs::File::open(path)?;
    let data: CacheData =
        serde_json::from_reader(std::io::BufReader::new(file))?;
    if data.version != STORAGE_VERSION {
        return Err(RosterError::Storage(
            path.display().to_string(),
            format!(
                "Storage version mismatch: expected {}, got {}",
                STORAGE_VERSION, data.version
            ),
        ));
    }
    Ok(Some(data.entries))
}
