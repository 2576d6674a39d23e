//! Hand-off to the deck packager: every resolved person whose portrait is
//! on disk becomes one note, and the portrait becomes a media file named
//! relative to `media_dir`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::atomic;
use crate::id::Identifier;
use crate::profile::ProfileRecord;
use crate::resolver::Resolution;
use crate::storage::AssetStore;
use crate::Result;

#[derive(Serialize, Debug, PartialEq)]
pub struct Note {
    pub name: String,
    pub identifier: Identifier,
}

#[derive(Serialize, Debug)]
pub struct Manifest {
    pub deck: String,
    pub notes: Vec<Note>,
    pub media_dir: PathBuf,
    pub media: Vec<String>,
    /// Resolved people left out because their portrait is missing.
    pub skipped: Vec<Identifier>,
}

impl Manifest {
    pub fn build<'a>(
        deck: &str,
        records: impl IntoIterator<Item = &'a ProfileRecord>,
        assets: &AssetStore,
    ) -> Self {
        let mut manifest = Self {
            deck: deck.to_owned(),
            notes: Vec::new(),
            media_dir: assets.root().to_path_buf(),
            media: Vec::new(),
            skipped: Vec::new(),
        };
        for record in records {
            if !assets.has_complete(&record.identifier) {
                manifest.skipped.push(record.identifier.clone());
                continue;
            }
            manifest.notes.push(Note {
                name: record.full_name.clone(),
                identifier: record.identifier.clone(),
            });
            manifest.media.push(assets.file_name(&record.identifier));
        }
        manifest
    }

    pub fn from_resolutions(
        deck: &str,
        resolutions: &[(String, Resolution)],
        assets: &AssetStore,
    ) -> Self {
        Self::build(
            deck,
            resolutions
                .iter()
                .filter_map(|(_, resolution)| resolution.record()),
            assets,
        )
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        atomic::write_replace(path, &bytes)?;
        Ok(())
    }
}
