use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use indexmap::IndexMap;
use time::OffsetDateTime;

use crate::codec::{METADATA_FILENAME, MetadataDocument, sha256_digest};
use crate::error::StorageError;
use crate::model::StickerPack;

const PACKS_DIR: &str = "packs";
const STAGING_DIR: &str = ".staging";

/// Validated asset bytes keyed by the filename they are stored under.
pub type StagedAssets = IndexMap<String, Bytes>;

/// Durable per-identifier pack directories under one root.
///
/// Layout: `<root>/packs/<identifier>/{metadata.json, assets...}`; commits are assembled
/// under `<root>/.staging` and renamed into place in one step.
#[derive(Debug, Clone)]
pub struct PackStore {
    root: PathBuf,
}

impl PackStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self { root: root.into() };
        for dir in [store.packs_dir(), store.staging_dir()] {
            fs::create_dir_all(&dir)
                .map_err(|err| StorageError::io("failed to create store dir", &dir, err))?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pack_dir(&self, identifier: &str) -> PathBuf {
        self.packs_dir().join(identifier)
    }

    fn packs_dir(&self) -> PathBuf {
        self.root.join(PACKS_DIR)
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Persist `pack` with exactly the files in `assets`.
    ///
    /// Readers either see the complete directory or nothing: every file and the metadata
    /// document are written and synced in a staging directory before the rename.
    pub fn commit(
        &self,
        pack: &StickerPack,
        assets: &StagedAssets,
    ) -> Result<OffsetDateTime, StorageError> {
        let dest = self.pack_dir(&pack.identifier);
        if dest.exists() {
            return Err(StorageError::AlreadyCommitted(pack.identifier.clone()));
        }
        check_assets_match(pack, assets, &dest)?;

        let staging_root = self.staging_dir();
        let staging = tempfile::Builder::new()
            .prefix(&format!("{}-", pack.identifier))
            .tempdir_in(&staging_root)
            .map_err(|err| StorageError::io("failed to allocate staging dir in", &staging_root, err))?;

        let mut digests = BTreeMap::new();
        for (filename, bytes) in assets {
            write_synced(&staging.path().join(filename), bytes)?;
            digests.insert(filename.clone(), sha256_digest(bytes));
        }
        let committed_at = OffsetDateTime::now_utc();
        let document = MetadataDocument::new(pack.clone(), committed_at, digests);
        let encoded = document
            .to_bytes()
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        write_synced(&staging.path().join(METADATA_FILENAME), &encoded)?;

        let staged = staging.keep();
        if let Err(err) = fs::rename(&staged, &dest) {
            let _ = fs::remove_dir_all(&staged);
            if dest.exists() {
                return Err(StorageError::AlreadyCommitted(pack.identifier.clone()));
            }
            return Err(StorageError::io("failed to publish pack at", &dest, err));
        }
        tracing::debug!(
            identifier = %pack.identifier,
            path = %dest.display(),
            files = assets.len(),
            "pack directory published"
        );
        Ok(committed_at)
    }

    /// Every intact pack, oldest commit first.
    ///
    /// Directories that fail to parse or whose files disagree with the metadata are
    /// removed. Leftover staging directories from interrupted commits are removed too.
    pub fn load_all(&self) -> Result<Vec<StickerPack>, StorageError> {
        self.sweep_staging();

        let packs_dir = self.packs_dir();
        let entries = fs::read_dir(&packs_dir)
            .map_err(|err| StorageError::io("failed to list", &packs_dir, err))?;
        let mut loaded = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::io("failed to list", &packs_dir, err))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match load_pack_dir(&path) {
                Ok(document) => loaded.push((document.committed_at, document.pack)),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "removing corrupt pack");
                    if let Err(remove_err) = fs::remove_dir_all(&path) {
                        tracing::error!(
                            path = %path.display(),
                            error = %remove_err,
                            "failed to remove corrupt pack"
                        );
                    }
                }
            }
        }
        loaded.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.identifier.cmp(&b.1.identifier))
        });
        Ok(loaded.into_iter().map(|(_, pack)| pack).collect())
    }

    /// Raw bytes of one stored file, `None` when it does not exist.
    ///
    /// The store does not know which files are registered; callers must check that.
    pub fn read_asset(
        &self,
        identifier: &str,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        if !is_plain_segment(identifier) || !is_plain_segment(filename) {
            return Ok(None);
        }
        let path = self.pack_dir(identifier).join(filename);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io("failed to read", &path, err)),
        }
    }

    fn sweep_staging(&self) {
        let staging = self.staging_dir();
        let Ok(entries) = fs::read_dir(&staging) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            tracing::info!(path = %path.display(), "removing abandoned staging dir");
            let _ = fs::remove_dir_all(&path);
        }
    }
}

fn check_assets_match(
    pack: &StickerPack,
    assets: &StagedAssets,
    dest: &Path,
) -> Result<(), StorageError> {
    let corrupt = |reason: String| StorageError::Corrupt {
        path: dest.display().to_string(),
        reason,
    };
    let mut expected = 0;
    for (filename, size) in pack.asset_files() {
        expected += 1;
        if !is_plain_segment(filename) || filename == METADATA_FILENAME {
            return Err(corrupt(format!("`{filename}` is not a valid asset filename")));
        }
        let bytes = assets
            .get(filename)
            .ok_or_else(|| corrupt(format!("no staged bytes for `{filename}`")))?;
        if bytes.len() as u64 != size {
            return Err(corrupt(format!(
                "`{filename}` is {} bytes but metadata says {size}",
                bytes.len()
            )));
        }
    }
    if assets.len() != expected {
        return Err(corrupt("staged files that the pack does not reference".into()));
    }
    Ok(())
}

fn load_pack_dir(path: &Path) -> Result<MetadataDocument, String> {
    let meta_path = path.join(METADATA_FILENAME);
    let raw = fs::read(&meta_path).map_err(|err| format!("cannot read metadata: {err}"))?;
    let document = MetadataDocument::from_slice(&raw).map_err(|err| err.to_string())?;
    let dir_name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
    if document.pack.identifier != dir_name {
        return Err(format!(
            "metadata identifier `{}` does not match directory",
            document.pack.identifier
        ));
    }
    for (filename, size) in document.pack.asset_files() {
        if !is_plain_segment(filename) {
            return Err(format!("`{filename}` is not a valid asset filename"));
        }
        let bytes = fs::read(path.join(filename))
            .map_err(|err| format!("cannot read `{filename}`: {err}"))?;
        if bytes.len() as u64 != size {
            return Err(format!("`{filename}` has unexpected size {}", bytes.len()));
        }
        match document.digests.get(filename) {
            Some(expected) if *expected == sha256_digest(&bytes) => {}
            Some(_) => return Err(format!("`{filename}` digest mismatch")),
            None => return Err(format!("`{filename}` has no recorded digest")),
        }
    }
    Ok(document)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut file =
        File::create(path).map_err(|err| StorageError::io("failed to create", path, err))?;
    file.write_all(bytes)
        .map_err(|err| StorageError::io("failed to write", path, err))?;
    file.sync_all()
        .map_err(|err| StorageError::io("failed to sync", path, err))
}

/// A single path component that cannot climb out of its parent.
fn is_plain_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}
