//! Versioned on-disk form of a committed pack.
//!
//! The document wraps the [`StickerPack`] record with the commit timestamp and a
//! digest per asset file. Raw image bytes never appear in it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::StickerPack;

pub const FORMAT_VERSION: u32 = 1;
pub const METADATA_FILENAME: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub format_version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub committed_at: OffsetDateTime,
    pub digests: BTreeMap<String, String>,
    pub pack: StickerPack,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("metadata is not valid JSON: {0}")]
    Malformed(String),

    #[error("unsupported metadata format version {0}")]
    UnsupportedVersion(u64),

    #[error("recorded total size {recorded} does not match assets ({computed})")]
    SizeMismatch { recorded: u64, computed: u64 },
}

impl MetadataDocument {
    pub fn new(
        pack: StickerPack,
        committed_at: OffsetDateTime,
        digests: BTreeMap<String, String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            committed_at,
            digests,
            pack,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let raw: Value =
            serde_json::from_slice(bytes).map_err(|err| DocumentError::Malformed(err.to_string()))?;
        let version = raw
            .get("format_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| DocumentError::Malformed("format_version is missing".into()))?;
        if version != u64::from(FORMAT_VERSION) {
            return Err(DocumentError::UnsupportedVersion(version));
        }
        let doc: Self =
            serde_json::from_value(raw).map_err(|err| DocumentError::Malformed(err.to_string()))?;
        let computed = doc.pack.computed_size();
        if doc.pack.total_size() != computed {
            return Err(DocumentError::SizeMismatch {
                recorded: doc.pack.total_size(),
                computed,
            });
        }
        Ok(doc)
    }
}

pub fn sha256_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::model::{AssetDescriptor, AssetRole, PackInfo, Sticker};

    fn pack() -> StickerPack {
        StickerPack::new(
            PackInfo {
                identifier: "pack1".into(),
                name: "Pack".into(),
                publisher: "Someone".into(),
                publisher_email: "a@example.com".into(),
                publisher_website: "https://example.com".into(),
                privacy_policy_website: "https://example.com/privacy".into(),
                license_agreement_website: "https://example.com/license".into(),
                ios_app_store_link: None,
                android_play_store_link: Some("https://play.example.com".into()),
                image_data_version: "1".into(),
                avoid_cache: false,
            },
            AssetDescriptor {
                filename: "tray.png".into(),
                role: AssetRole::Tray,
                size: 10_000,
            },
            vec![Sticker {
                image_file_name: "sticker_000.webp".into(),
                emojis: vec!["😀".into()],
                size: 40_000,
            }],
        )
    }

    #[test]
    fn document_survives_a_write_read_cycle() {
        let mut digests = BTreeMap::new();
        digests.insert("tray.png".to_string(), sha256_digest(b"tray"));
        let doc = MetadataDocument::new(pack(), datetime!(2026-01-02 03:04:05 UTC), digests);
        let bytes = doc.to_bytes().unwrap();
        let back = MetadataDocument::from_slice(&bytes).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.pack.total_size(), 50_000);
    }

    #[test]
    fn newer_format_versions_are_refused() {
        let doc = MetadataDocument::new(pack(), datetime!(2026-01-02 03:04:05 UTC), BTreeMap::new());
        let mut raw = serde_json::to_value(&doc).unwrap();
        raw["format_version"] = 2.into();
        let err = MetadataDocument::from_slice(&serde_json::to_vec(&raw).unwrap()).unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedVersion(2)));
    }

    #[test]
    fn tampered_total_size_is_detected() {
        let doc = MetadataDocument::new(pack(), datetime!(2026-01-02 03:04:05 UTC), BTreeMap::new());
        let mut raw = serde_json::to_value(&doc).unwrap();
        raw["pack"]["total_size"] = 1.into();
        let err = MetadataDocument::from_slice(&serde_json::to_vec(&raw).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            DocumentError::SizeMismatch {
                recorded: 1,
                computed: 50_000
            }
        ));
    }

    #[test]
    fn digest_is_prefixed_hex() {
        let digest = sha256_digest(b"");
        assert_eq!(
            digest,
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
