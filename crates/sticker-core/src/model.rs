use std::fmt;

use serde::{Deserialize, Serialize};

/// Which slot of a pack an image occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    Tray,
    Sticker,
}

impl AssetRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tray => "tray",
            Self::Sticker => "sticker",
        }
    }
}

impl fmt::Display for AssetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A persisted asset file and the slot it fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub filename: String,
    pub role: AssetRole,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    pub image_file_name: String,
    #[serde(default)]
    pub emojis: Vec<String>,
    pub size: u64,
}

/// A committed (or about to be committed) sticker pack.
///
/// `total_size` always equals the tray size plus the size of every sticker; it is
/// recomputed by every method that changes the sticker sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerPack {
    pub identifier: String,
    pub name: String,
    pub publisher: String,
    pub publisher_email: String,
    pub publisher_website: String,
    pub privacy_policy_website: String,
    pub license_agreement_website: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_app_store_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android_play_store_link: Option<String>,
    pub image_data_version: String,
    pub avoid_cache: bool,
    pub tray: AssetDescriptor,
    stickers: Vec<Sticker>,
    total_size: u64,
}

/// Publisher-facing fields shared by a description and the pack built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackInfo {
    pub identifier: String,
    pub name: String,
    pub publisher: String,
    pub publisher_email: String,
    pub publisher_website: String,
    pub privacy_policy_website: String,
    pub license_agreement_website: String,
    pub ios_app_store_link: Option<String>,
    pub android_play_store_link: Option<String>,
    pub image_data_version: String,
    pub avoid_cache: bool,
}

impl StickerPack {
    pub fn new(info: PackInfo, tray: AssetDescriptor, stickers: Vec<Sticker>) -> Self {
        let mut pack = Self {
            identifier: info.identifier,
            name: info.name,
            publisher: info.publisher,
            publisher_email: info.publisher_email,
            publisher_website: info.publisher_website,
            privacy_policy_website: info.privacy_policy_website,
            license_agreement_website: info.license_agreement_website,
            ios_app_store_link: info.ios_app_store_link,
            android_play_store_link: info.android_play_store_link,
            image_data_version: info.image_data_version,
            avoid_cache: info.avoid_cache,
            tray,
            stickers: Vec::new(),
            total_size: 0,
        };
        pack.set_stickers(stickers);
        pack
    }

    pub fn stickers(&self) -> &[Sticker] {
        &self.stickers
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn set_stickers(&mut self, stickers: Vec<Sticker>) {
        self.stickers = stickers;
        self.recompute_size();
    }

    pub fn push_sticker(&mut self, sticker: Sticker) {
        self.stickers.push(sticker);
        self.recompute_size();
    }

    /// Size the pack should report given its current assets.
    pub fn computed_size(&self) -> u64 {
        self.tray.size + self.stickers.iter().map(|s| s.size).sum::<u64>()
    }

    fn recompute_size(&mut self) {
        self.total_size = self.computed_size();
    }

    /// Role of `filename` within this pack, if it is a registered asset.
    pub fn role_of(&self, filename: &str) -> Option<AssetRole> {
        if self.tray.filename == filename {
            return Some(AssetRole::Tray);
        }
        self.stickers
            .iter()
            .any(|sticker| sticker.image_file_name == filename)
            .then_some(AssetRole::Sticker)
    }

    /// Every asset file the pack references, tray first.
    pub fn asset_files(&self) -> impl Iterator<Item = (&str, u64)> {
        std::iter::once((self.tray.filename.as_str(), self.tray.size)).chain(
            self.stickers
                .iter()
                .map(|sticker| (sticker.image_file_name.as_str(), sticker.size)),
        )
    }
}

/// One sticker entry of a build request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerSource {
    pub url: String,
    #[serde(default)]
    pub emojis: Vec<String>,
}

/// Declarative build request for a pack; image sources are URIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackDescription {
    pub identifier: String,
    pub title: String,
    pub author: String,
    #[serde(alias = "trayImage")]
    pub tray_image_source: String,
    pub publisher_email: String,
    #[serde(alias = "publisherURL")]
    pub publisher_website: String,
    #[serde(alias = "privacyPolicyURL")]
    pub privacy_policy_website: String,
    #[serde(alias = "licenseURL")]
    pub license_website: String,
    pub stickers: Vec<StickerSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_store_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android_store_link: Option<String>,
}

pub const MAX_IDENTIFIER_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 128;
pub const MAX_STICKERS: usize = 30;
pub const MAX_EMOJIS: usize = 3;

impl PackDescription {
    /// Cheap structural checks done before any network or disk work.
    pub fn check(&self) -> Result<(), String> {
        check_identifier(&self.identifier)?;
        check_text("title", &self.title)?;
        check_text("author", &self.author)?;
        if self.tray_image_source.trim().is_empty() {
            return Err("tray image source is empty".into());
        }
        if self.stickers.is_empty() || self.stickers.len() > MAX_STICKERS {
            return Err(format!(
                "a pack needs between 1 and {MAX_STICKERS} stickers, got {}",
                self.stickers.len()
            ));
        }
        for (index, sticker) in self.stickers.iter().enumerate() {
            if sticker.url.trim().is_empty() {
                return Err(format!("sticker {index} has an empty url"));
            }
            if sticker.emojis.len() > MAX_EMOJIS {
                return Err(format!(
                    "sticker {index} has {} emojis, at most {MAX_EMOJIS} are allowed",
                    sticker.emojis.len()
                ));
            }
            // rows carry the annotations comma-joined
            if let Some(bad) = sticker
                .emojis
                .iter()
                .find(|emoji| emoji.is_empty() || emoji.contains(','))
            {
                return Err(format!(
                    "sticker {index} has an invalid emoji annotation {bad:?}"
                ));
            }
        }
        Ok(())
    }

    pub fn info(&self, image_data_version: &str) -> PackInfo {
        PackInfo {
            identifier: self.identifier.clone(),
            name: self.title.clone(),
            publisher: self.author.clone(),
            publisher_email: self.publisher_email.clone(),
            publisher_website: self.publisher_website.clone(),
            privacy_policy_website: self.privacy_policy_website.clone(),
            license_agreement_website: self.license_website.clone(),
            ios_app_store_link: self.ios_store_link.clone(),
            android_play_store_link: self.android_store_link.clone(),
            image_data_version: image_data_version.to_string(),
            avoid_cache: false,
        }
    }
}

/// Identifiers become directory names, so only a conservative charset is accepted.
pub fn check_identifier(identifier: &str) -> Result<(), String> {
    if identifier.is_empty() {
        return Err("identifier is empty".into());
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "identifier is longer than {MAX_IDENTIFIER_LEN} characters"
        ));
    }
    if identifier == "." || identifier == ".." {
        return Err(format!("identifier `{identifier}` is reserved"));
    }
    if let Some(bad) = identifier
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')))
    {
        return Err(format!("identifier contains invalid character `{bad}`"));
    }
    Ok(())
}

fn check_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is empty"));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(format!("{field} is longer than {MAX_NAME_LEN} characters"));
    }
    Ok(())
}
