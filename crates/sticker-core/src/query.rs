//! Read-only addressing over committed packs.
//!
//! Paths are resolved through a fixed routing table:
//!
//! | path                              | result                          |
//! |-----------------------------------|---------------------------------|
//! | `metadata`                        | every pack, insertion order     |
//! | `metadata/{identifier}`           | one pack                        |
//! | `stickers/{identifier}`           | the pack's stickers, in order   |
//! | `asset/{identifier}/{filename}`   | raw bytes of a registered asset |
//! | `stickers_asset/{identifier}/{filename}` | same as `asset`          |
//!
//! Asset reads only succeed for the tray filename or a sticker filename recorded in the
//! pack; any other name is `NotFound`, whether or not such a file exists on disk.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::imaging::RoleConstraints;
use crate::model::{AssetRole, StickerPack};
use crate::registry::PackRegistry;
use crate::store::PackStore;

/// One pack as exposed to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub sticker_pack_identifier: String,
    pub sticker_pack_name: String,
    pub sticker_pack_publisher: String,
    pub sticker_pack_icon: String,
    pub android_play_store_link: Option<String>,
    pub ios_app_download_link: Option<String>,
    pub sticker_pack_publisher_email: String,
    pub sticker_pack_publisher_website: String,
    pub sticker_pack_privacy_policy_website: String,
    pub sticker_pack_license_agreement_website: String,
    pub image_data_version: String,
    pub whatsapp_will_not_cache_stickers: u8,
    pub sticker_pack_size: u64,
}

impl From<&StickerPack> for MetadataRow {
    fn from(pack: &StickerPack) -> Self {
        Self {
            sticker_pack_identifier: pack.identifier.clone(),
            sticker_pack_name: pack.name.clone(),
            sticker_pack_publisher: pack.publisher.clone(),
            sticker_pack_icon: pack.tray.filename.clone(),
            android_play_store_link: pack.android_play_store_link.clone(),
            ios_app_download_link: pack.ios_app_store_link.clone(),
            sticker_pack_publisher_email: pack.publisher_email.clone(),
            sticker_pack_publisher_website: pack.publisher_website.clone(),
            sticker_pack_privacy_policy_website: pack.privacy_policy_website.clone(),
            sticker_pack_license_agreement_website: pack.license_agreement_website.clone(),
            image_data_version: pack.image_data_version.clone(),
            whatsapp_will_not_cache_stickers: u8::from(pack.avoid_cache),
            sticker_pack_size: pack.total_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerRow {
    pub sticker_file_name: String,
    /// Emoji annotations joined with `,`; empty when there are none.
    pub sticker_emoji: String,
}

impl StickerRow {
    pub fn emojis(&self) -> Vec<&str> {
        if self.sticker_emoji.is_empty() {
            return Vec::new();
        }
        self.sticker_emoji.split(',').collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub role: AssetRole,
    pub content_type: &'static str,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBody {
    Packs(Vec<MetadataRow>),
    Pack(MetadataRow),
    Stickers(Vec<StickerRow>),
    Asset(Asset),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub content_type: String,
    pub body: QueryBody,
}

enum Segment {
    Literal(&'static str),
    Param,
}

type Handler = fn(&QueryService, &[&str]) -> Result<QueryResponse, QueryError>;

struct Route {
    segments: &'static [Segment],
    handler: Handler,
}

static ROUTES: &[Route] = &[
    Route {
        segments: &[Segment::Literal("metadata")],
        handler: QueryService::route_list,
    },
    Route {
        segments: &[Segment::Literal("metadata"), Segment::Param],
        handler: QueryService::route_get,
    },
    Route {
        segments: &[Segment::Literal("stickers"), Segment::Param],
        handler: QueryService::route_stickers,
    },
    Route {
        segments: &[Segment::Literal("asset"), Segment::Param, Segment::Param],
        handler: QueryService::route_asset,
    },
    Route {
        segments: &[
            Segment::Literal("stickers_asset"),
            Segment::Param,
            Segment::Param,
        ],
        handler: QueryService::route_asset,
    },
];

/// Match `path` against the routing table, returning the handler and its parameters.
fn match_route<'p>(path: &'p str) -> Option<(Handler, Vec<&'p str>)> {
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    ROUTES.iter().find_map(|route| {
        if route.segments.len() != parts.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in route.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param => params.push(*part),
            }
        }
        Some((route.handler, params))
    })
}

#[derive(Clone)]
pub struct QueryService {
    registry: Arc<PackRegistry>,
    store: Arc<PackStore>,
    authority: String,
}

impl QueryService {
    pub fn new(registry: Arc<PackRegistry>, store: Arc<PackStore>, authority: impl Into<String>) -> Self {
        Self {
            registry,
            store,
            authority: authority.into(),
        }
    }

    /// Resolve a logical path such as `metadata/pack1`.
    ///
    /// Blocks on file I/O for asset paths.
    pub fn resolve(&self, path: &str) -> Result<QueryResponse, QueryError> {
        let (handler, params) =
            match_route(path).ok_or_else(|| QueryError::UnknownRoute(path.to_string()))?;
        handler(self, &params)
    }

    pub fn list(&self) -> Vec<MetadataRow> {
        self.registry
            .snapshot()
            .iter()
            .map(|pack| MetadataRow::from(pack.as_ref()))
            .collect()
    }

    pub fn get(&self, identifier: &str) -> Result<MetadataRow, QueryError> {
        self.lookup(identifier)
            .map(|pack| MetadataRow::from(pack.as_ref()))
    }

    pub fn stickers(&self, identifier: &str) -> Result<Vec<StickerRow>, QueryError> {
        let pack = self.lookup(identifier)?;
        Ok(pack
            .stickers()
            .iter()
            .map(|sticker| StickerRow {
                sticker_file_name: sticker.image_file_name.clone(),
                sticker_emoji: sticker.emojis.join(","),
            })
            .collect())
    }

    /// Bytes of a registered tray or sticker file.
    pub fn asset(&self, identifier: &str, filename: &str) -> Result<Asset, QueryError> {
        let pack = self.lookup(identifier)?;
        let Some(role) = pack.role_of(filename) else {
            tracing::debug!(identifier, filename, "asset is not registered with the pack");
            return Err(QueryError::NotFound);
        };
        let bytes = self
            .store
            .read_asset(identifier, filename)
            .map_err(|err| QueryError::Unavailable(err.to_string()))?
            .ok_or_else(|| {
                tracing::warn!(identifier, filename, "registered asset is missing from the store");
                QueryError::NotFound
            })?;
        Ok(Asset {
            role,
            content_type: RoleConstraints::for_role(role).storage_kind.mime_type(),
            bytes: Bytes::from(bytes),
        })
    }

    fn lookup(&self, identifier: &str) -> Result<Arc<StickerPack>, QueryError> {
        self.registry.get(identifier).ok_or_else(|| {
            tracing::debug!(identifier, "pack not found");
            QueryError::NotFound
        })
    }

    fn cursor_type(&self, kind: &str, table: &str) -> String {
        format!("vnd.android.cursor.{kind}/vnd.{}.{table}", self.authority)
    }

    fn route_list(&self, _params: &[&str]) -> Result<QueryResponse, QueryError> {
        Ok(QueryResponse {
            content_type: self.cursor_type("dir", "metadata"),
            body: QueryBody::Packs(self.list()),
        })
    }

    fn route_get(&self, params: &[&str]) -> Result<QueryResponse, QueryError> {
        Ok(QueryResponse {
            content_type: self.cursor_type("item", "metadata"),
            body: QueryBody::Pack(self.get(params[0])?),
        })
    }

    fn route_stickers(&self, params: &[&str]) -> Result<QueryResponse, QueryError> {
        Ok(QueryResponse {
            content_type: self.cursor_type("dir", "stickers"),
            body: QueryBody::Stickers(self.stickers(params[0])?),
        })
    }

    fn route_asset(&self, params: &[&str]) -> Result<QueryResponse, QueryError> {
        let asset = self.asset(params[0], params[1])?;
        Ok(QueryResponse {
            content_type: asset.content_type.to_string(),
            body: QueryBody::Asset(asset),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetDescriptor, PackInfo, Sticker};
    use crate::store::StagedAssets;

    struct Fixture {
        service: QueryService,
        store: Arc<PackStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PackStore::open(dir.path()).unwrap());
        let registry = Arc::new(PackRegistry::new());

        let pack = StickerPack::new(
            PackInfo {
                identifier: "pack1".into(),
                name: "Pack".into(),
                publisher: "Someone".into(),
                publisher_email: "a@example.com".into(),
                publisher_website: "https://example.com".into(),
                privacy_policy_website: "https://example.com/privacy".into(),
                license_agreement_website: "https://example.com/license".into(),
                ios_app_store_link: None,
                android_play_store_link: None,
                image_data_version: "1".into(),
                avoid_cache: false,
            },
            AssetDescriptor {
                filename: "tray.png".into(),
                role: AssetRole::Tray,
                size: 4,
            },
            vec![
                Sticker {
                    image_file_name: "sticker_000.webp".into(),
                    emojis: vec!["😀".into(), "🎉".into()],
                    size: 3,
                },
                Sticker {
                    image_file_name: "sticker_001.webp".into(),
                    emojis: vec![],
                    size: 3,
                },
            ],
        );
        let mut assets = StagedAssets::new();
        assets.insert("tray.png".into(), Bytes::from_static(b"tray"));
        assets.insert("sticker_000.webp".into(), Bytes::from_static(b"one"));
        assets.insert("sticker_001.webp".into(), Bytes::from_static(b"two"));
        store.commit(&pack, &assets).unwrap();
        registry.insert(pack);

        Fixture {
            service: QueryService::new(registry, Arc::clone(&store), "com.example.stickers"),
            store,
            _dir: dir,
        }
    }

    #[test]
    fn metadata_routes_return_rows() {
        let fx = fixture();
        let list = fx.service.resolve("metadata").unwrap();
        assert_eq!(
            list.content_type,
            "vnd.android.cursor.dir/vnd.com.example.stickers.metadata"
        );
        let QueryBody::Packs(rows) = list.body else {
            panic!("expected pack rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sticker_pack_size, 10);
        assert_eq!(rows[0].sticker_pack_icon, "tray.png");

        let single = fx.service.resolve("metadata/pack1").unwrap();
        assert_eq!(
            single.content_type,
            "vnd.android.cursor.item/vnd.com.example.stickers.metadata"
        );
        assert_eq!(single.body, QueryBody::Pack(rows[0].clone()));
        assert_eq!(
            fx.service.resolve("metadata/nope").unwrap_err(),
            QueryError::NotFound
        );
    }

    #[test]
    fn sticker_rows_keep_order_and_join_emojis() {
        let fx = fixture();
        let rows = fx.service.stickers("pack1").unwrap();
        assert_eq!(rows[0].sticker_file_name, "sticker_000.webp");
        assert_eq!(rows[0].sticker_emoji, "😀,🎉");
        assert_eq!(rows[0].emojis(), ["😀", "🎉"]);
        assert_eq!(rows[1].sticker_emoji, "");
        assert!(rows[1].emojis().is_empty());
    }

    #[test]
    fn assets_carry_role_content_types() {
        let fx = fixture();
        let tray = fx.service.resolve("asset/pack1/tray.png").unwrap();
        assert_eq!(tray.content_type, "image/png");
        let sticker = fx
            .service
            .resolve("stickers_asset/pack1/sticker_001.webp")
            .unwrap();
        assert_eq!(sticker.content_type, "image/webp");
        let QueryBody::Asset(asset) = sticker.body else {
            panic!("expected asset");
        };
        assert_eq!(&asset.bytes[..], b"two");
        assert_eq!(asset.role, AssetRole::Sticker);
    }

    #[test]
    fn unregistered_files_are_never_served() {
        let fx = fixture();
        std::fs::write(fx.store.pack_dir("pack1").join("secret.txt"), b"x").unwrap();

        for path in [
            "asset/pack1/secret.txt",
            "asset/pack1/metadata.json",
            "asset/pack1/..",
            "asset/nope/tray.png",
        ] {
            assert_eq!(
                fx.service.resolve(path).unwrap_err(),
                QueryError::NotFound,
                "{path}"
            );
        }
    }

    #[test]
    fn paths_outside_the_table_are_unknown() {
        let fx = fixture();
        for path in ["", "metadata/", "asset/pack1", "asset/pack1/../secret.txt", "packs"] {
            assert!(
                matches!(fx.service.resolve(path), Err(QueryError::UnknownRoute(_))),
                "{path}"
            );
        }
    }

    #[test]
    fn metadata_row_survives_json() {
        let fx = fixture();
        let row = fx.service.get("pack1").unwrap();
        let json = serde_json::to_string(&row).unwrap();
        let back: MetadataRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }
}
