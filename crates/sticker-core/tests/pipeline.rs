use std::collections::HashMap;
use std::io::{Cursor, ErrorKind};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use sticker_core::fetch::FetchPolicy;
use sticker_core::{
    AssetRole, BuildError, BuildSettings, Dimensions, FetchError, FetcherRegistry, PackBuilder,
    PackDescription, PackRegistry, PackStore, QueryBody, QueryService, RasterCodec, StickerSource,
    ValidationError,
};
use tiny_http::{Response, Server};

fn encode(side: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(side, side, Rgba([20, 140, 60, 255])));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// Serves fixed bodies by path from a background thread; unknown paths are 404.
struct ImageServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl ImageServer {
    fn start(files: HashMap<&'static str, Vec<u8>>) -> Result<Option<Self>> {
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                eprintln!("skipping http pipeline test: {err}");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let addr = listener.local_addr()?;
        let server =
            Server::from_listener(listener, None).map_err(|err| anyhow!("server error: {err}"))?;
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            while let Ok(request) = server.recv() {
                counter.fetch_add(1, Ordering::SeqCst);
                let path = request.url().trim_start_matches('/').to_string();
                let _ = match files.get(path.as_str()) {
                    Some(body) => request.respond(Response::from_data(body.clone())),
                    None => request.respond(Response::empty(404)),
                };
            }
        });
        Ok(Some(Self { addr, hits }))
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/{path}", self.addr)
    }
}

fn description(server: &ImageServer, stickers: &[&str]) -> PackDescription {
    PackDescription {
        identifier: "pack1".into(),
        title: "Garden".into(),
        author: "Someone".into(),
        tray_image_source: server.url("tray.png"),
        publisher_email: "a@example.com".into(),
        publisher_website: "https://example.com".into(),
        privacy_policy_website: "https://example.com/privacy".into(),
        license_website: "https://example.com/license".into(),
        stickers: stickers
            .iter()
            .map(|path| StickerSource {
                url: server.url(path),
                emojis: vec!["🌱".into()],
            })
            .collect(),
        ios_store_link: None,
        android_store_link: Some("https://play.example.com/garden".into()),
    }
}

fn builder(store: Arc<PackStore>, registry: Arc<PackRegistry>) -> Result<PackBuilder> {
    let policy = FetchPolicy {
        timeout: Duration::from_secs(5),
        attempts: 2,
        backoff_base_ms: 10,
        ..FetchPolicy::default()
    };
    Ok(PackBuilder::new(
        registry,
        store,
        Arc::new(FetcherRegistry::with_builtin(policy)?),
        Arc::new(RasterCodec::new()),
        BuildSettings::default(),
    ))
}

fn image_files() -> HashMap<&'static str, Vec<u8>> {
    let mut files = HashMap::new();
    files.insert("tray.png", encode(96, ImageFormat::Png));
    files.insert("leaf.webp", encode(512, ImageFormat::WebP));
    files.insert("flower.png", encode(512, ImageFormat::Png));
    files.insert("huge-tray.png", encode(512, ImageFormat::Png));
    files.insert("bloated.webp", vec![0_u8; 300 * 1024]);
    let mut canvas = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image::GrayImage::new(2048, 2048))
        .write_to(&mut canvas, ImageFormat::Png)
        .unwrap();
    files.insert("canvas.png", canvas.into_inner());
    files
}

#[tokio::test]
async fn builds_over_http_and_survives_a_restart() -> Result<()> {
    let Some(server) = ImageServer::start(image_files())? else {
        return Ok(());
    };
    let temp = tempfile::tempdir()?;
    let store = Arc::new(PackStore::open(temp.path())?);
    let registry = Arc::new(PackRegistry::new());

    let pack = builder(Arc::clone(&store), Arc::clone(&registry))?
        .build(description(&server, &["leaf.webp", "flower.png"]))
        .await?;
    assert_eq!(pack.stickers().len(), 2);
    let on_disk: u64 = pack
        .asset_files()
        .map(|(name, _)| std::fs::metadata(store.pack_dir("pack1").join(name)).map(|m| m.len()))
        .sum::<std::io::Result<u64>>()?;
    assert_eq!(pack.total_size(), on_disk);

    let served = QueryService::new(Arc::clone(&registry), Arc::clone(&store), "garden")
        .get("pack1")?;

    // A fresh process sees the same pack, with the PNG sticker stored as WEBP.
    let reloaded = Arc::new(PackRegistry::load(&store)?);
    let query = QueryService::new(reloaded, Arc::clone(&store), "garden");
    assert_eq!(query.get("pack1")?, served);
    let response = query.resolve("asset/pack1/sticker_001.webp")?;
    assert_eq!(response.content_type, "image/webp");
    let QueryBody::Asset(asset) = response.body else {
        return Err(anyhow!("expected asset body"));
    };
    assert_eq!(&asset.bytes[..4], b"RIFF");
    assert_eq!(&asset.bytes[8..12], b"WEBP");
    Ok(())
}

#[tokio::test]
async fn missing_sticker_leaves_nothing_behind() -> Result<()> {
    let Some(server) = ImageServer::start(image_files())? else {
        return Ok(());
    };
    let temp = tempfile::tempdir()?;
    let store = Arc::new(PackStore::open(temp.path())?);
    let registry = Arc::new(PackRegistry::new());
    let builder = builder(Arc::clone(&store), Arc::clone(&registry))?;

    let err = builder
        .build(description(&server, &["leaf.webp", "missing.webp"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BuildError::Network(FetchError::Status { status: 404, .. })
    ));
    assert!(registry.is_empty());
    assert!(store.load_all()?.is_empty());

    let hits_before_retry = server.hits.load(Ordering::SeqCst);
    builder
        .build(description(&server, &["leaf.webp"]))
        .await?;
    assert!(registry.contains("pack1"));
    assert!(server.hits.load(Ordering::SeqCst) > hits_before_retry);
    Ok(())
}

#[tokio::test]
async fn wrong_tray_dimensions_are_rejected() -> Result<()> {
    let Some(server) = ImageServer::start(image_files())? else {
        return Ok(());
    };
    let temp = tempfile::tempdir()?;
    let store = Arc::new(PackStore::open(temp.path())?);
    let registry = Arc::new(PackRegistry::new());

    let mut desc = description(&server, &["leaf.webp"]);
    desc.tray_image_source = server.url("huge-tray.png");
    let err = builder(store, Arc::clone(&registry))?
        .build(desc)
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::Validation { .. }), "{err}");
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn hostile_sources_are_refused_cheaply() -> Result<()> {
    let Some(server) = ImageServer::start(image_files())? else {
        return Ok(());
    };
    let temp = tempfile::tempdir()?;
    let store = Arc::new(PackStore::open(temp.path())?);
    let registry = Arc::new(PackRegistry::new());
    let builder = builder(store, Arc::clone(&registry))?;

    let err = builder
        .build(description(&server, &["bloated.webp"]))
        .await
        .unwrap_err();
    assert!(
        matches!(err, BuildError::Network(FetchError::TooLarge { .. })),
        "{err}"
    );

    // Small file, huge declared canvas: rejected from its header.
    let err = builder
        .build(description(&server, &["canvas.png"]))
        .await
        .unwrap_err();
    match err {
        BuildError::Validation { role, source, .. } => {
            assert_eq!(role, AssetRole::Sticker);
            assert_eq!(
                source,
                ValidationError::IncorrectImageSize(Dimensions::square(2048))
            );
        }
        other => return Err(anyhow!("unexpected error {other}")),
    }
    assert!(registry.is_empty());
    Ok(())
}
