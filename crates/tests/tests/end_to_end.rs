use std::collections::HashMap;
use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use serde_json::{Value, json};
use sticker_core::StickerConfig;
use sticker_host::config::{HandoffConfig, HostConfig, HttpConfig};
use sticker_host::{HostServer, boot};
use tokio::sync::oneshot;

type Seen = Arc<Mutex<Vec<Value>>>;

#[derive(Clone)]
struct HostApp {
    seen: Seen,
    images: Arc<HashMap<String, Vec<u8>>>,
}

/// Host application stand-in: serves the source images, records handoff requests and
/// accepts every pack.
async fn start_host_app() -> Result<(SocketAddr, Seen)> {
    async fn accept(State(app): State<HostApp>, Json(request): Json<Value>) -> Json<Value> {
        app.seen.lock().push(request);
        Json(json!({ "accepted": true }))
    }

    async fn image(
        State(app): State<HostApp>,
        UrlPath(name): UrlPath<String>,
    ) -> Result<Vec<u8>, StatusCode> {
        app.images.get(&name).cloned().ok_or(StatusCode::NOT_FOUND)
    }

    let state = HostApp {
        seen: Arc::default(),
        images: Arc::new(source_images()?),
    };
    let seen = Arc::clone(&state.seen);
    let app = Router::new()
        .route("/handoff", post(accept))
        .route("/images/{name}", get(image))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, seen))
}

async fn start_sticker_host(
    store: &Path,
    handoff_url: String,
) -> Result<(SocketAddr, oneshot::Sender<()>)> {
    let config = HostConfig {
        config_path: None,
        sticker: StickerConfig {
            store_dir: store.to_path_buf(),
            fetch_timeout: Duration::from_secs(5),
            ..StickerConfig::default()
        },
        http: HttpConfig {
            bind: Ipv4Addr::LOCALHOST.into(),
            port: 0,
            authority: "com.example.stickers".into(),
        },
        handoff: HandoffConfig::Webhook {
            url: handoff_url,
            timeout_ms: 5_000,
        },
    };
    let state = boot::start(&config)?;
    let server = HostServer::bind(config.socket_addr(), state).await?;
    let addr = server.local_addr()?;
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        server
            .serve(async {
                rx.await.ok();
            })
            .await
            .ok();
    });
    Ok((addr, tx))
}

fn encode(side: u32, format: ImageFormat, shade: u8) -> Result<Vec<u8>> {
    let color = Rgba([shade, 90, 200, 255]);
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(side, side, color));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

fn source_images() -> Result<HashMap<String, Vec<u8>>> {
    Ok(HashMap::from([
        ("tray.png".to_string(), encode(96, ImageFormat::Png, 10)?),
        ("one.webp".to_string(), encode(512, ImageFormat::WebP, 20)?),
        ("two.png".to_string(), encode(512, ImageFormat::Png, 30)?),
    ]))
}

fn description(host_app: SocketAddr) -> Value {
    let image = |name: &str| format!("http://{host_app}/images/{name}");
    json!({
        "identifier": "pack1",
        "title": "Blues",
        "author": "Someone",
        "trayImageSource": image("tray.png"),
        "publisherEmail": "a@example.com",
        "publisherWebsite": "https://example.com",
        "privacyPolicyWebsite": "https://example.com/privacy",
        "licenseWebsite": "https://example.com/license",
        "stickers": [
            { "url": image("one.webp"), "emojis": ["😀"] },
            { "url": image("two.png"), "emojis": ["🎉", "🥳"] }
        ],
        "androidStoreLink": "https://play.example.com/blues"
    })
}

#[tokio::test]
async fn share_commits_hands_off_and_serves_the_pack() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let (host_app, seen) = start_host_app().await?;
    let (addr, shutdown) =
        start_sticker_host(&temp.path().join("store"), format!("http://{host_app}/handoff")).await?;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();
    let desc = description(host_app);

    // Both callers get the same outcome, whether or not the second joined the first.
    let (first, second) = tokio::join!(
        client.post(format!("{base}/share")).json(&desc).send(),
        client.post(format!("{base}/share")).json(&desc).send()
    );
    for response in [first?, second?] {
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await?;
        assert_eq!(body["outcome"], "accepted");
        assert_eq!(body["pack"]["sticker_pack_identifier"], "pack1");
    }
    {
        let seen = seen.lock();
        assert!(!seen.is_empty());
        assert_eq!(
            seen[0],
            json!({
                "sticker_pack_id": "pack1",
                "sticker_pack_authority": "com.example.stickers",
                "sticker_pack_name": "Blues",
            })
        );
    }

    let metadata: Value = client
        .get(format!("{base}/provider/metadata"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(metadata.as_array().map(Vec::len), Some(1));
    assert_eq!(
        metadata[0]["android_play_store_link"],
        "https://play.example.com/blues"
    );

    let stickers: Value = client
        .get(format!("{base}/provider/stickers/pack1"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(stickers[1]["sticker_file_name"], "sticker_001.webp");
    assert_eq!(stickers[1]["sticker_emoji"], "🎉,🥳");

    let asset = client
        .get(format!("{base}/provider/stickers_asset/pack1/sticker_001.webp"))
        .send()
        .await?;
    assert_eq!(asset.status(), reqwest::StatusCode::OK);
    assert_eq!(
        asset
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("image/webp")
    );
    let bytes = asset.bytes().await?;
    assert_eq!(&bytes[..4], b"RIFF");

    let hidden = client
        .get(format!("{base}/provider/asset/pack1/metadata.json"))
        .send()
        .await?;
    assert_eq!(hidden.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown.send(()).ok();
    Ok(())
}

#[tokio::test]
async fn committed_packs_survive_a_host_restart() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = temp.path().join("store");
    let (host_app, _seen) = start_host_app().await?;
    let handoff = format!("http://{host_app}/handoff");
    let client = reqwest::Client::new();

    let (addr, shutdown) = start_sticker_host(&store, handoff.clone()).await?;
    let built: Value = client
        .post(format!("http://{addr}/packs"))
        .json(&description(host_app))
        .send()
        .await?
        .json()
        .await?;
    shutdown.send(()).ok();

    let (addr, shutdown) = start_sticker_host(&store, handoff).await?;
    let reloaded: Value = client
        .get(format!("http://{addr}/provider/metadata/pack1"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(reloaded, built);

    let health: Value = client
        .get(format!("http://{addr}/healthz"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["packs"], 1);
    shutdown.send(()).ok();
    Ok(())
}
