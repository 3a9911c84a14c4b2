//! In-process stand-in for the upstream site, plus a helper that serves the
//! relay itself on an ephemeral port.
//!
//! Serves the JSON API, artwork pages and images for a fixed set of
//! illustrations and counts hits per route so tests can assert which
//! upstream calls happened.

#![allow(dead_code)]

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use pixiv_relay::config::{Config, MetadataStrategy, StoreConfig, UpstreamConfig};
use pixiv_relay::{AppState, router};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

/// One illustration known to the fake upstream.
#[derive(Debug, Clone)]
pub struct FakeIllust {
    pub id: &'static str,
    pub page_count: u32,
    /// API answers 200 with a non-JSON body.
    pub broken_api: bool,
    /// Image requests are answered with 403.
    pub forbidden_image: bool,
}

impl FakeIllust {
    pub fn new(id: &'static str, page_count: u32) -> Self {
        Self {
            id,
            page_count,
            broken_api: false,
            forbidden_image: false,
        }
    }

    pub fn broken_api(mut self) -> Self {
        self.broken_api = true;
        self
    }

    pub fn forbidden_image(mut self) -> Self {
        self.forbidden_image = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct Hits {
    pub api: AtomicUsize,
    pub page: AtomicUsize,
    pub image: AtomicUsize,
}

impl Hits {
    pub fn api(&self) -> usize {
        self.api.load(Ordering::SeqCst)
    }

    pub fn page(&self) -> usize {
        self.page.load(Ordering::SeqCst)
    }

    pub fn image(&self) -> usize {
        self.image.load(Ordering::SeqCst)
    }
}

struct FakeState {
    base_url: String,
    illusts: HashMap<String, FakeIllust>,
    hits: Arc<Hits>,
    /// Cookie header seen on the last image request, if any.
    image_cookie: std::sync::Mutex<Option<String>>,
    /// Cookie header seen on the last API or artwork page request.
    metadata_cookie: std::sync::Mutex<Option<String>>,
    /// Content-Encoding of the last artwork page as sent on the wire.
    page_encoding: std::sync::Mutex<Option<String>>,
}

/// Handle to a running fake upstream.
pub struct FakeUpstream {
    pub base_url: String,
    pub hits: Arc<Hits>,
    state: Arc<FakeState>,
}

impl FakeUpstream {
    pub async fn start(illusts: Vec<FakeIllust>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(Hits::default());

        let state = Arc::new(FakeState {
            base_url: base_url.clone(),
            illusts: illusts
                .into_iter()
                .map(|illust| (illust.id.to_string(), illust))
                .collect(),
            hits: hits.clone(),
            image_cookie: std::sync::Mutex::new(None),
            metadata_cookie: std::sync::Mutex::new(None),
            page_encoding: std::sync::Mutex::new(None),
        });

        let app = Router::new()
            .route("/ajax/illust/{id}", get(api))
            // Served compressed, like the real site.
            .route(
                "/en/artworks/{id}",
                get(artwork_page)
                    .layer(CompressionLayer::new())
                    .layer(middleware::map_response_with_state(
                        state.clone(),
                        record_page_encoding,
                    )),
            )
            .route("/img-master/{file}", get(image))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            hits,
            state,
        }
    }

    /// Config pointing the relay at this upstream.
    pub fn config(&self, strategy: MetadataStrategy, store: Option<PathBuf>) -> Config {
        Config {
            cookie: Some("PHPSESSID=secret".to_string()),
            upstream: UpstreamConfig {
                strategy,
                base_url: self.base_url.clone(),
                timeout_secs: 5,
                ..UpstreamConfig::default()
            },
            store: StoreConfig {
                enabled: store.is_some(),
                directory: store.unwrap_or_default(),
            },
            ..Config::default()
        }
    }

    /// Cookie header the last image request carried.
    pub fn last_image_cookie(&self) -> Option<String> {
        self.state.image_cookie.lock().unwrap().clone()
    }

    /// Cookie header the last metadata request carried.
    pub fn last_metadata_cookie(&self) -> Option<String> {
        self.state.metadata_cookie.lock().unwrap().clone()
    }

    /// Content-Encoding the last artwork page was sent with.
    pub fn last_page_encoding(&self) -> Option<String> {
        self.state.page_encoding.lock().unwrap().clone()
    }

    /// URL the relay is expected to fetch for `id` and zero-based `index`.
    pub fn image_url(&self, id: &str, index: u32) -> String {
        format!("{}/img-master/{}", self.base_url, image_file(id, index))
    }
}

pub fn image_file(id: &str, index: u32) -> String {
    format!("{}_p{}_master1200.jpg", id, index)
}

/// Deterministic, reasonably large body for an image file.
pub fn image_bytes(file: &str) -> Vec<u8> {
    let mut bytes = vec![0xff, 0xd8];
    bytes.extend(format!("{}|", file).repeat(4096).into_bytes());
    bytes.extend([0xff, 0xd9]);
    bytes
}

fn illust_json(state: &FakeState, illust: &FakeIllust) -> serde_json::Value {
    serde_json::json!({
        "illustId": illust.id,
        "illustTitle": "fake",
        "pageCount": illust.page_count,
        "urls": {
            "mini": null,
            "regular": format!("{}/img-master/{}", state.base_url, image_file(illust.id, 0)),
            "original": null
        }
    })
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn api(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hits.api.fetch_add(1, Ordering::SeqCst);
    *state.metadata_cookie.lock().unwrap() = header_string(&headers, header::COOKIE);

    match state.illusts.get(&id) {
        Some(illust) if illust.broken_api => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            "<html>please log in</html>",
        )
            .into_response(),
        Some(illust) => {
            let body = serde_json::json!({
                "error": false,
                "message": "",
                "body": illust_json(&state, illust),
            });
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body.to_string(),
            )
                .into_response()
        }
        None => {
            let body = serde_json::json!({
                "error": true,
                "message": "Work has been deleted or the ID does not exist.",
                "body": [],
            });
            (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "application/json")],
                body.to_string(),
            )
                .into_response()
        }
    }
}

async fn artwork_page(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hits.page.fetch_add(1, Ordering::SeqCst);
    *state.metadata_cookie.lock().unwrap() = header_string(&headers, header::COOKIE);

    let Some(illust) = state.illusts.get(&id) else {
        return (StatusCode::NOT_FOUND, "<html>not found</html>").into_response();
    };

    let mut illusts = serde_json::Map::new();
    illusts.insert(id.clone(), illust_json(&state, illust));
    let preload = serde_json::json!({
        "timestamp": "2024-01-01T00:00:00+09:00",
        "illust": illusts,
        "user": {}
    });
    let markup = format!(
        r#"<!DOCTYPE html><html lang="en"><head><meta charset="utf-8"><title>fake</title><meta name="preload-data" id="meta-preload-data" content='{}'></head><body><div id="root"></div></body></html>"#,
        preload
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        markup,
    )
        .into_response()
}

async fn record_page_encoding(State(state): State<Arc<FakeState>>, response: Response) -> Response {
    *state.page_encoding.lock().unwrap() =
        header_string(response.headers(), header::CONTENT_ENCODING);
    response
}

async fn image(
    State(state): State<Arc<FakeState>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hits.image.fetch_add(1, Ordering::SeqCst);
    *state.image_cookie.lock().unwrap() = header_string(&headers, header::COOKIE);

    if headers.get(header::REFERER).is_none() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let id = file.split('_').next().unwrap_or_default();
    if state
        .illusts
        .get(id)
        .is_some_and(|illust| illust.forbidden_image)
    {
        return StatusCode::FORBIDDEN.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/jpeg")],
        image_bytes(&file),
    )
        .into_response()
}

/// Serves the relay for `config` on an ephemeral port and returns its base URL.
pub async fn spawn_relay(config: &Config) -> String {
    let state = AppState::new(config).unwrap();
    let app = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    base_url
}

/// Returns a base URL nothing is listening on.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
