//! HTTP surface of the service.

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, response, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::admin::make_admin_routes;
use super::http_layers::log_requests;
use super::state::{
    GuardedCatalog, GuardedCleanup, GuardedCredentialStore, ServerState,
};
use crate::catalog::{paginate, SearchPage};
use crate::config::AppConfig;
use crate::download::{DownloadError, QualityTier, SongInfo};

/// Errors a handler can surface to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    keyword: String,
    #[serde(default = "default_page")]
    page: usize,
}

fn default_page() -> usize {
    1
}

async fn search(
    State(catalog): State<GuardedCatalog>,
    State(config): State<AppConfig>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchPage>, ApiError> {
    let keyword = request.keyword.trim();
    if keyword.is_empty() {
        return Err(ApiError::BadRequest("keyword must not be empty".into()));
    }

    let results = catalog
        .search(keyword, config.catalog_fetch_limit)
        .await
        .map_err(|e| {
            warn!("Search for {:?} failed: {:#}", keyword, e);
            ApiError::Internal("search failed".into())
        })?;

    if results.is_empty() {
        return Err(ApiError::NotFound(format!("no results for {:?}", keyword)));
    }

    Ok(Json(paginate(results, request.page, config.search_page_size)))
}

#[derive(Deserialize)]
struct DownloadRequest {
    song_data: Option<SongInfo>,
    #[serde(default = "default_true")]
    prefer_flac: bool,
    #[serde(default = "default_true")]
    add_metadata: bool,
}

fn default_true() -> bool {
    true
}

async fn download(
    State(state): State<ServerState>,
    Json(request): Json<DownloadRequest>,
) -> Result<Response, ApiError> {
    let song = request
        .song_data
        .ok_or_else(|| ApiError::BadRequest("song_data is required".into()))?;
    if song.mid.is_empty() {
        return Err(ApiError::BadRequest("song_data.mid is required".into()));
    }
    if song.vip && state.credentials.current().is_none() {
        return Err(ApiError::Forbidden(
            "VIP-only song requires a logged-in credential".into(),
        ));
    }

    let result = state
        .orchestrator
        .download(&song, request.prefer_flac, request.add_metadata)
        .await
        .map_err(|e| match e {
            DownloadError::AllTiersFailed(song) => {
                ApiError::Internal(format!("no playable source for {}", song))
            }
            DownloadError::Io(e) => ApiError::Internal(format!("failed to store file: {}", e)),
        })?;

    Ok(Json(result).into_response())
}

#[derive(Deserialize)]
struct PlayUrlRequest {
    song_data: Option<SongInfo>,
    #[serde(default = "default_true")]
    prefer_flac: bool,
}

async fn play_url(
    State(catalog): State<GuardedCatalog>,
    State(credentials): State<GuardedCredentialStore>,
    Json(request): Json<PlayUrlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let song = request
        .song_data
        .ok_or_else(|| ApiError::BadRequest("song_data is required".into()))?;
    if song.mid.is_empty() {
        return Err(ApiError::BadRequest("song_data.mid is required".into()));
    }

    let credential = credentials.current();
    for &tier in QualityTier::order(request.prefer_flac) {
        match catalog.song_url(&song.mid, tier, credential.as_ref()).await {
            Ok(Some(url)) => {
                return Ok(Json(json!({
                    "url": url,
                    "quality": tier.label(),
                    "song_mid": song.mid,
                })));
            }
            Ok(None) => continue,
            Err(e) => {
                warn!(
                    "URL resolution for {} at {} failed: {:#}",
                    song.mid,
                    tier.label(),
                    e
                );
            }
        }
    }
    Err(ApiError::NotFound(format!(
        "no playable URL for {}",
        song.mid
    )))
}

async fn get_lyric(
    State(catalog): State<GuardedCatalog>,
    Path(mid): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match catalog.lyrics(&mid).await {
        Ok(Some(lyrics)) => Ok(Json(json!({
            "lyric": lyrics.lyric,
            "trans": lyrics.trans,
        }))),
        Ok(None) => Err(ApiError::NotFound(format!("no lyrics for {}", mid))),
        Err(e) => {
            warn!("Lyric lookup for {} failed: {:#}", mid, e);
            Err(ApiError::Internal("lyric lookup failed".into()))
        }
    }
}

async fn get_file(
    State(state): State<ServerState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if filename.contains("..") || filename.starts_with('/') || filename.contains('\\') {
        return Err(ApiError::BadRequest("invalid filename".into()));
    }

    let file_path = state.config.music_dir.join(&filename);
    let buffer = tokio::fs::read(&file_path)
        .await
        .map_err(|_| ApiError::NotFound(format!("{} not found", filename)))?;

    let mime = infer::get(&buffer)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");
    let disposition = format!("attachment; filename=\"{}\"", filename);
    let response = response::Builder::new()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_str(mime).map_err(|_| ApiError::Internal("bad mime".into()))?,
        )
        .header(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&disposition)
                .map_err(|_| ApiError::Internal("bad filename".into()))?,
        )
        .body(axum::body::Body::from(buffer))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(response)
}

async fn health(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let music_dir = &state.config.music_dir;
    let file_count = std::fs::read_dir(music_dir)
        .map(|entries| entries.filter_map(|e| e.ok()).filter(|e| e.path().is_file()).count())
        .unwrap_or(0);
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "version": state.hash,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "music_dir_exists": music_dir.is_dir(),
        "file_count": file_count,
    }))
}

#[derive(Deserialize)]
struct ToggleRequest {
    enabled: bool,
}

async fn cleanup_status(State(cleanup): State<GuardedCleanup>) -> Response {
    Json(cleanup.status()).into_response()
}

async fn cleanup_toggle(
    State(cleanup): State<GuardedCleanup>,
    Json(request): Json<ToggleRequest>,
) -> Response {
    cleanup.set_enabled(request.enabled);
    info!("Cleanup janitor enabled={}", request.enabled);
    Json(cleanup.status()).into_response()
}

async fn credential_status(State(credentials): State<GuardedCredentialStore>) -> Response {
    Json(credentials.status()).into_response()
}

async fn credential_toggle(
    State(credentials): State<GuardedCredentialStore>,
    Json(request): Json<ToggleRequest>,
) -> Response {
    credentials.set_enabled(request.enabled);
    info!("Credential checks enabled={}", request.enabled);
    Json(credentials.status()).into_response()
}

pub fn make_app(state: ServerState) -> Router {
    let api_routes: Router = Router::new()
        .route("/search", post(search))
        .route("/download", post(download))
        .route("/play_url", post(play_url))
        .route("/lyric/{mid}", get(get_lyric))
        .route("/file/{filename}", get(get_file))
        .route("/health", get(health))
        .route("/cleanup/status", get(cleanup_status))
        .route("/cleanup/toggle", post(cleanup_toggle))
        .route("/credential/status", get(credential_status))
        .route("/credential/toggle", post(credential_toggle))
        .with_state(state.clone());

    let admin_routes = make_admin_routes(state.clone());

    Router::new()
        .nest("/api", api_routes)
        .nest("/admin/api", admin_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(state: ServerState) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);
    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::StubCatalog;
    use crate::config::{AppConfig, CliConfig};
    use crate::cover::CoverResolver;
    use crate::credential::CredentialStore;
    use crate::download::DownloadOrchestrator;
    use crate::fetcher::ContentFetcher;
    use crate::janitor::CleanupJanitor;
    use axum::{body::Body, http::Request};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct NoFetcher;

    #[async_trait::async_trait]
    impl ContentFetcher for NoFetcher {
        async fn fetch(&self, _url: &str) -> Option<Vec<u8>> {
            None
        }
    }

    fn test_state(dir: &TempDir, catalog: Arc<StubCatalog>) -> ServerState {
        let cli = CliConfig {
            music_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();

        let catalog: GuardedCatalog = catalog;
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(NoFetcher);
        let credentials = Arc::new(CredentialStore::new(
            config.credential_file.clone(),
            catalog.clone(),
            true,
        ));
        let orchestrator = Arc::new(DownloadOrchestrator::new(
            catalog.clone(),
            fetcher.clone(),
            credentials.clone(),
            CoverResolver::new(fetcher, config.cover_size),
            config.music_dir.clone(),
            config.max_filename_length,
        ));
        let cleanup = Arc::new(CleanupJanitor::new(
            config.music_dir.clone(),
            config.credential_file.clone(),
            config.cleanup.interval_secs,
            config.cleanup.retention_secs,
            config.cleanup.enabled,
        ));
        ServerState::new(config, catalog, credentials, orchestrator, cleanup)
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn search_rejects_empty_keyword() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let response = app
            .oneshot(json_request("/api/search", json!({ "keyword": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_paginates_results() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(StubCatalog {
            hits: (0..42)
                .map(|i| SongInfo {
                    mid: format!("mid{}", i),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        });
        let app = make_app(test_state(&dir, catalog));

        let response = app
            .oneshot(json_request("/api/search", json!({ "keyword": "x" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(page["results"].as_array().unwrap().len(), 10);
        assert_eq!(page["pagination"]["total_pages"], 5);
        assert_eq!(page["pagination"]["total_results"], 42);
        assert_eq!(page["pagination"]["has_next"], true);
        assert_eq!(page["pagination"]["has_prev"], false);
    }

    #[tokio::test]
    async fn search_with_no_hits_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let response = app
            .oneshot(json_request("/api/search", json!({ "keyword": "nothing" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_requires_song_data() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let response = app
            .oneshot(json_request("/api/download", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn vip_song_without_credential_is_forbidden_before_any_catalog_call() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(StubCatalog::default());
        let app = make_app(test_state(&dir, catalog.clone()));

        let response = app
            .oneshot(json_request(
                "/api/download",
                json!({ "song_data": { "mid": "m1", "name": "n", "vip": true } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_with_no_available_tier_is_an_internal_error() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let response = app
            .oneshot(json_request(
                "/api/download",
                json!({ "song_data": { "mid": "m1", "name": "n" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn play_url_requires_song_data() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let response = app
            .oneshot(json_request("/api/play_url", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn play_url_reports_the_resolved_tier() {
        let dir = TempDir::new().unwrap();
        let mut catalog = StubCatalog::default();
        catalog.urls.insert(
            crate::download::QualityTier::Mp3_128,
            "https://stream.example/low".to_string(),
        );
        let app = make_app(test_state(&dir, Arc::new(catalog)));

        let response = app
            .oneshot(json_request(
                "/api/play_url",
                json!({ "song_data": { "mid": "m1" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["quality"], "128kbps");
        assert_eq!(payload["song_mid"], "m1");
        assert_eq!(payload["url"], "https://stream.example/low");
    }

    #[tokio::test]
    async fn file_requests_cannot_escape_the_music_dir() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let request = Request::builder()
            .uri("/api/file/..%2Fsecret.txt")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let request = Request::builder()
            .uri("/api/file/nope.mp3")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cleanup_toggle_round_trips() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Arc::new(StubCatalog::default()));
        let cleanup = state.cleanup.clone();
        let app = make_app(state);

        let response = app
            .oneshot(json_request("/api/cleanup/toggle", json!({ "enabled": false })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!cleanup.is_enabled());
    }

    #[tokio::test]
    async fn unknown_qr_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let request = Request::builder()
            .uri("/admin/api/qr_status/not-a-session")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_login_kind_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let request = Request::builder()
            .uri("/admin/api/get_qrcode/telegram")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn credential_info_reports_absence() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let request = Request::builder()
            .uri("/admin/api/credential/info")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(info["credential"].is_null());
    }

    #[tokio::test]
    async fn clear_music_empties_the_music_dir() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Arc::new(StubCatalog::default()));
        std::fs::write(dir.path().join("old.mp3"), b"x").unwrap();
        let app = make_app(state);

        let request = Request::builder()
            .method("POST")
            .uri("/admin/api/clear_music")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!dir.path().join("old.mp3").exists());
    }

    #[tokio::test]
    async fn lyric_lookup_returns_not_found_when_catalog_has_none() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir, Arc::new(StubCatalog::default())));

        let request = Request::builder()
            .uri("/api/lyric/mid01")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
