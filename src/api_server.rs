use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sysinfo::System;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatcher::Assistant;
use crate::file_search::DEFAULT_MAX_RESULTS;
use crate::llm_gateway::LlmSettingsUpdate;

#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
}

#[derive(Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: String,
}

#[derive(Deserialize)]
pub struct AppsQuery {
    pub limit: Option<usize>,
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct VerifyUrlRequest {
    #[serde(default)]
    pub site: String,
}

#[derive(Deserialize)]
pub struct ScreenQueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Deserialize)]
pub struct ScreenClickRequest {
    #[serde(default)]
    pub query: String,
    pub x_percent: Option<f64>,
    pub y_percent: Option<f64>,
}

#[derive(Deserialize)]
pub struct FileSearchRequest {
    #[serde(default)]
    pub query: String,
    pub file_type: Option<String>,
    pub max_results: Option<usize>,
}

#[derive(Deserialize)]
pub struct YoutubeSearchRequest {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct FileInfoRequest {
    #[serde(default)]
    pub path: String,
}

pub fn build_router(assistant: Arc<Assistant>) -> Router {
    let state = AppState { assistant };

    // Browser clients connect from arbitrary local UIs.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/api/command", post(handle_command))
        .route("/api/status", get(get_status))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/apps", get(list_apps))
        .route("/api/apps/refresh", post(refresh_apps))
        .route("/api/verify-url", post(verify_url))
        .route("/api/screen", get(capture_screen))
        .route("/api/screen/analyze", post(analyze_screen))
        .route("/api/screen/click", post(click_screen))
        .route("/api/search-files", post(search_files))
        .route("/api/youtube-search", post(youtube_search))
        .route("/api/file-info", post(file_info))
        .route("/api/system-info", get(system_info))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_api_server(assistant: Arc<Assistant>) -> anyhow::Result<()> {
    let port = assistant.config.server_port;
    let app = build_router(assistant);

    println!("🌐 DeskPilot API running on http://localhost:{}", port);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind port {}: {}", port, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
    Ok(())
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "service": "DeskPilot API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api/status"
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Endpoint not found" })),
    )
}

async fn handle_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    if req.command.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "No command provided" })),
        );
    }
    let outcome = state.assistant.process_command(&req.command).await;
    let body = serde_json::to_value(&outcome).unwrap_or_else(|_| {
        json!({ "success": false, "response": "Internal serialization error" })
    });
    (StatusCode::OK, Json(body))
}

async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.assistant.status())
}

async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    let settings = state.assistant.llm.settings().masked();
    Json(json!({ "success": true, "config": settings }))
}

async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<LlmSettingsUpdate>,
) -> Json<serde_json::Value> {
    let updated = state.assistant.llm.update_settings(update);
    info!(model = %updated.model, provider = %updated.provider, "llm settings updated");
    Json(json!({ "success": true, "config": updated.masked() }))
}

async fn list_apps(
    State(state): State<AppState>,
    Query(query): Query<AppsQuery>,
) -> Json<serde_json::Value> {
    let apps = state.assistant.apps.list(query.limit, query.search.as_deref());
    Json(json!({
        "success": true,
        "count": apps.len(),
        "total": state.assistant.apps.count(),
        "apps": apps,
    }))
}

async fn refresh_apps(State(state): State<AppState>) -> Json<serde_json::Value> {
    let count = state.assistant.apps.refresh();
    info!(count, "app index refreshed");
    Json(json!({ "success": true, "count": count }))
}

async fn verify_url(
    State(state): State<AppState>,
    Json(req): Json<VerifyUrlRequest>,
) -> impl IntoResponse {
    if req.site.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "No site input provided" })),
        );
    }
    let resolved = state.assistant.resolve_url(&req.site).await;
    (
        StatusCode::OK,
        Json(json!({ "success": true, "url": resolved, "input": req.site })),
    )
}

async fn capture_screen(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.assistant.screen.capture() {
        Some(shot) => Json(json!({
            "success": true,
            "image": shot.png_base64,
            "width": shot.width,
            "height": shot.height,
        })),
        None => Json(json!({ "success": false, "error": "Screen capture failed" })),
    }
}

async fn analyze_screen(
    State(state): State<AppState>,
    Json(req): Json<ScreenQueryRequest>,
) -> Json<serde_json::Value> {
    match state.assistant.analyze_screen(&req.query).await {
        Some(analysis) => Json(json!({ "success": true, "analysis": analysis })),
        None => Json(json!({ "success": false, "error": "Screen analysis failed" })),
    }
}

async fn click_screen(
    State(state): State<AppState>,
    Json(req): Json<ScreenClickRequest>,
) -> Json<serde_json::Value> {
    // Explicit coordinates bypass the vision round-trip.
    if let (Some(x), Some(y)) = (req.x_percent, req.y_percent) {
        let success = state.assistant.screen.click_percent(x, y);
        return Json(json!({ "success": success }));
    }

    match state.assistant.analyze_screen(&req.query).await {
        Some(analysis) => match analysis.click_position() {
            Some(pos) => {
                let success = state.assistant.screen.click_percent(pos.x, pos.y);
                Json(json!({ "success": success, "analysis": analysis }))
            }
            None => Json(json!({
                "success": false,
                "error": "Couldn't identify click target",
                "analysis": analysis,
            })),
        },
        None => Json(json!({ "success": false, "error": "Screen analysis failed" })),
    }
}

async fn search_files(
    State(state): State<AppState>,
    Json(req): Json<FileSearchRequest>,
) -> Json<serde_json::Value> {
    let max = req.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    let results = state
        .assistant
        .files
        .search(&req.query, req.file_type.as_deref(), max);
    Json(json!({
        "success": !results.is_empty(),
        "count": results.len(),
        "results": results,
    }))
}

async fn youtube_search(
    State(state): State<AppState>,
    Json(req): Json<YoutubeSearchRequest>,
) -> Json<serde_json::Value> {
    let limit = req.limit.unwrap_or(5);
    let videos = state.assistant.media.search_videos(&req.query, limit);
    Json(json!({
        "success": !videos.is_empty(),
        "count": videos.len(),
        "videos": videos,
    }))
}

async fn file_info(
    State(state): State<AppState>,
    Json(req): Json<FileInfoRequest>,
) -> Json<serde_json::Value> {
    match state.assistant.files.info(&req.path) {
        Some(info) => Json(json!({ "success": true, "info": info })),
        None => Json(json!({ "success": false, "error": "File not found" })),
    }
}

async fn system_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut sys = System::new_all();
    sys.refresh_cpu();
    std::thread::sleep(std::time::Duration::from_millis(200));
    sys.refresh_cpu();
    sys.refresh_memory();

    Json(json!({
        "success": true,
        "os": state.assistant.config.os_family,
        "cpu_usage": sys.global_cpu_info().cpu_usage(),
        "memory_used_mb": sys.used_memory() / 1024 / 1024,
        "memory_total_mb": sys.total_memory() / 1024 / 1024,
        "indexed_apps": state.assistant.apps.count(),
    }))
}
