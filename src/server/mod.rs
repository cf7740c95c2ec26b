//! Diagnosis HTTP service
//!
//! - `GET  /api/health`  liveness and model readiness
//! - `POST /api/analyze` multipart leaf image -> diagnosis
//! - `POST /api/chat`    grower questions answered by the chat assistant

pub mod gemini;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use state::{AppState, ServerConfig, SharedState};

use crate::utils::error::{CropCareError, Result};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the router with all routes and middleware
pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/analyze", post(routes::analyze::analyze_leaf))
        .route("/api/chat", post(routes::chat::chat))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Warm up the model and serve until the process is stopped
pub async fn serve(state: SharedState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .map_err(|e| CropCareError::Configuration(format!("Invalid listen address: {}", e)))?;

    info!("Loading model...");
    let model = std::sync::Arc::clone(&state.model);
    let loaded = tokio::task::spawn_blocking(move || model.warm_up())
        .await
        .unwrap_or(false);
    if loaded {
        info!("Model loaded successfully.");
    }
    if !state.chat.has_key() {
        warn!("GEMINI_API_KEY not set; chat replies with a fixed message");
    }

    let app = router(state);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::backend::{default_device, InferenceBackend};
    use crate::config::PipelineConfig;
    use crate::dataset::ClassCatalog;
    use crate::model::artifact::ArtifactWriter;
    use crate::server::gemini::NO_KEY_REPLY;

    const BOUNDARY: &str = "leafboundary";

    fn pipeline_config(models_dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.artifacts.models_dir = models_dir.to_path_buf();
        config.model.image_size = 16;
        config.model.backbone_depth = 2;
        config.model.base_filters = 4;
        config.model.hidden_units = 8;
        config.training.fine_tune_frozen_blocks = 1;
        config
    }

    fn app(config: PipelineConfig) -> Router {
        router(Arc::new(AppState::new(ServerConfig::default(), config)))
    }

    fn png_bytes() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([40, 150, 40])));
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn multipart_request(uri: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"leaf.png\"\r\n");
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let response = app(pipeline_config(dir.path()))
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model_ready"], false);
    }

    #[tokio::test]
    async fn test_analyze_without_model_is_503() {
        let dir = TempDir::new().unwrap();
        let response = app(pipeline_config(dir.path()))
            .oneshot(multipart_request("/api/analyze", "image/png", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().starts_with("Model not trained yet"));
    }

    #[tokio::test]
    async fn test_analyze_rejects_non_images() {
        let dir = TempDir::new().unwrap();
        let response = app(pipeline_config(dir.path()))
            .oneshot(multipart_request("/api/analyze", "text/plain", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["detail"], "File must be an image");
    }

    #[tokio::test]
    async fn test_analyze_rejects_undecodable_bytes() {
        let dir = TempDir::new().unwrap();
        let response = app(pipeline_config(dir.path()))
            .oneshot(multipart_request("/api/analyze", "image/jpeg", b"not really a jpeg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().starts_with("Invalid image:"));
    }

    #[tokio::test]
    async fn test_analyze_returns_diagnosis() {
        let dir = TempDir::new().unwrap();
        let config = pipeline_config(dir.path());
        let catalog = ClassCatalog::from_names(vec![
            "Apple___Apple_scab".into(),
            "Apple___healthy".into(),
            "Tomato___Late_blight".into(),
        ]);
        let model = config
            .classifier_config(catalog.len())
            .init::<InferenceBackend>(&default_device());
        ArtifactWriter::new(&config.artifact_paths())
            .commit(&model, &catalog)
            .unwrap();

        let response = app(config)
            .oneshot(multipart_request("/api/analyze?crop_type=tomato", "image/png", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["disease"], "Late Blight (Tomato)");
        assert!(body["confidence"].as_u64().unwrap() <= 100);
        assert_eq!(body["suggestions"].as_array().unwrap().len(), 5);
        // No chat key configured, so the static table answers.
        assert_eq!(body["products"].as_array().unwrap().len(), 3);
        assert_eq!(body["products"][0]["name"], "Bayer Nativo 75 WG");
    }

    #[tokio::test]
    async fn test_chat_without_key() {
        let dir = TempDir::new().unwrap();
        let request = Request::post("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message": "How do I treat rust?"}"#))
            .unwrap();

        let response = app(pipeline_config(dir.path())).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["response"], NO_KEY_REPLY);
    }
}
