//! Application state for the diagnosis server

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::backend::{default_device, InferenceBackend};
use crate::config::PipelineConfig;
use crate::inference::ArtifactHandle;
use crate::server::gemini::GeminiClient;

/// Origins of the local web front-ends
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 8] = [
    "http://localhost:8080",
    "http://127.0.0.1:8080",
    "http://localhost:8081",
    "http://127.0.0.1:8081",
    "http://localhost:8082",
    "http://127.0.0.1:8082",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Chat model name
    pub chat_model: String,
    /// Read from `GEMINI_API_KEY`; chat answers with a fixed text without it
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
            max_upload_bytes: 10 * 1024 * 1024,
            chat_model: "gemini-flash-latest".to_string(),
            gemini_api_key: None,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    /// Lazily loaded classifier shared by every request
    pub model: Arc<ArtifactHandle<InferenceBackend>>,
    pub chat: GeminiClient,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: ServerConfig, pipeline: PipelineConfig) -> Self {
        let chat = GeminiClient::new(config.gemini_api_key.clone(), &config.chat_model);
        Self {
            model: Arc::new(ArtifactHandle::new(pipeline, default_device())),
            chat,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// A model is loaded or a committed artifact is waiting on disk
    pub fn model_ready(&self) -> bool {
        self.model.is_loaded() || self.model.config().artifact_paths().exists()
    }
}
