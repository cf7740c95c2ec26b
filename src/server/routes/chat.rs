//! Chat assistant endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::server::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// POST /api/chat - always answers 200, with a fixed text when chat is unavailable
pub async fn chat(State(state): State<SharedState>, Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    let response = state.chat.reply(&request.message, &request.language).await;
    Json(ChatResponse { response })
}
