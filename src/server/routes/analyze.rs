//! Leaf analysis endpoint

use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::dataset::preprocess::decode_bytes;
use crate::diagnosis::Diagnosis;
use crate::server::routes::{api_error, ApiError};
use crate::server::state::SharedState;
use crate::utils::error::CropCareError;

/// Name of the multipart field carrying the image
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    /// Crop name prefix restricting the candidate classes
    pub crop_type: Option<String>,
}

enum AnalyzeFailure {
    InvalidImage(CropCareError),
    Prediction(CropCareError),
}

/// POST /api/analyze?crop_type=...
pub async fn analyze_leaf(
    State(state): State<SharedState>,
    Query(query): Query<AnalyzeQuery>,
    mut multipart: Multipart,
) -> Result<Json<Diagnosis>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid form data: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(api_error(StatusCode::BAD_REQUEST, "File must be an image"));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid image: {}", e)))?;
        upload = Some(bytes);
        break;
    }

    let Some(bytes) = upload else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing 'file' field"));
    };

    let model = Arc::clone(&state.model);
    let crop_type = query.crop_type;
    let outcome = tokio::task::spawn_blocking(move || {
        let image = decode_bytes(&bytes).map_err(AnalyzeFailure::InvalidImage)?;
        model
            .predict(&image, crop_type.as_deref())
            .map_err(AnalyzeFailure::Prediction)
    })
    .await
    .map_err(|e| {
        error!("Prediction task failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Prediction failed")
    })?;

    match outcome {
        Ok(prediction) => {
            info!(
                "Predicted {} ({:.1}%)",
                prediction.class_name,
                prediction.confidence * 100.0
            );
            let products = state.chat.recommend_products(&prediction.class_name).await;
            Ok(Json(Diagnosis::from_prediction(&prediction).with_products(products)))
        }
        Err(AnalyzeFailure::InvalidImage(e)) => {
            let reason = match e {
                CropCareError::InvalidInput(msg) => msg,
                other => other.to_string(),
            };
            Err(api_error(StatusCode::BAD_REQUEST, format!("Invalid image: {}", reason)))
        }
        Err(AnalyzeFailure::Prediction(e)) if e.is_model_not_ready() => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Model not trained yet. Run: cropcare train",
        )),
        Err(AnalyzeFailure::Prediction(e)) => {
            error!("Prediction error: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Prediction failed"))
        }
    }
}
