//! `POST /validate` — validate a caller-supplied bundle.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use funke_bundle::ValidationOutcome;

use crate::error::{Error, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub bundle: Value,
}

pub async fn validate_bundle(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationOutcome>> {
    if !request.bundle.is_object() {
        return Err(Error::InputValidation("bundle must be a JSON object".to_string()));
    }
    Ok(Json(state.validator.validate(&request.bundle).await))
}
