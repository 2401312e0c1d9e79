//! `POST /convert` — free-text clinical order to FHIR transaction bundle.

use axum::extract::State;
use axum::Json;
use validator::Validate;

use crate::error::{Error, Result};
use crate::services::{ConvertRequest, ConvertResponse};
use crate::state::AppState;

pub async fn convert(
    State(state): State<AppState>,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<ConvertResponse>> {
    request
        .validate()
        .map_err(|e| Error::InputValidation(e.to_string()))?;

    Ok(Json(state.conversion.convert(request).await))
}
