//! `GET /metrics/prometheus`

use axum::extract::State;

use crate::state::AppState;

pub async fn prometheus(State(state): State<AppState>) -> String {
    state.metrics.render()
}
