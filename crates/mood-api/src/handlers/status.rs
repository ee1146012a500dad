//! Status polling.

use axum::extract::State;
use axum::Json;
use mood_models::StatusSnapshot;

use crate::state::AppState;

/// `GET /status`: stage statuses and the result bag of the current job.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.jobs.snapshot().await)
}
