use axum::extract::State;
use axum::Json;

use crate::runs::RunRecord;
use crate::state::AppState;

/// GET /runs: deployments currently in flight.
pub async fn list_runs(State(app): State<AppState>) -> Json<Vec<RunRecord>> {
    Json(app.runs.active())
}
