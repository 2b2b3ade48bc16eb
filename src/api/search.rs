use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tokio_util::sync::CancellationToken;

use crate::models::{SearchRequest, SearchResponse};
use crate::state::AppState;

/// POST /api/search - Search repository names and file names concurrently.
///
/// Sources that fail are listed in `failures`; the rest of the results are
/// still returned. Only when every source failed does the request fail.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    // Dropping the guard cancels in-flight workers if the client goes away
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let outcome = state.searcher.search(&req, &cancel).await;

    if outcome.all_failed() {
        let reasons: Vec<String> = outcome.failures.iter().map(|f| f.message.clone()).collect();
        return Err((
            StatusCode::BAD_GATEWAY,
            format!("All search sources failed: {}", reasons.join("; ")),
        ));
    }

    Ok(Json(SearchResponse {
        query: req.query,
        limit: outcome.limit,
        results: outcome.results,
        failures: outcome.failures,
    }))
}
