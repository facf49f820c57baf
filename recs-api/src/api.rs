use std::future::ready;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::app_context::AppContext;
use crate::errors::ApiError;
use crate::ranking::{rank_recommendations, rank_similar, SimilarityRow, WeightRow};

const DEFAULT_MAX_RESULTS: u32 = 10;
const MAX_MAX_RESULTS: u32 = 100;

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

impl LimitQuery {
    fn effective(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_MAX_RESULTS) as usize
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SimilarEvent {
    pub event_id: i64,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SimilarEventsResponse {
    pub results: Vec<SimilarEvent>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RecommendationsResponse {
    pub results: Vec<i64>,
}

async fn index() -> &'static str {
    "recommendations api"
}

/// `GET /api/v1/events/{event_id}/similar`: events most similar to the
/// given one, score descending, ties broken by ascending event id.
async fn similar_events(
    State(context): State<Arc<AppContext>>,
    Path(event_id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<SimilarEventsResponse>, ApiError> {
    let rows: Vec<SimilarityRow> = sqlx::query_as(
        "SELECT event_a, event_b, score FROM event_similarity
         WHERE event_a = $1 OR event_b = $1",
    )
    .bind(event_id)
    .fetch_all(&context.pool)
    .await?;

    let results = rank_similar(event_id, &rows, query.effective())
        .into_iter()
        .map(|(event_id, score)| SimilarEvent { event_id, score })
        .collect();

    Ok(Json(SimilarEventsResponse { results }))
}

/// `GET /api/v1/users/{user_id}/recommendations`: events the user has not
/// interacted with, ranked by interest-weighted similarity to the events
/// they have.
async fn recommendations(
    State(context): State<Arc<AppContext>>,
    Path(user_id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let weights: Vec<WeightRow> = sqlx::query_as(
        "SELECT event_id, weight FROM user_event_weight WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(&context.pool)
    .await?;

    if weights.is_empty() {
        return Ok(Json(RecommendationsResponse { results: vec![] }));
    }

    let interacted: Vec<i64> = weights.iter().map(|w| w.event_id).collect();
    let similarities: Vec<SimilarityRow> = sqlx::query_as(
        "SELECT event_a, event_b, score FROM event_similarity
         WHERE event_a = ANY($1) OR event_b = ANY($1)",
    )
    .bind(&interacted)
    .fetch_all(&context.pool)
    .await?;

    let results = rank_recommendations(&weights, &similarities, query.effective())
        .into_iter()
        .map(|(event_id, _)| event_id)
        .collect();

    Ok(Json(RecommendationsResponse { results }))
}

pub fn router(context: Arc<AppContext>) -> Router {
    let liveness = context.liveness.clone();

    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/api/v1/events/:event_id/similar", get(similar_events))
        .route("/api/v1/users/:user_id/recommendations", get(recommendations))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}
