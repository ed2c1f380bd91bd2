//! Customer-facing order endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::domain::aggregates::ReturnRequest;
use crate::error::AppResult;
use crate::services::orders::OrderTracking;
use crate::services::returns::ReturnInput;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/orders/:id/track", get(track))
        .route("/api/v1/orders/:id/cancel", post(cancel))
        .route("/api/v1/returns", post(open_return))
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery { pub email: String }

async fn track(State(s): State<AppState>, Path(id): Path<String>, Query(q): Query<EmailQuery>) -> AppResult<Json<OrderTracking>> {
    Ok(Json(s.orders().track(&id, &q.email).await?))
}

async fn cancel(State(s): State<AppState>, Path(id): Path<String>, Json(q): Json<EmailQuery>) -> AppResult<Json<OrderTracking>> {
    let order = s.orders().cancel(&id, &q.email).await?;
    Ok(Json(OrderTracking::from(&order)))
}

async fn open_return(State(s): State<AppState>, Json(r): Json<ReturnInput>) -> AppResult<(StatusCode, Json<ReturnRequest>)> {
    Ok((StatusCode::CREATED, Json(s.returns().open(r).await?)))
}
