//! Sitemap and permanent redirects for old query-string URLs.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::domain::seo::parse_legacy;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sitemap.xml", get(sitemap))
        .route("/product", get(legacy_redirect))
        .route("/products/:id", get(legacy_redirect))
        .route("/category", get(legacy_redirect))
}

async fn sitemap(State(s): State<AppState>) -> AppResult<Response> {
    let xml = s.catalog().sitemap(s.public_base_url()).await?;
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response())
}

/// Answers with 301 so search engines move their index to the slug URL.
async fn legacy_redirect(State(s): State<AppState>, uri: Uri, Query(query): Query<HashMap<String, String>>) -> AppResult<Response> {
    let target = parse_legacy(uri.path(), &query).ok_or_else(|| AppError::NotFound(uri.path().to_string()))?;
    let location = s
        .catalog()
        .resolve_legacy(target)
        .await?
        .ok_or_else(|| AppError::NotFound(uri.to_string()))?;
    Ok((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response())
}
