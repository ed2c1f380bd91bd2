//! Cart, checkout and the payment gateway callback.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Form, Json, Router,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::services::checkout::{AddItemInput, CartView, CheckoutInput, CheckoutResult};
use crate::services::payment::PaymentCallback;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/cart/:session", get(get_cart).post(add_item).delete(clear_cart))
        .route("/api/v1/cart/:session/items/:key", put(update_item).delete(remove_item))
        .route("/api/v1/cart/:session/coupon", post(apply_coupon).delete(remove_coupon))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/payments/callback", post(payment_callback))
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> AppResult<Json<CartView>> {
    Ok(Json(s.checkout().view(&session).await?))
}

async fn add_item(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddItemInput>) -> AppResult<(StatusCode, Json<CartView>)> {
    Ok((StatusCode::CREATED, Json(s.checkout().add_item(&session, r).await?)))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> AppResult<StatusCode> {
    s.checkout().clear(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest { pub quantity: u32 }

async fn update_item(State(s): State<AppState>, Path((session, key)): Path<(String, String)>, Json(r): Json<QuantityRequest>) -> AppResult<Json<CartView>> {
    Ok(Json(s.checkout().update_item(&session, &key, r.quantity).await?))
}

async fn remove_item(State(s): State<AppState>, Path((session, key)): Path<(String, String)>) -> AppResult<Json<CartView>> {
    Ok(Json(s.checkout().remove_item(&session, &key).await?))
}

#[derive(Debug, Deserialize)]
pub struct CouponRequest { pub code: String }

async fn apply_coupon(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<CouponRequest>) -> AppResult<Json<CartView>> {
    Ok(Json(s.checkout().apply_coupon(&session, &r.code).await?))
}

async fn remove_coupon(State(s): State<AppState>, Path(session): Path<String>) -> AppResult<Json<CartView>> {
    Ok(Json(s.checkout().remove_coupon(&session).await?))
}

/// First address in `X-Forwarded-For`; the service runs behind a proxy.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

async fn checkout(State(s): State<AppState>, headers: HeaderMap, Json(mut r): Json<CheckoutInput>) -> AppResult<(StatusCode, Json<CheckoutResult>)> {
    r.user_ip = client_ip(&headers);
    Ok((StatusCode::CREATED, Json(s.checkout().checkout(r).await?)))
}

/// The gateway expects a bare `OK` once the notification is handled.
async fn payment_callback(State(s): State<AppState>, Form(callback): Form<PaymentCallback>) -> AppResult<&'static str> {
    s.checkout().payment_callback(callback).await?;
    Ok("OK")
}
