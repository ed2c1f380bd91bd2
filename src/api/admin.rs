//! Back-office endpoints, guarded by a shared token.

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::api::PaginatedResponse;
use crate::domain::aggregates::{Category, Coupon, Order, OrderStatus, Product, ReturnRequest, ReturnStatus, User};
use crate::error::{AppError, AppResult};
use crate::services::catalog::{CategoryInput, CouponInput, ProductFilter, ProductInput, SlugChange};
use crate::services::media::MAX_IMAGE_BYTES;
use crate::services::orders::StatusUpdate;
use crate::services::returns::ResolveInput;
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Extractor that rejects requests without the admin token.
pub struct Admin;

#[async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts.headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
        if presented.is_empty() || presented != state.admin_token() {
            tracing::warn!(path = %parts.uri.path(), "rejected admin request");
            return Err(AppError::Unauthorized);
        }
        Ok(Self)
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/products/:id/publish", post(publish_product))
        .route("/products/:id/deal", put(set_deal).delete(reset_deal))
        .route(
            "/products/:id/images",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
        .route("/products/:id/questions/:question_id/answer", post(answer_question))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route("/coupons/:id", put(set_coupon_active).delete(delete_coupon))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_order_status))
        .route("/returns", get(list_returns))
        .route("/returns/:id", put(resolve_return))
        .route("/users/:id", put(upsert_user))
        .route("/seo/migrate-slugs", post(migrate_slugs))
}

// ---- products ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AdminProductQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

async fn list_products(_: Admin, State(s): State<AppState>, Query(p): Query<AdminProductQuery>) -> AppResult<Json<PaginatedResponse<Product>>> {
    let filter = ProductFilter { category: p.category, q: p.q, include_inactive: true };
    let products = s.catalog().list_products(&filter).await?;
    Ok(Json(PaginatedResponse::paginate(products, p.page, p.per_page)))
}

async fn get_product(_: Admin, State(s): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Product>> {
    Ok(Json(s.catalog().product(&id).await?))
}

async fn create_product(_: Admin, State(s): State<AppState>, Json(r): Json<ProductInput>) -> AppResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.catalog().create_product(r).await?)))
}

async fn update_product(_: Admin, State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ProductInput>) -> AppResult<Json<Product>> {
    Ok(Json(s.catalog().update_product(&id, r).await?))
}

async fn delete_product(_: Admin, State(s): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    s.catalog().delete_product(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest { pub publish: bool }

async fn publish_product(_: Admin, State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<PublishRequest>) -> AppResult<Json<Product>> {
    Ok(Json(s.catalog().publish_product(&id, r.publish).await?))
}

#[derive(Debug, Deserialize)]
pub struct DealRequest { pub price: Decimal }

async fn set_deal(_: Admin, State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<DealRequest>) -> AppResult<Json<Product>> {
    Ok(Json(s.catalog().set_deal_price(&id, r.price).await?))
}

async fn reset_deal(_: Admin, State(s): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Product>> {
    Ok(Json(s.catalog().reset_deal_price(&id).await?))
}

/// Multipart form with a `file` part and an optional `alt` text part.
async fn upload_image(_: Admin, State(s): State<AppState>, Path(id): Path<String>, mut form: Multipart) -> AppResult<(StatusCode, Json<Product>)> {
    let mut file = None;
    let mut alt = None;
    while let Some(field) = form.next_field().await.map_err(|e| AppError::BadRequest(e.to_string()))? {
        let part = field.name().unwrap_or_default().to_string();
        match part.as_str() {
            "file" => {
                let name = field.file_name().unwrap_or("gorsel").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| AppError::BadRequest(e.to_string()))?;
                file = Some((name, content_type, bytes));
            }
            "alt" => alt = Some(field.text().await.map_err(|e| AppError::BadRequest(e.to_string()))?),
            _ => {}
        }
    }
    let (name, content_type, bytes) = file.ok_or_else(|| AppError::BadRequest("missing file part".into()))?;
    let product = s.catalog().attach_image(&id, &name, &content_type, alt.filter(|a| !a.trim().is_empty()), &bytes).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest { pub answer: String }

async fn answer_question(_: Admin, State(s): State<AppState>, Path((id, question_id)): Path<(String, String)>, Json(r): Json<AnswerRequest>) -> AppResult<Json<Product>> {
    if r.answer.trim().is_empty() { return Err(AppError::BadRequest("answer is empty".into())); }
    Ok(Json(s.catalog().answer_question(&id, &question_id, &r.answer).await?))
}

// ---- categories & coupons ---------------------------------------------------

async fn list_categories(_: Admin, State(s): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(s.catalog().list_categories().await?))
}

async fn create_category(_: Admin, State(s): State<AppState>, Json(r): Json<CategoryInput>) -> AppResult<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(s.catalog().create_category(r).await?)))
}

async fn update_category(_: Admin, State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<CategoryInput>) -> AppResult<Json<Category>> {
    Ok(Json(s.catalog().update_category(&id, r).await?))
}

async fn delete_category(_: Admin, State(s): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    s.catalog().delete_category(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_coupons(_: Admin, State(s): State<AppState>) -> AppResult<Json<Vec<Coupon>>> {
    Ok(Json(s.catalog().list_coupons().await?))
}

async fn create_coupon(_: Admin, State(s): State<AppState>, Json(r): Json<CouponInput>) -> AppResult<(StatusCode, Json<Coupon>)> {
    Ok((StatusCode::CREATED, Json(s.catalog().create_coupon(r).await?)))
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest { pub active: bool }

async fn set_coupon_active(_: Admin, State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ActiveRequest>) -> AppResult<Json<Coupon>> {
    Ok(Json(s.catalog().set_coupon_active(&id, r.active).await?))
}

async fn delete_coupon(_: Admin, State(s): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    s.catalog().delete_coupon(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- orders & returns -------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

async fn list_orders(_: Admin, State(s): State<AppState>, Query(q): Query<OrderQuery>) -> AppResult<Json<PaginatedResponse<Order>>> {
    let orders = s.orders().list(q.status).await?;
    Ok(Json(PaginatedResponse::paginate(orders, q.page, q.per_page)))
}

async fn get_order(_: Admin, State(s): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Order>> {
    Ok(Json(s.orders().get(&id).await?))
}

async fn update_order_status(_: Admin, State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<StatusUpdate>) -> AppResult<Json<Order>> {
    Ok(Json(s.orders().update_status(&id, r).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery { pub status: Option<ReturnStatus> }

async fn list_returns(_: Admin, State(s): State<AppState>, Query(q): Query<ReturnQuery>) -> AppResult<Json<Vec<ReturnRequest>>> {
    Ok(Json(s.returns().list(q.status).await?))
}

async fn resolve_return(_: Admin, State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ResolveInput>) -> AppResult<Json<ReturnRequest>> {
    Ok(Json(s.returns().resolve(&id, r).await?))
}

// ---- users & maintenance ----------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub email: String,
    pub display_name: Option<String>,
}

async fn upsert_user(_: Admin, State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<UserRequest>) -> AppResult<Json<User>> {
    Ok(Json(s.catalog().upsert_user(&id, &r.email, r.display_name).await?))
}

async fn migrate_slugs(_: Admin, State(s): State<AppState>) -> AppResult<Json<Vec<SlugChange>>> {
    Ok(Json(s.catalog().migrate_slugs().await?))
}
