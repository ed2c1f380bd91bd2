//! Public catalog endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::api::PaginatedResponse;
use crate::domain::aggregates::{Category, Product, User};
use crate::domain::pricing::Dimensions;
use crate::domain::seo;
use crate::domain::value_objects::{Money, Sku};
use crate::error::AppResult;
use crate::services::catalog::ProductFilter;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:slug", get(get_product))
        .route("/api/v1/products/:slug/quote", post(quote))
        .route("/api/v1/products/:slug/reviews", post(add_review))
        .route("/api/v1/products/:slug/questions", post(ask_question))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/categories/:slug", get(get_category))
        .route("/api/v1/users/:id/wishlist/:product_id", post(toggle_wishlist))
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Product as the storefront renders it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub path: String,
    pub average_rating: Option<Decimal>,
    pub in_stock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub made_to_measure_sku: Option<Sku>,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            path: seo::product_path(product.slug()),
            average_rating: product.average_rating(),
            in_stock: product.is_in_stock(),
            made_to_measure_sku: product.made_to_measure_sku(),
            product,
        }
    }
}

async fn list_products(State(s): State<AppState>, Query(p): Query<ProductQuery>) -> AppResult<Json<PaginatedResponse<ProductView>>> {
    let filter = ProductFilter { category: p.category, q: p.q, include_inactive: false };
    let products = s.catalog().list_products(&filter).await?.into_iter().map(ProductView::from).collect();
    Ok(Json(PaginatedResponse::paginate(products, p.page, p.per_page)))
}

async fn get_product(State(s): State<AppState>, Path(slug): Path<String>) -> AppResult<Json<ProductView>> {
    Ok(Json(s.catalog().product_by_slug(&slug).await?.into()))
}

async fn quote(State(s): State<AppState>, Path(slug): Path<String>, Json(dims): Json<Dimensions>) -> AppResult<Json<Value>> {
    let price: Money = s.catalog().quote(&slug, dims).await?;
    Ok(Json(json!({ "dimensions": dims.to_string(), "price": price })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(length(min = 1, max = 80))]
    pub author: String,
    pub rating: u8,
    #[validate(length(max = 2000))]
    pub comment: String,
}

async fn add_review(State(s): State<AppState>, Path(slug): Path<String>, Json(r): Json<ReviewRequest>) -> AppResult<(StatusCode, Json<ProductView>)> {
    r.validate()?;
    let product = s.catalog().add_review(&slug, &r.author, r.rating, &r.comment).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuestionRequest {
    #[validate(length(min = 1, max = 80))]
    pub author: String,
    #[validate(length(min = 3, max = 1000))]
    pub text: String,
}

async fn ask_question(State(s): State<AppState>, Path(slug): Path<String>, Json(r): Json<QuestionRequest>) -> AppResult<(StatusCode, Json<Value>)> {
    r.validate()?;
    let id = s.catalog().ask_question(&slug, &r.author, &r.text).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn list_categories(State(s): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(s.catalog().list_categories().await?))
}

async fn get_category(State(s): State<AppState>, Path(slug): Path<String>) -> AppResult<Json<Category>> {
    Ok(Json(s.catalog().category_by_slug(&slug).await?))
}

async fn toggle_wishlist(State(s): State<AppState>, Path((user_id, product_id)): Path<(String, String)>) -> AppResult<Json<User>> {
    Ok(Json(s.catalog().toggle_wishlist(&user_id, &product_id).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::app;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn amount(v: &serde_json::Value) -> Decimal { v.as_str().unwrap().parse().unwrap() }

    fn product(name: &str) -> serde_json::Value {
        json!({
            "name": name, "price": "250", "publish": true,
            "variants": [{ "sku": "FON-1", "color": "Gri", "price": "250", "stock": 4 }],
            "customSizing": { "pricePerMeter": { "amount": "100", "currency": "TRY" }, "minWidthCm": 50, "maxWidthCm": 600, "minHeightCm": 50, "maxHeightCm": 300 }
        })
    }

    #[tokio::test]
    async fn test_browse_and_quote() {
        let app = app();
        let (status, created) = app.admin("POST", "/api/v1/admin/products", Some(product("Şönil Fon"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["slug"], "sonil-fon");

        let (status, list) = app.call("GET", "/api/v1/products?q=sonil", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total"], 1);
        assert_eq!(list["data"][0]["path"], "/urun/sonil-fon");

        let (status, quote) = app.call("POST", "/api/v1/products/sonil-fon/quote", Some(json!({ "widthCm": 200, "heightCm": 240 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(amount(&quote["price"]["amount"]), Decimal::new(190, 0));

        let (status, _) = app.call("POST", "/api/v1/products/sonil-fon/quote", Some(json!({ "widthCm": 900, "heightCm": 240 }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, _) = app.call("GET", "/api/v1/products/yok", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reviews() {
        let app = app();
        app.admin("POST", "/api/v1/admin/products", Some(product("Fon"))).await;
        let (status, body) = app.call("POST", "/api/v1/products/fon/reviews", Some(json!({ "author": "Ayşe", "rating": 4, "comment": "Güzel" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(amount(&body["averageRating"]), Decimal::new(4, 0));
        let (status, _) = app.call("POST", "/api/v1/products/fon/reviews", Some(json!({ "author": "A", "rating": 9, "comment": "" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
