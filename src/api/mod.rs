//! HTTP surface.

mod admin;
mod cart;
mod catalog;
mod orders;
mod seo;

use std::path::Path;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::state::AppState;

pub use admin::{Admin, ADMIN_TOKEN_HEADER};

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: u32,
}

impl<T> PaginatedResponse<T> {
    /// Cuts one page out of an already filtered and sorted list.
    pub fn paginate(items: Vec<T>, page: Option<u32>, per_page: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(20).clamp(1, 100);
        let total = items.len();
        let skip = usize::try_from((page - 1) * per_page).unwrap_or(usize::MAX);
        let data = items.into_iter().skip(skip).take(per_page as usize).collect();
        Self { data, total, page }
    }
}

pub fn router(state: AppState, media_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "healthy", "service": "perde-storefront" })) }))
        .merge(catalog::routes())
        .merge(cart::routes())
        .merge(orders::routes())
        .merge(seo::routes())
        .nest("/api/v1/admin", admin::routes())
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::domain::aggregates::ShippingPolicy;
    use crate::services::notifications::testing::RecordingNotifier;
    use crate::services::payment::testing::FakeGateway;
    use crate::services::LocalMediaStore;
    use crate::state::{AppState, Backends};
    use crate::storage::Collections;

    pub const TOKEN: &str = "secret-admin";

    pub struct TestApp {
        pub router: Router,
        pub db: Collections,
        pub notifier: Arc<RecordingNotifier>,
    }

    pub fn app() -> TestApp {
        let db = Collections::in_memory();
        let notifier = Arc::new(RecordingNotifier::default());
        let media_dir = std::env::temp_dir().join(format!("perde-api-{}", uuid::Uuid::new_v4()));
        let backends = Backends {
            db: db.clone(),
            notifier: notifier.clone(),
            payments: Arc::new(FakeGateway),
            media: Arc::new(LocalMediaStore::new(&media_dir, "/media")),
            shipping: ShippingPolicy::default(),
        };
        let state = AppState::new(backends, TOKEN, "https://perde.test");
        TestApp { router: super::router(state, &media_dir), db, notifier }
    }

    impl TestApp {
        pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }

        pub async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            self.send(request(method, uri, body, None)).await
        }

        pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            self.send(request(method, uri, body, Some(TOKEN))).await
        }
    }

    pub fn request(method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(super::ADMIN_TOKEN_HEADER, token);
        }
        match body {
            Some(json) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(json.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }
}
