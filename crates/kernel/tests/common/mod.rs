#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! [`TestApp`] runs the real router and state over an in-memory document
//! store, so HTTP behaviour is exercised end to end without PostgreSQL.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use storefront_kernel::AppState;
use storefront_kernel::metrics::Metrics;
use storefront_kernel::routes;
use storefront_test_utils::{MemoryDocumentStore, TestProduct};

/// Admin token configured on [`TestApp::new`].
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Test application wrapper using the real kernel routes and state.
pub struct TestApp {
    router: Router,
    pub store: Arc<MemoryDocumentStore>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_admin_token(Some(ADMIN_TOKEN))
    }

    pub fn with_admin_token(admin_token: Option<&str>) -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        let state = AppState::from_parts(
            store.clone(),
            Arc::new(Metrics::new()),
            admin_token.map(str::to_string),
        );
        let router = routes::app(state.clone());

        Self {
            router,
            store,
            state,
        }
    }

    /// Seed fixtures and return their ids in order.
    pub fn seed(&self, products: impl IntoIterator<Item = TestProduct>) -> Vec<uuid::Uuid> {
        self.store.seed(products)
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// GET a path and decode the JSON body.
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.request(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Send a JSON body, optionally with a bearer token.
    pub async fn send_json(
        &self,
        method: Method,
        uri: &str,
        body: &Value,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = self
            .request(builder.body(Body::from(body.to_string())).unwrap())
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// DELETE a path, optionally with a bearer token.
    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::DELETE).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = self.request(builder.body(Body::empty()).unwrap()).await;
        let status = response.status();
        (status, body_json(response).await)
    }
}

/// Decode a response body as JSON; an empty body decodes to `null`.
pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is not JSON")
    }
}

/// Response body as text.
pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `name` of every product in a listing response.
pub fn product_names(body: &Value) -> Vec<String> {
    body["data"]["products"]
        .as_array()
        .expect("listing has a products array")
        .iter()
        .map(|p| p["name"].as_str().unwrap_or_default().to_string())
        .collect()
}
