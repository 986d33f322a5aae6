//! Product catalog routes.
//!
//! Listings run the query shaper over the request's query string; mutations
//! sit behind the admin token gate.

use axum::{
    Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    handler::Handler,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json,
    routing::get,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::require_admin;
use crate::models::product::STATS_MIN_RATING;
use crate::models::{CategoryStats, NewProduct, ProductPatch};
use crate::shaper::{QueryDescription, QueryShaper, RequestParameters};
use crate::state::AppState;

/// Page size forced by the cheapest-top-rated alias.
pub const TOP_CHEAP_LIMIT: &str = "5";

/// Ordering forced by the cheapest-top-rated alias.
pub const TOP_CHEAP_SORT: &str = "-rating,price";

/// Projection forced by the cheapest-top-rated alias.
pub const TOP_CHEAP_FIELDS: &str = "name,price,rating,short_description,brand";

/// Create the product router.
pub fn router(state: &AppState) -> Router<AppState> {
    let admin = from_fn_with_state(state.clone(), require_admin);

    Router::new()
        .route(
            "/api/v1/products",
            get(list_products).post(create_product.layer(admin.clone())),
        )
        .route("/api/v1/products/top-5-cheap", get(top_cheap_products))
        .route("/api/v1/products/product-stats", get(product_stats))
        .route(
            "/api/v1/products/{id}",
            get(get_product)
                .patch(update_product.layer(admin.clone()))
                .delete(delete_product.layer(admin)),
        )
        .route(
            "/api/v1/categories/{category}/products",
            get(list_category_products),
        )
}

// -------------------------------------------------------------------------
// Response types
// -------------------------------------------------------------------------

/// Success envelope.
#[derive(Debug, Serialize)]
struct Envelope<T> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<usize>,
    data: T,
}

impl<T> Envelope<T> {
    fn success(data: T) -> Self {
        Self {
            status: "success",
            results: None,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
struct ProductList {
    products: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ProductBody {
    product: Value,
}

#[derive(Debug, Serialize)]
struct StatsBody {
    stats: Vec<CategoryStats>,
}

type ListResponse = Json<Envelope<ProductList>>;

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> AppResult<ListResponse> {
    let params = request_parameters(query)?;
    run_listing(&state, QueryDescription::default(), &params).await
}

/// Top rated products, cheapest first, with a compact projection.
///
/// Other parameters (filters, `page`) still apply.
async fn top_cheap_products(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> AppResult<ListResponse> {
    let mut params = request_parameters(query)?;
    params.limit = Some(TOP_CHEAP_LIMIT.to_string());
    params.sort = Some(TOP_CHEAP_SORT.to_string());
    params.fields = Some(TOP_CHEAP_FIELDS.to_string());

    run_listing(&state, QueryDescription::default(), &params).await
}

async fn list_category_products(
    State(state): State<AppState>,
    Path(category): Path<String>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> AppResult<ListResponse> {
    let params = request_parameters(query)?;
    let base = QueryDescription::find_by("category", category);
    run_listing(&state, base, &params).await
}

async fn product_stats(State(state): State<AppState>) -> AppResult<Json<Envelope<StatsBody>>> {
    let stats = state.store().category_stats(STATS_MIN_RATING).await?;
    Ok(Json(Envelope::success(StatsBody { stats })))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<ProductBody>>> {
    let id = parse_id(&id)?;
    let product = state
        .store()
        .find_by_id(id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(Envelope::success(ProductBody { product })))
}

async fn create_product(
    State(state): State<AppState>,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Envelope<ProductBody>>)> {
    let Json(input) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let document = input.into_document(Utc::now())?;

    let id = Uuid::now_v7();
    let product = state.store().insert(id, document).await?;
    info!(%id, "product created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(ProductBody { product })),
    ))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ProductPatch>, JsonRejection>,
) -> AppResult<Json<Envelope<ProductBody>>> {
    let id = parse_id(&id)?;
    let Json(patch) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let changes = patch.into_changes(Utc::now())?;

    let product = state
        .store()
        .update(id, changes)
        .await?
        .ok_or_else(not_found)?;
    info!(%id, "product updated");

    Ok(Json(Envelope::success(ProductBody { product })))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_id(&id)?;
    if !state.store().delete(id).await? {
        return Err(not_found());
    }
    info!(%id, "product deleted");

    Ok(StatusCode::NO_CONTENT)
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

async fn run_listing(
    state: &AppState,
    base: QueryDescription,
    params: &RequestParameters,
) -> AppResult<ListResponse> {
    let query = QueryShaper::new(base, params).shape().into_query();
    let products = query.execute(state.store()).await?;
    debug!(
        results = products.len(),
        skip = query.skip(),
        "product listing"
    );

    Ok(Json(Envelope {
        status: "success",
        results: Some(products.len()),
        data: ProductList { products },
    }))
}

fn request_parameters(
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> AppResult<RequestParameters> {
    let Query(pairs) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    Ok(RequestParameters::from_pairs(pairs))
}

fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid id: {raw}")))
}

fn not_found() -> AppError {
    AppError::NotFound("no product found with that id".to_string())
}
