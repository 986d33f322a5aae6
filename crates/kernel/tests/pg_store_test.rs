#![allow(clippy::unwrap_used, clippy::expect_used)]
//! PostgreSQL document store tests.
//!
//! These run the real SQL against the database named by `DATABASE_URL`
//! and are skipped when it is unset. Each test works in its own scratch
//! copy of the `product` table and drops it afterwards.
//!
//! ## Running Tests
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/storefront_test cargo test --test pg_store_test
//! ```

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use common::{body_json, product_names};
use storefront_kernel::metrics::Metrics;
use storefront_kernel::shaper::{QueryDescription, QueryShaper, RequestParameters};
use storefront_kernel::store::{DocumentStore, PgDocumentStore};
use storefront_kernel::{AppState, db, routes};
use storefront_test_utils::{TestProduct, assert, test_product};

/// A scratch product table and a store bound to it.
struct Scratch {
    pool: PgPool,
    table: String,
    store: Arc<PgDocumentStore>,
}

impl Scratch {
    /// Connect and create the table, or `None` when no database is configured.
    async fn open() -> Option<Self> {
        dotenvy::dotenv().ok();
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping PostgreSQL store test");
            return None;
        };

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("Failed to connect to PostgreSQL");
        db::run_migrations(&pool).await.unwrap();

        let table = format!("product_{}", Uuid::now_v7().simple());
        sqlx::query(&format!(
            r#"CREATE TABLE "{table}" (LIKE product INCLUDING ALL)"#
        ))
        .execute(&pool)
        .await
        .unwrap();

        let store = Arc::new(PgDocumentStore::with_table(
            pool.clone(),
            Arc::new(Metrics::new()),
            table.clone(),
        ));
        Some(Self { pool, table, store })
    }

    async fn seed(&self, products: impl IntoIterator<Item = TestProduct>) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for product in products {
            self.store.insert(product.id, product.fields).await.unwrap();
            ids.push(product.id);
        }
        ids
    }

    /// Shape a listing from query pairs and return the product names.
    async fn names(&self, pairs: &[(&str, &str)]) -> Vec<String> {
        let params = RequestParameters::from_pairs(pairs.iter().copied());
        let query = QueryShaper::new(QueryDescription::default(), &params)
            .shape()
            .into_query();
        query
            .execute(self.store.as_ref())
            .await
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect()
    }

    /// Stored body, version key included.
    async fn raw(&self, id: Uuid) -> Value {
        let table = &self.table;
        sqlx::query_scalar::<_, Value>(&format!(r#"SELECT doc FROM "{table}" WHERE id = $1"#))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn close(self) {
        let table = &self.table;
        sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{table}""#))
            .execute(&self.pool)
            .await
            .unwrap();
        self.pool.close().await;
    }
}

fn catalog() -> Vec<TestProduct> {
    vec![
        test_product("Boot", "shoes", 120.0)
            .with_rating(4.5)
            .with_brand("Acme"),
        test_product("Sandal", "shoes", 40.0).with_rating(3.9),
        test_product("Cap", "hats", 20.0).with_rating(4.9),
        test_product("Runner", "shoes", 80.0).with_rating(4.3),
        test_product("Beanie", "hats", 15.0).with_rating(4.1),
    ]
}

#[tokio::test]
async fn equality_matches_numbers_and_strings() {
    let Some(scratch) = Scratch::open().await else {
        return;
    };
    scratch
        .seed([
            test_product("Boot", "shoes", 100.0).with_rating(4.5),
            test_product("Cap", "hats", 20.0),
            test_product("Agent", "007", 10.0).with_rating(4.0),
            test_product("Widget", "tools", 5.0)
                .with_rating(3.0)
                .with_field("sku", json!("1.50")),
        ])
        .await;

    assert_eq!(scratch.names(&[("price", "100")]).await, vec!["Boot"]);
    assert_eq!(scratch.names(&[("rating", "0")]).await, vec!["Cap"]);
    assert_eq!(scratch.names(&[("category", "007")]).await, vec!["Agent"]);
    assert_eq!(scratch.names(&[("sku", "1.50")]).await, vec!["Widget"]);
    assert_eq!(
        scratch.names(&[("price", "100"), ("price", "20")]).await,
        vec!["Boot", "Cap"]
    );

    let negated = QueryDescription::find(
        json!({"rating": {"$ne": 0}, "sku": {"$nin": ["2.00"]}})
            .as_object()
            .cloned()
            .unwrap(),
    )
    .order("created_at");
    let found = scratch.store.find(&negated).await.unwrap();
    let names: Vec<&str> = found.iter().map(|d| d["name"].as_str().unwrap()).collect();
    // Products without a sku still count as "not in"
    assert_eq!(names, vec!["Boot", "Agent", "Widget"]);

    scratch.close().await;
}

#[tokio::test]
async fn comparisons_sort_and_paginate() {
    let Some(scratch) = Scratch::open().await else {
        return;
    };
    scratch.seed(catalog()).await;

    assert_eq!(
        scratch
            .names(&[("category", "shoes"), ("price[gte]", "50"), ("sort", "-price")])
            .await,
        vec!["Boot", "Runner"]
    );
    assert_eq!(
        scratch.names(&[("rating[lt]", "4.2"), ("sort", "rating")]).await,
        vec!["Sandal", "Beanie"]
    );
    assert_eq!(
        scratch
            .names(&[("sort", "-rating,price"), ("page", "2"), ("limit", "2")])
            .await,
        vec!["Runner", "Beanie"]
    );
    assert!(
        scratch
            .names(&[("page", "9223372036854775807"), ("limit", "2")])
            .await
            .is_empty()
    );

    scratch.close().await;
}

#[tokio::test]
async fn projections() {
    let Some(scratch) = Scratch::open().await else {
        return;
    };
    scratch.seed(catalog()).await;

    let listed = QueryDescription::default()
        .project("name,price")
        .limit_results(0, 1)
        .execute(scratch.store.as_ref())
        .await
        .unwrap();
    assert::keys_eq(&listed[0], &["id", "name", "price"]);

    let listed = QueryDescription::default()
        .project("-__v")
        .execute(scratch.store.as_ref())
        .await
        .unwrap();
    assert_eq!(listed.len(), 5);
    assert!(listed[0].get("__v").is_none());
    assert::has_key(&listed[0], "id");

    let listed = QueryDescription::default()
        .project("-created_at,-updated_at")
        .execute(scratch.store.as_ref())
        .await
        .unwrap();
    assert!(listed[0].get("created_at").is_none());
    assert::has_key(&listed[0], "__v");

    scratch.close().await;
}

#[tokio::test]
async fn writes_and_lookups() {
    let Some(scratch) = Scratch::open().await else {
        return;
    };
    let product = test_product("Boot", "shoes", 120.0);
    let id = product.id;

    let inserted = scratch.store.insert(id, product.fields).await.unwrap();
    assert_eq!(inserted["id"], id.to_string());
    assert!(inserted.get("__v").is_none());

    let changes = json!({"price": 99.5}).as_object().cloned().unwrap();
    let updated = scratch.store.update(id, changes.clone()).await.unwrap().unwrap();
    assert_eq!(updated["price"], 99.5);
    assert_eq!(updated["name"], "Boot");
    assert_eq!(scratch.raw(id).await["__v"], 1);

    let found = scratch.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(found["price"], 99.5);

    let missing = Uuid::now_v7();
    assert!(scratch.store.update(missing, changes).await.unwrap().is_none());
    assert!(scratch.store.find_by_id(missing).await.unwrap().is_none());

    assert!(scratch.store.delete(id).await.unwrap());
    assert!(!scratch.store.delete(id).await.unwrap());

    scratch.close().await;
}

#[tokio::test]
async fn unsupported_operator_matches_nothing() {
    let Some(scratch) = Scratch::open().await else {
        return;
    };
    scratch.seed(catalog()).await;

    let query =
        QueryDescription::find(json!({"name": {"$regex": "^B"}}).as_object().cloned().unwrap());
    assert!(scratch.store.find(&query).await.unwrap().is_empty());

    scratch.close().await;
}

#[tokio::test]
async fn category_stats() {
    let Some(scratch) = Scratch::open().await else {
        return;
    };
    scratch
        .seed(catalog().into_iter().chain([
            test_product("Mystery", "shoes", 10.0)
                .with_rating(4.8)
                .with_field("price", json!("cheap")),
        ]))
        .await;

    let stats = scratch.store.category_stats(4.0).await.unwrap();

    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].category.as_deref(), Some("HATS"));
    assert_eq!(stats[0].num_products, 2);
    assert_eq!(stats[0].avg_price, Some(17.5));
    assert_eq!(stats[0].min_price, Some(15.0));
    assert_eq!(stats[0].max_price, Some(20.0));
    // A non-numeric price counts the product but not its price
    assert_eq!(stats[1].category.as_deref(), Some("SHOES"));
    assert_eq!(stats[1].num_products, 3);
    assert_eq!(stats[1].avg_price, Some(100.0));

    scratch.close().await;
}

#[tokio::test]
async fn listing_over_postgres() {
    let Some(scratch) = Scratch::open().await else {
        return;
    };
    scratch
        .seed([
            test_product("Boot", "shoes", 100.0),
            test_product("Cap", "hats", 20.0),
        ])
        .await;

    let state = AppState::from_parts(scratch.store.clone(), Arc::new(Metrics::new()), None);
    let request = Request::builder()
        .uri("/api/v1/products?price=100&fields=name,price")
        .body(Body::empty())
        .unwrap();
    let response = routes::app(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(product_names(&body), vec!["Boot"]);
    assert::keys_eq(&body["data"]["products"][0], &["id", "name", "price"]);

    scratch.close().await;
}
