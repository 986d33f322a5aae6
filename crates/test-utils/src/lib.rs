//! Storefront test utilities.
//!
//! Helpers for integration testing: product fixtures, an in-memory
//! document store, and JSON assertion helpers.

mod memory;

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use storefront_kernel::models::product::{CREATED_AT, UPDATED_AT, timestamp};
use storefront_kernel::shaper::VERSION_KEY;

pub use memory::MemoryDocumentStore;

/// Fixture clock: each new fixture is created one second after the last.
static FIXTURE_SECONDS: AtomicI64 = AtomicI64::new(0);

fn next_created_at() -> DateTime<Utc> {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    base + Duration::seconds(FIXTURE_SECONDS.fetch_add(1, Ordering::SeqCst))
}

/// Create a test product with default values.
///
/// Products built later in a test have later `created_at` stamps, so the
/// default listing order is build order.
pub fn test_product(name: &str, category: &str, price: f64) -> TestProduct {
    let stamp = timestamp(next_created_at());

    let mut fields = Map::new();
    fields.insert("name".to_string(), name.into());
    fields.insert("category".to_string(), category.into());
    fields.insert("price".to_string(), price.into());
    fields.insert("rating".to_string(), 0.0.into());
    fields.insert("num_reviews".to_string(), 0.into());
    fields.insert("count_in_stock".to_string(), 0.into());
    fields.insert(CREATED_AT.to_string(), stamp.clone().into());
    fields.insert(UPDATED_AT.to_string(), stamp.into());
    fields.insert(VERSION_KEY.to_string(), 0.into());

    TestProduct {
        id: Uuid::now_v7(),
        fields,
    }
}

/// A product fixture builder.
#[derive(Debug, Clone)]
pub struct TestProduct {
    pub id: Uuid,
    pub fields: Map<String, Value>,
}

impl TestProduct {
    /// Set a custom ID.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_rating(self, rating: f64) -> Self {
        self.with_field("rating", rating.into())
    }

    pub fn with_brand(self, brand: &str) -> Self {
        self.with_field("brand", brand.into())
    }

    /// Set any document field.
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Drop a document field.
    pub fn without(mut self, name: &str) -> Self {
        self.fields.remove(name);
        self
    }
}

/// Assertion helpers for JSON content.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON object has exactly these keys.
    pub fn keys_eq(value: &Value, expected: &[&str]) {
        let mut actual: Vec<&str> = value
            .as_object()
            .map(|object| object.keys().map(String::as_str).collect())
            .unwrap_or_default();
        actual.sort_unstable();
        let mut expected = expected.to_vec();
        expected.sort_unstable();
        assert_eq!(actual, expected, "key mismatch in {value}");
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_builder() {
        let product = test_product("Boot", "shoes", 120.0)
            .with_rating(4.5)
            .with_brand("Acme")
            .without("count_in_stock");

        assert_eq!(product.fields["name"], json!("Boot"));
        assert_eq!(product.fields["rating"], json!(4.5));
        assert_eq!(product.fields["brand"], json!("Acme"));
        assert_eq!(product.fields[VERSION_KEY], json!(0));
        assert!(!product.fields.contains_key("count_in_stock"));
    }

    #[test]
    fn fixtures_are_created_in_order() {
        let first = test_product("A", "x", 1.0);
        let second = test_product("B", "x", 1.0);

        let a = first.fields[CREATED_AT].as_str().unwrap().to_string();
        let b = second.fields[CREATED_AT].as_str().unwrap().to_string();
        assert!(a < b);
    }

    #[test]
    fn test_assertions() {
        let json = json!({"name": "test", "value": 42});
        assert::has_key(&json, "name");
        assert::keys_eq(&json, &["value", "name"]);
        assert::contains("hello world", "world");
    }
}
