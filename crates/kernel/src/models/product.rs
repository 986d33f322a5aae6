//! Product documents and write validation.
//!
//! Products are stored as JSON documents. Writes go through [`NewProduct`]
//! and [`ProductPatch`], which check the catalog constraints and produce the
//! document body (or the set of changed keys) for the store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::shaper::VERSION_KEY;

/// Maximum product name length, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Highest allowed rating.
pub const MAX_RATING: f64 = 5.0;

/// Minimum rating for a product to count towards category stats.
pub const STATS_MIN_RATING: f64 = 4.2;

/// Document key holding the creation timestamp.
pub const CREATED_AT: &str = "created_at";

/// Document key holding the last-change timestamp.
pub const UPDATED_AT: &str = "updated_at";

/// One or more constraint violations on a product write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid product data: {}", .0.join(". "))]
pub struct ValidationError(pub Vec<String>);

/// Input for creating a product.
///
/// Every field is optional at the deserialization layer so that a missing
/// required field is reported as a validation failure, not a parse error.
/// Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProduct {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub price: Option<f64>,
    pub rating: Option<f64>,
    pub num_reviews: Option<i64>,
    pub count_in_stock: Option<i64>,
}

/// Input for updating a product. Only supplied fields are validated and
/// written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub price: Option<f64>,
    pub rating: Option<f64>,
    pub num_reviews: Option<i64>,
    pub count_in_stock: Option<i64>,
}

/// Per-category aggregate for the stats endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryStats {
    /// Upper-cased category; `None` groups products without one.
    pub category: Option<String>,
    pub num_products: i64,
    pub avg_rating: Option<f64>,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Render a timestamp the way documents store it.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl NewProduct {
    /// Validate and build the stored document body.
    pub fn into_document(self, now: DateTime<Utc>) -> Result<Map<String, Value>, ValidationError> {
        let mut errors = Vec::new();

        let name = match self.name.as_deref().map(str::trim) {
            Some(name) => check_name(name, &mut errors).then(|| name.to_string()),
            None => {
                errors.push("a product must have a name".to_string());
                None
            }
        };
        let category = match self.category.as_deref().map(str::trim) {
            Some(category) => check_category(category, &mut errors).then(|| category.to_string()),
            None => {
                errors.push("a product must have a category".to_string());
                None
            }
        };
        match self.price {
            Some(price) => {
                check_price(price, &mut errors);
            }
            None => errors.push("a product must have a price".to_string()),
        }
        let rating = self.rating.unwrap_or(0.0);
        check_rating(rating, &mut errors);
        let num_reviews = self.num_reviews.unwrap_or(0);
        check_count("num_reviews", num_reviews, &mut errors);
        let count_in_stock = self.count_in_stock.unwrap_or(0);
        check_count("count_in_stock", count_in_stock, &mut errors);

        if !errors.is_empty() {
            return Err(ValidationError(errors));
        }

        let mut document = Map::new();
        insert_some(&mut document, "name", name);
        insert_some(&mut document, "brand", trimmed(self.brand));
        insert_some(&mut document, "category", category);
        insert_some(&mut document, "description", trimmed(self.description));
        insert_some(&mut document, "short_description", trimmed(self.short_description));
        insert_some(&mut document, "image", trimmed(self.image));
        insert_some(&mut document, "price", self.price);
        document.insert("rating".to_string(), rating.into());
        document.insert("num_reviews".to_string(), num_reviews.into());
        document.insert("count_in_stock".to_string(), count_in_stock.into());
        let stamp = timestamp(now);
        document.insert(CREATED_AT.to_string(), stamp.clone().into());
        document.insert(UPDATED_AT.to_string(), stamp.into());
        document.insert(VERSION_KEY.to_string(), 0.into());

        Ok(document)
    }
}

impl ProductPatch {
    /// Validate the supplied fields and build the set of changed keys.
    pub fn into_changes(self, now: DateTime<Utc>) -> Result<Map<String, Value>, ValidationError> {
        let mut errors = Vec::new();

        let name = self.name.as_deref().map(str::trim);
        if let Some(name) = name {
            check_name(name, &mut errors);
        }
        let category = self.category.as_deref().map(str::trim);
        if let Some(category) = category {
            check_category(category, &mut errors);
        }
        if let Some(price) = self.price {
            check_price(price, &mut errors);
        }
        if let Some(rating) = self.rating {
            check_rating(rating, &mut errors);
        }
        if let Some(num_reviews) = self.num_reviews {
            check_count("num_reviews", num_reviews, &mut errors);
        }
        if let Some(count_in_stock) = self.count_in_stock {
            check_count("count_in_stock", count_in_stock, &mut errors);
        }

        if !errors.is_empty() {
            return Err(ValidationError(errors));
        }

        let mut changes = Map::new();
        insert_some(&mut changes, "name", name.map(str::to_string));
        insert_some(&mut changes, "brand", trimmed(self.brand));
        insert_some(&mut changes, "category", category.map(str::to_string));
        insert_some(&mut changes, "description", trimmed(self.description));
        insert_some(
            &mut changes,
            "short_description",
            trimmed(self.short_description),
        );
        insert_some(&mut changes, "image", trimmed(self.image));
        insert_some(&mut changes, "price", self.price);
        insert_some(&mut changes, "rating", self.rating);
        insert_some(&mut changes, "num_reviews", self.num_reviews);
        insert_some(&mut changes, "count_in_stock", self.count_in_stock);
        changes.insert(UPDATED_AT.to_string(), timestamp(now).into());

        Ok(changes)
    }
}

fn check_name(name: &str, errors: &mut Vec<String>) -> bool {
    if name.is_empty() {
        errors.push("a product must have a name".to_string());
        return false;
    }
    if name.chars().count() > MAX_NAME_LEN {
        errors.push(format!(
            "a product name must have at most {MAX_NAME_LEN} characters"
        ));
        return false;
    }
    true
}

fn check_category(category: &str, errors: &mut Vec<String>) -> bool {
    if category.is_empty() {
        errors.push("a product must have a category".to_string());
        return false;
    }
    true
}

fn check_price(price: f64, errors: &mut Vec<String>) {
    if !price.is_finite() || price < 0.0 {
        errors.push("price must be a non-negative number".to_string());
    }
}

fn check_rating(rating: f64, errors: &mut Vec<String>) {
    if !rating.is_finite() || !(0.0..=MAX_RATING).contains(&rating) {
        errors.push(format!("rating must be between 0 and {MAX_RATING}"));
    }
}

fn check_count(field: &str, value: i64, errors: &mut Vec<String>) {
    if value < 0 {
        errors.push(format!("{field} must not be negative"));
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

fn insert_some<T: Into<Value>>(document: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        document.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sneaker() -> NewProduct {
        NewProduct {
            name: Some("  Trail Runner ".to_string()),
            brand: Some("Acme".to_string()),
            category: Some("shoes".to_string()),
            price: Some(89.5),
            rating: Some(4.6),
            ..Default::default()
        }
    }

    #[test]
    fn new_product_document() {
        let document = sneaker().into_document(now()).unwrap();

        assert_eq!(document["name"], json!("Trail Runner"));
        assert_eq!(document["category"], json!("shoes"));
        assert_eq!(document["price"], json!(89.5));
        assert_eq!(document["num_reviews"], json!(0));
        assert_eq!(document["created_at"], json!("2024-05-01T12:00:00.000Z"));
        assert_eq!(document["created_at"], document["updated_at"]);
        assert_eq!(document["__v"], json!(0));
        assert!(!document.contains_key("description"));
    }

    #[test]
    fn missing_required_fields_are_reported_together() {
        let err = NewProduct::default().into_document(now()).unwrap_err();

        assert_eq!(err.0.len(), 3);
        assert!(err.to_string().contains("a product must have a name"));
        assert!(err.to_string().contains("a product must have a price"));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let product = NewProduct {
            rating: Some(7.0),
            price: Some(-1.0),
            count_in_stock: Some(-2),
            ..sneaker()
        };
        let err = product.into_document(now()).unwrap_err();
        assert_eq!(err.0.len(), 3);
    }

    #[test]
    fn long_name_is_rejected() {
        let product = NewProduct {
            name: Some("x".repeat(MAX_NAME_LEN + 1)),
            ..sneaker()
        };
        assert!(product.into_document(now()).is_err());
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let patch = ProductPatch {
            price: Some(79.0),
            ..Default::default()
        };
        let changes = patch.into_changes(now()).unwrap();

        assert_eq!(changes.len(), 2);
        assert_eq!(changes["price"], json!(79.0));
        assert_eq!(changes["updated_at"], json!("2024-05-01T12:00:00.000Z"));
    }

    #[test]
    fn patch_runs_validators() {
        let patch = ProductPatch {
            name: Some("   ".to_string()),
            rating: Some(-0.5),
            ..Default::default()
        };
        let err = patch.into_changes(now()).unwrap_err();
        assert_eq!(err.0.len(), 2);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let product: NewProduct =
            serde_json::from_value(json!({"name": "Sock", "colour": "red"})).unwrap();
        assert_eq!(product.name.as_deref(), Some("Sock"));
    }
}
