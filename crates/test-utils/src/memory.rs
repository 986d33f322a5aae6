//! In-memory document store.
//!
//! Evaluates query descriptions the way the PostgreSQL store's SQL does:
//! scalar equality on text renderings, JSONB ordering for comparisons and
//! sorts (missing fields sort last ascending, first descending), primary key
//! as the final tiebreaker.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

use storefront_kernel::models::CategoryStats;
use storefront_kernel::shaper::{
    AND_OPERATOR, ID_FIELD, Projection, QueryDescription, SortDirection, VERSION_KEY,
    coerce_scalar,
};
use storefront_kernel::store::{DocumentStore, StoreError};

use crate::TestProduct;

/// Thread-safe document store for router tests.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<Uuid, Map<String, Value>>>,
    available: AtomicBool,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Store fixtures as-is, bypassing validation.
    pub fn seed(&self, products: impl IntoIterator<Item = TestProduct>) -> Vec<Uuid> {
        let mut documents = self.documents.write();
        products
            .into_iter()
            .map(|product| {
                documents.insert(product.id, product.fields);
                product.id
            })
            .collect()
    }

    /// Raw stored document, version key included.
    pub fn raw(&self, id: Uuid) -> Option<Map<String, Value>> {
        self.documents.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Simulate losing the connection: every call fails as unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::from(sqlx::Error::PoolTimedOut))
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(&self, query: &QueryDescription) -> Result<Vec<Value>, StoreError> {
        self.check_available()?;

        let documents = self.documents.read();
        let mut matched: Vec<(Uuid, &Map<String, Value>)> = documents
            .iter()
            .filter(|(id, doc)| matches(**id, doc, query.filter()))
            .map(|(id, doc)| (*id, doc))
            .collect();

        matched.sort_by(|(a_id, a), (b_id, b)| {
            for key in query.sort_keys() {
                let a_value = lookup(*a_id, a, &key.field);
                let b_value = lookup(*b_id, b, &key.field);
                let ordering = sort_order(a_value.as_ref(), b_value.as_ref(), key.direction);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a_id.to_string().cmp(&b_id.to_string())
        });

        let skip = usize::try_from(query.skip()).unwrap_or(usize::MAX);
        let take = query
            .limit()
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|(id, doc)| project(id, doc, query.projection()))
            .collect())
    }

    async fn insert(&self, id: Uuid, document: Map<String, Value>) -> Result<Value, StoreError> {
        self.check_available()?;

        let returned = returned(id, &document);
        self.documents.write().insert(id, document);
        Ok(returned)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        self.check_available()?;

        let mut documents = self.documents.write();
        let Some(document) = documents.get_mut(&id) else {
            return Ok(None);
        };

        for (key, value) in changes {
            document.insert(key, value);
        }
        let version = document
            .get(VERSION_KEY)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        document.insert(VERSION_KEY.to_string(), (version + 1).into());

        Ok(Some(returned(id, document)))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.documents.write().remove(&id).is_some())
    }

    async fn category_stats(&self, min_rating: f64) -> Result<Vec<CategoryStats>, StoreError> {
        self.check_available()?;

        #[derive(Default)]
        struct Group {
            count: i64,
            ratings: Vec<f64>,
            prices: Vec<f64>,
        }

        let documents = self.documents.read();
        let mut groups: BTreeMap<Option<String>, Group> = BTreeMap::new();
        for document in documents.values() {
            let Some(rating) = document.get("rating").and_then(Value::as_f64) else {
                continue;
            };
            if rating < min_rating {
                continue;
            }
            let category = document
                .get("category")
                .map(text)
                .map(|c| c.to_uppercase());
            let group = groups.entry(category).or_default();
            group.count += 1;
            group.ratings.push(rating);
            if let Some(price) = document.get("price").and_then(Value::as_f64) {
                group.prices.push(price);
            }
        }

        let mut stats: Vec<CategoryStats> = groups
            .into_iter()
            .map(|(category, group)| CategoryStats {
                category,
                num_products: group.count,
                avg_rating: mean(&group.ratings),
                avg_price: mean(&group.prices),
                min_price: group.prices.iter().copied().reduce(f64::min),
                max_price: group.prices.iter().copied().reduce(f64::max),
            })
            .collect();

        // Postgres puts NULL averages last when ascending
        stats.sort_by(|a, b| match (a.avg_price, b.avg_price) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(stats)
    }

    async fn healthy(&self) -> bool {
        self.available.load(AtomicOrdering::SeqCst)
    }
}

// -------------------------------------------------------------------------
// Filter evaluation
// -------------------------------------------------------------------------

fn matches(id: Uuid, document: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, constraint)| match key.as_str() {
        AND_OPERATOR => clauses(constraint).all(|clause| matches(id, document, clause)),
        "$or" => {
            let mut branches = clauses(constraint).peekable();
            branches.peek().is_some() && branches.any(|clause| matches(id, document, clause))
        }
        operator if operator.starts_with('$') => false,
        field => field_matches(lookup(id, document, field).as_ref(), constraint),
    })
}

fn clauses(value: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn field_matches(value: Option<&Value>, constraint: &Value) -> bool {
    match constraint {
        Value::Object(operators)
            if !operators.is_empty() && operators.keys().all(|k| k.starts_with('$')) =>
        {
            operators
                .iter()
                .all(|(operator, operand)| operator_matches(value, operator, operand))
        }
        other => equals(value, other),
    }
}

fn operator_matches(value: Option<&Value>, operator: &str, operand: &Value) -> bool {
    match operator {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => compare(value, operand).is_some_and(Ordering::is_gt),
        "$gte" => compare(value, operand).is_some_and(Ordering::is_ge),
        "$lt" => compare(value, operand).is_some_and(Ordering::is_lt),
        "$lte" => compare(value, operand).is_some_and(Ordering::is_le),
        "$in" => in_list(value, operand),
        "$nin" => !in_list(value, operand),
        _ => false,
    }
}

/// Scalars match by text rendering or, when the operand reads as a number,
/// numerically. Documents and arrays compare structurally.
fn equals(value: Option<&Value>, operand: &Value) -> bool {
    let present = value.filter(|v| !v.is_null());
    match operand {
        Value::Null => present.is_none(),
        Value::Object(_) | Value::Array(_) => value == Some(operand),
        scalar => present.is_some_and(|v| scalar_matches(v, scalar)),
    }
}

fn in_list(value: Option<&Value>, operand: &Value) -> bool {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return false;
    };
    match operand {
        Value::Array(items) => items.iter().any(|item| scalar_matches(value, item)),
        single => scalar_matches(value, single),
    }
}

fn scalar_matches(stored: &Value, operand: &Value) -> bool {
    if text(stored) == text(operand) {
        return true;
    }
    let numeric = match operand {
        Value::String(s) => coerce_scalar(s),
        other => other.clone(),
    };
    match (stored.as_f64(), numeric.as_f64()) {
        (Some(stored), Some(wanted)) if stored.is_finite() => stored == wanted,
        _ => false,
    }
}

fn compare(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
    value.map(|v| jsonb_cmp(v, operand))
}

// -------------------------------------------------------------------------
// Ordering and projection
// -------------------------------------------------------------------------

fn sort_order(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    let ascending = match (a, b) {
        (Some(a), Some(b)) => jsonb_cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    match direction {
        SortDirection::Asc => ascending,
        SortDirection::Desc => ascending.reverse(),
    }
}

/// JSONB ordering: object > array > boolean > number > string > null.
fn jsonb_cmp(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::String(_) => 1,
            Value::Number(_) => 2,
            Value::Bool(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Dotted path lookup; `id` resolves to the key.
fn lookup(id: Uuid, document: &Map<String, Value>, field: &str) -> Option<Value> {
    if field == ID_FIELD {
        return Some(Value::String(id.to_string()));
    }

    let mut segments = field.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

fn project(id: Uuid, document: &Map<String, Value>, projection: &Projection) -> Value {
    let mut shaped = match projection {
        Projection::All => document.clone(),
        Projection::Exclude(fields) => {
            let mut shaped = document.clone();
            for field in fields {
                remove_path(&mut shaped, field);
            }
            shaped
        }
        Projection::Include(fields) => {
            let heads: Vec<&str> = fields
                .iter()
                .filter_map(|field| field.split('.').next())
                .collect();
            document
                .iter()
                .filter(|(key, _)| heads.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        }
    };
    shaped.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Value::Object(shaped)
}

fn remove_path(document: &mut Map<String, Value>, field: &str) {
    match field.split_once('.') {
        None => {
            document.remove(field);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = document.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Stored document as writes return it.
fn returned(id: Uuid, document: &Map<String, Value>) -> Value {
    let mut shaped = document.clone();
    shaped.remove(VERSION_KEY);
    shaped.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Value::Object(shaped)
}

/// Text rendering as Postgres `->>` produces it.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
