//! Request-parameter shaping: filter, sort, field projection, pagination.

use serde_json::{Map, Number, Value};
use tracing::debug;

use super::description::QueryDescription;
use super::params::{FilterParam, RequestParameters, is_reserved};

/// Ordering applied when the request names none.
pub const DEFAULT_SORT: &str = "created_at";

/// Projection applied when the request names no fields.
pub const DEFAULT_PROJECTION: &str = "-__v";

/// Page used when `page` is missing or unusable.
pub const DEFAULT_PAGE: u64 = 1;

/// Page size used when `limit` is missing or unusable.
pub const DEFAULT_LIMIT: u64 = 100;

/// Largest skip or limit a store accepts (a signed 64-bit row count).
pub const MAX_WINDOW: u64 = i64::MAX.unsigned_abs();

/// Qualifiers rewritten into store comparison operators.
pub const COMPARISON_OPERATORS: [&str; 4] = ["gte", "gt", "lte", "lt"];

/// Chainable shaper over one request.
///
/// Each stage consumes the shaper and returns it with the description
/// reshaped. Stages may be skipped; calling them out of order works but the
/// listing routes always run filter, sort, fields, page.
#[derive(Debug)]
pub struct QueryShaper<'a> {
    query: QueryDescription,
    params: &'a RequestParameters,
}

impl<'a> QueryShaper<'a> {
    pub fn new(query: QueryDescription, params: &'a RequestParameters) -> Self {
        Self { query, params }
    }

    /// Narrow by every non-reserved parameter.
    ///
    /// Exact and repeated values stay as sent; the store decides whether
    /// they match a stored string or number. Qualified values are coerced
    /// so comparisons order numbers numerically.
    pub fn filter(mut self) -> Self {
        let mut constraints = Map::new();

        for (field, param) in &self.params.filters {
            if is_reserved(field) {
                continue;
            }
            let constraint = match param {
                FilterParam::Exact(value) => Value::String(value.clone()),
                FilterParam::AnyOf(values) => {
                    let mut membership = Map::new();
                    membership.insert(
                        "$in".to_string(),
                        Value::Array(values.iter().cloned().map(Value::String).collect()),
                    );
                    Value::Object(membership)
                }
                FilterParam::Qualified(qualifiers) => Value::Object(
                    qualifiers
                        .iter()
                        .map(|(qualifier, value)| (operator_key(qualifier), coerce_scalar(value)))
                        .collect(),
                ),
            };
            constraints.insert(field.clone(), constraint);
        }

        if !constraints.is_empty() {
            debug!(fields = constraints.len(), "applying request filters");
            self.query = self.query.narrow(constraints);
        }
        self
    }

    /// Apply `sort`, or the creation-time default.
    pub fn sort(mut self) -> Self {
        let spec = self
            .params
            .sort
            .as_deref()
            .map(space_list)
            .filter(|spec| !spec.is_empty())
            .unwrap_or_else(|| DEFAULT_SORT.to_string());

        self.query = self.query.order(&spec);
        self
    }

    /// Apply `fields`, or hide the internal version key.
    pub fn limit_fields(mut self) -> Self {
        let spec = self
            .params
            .fields
            .as_deref()
            .map(space_list)
            .filter(|spec| !spec.is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECTION.to_string());

        self.query = self.query.project(&spec);
        self
    }

    /// Apply `page` and `limit`.
    ///
    /// Unparseable values fall back to the defaults. A page below 1 is
    /// clamped to 1 and a limit below 1 falls back to the default. The limit
    /// has no upper bound beyond [`MAX_WINDOW`], which also caps the skip.
    pub fn paginate(mut self) -> Self {
        let page = parse_positive(self.params.page.as_deref())
            .map(|page| page.max(1))
            .unwrap_or(DEFAULT_PAGE);
        let limit = parse_positive(self.params.limit.as_deref())
            .filter(|limit| *limit >= 1)
            .unwrap_or(DEFAULT_LIMIT);
        let skip = (page - 1).saturating_mul(limit).min(MAX_WINDOW);

        self.query = self.query.limit_results(skip, limit);
        self
    }

    /// Run all four stages in order.
    pub fn shape(self) -> Self {
        self.filter().sort().limit_fields().paginate()
    }

    /// The shaped description, not yet executed.
    pub fn query(&self) -> &QueryDescription {
        &self.query
    }

    pub fn into_query(self) -> QueryDescription {
        self.query
    }
}

/// `gte` → `$gte`; unknown qualifiers pass through untouched.
fn operator_key(qualifier: &str) -> String {
    if COMPARISON_OPERATORS.contains(&qualifier) {
        format!("${qualifier}")
    } else {
        qualifier.to_string()
    }
}

/// Interpret a raw parameter the way a typed document schema would.
pub fn coerce_scalar(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = raw.parse::<f64>()
        && let Some(number) = Number::from_f64(float)
    {
        return Value::Number(number);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// `-rating, price` → `-rating price`
fn space_list(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a signed integer and clamp negatives to zero.
fn parse_positive(raw: Option<&str>) -> Option<u64> {
    let value: i64 = raw?.trim().parse().ok()?;
    Some(u64::try_from(value).unwrap_or(0))
}
