//! SQL generation for document queries using SeaQuery.
//!
//! Documents live in a JSONB column (`doc`) next to a UUID primary key
//! (`id`). Generates queries with support for:
//! - Dotted field paths into nested documents
//! - `$`-operator filter documents (`$gt`, `$in`, `$and`, ...)
//! - Inclusion and exclusion projections
//! - Deterministic pagination (primary key as final sort key)

use sea_query::{Alias, Cond, Expr, Order, PostgresQueryBuilder, Query, SelectStatement, SimpleExpr};
use serde_json::{Map, Value};
use tracing::warn;

use crate::shaper::{
    AND_OPERATOR, ID_FIELD, Projection, QueryDescription, SortDirection, coerce_scalar,
};

/// Table holding product documents.
pub const PRODUCT_TABLE: &str = "product";

/// JSONB column holding the document body.
const DOC_COLUMN: &str = "doc";

/// Document expression with the primary key folded in.
const WITH_ID: &str = "jsonb_build_object('id', id)";

/// Query builder for document collections.
pub struct DocumentQueryBuilder<'a> {
    table: &'a str,
    description: &'a QueryDescription,
}

impl<'a> DocumentQueryBuilder<'a> {
    pub fn new(table: &'a str, description: &'a QueryDescription) -> Self {
        Self { table, description }
    }

    /// Build the SELECT returning one JSONB `doc` per row.
    pub fn build(&self) -> String {
        let mut query = Query::select();

        query.expr_as(projection_expr(self.description.projection()), Alias::new("doc"));
        query.from(Alias::new(self.table));

        if let Some(condition) = filter_condition(self.description.filter()) {
            query.cond_where(condition);
        }

        self.add_sorts(&mut query);

        if let Some(limit) = self.description.limit() {
            query.limit(limit);
        }
        if self.description.skip() > 0 {
            query.offset(self.description.skip());
        }

        query.to_string(PostgresQueryBuilder)
    }

    /// ORDER BY each sort key, then the primary key so pages never overlap.
    fn add_sorts(&self, query: &mut SelectStatement) {
        let mut ordered_by_id = false;

        for key in self.description.sort_keys() {
            let order = match key.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            ordered_by_id |= key.field == ID_FIELD;

            let mut fragment = Fragment::default();
            let path = fragment.path(&key.field, false);
            query.order_by_expr(fragment.finish(path), order);
        }

        if !ordered_by_id {
            query.order_by(Alias::new(ID_FIELD), Order::Asc);
        }
    }
}

/// Custom SQL with numbered placeholders for its values.
#[derive(Default)]
struct Fragment {
    values: Vec<String>,
}

impl Fragment {
    /// Register a value and return its placeholder.
    fn bind(&mut self, value: impl Into<String>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }

    /// Expression for a document field: `(doc -> 'a' ->> 'b')`.
    ///
    /// `id` addresses the primary key column instead of the body.
    fn path(&mut self, field: &str, as_text: bool) -> String {
        if field == ID_FIELD {
            return if as_text { "id::text" } else { "to_jsonb(id)" }.to_string();
        }

        let segments: Vec<&str> = field.split('.').collect();
        let mut sql = DOC_COLUMN.to_string();
        for (i, segment) in segments.iter().enumerate() {
            let operator = if as_text && i == segments.len() - 1 {
                "->>"
            } else {
                "->"
            };
            let placeholder = self.bind(*segment);
            sql = format!("{sql} {operator} {placeholder}");
        }
        format!("({sql})")
    }

    fn finish(self, sql: String) -> SimpleExpr {
        if self.values.is_empty() {
            Expr::cust(sql)
        } else {
            Expr::cust_with_values(sql, self.values)
        }
    }
}

/// Translate a filter document into a WHERE condition.
///
/// Returns `None` when the document places no constraint.
pub fn filter_condition(filter: &Map<String, Value>) -> Option<Cond> {
    let mut condition = Cond::all();
    let mut constrained = false;

    for (key, value) in filter {
        match key.as_str() {
            AND_OPERATOR => {
                for clause in clauses(value) {
                    if let Some(inner) = filter_condition(clause) {
                        condition = condition.add(inner);
                        constrained = true;
                    }
                }
            }
            "$or" => {
                let mut any = Cond::any();
                let mut branches = 0;
                for clause in clauses(value) {
                    match filter_condition(clause) {
                        Some(inner) => any = any.add(inner),
                        // An empty branch matches everything.
                        None => any = any.add(Expr::cust("TRUE")),
                    }
                    branches += 1;
                }
                condition = if branches == 0 {
                    condition.add(Expr::cust("FALSE"))
                } else {
                    condition.add(any)
                };
                constrained = true;
            }
            operator if operator.starts_with('$') => {
                warn!(operator, "unsupported top-level filter operator; restricting results");
                condition = condition.add(Expr::cust("FALSE"));
                constrained = true;
            }
            field => {
                condition = condition.add(field_condition(field, value));
                constrained = true;
            }
        }
    }

    constrained.then_some(condition)
}

fn clauses(value: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Constraint on one field: a scalar, a literal document, or an operator set.
fn field_condition(field: &str, constraint: &Value) -> Cond {
    match constraint {
        Value::Object(operators) if is_operator_set(operators) => operators
            .iter()
            .fold(Cond::all(), |cond, (operator, operand)| {
                cond.add(operator_condition(field, operator, operand))
            }),
        other => Cond::all().add(equals(field, other)),
    }
}

fn is_operator_set(object: &Map<String, Value>) -> bool {
    !object.is_empty() && object.keys().all(|key| key.starts_with('$'))
}

fn operator_condition(field: &str, operator: &str, operand: &Value) -> SimpleExpr {
    match operator {
        "$eq" => equals(field, operand),
        "$ne" => not_equals(field, operand),
        "$gt" => compare(field, ">", operand),
        "$gte" => compare(field, ">=", operand),
        "$lt" => compare(field, "<", operand),
        "$lte" => compare(field, "<=", operand),
        "$in" => membership(field, operand, false),
        "$nin" => membership(field, operand, true),
        other => {
            warn!(
                operator = other,
                field, "unsupported filter operator; restricting results"
            );
            Expr::cust("FALSE")
        }
    }
}

/// Documents and arrays compare as JSONB. Scalars match on their text, or
/// numerically when they read as a number, so `price=100` finds a stored
/// `100.0` while `category=007` still finds the string `"007"`.
fn equals(field: &str, operand: &Value) -> SimpleExpr {
    let mut fragment = Fragment::default();
    let sql = equals_sql(&mut fragment, field, operand);
    fragment.finish(sql)
}

/// Missing fields count as "not equal".
fn not_equals(field: &str, operand: &Value) -> SimpleExpr {
    let mut fragment = Fragment::default();
    let sql = equals_sql(&mut fragment, field, operand);
    fragment.finish(format!("NOT COALESCE({sql}, FALSE)"))
}

fn equals_sql(fragment: &mut Fragment, field: &str, operand: &Value) -> String {
    match operand {
        Value::Null => {
            let path = fragment.path(field, true);
            format!("{path} IS NULL")
        }
        Value::Object(_) | Value::Array(_) => {
            let path = fragment.path(field, false);
            let value = fragment.bind(operand.to_string());
            format!("{path} = {value}::jsonb")
        }
        scalar => {
            let (text, number) = scalar_forms(scalar);
            let path = fragment.path(field, true);
            let value = fragment.bind(text);
            match number.filter(|_| field != ID_FIELD) {
                Some(number) => {
                    let json_path = fragment.path(field, false);
                    let number = fragment.bind(number);
                    format!("({path} = {value} OR {json_path} = {number}::jsonb)")
                }
                None => format!("{path} = {value}"),
            }
        }
    }
}

/// JSONB ordering: numbers numerically, strings lexically.
fn compare(field: &str, operator: &str, operand: &Value) -> SimpleExpr {
    let mut fragment = Fragment::default();
    let path = fragment.path(field, false);
    let value = fragment.bind(operand.to_string());
    fragment.finish(format!("{path} {operator} {value}::jsonb"))
}

/// `$in` / `$nin`: each candidate matches the way [`equals`] does.
fn membership(field: &str, operand: &Value, negate: bool) -> SimpleExpr {
    let candidates: Vec<&Value> = match operand {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    if candidates.is_empty() {
        return Expr::cust(if negate { "TRUE" } else { "FALSE" });
    }

    let mut texts = Vec::new();
    let mut numbers = Vec::new();
    for candidate in candidates {
        let (text, number) = scalar_forms(candidate);
        texts.push(text);
        numbers.extend(number.filter(|_| field != ID_FIELD));
    }

    let mut fragment = Fragment::default();
    let path = fragment.path(field, true);
    let list = bind_all(&mut fragment, texts, "");
    let mut sql = format!("{path} IN ({list})");
    if !numbers.is_empty() {
        let json_path = fragment.path(field, false);
        let list = bind_all(&mut fragment, numbers, "::jsonb");
        sql = format!("({sql} OR {json_path} IN ({list}))");
    }

    if negate {
        sql = format!("NOT COALESCE({sql}, FALSE)");
    }
    fragment.finish(sql)
}

fn bind_all(fragment: &mut Fragment, values: Vec<String>, cast: &str) -> String {
    values
        .into_iter()
        .map(|value| format!("{}{cast}", fragment.bind(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text form of a scalar, plus its canonical JSON number when it reads as
/// one.
fn scalar_forms(value: &Value) -> (String, Option<String>) {
    match value {
        Value::String(s) => {
            let number = match coerce_scalar(s) {
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
            (s.clone(), number)
        }
        Value::Number(n) => (n.to_string(), Some(n.to_string())),
        other => (other.to_string(), None),
    }
}

/// SELECT expression producing the projected document.
fn projection_expr(projection: &Projection) -> SimpleExpr {
    match projection {
        Projection::All => Expr::cust(format!("{DOC_COLUMN} || {WITH_ID}")),
        Projection::Exclude(fields) => {
            let mut fragment = Fragment::default();
            let mut sql = DOC_COLUMN.to_string();
            for field in fields {
                let path = fragment.bind(text_array_literal(field));
                sql = format!("({sql} #- {path}::text[])");
            }
            fragment.finish(format!("{sql} || {WITH_ID}"))
        }
        Projection::Include(fields) => {
            // Nested paths include their whole top-level subdocument.
            let mut heads: Vec<&str> = Vec::new();
            for field in fields {
                let head = field.split('.').next().unwrap_or(field);
                if head != ID_FIELD && !heads.contains(&head) {
                    heads.push(head);
                }
            }
            if heads.is_empty() {
                return Expr::cust(WITH_ID);
            }

            let mut fragment = Fragment::default();
            let keys: Vec<String> = heads.iter().map(|head| fragment.bind(*head)).collect();
            let sql = format!(
                "COALESCE((SELECT jsonb_object_agg(e.key, e.value) FROM jsonb_each({DOC_COLUMN}) AS e WHERE e.key IN ({})), '{{}}'::jsonb) || {WITH_ID}",
                keys.join(", ")
            );
            fragment.finish(sql)
        }
    }
}

/// `a.b` → `{"a","b"}` for the `#-` path operator.
fn text_array_literal(field: &str) -> String {
    let elements: Vec<String> = field
        .split('.')
        .map(|segment| {
            let escaped = segment.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}
