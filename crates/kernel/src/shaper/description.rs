//! Unexecuted document queries.
//!
//! A [`QueryDescription`] is a plain value: every builder method consumes it
//! and returns the narrowed or reshaped copy. Nothing here touches a store;
//! execution goes through [`DocumentStore::find`].

use serde_json::{Map, Value};

use crate::store::{DocumentStore, StoreError};

/// Name of the primary key as it appears in returned documents.
pub const ID_FIELD: &str = "id";

/// Internal version key kept on every stored document.
pub const VERSION_KEY: &str = "__v";

/// Operator that conjoins a list of filter documents.
pub const AND_OPERATOR: &str = "$and";

/// Sort direction for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One ordering key, e.g. `-rating`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    /// Parse a single token; a leading `-` means descending.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (field, direction) = match token.strip_prefix('-') {
            Some(field) => (field, SortDirection::Desc),
            None => (token.strip_prefix('+').unwrap_or(token), SortDirection::Asc),
        };
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            direction,
        })
    }

    /// Render back to token form.
    pub fn spec(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.field.clone(),
            SortDirection::Desc => format!("-{}", self.field),
        }
    }
}

/// Which document fields a query returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Whole document.
    #[default]
    All,
    /// Only these fields (plus `id`).
    Include(Vec<String>),
    /// Everything except these fields.
    Exclude(Vec<String>),
}

impl Projection {
    /// Parse a space-separated projection spec such as `name price` or `-__v`.
    ///
    /// The list is an exclusion only when every entry carries `-`. In a mixed
    /// list the `-` entries are dropped, since inclusion already leaves them
    /// out.
    pub fn parse(spec: &str) -> Self {
        let tokens: Vec<&str> = spec.split_whitespace().collect();
        if tokens.is_empty() {
            return Self::All;
        }

        if tokens.iter().all(|t| t.starts_with('-')) {
            let fields: Vec<String> = tokens
                .iter()
                .map(|t| t.trim_start_matches('-'))
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if fields.is_empty() {
                return Self::All;
            }
            return Self::Exclude(fields);
        }

        Self::Include(
            tokens
                .iter()
                .filter(|t| !t.starts_with('-'))
                .map(|t| t.trim_start_matches('+').to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    /// Render back to spec form.
    pub fn spec(&self) -> String {
        match self {
            Self::All => String::new(),
            Self::Include(fields) => fields.join(" "),
            Self::Exclude(fields) => fields
                .iter()
                .map(|f| format!("-{f}"))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A not-yet-executed query against a document collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDescription {
    filter: Map<String, Value>,
    sort_keys: Vec<SortKey>,
    projection: Projection,
    skip: u64,
    limit: Option<u64>,
}

impl QueryDescription {
    /// Start a query matching `constraints`.
    pub fn find(constraints: Map<String, Value>) -> Self {
        Self::default().narrow(constraints)
    }

    /// Start a query matching a single field.
    pub fn find_by(field: &str, value: impl Into<Value>) -> Self {
        let mut constraints = Map::new();
        constraints.insert(field.to_string(), value.into());
        Self::find(constraints)
    }

    /// Conjoin more constraints.
    ///
    /// A field that is already constrained keeps its old constraint; both
    /// move under `$and` so neither can override the other.
    pub fn narrow(mut self, constraints: Map<String, Value>) -> Self {
        for (field, constraint) in constraints {
            if field == AND_OPERATOR {
                if let Value::Array(clauses) = constraint {
                    for clause in clauses {
                        self.push_and(clause);
                    }
                } else {
                    self.push_and(constraint);
                }
                continue;
            }

            match self.filter.remove(&field) {
                None => {
                    self.filter.insert(field, constraint);
                }
                Some(existing) if existing == constraint => {
                    self.filter.insert(field, existing);
                }
                Some(existing) => {
                    self.push_and(single(&field, existing));
                    self.push_and(single(&field, constraint));
                }
            }
        }
        self
    }

    fn push_and(&mut self, clause: Value) {
        let slot = self
            .filter
            .entry(AND_OPERATOR.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(clauses) = slot {
            clauses.push(clause);
        }
    }

    /// Replace the ordering with a space-separated spec such as `-rating price`.
    pub fn order(mut self, spec: &str) -> Self {
        self.sort_keys = spec.split_whitespace().filter_map(SortKey::parse).collect();
        self
    }

    /// Replace the projection with a space-separated spec.
    pub fn project(mut self, spec: &str) -> Self {
        self.projection = Projection::parse(spec);
        self
    }

    /// Set the result window.
    pub fn limit_results(mut self, skip: u64, limit: u64) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }

    /// Run the query once against `store`.
    pub async fn execute<S>(&self, store: &S) -> Result<Vec<Value>, StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        store.find(self).await
    }

    pub fn filter(&self) -> &Map<String, Value> {
        &self.filter
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort_keys
    }

    /// Ordering in spec form; empty means store default.
    pub fn order_spec(&self) -> String {
        self.sort_keys
            .iter()
            .map(SortKey::spec)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn projection_spec(&self) -> String {
        self.projection.spec()
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }
}

fn single(field: &str, constraint: Value) -> Value {
    let mut clause = Map::new();
    clause.insert(field.to_string(), constraint);
    Value::Object(clause)
}
