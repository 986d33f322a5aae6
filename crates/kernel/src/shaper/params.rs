//! Typed request parameters for listing endpoints.
//!
//! Query strings arrive as flat `(key, value)` pairs. The four reserved keys
//! configure the shaping stages; every other key names a document field and
//! lands in the open filter map.

use std::collections::BTreeMap;

/// Parameter names that configure the pipeline instead of naming fields.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Check whether a parameter name is reserved for pipeline configuration.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Value of a single filter parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterParam {
    /// `category=shoes`
    Exact(String),
    /// `category=shoes&category=boots`
    AnyOf(Vec<String>),
    /// `price[gte]=100&price[lt]=500`, keyed by qualifier.
    Qualified(BTreeMap<String, String>),
}

/// Parsed listing parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters {
    /// 1-based page number, as sent.
    pub page: Option<String>,

    /// Comma-separated sort fields, `-` prefix for descending.
    pub sort: Option<String>,

    /// Page size, as sent.
    pub limit: Option<String>,

    /// Comma-separated projection fields.
    pub fields: Option<String>,

    /// Everything else, keyed by document field.
    pub filters: BTreeMap<String, FilterParam>,
}

impl RequestParameters {
    /// Build parameters from query-string pairs in arrival order.
    ///
    /// A repeated reserved key is joined with `,`. A repeated plain key
    /// collects into [`FilterParam::AnyOf`]. When a field is sent both plain
    /// and qualified, the later form wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            params.push(key.into(), value.into());
        }
        params
    }

    /// Add one raw parameter.
    pub fn push(&mut self, key: String, value: String) {
        match key.as_str() {
            "page" => append_list(&mut self.page, value),
            "sort" => append_list(&mut self.sort, value),
            "limit" => append_list(&mut self.limit, value),
            "fields" => append_list(&mut self.fields, value),
            _ => match split_qualifier(&key) {
                Some((field, qualifier)) => self.push_qualified(field, qualifier, value),
                None => self.push_exact(key, value),
            },
        }
    }

    fn push_qualified(&mut self, field: &str, qualifier: &str, value: String) {
        let entry = self
            .filters
            .entry(field.to_string())
            .or_insert_with(|| FilterParam::Qualified(BTreeMap::new()));

        if let FilterParam::Qualified(qualifiers) = entry {
            qualifiers.insert(qualifier.to_string(), value);
        } else {
            *entry = FilterParam::Qualified(BTreeMap::from([(qualifier.to_string(), value)]));
        }
    }

    fn push_exact(&mut self, field: String, value: String) {
        let next = match self.filters.remove(&field) {
            Some(FilterParam::Exact(previous)) => FilterParam::AnyOf(vec![previous, value]),
            Some(FilterParam::AnyOf(mut values)) => {
                values.push(value);
                FilterParam::AnyOf(values)
            }
            Some(FilterParam::Qualified(_)) | None => FilterParam::Exact(value),
        };
        self.filters.insert(field, next);
    }
}

fn append_list(slot: &mut Option<String>, value: String) {
    match slot {
        Some(existing) => {
            existing.push(',');
            existing.push_str(&value);
        }
        None => *slot = Some(value),
    }
}

/// Split `price[gte]` into `("price", "gte")`.
///
/// Anything that is not exactly one bracketed qualifier after a non-empty
/// field name is treated as a plain key.
fn split_qualifier(key: &str) -> Option<(&str, &str)> {
    let inner = key.strip_suffix(']')?;
    let (field, qualifier) = inner.split_once('[')?;
    if field.is_empty() || qualifier.is_empty() || qualifier.contains(['[', ']']) {
        return None;
    }
    Some((field, qualifier))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_are_typed() {
        let params = RequestParameters::from_pairs([
            ("page", "2"),
            ("limit", "10"),
            ("sort", "-rating,price"),
            ("fields", "name,price"),
        ]);

        assert_eq!(params.page.as_deref(), Some("2"));
        assert_eq!(params.limit.as_deref(), Some("10"));
        assert_eq!(params.sort.as_deref(), Some("-rating,price"));
        assert_eq!(params.fields.as_deref(), Some("name,price"));
        assert!(params.filters.is_empty());
    }

    #[test]
    fn repeated_reserved_key_is_joined() {
        let params = RequestParameters::from_pairs([("sort", "-rating"), ("sort", "price")]);
        assert_eq!(params.sort.as_deref(), Some("-rating,price"));
    }

    #[test]
    fn qualifiers_are_grouped_per_field() {
        let params =
            RequestParameters::from_pairs([("price[gte]", "100"), ("price[lt]", "500")]);

        let expected = FilterParam::Qualified(BTreeMap::from([
            ("gte".to_string(), "100".to_string()),
            ("lt".to_string(), "500".to_string()),
        ]));
        assert_eq!(params.filters.get("price"), Some(&expected));
    }

    #[test]
    fn repeated_plain_key_collects_values() {
        let params = RequestParameters::from_pairs([
            ("category", "shoes"),
            ("category", "boots"),
            ("category", "socks"),
        ]);

        assert_eq!(
            params.filters.get("category"),
            Some(&FilterParam::AnyOf(vec![
                "shoes".to_string(),
                "boots".to_string(),
                "socks".to_string()
            ]))
        );
    }

    #[test]
    fn later_form_wins_on_conflict() {
        let params = RequestParameters::from_pairs([("price[gte]", "1"), ("price", "5")]);
        assert_eq!(
            params.filters.get("price"),
            Some(&FilterParam::Exact("5".to_string()))
        );

        let params = RequestParameters::from_pairs([("price", "5"), ("price[gte]", "1")]);
        assert!(matches!(
            params.filters.get("price"),
            Some(FilterParam::Qualified(_))
        ));
    }

    #[test]
    fn malformed_brackets_stay_plain() {
        assert_eq!(split_qualifier("price[gte]"), Some(("price", "gte")));
        assert_eq!(split_qualifier("[gte]"), None);
        assert_eq!(split_qualifier("price[]"), None);
        assert_eq!(split_qualifier("price[a][b]"), None);
        assert_eq!(split_qualifier("price"), None);
    }

    #[test]
    fn empty_parameters() {
        let params = RequestParameters::from_pairs(Vec::<(String, String)>::new());
        assert_eq!(params.page, None);
        assert!(params.filters.is_empty());
        assert!(is_reserved("fields"));
        assert!(!is_reserved("category"));
    }
}
