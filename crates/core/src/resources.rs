//! Generic REST resource addressing and OData query building.
//!
//! Resources are described by data, not by one type per entity: a
//! [`ResourceDescriptor`] names the division-relative URL and the primary key
//! field, and a [`Query`] carries the `$filter`/`$select`/... options.

/// Where a resource lives and how its records are keyed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    /// Division-relative path, e.g. `crm/Accounts`
    pub url: String,
    /// Primary key field, usually `ID`
    pub primary_key: String,
}

impl ResourceDescriptor {
    pub const DEFAULT_PRIMARY_KEY: &'static str = "ID";

    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), primary_key: Self::DEFAULT_PRIMARY_KEY.to_string() }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Path addressing a single record: `{url}(guid'{id}')`
    pub fn record_path(&self, id: &str) -> String {
        format!("{}(guid'{}')", self.url.trim_end_matches('/'), escape_literal(id))
    }

    /// Query selecting the record whose primary key equals `id`
    pub fn by_id(&self, id: &str) -> Query {
        Query::new().filter(format!("{} eq guid'{}'", self.primary_key, escape_literal(id)))
    }
}

/// OData quotes are escaped by doubling.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// OData system query options plus arbitrary extra parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    filter: Option<String>,
    select: Vec<String>,
    order_by: Vec<String>,
    top: Option<u32>,
    expand: Vec<String>,
    params: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `$filter`; a second call combines both with `and`.
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        let expression = expression.into();
        self.filter = Some(match self.filter.take() {
            Some(existing) => format!("({}) and ({})", existing, expression),
            None => expression,
        });
        self
    }

    /// `{field} eq '{value}'` with the value escaped
    pub fn filter_eq(self, field: &str, value: &str) -> Self {
        self.filter(format!("{} eq '{}'", field, escape_literal(value)))
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by.push(clause.into());
        self
    }

    pub fn top(mut self, n: u32) -> Self {
        self.top = Some(n);
        self
    }

    pub fn expand(mut self, navigation: impl Into<String>) -> Self {
        self.expand.push(navigation.into());
        self
    }

    /// Any other query parameter, passed through untouched
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().is_empty()
    }

    /// Unencoded name/value pairs in a stable order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = &self.filter {
            pairs.push(("$filter".to_string(), filter.clone()));
        }
        if !self.select.is_empty() {
            pairs.push(("$select".to_string(), self.select.join(",")));
        }
        if !self.order_by.is_empty() {
            pairs.push(("$orderby".to_string(), self.order_by.join(",")));
        }
        if let Some(top) = self.top {
            pairs.push(("$top".to_string(), top.to_string()));
        }
        if !self.expand.is_empty() {
            pairs.push(("$expand".to_string(), self.expand.join(",")));
        }
        pairs.extend(self.params.iter().cloned());
        pairs
    }

    /// Percent-encoded query string without the leading `?`.
    pub fn to_query_string(&self) -> String {
        self.pairs()
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}
