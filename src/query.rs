//! Query and Aggregation are opaque to the core: the facade only ever constructs
//! `Query::ids` and `Query::empty` itself, and passes everything else through
//! verbatim to the Entity Store / Network Gateway.

use serde_json::Value;

#[derive(Debug, Clone)]
pub enum Query {
    Ids(Vec<String>),
    Empty,
    /// Anything richer than an id set or an empty query is opaque filter criteria,
    /// owned entirely by the caller and the store/gateway implementations.
    Opaque(Value),
}

impl Query {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn empty() -> Self {
        Query::Empty
    }
}

/// Opaque aggregation criteria passed through to `group` unexamined.
#[derive(Debug, Clone)]
pub struct Aggregation(pub Value);
