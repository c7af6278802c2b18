//! Select statements

use log::warn;
use orbis_core::query::compiler::{
    COLUMNS_KEY, LIMIT_KEY, OFFSET_KEY, ORDER_BY_KEY, RAW_KEY, TABLE_KEY, WHERE_KEY,
};
use orbis_core::query::{compile, CompiledQuery, OrderDirection, RawQuery};
use orbis_core::OrbisError;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{run_recorded, StatementContext, StatementHistory};
use crate::error::Result;
use crate::node::QueryResult;

/// Column holding the context of indexed documents
const CONTEXT_COLUMN: &str = "_metadata_context";

fn set_once<T>(slot: &mut Option<T>, value: T, setter: &str) {
    if slot.is_some() {
        warn!("{} called more than once, the previous value is replaced", setter);
    }
    *slot = Some(value);
}

async fn run_json(
    context: Option<&Arc<StatementContext>>,
    history: &StatementHistory,
    query: Value,
) -> Result<QueryResult> {
    let context = context.ok_or_else(|| {
        OrbisError::Configuration("Statement is not attached to a client".to_string())
    })?;

    run_recorded(history, query.clone(), context.query(&query)).await
}

/// Structured select
///
/// Setters take the statement by value. Calling one twice logs a warning
/// and keeps the last value.
#[derive(Default)]
pub struct SelectStatement {
    table: Option<String>,
    columns: Option<Vec<Value>>,
    filter: Option<Value>,
    order_by: Option<Vec<(String, OrderDirection)>>,
    limit: Option<u64>,
    offset: Option<u64>,
    context: Option<Vec<String>>,
    history: StatementHistory,
    client: Option<Arc<StatementContext>>,
}

impl std::fmt::Debug for SelectStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectStatement")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl SelectStatement {
    /// Create a statement that can be built and compiled but not run
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(mut self, client: Arc<StatementContext>) -> Self {
        self.client = Some(client);
        self
    }

    /// Table to select from
    pub fn from(mut self, table: impl Into<String>) -> Self {
        set_once(&mut self.table, table.into(), "from");
        self
    }

    /// Selected columns, plain names or `operators` column helpers
    pub fn columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Value>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        set_once(&mut self.columns, columns, "columns");
        self
    }

    /// Where-clause
    pub fn filter(mut self, filter: Value) -> Self {
        set_once(&mut self.filter, filter, "filter");
        self
    }

    /// Ordering pairs
    pub fn order_by<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = (S, OrderDirection)>,
        S: Into<String>,
    {
        let order = order
            .into_iter()
            .map(|(column, direction)| (column.into(), direction))
            .collect();
        set_once(&mut self.order_by, order, "order_by");
        self
    }

    /// Maximum number of rows, zero included
    pub fn limit(mut self, limit: u64) -> Self {
        set_once(&mut self.limit, limit, "limit");
        self
    }

    /// Number of rows to skip, zero included
    pub fn offset(mut self, offset: u64) -> Self {
        set_once(&mut self.offset, offset, "offset");
        self
    }

    /// Restrict to documents of a context
    pub fn context(self, context: impl Into<String>) -> Self {
        self.contexts([context])
    }

    /// Restrict to documents of any of the contexts
    pub fn contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let contexts = contexts.into_iter().map(Into::into).collect();
        set_once(&mut self.context, contexts, "context");
        self
    }

    fn context_filter(&self) -> Option<Value> {
        let condition = match self.context.as_deref() {
            None | Some([]) => return None,
            Some([single]) => json!({ "$eq": single }),
            Some(many) => json!({ "$in": many }),
        };

        let mut filter = Map::new();
        filter.insert(CONTEXT_COLUMN.to_string(), condition);
        Some(Value::Object(filter))
    }

    /// JSON query sent to the node
    pub fn build(&self) -> Result<Value> {
        let table = self.table.as_ref().ok_or_else(|| {
            OrbisError::Configuration("Missing table (.from) definition".to_string())
        })?;

        let mut query = Map::new();
        query.insert(TABLE_KEY.to_string(), Value::String(table.clone()));

        if let Some(columns) = &self.columns {
            query.insert(COLUMNS_KEY.to_string(), Value::Array(columns.clone()));
        }

        let filter = match (self.filter.clone(), self.context_filter()) {
            (Some(filter), Some(context)) => Some(json!({ "$and": [filter, context] })),
            (filter, context) => filter.or(context),
        };
        if let Some(filter) = filter {
            query.insert(WHERE_KEY.to_string(), filter);
        }

        if let Some(order_by) = &self.order_by {
            let pairs = order_by
                .iter()
                .map(|(column, direction)| json!([column, direction.to_string().to_lowercase()]))
                .collect();
            query.insert(ORDER_BY_KEY.to_string(), Value::Array(pairs));
        }

        if let Some(limit) = self.limit {
            query.insert(LIMIT_KEY.to_string(), json!(limit));
        }
        if let Some(offset) = self.offset {
            query.insert(OFFSET_KEY.to_string(), json!(offset));
        }

        Ok(Value::Object(query))
    }

    /// SQL the node will run
    pub fn compile(&self) -> Result<CompiledQuery> {
        Ok(compile(&self.build()?)?)
    }

    /// Run against the active node
    ///
    /// The query is compiled locally first so malformed queries fail
    /// before any request.
    pub async fn run(&self) -> Result<QueryResult> {
        let query = self.build()?;
        compile(&query)?;
        run_json(self.client.as_ref(), &self.history, query).await
    }

    /// Runs of this statement
    pub fn history(&self) -> &StatementHistory {
        &self.history
    }
}

/// Raw SQL select
///
/// Kept apart from [`SelectStatement`] so raw SQL can never be combined
/// with structured clauses.
pub struct RawSelectStatement {
    raw: RawQuery,
    history: StatementHistory,
    client: Option<Arc<StatementContext>>,
}

impl std::fmt::Debug for RawSelectStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSelectStatement")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl RawSelectStatement {
    /// Create a detached raw statement
    pub fn new(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            raw: RawQuery {
                query: query.into(),
                params,
            },
            history: StatementHistory::new(),
            client: None,
        }
    }

    pub(crate) fn attach(mut self, client: Arc<StatementContext>) -> Self {
        self.client = Some(client);
        self
    }

    /// JSON query sent to the node
    pub fn build(&self) -> Result<Value> {
        let raw = serde_json::to_value(&self.raw).map_err(OrbisError::from)?;
        let mut query = Map::new();
        query.insert(RAW_KEY.to_string(), raw);
        Ok(Value::Object(query))
    }

    /// SQL and parameters, unchanged
    pub fn compile(&self) -> Result<CompiledQuery> {
        Ok(compile(&self.build()?)?)
    }

    /// Run against the active node
    pub async fn run(&self) -> Result<QueryResult> {
        let query = self.build()?;
        run_json(self.client.as_ref(), &self.history, query).await
    }

    /// Runs of this statement
    pub fn history(&self) -> &StatementHistory {
        &self.history
    }
}
