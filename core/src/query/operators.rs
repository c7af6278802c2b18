//! Operator helpers
//!
//! Small constructors for the `$`-tagged JSON values understood by the
//! compiler and by the node. They are pure data and can be nested freely:
//!
//! ```
//! use orbis_core::query::operators::{and, gte, or, starts_with};
//! use serde_json::json;
//!
//! let condition = or([
//!     json!({ "age": gte(18) }),
//!     and([json!({ "name": starts_with("jo") }), json!({ "verified": true })]),
//! ]);
//! assert!(condition["$or"].is_array());
//! ```

use serde_json::{json, Map, Value};

fn aggregate(function: &str, column: &str, alias: Option<&str>, distinct: bool) -> Value {
    let mut params = Map::new();
    params.insert("$expr".to_string(), Value::String(column.to_string()));
    if distinct {
        params.insert("$distinct".to_string(), Value::Bool(true));
    }

    let mut operation = Map::new();
    operation.insert(function.to_string(), Value::Object(params));

    let mut field = Map::new();
    field.insert(alias.unwrap_or(column).to_string(), Value::Object(operation));
    Value::Object(field)
}

/// `SUM(DISTINCT? column) AS alias|column`
pub fn sum(column: &str, alias: Option<&str>, distinct: bool) -> Value {
    aggregate("$sum", column, alias, distinct)
}

/// `COUNT(DISTINCT? column) AS alias|column`
pub fn count(column: &str, alias: Option<&str>, distinct: bool) -> Value {
    aggregate("$count", column, alias, distinct)
}

/// `column AS alias`
pub fn alias(column: &str, alias: &str) -> Value {
    let mut field = Map::new();
    field.insert(column.to_string(), json!({ "$as": alias }));
    Value::Object(field)
}

/// `condition AND condition AND ...`
pub fn and<I: IntoIterator<Item = Value>>(conditions: I) -> Value {
    json!({ "$and": conditions.into_iter().collect::<Vec<_>>() })
}

/// `condition OR condition OR ...`
pub fn or<I: IntoIterator<Item = Value>>(conditions: I) -> Value {
    json!({ "$or": conditions.into_iter().collect::<Vec<_>>() })
}

/// `column BETWEEN min AND max`
pub fn between(min: impl Into<Value>, max: impl Into<Value>) -> Value {
    json!({ "$between": { "$min": min.into(), "$max": max.into() } })
}

/// `column IN (...)`
pub fn in_list<I, V>(values: I) -> Value
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    json!({ "$in": values.into_iter().map(Into::into).collect::<Vec<Value>>() })
}

/// `column NOT IN (...)`
pub fn not_in<I, V>(values: I) -> Value
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    json!({ "$nin": values.into_iter().map(Into::into).collect::<Vec<Value>>() })
}

/// `column = value`
pub fn eq(value: impl Into<Value>) -> Value {
    json!({ "$eq": value.into() })
}

/// `column <> value`
pub fn neq(value: impl Into<Value>) -> Value {
    json!({ "$neq": value.into() })
}

/// `column > value`
pub fn gt(value: impl Into<Value>) -> Value {
    json!({ "$gt": value.into() })
}

/// `column >= value`
pub fn gte(value: impl Into<Value>) -> Value {
    json!({ "$gte": value.into() })
}

/// `column < value`
pub fn lt(value: impl Into<Value>) -> Value {
    json!({ "$lt": value.into() })
}

/// `column <= value`
pub fn lte(value: impl Into<Value>) -> Value {
    json!({ "$lte": value.into() })
}

/// `column LIKE '%value%'`
pub fn contains(value: &str) -> Value {
    json!({ "$contains": value })
}

/// `column ILIKE '%value%'`
pub fn icontains(value: &str) -> Value {
    json!({ "$icontains": value })
}

/// `column LIKE 'value%'`
pub fn starts_with(value: &str) -> Value {
    json!({ "$startsWith": value })
}

/// `column ILIKE 'value%'`
pub fn istarts_with(value: &str) -> Value {
    json!({ "$istartsWith": value })
}

/// `column LIKE '%value'`
pub fn ends_with(value: &str) -> Value {
    json!({ "$endsWith": value })
}

/// `column ILIKE '%value'`
pub fn iends_with(value: &str) -> Value {
    json!({ "$iendsWith": value })
}

/// `column LIKE 'pattern'`
pub fn like(pattern: &str) -> Value {
    json!({ "$like": pattern })
}

/// `column ILIKE 'pattern'`
pub fn ilike(pattern: &str) -> Value {
    json!({ "$ilike": pattern })
}
