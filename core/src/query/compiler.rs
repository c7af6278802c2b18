//! JSON query to SQL compiler
//!
//! Translates a structured, serializable select query into parameterized
//! PostgreSQL text. Identifiers are always double-quoted and every value
//! becomes a positional placeholder (`$1`, `$2`, ...) appended to the
//! parameter list in traversal order; values are never interpolated.
//!
//! Template:
//!
//! ```text
//! SELECT <columns> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT $n] [OFFSET $n]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{OrbisError, Result};
use crate::query::predicate::{Condition, Predicate};

/// Key holding the table name
pub const TABLE_KEY: &str = "$table";
/// Key holding the selected columns
pub const COLUMNS_KEY: &str = "$columns";
/// Key holding the where-clause
pub const WHERE_KEY: &str = "$where";
/// Key holding the ordering pairs
pub const ORDER_BY_KEY: &str = "$orderBy";
/// Key holding the limit
pub const LIMIT_KEY: &str = "$limit";
/// Key holding the offset
pub const OFFSET_KEY: &str = "$offset";
/// Key holding a raw query (`{query, params}`)
pub const RAW_KEY: &str = "$raw";

const STRUCTURED_KEYS: [&str; 6] = [
    TABLE_KEY,
    COLUMNS_KEY,
    WHERE_KEY,
    ORDER_BY_KEY,
    LIMIT_KEY,
    OFFSET_KEY,
];

/// Escape an identifier by double-quoting it and doubling embedded quotes
pub fn escape_id(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Result of a compilation: SQL text plus positional parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// Parameterized SQL text
    pub query: String,

    /// Positional parameters, `params[0]` binds `$1`
    pub params: Vec<Value>,
}

/// Raw SQL escape hatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQuery {
    /// SQL text, used as-is
    pub query: String,

    /// Parameters bound to the raw query
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending
    Asc,

    /// Descending
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

impl FromStr for OrderDirection {
    type Err = OrbisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            other => Err(OrbisError::Validation(format!(
                "Invalid order direction {}",
                other
            ))),
        }
    }
}

/// Aggregate function allowed in the column list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregateFunction {
    Sum,
    Count,
}

/// Parsed column expression
#[derive(Debug, Clone, PartialEq)]
enum ColumnExpr {
    Plain(String),
    Alias {
        column: String,
        alias: String,
    },
    Aggregate {
        function: AggregateFunction,
        expr: String,
        distinct: bool,
        alias: String,
    },
}

impl ColumnExpr {
    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(column) => Ok(ColumnExpr::Plain(column.clone())),
            Value::Object(field) => {
                let (field_id, operation) = first_entry(field)
                    .ok_or_else(|| OrbisError::Compile("Empty column definition".to_string()))?;
                let operation = operation.as_object().ok_or_else(|| {
                    OrbisError::Compile(format!("Invalid column definition for {}", field_id))
                })?;
                let (operator, params) = first_entry(operation).ok_or_else(|| {
                    OrbisError::Compile(format!("Missing column operation for {}", field_id))
                })?;

                let parsed = operator.trim_start_matches('$').to_uppercase();
                match parsed.as_str() {
                    "AS" => {
                        let alias = params.as_str().ok_or_else(|| {
                            OrbisError::Compile(format!("Invalid \"as\" params {}", params))
                        })?;
                        Ok(ColumnExpr::Alias {
                            column: field_id.clone(),
                            alias: alias.to_string(),
                        })
                    }
                    "SUM" | "COUNT" => {
                        let function = if parsed == "SUM" {
                            AggregateFunction::Sum
                        } else {
                            AggregateFunction::Count
                        };
                        let expr = params
                            .get("$expr")
                            .and_then(Value::as_str)
                            .ok_or_else(|| {
                                OrbisError::Compile(format!(
                                    "Missing $expr for aggregate {}",
                                    parsed
                                ))
                            })?;
                        let distinct = params
                            .get("$distinct")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);

                        Ok(ColumnExpr::Aggregate {
                            function,
                            expr: expr.to_string(),
                            distinct,
                            alias: field_id.clone(),
                        })
                    }
                    other => Err(OrbisError::Compile(format!(
                        "Invalid aggregate function {}",
                        other
                    ))),
                }
            }
            other => Err(OrbisError::Compile(format!(
                "Invalid column definition {}",
                other
            ))),
        }
    }

    fn to_sql(&self) -> String {
        match self {
            ColumnExpr::Plain(column) => escape_id(column),
            ColumnExpr::Alias { column, alias } => {
                format!("{} AS {}", escape_id(column), escape_id(alias))
            }
            ColumnExpr::Aggregate {
                function,
                expr,
                distinct,
                alias,
            } => {
                let name = match function {
                    AggregateFunction::Sum => "SUM",
                    AggregateFunction::Count => "COUNT",
                };
                format!(
                    "{}({}{}) AS {}",
                    name,
                    if *distinct { "DISTINCT " } else { "" },
                    escape_id(expr),
                    escape_id(alias)
                )
            }
        }
    }
}

fn first_entry(map: &Map<String, Value>) -> Option<(&String, &Value)> {
    map.iter().next()
}

/// Positional parameter accumulator
#[derive(Debug, Default)]
struct Parameters {
    values: Vec<Value>,
}

impl Parameters {
    /// Store a value and return its placeholder
    fn add(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }
}

#[derive(Debug, Clone)]
struct StructuredQuery {
    table: String,
    columns: Vec<ColumnExpr>,
    clauses: Vec<Predicate>,
    order_by: Vec<(String, OrderDirection)>,
    limit: Option<Value>,
    offset: Option<Value>,
}

#[derive(Debug, Clone)]
enum QuerySource {
    Raw(RawQuery),
    Structured(StructuredQuery),
}

/// Compiler for a single select query
#[derive(Debug)]
pub struct SqlSelectBuilder {
    params: Parameters,
    source: QuerySource,
}

impl SqlSelectBuilder {
    /// Parse a JSON query object
    ///
    /// Fails when the table is missing, when `$raw` is combined with any
    /// structured field, or when columns, predicates or ordering are malformed.
    pub fn from_json(query: &Value) -> Result<Self> {
        let object = query.as_object().ok_or_else(|| {
            OrbisError::Validation(format!("Query must be a JSON object, got {}", query))
        })?;

        let present = |key: &str| object.get(key).map_or(false, |v| !v.is_null());

        if present(RAW_KEY) {
            if let Some(conflict) = STRUCTURED_KEYS.iter().find(|key| present(key)) {
                return Err(OrbisError::Compile(format!(
                    "Raw queries cannot be combined with {}",
                    conflict
                )));
            }

            let raw: RawQuery = serde_json::from_value(object[RAW_KEY].clone())
                .map_err(|e| OrbisError::Validation(format!("Invalid raw query: {}", e)))?;

            return Ok(Self {
                params: Parameters::default(),
                source: QuerySource::Raw(raw),
            });
        }

        let table = object
            .get(TABLE_KEY)
            .and_then(Value::as_str)
            .filter(|table| !table.is_empty())
            .ok_or_else(|| {
                OrbisError::Configuration("Missing table (.from) definition".to_string())
            })?;

        let columns = match object.get(COLUMNS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(columns)) => columns
                .iter()
                .map(ColumnExpr::from_json)
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(OrbisError::Compile(format!(
                    "Columns must be an array, got {}",
                    other
                )))
            }
        };

        let clauses = match object.get(WHERE_KEY) {
            Some(value) => Predicate::clauses_from_json(value)?,
            None => Vec::new(),
        };

        let order_by = match object.get(ORDER_BY_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => parse_order_by(value)?,
        };

        let number = |key: &str| object.get(key).filter(|v| v.is_number()).cloned();

        Ok(Self {
            params: Parameters::default(),
            source: QuerySource::Structured(StructuredQuery {
                table: table.to_string(),
                columns,
                clauses,
                order_by,
                limit: number(LIMIT_KEY),
                offset: number(OFFSET_KEY),
            }),
        })
    }

    /// Produce the SQL text and its parameters
    pub fn build(mut self) -> CompiledQuery {
        let structured = match self.source {
            QuerySource::Raw(raw) => {
                return CompiledQuery {
                    query: raw.query,
                    params: raw.params,
                }
            }
            QuerySource::Structured(ref structured) => structured.clone(),
        };

        let mut parts = vec!["SELECT".to_string()];
        parts.push(Self::build_columns(&structured.columns));
        parts.push("FROM".to_string());
        parts.push(escape_id(&structured.table));

        if !structured.clauses.is_empty() {
            let clauses: Vec<String> = structured
                .clauses
                .iter()
                .map(|clause| self.build_predicate(clause))
                .collect();
            parts.push(format!("WHERE {}", clauses.join(" AND ")));
        }

        if !structured.order_by.is_empty() {
            let orders: Vec<String> = structured
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", escape_id(column), direction))
                .collect();
            parts.push(format!("ORDER BY {}", orders.join(", ")));
        }

        // Zero is a valid explicit limit/offset.
        if let Some(limit) = structured.limit {
            parts.push(format!("LIMIT {}", self.params.add(limit)));
        }

        if let Some(offset) = structured.offset {
            parts.push(format!("OFFSET {}", self.params.add(offset)));
        }

        CompiledQuery {
            query: parts.join(" "),
            params: self.params.values,
        }
    }

    fn build_columns(columns: &[ColumnExpr]) -> String {
        if columns.is_empty() {
            return "*".to_string();
        }

        columns
            .iter()
            .map(ColumnExpr::to_sql)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn build_predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::And(children) => self.build_connective(children, " AND "),
            Predicate::Or(children) => self.build_connective(children, " OR "),
            Predicate::Column { column, condition } => self.build_condition(column, condition),
        }
    }

    fn build_connective(&mut self, children: &[Predicate], separator: &str) -> String {
        let conditions: Vec<String> = children
            .iter()
            .map(|child| self.build_predicate(child))
            .collect();
        format!("({})", conditions.join(separator))
    }

    fn build_list(&mut self, values: &[Value]) -> String {
        let placeholders: Vec<String> = values
            .iter()
            .map(|value| self.params.add(value.clone()))
            .collect();
        format!("({})", placeholders.join(", "))
    }

    fn build_condition(&mut self, column: &str, condition: &Condition) -> String {
        let field = escape_id(column);

        match condition {
            Condition::Eq(v) => format!("{} = {}", field, self.params.add(v.clone())),
            Condition::Neq(v) => format!("{} <> {}", field, self.params.add(v.clone())),
            Condition::In(values) => format!("{} IN {}", field, self.build_list(values)),
            Condition::NotIn(values) => format!("{} NOT IN {}", field, self.build_list(values)),
            Condition::Gt(v) => format!("{} > {}", field, self.params.add(v.clone())),
            Condition::Gte(v) => format!("{} >= {}", field, self.params.add(v.clone())),
            Condition::Lt(v) => format!("{} < {}", field, self.params.add(v.clone())),
            Condition::Lte(v) => format!("{} <= {}", field, self.params.add(v.clone())),
            Condition::Between { min, max } => {
                let min = self.params.add(min.clone());
                let max = self.params.add(max.clone());
                format!("{} BETWEEN {} AND {}", field, min, max)
            }
            Condition::Like(pattern) => {
                format!("{} LIKE {}", field, self.params.add(Value::String(pattern.clone())))
            }
            Condition::Ilike(pattern) => {
                format!("{} ILIKE {}", field, self.params.add(Value::String(pattern.clone())))
            }
            Condition::Contains(v) => self.like(&field, "LIKE", wildcard(v, true, true)),
            Condition::Icontains(v) => self.like(&field, "ILIKE", wildcard(v, true, true)),
            Condition::StartsWith(v) => self.like(&field, "LIKE", wildcard(v, false, true)),
            Condition::IstartsWith(v) => self.like(&field, "ILIKE", wildcard(v, false, true)),
            Condition::EndsWith(v) => self.like(&field, "LIKE", wildcard(v, true, false)),
            Condition::IendsWith(v) => self.like(&field, "ILIKE", wildcard(v, true, false)),
        }
    }

    fn like(&mut self, field: &str, operator: &str, pattern: String) -> String {
        format!("{} {} {}", field, operator, self.params.add(Value::String(pattern)))
    }
}

/// Wrap a compare value with `%` unless it already carries one on that side
fn wildcard(value: &str, leading: bool, trailing: bool) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    if leading && !value.starts_with('%') {
        pattern.push('%');
    }
    pattern.push_str(value);
    if trailing && !value.ends_with('%') {
        pattern.push('%');
    }
    pattern
}

fn parse_order_by(value: &Value) -> Result<Vec<(String, OrderDirection)>> {
    let pairs = value.as_array().ok_or_else(|| {
        OrbisError::Validation(format!("Order by must be an array of pairs, got {}", value))
    })?;

    pairs
        .iter()
        .map(|pair| match pair.as_array().map(Vec::as_slice) {
            Some([Value::String(column), Value::String(direction)]) => {
                Ok((column.clone(), direction.parse()?))
            }
            _ => Err(OrbisError::Validation(format!(
                "Invalid order by pair {}",
                pair
            ))),
        })
        .collect()
}

/// Compile a JSON query in one step
pub fn compile(query: &Value) -> Result<CompiledQuery> {
    Ok(SqlSelectBuilder::from_json(query)?.build())
}
