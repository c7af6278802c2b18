//! Predicate tree model
//!
//! Conditions travel as JSON (`{"column": {"$op": value}}`) because that is
//! the shape the node accepts. Before compilation they are normalized into
//! the typed [`Predicate`] tree defined here:
//!
//! - scalar values are sugar for `$eq`
//! - bare arrays are sugar for `$in`
//! - objects with several keys become an implicit `$and` of single-key objects

use serde_json::{Map, Value};

use crate::error::{OrbisError, Result};

/// Comparison applied to a single column
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`
    Eq(Value),

    /// `column <> value`
    Neq(Value),

    /// `column IN (...)`
    In(Vec<Value>),

    /// `column NOT IN (...)`
    NotIn(Vec<Value>),

    /// `column > value`
    Gt(Value),

    /// `column >= value`
    Gte(Value),

    /// `column < value`
    Lt(Value),

    /// `column <= value`
    Lte(Value),

    /// `column BETWEEN min AND max`
    Between {
        /// Lower bound (inclusive)
        min: Value,
        /// Upper bound (inclusive)
        max: Value,
    },

    /// `column LIKE pattern`, pattern used verbatim
    Like(String),

    /// `column ILIKE pattern`, pattern used verbatim
    Ilike(String),

    /// `column LIKE %value%`
    Contains(String),

    /// `column ILIKE %value%`
    Icontains(String),

    /// `column LIKE value%`
    StartsWith(String),

    /// `column ILIKE value%`
    IstartsWith(String),

    /// `column LIKE %value`
    EndsWith(String),

    /// `column ILIKE %value`
    IendsWith(String),
}

impl Condition {
    /// Operator tag used in the JSON representation
    pub fn operator(&self) -> &'static str {
        match self {
            Condition::Eq(_) => "$eq",
            Condition::Neq(_) => "$neq",
            Condition::In(_) => "$in",
            Condition::NotIn(_) => "$nin",
            Condition::Gt(_) => "$gt",
            Condition::Gte(_) => "$gte",
            Condition::Lt(_) => "$lt",
            Condition::Lte(_) => "$lte",
            Condition::Between { .. } => "$between",
            Condition::Like(_) => "$like",
            Condition::Ilike(_) => "$ilike",
            Condition::Contains(_) => "$contains",
            Condition::Icontains(_) => "$icontains",
            Condition::StartsWith(_) => "$startsWith",
            Condition::IstartsWith(_) => "$istartsWith",
            Condition::EndsWith(_) => "$endsWith",
            Condition::IendsWith(_) => "$iendsWith",
        }
    }

    /// Parse an operator tag and its operand
    pub fn from_operator(operator: &str, operand: &Value) -> Result<Self> {
        let condition = match operator {
            "$eq" => Condition::Eq(scalar(operator, operand)?),
            "$neq" => Condition::Neq(scalar(operator, operand)?),
            "$gt" => Condition::Gt(scalar(operator, operand)?),
            "$gte" => Condition::Gte(scalar(operator, operand)?),
            "$lt" => Condition::Lt(scalar(operator, operand)?),
            "$lte" => Condition::Lte(scalar(operator, operand)?),
            "$in" => Condition::In(scalar_list(operator, operand)?),
            "$nin" => Condition::NotIn(scalar_list(operator, operand)?),
            "$between" => {
                let bounds = operand.as_object().ok_or_else(|| {
                    malformed(operator, "expected an object with $min and $max")
                })?;
                let min = bounds
                    .get("$min")
                    .ok_or_else(|| malformed(operator, "missing $min"))?;
                let max = bounds
                    .get("$max")
                    .ok_or_else(|| malformed(operator, "missing $max"))?;

                Condition::Between {
                    min: scalar(operator, min)?,
                    max: scalar(operator, max)?,
                }
            }
            "$like" => Condition::Like(text(operator, operand)?),
            "$ilike" => Condition::Ilike(text(operator, operand)?),
            "$contains" => Condition::Contains(text(operator, operand)?),
            "$icontains" => Condition::Icontains(text(operator, operand)?),
            "$startsWith" => Condition::StartsWith(text(operator, operand)?),
            "$istartsWith" => Condition::IstartsWith(text(operator, operand)?),
            "$endsWith" => Condition::EndsWith(text(operator, operand)?),
            "$iendsWith" => Condition::IendsWith(text(operator, operand)?),
            other => {
                return Err(OrbisError::Validation(format!(
                    "Unknown comparison operator {}",
                    other
                )))
            }
        };

        Ok(condition)
    }

    /// JSON operand for this condition
    pub fn operand(&self) -> Value {
        match self {
            Condition::Eq(v)
            | Condition::Neq(v)
            | Condition::Gt(v)
            | Condition::Gte(v)
            | Condition::Lt(v)
            | Condition::Lte(v) => v.clone(),
            Condition::In(values) | Condition::NotIn(values) => Value::Array(values.clone()),
            Condition::Between { min, max } => {
                let mut bounds = Map::new();
                bounds.insert("$min".to_string(), min.clone());
                bounds.insert("$max".to_string(), max.clone());
                Value::Object(bounds)
            }
            Condition::Like(s)
            | Condition::Ilike(s)
            | Condition::Contains(s)
            | Condition::Icontains(s)
            | Condition::StartsWith(s)
            | Condition::IstartsWith(s)
            | Condition::EndsWith(s)
            | Condition::IendsWith(s) => Value::String(s.clone()),
        }
    }
}

/// Recursive predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Leaf comparison on a single column
    Column {
        /// Column name (unescaped)
        column: String,
        /// Comparison to apply
        condition: Condition,
    },

    /// All children must hold
    And(Vec<Predicate>),

    /// At least one child must hold
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Leaf predicate on a column
    pub fn column(column: impl Into<String>, condition: Condition) -> Self {
        Predicate::Column {
            column: column.into(),
            condition,
        }
    }

    /// Normalize a JSON where-clause into top-level clauses joined by `AND`
    ///
    /// Returns an empty list for a missing or empty clause.
    pub fn clauses_from_json(value: &Value) -> Result<Vec<Predicate>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| Self::from_entry(key, value))
                .collect(),
            other => Err(OrbisError::Validation(format!(
                "Where clause must be an object, got {}",
                other
            ))),
        }
    }

    /// Normalize a single JSON condition object into a predicate
    pub fn from_json(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            OrbisError::Validation(format!("Condition must be an object, got {}", value))
        })?;

        let mut entries = map.iter();
        match (entries.next(), entries.next()) {
            (None, _) => Err(OrbisError::Validation("Empty condition object".to_string())),
            (Some((key, value)), None) => Self::from_entry(key, value),
            _ => Ok(Predicate::And(
                map.iter()
                    .map(|(key, value)| Self::from_entry(key, value))
                    .collect::<Result<Vec<_>>>()?,
            )),
        }
    }

    fn from_entry(key: &str, value: &Value) -> Result<Self> {
        match key {
            "$and" => Ok(Predicate::And(Self::connective_children(key, value)?)),
            "$or" => Ok(Predicate::Or(Self::connective_children(key, value)?)),
            k if k.starts_with('$') => Err(OrbisError::Validation(format!(
                "Unknown logical operator {}",
                k
            ))),
            column => Self::column_condition(column, value),
        }
    }

    fn connective_children(operator: &str, value: &Value) -> Result<Vec<Predicate>> {
        let children = value
            .as_array()
            .ok_or_else(|| malformed(operator, "expected an array of conditions"))?;

        if children.is_empty() {
            return Err(malformed(operator, "expected at least one condition"));
        }

        children.iter().map(Self::from_json).collect()
    }

    fn column_condition(column: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Array(_) => Ok(Predicate::column(
                column,
                Condition::In(scalar_list("$in", value)?),
            )),
            Value::Object(operators) => {
                if operators.is_empty() {
                    return Err(OrbisError::Validation(format!(
                        "Empty condition for column {}",
                        column
                    )));
                }

                let mut leaves = operators
                    .iter()
                    .map(|(operator, operand)| {
                        Ok(Predicate::column(
                            column,
                            Condition::from_operator(operator, operand)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;

                if leaves.len() == 1 {
                    Ok(leaves.remove(0))
                } else {
                    Ok(Predicate::And(leaves))
                }
            }
            scalar_value => Ok(Predicate::column(
                column,
                Condition::Eq(scalar("$eq", scalar_value)?),
            )),
        }
    }

    /// JSON representation accepted by the node
    pub fn to_json(&self) -> Value {
        match self {
            Predicate::Column { column, condition } => {
                let mut op = Map::new();
                op.insert(condition.operator().to_string(), condition.operand());
                let mut leaf = Map::new();
                leaf.insert(column.clone(), Value::Object(op));
                Value::Object(leaf)
            }
            Predicate::And(children) => connective_json("$and", children),
            Predicate::Or(children) => connective_json("$or", children),
        }
    }
}

impl From<Predicate> for Value {
    fn from(predicate: Predicate) -> Self {
        predicate.to_json()
    }
}

fn connective_json(operator: &str, children: &[Predicate]) -> Value {
    let mut map = Map::new();
    map.insert(
        operator.to_string(),
        Value::Array(children.iter().map(Predicate::to_json).collect()),
    );
    Value::Object(map)
}

fn malformed(operator: &str, reason: &str) -> OrbisError {
    OrbisError::Validation(format!("Malformed {} condition: {}", operator, reason))
}

fn scalar(operator: &str, value: &Value) -> Result<Value> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value.clone()),
        other => Err(malformed(
            operator,
            &format!("expected a string, number or boolean, got {}", other),
        )),
    }
}

fn scalar_list(operator: &str, value: &Value) -> Result<Vec<Value>> {
    let values = value
        .as_array()
        .ok_or_else(|| malformed(operator, "expected an array"))?;

    if values.is_empty() {
        return Err(malformed(operator, "expected at least one value"));
    }

    values.iter().map(|v| scalar(operator, v)).collect()
}

fn text(operator: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(operator, "expected a string"))
}
