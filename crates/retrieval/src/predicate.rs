//! Filter predicates
//!
//! A conjunction of [`FilterCondition`]s. The same predicate is evaluated in
//! memory against record attributes or rendered to a parameterised Postgres
//! `WHERE` clause over a JSONB column. In both forms a condition on a missing
//! attribute is false.

use crate::types::{FilterCondition, FilterOperator, Metadata};
use agentrag_common::errors::Result;
use serde_json::Value;
use std::cmp::Ordering;

/// Conjunction of filter conditions
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    conditions: Vec<FilterCondition>,
}

impl Predicate {
    /// Build a predicate, rejecting malformed conditions
    pub fn new(conditions: Vec<FilterCondition>) -> Result<Self> {
        for condition in &conditions {
            condition.validate()?;
        }
        Ok(Self { conditions })
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a record's attributes
    pub fn matches(&self, attributes: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|condition| match attributes.get(&condition.field) {
                Some(actual) => condition_holds(condition, actual),
                None => false,
            })
    }

    /// Render as a SQL boolean expression over a JSONB `column`
    ///
    /// Placeholders start at `$first_param`; the returned values bind them in
    /// order. An empty predicate renders as `TRUE`.
    pub fn to_sql(&self, column: &str, first_param: usize) -> (String, Vec<sea_orm::Value>) {
        if self.conditions.is_empty() {
            return ("TRUE".to_string(), Vec::new());
        }

        let mut values: Vec<sea_orm::Value> = Vec::new();
        let mut next = first_param;
        let mut bind = |value: String, values: &mut Vec<sea_orm::Value>| {
            values.push(value.into());
            let placeholder = format!("${}", next);
            next += 1;
            placeholder
        };

        let clauses: Vec<String> = self
            .conditions
            .iter()
            .map(|condition| {
                let key = bind(condition.field.clone(), &mut values);
                let field = format!("({} -> {}::text)", column, key);
                let text = format!("({} ->> {}::text)", column, key);

                match condition.operator {
                    FilterOperator::Eq => {
                        let v = bind(condition.value.to_string(), &mut values);
                        format!("{} = {}::jsonb", field, v)
                    }
                    FilterOperator::Ne => {
                        let v = bind(condition.value.to_string(), &mut values);
                        format!("{} <> {}::jsonb", field, v)
                    }
                    FilterOperator::Gt
                    | FilterOperator::Lt
                    | FilterOperator::Gte
                    | FilterOperator::Lte => {
                        let op = sql_comparison(condition.operator);
                        match &condition.value {
                            Value::Number(n) => {
                                let v = bind(n.to_string(), &mut values);
                                format!(
                                    "(CASE WHEN jsonb_typeof({field}) = 'number' THEN {text}::numeric {op} {v}::numeric ELSE FALSE END)"
                                )
                            }
                            other => {
                                let v = bind(value_as_text(other), &mut values);
                                format!(
                                    "(CASE WHEN jsonb_typeof({field}) = 'string' THEN {text} {op} {v}::text ELSE FALSE END)"
                                )
                            }
                        }
                    }
                    FilterOperator::Contains => {
                        let needle = bind(value_as_text(&condition.value), &mut values);
                        let element =
                            bind(Value::Array(vec![condition.value.clone()]).to_string(), &mut values);
                        format!(
                            "(CASE WHEN jsonb_typeof({field}) = 'string' THEN strpos({text}, {needle}::text) > 0 \
                             WHEN jsonb_typeof({field}) = 'array' THEN {field} @> {element}::jsonb ELSE FALSE END)"
                        )
                    }
                    FilterOperator::In | FilterOperator::NotIn => {
                        let set = bind(condition.value.to_string(), &mut values);
                        let negate = if condition.operator == FilterOperator::NotIn { "NOT " } else { "" };
                        format!(
                            "(CASE WHEN jsonb_exists({column}, {key}::text) THEN {negate}({set}::jsonb @> jsonb_build_array({field})) ELSE FALSE END)"
                        )
                    }
                }
            })
            .collect();

        (clauses.join(" AND "), values)
    }
}

fn sql_comparison(operator: FilterOperator) -> &'static str {
    match operator {
        FilterOperator::Gt => ">",
        FilterOperator::Lt => "<",
        FilterOperator::Gte => ">=",
        _ => "<=",
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn compare_values(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn condition_holds(condition: &FilterCondition, actual: &Value) -> bool {
    let expected = &condition.value;

    match condition.operator {
        FilterOperator::Eq => values_equal(actual, expected),
        FilterOperator::Ne => !values_equal(actual, expected),
        FilterOperator::Gt => compare_values(actual, expected) == Some(Ordering::Greater),
        FilterOperator::Lt => compare_values(actual, expected) == Some(Ordering::Less),
        FilterOperator::Gte => matches!(
            compare_values(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::Lte => matches!(
            compare_values(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::Contains => match actual {
            Value::String(haystack) => haystack.contains(&value_as_text(expected)),
            Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
            _ => false,
        },
        FilterOperator::In => expected
            .as_array()
            .map(|set| set.iter().any(|item| values_equal(item, actual)))
            .unwrap_or(false),
        FilterOperator::NotIn => expected
            .as_array()
            .map(|set| !set.iter().any(|item| values_equal(item, actual)))
            .unwrap_or(false),
    }
}
