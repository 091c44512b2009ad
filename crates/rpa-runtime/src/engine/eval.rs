use std::cmp::Ordering;

use rpa_core::{Comparison, Logic};

use super::*;

impl ExecutionEngine {
    pub(super) fn evaluate(&self, expression: &str) -> Result<Value, EngineError> {
        self.evaluator.evaluate(expression, &self.state.bindings())
    }

    pub(super) fn render(&self, template: &str) -> Result<String, EngineError> {
        self.evaluator.render(template, &self.state.bindings())
    }

    pub(super) fn evaluate_predicate(&self, predicate: &Predicate) -> Result<bool, EngineError> {
        match predicate {
            Predicate::Expression { expr } => match self.evaluate(expr)? {
                Value::Bool(value) => Ok(value),
                other => Err(EngineError::evaluation(
                    "ENGINE_BOOLEAN_EXPECTED",
                    format!(
                        "Condition \"{}\" produced {} instead of a boolean.",
                        expr,
                        other.type_name()
                    ),
                )),
            },
            Predicate::Compare {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(compare_values(&left, *operator, &right))
            }
            Predicate::VariableHasValue { name } => Ok(self
                .state
                .variable(name)
                .is_some_and(|value| !value.is_empty())),
            Predicate::InstanceExists { name } => Ok(self.state.instances().contains(name)),
        }
    }

    /// Lazy: stops at the first predicate that decides the outcome.
    pub(super) fn evaluate_predicates(
        &self,
        logic: Logic,
        predicates: &[Predicate],
    ) -> Result<bool, EngineError> {
        for predicate in predicates {
            let value = self.evaluate_predicate(predicate)?;
            match (logic, value) {
                (Logic::And, false) => return Ok(false),
                (Logic::Or, true) => return Ok(true),
                _ => {}
            }
        }
        Ok(logic == Logic::And)
    }

    pub(super) fn evaluate_count(&self, expression: &str) -> Result<usize, EngineError> {
        let value = self.evaluate(expression)?;
        value
            .as_int()
            .and_then(|count| usize::try_from(count).ok())
            .ok_or_else(|| {
                EngineError::evaluation(
                    "ENGINE_LOOP_COUNT_INVALID",
                    format!(
                        "Loop count \"{}\" must be a non-negative integer, got {}.",
                        expression,
                        value.to_text()
                    ),
                )
            })
    }

    /// Items of a collection loop. Table rows become lists, map entries
    /// become `{key, value}` maps.
    pub(super) fn evaluate_collection(&self, expression: &str) -> Result<Vec<Value>, EngineError> {
        match self.evaluate(expression)? {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => Ok(items),
            Value::Table(table) => Ok(table.rows.into_iter().map(Value::List).collect()),
            Value::Map(entries) => Ok(entries
                .into_iter()
                .map(|(key, value)| {
                    Value::Map(BTreeMap::from([
                        ("key".to_string(), Value::String(key)),
                        ("value".to_string(), value),
                    ]))
                })
                .collect()),
            other => Err(EngineError::evaluation(
                "ENGINE_LOOP_COLLECTION_INVALID",
                format!(
                    "\"{}\" is a {}, which cannot be iterated.",
                    expression,
                    other.type_name()
                ),
            )),
        }
    }
}

/// Numeric when both sides read as numbers, text otherwise. The text
/// operators always compare text.
pub(crate) fn compare_values(left: &Value, operator: Comparison, right: &Value) -> bool {
    let (left_text, right_text) = (left.to_text(), right.to_text());
    match operator {
        Comparison::Contains => return left_text.contains(&right_text),
        Comparison::StartsWith => return left_text.starts_with(&right_text),
        Comparison::EndsWith => return left_text.ends_with(&right_text),
        _ => {}
    }

    let ordering = match (left.to_number(), right.to_number()) {
        (Some(left), Some(right)) => left.partial_cmp(&right),
        _ => Some(left_text.cmp(&right_text)),
    };
    let Some(ordering) = ordering else {
        return operator == Comparison::NotEqual;
    };
    match operator {
        Comparison::Equal => ordering == Ordering::Equal,
        Comparison::NotEqual => ordering != Ordering::Equal,
        Comparison::Greater => ordering == Ordering::Greater,
        Comparison::GreaterOrEqual => ordering != Ordering::Less,
        Comparison::Less => ordering == Ordering::Less,
        Comparison::LessOrEqual => ordering != Ordering::Greater,
        Comparison::Contains | Comparison::StartsWith | Comparison::EndsWith => false,
    }
}
