use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use rhai::{Dynamic, Engine, ImmutableString, Scope, INT};
use rpa_core::{DataTable, EngineError, InstanceRef, Value};

use crate::helpers::rhai_bridge::{dynamic_to_value, is_rhai_identifier, value_to_dynamic};

pub type Bindings = BTreeMap<String, Value>;

/// Turns expression text into a typed value against the current bindings
/// (variables and arguments of the running script).
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EngineError>;

    /// Replaces every `${expr}` in `template` with the rendered text of
    /// `expr`. Text without placeholders is returned unchanged.
    fn render(&self, template: &str, bindings: &Bindings) -> Result<String, EngineError> {
        let regex = template_regex();
        let mut output = String::new();
        let mut last_index = 0usize;
        for captures in regex.captures_iter(template) {
            let (Some(full), Some(expr)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            output.push_str(&template[last_index..full.start()]);
            let value = self.evaluate(expr.as_str(), bindings)?;
            output.push_str(&value.to_text());
            last_index = full.end();
        }
        output.push_str(&template[last_index..]);
        Ok(output)
    }
}

fn template_regex() -> &'static Regex {
    static TEMPLATE: OnceLock<Regex> = OnceLock::new();
    TEMPLATE.get_or_init(|| Regex::new(r"\$\{([^{}]+)\}").expect("template regex must compile"))
}

/// Default evaluator backed by Rhai with strict variables.
pub struct RhaiEvaluator {
    engine: Engine,
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RhaiEvaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_strict_variables(true);

        engine.register_type_with_name::<DataTable>("Table");
        engine.register_fn("row_count", |table: &mut DataTable| table.row_count() as INT);
        engine.register_fn("column_count", |table: &mut DataTable| {
            table.columns.len() as INT
        });
        engine.register_fn(
            "cell",
            |table: &mut DataTable, row: INT, column: ImmutableString| -> Dynamic {
                if row < 0 {
                    return Dynamic::UNIT;
                }
                table
                    .cell(row as usize, column.as_str())
                    .map(value_to_dynamic)
                    .unwrap_or(Dynamic::UNIT)
            },
        );

        engine.register_type_with_name::<InstanceRef>("Instance");
        engine.register_get("instance", |reference: &mut InstanceRef| {
            ImmutableString::from(reference.instance.as_str())
        });

        Self { engine }
    }

    /// Access for hosts that register extra functions.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EngineError> {
        if expression.trim().is_empty() {
            return Ok(Value::Null);
        }

        let mut scope = Scope::new();
        for (name, value) in bindings {
            if is_rhai_identifier(name) {
                scope.push_dynamic(name.clone(), value_to_dynamic(value));
            }
        }

        let result = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, expression)
            .map_err(|error| {
                EngineError::evaluation(
                    "ENGINE_EVAL_ERROR",
                    format!("Expression \"{}\" failed: {}", expression, error),
                )
            })?;
        dynamic_to_value(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(entries: &[(&str, Value)]) -> Bindings {
        entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn arithmetic_and_comparison() {
        let evaluator = RhaiEvaluator::new();
        let scope = bindings(&[("x", Value::Int(2))]);
        assert_eq!(
            evaluator.evaluate("1 + 1", &scope).expect("eval"),
            Value::Int(2)
        );
        assert_eq!(
            evaluator.evaluate("x == 2", &scope).expect("eval"),
            Value::Bool(true)
        );
        assert_eq!(
            evaluator.evaluate("\"log\" + x", &scope).expect("eval"),
            Value::string("log2")
        );
        assert_eq!(evaluator.evaluate("  ", &scope).expect("eval"), Value::Null);
    }

    #[test]
    fn unknown_variable_is_an_evaluation_error() {
        let evaluator = RhaiEvaluator::new();
        let error = evaluator
            .evaluate("missing + 1", &Bindings::new())
            .expect_err("strict variables");
        assert_eq!(error.code, "ENGINE_EVAL_ERROR");
        assert_eq!(error.kind, rpa_core::ErrorKind::Evaluation);
    }

    #[test]
    fn render_interpolates_placeholders() {
        let evaluator = RhaiEvaluator::new();
        let scope = bindings(&[("name", Value::string("ada")), ("n", Value::Int(3))]);
        assert_eq!(
            evaluator
                .render("hello ${name}, ${n + 1} items", &scope)
                .expect("render"),
            "hello ada, 4 items"
        );
        assert_eq!(
            evaluator.render("no placeholders", &scope).expect("render"),
            "no placeholders"
        );
    }

    #[test]
    fn tables_and_handles_are_usable_from_expressions() {
        let evaluator = RhaiEvaluator::new();
        let mut table = DataTable::new(vec!["name".to_string()]);
        table.rows.push(vec![Value::string("row0")]);
        let scope = bindings(&[
            ("sheet", Value::Table(table)),
            ("browser", Value::handle("chrome")),
        ]);
        assert_eq!(
            evaluator.evaluate("sheet.row_count()", &scope).expect("eval"),
            Value::Int(1)
        );
        assert_eq!(
            evaluator
                .evaluate("sheet.cell(0, \"name\")", &scope)
                .expect("eval"),
            Value::string("row0")
        );
        assert_eq!(
            evaluator.evaluate("browser.instance", &scope).expect("eval"),
            Value::string("chrome")
        );
        assert_eq!(
            evaluator.evaluate("browser", &scope).expect("eval"),
            Value::handle("chrome")
        );
    }

    #[test]
    fn names_that_are_not_identifiers_are_skipped() {
        let evaluator = RhaiEvaluator::new();
        let scope = bindings(&[("my var", Value::Int(1)), ("ok", Value::Int(2))]);
        assert_eq!(evaluator.evaluate("ok", &scope).expect("eval"), Value::Int(2));
    }
}
