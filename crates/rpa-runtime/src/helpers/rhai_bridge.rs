use std::collections::BTreeMap;

use rhai::{Array, Dynamic, ImmutableString, Map, FLOAT, INT};
use rpa_core::{DataTable, EngineError, InstanceRef, Value};

/// Variable names that can be pushed into a Rhai scope and referenced from
/// an expression. Studio names with spaces or dots are skipped.
pub(crate) fn is_rhai_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

pub(crate) fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(value) => Dynamic::from_bool(*value),
        Value::Int(value) => Dynamic::from_int(*value as INT),
        Value::Float(value) => Dynamic::from_float(*value as FLOAT),
        Value::String(value) => Dynamic::from(value.clone()),
        Value::List(values) => {
            let array = values.iter().map(value_to_dynamic).collect::<Array>();
            Dynamic::from_array(array)
        }
        Value::Map(values) => {
            let mut map = Map::new();
            for (key, value) in values {
                map.insert(key.clone().into(), value_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
        Value::Table(table) => Dynamic::from(table.clone()),
        Value::Handle(reference) => Dynamic::from(reference.clone()),
    }
}

pub(crate) fn dynamic_to_value(value: Dynamic) -> Result<Value, EngineError> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if value.is::<bool>() {
        return Ok(Value::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(Value::Int(value.cast::<INT>() as i64));
    }
    if value.is::<FLOAT>() {
        return Ok(Value::Float(value.cast::<FLOAT>() as f64));
    }
    if value.is::<ImmutableString>() {
        return Ok(Value::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<char>() {
        return Ok(Value::String(value.cast::<char>().to_string()));
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            out.push(dynamic_to_value(item)?);
        }
        return Ok(Value::List(out));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        let mut out = BTreeMap::new();
        for (key, value) in map {
            out.insert(key.to_string(), dynamic_to_value(value)?);
        }
        return Ok(Value::Map(out));
    }
    if value.is::<DataTable>() {
        return Ok(Value::Table(value.cast::<DataTable>()));
    }
    if value.is::<InstanceRef>() {
        return Ok(Value::Handle(value.cast::<InstanceRef>()));
    }

    Err(EngineError::evaluation(
        "ENGINE_VALUE_UNSUPPORTED",
        format!("Unsupported Rhai value type \"{}\".", value.type_name()),
    ))
}

#[cfg(test)]
mod rhai_bridge_tests {
    use super::*;

    #[test]
    fn identifiers_follow_rhai_rules() {
        assert!(is_rhai_identifier("vCounter"));
        assert!(is_rhai_identifier("_tmp1"));
        assert!(!is_rhai_identifier("1abc"));
        assert!(!is_rhai_identifier("row.count"));
        assert!(!is_rhai_identifier(""));
    }

    #[test]
    fn nested_values_survive_the_bridge() {
        let mut table = DataTable::new(vec!["id".to_string()]);
        table.rows.push(vec![Value::Int(7)]);
        let value = Value::Map(BTreeMap::from([
            (
                "items".to_string(),
                Value::List(vec![Value::Int(1), Value::Float(2.5), Value::Null]),
            ),
            ("flag".to_string(), Value::Bool(true)),
            ("sheet".to_string(), Value::Table(table)),
            ("window".to_string(), Value::handle("notepad")),
        ]));
        let back = dynamic_to_value(value_to_dynamic(&value)).expect("bridge");
        assert_eq!(back, value);
    }

    #[test]
    fn unsupported_dynamic_is_reported() {
        #[derive(Clone)]
        struct Opaque;
        let error = dynamic_to_value(Dynamic::from(Opaque)).expect_err("opaque");
        assert_eq!(error.code, "ENGINE_VALUE_UNSUPPORTED");
    }
}
