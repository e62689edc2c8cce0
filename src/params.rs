//! Interpolation parameters.
//!
//! Parameters are JSON objects. Nested objects are flattened before
//! substitution so templates only ever see leaf names.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Interpolation parameters, in insertion order.
pub type Params = Map<String, Value>;

static QUOTED_KEY_REGEX: OnceLock<Regex> = OnceLock::new();
static QUOTED_VALUE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Flatten nested parameter objects into a single mapping.
///
/// Object-valued entries are replaced by their own flattened contents; other
/// values pass through. Entries are visited in the object's own order and a
/// later leaf with the same name overwrites an earlier one.
pub fn flatten_params(params: Option<&Params>) -> Option<Params> {
    params.map(|params| {
        let mut flat = Params::new();
        flatten_into(params, &mut flat);
        flat
    })
}

fn flatten_into(params: &Params, flat: &mut Params) {
    for (key, value) in params {
        match value {
            Value::Object(nested) => flatten_into(nested, flat),
            other => {
                flat.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Parse an interpolation string written in relaxed object syntax.
///
/// Accepts strict JSON plus the forms people write in templates: bare or
/// single-quoted keys (`{n: 1}`, `{'n': 1}`) and single-quoted string values
/// (`{n: 'v'}`). Returns `None` if the result is not a JSON object.
pub fn parse_params(input: &str) -> Option<Params> {
    let key_regex = QUOTED_KEY_REGEX
        .get_or_init(|| Regex::new(r"(')?([a-zA-Z0-9_]+)(')?(\s)?:").expect("key pattern is valid"));
    let value_regex = QUOTED_VALUE_REGEX
        .get_or_init(|| Regex::new(r":(\s)?(')(.*?)(')").expect("value pattern is valid"));

    let normalized = key_regex.replace_all(input, "\"$2\":");
    let normalized = value_regex.replace_all(&normalized, ":\"$3\"");

    match serde_json::from_str::<Value>(&normalized) {
        Ok(Value::Object(params)) => Some(params),
        _ => None,
    }
}

/// Render a parameter value for substitution into a template.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
