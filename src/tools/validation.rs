//! Tool argument validation against JSON schemas.
//!
//! Checks the arguments the model produced for a function call against the
//! tool's declared schema: required fields, property types and `enum`
//! constraints, down through nested objects and array `items`. Extra fields
//! are allowed.
//!
//! # Examples
//!
//! ```
//! use zefira::tools::validation::validate_tool_args;
//!
//! let schema = serde_json::json!({
//!     "type": "object",
//!     "properties": {
//!         "intelligent": { "type": "boolean" }
//!     },
//!     "required": ["intelligent"]
//! });
//!
//! let result = validate_tool_args("set_intelligence", r#"{"intelligent": true}"#, Some(&schema));
//! assert!(result.is_ok());
//! ```

use crate::error::DialogError;

/// Parse and validate tool arguments.
///
/// Tools without a schema take no arguments: whatever the model sent is
/// ignored and an empty object is returned. Blank argument strings are read
/// as `{}`.
///
/// # Errors
///
/// Returns [`DialogError::Tool`] if:
/// - `args_json` is not valid JSON
/// - a required field is missing
/// - a field has the wrong type or a value outside its `enum`
pub fn validate_tool_args(
    tool_name: &str,
    args_json: &str,
    schema: Option<&serde_json::Value>,
) -> Result<serde_json::Value, DialogError> {
    let Some(schema) = schema else {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    };

    let value: serde_json::Value = if args_json.trim().is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(args_json).map_err(|e| {
            DialogError::Tool(format!("tool '{tool_name}': invalid JSON arguments: {e}"))
        })?
    };

    let schema_type = schema.get("type").and_then(|t| t.as_str()).unwrap_or("");
    if schema_type != "object" {
        return Ok(value);
    }

    let obj = value.as_object().ok_or_else(|| {
        DialogError::Tool(format!(
            "tool '{tool_name}': expected object arguments, got {}",
            json_type_name(&value)
        ))
    })?;

    check_object(tool_name, "", obj, schema)?;
    Ok(value)
}

/// Check `required` and `properties` of an object, recursing into nested
/// objects and array items. `path` is empty at the top level.
fn check_object(
    tool_name: &str,
    path: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
    schema: &serde_json::Value,
) -> Result<(), DialogError> {
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for req_field in required {
            if let Some(field_name) = req_field.as_str()
                && !obj.contains_key(field_name)
            {
                return Err(DialogError::Tool(format!(
                    "tool '{tool_name}': missing required field '{}'",
                    field_path(path, field_name)
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, val) in obj {
            if let Some(prop_schema) = properties.get(key) {
                validate_field(tool_name, &field_path(path, key), val, prop_schema)?;
            }
        }
    }

    Ok(())
}

fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

fn validate_field(
    tool_name: &str,
    field_name: &str,
    value: &serde_json::Value,
    prop_schema: &serde_json::Value,
) -> Result<(), DialogError> {
    if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
        let matches = match expected_type {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            "null" => value.is_null(),
            _ => true,
        };
        if !matches {
            return Err(DialogError::Tool(format!(
                "tool '{tool_name}': field '{field_name}' expected {expected_type}, got {}",
                json_type_name(value)
            )));
        }
    }

    if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array())
        && !allowed.contains(value)
    {
        return Err(DialogError::Tool(format!(
            "tool '{tool_name}': field '{field_name}' must be one of {}",
            serde_json::Value::Array(allowed.clone())
        )));
    }

    match value {
        serde_json::Value::Object(obj) => check_object(tool_name, field_name, obj, prop_schema)?,
        serde_json::Value::Array(elements) => {
            if let Some(items) = prop_schema.get("items") {
                for (index, element) in elements.iter().enumerate() {
                    validate_field(tool_name, &format!("{field_name}[{index}]"), element, items)?;
                }
            }
        }
        _ => {}
    }

    Ok(())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
