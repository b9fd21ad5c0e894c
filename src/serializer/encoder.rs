//! Type-aware literal encoding.
//!
//! Values are rendered into a static dump file, never into a live query, so
//! the only quoting discipline is the SQL literal one: single quotes, with
//! embedded quotes doubled.

use crate::catalog::{AttrValue, ColumnInfo, SemanticType};
use crate::error::{Error, Result};

/// Encode one attribute value as a literal for its declared column.
pub fn encode(column: &ColumnInfo, value: &AttrValue) -> Result<String> {
    if column.is_array {
        return encode_array(column, value);
    }
    match column.semantic {
        SemanticType::Json => Ok(encode_json(value)),
        SemanticType::Integer | SemanticType::Decimal => Ok(encode_numeric(value)),
        SemanticType::Boolean => Ok(encode_boolean(value)),
        SemanticType::Enum => Ok(encode_enum(value)),
        SemanticType::Uuid | SemanticType::DateTime | SemanticType::Text => Ok(encode_text(value)),
    }
}

/// `'...'` with embedded single quotes doubled.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn encode_text(value: &AttrValue) -> String {
    match value {
        AttrValue::Null => "NULL".to_string(),
        other => quote(&other.as_display_string()),
    }
}

fn encode_numeric(value: &AttrValue) -> String {
    match value {
        AttrValue::Null => "NULL".to_string(),
        AttrValue::Int(n) => n.to_string(),
        AttrValue::Float(x) => x.to_string(),
        AttrValue::Bool(b) => b.to_string(),
        // Numeric column with a stringly value: trust the adapter's raw form.
        other => other.as_display_string(),
    }
}

fn encode_boolean(value: &AttrValue) -> String {
    match value {
        AttrValue::Null => "NULL".to_string(),
        AttrValue::Bool(b) => b.to_string(),
        other => other.as_display_string(),
    }
}

/// Enumerated columns store the underlying raw representation, not the
/// display label: numeric goes bare, anything else is quoted.
fn encode_enum(value: &AttrValue) -> String {
    match value {
        AttrValue::Null => "NULL".to_string(),
        AttrValue::Int(n) => n.to_string(),
        AttrValue::Float(x) => x.to_string(),
        other => quote(&other.as_display_string()),
    }
}

/// JSON columns render null/blank as `'{}'` so the target column type stays
/// valid, and canonicalize everything else to a JSON text form.
fn encode_json(value: &AttrValue) -> String {
    match value {
        AttrValue::Null => "'{}'".to_string(),
        AttrValue::Json(v) if v.is_null() => "'{}'".to_string(),
        AttrValue::Json(v) => quote(&v.to_string()),
        AttrValue::Text(s) if s.trim().is_empty() => "'{}'".to_string(),
        AttrValue::Text(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(v) => quote(&v.to_string()),
            // Not JSON text: canonicalize to a JSON string literal.
            Err(_) => quote(&serde_json::Value::String(s.clone()).to_string()),
        },
        other => quote(&other.as_display_string()),
    }
}

fn encode_array(column: &ColumnInfo, value: &AttrValue) -> Result<String> {
    let empty = format!("'{{}}'::{}[]", column.element_type());

    let elements: Vec<AttrValue> = match value {
        AttrValue::Null => return Ok(empty),
        AttrValue::List(items) => items.clone(),
        AttrValue::Json(serde_json::Value::Array(items)) => {
            items.iter().map(json_to_attr).collect()
        }
        AttrValue::Json(serde_json::Value::Null) => return Ok(empty),
        AttrValue::Text(s) if s.trim().is_empty() => return Ok(empty),
        AttrValue::Text(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(serde_json::Value::Array(items)) => items.iter().map(json_to_attr).collect(),
            _ => {
                return Err(Error::Encode {
                    column: column.name.clone(),
                    reason: format!("array input is neither a list nor JSON array text: {}", s),
                })
            }
        },
        other => {
            return Err(Error::Encode {
                column: column.name.clone(),
                reason: format!("array input is neither a list nor JSON array text: {:?}", other),
            })
        }
    };

    if elements.is_empty() {
        return Ok(empty);
    }

    // Element rule: numbers bare, null as NULL, everything else quoted.
    let rendered: Vec<String> = elements
        .iter()
        .map(|e| match e {
            AttrValue::Null => "NULL".to_string(),
            AttrValue::Int(n) => n.to_string(),
            AttrValue::Float(x) => x.to_string(),
            other => quote(&other.as_display_string()),
        })
        .collect();

    Ok(format!(
        "ARRAY[{}]::{}[]",
        rendered.join(","),
        column.element_type()
    ))
}

fn json_to_attr(value: &serde_json::Value) -> AttrValue {
    match value {
        serde_json::Value::Null => AttrValue::Null,
        serde_json::Value::Bool(b) => AttrValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttrValue::Int(i)
            } else {
                AttrValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => AttrValue::Text(s.clone()),
        other => AttrValue::Json(other.clone()),
    }
}
