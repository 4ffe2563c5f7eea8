//! Schema-driven attribute normalization.
//!
//! Manifest-declared attributes are defaulted, validated, and type-coerced
//! through one function rather than per-attribute bespoke branches (design
//! note §9: "extensibility is the point"). Both the Persona Registry (C2)
//! and the Authorization Engine's resource-attribute enrichment (C4 step 4)
//! are built on this.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::FlowPilotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeSource {
    Persona,
    Resource,
}

/// One manifest-declared attribute: `{name, type, source, default?, required?, description?}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: AttributeType,
    pub source: AttributeSource,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub description: String,
}

impl AttributeSchema {
    /// `required` defaults to `(default is null)`, per spec §3.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(self.default.is_none())
    }
}

/// A type-coerced attribute value, ready to store or forward to the rule
/// engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl NormalizedValue {
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            NormalizedValue::String(s) => Value::String(s.clone()),
            NormalizedValue::Integer(i) => Value::from(*i),
            NormalizedValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            NormalizedValue::Boolean(b) => Value::Bool(*b),
            NormalizedValue::Date(d) => Value::String(d.to_string()),
        }
    }
}

/// Default → validate-required → coerce-type over `values` against `schema`,
/// restricted to entries whose `source` matches `source_tag`.
///
/// Returns one error for the first required-and-missing attribute
/// encountered (the caller maps this to `authz.missing_required_attributes`).
pub fn normalize(
    values: &BTreeMap<String, Value>,
    schema: &[AttributeSchema],
    source_tag: AttributeSource,
) -> Result<BTreeMap<String, NormalizedValue>, FlowPilotError> {
    let mut out = BTreeMap::new();
    for attr in schema.iter().filter(|a| a.source == source_tag) {
        let raw = match values.get(&attr.name) {
            Some(v) if !v.is_null() => Some(v.clone()),
            _ => attr.default.clone(),
        };

        let raw = match raw {
            Some(v) => v,
            None => {
                if attr.is_required() {
                    return Err(FlowPilotError::invalid_argument(
                        "authz.missing_required_attributes",
                        format!("missing required attribute '{}'", attr.name),
                    ));
                }
                continue;
            }
        };

        out.insert(attr.name.clone(), coerce(&attr.name, attr.type_, &raw)?);
    }
    Ok(out)
}

fn coerce(
    name: &str,
    type_: AttributeType,
    value: &Value,
) -> Result<NormalizedValue, FlowPilotError> {
    let bad_type = || {
        FlowPilotError::invalid_argument(
            "authz.missing_required_attributes",
            format!("attribute '{name}' does not match declared type {type_:?}"),
        )
    };

    match type_ {
        AttributeType::String => Ok(NormalizedValue::String(match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(bad_type()),
        })),
        AttributeType::Integer => {
            let i = match value {
                Value::Number(n) => n.as_i64().ok_or_else(bad_type)?,
                Value::String(s) => s.trim().parse::<i64>().map_err(|_| bad_type())?,
                _ => return Err(bad_type()),
            };
            Ok(NormalizedValue::Integer(i))
        }
        AttributeType::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64().ok_or_else(bad_type)?,
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| bad_type())?,
                _ => return Err(bad_type()),
            };
            Ok(NormalizedValue::Float(f))
        }
        AttributeType::Boolean => {
            let b = match value {
                Value::Bool(b) => *b,
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => true,
                    "false" | "0" | "no" => false,
                    _ => return Err(bad_type()),
                },
                Value::Number(n) => n.as_i64().map(|i| i != 0).ok_or_else(bad_type)?,
                _ => return Err(bad_type()),
            };
            Ok(NormalizedValue::Boolean(b))
        }
        AttributeType::Date => {
            let s = value.as_str().ok_or_else(bad_type)?;
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| bad_type())?;
            Ok(NormalizedValue::Date(date))
        }
        AttributeType::Email => {
            let s = value.as_str().ok_or_else(bad_type)?;
            if !is_plausible_email(s) {
                return Err(bad_type());
            }
            Ok(NormalizedValue::String(s.to_string()))
        }
    }
}

fn is_plausible_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !s.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<AttributeSchema> {
        vec![
            AttributeSchema {
                name: "consent".into(),
                type_: AttributeType::Boolean,
                source: AttributeSource::Persona,
                default: Some(json!(false)),
                required: None,
                description: String::new(),
            },
            AttributeSchema {
                name: "autobook_price".into(),
                type_: AttributeType::Integer,
                source: AttributeSource::Persona,
                default: None,
                required: Some(true),
                description: String::new(),
            },
            AttributeSchema {
                name: "departure_date".into(),
                type_: AttributeType::Date,
                source: AttributeSource::Resource,
                default: None,
                required: None,
                description: String::new(),
            },
        ]
    }

    #[test]
    fn defaults_fill_missing_optional_attribute() {
        let mut values = BTreeMap::new();
        values.insert("autobook_price".to_string(), json!(1500));
        let result = normalize(&values, &schema(), AttributeSource::Persona).unwrap();
        assert_eq!(
            result.get("consent"),
            Some(&NormalizedValue::Boolean(false))
        );
        assert_eq!(
            result.get("autobook_price"),
            Some(&NormalizedValue::Integer(1500))
        );
    }

    #[test]
    fn missing_required_attribute_is_rejected() {
        let values = BTreeMap::new();
        let err = normalize(&values, &schema(), AttributeSource::Persona).unwrap_err();
        assert_eq!(err.reason_code, "authz.missing_required_attributes");
    }

    #[test]
    fn resource_attributes_are_filtered_by_source() {
        let mut values = BTreeMap::new();
        values.insert("departure_date".to_string(), json!("2026-08-01"));
        let result = normalize(&values, &schema(), AttributeSource::Resource).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("departure_date"));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut values = BTreeMap::new();
        values.insert("autobook_price".to_string(), json!("not-a-number"));
        let err = normalize(&values, &schema(), AttributeSource::Persona).unwrap_err();
        assert_eq!(err.reason_code, "authz.missing_required_attributes");
    }
}
