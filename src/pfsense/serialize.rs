//! Encoding of option values as pfSsh (PHP) literal expressions.

use crate::pfsense::generic::OptionKind;
use crate::utils::error::AgentError;
use crate::utils::tools::describe;
use serde_json::Value;

/// A typed option value as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Scalar(String),
    List(Vec<String>),
}

impl OptionValue {
    /// Accepts a string or a list of strings; anything else is described for the error message.
    pub fn from_json(value: &Value) -> Result<OptionValue, String> {
        match value {
            Value::String(s) => Ok(OptionValue::Scalar(s.to_owned())),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.to_owned()),
                    other => Err(format!("list containing {}", describe(other))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(OptionValue::List),
            other => Err(describe(other).to_owned()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Scalar(_) => "string",
            OptionValue::List(_) => "list",
        }
    }
}

/// How a list is written out. NTP servers live in a single space separated string,
/// DNS servers in a real array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEncoding {
    Array,
    SpaceJoined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    List(ListEncoding),
}

impl Shape {
    pub fn describe(self) -> &'static str {
        match self {
            Shape::Scalar => "a string",
            Shape::List(_) => "a list of strings",
        }
    }
}

/// A literal expression that is safe to splice into a session script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedValue(String);

impl SerializedValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Single quoted literal. Backslash and quote are escaped, control characters refused
/// since the console reads its input one line at a time.
pub fn quote(raw: &str) -> Result<String, AgentError> {
    if let Some(c) = raw.chars().find(|c| c.is_control()) {
        return Err(AgentError::Validation(format!(
            "value {:?} contains control character {:?}",
            raw, c
        )));
    }
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    Ok(out)
}

pub fn serialize(kind: OptionKind, value: &OptionValue) -> Result<SerializedValue, AgentError> {
    let shape = kind.shape();
    match (shape, value) {
        (Shape::Scalar, OptionValue::Scalar(s)) => Ok(SerializedValue(quote(s)?)),
        (Shape::List(encoding), OptionValue::List(items)) => {
            if items.is_empty() {
                return Err(AgentError::Validation(format!(
                    "list for {} must not be empty",
                    kind.name()
                )));
            }
            match encoding {
                ListEncoding::Array => {
                    let quoted = items
                        .iter()
                        .map(|item| quote(item))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(SerializedValue(format!("array({})", quoted.join(","))))
                }
                ListEncoding::SpaceJoined => {
                    if let Some(bad) = items
                        .iter()
                        .find(|item| item.is_empty() || item.contains(char::is_whitespace))
                    {
                        return Err(AgentError::Validation(format!(
                            "{} entry {:?} must be non-empty and free of whitespace",
                            kind.name(),
                            bad
                        )));
                    }
                    Ok(SerializedValue(quote(&items.join(" "))?))
                }
            }
        }
        (shape, value) => Err(AgentError::TypeMismatch {
            option: kind.name(),
            expected: shape.describe(),
            observed: value.type_name().to_owned(),
        }),
    }
}
