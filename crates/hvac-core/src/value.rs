//! Parameter value normalization.
//!
//! Host parameters are stored as text, integer, real or element reference.
//! Equality checks and cross-pair copies both go through one string form:
//! [`ParamValue::normalized`]. Reals use the shortest representation that
//! parses back to the same `f64`, so a value copied across a pair and read
//! back normalizes to the identical string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::host::HostError;
use crate::ids::ElementId;

/// Native storage type of a host parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Text,
    Integer,
    Real,
    Element,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageType::Text => "text",
            StorageType::Integer => "integer",
            StorageType::Real => "real",
            StorageType::Element => "element",
        };
        f.write_str(name)
    }
}

/// A typed parameter value as the host stores it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Element(ElementId),
}

impl ParamValue {
    pub fn storage_type(&self) -> StorageType {
        match self {
            ParamValue::Text(_) => StorageType::Text,
            ParamValue::Integer(_) => StorageType::Integer,
            ParamValue::Real(_) => StorageType::Real,
            ParamValue::Element(_) => StorageType::Element,
        }
    }

    /// Comparable string form.
    pub fn normalized(&self) -> String {
        match self {
            ParamValue::Text(s) => s.clone(),
            ParamValue::Integer(i) => i.to_string(),
            ParamValue::Real(x) => format!("{x}"),
            ParamValue::Element(id) => id.0.to_string(),
        }
    }

    /// Numeric view, parsing text when it holds a number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            ParamValue::Real(x) => Some(*x),
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Text(s) => s.trim().parse().ok(),
            ParamValue::Element(_) => None,
        }
    }

    /// Yes/no parameters are integers; any non-zero value is on.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ParamValue::Integer(i) => Some(*i != 0),
            ParamValue::Real(x) => Some(*x != 0.0),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a normalized string into `target`'s native storage.
    pub fn from_normalized(
        name: &str,
        normalized: &str,
        target: StorageType,
    ) -> Result<Self, HostError> {
        let not_convertible = || HostError::NotConvertible {
            name: name.to_string(),
            value: normalized.to_string(),
            target: target.to_string(),
        };
        let trimmed = normalized.trim();

        match target {
            StorageType::Text => Ok(ParamValue::Text(normalized.to_string())),
            StorageType::Integer => {
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(ParamValue::Integer(i));
                }
                match trimmed.parse::<f64>() {
                    Ok(x) if x.is_finite() && x.fract() == 0.0 => Ok(ParamValue::Integer(x as i64)),
                    _ => Err(not_convertible()),
                }
            }
            StorageType::Real => trimmed
                .parse::<f64>()
                .ok()
                .filter(|x| x.is_finite())
                .map(ParamValue::Real)
                .ok_or_else(not_convertible),
            StorageType::Element => trimmed
                .parse::<i64>()
                .map(|i| ParamValue::Element(ElementId(i)))
                .map_err(|_| not_convertible()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_normalization_drops_trailing_zero() {
        assert_eq!(ParamValue::Real(40.0).normalized(), "40");
        assert_eq!(ParamValue::Integer(40).normalized(), "40");
        assert_eq!(ParamValue::Real(12.5).normalized(), "12.5");
    }

    #[test]
    fn test_real_roundtrip_is_stable() {
        let x = 100.0 / 3.0;
        let text = ParamValue::Real(x).normalized();
        let back = ParamValue::from_normalized("Flow", &text, StorageType::Real).unwrap();
        assert_eq!(back, ParamValue::Real(x));
        assert_eq!(back.normalized(), text);
    }

    #[test]
    fn test_integer_accepts_whole_reals() {
        let v = ParamValue::from_normalized("Count", "3.0", StorageType::Integer).unwrap();
        assert_eq!(v, ParamValue::Integer(3));
    }

    #[test]
    fn test_integer_rejects_fractions() {
        let err = ParamValue::from_normalized("Count", "3.5", StorageType::Integer).unwrap_err();
        assert!(matches!(err, HostError::NotConvertible { .. }));
    }

    #[test]
    fn test_real_rejects_text() {
        assert!(ParamValue::from_normalized("Flow", "lots", StorageType::Real).is_err());
        assert!(ParamValue::from_normalized("Flow", "", StorageType::Real).is_err());
    }

    #[test]
    fn test_text_kept_verbatim() {
        let v = ParamValue::from_normalized("Name", " Office ", StorageType::Text).unwrap();
        assert_eq!(v, ParamValue::Text(" Office ".to_string()));
    }

    #[test]
    fn test_element_reference() {
        let v = ParamValue::from_normalized("Level", "311", StorageType::Element).unwrap();
        assert_eq!(v, ParamValue::Element(ElementId(311)));
        assert_eq!(v.normalized(), "311");
    }

    #[test]
    fn test_flags() {
        assert_eq!(ParamValue::Integer(0).as_flag(), Some(false));
        assert_eq!(ParamValue::Integer(1).as_flag(), Some(true));
        assert_eq!(ParamValue::Text("1".into()).as_flag(), None);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&ParamValue::Real(2.5)).unwrap();
        assert_eq!(json, r#"{"real":2.5}"#);
        let back: ParamValue = serde_json::from_str(r#"{"text":"101"}"#).unwrap();
        assert_eq!(back, ParamValue::Text("101".into()));
    }
}
