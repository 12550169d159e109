//! Watchable values and kinds
//!
//! A [`Value`] is the tagged payload held by a watchable. A [`Kind`] is the
//! declared type of a watchable together with its constraints; every write
//! goes through [`Kind::validate`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The current value of a watchable
///
/// Serializes as a bare JSON scalar. Choice values are carried as `Text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for Value {
    /// Equality used for change detection: NaN equals NaN
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Name of the variant, used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

fn default_true() -> bool {
    true
}

/// Declared kind of a watchable and its constraints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Kind {
    /// Whole numbers, optionally bounded
    Int {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
        /// Clamp out-of-range values instead of rejecting them
        #[serde(default)]
        clamp: bool,
    },
    /// Floating point numbers, optionally bounded
    Float {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        clamp: bool,
        #[serde(default = "default_true")]
        allow_nan: bool,
    },
    /// Free text
    Text,
    /// true / false
    Bool,
    /// One of a fixed list of strings
    Choice {
        options: Vec<String>,
        /// Stepping past either end wraps around
        #[serde(default = "default_true")]
        wrap: bool,
        /// Stepping past either end stops at the end (when not wrapping)
        #[serde(default)]
        clamp: bool,
    },
}

impl Kind {
    /// Unbounded integer
    pub fn int() -> Self {
        Kind::Int {
            min: None,
            max: None,
            clamp: false,
        }
    }

    /// Integer limited to `min..=max`
    pub fn int_range(min: i64, max: i64) -> Self {
        Kind::Int {
            min: Some(min),
            max: Some(max),
            clamp: false,
        }
    }

    /// Unbounded float, NaN allowed
    pub fn float() -> Self {
        Kind::Float {
            min: None,
            max: None,
            clamp: false,
            allow_nan: true,
        }
    }

    /// Choice between `options`, wrapping when stepped
    pub fn choice<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Kind::Choice {
            options: options.into_iter().map(Into::into).collect(),
            wrap: true,
            clamp: false,
        }
    }

    /// Builder method: clamp instead of reject (int, float and choice)
    pub fn clamped(mut self) -> Self {
        match &mut self {
            Kind::Int { clamp, .. } | Kind::Float { clamp, .. } => *clamp = true,
            Kind::Choice { clamp, wrap, .. } => {
                *clamp = true;
                *wrap = false;
            }
            Kind::Text | Kind::Bool => {}
        }
        self
    }

    /// Short name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Int { .. } => "int",
            Kind::Float { .. } => "float",
            Kind::Text => "text",
            Kind::Bool => "bool",
            Kind::Choice { .. } => "choice",
        }
    }

    /// Check that the constraints themselves make sense
    pub fn check_definition(&self) -> Result<(), String> {
        match self {
            Kind::Int {
                min: Some(lo),
                max: Some(hi),
                ..
            } if lo > hi => Err(format!("minimum {} is above maximum {}", lo, hi)),
            Kind::Float {
                min: Some(lo),
                max: Some(hi),
                ..
            } if lo > hi => Err(format!("minimum {} is above maximum {}", lo, hi)),
            Kind::Choice { options, .. } if options.is_empty() => {
                Err("a choice needs at least one option".to_string())
            }
            Kind::Choice { options, .. } => {
                for (ix, opt) in options.iter().enumerate() {
                    if options[..ix].contains(opt) {
                        return Err(format!("duplicate option '{}'", opt));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Value used when a watchable is registered without one
    pub fn default_value(&self) -> Value {
        match self {
            Kind::Int { min, max, .. } => {
                Value::Int(0i64.max(min.unwrap_or(0)).min(max.unwrap_or(i64::MAX)))
            }
            Kind::Float { min, max, .. } => {
                Value::Float(0f64.max(min.unwrap_or(0.0)).min(max.unwrap_or(f64::MAX)))
            }
            Kind::Text => Value::Text(String::new()),
            Kind::Bool => Value::Bool(false),
            Kind::Choice { options, .. } => {
                Value::Text(options.first().cloned().unwrap_or_default())
            }
        }
    }

    /// Validate a value and return the canonical value to store
    ///
    /// A value of the wrong variant is rejected, except that integers are
    /// accepted for float kinds. Returns the rejection reason on failure.
    pub fn validate(&self, value: Value) -> Result<Value, String> {
        match self {
            Kind::Int { min, max, clamp } => {
                let v = value
                    .as_int()
                    .ok_or_else(|| wrong_type("int", &value))?;
                if let Some(lo) = min {
                    if v < *lo {
                        return if *clamp {
                            Ok(Value::Int(*lo))
                        } else {
                            Err(format!("{} is below minimum {}", v, lo))
                        };
                    }
                }
                if let Some(hi) = max {
                    if v > *hi {
                        return if *clamp {
                            Ok(Value::Int(*hi))
                        } else {
                            Err(format!("{} is above maximum {}", v, hi))
                        };
                    }
                }
                Ok(Value::Int(v))
            }
            Kind::Float {
                min,
                max,
                clamp,
                allow_nan,
            } => {
                let v = value
                    .as_float()
                    .ok_or_else(|| wrong_type("float", &value))?;
                if v.is_nan() {
                    return if *allow_nan {
                        Ok(Value::Float(v))
                    } else {
                        Err("NaN is not allowed".to_string())
                    };
                }
                if let Some(lo) = min {
                    if v < *lo {
                        return if *clamp {
                            Ok(Value::Float(*lo))
                        } else {
                            Err(format!("{} is below minimum {}", v, lo))
                        };
                    }
                }
                if let Some(hi) = max {
                    if v > *hi {
                        return if *clamp {
                            Ok(Value::Float(*hi))
                        } else {
                            Err(format!("{} is above maximum {}", v, hi))
                        };
                    }
                }
                Ok(Value::Float(v))
            }
            Kind::Text => match value {
                Value::Text(_) => Ok(value),
                other => Err(wrong_type("text", &other)),
            },
            Kind::Bool => match value {
                Value::Bool(_) => Ok(value),
                other => Err(wrong_type("bool", &other)),
            },
            Kind::Choice { options, .. } => match value {
                Value::Text(s) => {
                    if options.iter().any(|o| *o == s) {
                        Ok(Value::Text(s))
                    } else {
                        Err(format!("'{}' is not one of {:?}", s, options))
                    }
                }
                other => Err(wrong_type("choice", &other)),
            },
        }
    }

    /// Convert text (e.g. a query string value) into a value of this kind
    ///
    /// Only converts; constraints are checked by [`Kind::validate`].
    pub fn parse(&self, text: &str) -> Result<Value, String> {
        let trimmed = text.trim();
        match self {
            Kind::Int { .. } => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{}' is not an integer", text)),
            Kind::Float { .. } => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("'{}' is not a number", text)),
            Kind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "off" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", text)),
            },
            Kind::Text | Kind::Choice { .. } => Ok(Value::Text(text.to_string())),
        }
    }
}

fn wrong_type(expected: &str, found: &Value) -> String {
    format!("expected {} value, got {}", expected, found.type_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_bounds() {
        let kind = Kind::int_range(0, 10);
        assert_eq!(kind.validate(Value::Int(5)), Ok(Value::Int(5)));
        assert!(kind.validate(Value::Int(11)).is_err());
        assert!(kind.validate(Value::Int(-1)).is_err());

        let kind = Kind::int_range(0, 10).clamped();
        assert_eq!(kind.validate(Value::Int(11)), Ok(Value::Int(10)));
        assert_eq!(kind.validate(Value::Int(-4)), Ok(Value::Int(0)));
    }

    #[test]
    fn test_wrong_variant_rejected() {
        assert!(Kind::int().validate(Value::Text("3".into())).is_err());
        assert!(Kind::int().validate(Value::Float(3.0)).is_err());
        assert!(Kind::Bool.validate(Value::Int(1)).is_err());
        assert!(Kind::Text.validate(Value::Bool(true)).is_err());
    }

    #[test]
    fn test_float_accepts_int_and_nan_policy() {
        assert_eq!(Kind::float().validate(Value::Int(2)), Ok(Value::Float(2.0)));
        assert!(Kind::float().validate(Value::Float(f64::NAN)).is_ok());

        let strict = Kind::Float {
            min: Some(0.0),
            max: Some(1.0),
            clamp: false,
            allow_nan: false,
        };
        assert!(strict.validate(Value::Float(f64::NAN)).is_err());
        assert!(strict.validate(Value::Float(1.5)).is_err());
    }

    #[test]
    fn test_choice() {
        let kind = Kind::choice(["low", "mid", "high"]);
        assert_eq!(kind.validate(Value::from("mid")), Ok(Value::from("mid")));
        assert!(kind.validate(Value::from("max")).is_err());
        assert_eq!(kind.default_value(), Value::from("low"));
    }

    #[test]
    fn test_nan_equality() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_parse_text_input() {
        assert_eq!(Kind::int().parse(" 42 "), Ok(Value::Int(42)));
        assert!(Kind::int().parse("4.2").is_err());
        assert_eq!(Kind::Bool.parse("on"), Ok(Value::Bool(true)));
        assert_eq!(Kind::Bool.parse("0"), Ok(Value::Bool(false)));
        assert_eq!(Kind::float().parse("0.5"), Ok(Value::Float(0.5)));
    }

    #[test]
    fn test_check_definition() {
        assert!(Kind::int_range(5, 1).check_definition().is_err());
        assert!(Kind::choice(Vec::<String>::new()).check_definition().is_err());
        assert!(Kind::choice(["a", "a"]).check_definition().is_err());
        assert!(Kind::choice(["a", "b"]).check_definition().is_ok());
    }

    #[test]
    fn test_default_value_respects_bounds() {
        assert_eq!(Kind::int_range(3, 9).default_value(), Value::Int(3));
        assert_eq!(Kind::int_range(-9, -3).default_value(), Value::Int(-3));
        assert_eq!(Kind::Text.default_value(), Value::Text(String::new()));
    }

    #[test]
    fn test_kind_deserialize() {
        let kind: Kind = serde_json::from_str(r#"{"kind":"int","min":0,"max":5}"#).unwrap();
        assert_eq!(kind, Kind::int_range(0, 5));

        let kind: Kind =
            serde_json::from_str(r#"{"kind":"choice","options":["a","b"]}"#).unwrap();
        assert_eq!(kind, Kind::choice(["a", "b"]));
    }

    #[test]
    fn test_value_json_shape() {
        assert_eq!(serde_json::to_string(&Value::Int(3)).unwrap(), "3");
        assert_eq!(serde_json::to_string(&Value::from("x")).unwrap(), "\"x\"");
        let v: Value = serde_json::from_str("1.5").unwrap();
        assert_eq!(v, Value::Float(1.5));
        let v: Value = serde_json::from_str("7").unwrap();
        assert_eq!(v, Value::Int(7));
    }
}
