//! Script value representation
//!
//! `ScriptValue` is the engine-agnostic value that crosses the bridge.
//! Primitives are carried inline; objects are referenced by an `ObjectId`
//! that only has meaning inside the engine that allocated it.

use std::fmt;
use std::rc::Rc;

/// Identifier of an object living in a script engine heap
///
/// Ids are allocated monotonically by the engine and never reused, so a
/// stale id simply fails to resolve instead of aliasing a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value as seen from native code
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectId),
}

impl ScriptValue {
    /// Create an undefined value
    #[inline]
    pub const fn undefined() -> Self {
        ScriptValue::Undefined
    }

    /// Create a null value
    #[inline]
    pub const fn null() -> Self {
        ScriptValue::Null
    }

    /// Create a boolean value
    #[inline]
    pub const fn bool(b: bool) -> Self {
        ScriptValue::Bool(b)
    }

    /// Create a number value
    #[inline]
    pub const fn number(n: f64) -> Self {
        ScriptValue::Number(n)
    }

    /// Create a string value
    pub fn string(s: &str) -> Self {
        ScriptValue::String(Rc::from(s))
    }

    /// Create an object reference
    #[inline]
    pub const fn object(id: ObjectId) -> Self {
        ScriptValue::Object(id)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ScriptValue::Null)
    }

    /// `null` or `undefined`
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    /// Get the object id if this is an object
    #[inline]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            ScriptValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the string contents if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the number if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Truthiness following the usual script conversion rules
    pub fn is_truthy(&self) -> bool {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ScriptValue::String(s) => !s.is_empty(),
            ScriptValue::Object(_) => true,
        }
    }

    /// Numeric conversion; objects convert to NaN
    pub fn to_number(&self) -> f64 {
        match self {
            ScriptValue::Undefined => f64::NAN,
            ScriptValue::Null => 0.0,
            ScriptValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            ScriptValue::Number(n) => *n,
            ScriptValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            ScriptValue::Object(_) => f64::NAN,
        }
    }

    /// Strict equality (`===`)
    pub fn strict_equals(&self, other: &ScriptValue) -> bool {
        match (self, other) {
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            _ => self == other,
        }
    }

    /// Name of the value's type as reported by `typeof`
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "object",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Object(_) => "object",
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::string(s)
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(Rc::from(s))
    }
}

impl From<ObjectId> for ScriptValue {
    fn from(id: ObjectId) -> Self {
        ScriptValue::Object(id)
    }
}

/// Format a number the way scripts print it
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "undefined"),
            ScriptValue::Null => write!(f, "null"),
            ScriptValue::Bool(b) => write!(f, "{}", b),
            ScriptValue::Number(n) => write!(f, "{}", format_number(*n)),
            ScriptValue::String(s) => write!(f, "{}", s),
            ScriptValue::Object(id) => write!(f, "[object {}]", id),
        }
    }
}
