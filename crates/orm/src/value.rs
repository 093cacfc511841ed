//! Scalar values exchanged between entities, predicates and backends.
//!
//! [`FieldValue`] maps each supported Rust field type onto a [`Value`] and
//! back, rejecting stored values that do not fit the field.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};

/// A scalar value flowing between entities, predicates and backends.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value (SQL `NULL`, Rust `None`).
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer-like value, including enum discriminants.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Text(String),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::DateTime(_) => "datetime",
        }
    }

    /// Borrow the text payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values of compatible kinds. Integers and floats compare
    /// numerically; nulls are only comparable to each other.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::DateTime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
        }
    }
}

/// Canonical text form for stored date/time values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::DateTime(v.and_time(chrono::NaiveTime::MIN))
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Semantic type of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    /// `bool`
    Bool,
    /// Integer-like numbers.
    Integer,
    /// Enumerations persisted as their integer discriminant.
    Enum,
    /// Floating point numbers.
    Float,
    /// Text.
    Text,
    /// Date and/or time.
    DateTime,
}

impl ScalarType {
    /// Integer-like types produce generated keys by default.
    #[must_use]
    pub const fn is_integer_like(self) -> bool {
        matches!(self, Self::Integer)
    }
}

/// Semantic type plus nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    /// Underlying scalar type.
    pub scalar: ScalarType,
    /// Whether the field accepts `NULL`.
    pub nullable: bool,
}

impl FieldType {
    /// Non-nullable field of the given scalar type.
    #[must_use]
    pub const fn required(scalar: ScalarType) -> Self {
        Self { scalar, nullable: false }
    }
}

/// Trait for Rust types that can be stored in an entity field.
///
/// This trait is implemented for the standard scalar types (`i32`, `String`,
/// `NaiveDateTime`, etc.), for `Option<T>` and for enums declared with
/// [`int_enum!`](crate::int_enum).
pub trait FieldValue: Sized {
    /// Semantic type reported in the entity's field descriptors.
    const TYPE: FieldType;

    /// Convert the field into a [`Value`].
    fn to_value(&self) -> Value;

    /// Convert a stored value back into the field type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Materialization`] if the value does not fit the type.
    fn from_value(field: &str, value: Value) -> Result<Self>;
}

fn mismatch<T>(field: &str, value: Value) -> Result<T> {
    Err(Error::Materialization { field: field.to_string(), value })
}

impl FieldValue for bool {
    const TYPE: FieldType = FieldType::required(ScalarType::Bool);

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            // stores without a native boolean persist 0/1
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            other => mismatch(field, other),
        }
    }
}

impl FieldValue for i32 {
    const TYPE: FieldType = FieldType::required(ScalarType::Integer);

    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }

    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => Self::try_from(v).or_else(|_| mismatch(field, Value::Int(v))),
            other => mismatch(field, other),
        }
    }
}

impl FieldValue for i64 {
    const TYPE: FieldType = FieldType::required(ScalarType::Integer);

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(v),
            other => mismatch(field, other),
        }
    }
}

impl FieldValue for u32 {
    const TYPE: FieldType = FieldType::required(ScalarType::Integer);

    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }

    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => Self::try_from(v).or_else(|_| mismatch(field, Value::Int(v))),
            other => mismatch(field, other),
        }
    }
}

impl FieldValue for f64 {
    const TYPE: FieldType = FieldType::required(ScalarType::Float);

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as Self),
            other => mismatch(field, other),
        }
    }
}

impl FieldValue for String {
    const TYPE: FieldType = FieldType::required(ScalarType::Text);

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v),
            other => mismatch(field, other),
        }
    }
}

impl FieldValue for NaiveDateTime {
    const TYPE: FieldType = FieldType::required(ScalarType::DateTime);

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::DateTime(v) => Ok(v),
            // stores without a native date type persist text
            Value::Text(raw) => match parse_datetime(&raw) {
                Some(v) => Ok(v),
                None => mismatch(field, Value::Text(raw)),
            },
            other => mismatch(field, other),
        }
    }
}

impl FieldValue for NaiveDate {
    const TYPE: FieldType = FieldType::required(ScalarType::DateTime);

    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(field: &str, value: Value) -> Result<Self> {
        NaiveDateTime::from_value(field, value).map(|v| v.date())
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const TYPE: FieldType = FieldType { scalar: T::TYPE.scalar, nullable: true };

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, FieldValue::to_value)
    }

    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(field, other).map(Some),
        }
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
}

/// Declares an enum persisted as its integer discriminant.
///
/// # Examples
///
/// ```ignore
/// int_enum! {
///     #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
///     pub enum DocumentType {
///         #[default]
///         Ssn = 1,
///         Tin = 2,
///     }
/// }
/// ```
#[macro_export]
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident = $disc:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        pub enum $name {
            $(
                $(#[$variant_meta])*
                $variant = $disc
            ),*
        }

        impl $crate::FieldValue for $name {
            const TYPE: $crate::FieldType =
                $crate::FieldType::required($crate::ScalarType::Enum);

            fn to_value(&self) -> $crate::Value {
                match self {
                    $( Self::$variant => $crate::Value::Int($disc), )*
                }
            }

            fn from_value(field: &str, value: $crate::Value) -> $crate::Result<Self> {
                match value {
                    $( $crate::Value::Int($disc) => Ok(Self::$variant), )*
                    other => Err($crate::Error::Materialization {
                        field: field.to_string(),
                        value: other,
                    }),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversions() {
        assert_eq!(i32::from_value("age", Value::Int(42)).unwrap(), 42);
        assert_eq!(i64::from_value("age", Value::Int(-7)).unwrap(), -7);

        let err = i32::from_value("age", Value::Int(i64::MAX)).unwrap_err();
        assert!(matches!(err, Error::Materialization { ref field, .. } if field == "age"));

        let err = i32::from_value("age", Value::Text("42".to_string())).unwrap_err();
        assert!(matches!(err, Error::Materialization { .. }));
    }

    #[test]
    fn bool_accepts_stored_integers() {
        assert!(bool::from_value("active", Value::Int(1)).unwrap());
        assert!(!bool::from_value("active", Value::Int(0)).unwrap());
        bool::from_value("active", Value::Int(2)).unwrap_err();
    }

    #[test]
    fn null_handling() {
        assert_eq!(Option::<String>::from_value("nick", Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value("nick", Value::Text("al".to_string())).unwrap(),
            Some("al".to_string())
        );
        assert_eq!(Option::<i32>::None.to_value(), Value::Null);

        // non-nullable fields have no null representation
        String::from_value("name", Value::Null).unwrap_err();
        assert!(Option::<i32>::TYPE.nullable);
        assert!(!i32::TYPE.nullable);
    }

    #[test]
    fn datetime_from_text() {
        let expected =
            NaiveDateTime::parse_from_str("2024-01-15 10:30:45", "%Y-%m-%d %H:%M:%S").unwrap();

        let parsed =
            NaiveDateTime::from_value("born", Value::Text("2024-01-15 10:30:45".to_string()))
                .unwrap();
        assert_eq!(parsed, expected);

        let parsed =
            NaiveDateTime::from_value("born", Value::Text("2024-01-15T10:30:45".to_string()))
                .unwrap();
        assert_eq!(parsed, expected);

        let err = NaiveDateTime::from_value("born", Value::Text("yesterday".to_string()));
        assert!(matches!(err, Err(Error::Materialization { .. })));
    }

    #[test]
    fn mixed_numeric_compare() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Float(3.0).compare(&Value::Int(3)), Some(Ordering::Equal));
        assert_eq!(Value::Int(1).compare(&Value::Text("1".to_string())), None);
    }

    int_enum! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Kind {
            Ssn = 1,
            Tin = 2,
        }
    }

    #[test]
    fn int_enum_round_trip() {
        assert_eq!(Kind::Tin.to_value(), Value::Int(2));
        assert_eq!(Kind::from_value("kind", Value::Int(1)).unwrap(), Kind::Ssn);
        Kind::from_value("kind", Value::Int(9)).unwrap_err();
        assert_eq!(Kind::TYPE.scalar, ScalarType::Enum);
    }
}
