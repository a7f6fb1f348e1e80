//! Element types and runtime values carried along graph edges.

use std::fmt;

use cf_core::Real;

/// Type of the value produced by one output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int64,
    Float64,
}

impl DataType {
    /// True for types arithmetic ops accept.
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// A scalar value, used for constants and by evaluators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(Real),
}

impl Value {
    pub fn dtype(&self) -> DataType {
        match self {
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
        }
    }

    /// The additive identity of `dtype` (`false` for booleans).
    pub fn zero(dtype: DataType) -> Self {
        Self::scalar(dtype, 0)
    }

    /// Convert an integer literal to `dtype`; non-zero means `true` for booleans.
    pub fn scalar(dtype: DataType, v: i64) -> Self {
        match dtype {
            DataType::Bool => Value::Bool(v != 0),
            DataType::Int64 => Value::Int(v),
            DataType::Float64 => Value::Float(v as Real),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<Real> {
        match *self {
            Value::Float(x) => Some(x),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Real> for Value {
    fn from(v: Real) -> Self {
        Value::Float(v)
    }
}
