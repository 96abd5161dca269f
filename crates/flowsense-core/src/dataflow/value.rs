//! Abstract values and storage locations

use super::formula::Formula;
use crate::ast::Type;
use std::fmt;

/// Opaque identity of an addressable memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageLocation(pub u32);

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc{}", self.0)
    }
}

/// Identity of an integer the analysis knows nothing about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntValue {
    Known(i64),
    Symbolic(Symbol),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(Formula),
    Int(IntValue),
    Pointer(StorageLocation),
}

impl Value {
    pub fn known_int(value: i64) -> Value {
        Value::Int(IntValue::Known(value))
    }

    pub fn as_bool(&self) -> Option<&Formula> {
        match self {
            Value::Bool(formula) => Some(formula),
            _ => None,
        }
    }

    /// The concrete integer, if the analysis has pinned one down
    pub fn as_known_int(&self) -> Option<i64> {
        match self {
            Value::Int(IntValue::Known(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<StorageLocation> {
        match self {
            Value::Pointer(loc) => Some(*loc),
            _ => None,
        }
    }

    /// Whether this value may legally be recorded for an entity of type `ty`
    pub fn is_compatible_with(&self, ty: &Type) -> bool {
        matches!(
            (self, ty),
            (Value::Bool(_), Type::Bool) | (Value::Int(_), Type::Int) | (Value::Pointer(_), Type::Pointer(_))
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(formula) => write!(f, "{formula}"),
            Value::Int(IntValue::Known(value)) => write!(f, "{value}"),
            Value::Int(IntValue::Symbolic(symbol)) => write!(f, "s{}", symbol.0),
            Value::Pointer(loc) => write!(f, "&{loc}"),
        }
    }
}
