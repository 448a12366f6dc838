//! Predicate filters for `EventStore::filter`
//!
//! A [`Query`] maps field names to a single [`Predicate`] each. The synthetic
//! field `timestamp` is resolved from the index instead of a column file.
//! An event matches when every predicate holds.
//!
//! An empty query matches nothing. Callers wanting every event must say so
//! with an explicit predicate such as `timestamp >= 0`.

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal to
    Eq,
    /// Less than
    Lt,
    /// Less than or equal to
    Lte,
    /// Greater than
    Gt,
    /// Greater than or equal to
    Gte,
}

impl Operator {
    /// Parse from its symbol
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    /// Whether `value <op> operand` holds given `value.cmp(operand)`
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One `(operator, operand)` condition on a field
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub op: Operator,
    pub operand: Value,
}

impl Predicate {
    pub fn new(op: Operator, operand: impl Into<Value>) -> Self {
        Self {
            op,
            operand: operand.into(),
        }
    }

    /// Evaluate against an event's value for `field`.
    ///
    /// Comparing text against a number (or a boolean against anything but a
    /// boolean) is a `TypeMismatch`. NaN never matches.
    pub fn matches(&self, field: &str, value: &Value) -> StoreResult<bool> {
        if !value.is_comparable_with(&self.operand) {
            return Err(StoreError::TypeMismatch {
                field: field.to_string(),
                established: value.kind(),
                attempted: self.operand.kind(),
            });
        }
        Ok(value
            .compare(&self.operand)
            .map_or(false, |ordering| self.op.accepts(ordering)))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Value::Text(text) => write!(f, "{} '{}'", self.op, text),
            other => write!(f, "{} {}", self.op, other),
        }
    }
}

/// Field name to predicate; all must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: BTreeMap<String, Predicate>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add or replace the predicate on `field`
    pub fn filter(mut self, field: impl Into<String>, op: Operator, operand: impl Into<Value>) -> Self {
        self.insert(field, Predicate::new(op, operand));
        self
    }

    /// Set the predicate on `field`, returning the one it replaced
    pub fn insert(&mut self, field: impl Into<String>, predicate: Predicate) -> Option<Predicate> {
        self.filters.insert(field.into(), predicate)
    }

    pub fn get(&self, field: &str) -> Option<&Predicate> {
        self.filters.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> + '_ {
        self.filters.iter().map(|(field, p)| (field.as_str(), p))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, predicate)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{} {}", field, predicate)?;
        }
        Ok(())
    }
}
