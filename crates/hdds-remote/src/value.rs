// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process values exchanged with remote objects.
//!
//! [`Value`] is shared by both ends of a connection and only differs in what
//! the [`Value::Ref`] variant holds:
//! - server side: [`LocalValue`](crate::object::LocalValue) holds an [`ObjectRef`](crate::object::ObjectRef)
//! - client side: [`RemoteValue`](crate::client::RemoteValue) holds a [`Proxy`](crate::client::Proxy)
//!
//! Everything except `Ref` is copied when it crosses the wire.

use std::fmt;
use std::str::FromStr;

/// A value passed to, or returned from, a remote object.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<R> {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<Value<R>>),
    /// Ordered mapping. Keys may be any value.
    Map(Vec<(Value<R>, Value<R>)>),
    /// Live reference to a remote object.
    Ref(R),
}

impl<R> Value<R> {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Ref(_) => "ref",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value<R>]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value<R>, Value<R>)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&R> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_reference(self) -> Option<R> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Builds a byte-sequence value.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }
}

impl<R: PartialEq> Value<R> {
    /// Looks up `key` in a map value.
    pub fn map_get(&self, key: &Value<R>) -> Option<&Value<R>> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

impl<R> Default for Value<R> {
    fn default() -> Self {
        Self::None
    }
}

impl<R> From<()> for Value<R> {
    fn from(_: ()) -> Self {
        Self::None
    }
}

impl<R> From<bool> for Value<R> {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<R> From<i32> for Value<R> {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl<R> From<i64> for Value<R> {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl<R> From<u32> for Value<R> {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl<R> From<f64> for Value<R> {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl<R> From<&str> for Value<R> {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl<R> From<String> for Value<R> {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<R> From<&[u8]> for Value<R> {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl<R> From<Vec<Value<R>>> for Value<R> {
    fn from(items: Vec<Value<R>>) -> Self {
        Self::List(items)
    }
}

impl<R, T: Into<Value<R>>> From<Option<T>> for Value<R> {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::None, Into::into)
    }
}

/// Operator-like behavior forwarded to a remote object.
///
/// Travels as the `member` of a `BinaryOp` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }

    /// True for the ordering/equality operators, which yield a bool.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Applies the operator to two numbers.
    ///
    /// Integer operands stay integers (checked); any float operand promotes
    /// the operation to floats. Returns `None` for non-numeric operands,
    /// integer overflow and integer division by zero.
    pub fn apply_numeric<R>(&self, lhs: &Value<R>, rhs: &Value<R>) -> Option<Value<R>> {
        if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
            let (a, b) = (*a, *b);
            return match self {
                Self::Add => a.checked_add(b).map(Value::Int),
                Self::Sub => a.checked_sub(b).map(Value::Int),
                Self::Mul => a.checked_mul(b).map(Value::Int),
                Self::Div => a.checked_div(b).map(Value::Int),
                Self::Rem => a.checked_rem(b).map(Value::Int),
                Self::Eq => Some(Value::Bool(a == b)),
                Self::Ne => Some(Value::Bool(a != b)),
                Self::Lt => Some(Value::Bool(a < b)),
                Self::Le => Some(Value::Bool(a <= b)),
                Self::Gt => Some(Value::Bool(a > b)),
                Self::Ge => Some(Value::Bool(a >= b)),
            };
        }

        let a = lhs.as_float()?;
        let b = rhs.as_float()?;
        Some(match self {
            Self::Add => Value::Float(a + b),
            Self::Sub => Value::Float(a - b),
            Self::Mul => Value::Float(a * b),
            Self::Div => Value::Float(a / b),
            Self::Rem => Value::Float(a % b),
            Self::Eq => Value::Bool(a == b),
            Self::Ne => Value::Bool(a != b),
            Self::Lt => Value::Bool(a < b),
            Self::Le => Value::Bool(a <= b),
            Self::Gt => Value::Bool(a > b),
            Self::Ge => Value::Bool(a >= b),
        })
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinaryOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "add" => Self::Add,
            "sub" => Self::Sub,
            "mul" => Self::Mul,
            "div" => Self::Div,
            "rem" => Self::Rem,
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "lt" => Self::Lt,
            "le" => Self::Le,
            "gt" => Self::Gt,
            "ge" => Self::Ge,
            other => return Err(format!("unknown operator '{}'", other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type V = Value<()>;

    #[test]
    fn test_conversions() {
        assert_eq!(V::from(3), V::Int(3));
        assert_eq!(V::from("x"), V::Str("x".into()));
        assert_eq!(V::from(&b"ab"[..]), V::Bytes(vec![b'a', b'b']));
        assert_eq!(V::from(None::<i64>), V::None);
        assert_eq!(V::from(Some(1.5)), V::Float(1.5));
    }

    #[test]
    fn test_map_get() {
        let map = V::Map(vec![
            (V::from("key"), V::from("value")),
            (V::from(1), V::from(1.1)),
        ]);
        assert_eq!(map.map_get(&V::from(1)), Some(&V::Float(1.1)));
        assert_eq!(map.map_get(&V::from("missing")), None);
    }

    #[test]
    fn test_apply_numeric_int() {
        let r = BinaryOp::Add.apply_numeric(&V::Int(2), &V::Int(3));
        assert_eq!(r, Some(V::Int(5)));

        assert_eq!(BinaryOp::Div.apply_numeric(&V::Int(1), &V::Int(0)), None);
        assert_eq!(BinaryOp::Add.apply_numeric(&V::Int(i64::MAX), &V::Int(1)), None);
        assert_eq!(
            BinaryOp::Lt.apply_numeric(&V::Int(1), &V::Int(2)),
            Some(V::Bool(true))
        );
    }

    #[test]
    fn test_apply_numeric_promotes_to_float() {
        let r = BinaryOp::Mul.apply_numeric(&V::Int(2), &V::Float(1.5));
        assert_eq!(r, Some(V::Float(3.0)));
        assert_eq!(BinaryOp::Add.apply_numeric(&V::Int(1), &V::from("a")), None);
    }

    #[test]
    fn test_binary_op_parse() {
        for op in [BinaryOp::Add, BinaryOp::Rem, BinaryOp::Ge] {
            assert_eq!(op.as_str().parse::<BinaryOp>(), Ok(op));
        }
        assert!("pow".parse::<BinaryOp>().is_err());
        assert!(BinaryOp::Eq.is_comparison());
        assert!(!BinaryOp::Sub.is_comparison());
    }
}
