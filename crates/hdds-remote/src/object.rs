// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-side object model.
//!
//! A type becomes remotely usable by implementing [`RemoteObject`], the
//! per-type adapter that maps member names onto behavior. Every operation
//! has a default implementation reporting it as unsupported, so a type only
//! writes the members it actually has.
//!
//! Types that clients may construct also implement [`RemoteType`] and are
//! registered through a [`TypeDescriptor`].

use crate::value::{BinaryOp, Value};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Server-side value: references are live objects.
pub type LocalValue = Value<ObjectRef>;

/// Result type for object behavior.
pub type ObjectResult<T> = Result<T, ObjectError>;

/// Operations a type supports (bitmask).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u16);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const CALL: Self = Self(1 << 0);
    pub const GET_ATTR: Self = Self(1 << 1);
    pub const SET_ATTR: Self = Self(1 << 2);
    pub const GET_ITEM: Self = Self(1 << 3);
    pub const SET_ITEM: Self = Self(1 << 4);
    /// Length and membership tests.
    pub const CONTAINER: Self = Self(1 << 5);
    pub const ITERATE: Self = Self(1 << 6);
    pub const STRINGIFY: Self = Self(1 << 7);
    pub const ARITHMETIC: Self = Self(1 << 8);
    pub const ALL: Self = Self(0x01ff);

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Failure raised by an object's own behavior.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    /// The type does not implement this operation.
    #[error("operation '{0}' is not supported")]
    Unsupported(String),

    /// No method or attribute with this name.
    #[error("no member named '{0}'")]
    NoSuchMember(String),

    /// Error raised inside the object, tagged with a type name.
    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },
}

impl ObjectError {
    /// Raise an error tagged with `kind`.
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::raised("InvalidArgument", message)
    }

    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::raised(
            "IndexOutOfRange",
            format!("index {} out of range for length {}", index, len),
        )
    }

    pub fn key_not_found(key: &LocalValue) -> Self {
        Self::raised("KeyNotFound", format!("key not found: {}", describe(key)))
    }

    /// Type tag reported to the client.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Unsupported(_) => "Unsupported",
            Self::NoSuchMember(_) => "NoSuchMember",
            Self::Raised { kind, .. } => kind,
        }
    }
}

/// Positional and keyword arguments of a call or constructor.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<LocalValue>,
    pub keyword: BTreeMap<String, LocalValue>,
}

impl Args {
    pub fn new(positional: Vec<LocalValue>, keyword: BTreeMap<String, LocalValue>) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    pub fn positional(values: Vec<LocalValue>) -> Self {
        Self {
            positional: values,
            keyword: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Fails unless exactly `n` positional and no keyword arguments were given.
    pub fn expect_exact(&self, member: &str, n: usize) -> ObjectResult<()> {
        if self.positional.len() != n || !self.keyword.is_empty() {
            return Err(ObjectError::raised(
                "ArityMismatch",
                format!(
                    "{}() takes {} positional argument(s) but {} were given",
                    member,
                    n,
                    self.len()
                ),
            ));
        }
        Ok(())
    }

    /// Fails if more than `max` positional arguments were given.
    pub fn expect_at_most(&self, member: &str, max: usize) -> ObjectResult<()> {
        if self.positional.len() > max {
            return Err(ObjectError::raised(
                "ArityMismatch",
                format!(
                    "{}() takes at most {} positional argument(s) but {} were given",
                    member,
                    max,
                    self.positional.len()
                ),
            ));
        }
        Ok(())
    }

    /// Removes and returns a keyword argument.
    pub fn take_keyword(&mut self, name: &str) -> Option<LocalValue> {
        self.keyword.remove(name)
    }

    /// Fails if any keyword argument is left unconsumed.
    pub fn reject_keywords(&self, member: &str) -> ObjectResult<()> {
        match self.keyword.keys().next() {
            Some(name) => Err(ObjectError::invalid_argument(format!(
                "{}() got an unexpected keyword argument '{}'",
                member, name
            ))),
            None => Ok(()),
        }
    }

    /// Positional argument `index` as an integer.
    pub fn int(&self, member: &str, index: usize) -> ObjectResult<i64> {
        match self.positional.get(index) {
            Some(Value::Int(i)) => Ok(*i),
            Some(other) => Err(ObjectError::invalid_argument(format!(
                "{}() argument {} must be int, not {}",
                member,
                index,
                other.kind_name()
            ))),
            None => Err(ObjectError::raised(
                "ArityMismatch",
                format!("{}() missing argument {}", member, index),
            )),
        }
    }
}

/// Behavior of a remotely accessible object.
///
/// Implementations run with the object's own lock held, so `&mut self`
/// access is serialized across every connection sharing the object.
pub trait RemoteObject: Send + 'static {
    /// Registered type name.
    fn type_name(&self) -> &str;

    /// Operations this object supports.
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    /// Invoke a named method.
    fn call(&mut self, method: &str, args: Args) -> ObjectResult<LocalValue> {
        let _ = args;
        Err(ObjectError::NoSuchMember(method.to_string()))
    }

    /// Read a named attribute.
    fn get_attr(&self, name: &str) -> ObjectResult<LocalValue> {
        Err(ObjectError::NoSuchMember(name.to_string()))
    }

    /// Write a named attribute.
    fn set_attr(&mut self, name: &str, value: LocalValue) -> ObjectResult<()> {
        let _ = value;
        Err(ObjectError::NoSuchMember(name.to_string()))
    }

    fn get_item(&self, key: &LocalValue) -> ObjectResult<LocalValue> {
        let _ = key;
        Err(ObjectError::Unsupported("get_item".into()))
    }

    fn set_item(&mut self, key: LocalValue, value: LocalValue) -> ObjectResult<()> {
        let _ = (key, value);
        Err(ObjectError::Unsupported("set_item".into()))
    }

    fn del_item(&mut self, key: &LocalValue) -> ObjectResult<()> {
        let _ = key;
        Err(ObjectError::Unsupported("del_item".into()))
    }

    fn len(&self) -> ObjectResult<usize> {
        Err(ObjectError::Unsupported("len".into()))
    }

    fn contains(&self, item: &LocalValue) -> ObjectResult<bool> {
        let _ = item;
        Err(ObjectError::Unsupported("contains".into()))
    }

    /// Snapshot of the items, in iteration order.
    fn iterate(&self) -> ObjectResult<Vec<LocalValue>> {
        Err(ObjectError::Unsupported("iterate".into()))
    }

    /// Human-readable rendering.
    fn to_text(&self) -> ObjectResult<String> {
        Ok(format!("<{} object>", self.type_name()))
    }

    fn binary_op(&mut self, op: BinaryOp, rhs: LocalValue) -> ObjectResult<LocalValue> {
        let _ = rhs;
        Err(ObjectError::Unsupported(op.as_str().to_string()))
    }
}

/// A type clients can construct by name.
pub trait RemoteType: RemoteObject + Sized {
    const TYPE_NAME: &'static str;
    const CAPABILITIES: Capabilities;

    fn construct(args: Args) -> ObjectResult<Self>;
}

/// Shared handle to a live server object.
///
/// Equality follows object identity, not contents.
#[derive(Clone)]
pub struct ObjectRef(Arc<Mutex<Box<dyn RemoteObject>>>);

impl ObjectRef {
    pub fn new<T: RemoteObject>(object: T) -> Self {
        Self::from_boxed(Box::new(object))
    }

    pub fn from_boxed(object: Box<dyn RemoteObject>) -> Self {
        Self(Arc::new(Mutex::new(object)))
    }

    /// Lock the object for an operation.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn RemoteObject>> {
        self.0.lock()
    }

    /// Address-based identity, stable while any handle is alive.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // try_lock: Debug must not block on an object mid-call.
        match self.0.try_lock() {
            Some(obj) => write!(f, "ObjectRef({} @ {:#x})", obj.type_name(), self.identity()),
            None => write!(f, "ObjectRef(<locked> @ {:#x})", self.identity()),
        }
    }
}

type Constructor = Box<dyn Fn(Args) -> ObjectResult<Box<dyn RemoteObject>> + Send + Sync>;

/// A registered, constructible type.
pub struct TypeDescriptor {
    name: String,
    capabilities: Capabilities,
    constructor: Constructor,
}

impl TypeDescriptor {
    /// Descriptor from an explicit constructor.
    pub fn new<F>(name: impl Into<String>, capabilities: Capabilities, constructor: F) -> Self
    where
        F: Fn(Args) -> ObjectResult<Box<dyn RemoteObject>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            capabilities,
            constructor: Box::new(constructor),
        }
    }

    /// Descriptor for a [`RemoteType`].
    pub fn of<T: RemoteType>() -> Self {
        Self::new(T::TYPE_NAME, T::CAPABILITIES, |args| {
            T::construct(args).map(|obj| Box::new(obj) as Box<dyn RemoteObject>)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Build a new instance.
    pub fn construct(&self, args: Args) -> ObjectResult<Box<dyn RemoteObject>> {
        (self.constructor)(args)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Short rendering of a value for messages and `to_text` output.
pub fn describe(value: &LocalValue) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format!("{:?}", f),
        Value::Str(s) => format!("{:?}", s),
        Value::Bytes(b) => format!("b{:?}", String::from_utf8_lossy(b)),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(describe).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", describe(k), describe(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Ref(obj) => match obj.0.try_lock() {
            Some(inner) => inner
                .to_text()
                .unwrap_or_else(|_| format!("<{} object>", inner.type_name())),
            None => "<...>".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Point {
        x: i64,
    }

    impl RemoteObject for Point {
        fn type_name(&self) -> &str {
            "Point"
        }

        fn get_attr(&self, name: &str) -> ObjectResult<LocalValue> {
            match name {
                "x" => Ok(Value::Int(self.x)),
                other => Err(ObjectError::NoSuchMember(other.to_string())),
            }
        }
    }

    impl RemoteType for Point {
        const TYPE_NAME: &'static str = "Point";
        const CAPABILITIES: Capabilities = Capabilities::GET_ATTR;

        fn construct(args: Args) -> ObjectResult<Self> {
            args.expect_exact("Point", 1)?;
            Ok(Self {
                x: args.int("Point", 0)?,
            })
        }
    }

    #[test]
    fn test_capabilities_bitmask() {
        let caps = Capabilities::CALL | Capabilities::GET_ITEM;
        assert!(caps.contains(Capabilities::CALL));
        assert!(!caps.contains(Capabilities::SET_ITEM));
        assert!(Capabilities::ALL.contains(caps));
        assert_eq!(Capabilities::from_bits(0xffff), Capabilities::ALL);
    }

    #[test]
    fn test_descriptor_constructs() {
        let desc = TypeDescriptor::of::<Point>();
        assert_eq!(desc.name(), "Point");

        let obj = desc.construct(Args::positional(vec![Value::Int(7)])).unwrap();
        assert_eq!(obj.get_attr("x").unwrap(), Value::Int(7));
    }

    #[test]
    fn test_descriptor_arity_error() {
        let desc = TypeDescriptor::of::<Point>();
        let err = desc.construct(Args::default()).err().unwrap();
        assert_eq!(err.type_tag(), "ArityMismatch");
    }

    #[test]
    fn test_default_operations_unsupported() {
        let mut p = Point { x: 1 };
        assert!(matches!(p.len(), Err(ObjectError::Unsupported(_))));
        assert!(matches!(
            p.call("nope", Args::default()),
            Err(ObjectError::NoSuchMember(_))
        ));
        assert_eq!(p.to_text().unwrap(), "<Point object>");
    }

    #[test]
    fn test_object_ref_identity() {
        let a = ObjectRef::new(Point { x: 1 });
        let b = a.clone();
        let c = ObjectRef::new(Point { x: 1 });
        assert_eq!(a, b);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a, c);
    }

    #[test]
    fn test_describe() {
        let v: LocalValue = Value::List(vec![Value::Int(1), Value::from("a"), Value::None]);
        assert_eq!(describe(&v), "[1, \"a\", None]");
    }
}
