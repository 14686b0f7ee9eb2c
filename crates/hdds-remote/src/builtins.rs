// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in remote types: [`List`], [`Dict`] and [`Counter`].

use crate::object::{
    describe, Args, Capabilities, LocalValue, ObjectError, ObjectResult, RemoteObject, RemoteType,
    TypeDescriptor,
};
use crate::registry::{ObjectRegistry, RegistryError};
use crate::value::{BinaryOp, Value};

/// Register every built-in type.
pub fn register_builtins(registry: &ObjectRegistry) -> Result<(), RegistryError> {
    registry.register_type(TypeDescriptor::of::<List>())?;
    registry.register_type(TypeDescriptor::of::<Dict>())?;
    registry.register_type(TypeDescriptor::of::<Counter>())?;
    Ok(())
}

/// Largest list `List * n` may produce.
pub const MAX_REPEAT_LEN: usize = 1 << 20;

/// Resolve a possibly negative index.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index + len } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn index_arg(key: &LocalValue, op: &str) -> ObjectResult<i64> {
    key.as_int().ok_or_else(|| {
        ObjectError::invalid_argument(format!(
            "{} index must be int, not {}",
            op,
            key.kind_name()
        ))
    })
}

fn arithmetic_error(op: BinaryOp, rhs: &LocalValue) -> ObjectError {
    if rhs.as_float().is_none() {
        return ObjectError::invalid_argument(format!(
            "unsupported operand for {}: {}",
            op,
            rhs.kind_name()
        ));
    }
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && rhs.as_int() == Some(0) {
        return ObjectError::raised("ZeroDivision", "integer division or modulo by zero");
    }
    ObjectError::raised("Overflow", format!("integer overflow in {}", op))
}

/// Growable ordered sequence.
#[derive(Debug, Clone, Default)]
pub struct List {
    items: Vec<LocalValue>,
}

impl List {
    pub fn new(items: Vec<LocalValue>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[LocalValue] {
        &self.items
    }

    fn position(&self, item: &LocalValue) -> ObjectResult<usize> {
        self.items.iter().position(|i| i == item).ok_or_else(|| {
            ObjectError::raised("ValueNotFound", format!("{} is not in list", describe(item)))
        })
    }
}

impl RemoteObject for List {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    fn call(&mut self, method: &str, mut args: Args) -> ObjectResult<LocalValue> {
        match method {
            "append" => {
                args.expect_exact(method, 1)?;
                self.items.extend(args.positional.drain(..));
                Ok(Value::None)
            }
            "extend" => {
                args.expect_exact(method, 1)?;
                match args.positional.pop() {
                    Some(Value::List(items)) => {
                        self.items.extend(items);
                        Ok(Value::None)
                    }
                    Some(other) => Err(ObjectError::invalid_argument(format!(
                        "extend() argument must be a list, not {}",
                        other.kind_name()
                    ))),
                    None => Ok(Value::None),
                }
            }
            "insert" => {
                args.expect_exact(method, 2)?;
                let index = args.int(method, 0)?;
                let len = self.items.len() as i64;
                let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
                let item = args.positional.pop().unwrap_or_default();
                self.items.insert(at as usize, item);
                Ok(Value::None)
            }
            "pop" => {
                args.expect_at_most(method, 1)?;
                args.reject_keywords(method)?;
                if self.items.is_empty() {
                    return Err(ObjectError::raised("IndexOutOfRange", "pop from empty list"));
                }
                let index = match args.positional.first() {
                    Some(_) => args.int(method, 0)?,
                    None => -1,
                };
                let at = normalize_index(index, self.items.len())
                    .ok_or_else(|| ObjectError::index_out_of_range(index, self.items.len()))?;
                Ok(self.items.remove(at))
            }
            "remove" => {
                args.expect_exact(method, 1)?;
                let at = self.position(&args.positional[0])?;
                self.items.remove(at);
                Ok(Value::None)
            }
            "index" => {
                args.expect_exact(method, 1)?;
                Ok(Value::Int(self.position(&args.positional[0])? as i64))
            }
            "count" => {
                args.expect_exact(method, 1)?;
                let item = &args.positional[0];
                Ok(Value::Int(self.items.iter().filter(|i| *i == item).count() as i64))
            }
            "reverse" => {
                args.expect_exact(method, 0)?;
                self.items.reverse();
                Ok(Value::None)
            }
            "clear" => {
                args.expect_exact(method, 0)?;
                self.items.clear();
                Ok(Value::None)
            }
            "copy" => {
                args.expect_exact(method, 0)?;
                Ok(Value::List(self.items.clone()))
            }
            other => Err(ObjectError::NoSuchMember(other.to_string())),
        }
    }

    fn get_item(&self, key: &LocalValue) -> ObjectResult<LocalValue> {
        let index = index_arg(key, "list")?;
        normalize_index(index, self.items.len())
            .map(|at| self.items[at].clone())
            .ok_or_else(|| ObjectError::index_out_of_range(index, self.items.len()))
    }

    fn set_item(&mut self, key: LocalValue, value: LocalValue) -> ObjectResult<()> {
        let index = index_arg(&key, "list assignment")?;
        let at = normalize_index(index, self.items.len())
            .ok_or_else(|| ObjectError::index_out_of_range(index, self.items.len()))?;
        self.items[at] = value;
        Ok(())
    }

    fn del_item(&mut self, key: &LocalValue) -> ObjectResult<()> {
        let index = index_arg(key, "list deletion")?;
        let at = normalize_index(index, self.items.len())
            .ok_or_else(|| ObjectError::index_out_of_range(index, self.items.len()))?;
        self.items.remove(at);
        Ok(())
    }

    fn len(&self) -> ObjectResult<usize> {
        Ok(self.items.len())
    }

    fn contains(&self, item: &LocalValue) -> ObjectResult<bool> {
        Ok(self.items.contains(item))
    }

    fn iterate(&self) -> ObjectResult<Vec<LocalValue>> {
        Ok(self.items.clone())
    }

    fn to_text(&self) -> ObjectResult<String> {
        Ok(describe(&Value::List(self.items.clone())))
    }

    fn binary_op(&mut self, op: BinaryOp, rhs: LocalValue) -> ObjectResult<LocalValue> {
        match (op, rhs) {
            (BinaryOp::Add, Value::List(other)) => {
                let mut items = self.items.clone();
                items.extend(other);
                Ok(Value::List(items))
            }
            (BinaryOp::Mul, Value::Int(n)) => {
                let n = usize::try_from(n).unwrap_or(0);
                let len = self
                    .items
                    .len()
                    .checked_mul(n)
                    .filter(|len| *len <= MAX_REPEAT_LEN)
                    .ok_or_else(|| {
                        ObjectError::raised(
                            "Overflow",
                            format!(
                                "list of {} item(s) repeated {} times exceeds {} items",
                                self.items.len(),
                                n,
                                MAX_REPEAT_LEN
                            ),
                        )
                    })?;
                Ok(Value::List(
                    self.items.iter().cycle().take(len).cloned().collect(),
                ))
            }
            (BinaryOp::Eq, Value::List(other)) => Ok(Value::Bool(self.items == other)),
            (BinaryOp::Ne, Value::List(other)) => Ok(Value::Bool(self.items != other)),
            (op, rhs) => Err(ObjectError::invalid_argument(format!(
                "unsupported operand for list {}: {}",
                op,
                rhs.kind_name()
            ))),
        }
    }
}

impl RemoteType for List {
    const TYPE_NAME: &'static str = "List";
    const CAPABILITIES: Capabilities = Capabilities::CALL
        .union(Capabilities::GET_ITEM)
        .union(Capabilities::SET_ITEM)
        .union(Capabilities::CONTAINER)
        .union(Capabilities::ITERATE)
        .union(Capabilities::STRINGIFY)
        .union(Capabilities::ARITHMETIC);

    /// `List()` or `List(items)`.
    fn construct(mut args: Args) -> ObjectResult<Self> {
        args.expect_at_most(Self::TYPE_NAME, 1)?;
        args.reject_keywords(Self::TYPE_NAME)?;
        match args.positional.pop() {
            None => Ok(Self::default()),
            Some(Value::List(items)) => Ok(Self::new(items)),
            Some(other) => Err(ObjectError::invalid_argument(format!(
                "List() argument must be a list, not {}",
                other.kind_name()
            ))),
        }
    }
}

/// Insertion-ordered mapping with arbitrary keys.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(LocalValue, LocalValue)>,
}

impl Dict {
    fn find(&self, key: &LocalValue) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// `key` plus an optional default.
    fn key_arg(method: &str, args: &Args) -> ObjectResult<LocalValue> {
        args.expect_at_most(method, 2)?;
        args.reject_keywords(method)?;
        args.positional.first().cloned().ok_or_else(|| {
            ObjectError::raised("ArityMismatch", format!("{}() missing argument 0", method))
        })
    }

    fn insert(&mut self, key: LocalValue, value: LocalValue) {
        match self.find(&key) {
            Some(at) => self.entries[at].1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

impl RemoteObject for Dict {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    fn call(&mut self, method: &str, mut args: Args) -> ObjectResult<LocalValue> {
        match method {
            "get" => {
                let key = Self::key_arg(method, &args)?;
                let default = args.positional.get(1).cloned().unwrap_or_default();
                Ok(self
                    .find(&key)
                    .map(|at| self.entries[at].1.clone())
                    .unwrap_or(default))
            }
            "pop" => {
                let key = Self::key_arg(method, &args)?;
                match (self.find(&key), args.positional.get(1)) {
                    (Some(at), _) => Ok(self.entries.remove(at).1),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(ObjectError::key_not_found(&key)),
                }
            }
            "keys" => {
                args.expect_exact(method, 0)?;
                Ok(Value::List(self.entries.iter().map(|(k, _)| k.clone()).collect()))
            }
            "values" => {
                args.expect_exact(method, 0)?;
                Ok(Value::List(self.entries.iter().map(|(_, v)| v.clone()).collect()))
            }
            "items" => {
                args.expect_exact(method, 0)?;
                Ok(Value::List(
                    self.entries
                        .iter()
                        .map(|(k, v)| Value::List(vec![k.clone(), v.clone()]))
                        .collect(),
                ))
            }
            "update" => {
                args.expect_at_most(method, 1)?;
                match args.positional.pop() {
                    Some(Value::Map(entries)) => {
                        for (k, v) in entries {
                            self.insert(k, v);
                        }
                    }
                    Some(other) => {
                        return Err(ObjectError::invalid_argument(format!(
                            "update() argument must be a map, not {}",
                            other.kind_name()
                        )))
                    }
                    None => {}
                }
                for (k, v) in std::mem::take(&mut args.keyword) {
                    self.insert(Value::Str(k), v);
                }
                Ok(Value::None)
            }
            "clear" => {
                args.expect_exact(method, 0)?;
                self.entries.clear();
                Ok(Value::None)
            }
            other => Err(ObjectError::NoSuchMember(other.to_string())),
        }
    }

    fn get_item(&self, key: &LocalValue) -> ObjectResult<LocalValue> {
        self.find(key)
            .map(|at| self.entries[at].1.clone())
            .ok_or_else(|| ObjectError::key_not_found(key))
    }

    fn set_item(&mut self, key: LocalValue, value: LocalValue) -> ObjectResult<()> {
        self.insert(key, value);
        Ok(())
    }

    fn del_item(&mut self, key: &LocalValue) -> ObjectResult<()> {
        let at = self.find(key).ok_or_else(|| ObjectError::key_not_found(key))?;
        self.entries.remove(at);
        Ok(())
    }

    fn len(&self) -> ObjectResult<usize> {
        Ok(self.entries.len())
    }

    fn contains(&self, key: &LocalValue) -> ObjectResult<bool> {
        Ok(self.find(key).is_some())
    }

    /// Keys, in insertion order.
    fn iterate(&self) -> ObjectResult<Vec<LocalValue>> {
        Ok(self.entries.iter().map(|(k, _)| k.clone()).collect())
    }

    fn to_text(&self) -> ObjectResult<String> {
        Ok(describe(&Value::Map(self.entries.clone())))
    }
}

impl RemoteType for Dict {
    const TYPE_NAME: &'static str = "Dict";
    const CAPABILITIES: Capabilities = Capabilities::CALL
        .union(Capabilities::GET_ITEM)
        .union(Capabilities::SET_ITEM)
        .union(Capabilities::CONTAINER)
        .union(Capabilities::ITERATE)
        .union(Capabilities::STRINGIFY);

    /// `Dict()`, `Dict(map)` and/or string-keyed keyword entries.
    fn construct(args: Args) -> ObjectResult<Self> {
        let mut dict = Self::default();
        dict.call("update", args)?;
        Ok(dict)
    }
}

/// Integer counter.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: i64,
}

impl Counter {
    pub fn new(start: i64) -> Self {
        Self { value: start }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    fn step(method: &str, args: &Args) -> ObjectResult<i64> {
        args.expect_at_most(method, 1)?;
        args.reject_keywords(method)?;
        match args.positional.first() {
            Some(_) => args.int(method, 0),
            None => Ok(1),
        }
    }

    fn overflow() -> ObjectError {
        ObjectError::raised("Overflow", "counter overflow")
    }
}

impl RemoteObject for Counter {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    fn call(&mut self, method: &str, args: Args) -> ObjectResult<LocalValue> {
        match method {
            "increment" => {
                let by = Self::step(method, &args)?;
                self.value = self.value.checked_add(by).ok_or_else(Self::overflow)?;
                Ok(Value::Int(self.value))
            }
            "decrement" => {
                let by = Self::step(method, &args)?;
                self.value = self.value.checked_sub(by).ok_or_else(Self::overflow)?;
                Ok(Value::Int(self.value))
            }
            "value" => {
                args.expect_exact(method, 0)?;
                Ok(Value::Int(self.value))
            }
            "reset" => {
                args.expect_exact(method, 0)?;
                self.value = 0;
                Ok(Value::None)
            }
            other => Err(ObjectError::NoSuchMember(other.to_string())),
        }
    }

    fn get_attr(&self, name: &str) -> ObjectResult<LocalValue> {
        match name {
            "value" => Ok(Value::Int(self.value)),
            other => Err(ObjectError::NoSuchMember(other.to_string())),
        }
    }

    fn set_attr(&mut self, name: &str, value: LocalValue) -> ObjectResult<()> {
        match (name, value) {
            ("value", Value::Int(v)) => {
                self.value = v;
                Ok(())
            }
            ("value", other) => Err(ObjectError::invalid_argument(format!(
                "value must be int, not {}",
                other.kind_name()
            ))),
            (other, _) => Err(ObjectError::NoSuchMember(other.to_string())),
        }
    }

    fn to_text(&self) -> ObjectResult<String> {
        Ok(format!("Counter({})", self.value))
    }

    /// The counter's value as left operand; the counter itself is unchanged.
    fn binary_op(&mut self, op: BinaryOp, rhs: LocalValue) -> ObjectResult<LocalValue> {
        op.apply_numeric(&Value::Int(self.value), &rhs)
            .ok_or_else(|| arithmetic_error(op, &rhs))
    }
}

impl RemoteType for Counter {
    const TYPE_NAME: &'static str = "Counter";
    const CAPABILITIES: Capabilities = Capabilities::CALL
        .union(Capabilities::GET_ATTR)
        .union(Capabilities::SET_ATTR)
        .union(Capabilities::STRINGIFY)
        .union(Capabilities::ARITHMETIC);

    /// `Counter()`, `Counter(start)` or `Counter(start=n)`.
    fn construct(mut args: Args) -> ObjectResult<Self> {
        args.expect_at_most(Self::TYPE_NAME, 1)?;
        let start = args.take_keyword("start");
        args.reject_keywords(Self::TYPE_NAME)?;
        let start = match (args.positional.first(), start) {
            (Some(_), Some(_)) => {
                return Err(ObjectError::invalid_argument(
                    "Counter() got multiple values for 'start'",
                ))
            }
            (Some(_), None) => args.int(Self::TYPE_NAME, 0)?,
            (None, Some(Value::Int(v))) => v,
            (None, Some(other)) => {
                return Err(ObjectError::invalid_argument(format!(
                    "start must be int, not {}",
                    other.kind_name()
                )))
            }
            (None, None) => 0,
        };
        Ok(Self::new(start))
    }
}
