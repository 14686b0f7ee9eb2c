// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Value marshaling.
//!
//! Primitives and containers are copied recursively; `Value::Ref` always
//! travels as a [`ReferenceHandle`]. The walk is shared by both ends, only
//! the handling of references differs:
//! - server: references are registered (or re-acquired by identity) and the
//!   hold is recorded in the connection's [`AcquiredSet`]
//! - client: proxies are turned back into their handle

use crate::object::{LocalValue, ObjectRef};
use crate::protocol::{MarshaledValue, Primitive, ReferenceHandle};
use crate::registry::{ObjectRegistry, RegistryError};
use crate::value::Value;
use std::collections::HashMap;
use std::convert::Infallible;

/// Marshal `value`, mapping each reference through `on_ref`.
pub fn marshal_with<R, E, F>(value: &Value<R>, on_ref: &mut F) -> Result<MarshaledValue, E>
where
    F: FnMut(&R) -> Result<ReferenceHandle, E>,
{
    let primitive = match value {
        Value::None => Primitive::None,
        Value::Bool(b) => Primitive::Bool(*b),
        Value::Int(i) => Primitive::Int(*i),
        Value::Float(f) => Primitive::Float(*f),
        Value::Str(s) => Primitive::Str(s.clone()),
        Value::Bytes(b) => Primitive::Bytes(b.clone()),
        Value::List(items) => Primitive::Seq(
            items
                .iter()
                .map(|item| marshal_with(item, on_ref))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(entries) => Primitive::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((marshal_with(k, on_ref)?, marshal_with(v, on_ref)?)))
                .collect::<Result<_, _>>()?,
        ),
        Value::Ref(r) => return on_ref(r).map(MarshaledValue::Ref),
    };
    Ok(MarshaledValue::Copy(primitive))
}

/// Unmarshal `value`, resolving each handle through `on_ref`.
pub fn unmarshal_with<R, E, F>(value: MarshaledValue, on_ref: &mut F) -> Result<Value<R>, E>
where
    F: FnMut(ReferenceHandle) -> Result<R, E>,
{
    let primitive = match value {
        MarshaledValue::Ref(handle) => return on_ref(handle).map(Value::Ref),
        MarshaledValue::Copy(p) => p,
    };
    Ok(match primitive {
        Primitive::None => Value::None,
        Primitive::Bool(b) => Value::Bool(b),
        Primitive::Int(i) => Value::Int(i),
        Primitive::Float(f) => Value::Float(f),
        Primitive::Str(s) => Value::Str(s),
        Primitive::Bytes(b) => Value::Bytes(b),
        Primitive::Seq(items) => Value::List(
            items
                .into_iter()
                .map(|item| unmarshal_with(item, on_ref))
                .collect::<Result<_, _>>()?,
        ),
        Primitive::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| Ok((unmarshal_with(k, on_ref)?, unmarshal_with(v, on_ref)?)))
                .collect::<Result<_, _>>()?,
        ),
    })
}

/// Holds owned by one connection: reference id -> count.
#[derive(Debug, Default)]
pub struct AcquiredSet {
    holds: HashMap<u64, u32>,
}

impl AcquiredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more hold on `reference_id`.
    pub fn record(&mut self, reference_id: u64) {
        *self.holds.entry(reference_id).or_insert(0) += 1;
    }

    /// Give up to `count` holds on `reference_id`; returns how many were
    /// actually owned.
    pub fn take(&mut self, reference_id: u64, count: u32) -> u32 {
        let Some(owned) = self.holds.get_mut(&reference_id) else {
            return 0;
        };
        let taken = count.min(*owned);
        *owned -= taken;
        if *owned == 0 {
            self.holds.remove(&reference_id);
        }
        taken
    }

    /// Holds on `reference_id`.
    pub fn count(&self, reference_id: u64) -> u32 {
        self.holds.get(&reference_id).copied().unwrap_or(0)
    }

    /// Number of distinct references held.
    pub fn len(&self) -> usize {
        self.holds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holds.is_empty()
    }

    /// Remove and return every hold.
    pub fn drain(&mut self) -> Vec<(u64, u32)> {
        self.holds.drain().collect()
    }
}

/// Server-side outbound marshaling.
///
/// Every reference in `value` takes a hold in `registry` that is recorded in
/// `acquired`.
pub fn marshal_local(
    value: &LocalValue,
    registry: &ObjectRegistry,
    acquired: &mut AcquiredSet,
) -> MarshaledValue {
    let mut on_ref = |object: &ObjectRef| -> Result<ReferenceHandle, Infallible> {
        let handle = registry.register_or_acquire(object);
        acquired.record(handle.reference_id);
        Ok(handle)
    };
    match marshal_with(value, &mut on_ref) {
        Ok(marshaled) => marshaled,
        Err(never) => match never {},
    }
}

/// Server-side inbound unmarshaling: handles resolve to live objects.
pub fn unmarshal_local(
    value: MarshaledValue,
    registry: &ObjectRegistry,
) -> Result<LocalValue, RegistryError> {
    unmarshal_with(value, &mut |handle: ReferenceHandle| {
        registry.lookup(handle.reference_id)
    })
}
