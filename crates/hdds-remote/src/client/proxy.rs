// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transparent proxy for a remote object.
//!
//! Every operation becomes one request against the proxy's reference id.
//! Results that are references come back as proxies themselves, so a remote
//! list returned from a call keeps mutating the same server-side object.

use super::{Kwargs, RemoteValue, Session, SessionInner};
use crate::error::RemoteError;
use crate::protocol::{OpKind, ReferenceHandle, Target};
use crate::value::BinaryOp;
use std::fmt;
use std::ops::{Add, Div, Mul, Rem, Sub};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

pub(crate) struct ProxyInner {
    pub(crate) session: Arc<SessionInner>,
    pub(crate) handle: ReferenceHandle,
    /// Holds the server granted this session for the reference.
    pub(crate) held: AtomicU32,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        let held = *self.held.get_mut();
        self.session
            .release(self as *const ProxyInner, self.handle.reference_id, held);
    }
}

/// Local stand-in for a server-side object.
///
/// Clones share the same reference. When the last clone is dropped (also
/// while unwinding) the session releases the reference on the server.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    pub(crate) fn from_inner(inner: Arc<ProxyInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn belongs_to(&self, session: &Arc<SessionInner>) -> bool {
        Arc::ptr_eq(&self.inner.session, session)
    }

    pub fn reference_id(&self) -> u64 {
        self.inner.handle.reference_id
    }

    /// Server-side type name.
    pub fn type_name(&self) -> &str {
        &self.inner.handle.type_name
    }

    pub fn handle(&self) -> &ReferenceHandle {
        &self.inner.handle
    }

    /// Session this proxy belongs to.
    pub fn session(&self) -> Session {
        Session::from_inner(Arc::clone(&self.inner.session))
    }

    fn request(
        &self,
        op: OpKind,
        member: Option<&str>,
        args: &[RemoteValue],
    ) -> Result<RemoteValue, RemoteError> {
        self.inner.session.invoke(
            op,
            Target::Reference(self.reference_id()),
            member,
            args,
            &Kwargs::new(),
        )
    }

    /// Invoke a method.
    pub fn call(&self, method: &str, args: &[RemoteValue]) -> Result<RemoteValue, RemoteError> {
        self.call_with(method, args, &Kwargs::new())
    }

    /// Invoke a method with keyword arguments.
    pub fn call_with(
        &self,
        method: &str,
        args: &[RemoteValue],
        kwargs: &Kwargs,
    ) -> Result<RemoteValue, RemoteError> {
        self.inner.session.invoke(
            OpKind::Call,
            Target::Reference(self.reference_id()),
            Some(method),
            args,
            kwargs,
        )
    }

    pub fn get_attr(&self, name: &str) -> Result<RemoteValue, RemoteError> {
        self.request(OpKind::GetAttr, Some(name), &[])
    }

    pub fn set_attr(&self, name: &str, value: impl Into<RemoteValue>) -> Result<(), RemoteError> {
        self.request(OpKind::SetAttr, Some(name), &[value.into()])
            .map(drop)
    }

    /// `self[key]`
    pub fn get_item(&self, key: impl Into<RemoteValue>) -> Result<RemoteValue, RemoteError> {
        self.request(OpKind::GetItem, None, &[key.into()])
    }

    /// `self[key] = value`
    pub fn set_item(
        &self,
        key: impl Into<RemoteValue>,
        value: impl Into<RemoteValue>,
    ) -> Result<(), RemoteError> {
        self.request(OpKind::SetItem, None, &[key.into(), value.into()])
            .map(drop)
    }

    pub fn del_item(&self, key: impl Into<RemoteValue>) -> Result<(), RemoteError> {
        self.request(OpKind::DelItem, None, &[key.into()]).map(drop)
    }

    pub fn len(&self) -> Result<usize, RemoteError> {
        let value = self.request(OpKind::Len, None, &[])?;
        value
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| RemoteError::InvalidRequest(format!("bad len() result: {:?}", value)))
    }

    pub fn is_empty(&self) -> Result<bool, RemoteError> {
        Ok(self.len()? == 0)
    }

    /// `item in self`
    pub fn contains(&self, item: impl Into<RemoteValue>) -> Result<bool, RemoteError> {
        let value = self.request(OpKind::Contains, None, &[item.into()])?;
        value.as_bool().ok_or_else(|| {
            RemoteError::InvalidRequest(format!("bad contains() result: {:?}", value))
        })
    }

    /// Snapshot of the object's items.
    pub fn iter(&self) -> Result<std::vec::IntoIter<RemoteValue>, RemoteError> {
        match self.request(OpKind::Iterate, None, &[])? {
            RemoteValue::List(items) => Ok(items.into_iter()),
            other => Err(RemoteError::InvalidRequest(format!(
                "bad iterate() result: {:?}",
                other
            ))),
        }
    }

    /// Server-side string conversion.
    pub fn to_text(&self) -> Result<String, RemoteError> {
        match self.request(OpKind::ToString, None, &[])? {
            RemoteValue::Str(s) => Ok(s),
            other => Err(RemoteError::InvalidRequest(format!(
                "bad to_string() result: {:?}",
                other
            ))),
        }
    }

    /// Apply an operator with `self` as the left operand.
    pub fn binary_op(
        &self,
        op: BinaryOp,
        rhs: impl Into<RemoteValue>,
    ) -> Result<RemoteValue, RemoteError> {
        self.request(OpKind::BinaryOp, Some(op.as_str()), &[rhs.into()])
    }
}

/// Same session, same reference.
impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner.session, &other.inner.session)
            && self.reference_id() == other.reference_id()
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proxy({} #{})", self.type_name(), self.reference_id())
    }
}

impl From<Proxy> for RemoteValue {
    fn from(proxy: Proxy) -> Self {
        RemoteValue::Ref(proxy)
    }
}

impl From<&Proxy> for RemoteValue {
    fn from(proxy: &Proxy) -> Self {
        RemoteValue::Ref(proxy.clone())
    }
}

macro_rules! forward_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<RemoteValue>> $trait<T> for &Proxy {
            type Output = Result<RemoteValue, RemoteError>;

            fn $method(self, rhs: T) -> Self::Output {
                self.binary_op($op, rhs)
            }
        }
    };
}

forward_operator!(Add, add, BinaryOp::Add);
forward_operator!(Sub, sub, BinaryOp::Sub);
forward_operator!(Mul, mul, BinaryOp::Mul);
forward_operator!(Div, div, BinaryOp::Div);
forward_operator!(Rem, rem, BinaryOp::Rem);
