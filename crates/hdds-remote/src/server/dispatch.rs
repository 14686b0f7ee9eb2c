// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request execution for one connection.
//!
//! A [`Dispatcher`] owns the connection's [`AcquiredSet`] and turns each
//! decoded [`Request`] into a [`Response`]. Nothing here fails the
//! connection: every error, including a panic inside an object, is reported
//! in the response.

use crate::marshal::{marshal_local, unmarshal_local, AcquiredSet};
use crate::object::{Args, Capabilities, LocalValue, ObjectError};
use crate::protocol::{ErrorInfo, ErrorKind, MarshaledValue, OpKind, Primitive, Request, Response, Target};
use crate::registry::{ObjectRegistry, RegistryError};
use crate::value::{BinaryOp, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

type DispatchResult = Result<MarshaledValue, ErrorInfo>;

impl From<RegistryError> for ErrorInfo {
    fn from(e: RegistryError) -> Self {
        e.to_error_info()
    }
}

impl From<ObjectError> for ErrorInfo {
    fn from(e: ObjectError) -> Self {
        match e {
            ObjectError::Unsupported(op) => ErrorInfo::new(
                ErrorKind::UnsupportedOperation,
                format!("operation '{}' is not supported", op),
            ),
            other => ErrorInfo::remote_exception(other.type_tag().to_string(), other.to_string()),
        }
    }
}

/// Capability an operation needs on its target.
fn required_capability(op: OpKind) -> Option<Capabilities> {
    Some(match op {
        OpKind::Call => Capabilities::CALL,
        OpKind::GetAttr => Capabilities::GET_ATTR,
        OpKind::SetAttr => Capabilities::SET_ATTR,
        OpKind::GetItem => Capabilities::GET_ITEM,
        OpKind::SetItem | OpKind::DelItem => Capabilities::SET_ITEM,
        OpKind::Len | OpKind::Contains => Capabilities::CONTAINER,
        OpKind::Iterate => Capabilities::ITERATE,
        OpKind::ToString => Capabilities::STRINGIFY,
        OpKind::BinaryOp => Capabilities::ARITHMETIC,
        _ => return None,
    })
}

fn invalid(message: impl Into<String>) -> ErrorInfo {
    ErrorInfo::new(ErrorKind::InvalidRequest, message)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "object panicked".to_string()
    }
}

/// Executes requests against the shared registry on behalf of one connection.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ObjectRegistry>,
    acquired: AcquiredSet,
}

impl Dispatcher {
    pub fn new(registry: Arc<ObjectRegistry>) -> Self {
        Self {
            registry,
            acquired: AcquiredSet::new(),
        }
    }

    /// Holds this connection currently owns.
    pub fn acquired(&self) -> &AcquiredSet {
        &self.acquired
    }

    /// Execute one request.
    pub fn execute(&mut self, request: Request) -> Response {
        let request_id = request.request_id;
        let op = request.op;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Request #{} ({}) panicked: {}", request_id, op, message);
                Err(ErrorInfo::remote_exception("panic", message))
            }
        };

        match &result {
            Ok(_) => debug!("Request #{} ({}) ok", request_id, op),
            Err(info) => debug!("Request #{} ({}) failed: {}", request_id, op, info),
        }
        Response {
            request_id,
            result,
        }
    }

    /// Release every hold this connection still owns.
    ///
    /// Returns the number of holds released.
    pub fn release_all(&mut self) -> u32 {
        let mut released = 0;
        for (reference_id, count) in self.acquired.drain() {
            match self.registry.release_many(reference_id, count) {
                Ok(_) => released += count,
                Err(e) => debug!("Release sweep: {}", e),
            }
        }
        if released > 0 {
            info!("Released {} abandoned hold(s)", released);
        }
        released
    }

    /// Give back the holds taken for a response that will never be
    /// delivered.
    ///
    /// Returns the number of holds released.
    pub fn discard(&mut self, response: &Response) -> u32 {
        let Ok(value) = &response.result else {
            return 0;
        };
        let mut released = 0;
        for reference_id in value.reference_ids() {
            if self.acquired.take(reference_id, 1) == 0 {
                continue;
            }
            match self.registry.release_many(reference_id, 1) {
                Ok(_) => released += 1,
                Err(e) => debug!("Discard of #{}: {}", reference_id, e),
            }
        }
        released
    }

    fn dispatch(&mut self, request: Request) -> DispatchResult {
        match request.op {
            OpKind::Instantiate => self.instantiate(request),
            OpKind::Release => self.release(request),
            OpKind::Lookup => {
                let name = target_name(&request)?;
                let handle = self.registry.acquire_named(name)?;
                self.acquired.record(handle.reference_id);
                Ok(MarshaledValue::Ref(handle))
            }
            OpKind::HasType => {
                let name = target_name(&request)?;
                Ok(MarshaledValue::Copy(Primitive::Bool(self.registry.has_type(name))))
            }
            OpKind::ListTypes => Ok(MarshaledValue::Copy(Primitive::Seq(
                self.registry
                    .type_names()
                    .into_iter()
                    .map(MarshaledValue::string)
                    .collect(),
            ))),
            _ => self.invoke(request),
        }
    }

    fn instantiate(&mut self, request: Request) -> DispatchResult {
        let type_name = target_name(&request)?.to_string();
        let args = self.unmarshal_args(request.args, request.kwargs)?;

        let handle = self.registry.instantiate(&type_name, args)?;
        self.acquired.record(handle.reference_id);
        Ok(MarshaledValue::Ref(handle))
    }

    fn release(&mut self, request: Request) -> DispatchResult {
        let Target::Reference(reference_id) = request.target else {
            return Err(invalid("release requires a reference target"));
        };
        let count = match request.args.first() {
            None => 1,
            Some(value) => value
                .as_int()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid("release count must be a non-negative integer"))?,
        };

        let owned = self.acquired.take(reference_id, count);
        if owned < count {
            debug!(
                "Release of #{}: {} of {} hold(s) not owned by this connection",
                reference_id,
                count - owned,
                count
            );
        }
        if owned > 0 {
            if let Err(e) = self.registry.release_many(reference_id, owned) {
                debug!("Release of #{}: {}", reference_id, e);
            }
        }
        Ok(MarshaledValue::none())
    }

    /// Operations on a live object.
    fn invoke(&mut self, request: Request) -> DispatchResult {
        let Target::Reference(reference_id) = request.target else {
            return Err(invalid(format!("{} requires a reference target", request.op)));
        };
        let entry = self.registry.entry(reference_id)?;

        if let Some(required) = required_capability(request.op) {
            if !entry.capabilities.contains(required) {
                return Err(ErrorInfo::new(
                    ErrorKind::UnsupportedOperation,
                    format!("'{}' objects do not support {}", entry.type_name, request.op),
                ));
            }
        }

        let op = request.op;
        let member = request.member;
        let mut args = self.unmarshal_args(request.args, request.kwargs)?;

        // Only the object's own lock is held while its code runs.
        let result = {
            let mut object = entry.object.lock();
            match op {
                OpKind::Call => {
                    let method = member.ok_or_else(|| invalid("call requires a member name"))?;
                    object.call(&method, args)?
                }
                OpKind::GetAttr => {
                    let name = member.ok_or_else(|| invalid("get_attr requires a member name"))?;
                    object.get_attr(&name)?
                }
                OpKind::SetAttr => {
                    let name = member.ok_or_else(|| invalid("set_attr requires a member name"))?;
                    let value = take_arg(&mut args, 0, "set_attr")?;
                    object.set_attr(&name, value)?;
                    Value::None
                }
                OpKind::GetItem => {
                    let key = take_arg(&mut args, 0, "get_item")?;
                    object.get_item(&key)?
                }
                OpKind::SetItem => {
                    let value = take_arg(&mut args, 1, "set_item")?;
                    let key = take_arg(&mut args, 0, "set_item")?;
                    object.set_item(key, value)?;
                    Value::None
                }
                OpKind::DelItem => {
                    let key = take_arg(&mut args, 0, "del_item")?;
                    object.del_item(&key)?;
                    Value::None
                }
                OpKind::Len => {
                    let len = object.len()?;
                    Value::Int(i64::try_from(len).map_err(|_| invalid("length overflow"))?)
                }
                OpKind::Contains => {
                    let item = take_arg(&mut args, 0, "contains")?;
                    Value::Bool(object.contains(&item)?)
                }
                OpKind::Iterate => Value::List(object.iterate()?),
                OpKind::ToString => Value::Str(object.to_text()?),
                OpKind::BinaryOp => {
                    let name = member.ok_or_else(|| invalid("binary_op requires an operator"))?;
                    let bin_op: BinaryOp = name.parse().map_err(invalid)?;
                    let rhs = take_arg(&mut args, 0, "binary_op")?;
                    object.binary_op(bin_op, rhs)?
                }
                other => return Err(invalid(format!("unexpected operation {}", other))),
            }
        };

        Ok(marshal_local(&result, &self.registry, &mut self.acquired))
    }

    fn unmarshal_args(
        &self,
        args: Vec<MarshaledValue>,
        kwargs: BTreeMap<String, MarshaledValue>,
    ) -> Result<Args, ErrorInfo> {
        let positional = args
            .into_iter()
            .map(|value| unmarshal_local(value, &self.registry))
            .collect::<Result<Vec<_>, _>>()?;
        let keyword = kwargs
            .into_iter()
            .map(|(name, value)| Ok((name, unmarshal_local(value, &self.registry)?)))
            .collect::<Result<BTreeMap<_, _>, RegistryError>>()?;
        Ok(Args::new(positional, keyword))
    }
}

fn target_name(request: &Request) -> Result<&str, ErrorInfo> {
    match &request.target {
        Target::Name(name) => Ok(name),
        _ => Err(invalid(format!("{} requires a name target", request.op))),
    }
}

fn take_arg(args: &mut Args, index: usize, op: &str) -> Result<LocalValue, ErrorInfo> {
    if index >= args.positional.len() {
        return Err(invalid(format!("{} requires argument {}", op, index)));
    }
    Ok(std::mem::take(&mut args.positional[index]))
}
