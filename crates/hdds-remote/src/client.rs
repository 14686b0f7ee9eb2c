// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client session.
//!
//! A [`Session`] owns one blocking TCP connection to an object server. Calls
//! are synchronous with one request in flight at a time; every handle the
//! server returns is wrapped in a [`Proxy`] that releases its holds when the
//! last clone is dropped.
//!
//! # Example
//!
//! ```no_run
//! use hdds_remote::{ClientConfig, RemoteValue, Session};
//!
//! let session = Session::connect(ClientConfig::new("localhost", 5000))?;
//! let list = session.factory("List")?;
//! list.call("append", &[RemoteValue::from(1)])?;
//! assert_eq!(list.len()?, 1);
//! # Ok::<(), hdds_remote::RemoteError>(())
//! ```

use crate::config::ClientConfig;
use crate::error::RemoteError;
use crate::frame;
use crate::marshal::{marshal_with, unmarshal_with};
use crate::object::RemoteType;
use crate::protocol::{MarshaledValue, OpKind, Primitive, ReferenceHandle, Request, Response, Target};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fmt;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub mod proxy;

pub use proxy::Proxy;
use proxy::ProxyInner;

/// Client-side value: references are proxies.
pub type RemoteValue = Value<Proxy>;

/// Keyword arguments of a call.
pub type Kwargs = BTreeMap<String, RemoteValue>;

/// Connection to an object server.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionIo {
    stream: Option<TcpStream>,
    /// Set once the connection failed or was closed.
    broken: Option<String>,
}

pub(crate) struct SessionInner {
    config: ClientConfig,
    peer_addr: SocketAddr,
    io: Mutex<SessionIo>,
    /// reference id -> live proxy (weak, not an ownership relation)
    proxies: Mutex<HashMap<u64, Weak<ProxyInner>>>,
    next_request_id: AtomicU64,
}

impl Session {
    /// Connect to the server described by `config`.
    pub fn connect(config: ClientConfig) -> Result<Self, RemoteError> {
        config.validate()?;

        let mut last_error = None;
        for addr in config.resolve()? {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(stream) => return Self::from_stream(stream, addr, config),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(format!("{}: {}", addr, e));
                }
            }
        }

        Err(RemoteError::Transport(last_error.unwrap_or_else(|| {
            format!("{}:{}: no address to connect to", config.host, config.port)
        })))
    }

    fn from_stream(
        stream: TcpStream,
        peer_addr: SocketAddr,
        config: ClientConfig,
    ) -> Result<Self, RemoteError> {
        stream
            .set_nodelay(true)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        stream
            .set_read_timeout(config.read_timeout)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        info!("Connected to object server at {}", peer_addr);

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                peer_addr,
                io: Mutex::new(SessionIo {
                    stream: Some(stream),
                    broken: None,
                }),
                proxies: Mutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(1),
            }),
        })
    }

    /// Construct a registered type with no arguments.
    pub fn factory(&self, type_name: &str) -> Result<Proxy, RemoteError> {
        self.factory_with(type_name, &[], &Kwargs::new())
    }

    /// Construct a registered type.
    pub fn factory_with(
        &self,
        type_name: &str,
        args: &[RemoteValue],
        kwargs: &Kwargs,
    ) -> Result<Proxy, RemoteError> {
        let value = self.inner.invoke(
            OpKind::Instantiate,
            Target::Name(type_name.to_string()),
            None,
            args,
            kwargs,
        )?;
        expect_proxy(value, OpKind::Instantiate)
    }

    /// Construct the type registered for `T`.
    pub fn factory_type<T: RemoteType>(&self) -> Result<Proxy, RemoteError> {
        self.factory(T::TYPE_NAME)
    }

    /// Fetch the named instance `name`.
    pub fn instance(&self, name: &str) -> Result<Proxy, RemoteError> {
        let value = self.inner.invoke(
            OpKind::Lookup,
            Target::Name(name.to_string()),
            None,
            &[],
            &Kwargs::new(),
        )?;
        expect_proxy(value, OpKind::Lookup)
    }

    /// Is `type_name` registered on the server?
    pub fn has_type(&self, type_name: &str) -> Result<bool, RemoteError> {
        let value = self.inner.invoke(
            OpKind::HasType,
            Target::Name(type_name.to_string()),
            None,
            &[],
            &Kwargs::new(),
        )?;
        value
            .as_bool()
            .ok_or_else(|| unexpected(OpKind::HasType, &value))
    }

    /// Types registered on the server, sorted.
    pub fn list_types(&self) -> Result<Vec<String>, RemoteError> {
        let value = self
            .inner
            .invoke(OpKind::ListTypes, Target::Server, None, &[], &Kwargs::new())?;
        value
            .as_list()
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| unexpected(OpKind::ListTypes, &value))
    }

    /// Server address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// False once the connection failed or [`close`](Self::close) was called.
    pub fn is_connected(&self) -> bool {
        self.inner.io.lock().broken.is_none()
    }

    /// Number of live proxies tracked by this session.
    pub fn proxy_count(&self) -> usize {
        self.inner
            .proxies
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Close the connection. Later calls on this session or its proxies fail
    /// with [`RemoteError::Transport`]; the server reclaims every hold.
    pub fn close(&self) {
        self.inner.mark_broken("session closed".to_string());
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("peer_addr", &self.inner.peer_addr)
            .field("codec", &self.inner.config.codec)
            .finish_non_exhaustive()
    }
}

fn unexpected(op: OpKind, value: &RemoteValue) -> RemoteError {
    RemoteError::InvalidRequest(format!("unexpected {} result for {}", value.kind_name(), op))
}

fn expect_proxy(value: RemoteValue, op: OpKind) -> Result<Proxy, RemoteError> {
    match value {
        Value::Ref(proxy) => Ok(proxy),
        other => Err(unexpected(op, &other)),
    }
}

impl SessionInner {
    /// Marshal, send, wait, unmarshal.
    pub(crate) fn invoke(
        self: &Arc<Self>,
        op: OpKind,
        target: Target,
        member: Option<&str>,
        args: &[RemoteValue],
        kwargs: &Kwargs,
    ) -> Result<RemoteValue, RemoteError> {
        let args = args
            .iter()
            .map(|value| self.marshal(value))
            .collect::<Result<Vec<_>, _>>()?;
        let kwargs = kwargs
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.marshal(value)?)))
            .collect::<Result<BTreeMap<_, _>, RemoteError>>()?;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let mut request = Request::new(request_id, op, target)
            .with_args(args)
            .with_kwargs(kwargs);
        request.member = member.map(str::to_string);

        let result = self.round_trip(request)?;
        Ok(self.unmarshal(result))
    }

    /// Proxies from this session turn into their handle; proxies from any
    /// other session are rejected.
    fn marshal(self: &Arc<Self>, value: &RemoteValue) -> Result<MarshaledValue, RemoteError> {
        marshal_with(value, &mut |proxy: &Proxy| {
            if proxy.belongs_to(self) {
                Ok(proxy.handle().clone())
            } else {
                Err(RemoteError::UnknownReference(format!(
                    "reference {} belongs to another session",
                    proxy.reference_id()
                )))
            }
        })
    }

    fn unmarshal(self: &Arc<Self>, value: MarshaledValue) -> RemoteValue {
        let mut on_ref = |handle: ReferenceHandle| -> Result<Proxy, Infallible> {
            Ok(self.proxy_for(handle))
        };
        match unmarshal_with(value, &mut on_ref) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Cached proxy for the handle's id (taking one more hold), or a new one.
    fn proxy_for(self: &Arc<Self>, handle: ReferenceHandle) -> Proxy {
        let mut proxies = self.proxies.lock();
        if let Some(inner) = proxies.get(&handle.reference_id).and_then(Weak::upgrade) {
            inner.held.fetch_add(1, Ordering::SeqCst);
            return Proxy::from_inner(inner);
        }

        let inner = Arc::new(ProxyInner {
            session: Arc::clone(self),
            handle,
            held: AtomicU32::new(1),
        });
        proxies.insert(inner.handle.reference_id, Arc::downgrade(&inner));
        Proxy::from_inner(inner)
    }

    /// Send `request` and wait for its response.
    fn round_trip(&self, request: Request) -> Result<MarshaledValue, RemoteError> {
        let codec = self.config.codec;
        let max = self.config.max_message_size;

        let frame = frame::encode_frame(codec, &request, max);

        let mut io = self.io.lock();
        if let Some(reason) = &io.broken {
            return Err(RemoteError::Transport(reason.clone()));
        }
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => return Err(Self::fail(&mut io, RemoteError::from(e))),
        };
        let Some(stream) = io.stream.as_mut() else {
            return Err(RemoteError::Transport("not connected".into()));
        };

        debug!("Request #{} ({})", request.request_id, request.op);
        if let Err(e) = stream.write_all(&frame) {
            return Err(Self::fail(
                &mut io,
                RemoteError::Transport(format!("send failed: {}", e)),
            ));
        }

        loop {
            let Some(stream) = io.stream.as_mut() else {
                return Err(RemoteError::Transport("not connected".into()));
            };
            match frame::read_message_blocking::<_, Response>(stream, codec, max) {
                Ok(Some(response)) if response.request_id == request.request_id => {
                    return response.result.map_err(RemoteError::from);
                }
                Ok(Some(response)) => {
                    warn!(
                        "Discarding response #{} while waiting for #{}",
                        response.request_id, request.request_id
                    );
                }
                Ok(None) => {
                    return Err(Self::fail(
                        &mut io,
                        RemoteError::Transport("connection closed by server".into()),
                    ));
                }
                Err(e) => return Err(Self::fail(&mut io, RemoteError::from(e))),
            }
        }
    }

    /// Break the session and hand `err` back. Every later call fails with
    /// `Transport`.
    fn fail(io: &mut SessionIo, err: RemoteError) -> RemoteError {
        warn!("Session broken: {}", err);
        if let Some(stream) = io.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        io.broken = Some(err.to_string());
        err
    }

    fn mark_broken(&self, reason: String) {
        let mut io = self.io.lock();
        if io.broken.is_none() {
            if let Some(stream) = io.stream.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            debug!("Session to {}: {}", self.peer_addr, reason);
            io.broken = Some(reason);
        }
    }

    /// Send one `Release` for `count` holds. Failures are ignored: a broken
    /// session has already lost every hold server-side.
    pub(crate) fn release(&self, proxy: *const ProxyInner, reference_id: u64, count: u32) {
        {
            let mut proxies = self.proxies.lock();
            if proxies
                .get(&reference_id)
                .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), proxy))
            {
                proxies.remove(&reference_id);
            }
        }

        if count == 0 || self.io.lock().broken.is_some() {
            return;
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(request_id, OpKind::Release, Target::Reference(reference_id))
            .with_args(vec![MarshaledValue::Copy(Primitive::Int(i64::from(count)))]);
        if let Err(e) = self.round_trip(request) {
            debug!("Release of #{} failed: {}", reference_id, e);
        }
    }
}
