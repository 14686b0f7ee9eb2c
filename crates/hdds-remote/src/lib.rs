// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Remote Objects
//!
//! Host objects in a server process and drive them from clients through
//! transparent proxies:
//! - Types are registered by name on the server and instantiated on demand
//! - Primitive values are copied across the wire, objects travel as references
//! - Every proxy holds a reference count on the server; dropping the last
//!   clone releases it, and a closed connection releases everything it held
//!
//! # Architecture
//!
//! ```text
//! Client process                            Server process
//! +-------------------+                     +------------------------+
//! | Session           |   length-prefixed   | ObjectServer           |
//! |  Proxy --request--+---- JSON / CBOR ----+-> Dispatcher (per conn)|
//! |  Proxy <-response-+---------------------+-- ObjectRegistry       |
//! +-------------------+                     +------------------------+
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hdds_remote::{ClientConfig, RemoteValue, Session};
//!
//! # fn main() -> Result<(), hdds_remote::RemoteError> {
//! let session = Session::connect(ClientConfig::new("localhost", 5000))?;
//! let list = session.factory("List")?;
//! list.call("append", &[RemoteValue::from(1.1)])?;
//! assert_eq!(list.len()?, 1);
//! # Ok(())
//! # }
//! ```

pub mod builtins;
pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod marshal;
pub mod object;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod value;

pub use client::{Kwargs, Proxy, RemoteValue, Session};
pub use config::{ClientConfig, ConfigError, ServerConfig, DEFAULT_PORT};
pub use error::RemoteError;
pub use object::{
    Args, Capabilities, LocalValue, ObjectError, ObjectRef, ObjectResult, RemoteObject,
    RemoteType, TypeDescriptor,
};
pub use protocol::{Codec, ErrorKind, ReferenceHandle};
pub use registry::{ObjectRegistry, RegistryError};
pub use server::{ObjectServer, ServerError};
pub use value::{BinaryOp, Value};
