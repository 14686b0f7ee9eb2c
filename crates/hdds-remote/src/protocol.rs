// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote object wire protocol.
//!
//! Every message is a length-prefixed [`Request`] or [`Response`] encoded
//! with the connection's [`Codec`]:
//!
//! ```text
//! +----------------+-----------------------------+
//! | Length (4B BE) | Codec payload (JSON / CBOR) |
//! +----------------+-----------------------------+
//! ```
//!
//! Both ends must be configured with the same codec; there is no
//! negotiation. Field names below are part of the protocol.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Descriptor of a remote reference as seen on the wire.
///
/// Carries no ownership: each handle a server sends corresponds to one hold
/// that the receiving session must eventually release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceHandle {
    pub reference_id: u64,
    pub type_name: String,
}

/// A value as transferred: either copied or a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarshaledValue {
    Copy(Primitive),
    Ref(ReferenceHandle),
}

/// Copied payload. Containers may nest references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Primitive {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<MarshaledValue>),
    Map(Vec<(MarshaledValue, MarshaledValue)>),
}

impl MarshaledValue {
    pub fn none() -> Self {
        Self::Copy(Primitive::None)
    }

    pub fn int(i: i64) -> Self {
        Self::Copy(Primitive::Int(i))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::Copy(Primitive::Str(s.into()))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Copy(Primitive::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Every reference id in this value, nested ones included, once per
    /// occurrence.
    pub fn reference_ids(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        self.collect_reference_ids(&mut ids);
        ids
    }

    fn collect_reference_ids(&self, ids: &mut Vec<u64>) {
        match self {
            Self::Ref(handle) => ids.push(handle.reference_id),
            Self::Copy(Primitive::Seq(items)) => {
                for item in items {
                    item.collect_reference_ids(ids);
                }
            }
            Self::Copy(Primitive::Map(entries)) => {
                for (key, value) in entries {
                    key.collect_reference_ids(ids);
                    value.collect_reference_ids(ids);
                }
            }
            Self::Copy(_) => {}
        }
    }
}

/// Operation requested of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Construct a registered type; target is the type name.
    Instantiate,
    /// Invoke method `member`.
    Call,
    GetAttr,
    /// Write attribute `member` = args[0].
    SetAttr,
    GetItem,
    /// args[0] = key, args[1] = value.
    SetItem,
    DelItem,
    Len,
    Contains,
    Iterate,
    ToString,
    /// Operator `member` (see [`BinaryOp`](crate::value::BinaryOp)) with rhs args[0].
    BinaryOp,
    /// Drop holds on a reference; optional args[0] = count.
    Release,
    /// Fetch a named instance.
    Lookup,
    /// Is a type name registered?
    HasType,
    ListTypes,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instantiate => "instantiate",
            Self::Call => "call",
            Self::GetAttr => "get_attr",
            Self::SetAttr => "set_attr",
            Self::GetItem => "get_item",
            Self::SetItem => "set_item",
            Self::DelItem => "del_item",
            Self::Len => "len",
            Self::Contains => "contains",
            Self::Iterate => "iterate",
            Self::ToString => "to_string",
            Self::BinaryOp => "binary_op",
            Self::Release => "release",
            Self::Lookup => "lookup",
            Self::HasType => "has_type",
            Self::ListTypes => "list_types",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// A live reference.
    Reference(u64),
    /// A type name or named instance.
    Name(String),
    /// The server itself (introspection).
    Server,
}

/// Client to server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: u64,
    pub op: OpKind,
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    #[serde(default)]
    pub args: Vec<MarshaledValue>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, MarshaledValue>,
}

impl Request {
    pub fn new(request_id: u64, op: OpKind, target: Target) -> Self {
        Self {
            request_id,
            op,
            target,
            member: None,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub fn with_args(mut self, args: Vec<MarshaledValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: BTreeMap<String, MarshaledValue>) -> Self {
        self.kwargs = kwargs;
        self
    }
}

/// Server to client message.
///
/// On the wire: `{request_id, status: "ok" | "error", result}`, where
/// `result` is a [`MarshaledValue`] or an [`ErrorInfo`] according to
/// `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResponse", from = "WireResponse")]
pub struct Response {
    pub request_id: u64,
    pub result: Result<MarshaledValue, ErrorInfo>,
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    request_id: u64,
    #[serde(flatten)]
    body: WireBody,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
enum WireBody {
    Ok(MarshaledValue),
    Error(ErrorInfo),
}

impl From<Response> for WireResponse {
    fn from(response: Response) -> Self {
        Self {
            request_id: response.request_id,
            body: match response.result {
                Ok(value) => WireBody::Ok(value),
                Err(info) => WireBody::Error(info),
            },
        }
    }
}

impl From<WireResponse> for Response {
    fn from(wire: WireResponse) -> Self {
        Self {
            request_id: wire.request_id,
            result: match wire.body {
                WireBody::Ok(value) => Ok(value),
                WireBody::Error(info) => Err(info),
            },
        }
    }
}

impl Response {
    pub fn ok(request_id: u64, value: MarshaledValue) -> Self {
        Self {
            request_id,
            result: Ok(value),
        }
    }

    pub fn error(request_id: u64, info: ErrorInfo) -> Self {
        Self {
            request_id,
            result: Err(info),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Error category reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownType,
    DuplicateType,
    Construction,
    UnknownReference,
    UnsupportedOperation,
    RemoteException,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownType => "UnknownType",
            Self::DuplicateType => "DuplicateType",
            Self::Construction => "Construction",
            Self::UnknownReference => "UnknownReference",
            Self::UnsupportedOperation => "UnsupportedOperation",
            Self::RemoteException => "RemoteException",
            Self::InvalidRequest => "InvalidRequest",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Type tag of the failure raised inside the object, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type_name: Option<String>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            original_type_name: None,
        }
    }

    pub fn remote_exception(original_type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::RemoteException,
            message: message.into(),
            original_type_name: Some(original_type_name.into()),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.original_type_name {
            Some(tag) => write!(f, "{} ({}): {}", self.kind, tag, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Payload encoding of framed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// serde_json (default, human-readable).
    #[default]
    Json,
    /// CBOR via ciborium (compact).
    Cbor,
}

impl Codec {
    pub fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Json => serde_json::to_vec(msg).map_err(|e| CodecError::Encode(e.to_string())),
            Self::Cbor => {
                let mut buf = Vec::new();
                ciborium::ser::into_writer(msg, &mut buf)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
                Ok(buf)
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Self::Json => {
                serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
            }
            Self::Cbor => {
                ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
            }
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Cbor => f.write_str("cbor"),
        }
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "cbor" => Ok(Self::Cbor),
            other => Err(format!("unknown codec '{}' (expected json or cbor)", other)),
        }
    }
}

/// Payload encode/decode failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Request {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("kwarg1".to_string(), MarshaledValue::string("a keyword arg"));
        Request::new(7, OpKind::Call, Target::Reference(3))
            .with_member("append")
            .with_args(vec![
                MarshaledValue::Copy(Primitive::Seq(vec![
                    MarshaledValue::int(1),
                    MarshaledValue::Copy(Primitive::Bytes(b"some_bytes".to_vec())),
                ])),
                MarshaledValue::Ref(ReferenceHandle {
                    reference_id: 9,
                    type_name: "List".into(),
                }),
            ])
            .with_kwargs(kwargs)
    }

    #[test]
    fn test_request_json_field_names() {
        let json = String::from_utf8(Codec::Json.encode(&sample_request()).unwrap()).unwrap();
        assert!(json.contains("\"request_id\":7"));
        assert!(json.contains("\"op\":\"call\""));
        assert!(json.contains("\"target\":{\"reference\":3}"));
        assert!(json.contains("\"member\":\"append\""));
        assert!(json.contains("\"reference_id\":9"));
        assert!(json.contains("kwarg1"));
    }

    #[test]
    fn test_request_roundtrip_both_codecs() {
        let req = sample_request();
        for codec in [Codec::Json, Codec::Cbor] {
            let bytes = codec.encode(&req).unwrap();
            let back: Request = codec.decode(&bytes).unwrap();
            assert_eq!(back, req, "codec {}", codec);
        }
    }

    #[test]
    fn test_response_status_encoding() {
        let ok = Response::ok(1, MarshaledValue::int(3));
        let json: serde_json::Value =
            serde_json::from_slice(&Codec::Json.encode(&ok).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "request_id": 1,
                "status": "ok",
                "result": {"copy": {"type": "int", "value": 3}},
            })
        );

        let err = Response::error(
            2,
            ErrorInfo::remote_exception("IndexOutOfRange", "pop from empty list"),
        );
        let json: serde_json::Value =
            serde_json::from_slice(&Codec::Json.encode(&err).unwrap()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["result"]["kind"], "RemoteException");
        assert_eq!(json["result"]["original_type_name"], "IndexOutOfRange");

        for codec in [Codec::Json, Codec::Cbor] {
            let back: Response = codec.decode(&codec.encode(&err).unwrap()).unwrap();
            assert_eq!(back, err, "codec {}", codec);
            let back: Response = codec.decode(&codec.encode(&ok).unwrap()).unwrap();
            assert_eq!(back, ok, "codec {}", codec);
        }
    }

    #[test]
    fn test_request_defaults_when_fields_missing() {
        let json = br#"{"request_id":1,"op":"list_types","target":"server"}"#;
        let req: Request = Codec::Json.decode(json).unwrap();
        assert_eq!(req.op, OpKind::ListTypes);
        assert_eq!(req.target, Target::Server);
        assert!(req.member.is_none());
        assert!(req.args.is_empty());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Codec::Json.decode::<Request>(b"not json").is_err());
        assert!(Codec::Cbor.decode::<Request>(&[0xff, 0x00]).is_err());
    }

    #[test]
    fn test_codec_parse() {
        assert_eq!("JSON".parse::<Codec>(), Ok(Codec::Json));
        assert_eq!("cbor".parse::<Codec>(), Ok(Codec::Cbor));
        assert!("xml".parse::<Codec>().is_err());
    }

    #[test]
    fn test_error_info_display() {
        let info = ErrorInfo::new(ErrorKind::UnknownType, "Unknown type 'Nope'");
        assert_eq!(info.to_string(), "UnknownType: Unknown type 'Nope'");

        let info = ErrorInfo::remote_exception("KeyNotFound", "missing");
        assert!(info.to_string().contains("(KeyNotFound)"));
    }
}
