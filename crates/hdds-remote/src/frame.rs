// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed framing.
//!
//! `[u32 big-endian length][payload]`. The async half is used by the server
//! connections, the blocking half by client sessions.

use crate::protocol::{Codec, CodecError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Framing error types.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("empty frame")]
    Empty,

    #[error("stream ended inside the length prefix ({0} of 4 bytes)")]
    TruncatedPrefix(usize),

    #[error("frame too large: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("payload error: {0}")]
    Codec(#[from] CodecError),
}

impl FramingError {
    /// True when the peer went away rather than sent something invalid.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        )
    }
}

/// Encode `msg` into a complete frame (prefix included).
pub fn encode_frame<T: Serialize>(
    codec: Codec,
    msg: &T,
    max_message_size: usize,
) -> Result<Vec<u8>, FramingError> {
    let payload = codec.encode(msg)?;
    if payload.is_empty() {
        return Err(FramingError::Empty);
    }
    if payload.len() > max_message_size {
        return Err(FramingError::TooLarge {
            len: payload.len(),
            max: max_message_size,
        });
    }

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn check_length(len_buf: [u8; 4], max_message_size: usize) -> Result<usize, FramingError> {
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(FramingError::Empty);
    }
    if len > max_message_size {
        return Err(FramingError::TooLarge {
            len,
            max: max_message_size,
        });
    }
    Ok(len)
}

/// Read one frame payload.
///
/// Returns `Ok(None)` if the stream is closed before the first byte of a
/// length prefix.
pub async fn read_frame<R>(
    reader: &mut R,
    max_message_size: usize,
    buf: &mut Vec<u8>,
) -> Result<Option<()>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut len_buf[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => return Err(FramingError::TruncatedPrefix(filled)),
            n => filled += n,
        }
    }

    let len = check_length(len_buf, max_message_size)?;

    buf.clear();
    buf.resize(len, 0);
    reader.read_exact(buf).await?;
    Ok(Some(()))
}

/// Read and decode one message.
pub async fn read_message<R, T>(
    reader: &mut R,
    codec: Codec,
    max_message_size: usize,
    buf: &mut Vec<u8>,
) -> Result<Option<T>, FramingError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader, max_message_size, buf).await? {
        Some(()) => Ok(Some(codec.decode(buf)?)),
        None => Ok(None),
    }
}

/// Encode and write one message.
pub async fn write_message<W, T>(
    writer: &mut W,
    codec: Codec,
    msg: &T,
    max_message_size: usize,
) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(codec, msg, max_message_size)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Blocking counterpart of [`read_message`].
pub fn read_message_blocking<R, T>(
    reader: &mut R,
    codec: Codec,
    max_message_size: usize,
) -> Result<Option<T>, FramingError>
where
    R: Read,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(FramingError::TruncatedPrefix(filled)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = check_length(len_buf, max_message_size)?;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Some(codec.decode(&buf)?))
}

/// Blocking counterpart of [`write_message`].
pub fn write_message_blocking<W, T>(
    writer: &mut W,
    codec: Codec,
    msg: &T,
    max_message_size: usize,
) -> Result<(), FramingError>
where
    W: Write,
    T: Serialize,
{
    let frame = encode_frame(codec, msg, max_message_size)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}
