// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client connection handling for the object server.

use crate::frame::{self, FramingError};
use crate::protocol::{Codec, Request, Response};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// A connected client.
pub struct ClientConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    codec: Codec,
    max_message_size: usize,
    read_buffer: Vec<u8>,
}

impl ClientConnection {
    /// Create a new client connection.
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        codec: Codec,
        max_message_size: usize,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            codec,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read a request from the client.
    ///
    /// Returns `Ok(None)` if the connection is closed gracefully.
    pub async fn read_request(&mut self) -> Result<Option<Request>, FramingError> {
        frame::read_message(
            &mut self.stream,
            self.codec,
            self.max_message_size,
            &mut self.read_buffer,
        )
        .await
    }

    /// Send a response to the client.
    pub async fn send_response(&mut self, response: &Response) -> Result<(), FramingError> {
        frame::write_message(&mut self.stream, self.codec, response, self.max_message_size).await
    }

    /// Shutdown the connection.
    pub async fn shutdown(&mut self) -> Result<(), FramingError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MarshaledValue, OpKind, Primitive, Target};
    use tokio::net::TcpListener;

    async fn pair(max: usize) -> (ClientConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (ClientConnection::new(server, peer, Codec::Json, max), client)
    }

    #[tokio::test]
    async fn test_read_request_and_close() {
        let (mut conn, mut client) = pair(1024).await;

        let req = Request::new(5, OpKind::ListTypes, Target::Server);
        frame::write_message(&mut client, Codec::Json, &req, 1024).await.unwrap();
        drop(client);

        assert_eq!(conn.read_request().await.unwrap(), Some(req));
        assert_eq!(conn.read_request().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let (mut conn, mut client) = pair(256).await;

        let big = Response::ok(9, MarshaledValue::Copy(Primitive::Bytes(vec![7; 4096])));
        let err = conn.send_response(&big).await.unwrap_err();
        assert!(matches!(err, FramingError::TooLarge { max: 256, .. }));

        let small = Response::ok(10, MarshaledValue::int(1));
        conn.send_response(&small).await.unwrap();

        let mut buf = Vec::new();
        let got: Response = frame::read_message(&mut client, Codec::Json, 256, &mut buf)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, small);
    }
}
