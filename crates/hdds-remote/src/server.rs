// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object server core implementation.

use crate::config::{ConfigError, ServerConfig};
use crate::frame::FramingError;
use crate::protocol::{ErrorInfo, ErrorKind, Response};
use crate::registry::ObjectRegistry;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

pub mod connection;
pub mod dispatch;

pub use connection::ClientConnection;
pub use dispatch::Dispatcher;

/// Object server: accepts connections and runs one dispatcher per client,
/// all sharing a single [`ObjectRegistry`].
#[derive(Clone)]
pub struct ObjectServer {
    config: Arc<ServerConfig>,
    registry: Arc<ObjectRegistry>,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl ObjectServer {
    /// Create a new object server.
    pub fn new(config: ServerConfig, registry: Arc<ObjectRegistry>) -> Result<Self, ServerError> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            registry,
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        // Must be enabled before `running` flips.
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        match listener.local_addr() {
            Ok(addr) => info!("Object server listening on {}", addr),
            Err(e) => warn!("Object server listening (address unavailable: {})", e),
        }

        let mut tasks = JoinSet::new();
        while !self.stopping.load(Ordering::SeqCst) {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => self.accept(stream, peer_addr, &mut tasks),
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::reap(joined);
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Every connection runs its release sweep before serve returns.
        drop(listener);
        while let Some(joined) = tasks.join_next().await {
            Self::reap(joined);
        }

        self.stopping.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn reap(joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            error!("Connection task failed: {}", e);
        }
    }

    fn accept(&self, stream: TcpStream, peer_addr: SocketAddr, tasks: &mut JoinSet<()>) {
        let limit = self.config.max_connections;
        if limit > 0 && self.connections.load(Ordering::SeqCst) >= limit {
            warn!(
                "Max connections ({}) reached, rejecting {}",
                limit, peer_addr
            );
            return;
        }

        if let Err(e) = stream.set_nodelay(self.config.tcp_nodelay) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
        }

        info!("New connection from {}", peer_addr);
        self.connections.fetch_add(1, Ordering::SeqCst);

        let registry = self.registry.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();
        let stopping = self.stopping.clone();
        let connections = self.connections.clone();

        tasks.spawn(async move {
            Self::handle_connection(stream, peer_addr, registry, config, shutdown, stopping).await;
            connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Handle a client connection until it closes, fails or the server stops.
    ///
    /// The acquired-set release sweep always runs before returning.
    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        registry: Arc<ObjectRegistry>,
        config: Arc<ServerConfig>,
        shutdown: Arc<Notify>,
        stopping: Arc<AtomicBool>,
    ) {
        let mut conn =
            ClientConnection::new(stream, peer_addr, config.codec, config.max_message_size);
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new(registry)));

        let shutdown = shutdown.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        // A shutdown signalled before `enable` is only visible through the flag.
        while !stopping.load(Ordering::SeqCst) {
            let request = tokio::select! {
                result = conn.read_request() => {
                    match result {
                        Ok(Some(request)) => request,
                        Ok(None) => {
                            info!("Connection closed: {}", peer_addr);
                            break;
                        }
                        Err(e) if e.is_disconnect() => {
                            info!("Connection lost: {}: {}", peer_addr, e);
                            break;
                        }
                        Err(e) => {
                            warn!("Read error from {}: {}", peer_addr, e);
                            break;
                        }
                    }
                }
                _ = &mut shutdown => {
                    debug!("Connection handler shutting down: {}", peer_addr);
                    break;
                }
            };

            // Object code may block; keep it off the async workers.
            let worker = dispatcher.clone();
            let response =
                match tokio::task::spawn_blocking(move || worker.lock().execute(request)).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!("Dispatch task for {} failed: {}", peer_addr, e);
                        break;
                    }
                };

            if let Err(e) = Self::send_response(&mut conn, &dispatcher, response).await {
                warn!("Failed to send response to {}: {}", peer_addr, e);
                break;
            }
        }

        let released = dispatcher.lock().release_all();
        debug!("Connection {} torn down, {} hold(s) released", peer_addr, released);
        if let Err(e) = conn.shutdown().await {
            debug!("Shutdown of {}: {}", peer_addr, e);
        }
    }

    /// Send `response`, or an `InvalidRequest` error in its place when it does
    /// not fit in one frame. Holds taken for a dropped response are released.
    async fn send_response(
        conn: &mut ClientConnection,
        dispatcher: &Mutex<Dispatcher>,
        response: Response,
    ) -> Result<(), FramingError> {
        let (len, max) = match conn.send_response(&response).await {
            Err(FramingError::TooLarge { len, max }) => (len, max),
            other => return other,
        };

        let released = dispatcher.lock().discard(&response);
        warn!(
            "Response #{} to {} too large ({} > {}), {} hold(s) released",
            response.request_id,
            conn.peer_addr(),
            len,
            max,
            released
        );
        let fallback = Response::error(
            response.request_id,
            ErrorInfo::new(
                ErrorKind::InvalidRequest,
                format!("response too large: {} > {}", len, max),
            ),
        );
        conn.send_response(&fallback).await
    }

    /// Signal the server and every connection to stop.
    ///
    /// A shutdown requested before [`serve`](Self::serve) makes it return
    /// at once.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Check if server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Server error types.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Server already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;
    use crate::protocol::{Codec, OpKind, Request, Target};
    use std::time::Duration;

    fn server() -> ObjectServer {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        ObjectServer::new(config, Arc::new(ObjectRegistry::new())).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ServerConfig {
            max_message_size: 0,
            ..Default::default()
        };
        let err = ObjectServer::new(config, Arc::new(ObjectRegistry::new()))
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let server = server();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let handle = tokio::spawn({
            let server = server.clone();
            async move { server.serve(listener).await }
        });

        for _ in 0..100 {
            if server.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(server.is_running());

        server.shutdown();
        handle.await.unwrap().unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_connections() {
        let registry = Arc::new(ObjectRegistry::new());
        crate::builtins::register_builtins(&registry).unwrap();
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let server = ObjectServer::new(config, registry.clone()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn({
            let server = server.clone();
            async move { server.serve(listener).await }
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let request = Request::new(1, OpKind::Instantiate, Target::Name("Counter".into()));
        frame::write_message(&mut client, Codec::Json, &request, 1024).await.unwrap();
        let mut buf = Vec::new();
        let response: Response = frame::read_message(&mut client, Codec::Json, 1024, &mut buf)
            .await
            .unwrap()
            .unwrap();
        assert!(response.is_ok());
        assert_eq!(registry.entry_count(), 1);
        assert_eq!(server.connection_count(), 1);

        server.shutdown();
        handle.await.unwrap().unwrap();
        assert_eq!(server.connection_count(), 0);
        assert_eq!(registry.entry_count(), 0);
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_before_serve_returns_at_once() {
        let server = server();
        server.shutdown();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        server.serve(listener).await.unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_serve_twice_fails() {
        let server = server();
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let handle = tokio::spawn({
            let server = server.clone();
            async move { server.serve(first).await }
        });
        while !server.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(
            server.serve(second).await,
            Err(ServerError::AlreadyRunning)
        ));

        server.shutdown();
        handle.await.unwrap().unwrap();
    }
}
