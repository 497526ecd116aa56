//! HTTP frontend: connection acceptor and per-connection workers.
//!
//! One acceptor task hands each connection to a worker task drawn from a
//! semaphore-bounded pool, so a slow request can never block other requests
//! and no request occupies more than one worker. HTTP/1.1 pipelining is not
//! supported: every response carries `Connection: close` and the worker
//! serves exactly one request per connection.
//!
//! Request flow: read → parse → auth gate → path routing → SOAP context →
//! dispatch → response build → write → close.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, broadcast};

use crate::buffer::BufferPool;
use crate::config::ConfigRuntime;
use crate::onvif::{ServiceDispatcher, SoapContext};

use super::auth::{AuthDecision, check_basic_auth};
use super::parser::{HttpParseError, HttpParser, HttpRequest, ParseStatus};
use super::response::{HttpResponse, ResponseBuilder};

/// Bound on concurrently served connections.
pub const MAX_WORKERS: usize = 16;

/// Per-connection receive timeout.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Initial connection read buffer size.
const READ_CHUNK: usize = 4096;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_workers: usize,
    pub recv_timeout: Duration,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_workers: MAX_WORKERS,
            recv_timeout: RECV_TIMEOUT,
        }
    }
}

/// Shared state handed to every worker.
#[derive(Clone)]
pub struct ServerState {
    pub dispatcher: Arc<ServiceDispatcher>,
    pub pool: Arc<BufferPool>,
    pub config: Arc<ConfigRuntime>,
}

/// The ONVIF HTTP server.
pub struct HttpServer {
    config: HttpServerConfig,
    state: ServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: ServerState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Bind the listener. Port 0 selects an ephemeral port (tests).
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        TcpListener::bind(&addr).await
    }

    /// Signal the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Receiver for the shutdown signal.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Accept loop. Runs until shutdown is signalled.
    pub async fn run(&self, listener: TcpListener) {
        let workers = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "ONVIF HTTP server listening");
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("HTTP server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let permit = match Arc::clone(&workers).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };

                    let state = self.state.clone();
                    let recv_timeout = self.config.recv_timeout;
                    tokio::spawn(async move {
                        serve_connection(stream, state, recv_timeout).await;
                        drop(permit);
                    });
                }
            }
        }
    }
}

/// Serve one connection end to end.
async fn serve_connection(mut stream: TcpStream, state: ServerState, recv_timeout: Duration) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut parser = HttpParser::new();

    let response = loop {
        let read = tokio::time::timeout(recv_timeout, stream.read_buf(&mut buffer)).await;
        match read {
            Ok(Ok(0)) => {
                if !buffer.is_empty() {
                    tracing::debug!(peer = %peer, "connection closed mid-request");
                }
                return;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::debug!(peer = %peer, error = %e, "read error");
                return;
            }
            Err(_) => {
                tracing::debug!(peer = %peer, "receive timeout");
                return;
            }
        }

        match parser.advance(&buffer) {
            Ok(ParseStatus::NeedMore) => continue,
            Ok(ParseStatus::Complete) => {
                let request = parser.request(&buffer);
                break handle_request(&request, &state).await;
            }
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "request rejected");
                break parse_error_response(&state, &e);
            }
        }
    };

    write_response(&mut stream, &response).await;
}

fn parse_error_response(state: &ServerState, error: &HttpParseError) -> HttpResponse {
    let builder = ResponseBuilder::new(&state.pool);
    match error {
        HttpParseError::PayloadTooLarge(_) => builder.text(413, "payload too large"),
        HttpParseError::UnsupportedMethod(_) => builder.text(405, "method not allowed"),
        HttpParseError::InvalidRequest(_) => builder.text(400, "bad request"),
    }
}

/// Map a request path to its registry service name.
fn service_for_path(path: &str) -> Option<&'static str> {
    match path {
        "/onvif/device_service" => Some("device"),
        "/onvif/media_service" => Some("media"),
        "/onvif/imaging_service" => Some("imaging"),
        "/onvif/ptz_service" => Some("ptz"),
        _ => None,
    }
}

/// Run one parsed request through the ONVIF pipeline.
async fn handle_request(request: &HttpRequest<'_>, state: &ServerState) -> HttpResponse {
    let builder = ResponseBuilder::new(&state.pool);

    if check_basic_auth(&state.config, request.header("authorization")) == AuthDecision::Denied {
        return builder.unauthorized();
    }

    let Some(service) = service_for_path(request.path) else {
        return builder.text(404, "not found");
    };
    if request.method != "POST" {
        return builder.text(404, "not found");
    }

    let mut ctx = match SoapContext::parse(request.body) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::debug!(service = service, error = %e, "SOAP parse failed");
            return builder.soap(e.http_status(), &e.to_soap_fault());
        }
    };

    let operation = ctx.operation().to_string();
    // Dispatch errors are already rendered into the context as faults.
    let _ = state.dispatcher.dispatch(service, &operation, &mut ctx).await;

    builder.soap(ctx.http_status(), ctx.response_data())
}

async fn write_response(stream: &mut TcpStream, response: &HttpResponse) {
    let head = response.encode_head();
    if let Err(e) = stream.write_all(&head).await {
        tracing::debug!(error = %e, "response head write failed");
        return;
    }
    if let Err(e) = stream.write_all(response.body.as_slice()).await {
        tracing::debug!(error = %e, "response body write failed");
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}
