//! HTTP listener.
//!
//! Binds a TCP port and drives the dispatcher: one spawned task per
//! connection, HTTP/1.1, requests on a connection handled in order. Script
//! dispatch blocks, so it runs on the blocking pool. Runs until the
//! shutdown signal flips.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{CONTENT_LENGTH, HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::dispatch::{RequestDispatcher, WireResponse};
use crate::logger;

pub struct HttpServer {
    bind_addr: SocketAddr,
    dispatcher: Arc<RequestDispatcher>,
}

impl HttpServer {
    pub fn new(bind_addr: SocketAddr, dispatcher: RequestDispatcher) -> Self {
        Self { bind_addr, dispatcher: Arc::new(dispatcher) }
    }

    /// Bind the listener. Splitting bind from serve lets callers learn the
    /// actual address when binding port 0.
    pub async fn bind(self) -> anyhow::Result<BoundServer> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .context("failed to bind listener")?;
        let local_addr = listener.local_addr().context("no local address")?;
        info!(addr = %local_addr, "weft server listening");
        Ok(BoundServer { listener, dispatcher: self.dispatcher, local_addr })
    }
}

pub struct BoundServer {
    listener: TcpListener,
    dispatcher: Arc<RequestDispatcher>,
    local_addr: SocketAddr,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the shutdown signal is received.
    pub async fn serve(self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    let (stream, peer_addr) = accept_result.context("accept failed")?;
                    let dispatcher = self.dispatcher.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let svc = service_fn(move |req: Request<Incoming>| {
                            let dispatcher = dispatcher.clone();
                            async move {
                                Ok::<_, hyper::Error>(handle_request(dispatcher, req).await)
                            }
                        });

                        if let Err(e) = http1::Builder::new()
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer_addr, error = %e, "connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("weft server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_request(
    dispatcher: Arc<RequestDispatcher>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let request_line = format!("{} {} {:?}", req.method(), req.uri(), req.version());

    // Script runs are synchronous and may block indefinitely; keep them
    // off the async workers.
    let dispatch_method = method.clone();
    let wire = match tokio::task::spawn_blocking(move || dispatcher.dispatch(&dispatch_method, &path))
        .await
    {
        Ok(wire) => wire,
        Err(join_err) => {
            error!(error = %join_err, "dispatch task failed");
            WireResponse::error_page(500)
        }
    };

    logger::log_response(&request_line, wire.status, wire.body.len());

    to_hyper_response(wire, &method)
}

fn to_hyper_response(wire: WireResponse, method: &str) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(wire.status);
    if let Some(header_map) = builder.headers_mut() {
        for (key, value) in &wire.headers {
            // The capability layer does not validate header characters;
            // names the wire cannot frame are skipped here instead.
            match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    header_map.insert(name, value);
                }
                _ => warn!(key = %key, "header not expressible on the wire, skipped"),
            }
        }
        if method == "HEAD" {
            header_map.insert(CONTENT_LENGTH, HeaderValue::from(wire.body.len()));
        }
    }

    let body = if method == "HEAD" { Bytes::new() } else { Bytes::from(wire.body) };
    builder.body(Full::new(body)).unwrap_or_else(|err| {
        error!(error = %err, "failed to build response");
        let mut fallback = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
