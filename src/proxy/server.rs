//! Local worker emulator using hyper
//!
//! Serves the worker routing contract on a local port so endpoints can be tried
//! before deploying.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::error::{FlareProxError, Result};
use crate::proxy::handler::{error_response, WorkerHandler};

/// Worker emulator server
pub struct WorkerEmulator {
    addr: String,
    handler: Arc<WorkerHandler>,
}

impl WorkerEmulator {
    pub fn new(addr: impl Into<String>, handler: WorkerHandler) -> Self {
        Self {
            addr: addr.into(),
            handler: Arc::new(handler),
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self.addr.parse().map_err(|_| {
            FlareProxError::InvalidConfig(format!("Invalid emulator address: {}", self.addr))
        })?;

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until shutdown
    #[instrument(skip(self, listener, shutdown), fields(format = %self.handler.format()))]
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("Worker emulator listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            let handler = self.handler.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler).await {
                                    debug!("Connection error from {}: {}", client_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Worker emulator shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a single connection
    async fn handle_connection(
        stream: tokio::net::TcpStream,
        handler: Arc<WorkerHandler>,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req: Request<Incoming>| {
            let handler = handler.clone();

            async move {
                let response = match buffer_request(req).await {
                    Ok(req) => handler.handle(req).await,
                    Err(e) => Err(e),
                };

                Ok::<Response<Full<Bytes>>, Infallible>(
                    response.unwrap_or_else(|e| error_response(&e)),
                )
            }
        });

        http1::Builder::new()
            .serve_connection(io, service)
            .await?;

        Ok(())
    }
}

async fn buffer_request(req: Request<Incoming>) -> Result<Request<Bytes>> {
    let (parts, body) = req.into_parts();
    let bytes = body.collect().await?.to_bytes();
    Ok(Request::from_parts(parts, bytes))
}
