//! HTTP/1.1 server

use crate::handlers::{handle, AppState};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub struct CarelinkServer {
    state: Arc<AppState>,
}

impl CarelinkServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn serve(self, addr: SocketAddr, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener, shutdown).await
    }

    /// Accept connections on an already bound listener until `shutdown`
    /// resolves. In-flight connections are left to finish on their own.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "carelink server listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    debug!(%remote_addr, "new connection");

                    let state = self.state.clone();
                    tokio::spawn(async move {
                        Self::handle_connection(stream, remote_addr, state).await;
                    });
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_connection(stream: TcpStream, remote_addr: SocketAddr, state: Arc<AppState>) {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let state = state.clone();
            async move { Ok::<_, Infallible>(handle(&state, req).await) }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            debug!(%remote_addr, error = %err, "connection closed with error");
        }
    }
}
