//! HTTP/1.1 server implementation

use std::future::Future;
use std::net::SocketAddr;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::handlers::{handle_request, SharedUploader};

pub struct PartwiseServer {
    uploader: SharedUploader,
}

impl PartwiseServer {
    pub fn new(uploader: SharedUploader) -> Self {
        Self { uploader }
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// Connections in flight when `shutdown` resolves are left to finish on
    /// their own tasks.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        info!("partwise server listening on {}", listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            };
            debug!("New connection from {}", remote_addr);

            let uploader = self.uploader.clone();
            tokio::spawn(async move {
                Self::handle_connection(stream, remote_addr, uploader).await;
            });
        }
    }

    async fn handle_connection(stream: TcpStream, remote_addr: SocketAddr, uploader: SharedUploader) {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let uploader = uploader.clone();
            async move { handle_request(req, uploader).await }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            error!("HTTP/1 connection error from {}: {}", remote_addr, err);
        }
    }
}
