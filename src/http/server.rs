use crate::app::Squehub;
use crate::error::{Error, Result};
use crate::http::Response;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server as HyperServer;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// hyper front end for a [`Squehub`] application
pub struct Server {
    app: Arc<Squehub>,
}

impl Server {
    pub fn new(app: Squehub) -> Self {
        Self { app: Arc::new(app) }
    }

    /// Serve until SIGINT or SIGTERM, then let in-flight requests finish
    pub async fn serve(self, addr: &str) -> Result<()> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::config(format!("Invalid address '{}': {}", addr, e)))?;

        let app = self.app;
        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let app = Arc::clone(&app);
            let remote = conn.remote_addr();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let app = Arc::clone(&app);
                    async move {
                        let response = app.handle_request(req).await.unwrap_or_else(|e| {
                            log::error!("Unreadable request from {}: {}", remote, e);
                            Response::internal_error()
                        });
                        Ok::<_, Infallible>(response.into_hyper())
                    }
                }))
            }
        });

        let server = HyperServer::try_bind(&addr)
            .map_err(|e| Error::config(format!("Cannot bind {}: {}", addr, e)))?
            .serve(make_svc);
        log::info!("Squehub listening on http://{}", server.local_addr());

        server.with_graceful_shutdown(shutdown_signal()).await?;
        log::info!("Server stopped");
        Ok(())
    }
}

/// Resolves on the first SIGINT or SIGTERM (Ctrl+C elsewhere)
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Cannot install signal handlers, serving without graceful shutdown: {}", e);
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => log::info!("SIGTERM received, shutting down"),
            _ = sigint.recv() => log::info!("SIGINT received, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl+C, serving without graceful shutdown: {}", e);
            return std::future::pending().await;
        }
        log::info!("Ctrl+C received, shutting down");
    }
}
