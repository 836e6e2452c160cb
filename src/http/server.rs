//! Status-server lifecycle: eager bind, lazy signal-triggered bind, and
//! graceful drain through the root token.
//!
//! The server state is a single mutex-protected record: the configured
//! address (may be empty, meaning "lazy"), a claim flag so the first user
//! signal wins the lazy start exactly once, and the bound address once a
//! listener exists.

use std::net::SocketAddr;
use std::sync::Mutex;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Error;

struct ServerState {
    configured_addr: String,
    lazy_claimed: bool,
    bound_addr: Option<SocketAddr>,
}

/// The control-plane HTTP server.
pub struct StatusServer {
    router: Router,
    root: CancellationToken,
    state: Mutex<ServerState>,
}

impl StatusServer {
    /// Creates an unbound server around the prepared router.
    pub fn new(configured_addr: String, root: CancellationToken, router: Router) -> Self {
        Self {
            router,
            root,
            state: Mutex::new(ServerState {
                configured_addr,
                lazy_claimed: false,
                bound_addr: None,
            }),
        }
    }

    /// The bound address, once a listener exists.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.state.lock().expect("server state poisoned").bound_addr
    }

    /// Claims the one-shot lazy start.
    ///
    /// Returns true exactly once, and only when no address was configured;
    /// later calls (and configured servers) get false so the caller
    /// re-announces instead of rebinding.
    pub fn claim_lazy_start(&self) -> bool {
        let mut state = self.state.lock().expect("server state poisoned");
        if state.configured_addr.is_empty() && !state.lazy_claimed {
            state.lazy_claimed = true;
            true
        } else {
            false
        }
    }

    /// Binds `addr` and serves the router until the root token cancels.
    ///
    /// `announce` writes the resulting address to stderr, which is the
    /// contract for the signal-triggered ephemeral bind; a configured bind
    /// stays quiet apart from the log line.
    pub async fn start(&self, addr: &str, announce: bool) -> Result<SocketAddr, Error> {
        let listener = TcpListener::bind(addr).await.map_err(|e| Error::ServerBind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| Error::ServerBind {
            addr: addr.to_string(),
            source: e,
        })?;

        self.state
            .lock()
            .expect("server state poisoned")
            .bound_addr = Some(local_addr);

        info!(address = %local_addr, "starting HTTP server");
        if announce {
            eprintln!("started HTTP server on {local_addr}");
        }

        let router = self.router.clone();
        let token = self.root.clone();
        tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            match axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                Ok(()) => info!("stopped HTTP server"),
                Err(e) => info!(error = %e, "stopped HTTP server"),
            }
        });
        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(configured: &str) -> StatusServer {
        StatusServer::new(
            configured.to_string(),
            CancellationToken::new(),
            Router::new(),
        )
    }

    #[test]
    fn lazy_claim_fires_once_and_only_without_address() {
        let lazy = server("");
        assert!(lazy.claim_lazy_start());
        assert!(!lazy.claim_lazy_start());

        let configured = server("127.0.0.1:8289");
        assert!(!configured.claim_lazy_start());
    }

    #[tokio::test]
    async fn start_binds_an_ephemeral_port() {
        let server = server("");
        let addr = server.start("127.0.0.1:0", false).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.bound_addr(), Some(addr));
    }

    #[tokio::test]
    async fn bind_failure_is_a_server_bind_error() {
        let server = server("");
        let err = server.start("definitely-not-an-addr", false).await.unwrap_err();
        assert_eq!(err.as_label(), "server_bind");
    }
}
