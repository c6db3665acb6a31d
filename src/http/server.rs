//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap a tier's router in the shared layers (request ID, tracing)
//! - Serve it on a bound listener with peer addresses attached
//! - Stop accepting when the listener token is cancelled, then let
//!   in-flight requests finish
//!
//! Layer order, outermost first: set request ID → trace → propagate request
//! ID → tier router.

use std::io;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::request::UuidRequestId;

/// An HTTP server for one tier.
pub struct HttpServer {
    name: &'static str,
    router: Router,
}

impl HttpServer {
    /// Wrap `router` with the shared middleware stack.
    pub fn new(name: &'static str, router: Router) -> Self {
        let router = router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId));
        Self { name, router }
    }

    /// Run the server on its own task.
    pub fn spawn(self, listener: TcpListener, stop: CancellationToken) -> JoinHandle<io::Result<()>> {
        tokio::spawn(self.run(listener, stop))
    }

    /// Serve until `stop` is cancelled and every open request has completed.
    pub async fn run(self, listener: TcpListener, stop: CancellationToken) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(server = self.name, address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(stop.cancelled_owned())
            .await?;

        tracing::info!(server = self.name, "HTTP server stopped");
        Ok(())
    }
}
