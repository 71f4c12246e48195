//! HTTP API for the Agrohub marketplace.
//!
//! [`build_router`] wires the services of a [`Marketplace`] to axum routes.
//! Requests authenticate with `Authorization: Bearer <token>`; the token
//! comes from completing signup or login with an emailed code, or from the
//! admin login.
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "kisan@example.com"}'
//! ```

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod telemetry;

use std::net::SocketAddr;
use std::time::Duration;

use agrohub::Marketplace;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub marketplace: Marketplace,
}

impl AppState {
    pub const fn new(marketplace: Marketplace) -> Self {
        Self { marketplace }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest("/api", routes::api())
        .merge(routes::health())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves `router` until Ctrl+C or SIGTERM.
pub async fn serve(address: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(address = %address, "[server.start] listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("[server.stop] server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            error!(error = %error, "[server.shutdown] cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("[server.shutdown] received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("[server.shutdown] received SIGTERM");
            }
            Err(error) => {
                error!(error = %error, "[server.shutdown] cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
