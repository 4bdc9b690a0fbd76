// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::get,
};
use panserve_base::readable_size::ReadableSize;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    BindSnafu, ParseAddressSnafu, Result, ServiceHandler,
    error::{ApiError, NotFoundSnafu},
};

/// Default maximum HTTP request body size (1 MB). Download routes take
/// their parameters from the path and query string.
pub const DEFAULT_MAX_HTTP_BODY_SIZE: ReadableSize = ReadableSize::mb(1);

/// Configuration options for a REST server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct RestServerConfig {
    /// The address to bind the REST server
    #[default = "127.0.0.1:7090"]
    #[builder(default = "127.0.0.1:7090".to_string(), into)]
    pub bind_address:  String,
    /// Maximum HTTP request body size
    #[default(_code = "DEFAULT_MAX_HTTP_BODY_SIZE")]
    #[builder(default = DEFAULT_MAX_HTTP_BODY_SIZE)]
    pub max_body_size: ReadableSize,
    /// Whether to enable CORS
    #[default = true]
    #[builder(default = true)]
    pub enable_cors:   bool,
}

/// Binds the configured address, spawns the server and returns a handle for
/// its lifecycle.
///
/// Every route handler is applied to the router before the middleware
/// (request tracing, body limit, optional CORS), so the middleware wraps
/// all registered routes.
///
/// # Errors
/// Returns an error if the bind address cannot be parsed or bound.
///
/// # Example
///
/// ```rust,no_run
/// use axum::{Router, routing::get};
/// use panserve_server::http::{RestServerConfig, start_rest_server};
///
/// fn my_routes(router: Router) -> Router {
///     router.route("/api/v1/hello", get(|| async { "Hello, World!" }))
/// }
///
/// # async fn run() -> panserve_server::Result<()> {
/// let handle = start_rest_server(RestServerConfig::default(), vec![my_routes]).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_rest_server<F>(
    config: RestServerConfig,
    route_handlers: Vec<F>,
) -> Result<ServiceHandler>
where
    F: Fn(Router) -> Router + Send + Sync + 'static,
{
    let bind_addr = config
        .bind_address
        .parse::<std::net::SocketAddr>()
        .context(ParseAddressSnafu {
            addr: config.bind_address.clone(),
        })?;

    let mut router = Router::new().route("/health", get(health_check));
    for handler in &route_handlers {
        router = handler(router);
    }
    info!("Registered {} REST route handlers", route_handlers.len());

    router = router
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(config.max_body_size.as_bytes_usize()))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);
        router = router.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context(BindSnafu {
            addr: config.bind_address.clone(),
        })?;
    let local_addr = listener.local_addr().context(BindSnafu {
        addr: config.bind_address.clone(),
    })?;

    let cancellation_token = CancellationToken::new();
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let shutdown = cancellation_token.clone();
    let join_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                info!("REST server (on {}) started", local_addr);
                let _ = started_tx.send(());
                shutdown.cancelled().await;
                info!("REST server (on {}) received shutdown signal", local_addr);
            })
            .await;

        info!("REST server (on {}) task completed: {:?}", local_addr, result);
    });

    Ok(ServiceHandler {
        join_handle,
        cancellation_token,
        started_rx: Some(started_rx),
        local_addr,
    })
}

/// Liveness probe.
async fn health_check() -> impl IntoResponse { (StatusCode::OK, "OK") }

async fn fallback(uri: Uri) -> ApiError {
    NotFoundSnafu {
        resource: uri.path(),
    }
    .build()
}

/// Health check handler that returns detailed health information
async fn api_health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "panserve",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Add detailed health routes to the router.
pub fn health_routes(router: Router) -> Router {
    router
        .route("/api/v1/health", get(api_health_handler))
        .route("/api/health", get(api_health_handler))
}
