//! The `platter serve` command: the image endpoint over HTTP.
//!
//! Routes:
//! - `GET /image?target=<url>&referer=<url>` re-hosts `target` and answers
//!   with a redirect (or the bytes), or the fallback image on any failure
//! - `GET /images/{file}` serves stored objects by key
//! - `GET /healthz`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Args;
use platter_core::{Config, ImageRequest, ImageType, Ingestor, OutboundResponse};
use serde::Deserialize;

type AppState = Arc<Ingestor>;

/// Arguments for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on (defaults to `server.bind`)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,
}

/// Query string of the image endpoint.
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub target: Option<String>,
    pub referer: Option<String>,
}

/// Execute the serve command.
pub async fn execute(args: ServeArgs, config: Config) -> anyhow::Result<()> {
    let bind = match args.bind {
        Some(addr) => addr,
        None => config.server.bind.parse().map_err(|e| {
            anyhow::anyhow!("Invalid server.bind '{}': {e}", config.server.bind)
        })?,
    };

    let ingestor = Ingestor::from_config(&config)?;
    tracing::info!(
        backend = ingestor.store().backend_name(),
        "Image pipeline ready"
    );
    let app = router(Arc::new(ingestor));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Build the HTTP router around a shared ingestor.
pub fn router(ingestor: AppState) -> Router {
    Router::new()
        .route("/image", get(image))
        .route("/images/{file}", get(stored_object))
        .route("/healthz", get(healthz))
        .with_state(ingestor)
}

async fn image(
    State(ingestor): State<AppState>,
    query: Result<Query<ImageQuery>, QueryRejection>,
) -> Served {
    let Ok(Query(query)) = query else {
        tracing::debug!("Unparseable query string, serving fallback");
        return Served(ingestor.policy().fallback());
    };
    let Some(target) = query.target.filter(|t| !t.trim().is_empty()) else {
        return Served(ingestor.policy().fallback());
    };

    let mut request = ImageRequest::new(target);
    if let Some(referer) = query.referer {
        request = request.with_referer(referer);
    }
    Served(ingestor.handle(&request).await)
}

async fn stored_object(State(ingestor): State<AppState>, Path(file): Path<String>) -> Response {
    let key = format!("images/{file}");
    match ingestor.store().get(&key).await {
        Ok(Some(bytes)) => {
            let content_type = file
                .rsplit_once('.')
                .and_then(|(_, ext)| ImageType::from_extension(ext))
                .map(|t| t.mime())
                .unwrap_or("application/octet-stream");
            let cache_control = ingestor.policy().asset_cache_control();

            let mut response = Response::new(Body::from(bytes));
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            if let Ok(value) = HeaderValue::from_str(&cache_control) {
                headers.insert(CACHE_CONTROL, value);
            }
            headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
            response
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Stored object read failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Adapter from the framework-independent response to axum's.
struct Served(OutboundResponse);

impl IntoResponse for Served {
    fn into_response(self) -> Response {
        let OutboundResponse {
            status,
            headers,
            body,
        } = self.0;
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
