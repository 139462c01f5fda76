//! Host process configuration, loaded from environment variables.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Whether to serve the static client assets alongside the WebSocket
    pub serve_client: bool,
    /// Which origins may talk to us cross-origin
    pub cors_origin: CorsOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigin {
    /// `CORS_ORIGIN=*` (the default): any origin
    Any,
    /// Comma-separated exact-origin allow-list
    AllowList(Vec<HeaderValue>),
}

impl ServerConfig {
    /// Load config from environment variables.
    ///
    /// `PORT` (default 3000), `SERVE_CLIENT` (default on, `0`/`false`
    /// disables), `CORS_ORIGIN` (default `*`, otherwise a comma-separated
    /// list of exact origins; entries that are not valid header values are
    /// skipped with a warning).
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let serve_client = std::env::var("SERVE_CLIENT")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        let cors_origin = match std::env::var("CORS_ORIGIN") {
            Ok(raw) if raw.trim() != "*" => {
                let origins: Vec<HeaderValue> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .filter_map(|o| match HeaderValue::from_str(o) {
                        Ok(v) => Some(v),
                        Err(_) => {
                            tracing::warn!("Ignoring invalid CORS origin: {}", o);
                            None
                        }
                    })
                    .collect();

                if origins.is_empty() {
                    tracing::warn!("CORS_ORIGIN set but no valid origins parsed; cross-origin requests will be rejected");
                }
                CorsOrigin::AllowList(origins)
            }
            _ => CorsOrigin::Any,
        };

        tracing::info!(
            port,
            serve_client,
            cors = ?cors_origin,
            "Server config loaded"
        );

        Self {
            port,
            serve_client,
            cors_origin,
        }
    }

    /// Build the CORS layer matching the configured origin policy.
    pub fn cors_layer(&self) -> CorsLayer {
        match &self.cors_origin {
            CorsOrigin::Any => CorsLayer::permissive(),
            CorsOrigin::AllowList(origins) => CorsLayer::new()
                .allow_origin(origins.clone())
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        }
    }
}
