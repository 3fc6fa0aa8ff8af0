//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for starting and cancelling
//! forwarding tasks, reading progress and history, and following events.

use crate::{ChatForwarder, Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks
/// - `POST /tasks` - Start a forwarding task
/// - `GET /tasks` - List running tasks
/// - `GET /users/:user_id/task` - Progress of a user's running task
/// - `DELETE /users/:user_id/task` - Cancel a user's running task
///
/// ## History
/// - `GET /history` - Finished tasks (with pagination)
/// - `DELETE /history` - Clear history
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
/// - `POST /shutdown` - Graceful shutdown
pub fn create_router(forwarder: Arc<ChatForwarder>, config: Arc<Config>) -> Router {
    let state = AppState::new(forwarder, config.clone());

    let router = Router::new()
        // Tasks
        .route("/tasks", post(routes::start_task))
        .route("/tasks", get(routes::list_tasks))
        .route("/users/:user_id/task", get(routes::get_user_task))
        .route("/users/:user_id/task", delete(routes::cancel_user_task))
        // History
        .route("/history", get(routes::get_history))
        .route("/history", delete(routes::clear_history))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .route("/shutdown", post(routes::shutdown));

    // SwaggerUi reuses the /openapi.json document defined above
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin. All methods and headers are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops, either on an error or when the process exits.
///
/// # Example
///
/// ```no_run
/// use chat_forwarder::{ChatForwarder, ClientProvider, Config};
/// use std::sync::Arc;
///
/// # async fn example(provider: Arc<dyn ClientProvider>) -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let forwarder = Arc::new(ChatForwarder::new((*config).clone(), provider).await?);
///
/// // Start API server (blocks until shutdown)
/// chat_forwarder::api::start_api_server(forwarder, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(forwarder: Arc<ChatForwarder>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(forwarder, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
