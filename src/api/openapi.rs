//! OpenAPI documentation and schema generation
//!
//! The document is generated at compile time with utoipa and served from
//! `/api/v1/openapi.json`, with Swagger UI at `/swagger-ui` when enabled.

use utoipa::OpenApi;

/// OpenAPI documentation for the chat-forwarder REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "chat-forwarder REST API",
        version = "0.1.0",
        description = "REST API for starting, monitoring and cancelling bulk chat forwarding tasks",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790/api/v1", description = "Local development server")
    ),
    paths(
        // Tasks
        crate::api::routes::start_task,
        crate::api::routes::list_tasks,
        crate::api::routes::get_user_task,
        crate::api::routes::cancel_user_task,

        // History
        crate::api::routes::get_history,
        crate::api::routes::clear_history,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
        crate::api::routes::shutdown,
    ),
    components(schemas(
        crate::types::UserId,
        crate::types::TaskId,
        crate::types::TaskStatus,
        crate::types::ForwardMode,
        crate::types::ContentKind,
        crate::types::TaskConfig,
        crate::types::ProgressSnapshot,
        crate::types::ProgressReport,
        crate::types::HistoryEntry,
        crate::types::WebhookPayload,
        crate::types::Event,

        crate::api::routes::StartTaskBody,
        crate::api::routes::TaskIdResponse,
        crate::api::routes::HistoryQuery,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Forwarding tasks - Start, inspect and cancel per-user tasks"),
        (name = "history", description = "Task history - Finished, cancelled and failed tasks"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events, shutdown"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the API key header scheme
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
