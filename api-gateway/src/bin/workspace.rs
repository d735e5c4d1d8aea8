//! Workspace Lambda - Tutoring sessions, chat turns and the resource library.
//!
//! Endpoints:
//! - POST /v1/sessions - Start a session
//! - GET /v1/sessions/{id} - Session snapshot (log, library, panels, mode)
//! - DELETE /v1/sessions/{id} - Drop a session
//! - POST /v1/sessions/{id}/reset - New session
//! - POST /v1/sessions/{id}/messages - Send a chat turn
//! - POST /v1/sessions/{id}/mode - Toggle tutoring / evaluation
//! - POST /v1/sessions/{id}/documents - Upload a PNG
//! - PUT /v1/sessions/{id}/context - Attach or detach a library resource
//!
//! Sessions are held in memory for the life of the execution environment;
//! nothing is persisted. Deploy with reserved concurrency of 1 so every
//! request for a session reaches the environment that holds it.

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use shared::http::{domain_error_response, error_response, ok_response};
use shared::{parse_body, BedrockGateway, Config, IngestOrigin, TutorService, UploadedFile};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use validator::Validate;

/// Send message request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    /// May be blank when a resource is attached
    #[serde(default)]
    #[validate(length(max = 8000))]
    message: String,
    #[serde(default)]
    use_search: bool,
}

/// Upload request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct IngestDocumentRequest {
    #[validate(length(min = 1, max = 255))]
    file_name: String,
    #[serde(default)]
    mime_type: String,
    /// Base64 payload or data URL
    #[validate(length(min = 1))]
    data: String,
    #[serde(default)]
    origin: IngestOrigin,
}

/// Attach context request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachContextRequest {
    document_id: Option<Uuid>,
}

/// Created session response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionCreatedResponse {
    session_id: Uuid,
    snapshot: shared::ConversationSnapshot,
}

/// Application state shared across requests.
struct AppState {
    tutor: TutorService,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| e.to_string())?;
        let gateway = BedrockGateway::from_config(&config).await;

        info!(
            "Workspace configured: region={}, model={}, analysis_model={}",
            config.aws_region, config.model_id, config.analysis_model_id
        );

        Ok(Self {
            tutor: TutorService::new(Arc::new(gateway), &config),
        })
    }
}

/// Turn a domain result into a JSON response.
fn respond<T: Serialize>(status: u16, result: shared::Result<T>) -> Result<Response<Body>, Error> {
    match result {
        Ok(data) => ok_response(status, data),
        Err(e) => {
            warn!("Request failed: {}", e);
            domain_error_response(&e)
        }
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str().to_string();
    let path = event.uri().path().trim_matches('/').to_string();
    let path_parts: Vec<&str> = path.split('/').collect();

    info!("Workspace request: {} /{}", method, path);

    match (method.as_str(), path_parts.as_slice()) {
        ("POST", ["v1", "sessions"]) => {
            let session_id = state.tutor.create_session().await;
            let snapshot = state.tutor.snapshot(session_id).await;
            respond(
                201,
                snapshot.map(|snapshot| SessionCreatedResponse {
                    session_id,
                    snapshot,
                }),
            )
        }
        (_, ["v1", "sessions", id, rest @ ..]) => {
            let session_id = match Uuid::parse_str(id) {
                Ok(id) => id,
                Err(_) => return error_response(400, "Invalid session ID"),
            };
            handle_session(&state, &event, &method, session_id, rest).await
        }
        _ => error_response(404, "Not found"),
    }
}

async fn handle_session(
    state: &AppState,
    event: &Request,
    method: &str,
    session_id: Uuid,
    rest: &[&str],
) -> Result<Response<Body>, Error> {
    let tutor = &state.tutor;

    match (method, rest) {
        // Snapshot
        ("GET", []) => respond(200, tutor.snapshot(session_id).await),

        ("DELETE", []) => respond(
            200,
            tutor
                .close_session(session_id)
                .await
                .map(|_| serde_json::json!({ "closed": session_id })),
        ),

        // New session
        ("POST", ["reset"]) => {
            if let Err(e) = tutor.reset_session(session_id).await {
                return domain_error_response(&e);
            }
            respond(200, tutor.snapshot(session_id).await)
        }

        // Chat turn
        ("POST", ["messages"]) => {
            let request: SendMessageRequest = parse_body!(event.body());
            if let Err(e) = request.validate() {
                return error_response(400, format!("Invalid request: {}", e));
            }
            respond(
                200,
                tutor
                    .send_message(session_id, &request.message, request.use_search)
                    .await,
            )
        }

        // Mode toggle
        ("POST", ["mode"]) => respond(200, tutor.toggle_mode(session_id).await),

        // Upload
        ("POST", ["documents"]) => {
            let request: IngestDocumentRequest = parse_body!(event.body());
            if let Err(e) = request.validate() {
                return error_response(400, format!("Invalid request: {}", e));
            }
            let file = UploadedFile {
                file_name: request.file_name,
                mime_type: request.mime_type,
                data: request.data,
            };
            respond(
                201,
                tutor.ingest_document(session_id, file, request.origin).await,
            )
        }

        // Active context
        ("PUT", ["context"]) => {
            let request: AttachContextRequest = parse_body!(event.body());
            if let Err(e) = tutor.attach_resource(session_id, request.document_id).await {
                return domain_error_response(&e);
            }
            respond(200, tutor.snapshot(session_id).await)
        }

        _ => error_response(404, "Not found"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
