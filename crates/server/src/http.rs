//! HTTP endpoints
//!
//! REST API for document ingestion and question answering.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use docchat_core::Document;
use docchat_rag::{Answer, ProviderErrorKind, RagError};

use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );

    Router::new()
        // Document lifecycle
        .route("/api/documents", post(register_document))
        .route(
            "/api/documents/:id",
            get(get_document).delete(delete_document),
        )
        .route("/api/documents/:id/ingest", post(reingest_document))
        // Question answering
        .route("/api/documents/:id/ask", post(ask_question))
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// An empty origin list defaults to localhost:3000 rather than a wildcard.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(%origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

// Request/response types

#[derive(Debug, Deserialize)]
struct RegisterDocumentRequest {
    user_id: Uuid,
    name: String,
    /// Path under which the storage collaborator saved the upload
    file_path: String,
    #[serde(default)]
    size_bytes: i64,
}

#[derive(Debug, Serialize)]
struct DocumentResponse {
    id: Uuid,
    name: String,
    status: &'static str,
    page_count: Option<i32>,
    chunk_count: Option<i32>,
    error_message: Option<String>,
}

impl From<&Document> for DocumentResponse {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name.clone(),
            status: doc.status.as_str(),
            page_count: doc.page_count,
            chunk_count: doc.chunk_count,
            error_message: doc.error_message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    query: String,
    user_id: Uuid,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<docchat_rag::SourceRef>,
    metadata: AskMetadata,
}

#[derive(Debug, Serialize)]
struct AskMetadata {
    model: String,
    chunks_retrieved: usize,
    used_rag: bool,
    query_type: docchat_rag::QueryType,
    strategy: String,
}

impl From<Answer> for AskResponse {
    fn from(answer: Answer) -> Self {
        Self {
            answer: answer.text,
            sources: answer.sources,
            metadata: AskMetadata {
                model: answer.model,
                chunks_retrieved: answer.chunks_retrieved,
                used_rag: answer.used_rag,
                query_type: answer.query_type,
                strategy: answer.strategy,
            },
        }
    }
}

// Handlers

/// Register an uploaded document and kick off background ingestion
///
/// Responds immediately with 202; the client polls `GET /api/documents/:id`
/// for completion.
async fn register_document(
    State(state): State<AppState>,
    Json(request): Json<RegisterDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    if request.name.trim().is_empty() || request.file_path.trim().is_empty() {
        return Err(ApiError::bad_request("name and file_path are required"));
    }

    let document = state
        .documents
        .create(docchat_core::NewDocument {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            name: request.name,
            file_path: request.file_path.clone(),
            size_bytes: request.size_bytes,
        })
        .await?;

    state.ingest.clone().spawn(document.id, request.file_path);

    Ok((StatusCode::ACCEPTED, Json(DocumentResponse::from(&document))))
}

/// Re-run ingestion for an existing document (e.g. after a failure)
async fn reingest_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let document = state
        .documents
        .get(id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    state.ingest.clone().spawn(document.id, document.file_path.clone());

    Ok((StatusCode::ACCEPTED, Json(DocumentResponse::from(&document))))
}

/// Document status poll
async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document = state
        .documents
        .get(id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(DocumentResponse::from(&document)))
}

/// Delete a document and its chunks
async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .documents
        .get(id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    state.documents.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Answer a question against a document
async fn ask_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let answer = state.qa.ask(&request.query, id, request.user_id).await?;
    Ok(Json(AskResponse::from(answer)))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness: the database must be reachable
async fn readiness_check(State(state): State<AppState>) -> Response {
    if state.db.ping().await {
        Json(serde_json::json!({"status": "ready"})).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded", "database": "unreachable"})),
        )
            .into_response()
    }
}

// Error mapping

/// API error with a stable status code and user-legible message
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Document not found".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::InvalidQuery => StatusCode::BAD_REQUEST,
            RagError::DocumentNotFound => StatusCode::NOT_FOUND,
            RagError::DocumentProcessing | RagError::DocumentFailed(_) => StatusCode::CONFLICT,
            RagError::EmptyDocument => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Provider { kind, .. } => match kind {
                ProviderErrorKind::RateLimit | ProviderErrorKind::Server => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ProviderErrorKind::Auth | ProviderErrorKind::Unknown => StatusCode::BAD_GATEWAY,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &err {
            // Internal detail stays in the logs, not the response body
            RagError::Store(_) | RagError::Configuration(_) => {
                tracing::error!(error = %err, "Internal error");
                "Internal server error".to_string()
            }
            RagError::ServiceUnavailable(_) => {
                "The retrieval service is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        Self { status, message }
    }
}

impl From<docchat_core::Error> for ApiError {
    fn from(err: docchat_core::Error) -> Self {
        tracing::error!(error = %err, "Internal error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.message,
            "status": self.status.as_u16(),
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_error_status_mapping() {
        let cases: Vec<(RagError, StatusCode)> = vec![
            (RagError::InvalidQuery, StatusCode::BAD_REQUEST),
            (RagError::DocumentNotFound, StatusCode::NOT_FOUND),
            (RagError::DocumentProcessing, StatusCode::CONFLICT),
            (
                RagError::DocumentFailed("boom".to_string()),
                StatusCode::CONFLICT,
            ),
            (RagError::EmptyDocument, StatusCode::UNPROCESSABLE_ENTITY),
            (
                RagError::ServiceUnavailable("down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RagError::Provider {
                    kind: ProviderErrorKind::RateLimit,
                    message: "busy".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RagError::Provider {
                    kind: ProviderErrorKind::Auth,
                    message: "denied".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                RagError::Store("sql".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let api_err = ApiError::from(err);
            assert_eq!(api_err.status(), expected);
        }
    }

    #[test]
    fn test_internal_detail_does_not_leak() {
        let api_err = ApiError::from(RagError::Store("relation missing: secrets".to_string()));
        assert_eq!(api_err.message, "Internal server error");

        let api_err = ApiError::from(RagError::ServiceUnavailable(
            "connect 10.0.0.3:8080 refused".to_string(),
        ));
        assert!(!api_err.message.contains("10.0.0.3"));
    }

    #[test]
    fn test_document_state_message_surfaces() {
        let api_err = ApiError::from(RagError::DocumentFailed(
            "extraction produced no text".to_string(),
        ));
        assert!(api_err.message.contains("extraction produced no text"));
    }
}
