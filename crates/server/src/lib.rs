//! HTTP server for the docchat backend
//!
//! Exposes the ingestion trigger and the question-answering endpoint plus
//! document status/deletion and health probes. Auth, upload storage and the
//! chat UI live in other services; this surface starts where a file is
//! already on disk and a user is already authenticated.

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;
