use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

use api_types::ErrorBody;
pub use auth::{Claims, Session, TokenKeys};
pub use server::{ServerState, router, run_with_listener, spawn_with_listener};

mod account;
mod auth;
mod categories;
mod groups;
mod server;
mod transactions;
mod users;
mod validation;

#[derive(Debug)]
pub enum ServerError {
    Engine(EngineError),
    /// Rejected request: malformed body, failed validation.
    Generic(String),
    /// Missing or invalid credentials, or a caller without the required
    /// role or membership.
    Unauthorized(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Database(_) | EngineError::Password(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::NotFound(_)
        | EngineError::AlreadyExists(_)
        | EngineError::InvalidInput(_)
        | EngineError::WrongCredentials
        | EngineError::Forbidden(_) => StatusCode::BAD_REQUEST,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        EngineError::Password(hash_err) => {
            tracing::error!("password hashing error: {hash_err}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), message_for_engine_error(err)),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
            ServerError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err),
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
