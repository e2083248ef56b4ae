use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type.
///
/// Everything that can go wrong below the HTTP layer funnels into this enum;
/// handlers bubble it up with `?` and the [`IntoResponse`] impl decides what
/// the browser sees. Internal detail stays in the server logs.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("password hashing error: {0}")]
    PasswordHash(String),

    #[error("email already registered")]
    EmailTaken,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            // Handlers intercept this one; reaching here means a form went
            // around the registration flow
            AppError::EmailTaken => {
                (StatusCode::BAD_REQUEST, Html("<p>Email already registered.</p>")).into_response()
            }
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<h1>Something went wrong</h1><p>The problem has been logged.</p>"),
                )
                    .into_response()
            }
        }
    }
}
