use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Username already taken: {0}")]
    DuplicateUsername(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::StoreUnavailable(e.to_string())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::StoreUnavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::SEE_OTHER,
            AppError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateUsername(_) => StatusCode::CONFLICT,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the visitor.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound => "We couldn't find that page or dog.".to_string(),
            AppError::Unauthorized => "Please log in first.".to_string(),
            AppError::MalformedInput(msg) => msg.clone(),
            AppError::DuplicateUsername(name) => {
                format!("The username \"{}\" is already taken.", name)
            }
            AppError::InvalidCredentials => "Invalid username or password.".to_string(),
            AppError::StoreUnavailable(_) => {
                "The dog records are unavailable right now. Please try again shortly.".to_string()
            }
            AppError::Internal(_) => "Something went wrong on our side.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "pages/error.html")]
struct ErrorTemplate {
    viewer: Option<String>,
    status: u16,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Unauthorized => return Redirect::to("/login").into_response(),
            AppError::StoreUnavailable(e) => tracing::error!("Store error: {}", e),
            AppError::Internal(e) => tracing::error!("Internal error: {}", e),
            _ => {}
        }

        let status = self.status();
        let page = ErrorTemplate {
            viewer: None,
            status: status.as_u16(),
            message: self.public_message(),
        };

        match page.render() {
            Ok(body) => (
                status,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (status, self.public_message()).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
