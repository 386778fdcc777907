use axum::extract::multipart::MultipartError;
use axum::http::{self, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("not found")]
    NotFound,
    /// Wrong password. Displays exactly like `NotFound` so callers cannot
    /// probe which pastes exist.
    #[error("not found")]
    Unauthorized,
    #[error("insufficient storage")]
    InsufficientStorage,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("error reading multipart data")]
    Multipart {
        #[from]
        source: MultipartError,
    },
    #[error("http error")]
    Http {
        #[from]
        source: http::Error,
    },
    #[error("database error")]
    Database { source: sqlx::Error },
    #[error("IO error")]
    IO { source: std::io::Error },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("paste content must not be empty")]
    MissingCode,
    #[error("a language must be selected")]
    MissingLanguage,
    #[error("a password is required")]
    MissingPassword,
    #[error("your paste contains spam")]
    Spam,
    #[error("page numbers start at 1")]
    InvalidPage,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::NOT_FOUND,
            AppError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Multipart { .. } => StatusCode::BAD_REQUEST,
            AppError::Http { .. } => StatusCode::BAD_REQUEST,
            AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IO { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status_code, format!("{self}")).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::RowNotFound => AppError::NotFound,
            _ => AppError::Database { source },
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound,
            std::io::ErrorKind::StorageFull => AppError::InsufficientStorage,
            _ => AppError::IO { source },
        }
    }
}
