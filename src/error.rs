use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{what} not found")]
    NotFound { what: &'static str },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("error creating {what}: {source}")]
    CreateFailed {
        what: &'static str,
        source: sqlx::Error,
    },

    #[error("error updating {what}: {source}")]
    UpdateFailed {
        what: &'static str,
        source: sqlx::Error,
    },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("DB error at {path}: {source}")]
    DBInitError { path: String, source: sqlx::Error },

    #[error("DB error {message} - {source}")]
    DBError {
        message: String,
        source: sqlx::Error,
    },

    #[error("Migration error {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Cannot reach object store {message} - {source}")]
    StoreError {
        message: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("password hash error: {0}")]
    PasswordHash(String),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("upload error {0}")]
    Upload(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::CreateFailed { what, .. } => {
                tracing::error!("create failed: {self:?}");
                (StatusCode::BAD_REQUEST, format!("Error creating {what}"))
            }
            AppError::UpdateFailed { what, .. } => {
                tracing::error!("update failed: {self:?}");
                (StatusCode::BAD_REQUEST, format!("Error updating {what}"))
            }
            // same status and same message regardless of which check failed,
            // so the response doesn't leak whether the account exists
            AppError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                "Login infos are not valid, verify and try again".to_string(),
            ),
            AppError::Upload(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => {
                tracing::error!("Server error: {self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Upload(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{err:?}"),
        ))
    }
}

pub(crate) trait DBErrorContext<T> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: ToString + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> DBErrorContext<T> for sqlx::Result<T> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: ToString + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|source| AppError::DBError {
            message: f().to_string(),
            source,
        })
    }
}

pub(crate) trait StoreErrorContext<T, E> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: ToString + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> StoreErrorContext<T, E> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: ToString + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| AppError::StoreError {
            message: f().to_string(),
            source: Box::new(err),
        })
    }
}
