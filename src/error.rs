use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("actor is not an active member of this conversation")]
    NotAMember,

    #[error("message not found")]
    MessageNotFound,

    #[error("message has been deleted")]
    MessageDeleted,

    #[error("actor is not the author of this message")]
    NotAuthor,

    #[error("invalid reply target: {0}")]
    InvalidReplyTarget(String),

    #[error("new content is the same as current content")]
    NoOpEdit,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Whether a retry of the same call may succeed (pool exhaustion,
    /// connection loss). Precondition failures are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// HTTP status the transport layer maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotAMember | AppError::NotAuthor => 403,
            AppError::MessageNotFound => 404,
            AppError::MessageDeleted => 410,
            AppError::InvalidReplyTarget(_) | AppError::NoOpEdit => 400,
            AppError::Config(_) | AppError::Database(_) => 500,
        }
    }
}
