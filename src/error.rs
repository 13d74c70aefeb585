use std::io;
use thiserror::Error;

/// Rejections produced while resolving a user supplied path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid file path")]
    InvalidPath,

    #[error("Access denied: Path outside root directory")]
    AccessDenied,

    #[error("File type not allowed")]
    TypeNotAllowed,
}

/// Session and anti-forgery token failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing CSRF token")]
    Missing,

    #[error("Invalid or expired CSRF token")]
    InvalidOrExpired,

    #[error("Authentication required")]
    Unauthenticated,
}

/// Failures of a single validated file operation.
#[derive(Error, Debug)]
pub enum FileOpError {
    #[error("Cannot read file: Permission denied")]
    Unreadable,

    #[error("File is too large to view")]
    TooLarge,

    #[error("{0}")]
    BackupFailed(String),

    #[error("{0}")]
    DeleteFailed(String),
}

#[derive(Error, Debug)]
pub enum SfsearchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    FileOp(#[from] FileOpError),

    #[error("Search term too short")]
    QueryTooShort,

    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] aho_corasick::BuildError),

    #[error("Password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("An unexpected error occurred: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SfsearchError>;
