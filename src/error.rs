use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("already exists")]
    AlreadyExists,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid credential")]
    InvalidCredential,

    #[error("credential expired")]
    CredentialExpired,

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("field {field} is not queryable on collection {collection}")]
    UnindexedField { collection: String, field: String },
}

pub type Result<T> = std::result::Result<T, Error>;
