use thiserror::Error;

#[derive(Debug, Error)]
pub enum KryptorError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("incorrect password/key, or this file has been tampered with")]
    TamperOrWrongKey,

    #[error("unsupported kryptor format or version")]
    UnsupportedFormat,

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, KryptorError>;
