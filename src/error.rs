use std::io;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LsmLiteError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("key not found")]
    KeyNotFound,

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<io::Error> for LsmLiteError {
    fn from(e: io::Error) -> Self {
        LsmLiteError::Io(e.to_string())
    }
}
