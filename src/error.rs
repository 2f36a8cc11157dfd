use thiserror::Error;

/// Coarse error taxonomy surfaced to callers of the ledger commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    BadRequest,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::BadRequest => write!(f, "bad_request"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Bad request: cyclic or missing dependency among inModels IDs: {0:?}")]
    UnplaceableTasks(Vec<String>),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("No home directory")]
    NoHomeDir,
}

impl Error {
    /// Map the error onto the four-way taxonomy callers act on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::BadRequest(_)
            | Error::UnplaceableTasks(_)
            | Error::InvalidStatusTransition { .. } => ErrorKind::BadRequest,
            Error::Internal(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::NoHomeDir => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
