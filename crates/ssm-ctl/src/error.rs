//! error taxonomy shared by the loading, resolution and store layers

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed parameter document
    #[error("{0}")]
    Schema(String),
    /// Missing or invalid operator input
    #[error("{0}")]
    Input(String),
    #[error("Conflicting input types for {0}")]
    TypeConflict(String),
    #[error("Conflicting input patterns for {0}")]
    PatternConflict(String),
    /// A variable was read before the resolution pass bound it
    #[error("Unresolved variable {0}")]
    UnresolvedVariable(String),
    #[error("Invalid parameter names {}", .0.join(", "))]
    InvalidParameters(Vec<String>),
    #[error("Parameter {0} not found")]
    ParameterNotFound(String),
    #[error("Failed to put parameters {}", .0.join(", "))]
    PutFailed(Vec<String>),
    #[error("Parameter store error: {0}")]
    Store(String),
    #[error("Encryption error: {0}")]
    Crypto(String),
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("Unable to process yaml")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Error::Schema(message.into())
    }

    pub(crate) fn input(message: impl Into<String>) -> Self {
        Error::Input(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
