use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can abort a hook invocation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed metadata on line {line_number}: {line:?} has no '='")]
    MalformedLine { line_number: usize, line: String },

    #[error("Missing metadata field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {value:?} is not an integer")]
    InvalidFieldFormat { field: String, value: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Raised by the tracking service client; its own context chain is kept.
    #[error(transparent)]
    RemoteService(anyhow::Error),
}
