use thiserror::Error;

/// Errors loading or validating a program.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid program JSON at line {line}, column {column}: {message}")]
    Json {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("cannot encode program: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("duplicate variable '{name}'")]
    DuplicateVariable { name: String },

    #[error("duplicate event '{name}'")]
    DuplicateEvent { name: String },

    #[error("event '{event}' references unknown variable '{var}'")]
    UnknownVariable { event: String, var: String },

    #[error("event '{event}' increments '{var}' with non-positive modulus {modulus}")]
    BadModulus {
        event: String,
        var: String,
        modulus: i64,
    },
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Json {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
