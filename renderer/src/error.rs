use std::path::PathBuf;

use thiserror::Error;

/// Failures while evaluating expressions and statements.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("{0} is not defined")]
    UndefinedVariable(String),

    #[error("assignment to undeclared variable '{0}'")]
    UndeclaredAssignment(String),

    #[error("cannot read property '{property}' of {target}")]
    PropertyOfNothing {
        property: String,
        target: &'static str,
    },

    #[error("{0} is not iterable")]
    NotIterable(&'static str),

    #[error("import context must be an object, got {0}")]
    ContextNotObject(&'static str),

    #[error("'{0}' is a reserved name and may not be used as a data key")]
    ReservedName(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function}(): {message}")]
    BadArguments { function: String, message: String },

    #[error("loop exceeded {0} iterations")]
    IterationLimit(usize),
}

impl RuntimeError {
    pub(crate) fn bad_arguments(function: &str, message: impl Into<String>) -> Self {
        RuntimeError::BadArguments {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// Invalid configuration values or files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be boolean, got '{value}'")]
    NotBoolean { key: String, value: String },

    #[error("{key} must be a non-negative integer, got '{value}'")]
    NotInteger { key: String, value: String },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
