use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OrbError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {program}")]
    #[diagnostic(help("check that the program is installed and on PATH"))]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{label} was cancelled")]
    Cancelled { label: String },

    #[error("failed to read machine inventory: {message}")]
    Inventory { message: String },

    #[error("{label} failed with exit code {}: {stderr}", display_code(.exit_code))]
    CommandFailed {
        label: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}
