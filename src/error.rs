use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// Malformed header, candidate row or metadata line.
    #[error("format error in {}: {msg}", path.display())]
    Format { path: PathBuf, msg: String },

    /// Candidate table row that could not be parsed.
    #[error("format error in {} line {line}: {msg}", path.display())]
    Row {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    /// I/O request outside the bounds of a file.
    #[error("range error: {0}")]
    Range(String),

    /// Invalid zap specification or channel index.
    #[error("config error: {0}")]
    Config(String),

    /// Misuse of a write stream.
    #[error("stream state error: {0}")]
    State(String),

    /// An external stage exited non-zero or left no output behind.
    #[error("external tool `{tool}` failed: {detail}")]
    ExternalTool { tool: String, detail: String },

    /// Propagated I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    pub(crate) fn format(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        SearchError::Format {
            path: path.into(),
            msg: msg.into(),
        }
    }

    pub(crate) fn tool(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        SearchError::ExternalTool {
            tool: tool.into(),
            detail: detail.into(),
        }
    }

    /// Short name of the error class, used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Format { .. } | SearchError::Row { .. } => "format",
            SearchError::Range(_) => "range",
            SearchError::Config(_) => "config",
            SearchError::State(_) => "state",
            SearchError::ExternalTool { .. } => "external-tool",
            SearchError::Io(_) => "io",
        }
    }
}
