use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use crate::SearchError;

#[derive(Debug)]
pub struct CliError {
    pub msg: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.msg.fmt(f)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

fn io_suggestion(err: &io::Error) -> &'static str {
    use io::ErrorKind::*;
    match err.kind() {
        NotFound => "Check that the file exists and the path is correct.",
        PermissionDenied => "Check permissions or run as a different user.",
        UnexpectedEof => "File appears truncated or corrupted.",
        WriteZero => "Disk may be full. Free up space and try again.",
        Other if err.raw_os_error() == Some(28) => "Disk may be full. Free up space and try again.",
        _ => "Check permissions or free up disk space.",
    }
}

/// Format a user friendly I/O error message with suggestions.
pub fn format_io_error(operation: &str, path: &Path, err: &io::Error) -> String {
    format!("Error {} '{}': {}. {}", operation, path.display(), err, io_suggestion(err))
}

/// Convert an I/O error into a CLI error with context.
pub fn io_cli_error(operation: &str, path: &Path, err: io::Error) -> CliError {
    CliError {
        msg: format_io_error(operation, path, &err),
        source: Some(Box::new(err)),
    }
}

/// Fail early, naming the path, if `path` cannot be opened for reading.
pub fn check_readable(path: &Path) -> Result<(), CliError> {
    File::open(path)
        .map(drop)
        .map_err(|e| io_cli_error("opening", path, e))
}

/// Simple CLI error from string.
pub fn simple_cli_error(msg: &str) -> CliError {
    CliError {
        msg: msg.to_string(),
        source: None,
    }
}

/// Invalid file extension error.
pub fn extension_error(path: &Path, expected: &str) -> CliError {
    CliError {
        msg: format!(
            "Invalid file extension for '{}'. Expected .{}. Check the input file.",
            path.display(),
            expected
        ),
        source: None,
    }
}

/// Reject paths whose extension is not `expected`.
pub fn require_extension(path: &Path, expected: &str) -> Result<(), CliError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext == expected => Ok(()),
        _ => Err(extension_error(path, expected)),
    }
}

/// Convert a library error into a CLI error with a hint.
pub fn search_cli_error(context: &str, err: SearchError) -> CliError {
    CliError {
        msg: format!("{}: {}", context, cli_hint(&err)),
        source: Some(Box::new(err)),
    }
}

/// Return an actionable hint for a library error variant.
pub fn cli_hint(err: &SearchError) -> String {
    use SearchError::*;
    match err {
        Format { .. } | Row { .. } => format!("{err}. Verify the file is intact."),
        Range(msg) => format!("{msg}. Request lies outside the file."),
        Config(msg) => format!("{msg}. Invalid configuration."),
        State(msg) => format!("{msg}. This is a bug."),
        ExternalTool { .. } => format!("{err}. Check the tool is installed and its log output."),
        Io(io) => format!("{io}. {}", io_suggestion(io)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_checked() {
        assert!(require_extension(Path::new("a.fil"), "fil").is_ok());
        let err = require_extension(Path::new("a.dat"), "fil").unwrap_err();
        assert!(err.to_string().contains("Expected .fil"));
    }

    #[test]
    fn unreadable_input_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.fil");
        let err = check_readable(&missing).unwrap_err();
        assert!(err.msg.starts_with("Error opening '"));
        assert!(err.msg.contains("nope.fil"));
        assert!(err.msg.ends_with("Check that the file exists and the path is correct."));
        assert!(std::error::Error::source(&err).is_some());

        let present = dir.path().join("a.fil");
        std::fs::write(&present, b"x").unwrap();
        assert!(check_readable(&present).is_ok());
    }

    #[test]
    fn io_hint_keeps_suggestion() {
        let err = search_cli_error("zap", SearchError::Io(io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(err.msg.contains("Check permissions"));
    }

    #[test]
    fn hint_mentions_tool() {
        let err = search_cli_error("search", SearchError::tool("dedisperser", "exited with 1"));
        assert!(err.msg.starts_with("search: external tool `dedisperser`"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
