use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PrepError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid read metadata for {run_id}: {message}")]
    Validation { run_id: String, message: String },

    #[error("remote read files are not supported: {0}")]
    UnsupportedSource(String),

    #[error("duplicated read files:\n{0}")]
    DuplicateReadFile(String),

    #[error("expected path missing after preparation: {0}")]
    Io(String),

    #[error("accession not found: {0}")]
    MissingAccession(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("{tool} binary not found: {target}")]
    MissingTool { tool: String, target: Utf8PathBuf },

    #[error("expected {path} to start with #! and name the interpreter, found: {line}")]
    Shebang { path: Utf8PathBuf, line: String },
}

impl PrepError {
    pub(crate) fn fs(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        PrepError::Filesystem(format!("{context}: {err}"))
    }

    pub(crate) fn validation(run_id: &str, message: impl Into<String>) -> Self {
        PrepError::Validation {
            run_id: run_id.to_string(),
            message: message.into(),
        }
    }
}
