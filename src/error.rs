use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SdcError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("malformed file name: {0}")]
    Parse(String),

    #[error("SDC log-in failed after {attempts} attempts")]
    AuthenticationFailure { attempts: usize },

    #[error("SDC request failed: {0}")]
    Transport(String),

    #[error("SDC returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("download of {file} failed: {message}")]
    DownloadFailure { file: String, message: String },

    #[error("download worker pool failed: {0}")]
    WorkerPool(String),

    #[error("missing config file mms-sdc.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
