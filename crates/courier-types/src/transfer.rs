use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the file-transfer client. Each variant is logged
/// distinctly; callers decide the user-facing message.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("file size {size} outside allowed range (max {max} bytes)")]
    InvalidSize { size: i64, max: u64 },

    #[error("transfer descriptor failed safety validation")]
    InvalidDescriptor,

    #[error("transfer subprocess exceeded {0}s wall-clock budget")]
    Timeout(u64),

    #[error("transfer subprocess failed: {0}")]
    Process(String),

    #[error("integrity check failed: expected {expected}, computed {actual}")]
    Integrity { expected: String, actual: String },

    #[error("subprocess reported success but produced no output file")]
    OutputMissing,

    #[error("subprocess produced {0} output files, expected exactly one")]
    AmbiguousOutput(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Whether another attempt within the retry budget may succeed.
    /// A wall-clock timeout already consumed the whole budget for this call.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidSize { .. } | Self::InvalidDescriptor | Self::Timeout(_)
        )
    }
}

/// A downloaded file whose real name was only revealed on completion.
/// The file still lives inside `session_dir`; the caller moves it into place
/// and then cleans the session directory up.
#[derive(Debug)]
pub struct DetectedFile {
    pub name: String,
    pub path: PathBuf,
    pub session_dir: PathBuf,
}
