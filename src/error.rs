use std::time::Duration;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The operator encryption secret is absent. Raised before any
    /// cryptographic operation; a configuration error, never a
    /// runtime one.
    #[error("encryption secret is not configured")]
    MissingEncryptionSecret,

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("caller is not authenticated")]
    Unauthenticated,

    #[error("VPS target not found: {0}")]
    TargetNotFound(String),

    #[error("invalid VPS target: {0}")]
    InvalidTarget(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command timed out after {timeout:?}: {command}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("transfer to {remote_path} failed: {detail}")]
    TransferFailed { remote_path: String, detail: String },

    /// A fatal remote step. Best-effort steps never produce this;
    /// their failures are logged as warnings instead.
    #[error("deployment step '{step}' failed: {detail}")]
    StepFailed { step: String, detail: String },

    #[error("record store error: {0}")]
    StoreError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// HTTP-equivalent status for the external API layer.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::TargetNotFound(_) => 404,
            _ => 500,
        }
    }
}
