use thiserror::Error;

/// Hard failures of a whole scan. Probe faults never end up here; they are
/// reported as `error` results instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("playbook '{0}' selected no attack vectors")]
    EmptyPlaybook(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported export format '{0}'")]
    UnknownFormat(String),
}
