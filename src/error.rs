use thiserror::Error;

/// Reasons a scan is refused before it reaches the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Please enter a domain name.")]
    MissingDomain,
    #[error("failed to dispatch scan: {0}")]
    Dispatch(String),
}

/// Failures at the engine boundary (the host side, not the diagnostics themselves).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to launch diagnostic engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed engine output: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("engine exited with {status} without reporting an outcome")]
    NoOutcome { status: String },
    #[error("engine stream closed")]
    Closed,
}

/// Invalid input for a one-shot check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Please enter a domain name.")]
    MissingDomain,
    #[error("Please enter a host.")]
    MissingHost,
    #[error("Please enter both a host and a port number.")]
    MissingPort,
    #[error("Invalid port number: {0}. Port must be between 1 and 65535.")]
    InvalidPort(String),
    #[error("Please enter a domain name or IP address.")]
    MissingQuery,
    #[error("unknown check `{0}`")]
    UnknownKind(String),
}
