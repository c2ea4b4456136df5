use thiserror::Error;

/// Errors that can occur while dispatching commands or talking to the broker
#[derive(Error, Debug)]
pub enum RpcError {
    /// Broker transport failure (connect, declare, consume, publish, ack)
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No handler knows the requested command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A required request parameter is absent
    #[error("missing request parameter: {0}")]
    MissingParam(String),

    /// The delivery with this tag was acknowledged already
    #[error("delivery {0} already acknowledged")]
    AlreadyAcknowledged(u64),

    /// Operation not valid in the component's current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Waiting for a reply exceeded the configured timeout
    #[error("timed out waiting for reply")]
    Timeout,

    /// Required configuration value not provided
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Configuration could not be located or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// YAML configuration could not be encoded or decoded
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Local I/O failure (config files, executable metadata)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP fetch failed
    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, RpcError>;
