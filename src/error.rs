use thiserror::Error;

/// Errors that can occur while driving a pub/sub stream.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The transport could not be established or was lost.
    ///
    /// Recoverable by calling `open_stream()` again.
    #[error("connection error: {0}")]
    Connection(String),

    /// A data operation was issued before the stream was opened.
    #[error("stream is not open")]
    NotOpen,

    /// The stream was closed, either before the call or while it was pending.
    #[error("stream closed")]
    StreamClosed,

    /// A registered handler failed while processing a message.
    ///
    /// Only ever reported on the failing handler's own report channel.
    #[error("subscriber {subscriber} failed: {reason}")]
    Handler {
        /// Registration index of the failing handler.
        subscriber: usize,
        /// Display form of the handler's error.
        reason: String,
    },

    /// The operation could not proceed without waiting: an exclusive-access
    /// blocking driver was entered by a second caller, or a writer's queue
    /// is full.
    #[error("driver busy: {0}")]
    Busy(&'static str),

    /// The broker rejected or failed an operation on an open stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// A required builder setting was not provided.
    #[error("missing required config: {0}")]
    MissingConfig(String),

    /// Builder settings contradict each other.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// JSON payload encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DriverError {
    /// Returns true for errors a caller may resolve by re-opening the stream.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::Connection(_))
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DriverError::Connection(_) => "connection",
            DriverError::NotOpen => "not_open",
            DriverError::StreamClosed => "stream_closed",
            DriverError::Handler { .. } => "handler",
            DriverError::Busy(_) => "busy",
            DriverError::Transport(_) => "transport",
            DriverError::MissingConfig(_) => "missing_config",
            DriverError::ConfigConflict(_) => "config_conflict",
            DriverError::Serialization(_) => "serialization",
        }
    }
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
