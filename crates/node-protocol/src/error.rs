use thiserror::Error;

/// Errors on the coordinator ↔ node link.
///
/// Every variant is fatal for the recommendation request that hit it; the
/// coordinator does not retry and does not fall back to partial results.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to connect to node {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out during {stage} with node {addr}")]
    Timeout { addr: String, stage: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed before a complete frame was read")]
    ConnectionClosed,

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Malformed message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Node {addr} reported an error: {message}")]
    Remote { addr: String, message: String },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
