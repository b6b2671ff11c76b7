//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Request frame with a zero length prefix
    #[error("Empty request frame")]
    EmptyFrame,

    /// Frame exceeds maximum size
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Route name does not fit the one-byte length field
    #[error("Route name too long: {0} bytes")]
    RouteTooLong(usize),

    /// Route length byte points past the end of the frame
    #[error("Route length {route_len} exceeds frame length {frame_len}")]
    TruncatedRoute { route_len: usize, frame_len: usize },

    /// Route name is not valid UTF-8
    #[error("Route name is not valid UTF-8")]
    InvalidRouteName,

    /// Route not served by this daemon
    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
