//! Error types for SetuLink

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SetuLink error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame tag not known to this protocol version
    #[error("Unrecognized message tag: {0:#04x}")]
    UnknownTag(u8),

    /// Payload shorter (or longer, for fixed-width types) than the tag requires
    #[error("Malformed payload for tag {tag:#04x}: {detail}")]
    MalformedPayload {
        /// Tag of the message that failed to decode
        tag: u8,
        /// What was wrong with the bytes
        detail: String,
    },

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Configuration error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Session is already killed
    #[error("Session killed")]
    SessionKilled,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
