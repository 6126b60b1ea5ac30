//! Error types for BhujaKin

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// BhujaKin error types
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// Search iteration count outside the supported range
    #[error("search iterations must be within [5, 100], got {0}")]
    InvalidIterations(u32),
}
