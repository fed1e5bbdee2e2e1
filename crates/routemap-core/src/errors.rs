//! Error types for the routemap core library.

/// Top-level error enum for the routemap core library.
///
/// Malformed input never produces one of these: it is reported through
/// [`crate::models::Diagnostic`] instead. A run fails wholesale only on an
/// internal invariant violation or when it is cancelled.
#[derive(Debug, thiserror::Error)]
pub enum RouteMapError {
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RouteMapResult<T> = Result<T, RouteMapError>;
