//! Lazy loading error types

use thiserror::Error;

/// Errors raised at the configuration and environment edges
///
/// The scheduler and activator themselves never fail: a broken resource is a
/// reported lifecycle state, not an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LazyLoadError {
    /// Selector string could not be parsed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Option overrides could not be parsed
    #[error("Invalid lazy load options: {0}")]
    Options(String),

    /// A node handle does not belong to the document it was used with
    #[error("Unknown node: {0}")]
    UnknownNode(String),
}

impl From<toml::de::Error> for LazyLoadError {
    fn from(err: toml::de::Error) -> Self {
        LazyLoadError::Options(err.to_string())
    }
}

/// Result type for lazy loading operations
pub type Result<T> = std::result::Result<T, LazyLoadError>;
