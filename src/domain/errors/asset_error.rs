//! Errors surfaced to callers of the asset manager.

use thiserror::Error;

/// User-visible request failure.
///
/// `Clone` so a single failure can be fanned out to every waiter of an
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum AssetError {
    #[error("fetch failed: {message}")]
    Fetch { message: String },

    #[error("decode failed: {message}")]
    Decode { message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl AssetError {
    /// Creates fetch error.
    #[must_use]
    pub fn fetch(message: impl std::fmt::Display) -> Self {
        Self::Fetch {
            message: message.to_string(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: message.to_string(),
        }
    }

    /// Returns whether the caller withdrew.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns whether the transport failed.
    #[must_use]
    pub const fn is_fetch_error(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}
