//! # Prefetch Error Types

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Why a downloaded page image was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("File too small: {actual} bytes (minimum {minimum})")]
    TooSmall { actual: usize, minimum: usize },

    #[error("Missing RIFF header")]
    MissingRiffHeader,

    #[error("Missing WEBP signature")]
    MissingWebpSignature,

    /// The RIFF chunk claims more bytes than the file holds (truncated download).
    #[error("RIFF chunk declares {declared} bytes but only {actual} are present")]
    DeclaredSizeMismatch { declared: u32, actual: usize },

    #[error("Image could not be decoded: {0}")]
    Undecodable(String),

    #[error("Image is {width}x{height}, expected at least {min_width}x{min_height}")]
    DimensionsTooSmall {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
}

/// Errors that can occur while prefetching page images.
#[derive(Error, Debug)]
pub enum PrefetchError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("A prefetch run is already in progress")]
    AlreadyRunning,

    #[error("Invalid prefetch configuration: {0}")]
    InvalidConfig(String),
}

impl PrefetchError {
    /// Failures that only cost one mirror attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PrefetchError::NetworkFailure(_) | PrefetchError::Integrity(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PrefetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrefetchError::from(IntegrityError::TooSmall {
            actual: 512,
            minimum: 8192,
        });
        assert_eq!(
            err.to_string(),
            "Integrity check failed: File too small: 512 bytes (minimum 8192)"
        );

        let err = IntegrityError::DimensionsTooSmall {
            width: 400,
            height: 600,
            min_width: 800,
            min_height: 1200,
        };
        assert_eq!(
            err.to_string(),
            "Image is 400x600, expected at least 800x1200"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(PrefetchError::NetworkFailure("timeout".into()).is_retryable());
        assert!(PrefetchError::Integrity(IntegrityError::MissingRiffHeader).is_retryable());
        assert!(!PrefetchError::AlreadyRunning.is_retryable());
        assert!(!PrefetchError::Storage(BridgeError::OperationFailed("disk full".into()))
            .is_retryable());
    }
}
