//! # Playback Error Types
//!
//! Error types for verse resolution and the playback engine.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The renderer rejected the source or failed while playing it.
    #[error("Failed to prepare audio source: {0}")]
    PrepareFailure(String),

    /// A remote source could not be reached.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    // ========================================================================
    // Corpus Errors
    // ========================================================================
    #[error("Invalid verse {surah}:{verse}")]
    InvalidVerse { surah: u16, verse: u16 },

    #[error("Invalid page {0}")]
    InvalidPage(u32),

    /// The catalog returned no verses for the page.
    #[error("Page {0} has no verses")]
    EmptyPage(u32),

    /// The verse catalog collaborator failed.
    #[error("Verse catalog error: {0}")]
    Catalog(String),

    // ========================================================================
    // Configuration & Storage Errors
    // ========================================================================
    #[error("Invalid playback configuration: {0}")]
    Config(String),

    /// Reading persisted preferences failed.
    #[error("Settings store error: {0}")]
    Settings(#[from] BridgeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Failures that page and range playback skip over instead of stopping.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            PlaybackError::PrepareFailure(_) | PlaybackError::NetworkFailure(_)
        )
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, PlaybackError::NetworkFailure(_))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
