//! # Page Image Integrity
//!
//! Mirrors sometimes answer with an HTML error page, a truncated body or a
//! thumbnail. A page file is only kept when it passes every check below, in
//! order:
//!
//! 1. At least `min_bytes` long
//! 2. `RIFF` at offset 0 and `WEBP` at offset 8
//! 3. The little-endian RIFF size at offset 4 fits in the file (`len >= size + 8`)
//! 4. The header decodes to at least `min_width` x `min_height`

use crate::error::IntegrityError;
use image::ImageReader;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

const RIFF_MAGIC: &[u8; 4] = b"RIFF";
const WEBP_MAGIC: &[u8; 4] = b"WEBP";
const RIFF_HEADER_LEN: usize = 12;

/// Thresholds applied by [`IntegrityValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityPolicy {
    /// Default: 8 KiB.
    #[serde(default = "default_min_bytes")]
    pub min_bytes: usize,

    /// Default: 800.
    #[serde(default = "default_min_width")]
    pub min_width: u32,

    /// Default: 1200.
    #[serde(default = "default_min_height")]
    pub min_height: u32,
}

fn default_min_bytes() -> usize {
    8 * 1024
}

fn default_min_width() -> u32 {
    800
}

fn default_min_height() -> u32 {
    1200
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        Self {
            min_bytes: default_min_bytes(),
            min_width: default_min_width(),
            min_height: default_min_height(),
        }
    }
}

/// Checks page image bytes against an [`IntegrityPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityValidator {
    policy: IntegrityPolicy,
}

impl IntegrityValidator {
    pub fn new(policy: IntegrityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &IntegrityPolicy {
        &self.policy
    }

    /// Runs every check and returns the decoded `(width, height)`.
    pub fn validate(&self, bytes: &[u8]) -> Result<(u32, u32), IntegrityError> {
        self.check_container(bytes)?;
        self.check_dimensions(bytes)
    }

    /// Size, magic and RIFF length checks. Does not decode.
    pub fn check_container(&self, bytes: &[u8]) -> Result<(), IntegrityError> {
        let minimum = self.policy.min_bytes.max(RIFF_HEADER_LEN);
        if bytes.len() < minimum {
            return Err(IntegrityError::TooSmall {
                actual: bytes.len(),
                minimum,
            });
        }

        if &bytes[0..4] != RIFF_MAGIC {
            return Err(IntegrityError::MissingRiffHeader);
        }
        if &bytes[8..12] != WEBP_MAGIC {
            return Err(IntegrityError::MissingWebpSignature);
        }

        let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if (bytes.len() as u64) < u64::from(declared) + 8 {
            return Err(IntegrityError::DeclaredSizeMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        Ok(())
    }

    /// Reads the image header and enforces the minimum page size.
    pub fn check_dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), IntegrityError> {
        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| IntegrityError::Undecodable(e.to_string()))?
            .into_dimensions()
            .map_err(|e| IntegrityError::Undecodable(e.to_string()))?;

        if width < self.policy.min_width || height < self.policy.min_height {
            return Err(IntegrityError::DimensionsTooSmall {
                width,
                height,
                min_width: self.policy.min_width,
                min_height: self.policy.min_height,
            });
        }

        Ok((width, height))
    }
}
