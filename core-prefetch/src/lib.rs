//! # Page Prefetch
//!
//! Bulk download of the mushaf page images into the local cache.
//!
//! ## Overview
//!
//! This crate handles:
//! - A bounded worker pool over the page range with pause, resume and cancel
//! - A mirror ladder per page (CDN, raw mirror, cache-busted CDN)
//! - WebP integrity checks before a file is kept
//! - Progress with ETA, and a persisted "cache complete" flag once at least
//!   95% of the pages are present

pub mod config;
mod control;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod integrity;
pub mod mirrors;
pub mod progress;

pub use config::PrefetchConfig;
pub use coordinator::{
    BulkPrefetchCoordinator, PrefetchComponents, PrefetchOutcome, PrefetchReport,
    PAGES_CACHED_KEY,
};
pub use error::{IntegrityError, PrefetchError, Result};
pub use fetcher::{PageFetcher, PageOrigin};
pub use integrity::{IntegrityPolicy, IntegrityValidator};
pub use mirrors::MirrorSet;
pub use progress::{estimate_eta, format_eta, ProgressSnapshot};
