//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the recitation core and
//! platform-specific implementations. Each trait represents a capability that
//! the core requires but that must be implemented differently per platform
//! (desktop, Android, iOS).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP downloads with retry and timeouts
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for the audio and page caches
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### UI Side Effects
//! - [`ProgressSink`](sink::ProgressSink) - Now-playing, highlight and download progress callbacks
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Android  | TBD                 | 📋 Planned |
//! | iOS      | TBD                 | 📋 Planned |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::Error;
//!
//! let settings = config.settings_store.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "SettingsStore".to_string(),
//!     message: "Inject a platform settings store or enable desktop-shims.".to_string(),
//! })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Platform implementations should convert platform-specific errors to
//! `BridgeError` and include context such as the file name or HTTP status.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across tokio
//! tasks (the prefetch worker pool in particular).

pub mod error;
pub mod http;
pub mod sink;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use sink::{NoopProgressSink, ProgressSink};
pub use storage::{FileMetadata, FileSystemAccess, SettingsStore};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
