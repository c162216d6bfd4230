//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with retry and exponential backoff
//! - `FileSystemAccess` using `tokio::fs`, including atomic rename
//! - `SettingsStore` using a SQLite-backed key-value table
//!
//! `core-runtime` injects these automatically when its `desktop-shims`
//! feature is enabled.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let fs = TokioFileSystem::new();
//!     let settings = SqliteSettingsStore::new("/tmp/reader/settings.db".into())
//!         .await
//!         .unwrap();
//! }
//! ```

mod filesystem;
mod http;
mod settings;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;
