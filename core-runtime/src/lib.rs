//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the recitation core:
//! - Logging and tracing infrastructure
//! - Configuration management and on-disk cache layout
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the playback and prefetch
//! crates depend on. It establishes the logging conventions, the shared
//! storage layout, and the event broadcasting mechanism used throughout the
//! workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
