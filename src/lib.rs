//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service`, `core-playback`, `core-prefetch`).
//! Host applications can depend on `tilawa-workspace` and enable the documented
//! features without needing to wire each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "playback")]
pub use core_playback as playback;

#[cfg(feature = "prefetch")]
pub use core_prefetch as prefetch;
