//! # portico-core
//!
//! Core types shared across all Portico crates.
//!
//! This crate provides:
//! - `PorticoError`, the unified error type, and the `PorticoResult` alias
//! - `SingleFlight`, the per-subject state slot that lets any number of
//!   concurrent callers share one in-flight operation
//!
//! ## Architecture
//!
//! - `error`: Error taxonomy, classification and user-facing suggestions
//! - `flight`: `Idle | Pending | Ready` slot with shared pending handles

pub mod error;
pub mod flight;

// Re-export commonly used types
pub use error::{ErrorKind, PorticoError, PorticoResult};
pub use flight::SingleFlight;
