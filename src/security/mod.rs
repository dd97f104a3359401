//! Egress control boundary for LocalRAG.
//!
//! See [`localrag`] for the module overview, architecture diagram,
//! and public API documentation.

mod allowlist;
mod audit;
mod capability;
mod context;
mod error;
mod localrag;
mod mode;
mod sanitizer;
mod self_test;

// The localrag.rs facade controls the entire public API surface.
pub use self::localrag::*;

pub(crate) use self::audit::sha256_hex;
