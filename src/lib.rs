//! LocalRAG - a local research assistant with a controlled web-retrieval
//! boundary
//!
//! This crate provides:
//! - The security boundary: offline/egress mode gate, query sanitizer,
//!   destination allowlist, hash-chained egress audit trail, self-tests
//! - Controlled retrieval: sanitized search across allowlisted domains
//!   with an on-disk response cache
//! - XDG path resolution and TOML configuration
//! - The `localrag` command-line interface

pub mod cli;
pub mod config;
pub mod paths;
pub mod retriever;
pub mod security;

pub use config::Config;
