pub mod audit;
pub mod config;
pub mod paths;
pub mod security;
pub mod web;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::Config;
use crate::security::{AuditSink, JsonlAuditSink, SecurityContext};

#[derive(Parser)]
#[command(name = "localrag")]
#[command(
    author,
    version,
    about = "Local research assistant with a controlled web-retrieval boundary"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Controlled web retrieval
    Web(web::WebArgs),

    /// Security boundary checks and status
    Security(security::SecurityArgs),

    /// Inspect the egress audit log
    Audit(audit::AuditArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved XDG directory paths
    Paths,
}

/// Build the process security context from config, with the JSONL audit
/// sink attached unless `audit.enabled = false`.
pub fn security_context(config: &Config) -> Result<Arc<SecurityContext>> {
    let sink: Option<Arc<dyn AuditSink>> = if config.audit.enabled {
        Some(Arc::new(JsonlAuditSink::new(config.audit_file())))
    } else {
        None
    };
    let ctx = SecurityContext::from_config(&config.security, sink)
        .context("Invalid [security] configuration")?;
    Ok(Arc::new(ctx))
}
