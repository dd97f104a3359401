//! CLI subcommand: `localrag audit`

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::Config;
use crate::security::{self, AuditEvent, AuditEventKind};

#[derive(Args)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub command: AuditCommands,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show the egress audit log
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Filter by event (e.g., network_egress, security_violation)
        #[arg(long)]
        filter: Option<String>,
    },

    /// Verify the hash chain of the audit log
    Verify,
}

pub async fn run(args: AuditArgs) -> Result<()> {
    match args.command {
        AuditCommands::Show { json, filter } => show_audit(json, filter),
        AuditCommands::Verify => verify_audit(),
    }
}

fn show_audit(json_output: bool, filter: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let path = config.audit_file();

    let mut entries = security::read_audit_log(&path)?;

    // Apply filter if specified
    if let Some(ref filter_event) = filter {
        entries.retain(|e| e.event.event.as_str() == filter_event);
    }

    if entries.is_empty() {
        if filter.is_some() {
            println!("No audit log entries matching filter.");
        } else {
            println!("No audit log entries.");
        }
        return Ok(());
    }

    if json_output {
        let output = serde_json::to_string_pretty(&entries)?;
        println!("{}", output);
        return Ok(());
    }

    let label = if let Some(ref f) = filter {
        format!("Egress Audit Log ({} entries, filter: {}):", entries.len(), f)
    } else {
        format!("Egress Audit Log ({} entries):", entries.len())
    };
    println!("{}", label);
    println!();

    for entry in &entries {
        println!(
            "  {} {:<20} {}",
            entry.event.timestamp,
            entry.event.event.as_str(),
            describe(&entry.event)
        );
    }

    // Verify chain integrity (on full log, not filtered)
    let broken = security::verify_audit_chain(&path)?;
    println!();
    if broken.is_empty() {
        println!("Chain integrity: INTACT");
    } else {
        println!("Chain integrity: BROKEN at {} position(s)", broken.len());
    }

    Ok(())
}

fn verify_audit() -> Result<()> {
    let config = Config::load()?;
    let path = config.audit_file();
    let broken = security::verify_audit_chain(&path)?;

    if broken.is_empty() {
        println!("Chain integrity: INTACT ({})", path.display());
        return Ok(());
    }

    let lines: Vec<String> = broken.iter().map(|i| (i + 1).to_string()).collect();
    anyhow::bail!(
        "Chain integrity: BROKEN at line(s) {} of {}",
        lines.join(", "),
        path.display()
    )
}

/// One-line summary of an event for text output.
fn describe(event: &AuditEvent) -> String {
    match event.event {
        AuditEventKind::NetworkEgress => format!(
            "{} {} -> {} ({} bytes, {:.0} ms)",
            event.method.as_deref().unwrap_or("?"),
            event.url.as_deref().unwrap_or("?"),
            event
                .status_code
                .map(|s| s.to_string())
                .unwrap_or_else(|| "?".to_string()),
            event.response_size_bytes.unwrap_or(0),
            event.execution_time_ms.unwrap_or(0.0)
        ),
        AuditEventKind::WebRetrievalCached => format!(
            "{} (cache key {})",
            event.url.as_deref().unwrap_or("?"),
            event.cache_key.as_deref().unwrap_or("?")
        ),
        AuditEventKind::SecurityViolation => format!(
            "[{}] {}",
            event
                .violation
                .map(|v| v.as_str())
                .unwrap_or("unknown"),
            event.message.as_deref().unwrap_or("")
        ),
        AuditEventKind::SelfTest => format!(
            "{}: {}",
            event.test_name.as_deref().unwrap_or("?"),
            event.message.as_deref().unwrap_or("")
        ),
        AuditEventKind::Error | AuditEventKind::ChainRecovery => {
            let domain = event
                .domain
                .as_deref()
                .map(|d| format!("{}: ", d))
                .unwrap_or_default();
            format!("{}{}", domain, event.message.as_deref().unwrap_or(""))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ViolationKind;

    #[test]
    fn describes_egress_without_body() {
        let event = AuditEvent::egress("GET", "https://arxiv.org/search/?query=rag", 200, 512, 12.4);
        assert_eq!(
            describe(&event),
            "GET https://arxiv.org/search/?query=rag -> 200 (512 bytes, 12 ms)"
        );
    }

    #[test]
    fn describes_violation() {
        let event = AuditEvent::violation(ViolationKind::ForbiddenPattern, "blocked");
        assert_eq!(describe(&event), "[forbidden_pattern] blocked");
    }

    #[test]
    fn describes_domain_error() {
        let event = AuditEvent::error("HTTP 503").with_domain("arxiv.org");
        assert_eq!(describe(&event), "arxiv.org: HTTP 503");
    }
}
