//! CLI subcommand: `localrag security`
//!
//! Self-tests, posture reporting and offline query previews.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::security_context;
use crate::config::Config;
use crate::retriever::ResponseCache;
use crate::security::{
    self, QuerySanitizer, SanitizedQuery, SecurityContext, SecurityError, SecuritySelfTest,
    SelfTestStatus,
};

#[derive(Args)]
pub struct SecurityArgs {
    #[command(subcommand)]
    pub command: SecurityCommands,
}

#[derive(Subcommand)]
pub enum SecurityCommands {
    /// Verify the boundary's controls against the current configuration
    SelfTest {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show mode, allowlist and sanitization settings
    Status,

    /// Show what a query would be reduced to, without any network access
    CheckQuery {
        /// Free-text query to preview
        query: String,
    },
}

pub async fn run(args: SecurityArgs) -> Result<()> {
    match args.command {
        SecurityCommands::SelfTest { json } => self_test(json),
        SecurityCommands::Status => show_status(),
        SecurityCommands::CheckQuery { query } => check_query(&query),
    }
}

fn self_test(json_output: bool) -> Result<()> {
    let config = Config::load()?;
    let ctx = security_context(&config)?;
    let report = SecuritySelfTest::new(&ctx).run_all();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Security Self-Test (mode: {})", report.mode);
        println!();
        for result in &report.results {
            let icon = match result.status {
                SelfTestStatus::Passed => "✓",
                SelfTestStatus::Failed => "✗",
                SelfTestStatus::Skipped => "⊘",
            };
            println!("  {} [{}] {}", icon, result.status, result.test_name);
            println!("      {}", result.message);
        }
        println!();
        println!(
            "Summary: {}/{} passed, {} skipped",
            report.passed(),
            report.passed() + report.failed(),
            report.skipped()
        );
    }

    if !report.all_passed() {
        anyhow::bail!("{} security self-test(s) failed", report.failed());
    }
    Ok(())
}

fn show_status() -> Result<()> {
    let config = Config::load()?;
    let ctx = security_context(&config)?;

    println!("Security Status:");
    println!("  Mode:          {}", ctx.mode());
    println!(
        "  Web egress:    {}",
        if config.web_retrieval_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let domains: Vec<&str> = ctx.allowlist().domains().collect();
    if domains.is_empty() {
        println!("  Allowlist:     (empty)");
    } else {
        println!("  Allowlist:     {}", domains.join(", "));
    }
    println!(
        "  Sanitization:  {} (max {} chars)",
        if ctx.sanitize_enabled() { "on" } else { "off" },
        ctx.max_query_length()
    );
    println!("  Timeout:       {}s", config.security.egress.timeout_secs);

    // Audit log
    let audit_path = config.audit_file();
    if !config.audit.enabled {
        println!("  Audit Log:     Disabled");
    } else {
        let entries = security::read_audit_log(&audit_path)?;
        if entries.is_empty() {
            println!("  Audit Log:     Empty ({})", audit_path.display());
        } else {
            let broken = security::verify_audit_chain(&audit_path)?;
            let chain_status = if broken.is_empty() {
                "chain intact"
            } else {
                "CHAIN BROKEN"
            };
            println!(
                "  Audit Log:     {} entries, {} ({})",
                entries.len(),
                chain_status,
                audit_path.display()
            );
        }
    }

    let cache = ResponseCache::new(
        config.web_cache_dir(),
        config.security.egress.max_cached_chars,
    );
    println!(
        "  Web Cache:     {} entries ({})",
        cache.len(),
        cache.dir().display()
    );

    Ok(())
}

fn check_query(query: &str) -> Result<()> {
    let config = Config::load()?;
    let ctx = security_context(&config)?;

    match preview_query(&ctx, query) {
        Ok(sanitized) => {
            println!("Allowed: {}", sanitized);
            println!("  {} token(s), {} chars", sanitized.token_count(), sanitized.as_str().len());
            Ok(())
        }
        Err(e) => {
            println!("Rejected: {}", e);
            anyhow::bail!("Query would not be sent")
        }
    }
}

/// Sanitize under the context's limit, auditing a rejection like a real
/// retrieval would.
fn preview_query(ctx: &SecurityContext, query: &str) -> Result<SanitizedQuery, SecurityError> {
    QuerySanitizer::sanitize_with_limit(query, ctx.max_query_length())
        .inspect_err(|e| ctx.report_violation(e))
}
