//! CLI subcommand: `localrag web`
//!
//! Runs controlled retrievals and manages the response cache. Retrieval
//! requires both `security.mode = "egress"` and
//! `security.egress.enabled = true`.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::io::Write;

use crate::cli::security_context;
use crate::config::Config;
use crate::retriever::{ControlledRetriever, DocumentRecord, ResponseCache};

const PREVIEW_CHARS: usize = 200;

#[derive(Args)]
pub struct WebArgs {
    #[command(subcommand)]
    pub command: WebCommands,
}

#[derive(Subcommand)]
pub enum WebCommands {
    /// Search allowlisted domains with a sanitized keyword query
    Search {
        /// Free-text query; only keywords are sent
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete every cached web response
    ClearCache {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn run(args: WebArgs) -> Result<()> {
    match args.command {
        WebCommands::Search {
            query,
            limit,
            format,
        } => search(&query, limit, &format).await,
        WebCommands::ClearCache { yes } => clear_cache(yes),
    }
}

async fn search(query: &str, limit: usize, format: &str) -> Result<()> {
    let config = Config::load()?;

    if !config.web_retrieval_enabled() {
        anyhow::bail!(
            "Web retrieval is disabled (security.mode = {:?}, security.egress.enabled = {}).\n\
             Enable it with:\n  \
             localrag config set security.mode egress\n  \
             localrag config set security.egress.enabled true",
            config.security.mode,
            config.security.egress.enabled
        );
    }

    let ctx = security_context(&config)?;
    let retriever = ControlledRetriever::from_config(ctx, &config)?;
    let report = retriever.retrieve_report(query).await?;

    let failures: Vec<(String, String)> = report
        .failures()
        .map(|(domain, err)| (domain.to_string(), err.to_string()))
        .collect();
    let query = report.query.to_string();
    let request_id = report.request_id.clone();
    let records = report.into_records(limit);

    if format == "json" {
        let output = serde_json::json!({
            "query": query,
            "request_id": request_id,
            "results": records,
            "failures": failures
                .iter()
                .map(|(domain, error)| serde_json::json!({ "domain": domain, "error": error }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Sanitized query: {}", query);
    println!();

    if records.is_empty() {
        println!("No results.");
    } else {
        println!("Found {} result(s):", records.len());
        println!();
        for (i, record) in records.iter().enumerate() {
            print_record(i + 1, record);
        }
    }

    if !failures.is_empty() {
        println!();
        println!("Failed domains:");
        for (domain, error) in &failures {
            println!("  {}: {}", domain, error);
        }
    }

    Ok(())
}

fn print_record(index: usize, record: &DocumentRecord) {
    println!("[{}] {} ({})", index, record.domain, record.confidentiality);
    println!("    {}", record.source_url);
    println!("    fetched: {}", record.fetched_at);

    let collapsed = record.content.split_whitespace().collect::<Vec<_>>().join(" ");
    let preview: String = collapsed.chars().take(PREVIEW_CHARS).collect();
    if !preview.is_empty() {
        let ellipsis = if collapsed.chars().count() > PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        println!("    {}{}", preview, ellipsis);
    }
    println!();
}

fn clear_cache(yes: bool) -> Result<()> {
    let config = Config::load()?;
    let cache = ResponseCache::new(
        config.web_cache_dir(),
        config.security.egress.max_cached_chars,
    );

    let count = cache.len();
    if count == 0 {
        println!("Web cache is empty ({}).", cache.dir().display());
        return Ok(());
    }

    if !yes {
        print!(
            "Delete {} cached response(s) in {}? [y/N] ",
            count,
            cache.dir().display()
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .context("Failed to read confirmation")?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    cache.clear()?;
    println!("Cleared {} cached response(s).", count);
    Ok(())
}
