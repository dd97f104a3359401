use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use localrag::cli::{self, Cli, Commands};
use localrag::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging(cli.verbose);

    match cli.command {
        Commands::Web(args) => cli::web::run(args).await,
        Commands::Security(args) => cli::security::run(args).await,
        Commands::Audit(args) => cli::audit::run(args).await,
        Commands::Config(args) => cli::config::run(args).await,
        Commands::Paths => cli::paths::run(),
    }
}

/// `RUST_LOG` wins, then `--verbose`, then `[logging]` from the config file.
fn init_logging(verbose: bool) {
    let logging = Config::peek_logging();
    let log_level = if verbose { "debug" } else { logging.level.as_str() };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
