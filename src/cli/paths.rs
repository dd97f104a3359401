//! CLI subcommand: `localrag paths`
//!
//! Prints all resolved XDG-compliant paths for debugging and scripting.

use anyhow::Result;

use crate::paths::Paths;

pub fn run() -> Result<()> {
    let paths = Paths::resolve()?;

    println!("LocalRAG Paths (XDG Base Directory)");
    println!("====================================");
    println!();
    println!("Config:     {}", paths.config_dir.display());
    println!("  config.toml:    {}", paths.config_file().display());
    println!();
    println!("State:      {}", paths.state_dir.display());
    println!("  audit log:      {}", paths.audit_log().display());
    println!();
    println!("Cache:      {}", paths.cache_dir.display());
    println!("  web cache:      {}", paths.web_cache_dir().display());
    println!();
    println!("[audit] file and [cache] dir in config.toml override the defaults above.");

    Ok(())
}
