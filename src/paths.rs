//! XDG Base Directory Specification compliant path resolution.
//!
//! Every directory is resolved through a three-level fallback:
//! 1. LocalRAG-specific env var (LOCALRAG_CONFIG_DIR, etc.)
//! 2. XDG env var (XDG_CONFIG_HOME, etc.) via `etcetera`
//! 3. Platform default (~/.config, etc.)
//!
//! All paths are absolute. Relative paths from env vars are ignored per the XDG Base Directory rules.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::security::AUDIT_FILENAME;

/// Resolved directory paths for the entire application.
///
/// Created once at startup, threaded through Config.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// State directory: audit log
    pub state_dir: PathBuf,

    /// Cache directory: retrieved web pages
    pub cache_dir: PathBuf,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "LOCALRAG_CONFIG_DIR", || {
            strategy.config_dir().join("localrag")
        });

        let state_dir = env_or(&env_fn, "LOCALRAG_STATE_DIR", || {
            // state_dir() is None on platforms without XDG_STATE_HOME
            let base_state = strategy.state_dir().unwrap_or_else(|| strategy.data_dir());
            base_state.join("localrag")
        });

        let cache_dir = env_or(&env_fn, "LOCALRAG_CACHE_DIR", || {
            strategy.cache_dir().join("localrag")
        });

        Ok(Self {
            config_dir,
            state_dir,
            cache_dir,
        })
    }

    /// Paths rooted under a single directory. Used by tests and `--root`
    /// style embedding where XDG resolution is not wanted.
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            state_dir: root.join("state"),
            cache_dir: root.join("cache"),
        }
    }

    // ── Convenience accessors for specific files ──

    /// Config file: config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Audit log: state_dir/localrag.audit.jsonl
    pub fn audit_log(&self) -> PathBuf {
        self.state_dir.join(AUDIT_FILENAME)
    }

    /// Web response cache: cache_dir/web
    pub fn web_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("web")
    }

    /// Create all directories with appropriate permissions.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.state_dir, &self.cache_dir] {
            create_dir_with_mode(dir)?;
        }
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve().unwrap_or_else(|_| {
            // Emergency fallback when no home directory can be found
            let home = etcetera::home_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self {
                config_dir: home.join(".config").join("localrag"),
                state_dir: home.join(".local").join("state").join("localrag"),
                cache_dir: home.join(".cache").join("localrag"),
            }
        })
    }
}

/// Resolve an env var with fallback. Ignores empty and relative paths per the XDG Base Directory rules.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(|v| PathBuf::from(shellexpand::tilde(&v).to_string()))
        .filter(|p| p.is_absolute()) // XDG: ignore relative paths
        .unwrap_or_else(default)
}

/// Create a directory with mode 0700 per the XDG Base Directory rules.
fn create_dir_with_mode(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}
