use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::paths::Paths;
use crate::retriever::FetchSettings;
use crate::security::Mode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// "offline" | "egress" (default: offline)
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Strip quotes and punctuation from queries before they leave the host
    #[serde(default = "default_true")]
    pub sanitize_queries: bool,

    /// Upper bound for sanitized query length, in characters
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    #[serde(default)]
    pub egress: EgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressConfig {
    /// Second switch for web retrieval; mode must also be "egress"
    #[serde(default)]
    pub enabled: bool,

    /// Hosts (and their subdomains) that may receive requests
    #[serde(default = "default_allowlist_domains")]
    pub allowlist_domains: Vec<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cap on cached response content, in characters
    #[serde(default = "default_max_cached_chars")]
    pub max_cached_chars: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Audit log path (default: state_dir/localrag.audit.jsonl)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Web cache directory (default: cache_dir/web)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" | "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}
fn default_mode() -> String {
    "offline".to_string()
}
fn default_max_query_length() -> usize {
    crate::security::DEFAULT_MAX_QUERY_LENGTH
}
fn default_allowlist_domains() -> Vec<String> {
    vec!["arxiv.org".to_string()]
}
fn default_timeout_secs() -> u64 {
    crate::retriever::DEFAULT_TIMEOUT_SECS
}
fn default_max_cached_chars() -> usize {
    crate::retriever::DEFAULT_MAX_CACHED_CHARS
}
fn default_user_agent() -> String {
    crate::retriever::DEFAULT_USER_AGENT.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            sanitize_queries: default_true(),
            max_query_length: default_max_query_length(),
            egress: EgressConfig::default(),
        }
    }
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowlist_domains: default_allowlist_domains(),
            timeout_secs: default_timeout_secs(),
            max_cached_chars: default_max_cached_chars(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Paths::resolve()?;
        Self::load_with_paths(paths)
    }

    /// Load from `paths.config_file()`, creating it from the template on
    /// first run.
    pub fn load_with_paths(paths: Paths) -> Result<Self> {
        paths.ensure_dirs()?;
        let path = paths.config_file();

        if !path.exists() {
            // Create default config file on first run
            let config = Config {
                paths,
                ..Config::default()
            };
            config.save_with_template()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.paths = paths;

        // Fail early on a bad mode rather than at first network use
        config
            .security
            .mode
            .parse::<Mode>()
            .with_context(|| format!("Invalid security.mode in {}", path.display()))?;

        Ok(config)
    }

    /// The `[logging]` section of an existing config file, without
    /// creating anything. Defaults when the file is missing or invalid.
    pub fn peek_logging() -> LoggingConfig {
        Paths::resolve()
            .ok()
            .map(|paths| paths.config_file())
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|content| toml::from_str::<Config>(&content).ok())
            .map(|config| config.logging)
            .unwrap_or_default()
    }

    pub fn save(&self) -> Result<()> {
        let path = self.paths.config_file();

        // Create parent directories
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.paths.config_file();

        // Create parent directories
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    /// Audit log file, honoring `audit.file`.
    pub fn audit_file(&self) -> PathBuf {
        match self.audit.file {
            Some(ref file) => expand_path(file),
            None => self.paths.audit_log(),
        }
    }

    /// Web cache directory, honoring `cache.dir`.
    pub fn web_cache_dir(&self) -> PathBuf {
        match self.cache.dir {
            Some(ref dir) => expand_path(dir),
            None => self.paths.web_cache_dir(),
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.security.egress.timeout_secs),
            user_agent: self.security.egress.user_agent.clone(),
            ..FetchSettings::default()
        }
    }

    /// Web retrieval needs both `security.mode = "egress"` and
    /// `security.egress.enabled = true`.
    pub fn web_retrieval_enabled(&self) -> bool {
        self.security.egress.enabled
            && matches!(self.security.mode.parse::<Mode>(), Ok(Mode::Egress))
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["security", "mode"] => Ok(self.security.mode.clone()),
            ["security", "sanitize_queries"] => Ok(self.security.sanitize_queries.to_string()),
            ["security", "max_query_length"] => Ok(self.security.max_query_length.to_string()),
            ["security", "egress", "enabled"] => Ok(self.security.egress.enabled.to_string()),
            ["security", "egress", "allowlist_domains"] => {
                Ok(self.security.egress.allowlist_domains.join(","))
            }
            ["security", "egress", "timeout_secs"] => {
                Ok(self.security.egress.timeout_secs.to_string())
            }
            ["security", "egress", "max_cached_chars"] => {
                Ok(self.security.egress.max_cached_chars.to_string())
            }
            ["security", "egress", "user_agent"] => Ok(self.security.egress.user_agent.clone()),
            ["audit", "enabled"] => Ok(self.audit.enabled.to_string()),
            ["audit", "file"] => Ok(self.audit_file().display().to_string()),
            ["cache", "dir"] => Ok(self.web_cache_dir().display().to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["logging", "format"] => Ok(self.logging.format.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["security", "mode"] => {
                let mode: Mode = value.parse()?;
                self.security.mode = mode.as_str().to_string();
            }
            ["security", "sanitize_queries"] => self.security.sanitize_queries = value.parse()?,
            ["security", "max_query_length"] => {
                let max: usize = value.parse()?;
                anyhow::ensure!(max > 0, "max_query_length must be greater than zero");
                self.security.max_query_length = max;
            }
            ["security", "egress", "enabled"] => self.security.egress.enabled = value.parse()?,
            ["security", "egress", "allowlist_domains"] => {
                let domains: Vec<String> = value
                    .split(',')
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .collect();
                // Reject wildcards and URLs up front
                crate::security::DomainAllowlist::new(&domains)?;
                self.security.egress.allowlist_domains = domains;
            }
            ["security", "egress", "timeout_secs"] => {
                self.security.egress.timeout_secs = value.parse()?
            }
            ["security", "egress", "max_cached_chars"] => {
                self.security.egress.max_cached_chars = value.parse()?
            }
            ["security", "egress", "user_agent"] => {
                self.security.egress.user_agent = value.to_string()
            }
            ["audit", "enabled"] => self.audit.enabled = value.parse()?,
            ["audit", "file"] => self.audit.file = Some(value.to_string()),
            ["cache", "dir"] => self.cache.dir = Some(value.to_string()),
            ["logging", "level"] => self.logging.level = value.to_string(),
            ["logging", "format"] => match value {
                "text" | "json" => self.logging.format = value.to_string(),
                _ => anyhow::bail!("logging.format must be \"text\" or \"json\""),
            },
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Default config template with helpful comments (used for first-time setup)
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# LocalRAG Configuration
# Auto-created on first run. Edit as needed.

[security]
# "offline": no network access at all (default)
# "egress":  controlled web retrieval to allowlisted domains
mode = "offline"

# Strip quotes and punctuation from queries before they leave the host
sanitize_queries = true
max_query_length = 100

[security.egress]
# Web retrieval also requires mode = "egress"
enabled = false

# Exact domains; subdomains are included. No wildcards.
allowlist_domains = ["arxiv.org"]
# allowlist_domains = ["arxiv.org", "scholar.google.com", "ieeexplore.ieee.org"]

timeout_secs = 10
max_cached_chars = 2000
# user_agent = "LocalRAG/0.1 (research assistant)"

[audit]
enabled = true
# Default: XDG state dir (~/.local/state/localrag/localrag.audit.jsonl)
# file = "~/localrag-audit.jsonl"

[cache]
# Default: XDG cache dir (~/.cache/localrag/web)
# dir = "~/.cache/localrag/web"

[logging]
level = "info"
# format = "json"
"#;
