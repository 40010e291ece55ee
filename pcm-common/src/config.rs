//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a TOML file. Every section is optional and
//! falls back to built-in defaults, so an empty file (or no file) is valid.
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PCM_ROOT_FOLDER`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "PCM_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "pcm.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            resolver: ResolverConfig::default(),
            matching: MatchingConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// External resolver (LLM) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Base URL of the messages-compatible endpoint
    #[serde(default = "default_resolver_base_url")]
    pub base_url: String,

    #[serde(default = "default_resolver_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP timeout per request
    #[serde(default = "default_resolver_http_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum spacing between requests
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// API key (lowest priority source, see pcm-matcher config resolution)
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_resolver_base_url(),
            model: default_resolver_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_resolver_http_timeout_secs(),
            min_interval_ms: default_min_interval_ms(),
            api_key: None,
        }
    }
}

/// Matching behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Learn from confirmed feedback (memo lookups and resolver examples)
    #[serde(default = "default_true")]
    pub enable_history: bool,

    /// Retention window for confirmed mappings
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    #[serde(default = "default_min_confirmation_count")]
    pub min_confirmation_count: u32,

    /// Caller-side timeout wrapped around every resolver invocation
    #[serde(default = "default_resolver_timeout_secs")]
    pub resolver_timeout_secs: u64,

    #[serde(default = "default_max_history_examples")]
    pub max_history_examples: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enable_history: true,
            history_days: default_history_days(),
            min_confirmation_count: default_min_confirmation_count(),
            resolver_timeout_secs: default_resolver_timeout_secs(),
            max_history_examples: default_max_history_examples(),
        }
    }
}

/// Closed-world validation flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Any violation fails the match when set (the default).
    ///
    /// When cleared, a result with violations but no warnings still passes and
    /// keeps its label, so a label outside the candidate vocabulary can reach
    /// the caller. Lenient mode gives up the closed-world guarantee.
    #[serde(default = "default_true")]
    pub strict_mode: bool,

    #[serde(default)]
    pub allow_cross_province: bool,

    #[serde(default)]
    pub allow_fabricated: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            allow_cross_province: false,
            allow_fabricated: false,
        }
    }
}

fn default_port() -> u16 {
    5731
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_resolver_base_url() -> String {
    "https://api.moonshot.cn/anthropic".to_string()
}

fn default_resolver_model() -> String {
    "kimi-k2-thinking-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_resolver_http_timeout_secs() -> u64 {
    30
}

fn default_min_interval_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_history_days() -> u32 {
    30
}

fn default_min_confirmation_count() -> u32 {
    3
}

fn default_resolver_timeout_secs() -> u64 {
    30
}

fn default_max_history_examples() -> usize {
    5
}

/// Load TOML config from an explicit path
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Load TOML config, falling back to defaults when the file does not exist
pub fn load_toml_config_or_default(path: &Path) -> Result<TomlConfig> {
    if path.exists() {
        load_toml_config(path)
    } else {
        tracing::debug!("No config file at {}, using defaults", path.display());
        Ok(TomlConfig::default())
    }
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;

    // File may carry the resolver API key
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Default per-user config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("pcm").join("pcm-matcher.toml"))
        .unwrap_or_else(|| PathBuf::from("pcm-matcher.toml"))
}

/// Resolve the root folder following the priority order in the module docs
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/pcm
        dirs::data_local_dir()
            .map(|d| d.join("pcm"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/pcm"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("pcm"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pcm"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("pcm"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pcm"))
    } else {
        PathBuf::from("./pcm_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, 5731);
        assert_eq!(config.logging.level, "info");
        assert!(config.matching.enable_history);
        assert_eq!(config.matching.history_days, 30);
        assert_eq!(config.matching.min_confirmation_count, 3);
        assert_eq!(config.matching.max_history_examples, 5);
        assert!(config.validation.strict_mode);
        assert!(!config.validation.allow_cross_province);
        assert!(!config.validation.allow_fabricated);
        assert_eq!(config.resolver.model, "kimi-k2-thinking-turbo");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [matching]
            min_confirmation_count = 5

            [validation]
            strict_mode = false
            "#,
        )
        .unwrap();
        assert_eq!(config.matching.min_confirmation_count, 5);
        assert_eq!(config.matching.history_days, 30);
        assert!(!config.validation.strict_mode);
        assert!(!config.validation.allow_fabricated);
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("pcm-matcher.toml");

        let mut config = TomlConfig::default();
        config.resolver.api_key = Some("sk-test".to_string());
        config.port = 6000;
        write_toml_config(&config, &path).unwrap();

        let loaded = load_toml_config(&path).unwrap();
        assert_eq!(loaded.port, 6000);
        assert_eq!(loaded.resolver.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_toml_config_or_default(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.port, 5731);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_root_folder_cli_wins() {
        std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolved = resolve_root_folder(Some(Path::new("/from/cli")), &config);
        std::env::remove_var(ROOT_FOLDER_ENV);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    #[serial]
    fn test_root_folder_env_before_toml() {
        std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolved = resolve_root_folder(None, &config);
        std::env::remove_var(ROOT_FOLDER_ENV);
        assert_eq!(resolved, PathBuf::from("/from/env"));
    }

    #[test]
    #[serial]
    fn test_root_folder_toml_then_default() {
        std::env::remove_var(ROOT_FOLDER_ENV);
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));

        let fallback = resolve_root_folder(None, &TomlConfig::default());
        assert!(fallback.ends_with("pcm") || fallback.ends_with("pcm_data"));
    }

    #[test]
    fn test_database_path() {
        assert_eq!(
            database_path(Path::new("/data/pcm")),
            PathBuf::from("/data/pcm/pcm.db")
        );
    }
}
