//! Configuration resolution for pcm-matcher
//!
//! Provides multi-tier configuration resolution with Database → ENV → TOML priority.

use pcm_common::config::TomlConfig;
use pcm_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable carrying the resolver API key
pub const RESOLVER_API_KEY_ENV: &str = "PCM_RESOLVER_API_KEY";

/// Older variable name still honoured when the primary one is unset
pub const LEGACY_API_KEY_ENV: &str = "KIMI_API_KEY";

/// Settings key synced to the TOML file
pub const RESOLVER_API_KEY_SETTING: &str = "resolver_api_key";

/// Where a resolved key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Database,
    Environment,
    Toml,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Database => "database",
            KeySource::Environment => "environment",
            KeySource::Toml => "TOML",
        }
    }
}

fn env_api_key() -> Option<String> {
    [RESOLVER_API_KEY_ENV, LEGACY_API_KEY_ENV]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|key| is_valid_key(key))
}

/// Resolve the resolver API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_resolver_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<(String, KeySource)> {
    let db_key = crate::db::settings::get_resolver_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = env_api_key();
    let toml_key = toml_config
        .resolver
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| KeySource::Database),
        env_key.as_ref().map(|_| KeySource::Environment),
        toml_key.as_ref().map(|_| KeySource::Toml),
    ]
    .into_iter()
    .flatten()
    .map(|s| s.as_str())
    .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Resolver API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    let resolved = db_key
        .map(|k| (k, KeySource::Database))
        .or_else(|| env_key.map(|k| (k, KeySource::Environment)))
        .or_else(|| toml_key.map(|k| (k, KeySource::Toml)));

    match resolved {
        Some((key, source)) => {
            info!("Resolver API key loaded from {}", source.as_str());
            Ok((key, source))
        }
        None => Err(Error::Config(format!(
            "Resolver API key not configured. Please configure using one of:\n\
             1. HTTP: POST /api/settings/resolver_api_key\n\
             2. Environment: {}=your-key-here\n\
             3. TOML config: [resolver] api_key = \"your-key\"",
            RESOLVER_API_KEY_ENV
        ))),
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Sync settings from database to TOML file
///
/// Best-effort: a failed TOML write is logged and swallowed because the
/// database copy is authoritative.
pub async fn sync_settings_to_toml(settings: HashMap<String, String>, toml_path: &Path) -> Result<()> {
    let mut config = pcm_common::config::load_toml_config_or_default(toml_path)?;

    if let Some(key) = settings.get(RESOLVER_API_KEY_SETTING) {
        config.resolver.api_key = Some(key.clone());
    }

    match pcm_common::config::write_toml_config(&config, toml_path) {
        Ok(()) => {
            info!("Settings synced to TOML: {}", toml_path.display());
            Ok(())
        }
        Err(e) => {
            warn!("TOML write failed (database write succeeded): {}", e);
            Ok(())
        }
    }
}

/// Copy an ENV/TOML key into the database so later edits go through one place
pub async fn migrate_key_to_database(
    key: String,
    source: KeySource,
    db: &Pool<Sqlite>,
    toml_path: &Path,
) -> Result<()> {
    crate::db::settings::set_resolver_api_key(db, key.clone()).await?;

    // ENV keys get a TOML backup
    if source == KeySource::Environment {
        let mut settings = HashMap::new();
        settings.insert(RESOLVER_API_KEY_SETTING.to_string(), key);
        sync_settings_to_toml(settings, toml_path).await?;
    }

    info!("Resolver API key migrated from {} to database", source.as_str());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var(RESOLVER_API_KEY_ENV);
        std::env::remove_var(LEGACY_API_KEY_ENV);
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("sk-abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[tokio::test]
    #[serial]
    async fn test_database_key_wins() {
        clear_env();
        let pool = init_memory_pool().await.unwrap();
        crate::db::settings::set_resolver_api_key(&pool, "db-key".to_string())
            .await
            .unwrap();
        std::env::set_var(RESOLVER_API_KEY_ENV, "env-key");

        let mut config = TomlConfig::default();
        config.resolver.api_key = Some("toml-key".to_string());

        let (key, source) = resolve_resolver_api_key(&pool, &config).await.unwrap();
        assert_eq!(key, "db-key");
        assert_eq!(source, KeySource::Database);
        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_legacy_env_key() {
        clear_env();
        let pool = init_memory_pool().await.unwrap();
        std::env::set_var(LEGACY_API_KEY_ENV, "legacy-key");

        let (key, source) = resolve_resolver_api_key(&pool, &TomlConfig::default())
            .await
            .unwrap();
        assert_eq!(key, "legacy-key");
        assert_eq!(source, KeySource::Environment);
        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_toml_key_and_missing_key() {
        clear_env();
        let pool = init_memory_pool().await.unwrap();

        let result = resolve_resolver_api_key(&pool, &TomlConfig::default()).await;
        assert!(matches!(result, Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config.resolver.api_key = Some("toml-key".to_string());
        let (key, source) = resolve_resolver_api_key(&pool, &config).await.unwrap();
        assert_eq!(key, "toml-key");
        assert_eq!(source, KeySource::Toml);
    }

    #[tokio::test]
    async fn test_sync_settings_to_toml_preserves_other_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pcm-matcher.toml");

        let mut config = TomlConfig::default();
        config.port = 6000;
        pcm_common::config::write_toml_config(&config, &path).unwrap();

        let mut settings = HashMap::new();
        settings.insert(RESOLVER_API_KEY_SETTING.to_string(), "synced".to_string());
        sync_settings_to_toml(settings, &path).await.unwrap();

        let reloaded = pcm_common::config::load_toml_config(&path).unwrap();
        assert_eq!(reloaded.port, 6000);
        assert_eq!(reloaded.resolver.api_key.as_deref(), Some("synced"));
    }
}
