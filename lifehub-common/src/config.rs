//! Configuration loading and root folder resolution

use crate::cache::CacheTtl;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_ENV_VAR: &str = "LIFEHUB_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "lifehub.db";

// ========================================
// TOML configuration
// ========================================

/// Contents of `config.toml`; every section is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<String>,
    pub server: ServerSection,
    pub auth: AuthSection,
    pub cache: CacheTtl,
    pub rate_limit: RateLimitSection,
    pub providers: ProvidersSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Expose internal error details in error envelopes
    pub debug: bool,
    /// Peer addresses whose `X-Forwarded-For` header is believed
    pub trusted_proxies: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            debug: false,
            trusted_proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            access_token_minutes: 60,
            refresh_token_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub enabled: bool,
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: 60,
            per_hour: 1000,
        }
    }
}

/// Third-party endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub translate_base_url: Option<String>,
    pub translate_api_key: Option<String>,
    pub geocoder_base_url: String,
    pub geocoder_user_agent: String,
    pub tesseract_path: String,
    pub ocr_language: String,
    /// Longest a single recognition run may take
    pub ocr_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            openweather_api_key: None,
            openweather_base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            translate_base_url: None,
            translate_api_key: None,
            geocoder_base_url: "https://nominatim.openstreetmap.org".to_string(),
            geocoder_user_agent: format!("lifehub/{}", env!("CARGO_PKG_VERSION")),
            tesseract_path: "tesseract".to_string(),
            ocr_language: "chi_sim+eng".to_string(),
            ocr_timeout_secs: 120,
            request_timeout_secs: 10,
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one the platform config file is
    /// used when present, otherwise built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::Config(format!("Config file not found: {}", p.display())));
                }
                p.to_path_buf()
            }
            None => match find_config_file() {
                Ok(p) => p,
                Err(_) => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }
}

// ========================================
// Root folder
// ========================================

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `root_folder` in the TOML config
/// 4. OS-dependent default
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config: Option<&TomlConfig>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(root) = config.and_then(|c| c.root_folder.as_deref()) {
        return PathBuf::from(root);
    }

    default_root_folder()
}

/// Create the root folder and its media subfolder if missing
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root.join("media"))?;
    Ok(())
}

/// Database path inside a root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join(DATABASE_FILE)
}

/// Default configuration file location for the platform
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("lifehub").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/lifehub/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("lifehub"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/lifehub"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("lifehub"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/lifehub"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("lifehub"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\lifehub"))
    } else {
        PathBuf::from("./lifehub_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var(ROOT_ENV_VAR, "/from/env");
        let root = resolve_root_folder(Some("/from/cli"), ROOT_ENV_VAR, None);
        std::env::remove_var(ROOT_ENV_VAR);
        assert_eq!(root, PathBuf::from("/from/cli"));
    }

    #[test]
    #[serial]
    fn test_env_beats_config_file() {
        let config = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..Default::default()
        };
        std::env::set_var(ROOT_ENV_VAR, "/from/env");
        let root = resolve_root_folder(None, ROOT_ENV_VAR, Some(&config));
        std::env::remove_var(ROOT_ENV_VAR);
        assert_eq!(root, PathBuf::from("/from/env"));

        let root = resolve_root_folder(None, ROOT_ENV_VAR, Some(&config));
        assert_eq!(root, PathBuf::from("/from/toml"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [server]
            port = 9100

            [cache]
            weather = 30

            [rate_limit]
            per_minute = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.cache.weather, 30);
        assert_eq!(config.cache.translation, 86_400);
        assert_eq!(config.rate_limit.per_minute, 5);
        assert_eq!(config.rate_limit.per_hour, 1000);
        assert!(config.providers.openweather_api_key.is_none());
        assert!(config.server.trusted_proxies.is_empty());
        assert_eq!(config.providers.ocr_timeout_secs, 120);
    }

    #[test]
    fn test_trusted_proxies_and_ocr_timeout() {
        let config = TomlConfig::from_toml_str(
            r#"
            [server]
            trusted_proxies = ["127.0.0.1", "::1"]

            [providers]
            ocr_timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.server.trusted_proxies, vec!["127.0.0.1", "::1"]);
        assert_eq!(config.providers.ocr_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("server = [").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = TomlConfig::load(Some(Path::new("/nonexistent/lifehub.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_ensure_root_folder_creates_media() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        ensure_root_folder(&root).unwrap();
        assert!(root.join("media").is_dir());
        assert_eq!(database_path(&root), root.join("lifehub.db"));
    }
}
