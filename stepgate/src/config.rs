//! Tool configuration.
//!
//! Default config location: ./stepgate.toml (a missing file means defaults)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub cdc: CdcCheckConfig,
    #[serde(default)]
    pub promotion: PromotionConfig,
    #[serde(default)]
    pub compat: CompatConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_level")]
    pub level: String,
    /// Log output format: "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    /// Checkpoint file
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./.stepgate/state.json")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdcCheckConfig {
    /// Restarts inside this window count towards a restart loop (default: 10 minutes)
    #[serde(default = "default_restart_loop_window_secs")]
    pub restart_loop_window_secs: u64,
    /// Restart count at which a loop is reported (default: 3)
    #[serde(default = "default_restart_loop_max")]
    pub restart_loop_max: u32,
    /// Debezium schema history topic; the coverage check is skipped when unset
    #[serde(default)]
    pub schema_history_topic: Option<String>,
}

fn default_restart_loop_window_secs() -> u64 {
    600
}

fn default_restart_loop_max() -> u32 {
    3
}

impl CdcCheckConfig {
    pub fn restart_loop_window(&self) -> Duration {
        Duration::from_secs(self.restart_loop_window_secs)
    }
}

impl Default for CdcCheckConfig {
    fn default() -> Self {
        Self {
            restart_loop_window_secs: default_restart_loop_window_secs(),
            restart_loop_max: default_restart_loop_max(),
            schema_history_topic: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromotionConfig {
    #[serde(default = "default_confirmation_phrase")]
    pub confirmation_phrase: String,
    /// Checks that must be part of the promotion revalidation
    #[serde(default = "default_required_checks")]
    pub required_checks: Vec<String>,
}

fn default_confirmation_phrase() -> String {
    "PROMOTE".to_string()
}

pub(crate) fn default_required_checks() -> Vec<String> {
    vec!["cdc_debezium_health".to_string(), "schema_parity".to_string()]
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            confirmation_phrase: default_confirmation_phrase(),
            required_checks: default_required_checks(),
        }
    }
}

/// Rule lists for the MySQL 5.7 → 8.0 compatibility check.
/// All comparisons are case-insensitive.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompatConfig {
    #[serde(default = "default_deprecated_sql_modes")]
    pub deprecated_sql_modes: Vec<String>,
    #[serde(default = "default_deprecated_features")]
    pub deprecated_features: Vec<String>,
    #[serde(default = "default_risky_charsets")]
    pub risky_charsets: Vec<String>,
    #[serde(default = "default_risky_collations")]
    pub risky_collations: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn default_deprecated_sql_modes() -> Vec<String> {
    // Removed in 8.0, or deprecated as standalone modes
    strings(&[
        "NO_AUTO_CREATE_USER",
        "NO_FIELD_OPTIONS",
        "NO_KEY_OPTIONS",
        "NO_TABLE_OPTIONS",
        "DB2",
        "MAXDB",
        "MSSQL",
        "MYSQL323",
        "MYSQL40",
        "ORACLE",
        "POSTGRESQL",
        "NO_ZERO_DATE",
        "NO_ZERO_IN_DATE",
    ])
}

fn default_deprecated_features() -> Vec<String> {
    strings(&[
        "QUERY_CACHE",
        "OLD_AUTH",
        "PASSWORD_FUNCTION",
        "ENCRYPT_FUNCTION",
        "GROUP_BY_IMPLICIT_SORT",
    ])
}

fn default_risky_charsets() -> Vec<String> {
    strings(&["utf8", "utf8mb3", "ucs2"])
}

fn default_risky_collations() -> Vec<String> {
    strings(&["utf8_general_ci", "utf8_unicode_ci", "utf8mb3_general_ci", "utf8_bin"])
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            deprecated_sql_modes: default_deprecated_sql_modes(),
            deprecated_features: default_deprecated_features(),
            risky_charsets: default_risky_charsets(),
            risky_collations: default_risky_collations(),
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    let home = || dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()));
    if let Some(rest) = s.strip_prefix("~/") {
        Ok(home()?.join(rest))
    } else if s == "~" {
        home()
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from file path, or fall back to defaults when the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        config.expand_paths()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn expand_paths(&mut self) -> Result<()> {
        self.state.path = expand_tilde(&self.state.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.state.path, PathBuf::from("./.stepgate/state.json"));
        assert_eq!(config.cdc.restart_loop_window(), Duration::from_secs(600));
        assert_eq!(config.cdc.restart_loop_max, 3);
        assert_eq!(config.promotion.confirmation_phrase, "PROMOTE");
        assert_eq!(
            config.promotion.required_checks,
            vec!["cdc_debezium_health", "schema_parity"]
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_or_default(&temp.path().join("stepgate.toml")).unwrap();
        assert_eq!(config.cdc.restart_loop_max, 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stepgate.toml");
        fs::write(
            &path,
            "[cdc]\nrestart_loop_max = 5\nschema_history_topic = \"schema-changes.orders\"\n\n[promotion]\nconfirmation_phrase = \"YES\"\n",
        )
        .unwrap();

        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.cdc.restart_loop_max, 5);
        assert_eq!(config.cdc.restart_loop_window_secs, 600);
        assert_eq!(config.cdc.schema_history_topic.as_deref(), Some("schema-changes.orders"));
        assert_eq!(config.promotion.confirmation_phrase, "YES");
        assert_eq!(config.promotion.required_checks.len(), 2);
        assert!(!config.compat.deprecated_sql_modes.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stepgate.toml");
        fs::write(&path, "[cdc\n").unwrap();
        assert!(matches!(Config::load_or_default(&path), Err(Error::Toml(_))));
    }

    #[test]
    fn test_save_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conf").join("stepgate.toml");
        let mut config = Config::default();
        config.logging.format = "json".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load_or_default(&path).unwrap();
        assert_eq!(loaded.logging.format, "json");
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde(Path::new("~/state.json")).unwrap(), home.join("state.json"));
        assert_eq!(expand_tilde(Path::new("rel/path")).unwrap(), PathBuf::from("rel/path"));
    }
}
