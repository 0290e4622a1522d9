//! Configuration for kss-styleguide.
//!
//! User config lives at `~/.kss-styleguide/kss-styleguide.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StyleguideError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kss-styleguide.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kss-styleguide";

// ---------------------------------------------------------------------------
// Config structs (matching kss-styleguide.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Parser settings.
    #[serde(default)]
    pub parse: ParseConfig,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,
}

/// `[parse]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseConfig {
    /// Render section descriptions as Markdown.
    #[serde(default = "default_true")]
    pub markdown: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self { markdown: true }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Directory the CLI writes section output into.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Upper bound on each phase's drain, in seconds. `0` disables the bound.
    #[serde(default = "default_phase_timeout")]
    pub phase_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            phase_timeout_secs: default_phase_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_output_dir() -> String {
    "styleguide".into()
}
fn default_phase_timeout() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Runtime options (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Options forwarded to the documentation model builder.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    /// Render descriptions as Markdown.
    pub markdown: bool,
    /// Builder-specific options, passed through untouched.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            markdown: true,
            extra: BTreeMap::new(),
        }
    }
}

/// Runtime options for one pipeline run.
#[derive(Debug, Clone)]
pub struct StyleguideOptions {
    pub parse: ParseOptions,
    /// Bound on each phase's drain; `None` waits forever.
    pub phase_timeout: Option<Duration>,
}

impl Default for StyleguideOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for StyleguideOptions {
    fn from(config: &AppConfig) -> Self {
        let phase_timeout = match config.build.phase_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            parse: ParseOptions {
                markdown: config.parse.markdown,
                extra: BTreeMap::new(),
            },
            phase_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kss-styleguide/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StyleguideError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kss-styleguide/kss-styleguide.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StyleguideError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        StyleguideError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StyleguideError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StyleguideError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StyleguideError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("markdown = true"));
        assert!(toml_str.contains("phase_timeout_secs = 300"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[build]
output_dir = "/tmp/guide"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.build.output_dir, "/tmp/guide");
        assert_eq!(config.build.phase_timeout_secs, 300);
        assert!(config.parse.markdown);
    }

    #[test]
    fn options_from_app_config() {
        let mut app = AppConfig::default();
        let options = StyleguideOptions::from(&app);
        assert!(options.parse.markdown);
        assert_eq!(options.phase_timeout, Some(Duration::from_secs(300)));

        app.parse.markdown = false;
        app.build.phase_timeout_secs = 0;
        let options = StyleguideOptions::from(&app);
        assert!(!options.parse.markdown);
        assert_eq!(options.phase_timeout, None);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = std::env::temp_dir().join(format!("kss-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("broken.toml");
        std::fs::write(&path, "[parse\nmarkdown = ").expect("write");

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("config error"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
