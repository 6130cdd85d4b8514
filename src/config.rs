//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/factory-canvas/canvas.toml`
//! 3. Local config: file passed with `--config`
//! 4. Environment variables: `FCANVAS__<SECTION>__<KEY>`

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::Purity;

/// Values used for payload fields a script leaves out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Overclock percentage for new recipes
    pub overclock: u32,
    /// Machine count for new recipes
    pub machine_count: u32,
    /// Frame width for new factories
    pub frame_width: f64,
    /// Frame height for new factories
    pub frame_height: f64,
    /// Purity for new resource nodes
    pub purity: Purity,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            overclock: 100,
            machine_count: 1,
            frame_width: 320.0,
            frame_height: 240.0,
            purity: Purity::Normal,
        }
    }
}

/// Tree rendering options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Prefix each node with its entity id
    pub show_ids: bool,
    /// Colorize terminal output
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_ids: true,
            color: true,
        }
    }
}

/// Raw defaults for intermediate parsing (`None` = not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawDefaultsConfig {
    pub overclock: Option<u32>,
    pub machine_count: Option<u32>,
    pub frame_width: Option<f64>,
    pub frame_height: Option<f64>,
    pub purity: Option<Purity>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawDisplayConfig {
    pub show_ids: Option<bool>,
    pub color: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub defaults: RawDefaultsConfig,
    pub display: RawDisplayConfig,
}

/// Unified configuration for factory-canvas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub defaults: DefaultsConfig,
    pub display: DisplayConfig,
}

/// Get the XDG config directory for factory-canvas.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "factory-canvas").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("canvas.toml"))
}

/// Expand `~`, `$VAR` and `${VAR}` in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string());
    PathBuf::from(expanded)
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        let d = &overlay.defaults;
        let v = &overlay.display;
        Self {
            defaults: DefaultsConfig {
                overclock: d.overclock.unwrap_or(self.defaults.overclock),
                machine_count: d.machine_count.unwrap_or(self.defaults.machine_count),
                frame_width: d.frame_width.unwrap_or(self.defaults.frame_width),
                frame_height: d.frame_height.unwrap_or(self.defaults.frame_height),
                purity: d.purity.unwrap_or(self.defaults.purity),
            },
            display: DisplayConfig {
                show_ids: v.show_ids.unwrap_or(self.display.show_ids),
                color: v.color.unwrap_or(self.display.color),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local` - Optional config file given on the command line
    ///
    /// A missing global file is skipped; a missing local file is an error.
    pub fn load(local: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_from(global_config_path().as_deref(), local)
    }

    /// Same layering as [`Settings::load`] with an explicit global config path.
    ///
    /// `None` skips the global layer entirely.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config
        if let Some(global_path) = global {
            if global_path.exists() {
                let raw = load_raw_settings(global_path)?;
                current = current.merge_with(&raw);
            }
        }

        // 3. Local config
        if let Some(path) = local {
            let raw = load_raw_settings(path)?;
            current = current.merge_with(&raw);
        }

        // 4. Environment variables (explicit override)
        Self::apply_env_overrides(current)
    }

    /// Apply FCANVAS__* environment variables as explicit overrides.
    ///
    /// A variable that is set but does not parse is a config error.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("FCANVAS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_err)?;

        if let Some(val) = env_override(&config, "defaults.overclock")? {
            settings.defaults.overclock = val;
        }
        if let Some(val) = env_override(&config, "defaults.machine_count")? {
            settings.defaults.machine_count = val;
        }
        if let Some(val) = env_override(&config, "defaults.frame_width")? {
            settings.defaults.frame_width = val;
        }
        if let Some(val) = env_override(&config, "defaults.frame_height")? {
            settings.defaults.frame_height = val;
        }
        if let Some(val) = env_override::<String>(&config, "defaults.purity")? {
            settings.defaults.purity = val
                .parse()
                .map_err(|e| env_err("defaults.purity", e))?;
        }
        if let Some(val) = env_override(&config, "display.show_ids")? {
            settings.display.show_ids = val;
        }
        if let Some(val) = env_override(&config, "display.color")? {
            settings.display.color = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }
}

/// Reads one override; `None` when the variable is not set.
fn env_override<T: DeserializeOwned>(config: &Config, key: &str) -> Result<Option<T>, ApplicationError> {
    match config.get::<T>(key) {
        Ok(val) => Ok(Some(val)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(env_err(key, e)),
    }
}

fn env_err(key: &str, e: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::Config {
        message: format!("FCANVAS__{}: {}", key.replace('.', "__").to_uppercase(), e),
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_default_settings_then_matches_game_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.defaults.overclock, 100);
        assert_eq!(settings.defaults.machine_count, 1);
        assert_eq!(settings.defaults.purity, Purity::Normal);
        assert!(settings.display.show_ids);
    }

    #[test]
    fn given_partial_overlay_when_merging_then_unspecified_fields_are_kept() {
        let base = Settings::default();
        let overlay: RawSettings = toml::from_str(
            r#"
[defaults]
overclock = 250
purity = "pure"
"#,
        )
        .unwrap();

        let merged = base.merge_with(&overlay);

        assert_eq!(merged.defaults.overclock, 250);
        assert_eq!(merged.defaults.purity, Purity::Pure);
        assert_eq!(merged.defaults.machine_count, 1);
        assert_eq!(merged.display, DisplayConfig::default());
    }

    #[test]
    fn given_settings_when_to_toml_then_contains_sections() {
        let toml = Settings::default().to_toml().unwrap();
        assert!(toml.contains("[defaults]"));
        assert!(toml.contains("[display]"));
        assert!(toml.contains("purity = \"normal\""));
    }

    #[test]
    fn given_tilde_path_when_expand_then_uses_home() {
        let home = std::env::var("HOME").expect("HOME should be set");
        let expanded = expand_path("~/canvas.toml");
        assert!(expanded.to_string_lossy().starts_with(&home));
    }
}
