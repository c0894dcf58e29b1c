//! Configuration system for FyneDesk
//!
//! Loads configuration from TOML file at `~/.config/fynedesk/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::x::keymap::parse_modifiers;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub decorations: DecorationConfig,
    pub mouse: MouseConfig,
    pub shortcuts: Vec<ShortcutConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            decorations: DecorationConfig::default(),
            mouse: MouseConfig::default(),
            shortcuts: default_shortcuts(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing a default file if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file not found at {:?}, using defaults", path);
            if let Err(e) = Self::save_default(path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("fynedesk");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Lock-key combinations bindings fire regardless of, e.g. "lock-mod2"
    pub ignore_modifiers: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            ignore_modifiers: vec![
                String::new(),
                "lock".to_string(),
                "mod2".to_string(),
                "lock-mod2".to_string(),
            ],
        }
    }
}

impl InputConfig {
    /// Parse `ignore_modifiers` into masks; an empty list still ignores nothing
    pub fn ignore_mods(&self) -> Result<Vec<u16>> {
        let mut mods = self
            .ignore_modifiers
            .iter()
            .map(|s| parse_modifiers(s).map_err(anyhow::Error::from))
            .collect::<Result<Vec<u16>>>()
            .context("Invalid [input] ignore_modifiers")?;
        if !mods.contains(&0) {
            mods.insert(0, 0);
        }
        Ok(mods)
    }
}

/// Window decoration geometry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecorationConfig {
    pub titlebar_height: u32,
    pub border_width: u32,
}

impl Default for DecorationConfig {
    fn default() -> Self {
        Self {
            titlebar_height: 24,
            border_width: 4,
        }
    }
}

/// Mouse configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseConfig {
    /// Button binding that drags a window from anywhere inside it
    pub move_binding: String,
    /// Focus a window when its frame is clicked
    pub focus_on_click: bool,
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            move_binding: "Mod1-1".to_string(),
            focus_on_click: true,
        }
    }
}

/// One keyboard shortcut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortcutConfig {
    /// Key binding string such as "Mod4-Tab"
    pub binding: String,
    /// close_window, toggle_maximize, minimize, focus_next, focus_previous,
    /// quit or spawn
    pub action: String,
    /// Command line for `spawn`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl ShortcutConfig {
    pub fn new(binding: &str, action: &str) -> Self {
        Self {
            binding: binding.to_string(),
            action: action.to_string(),
            command: None,
        }
    }
}

/// Default shortcuts written to a fresh config file
pub fn default_shortcuts() -> Vec<ShortcutConfig> {
    vec![
        ShortcutConfig::new("Mod1-F4", "close_window"),
        ShortcutConfig::new("Mod4-Up", "toggle_maximize"),
        ShortcutConfig::new("Mod4-Down", "minimize"),
        ShortcutConfig::new("Mod1-Tab", "focus_next"),
        ShortcutConfig::new("Mod1-shift-Tab", "focus_previous"),
        ShortcutConfig {
            command: Some("xterm".to_string()),
            ..ShortcutConfig::new("Mod4-Return", "spawn")
        },
        ShortcutConfig::new("Mod4-shift-q", "quit"),
    ]
}
