use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LunaConfig {
    // Discord credential (bot token)
    #[serde(default)]
    pub discord_token: Option<String>,

    // The one counterpart Luna pays attention to
    #[serde(default)]
    pub target_bot_id: String,

    // Relationship state file
    #[serde(default = "default_memory_path")]
    pub memory_path: String,

    // Pacing
    #[serde(default = "default_thinking_min_secs")]
    pub thinking_min_secs: f64,
    #[serde(default = "default_thinking_max_secs")]
    pub thinking_max_secs: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
    #[serde(default = "default_space_delay_secs")]
    pub space_delay_secs: f64,
}

fn default_memory_path() -> String {
    "luna_memory.json".to_string()
}

fn default_thinking_min_secs() -> f64 {
    2.0
}

fn default_thinking_max_secs() -> f64 {
    4.0
}

fn default_cooldown_secs() -> f64 {
    8.0
}

fn default_space_delay_secs() -> f64 {
    2.0
}

impl Default for LunaConfig {
    fn default() -> Self {
        Self {
            discord_token: None,
            target_bot_id: String::new(),
            memory_path: default_memory_path(),
            thinking_min_secs: default_thinking_min_secs(),
            thinking_max_secs: default_thinking_max_secs(),
            cooldown_secs: default_cooldown_secs(),
            space_delay_secs: default_space_delay_secs(),
        }
    }
}

/// Delays used by the reaction dispatcher, validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionTiming {
    pub thinking_min_secs: f64,
    pub thinking_max_secs: f64,
    pub cooldown: Duration,
    pub space_delay: Duration,
}

impl ReactionTiming {
    /// No delays at all.
    pub fn immediate() -> Self {
        Self {
            thinking_min_secs: 0.0,
            thinking_max_secs: 0.0,
            cooldown: Duration::ZERO,
            space_delay: Duration::ZERO,
        }
    }
}

impl LunaConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("luna_config.toml")
    }

    /// Load luna_config.toml (next to the executable) if present, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let path = Self::config_path();

        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<LunaConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("No config file at {:?}, using defaults + env vars", path);
                Self::default()
            }
        };

        config.apply_env(|key| env::var(key).ok());
        config
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let token = lookup("TOKEN")
            .filter(|token| !token.trim().is_empty())
            .or_else(|| lookup("DISCORD_TOKEN"));
        if let Some(token) = token {
            if !token.trim().is_empty() {
                self.discord_token = Some(token.trim().to_string());
            }
        }

        if let Some(id) = lookup("TARGET_BOT_ID") {
            if !id.trim().is_empty() {
                self.target_bot_id = id.trim().to_string();
            }
        }

        if let Some(path) = lookup("LUNA_MEMORY_FILE") {
            if !path.trim().is_empty() {
                self.memory_path = path;
            }
        }

        let seconds = |key: &str| lookup(key).and_then(|raw| raw.trim().parse::<f64>().ok());

        if let Some(secs) = seconds("LUNA_THINKING_MIN_SECS") {
            self.thinking_min_secs = secs;
        }

        if let Some(secs) = seconds("LUNA_THINKING_MAX_SECS") {
            self.thinking_max_secs = secs;
        }

        if let Some(secs) = seconds("LUNA_COOLDOWN_SECS") {
            self.cooldown_secs = secs;
        }

        if let Some(secs) = seconds("LUNA_SPACE_DELAY_SECS") {
            self.space_delay_secs = secs;
        }
    }

    pub fn timing(&self) -> Result<ReactionTiming> {
        for (name, value) in [
            ("thinking_min_secs", self.thinking_min_secs),
            ("thinking_max_secs", self.thinking_max_secs),
            ("cooldown_secs", self.cooldown_secs),
            ("space_delay_secs", self.space_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a non-negative number, got {}", name, value);
            }
        }
        if self.thinking_min_secs > self.thinking_max_secs {
            bail!(
                "thinking_min_secs ({}) exceeds thinking_max_secs ({})",
                self.thinking_min_secs,
                self.thinking_max_secs
            );
        }

        Ok(ReactionTiming {
            thinking_min_secs: self.thinking_min_secs,
            thinking_max_secs: self.thinking_max_secs,
            cooldown: Duration::from_secs_f64(self.cooldown_secs),
            space_delay: Duration::from_secs_f64(self.space_delay_secs),
        })
    }
}
