//! Configuration loading.
//!
//! Loads the defence configuration from `./self-defence.toml` (or
//! `$SELF_DEFENCE_CONFIG`). Environment variables override file values;
//! file values override defaults. A missing file yields defaults, which
//! declare no region, so the filter does nothing.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::region::RegionSpec;
use crate::scope::{PolicyBuilder, PolicySet, ScopeId};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SELF_DEFENCE_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is not set.
pub const DEFAULT_CONFIG_FILE: &str = "self-defence.toml";

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
///
/// Every table rejects unknown keys: a misspelled key would otherwise fall
/// back to a default, and the default action target is reject.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefenceConfig {
    /// Log level and optional log directory.
    pub logging: LoggingConfig,
    /// Control region declaration (`[region]`). TOML rejects a second one.
    pub region: Option<RegionSpec>,
    /// Main scope (`[main]`).
    pub main: ScopeConfig,
    /// Servers (`[[server]]`), each with optional locations.
    #[serde(rename = "server")]
    pub servers: Vec<ServerConfig>,
}

impl DefenceConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$SELF_DEFENCE_CONFIG` or `./self-defence.toml`.
    /// If the file does not exist, returns defaults.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with a custom env resolver (for testing).
    fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = Self::config_path_with(&env);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read config file {}: {e}",
                    path.display()
                ))
            }
        };
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from an explicit path. A missing file is an error here.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Resolve config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        match env(CONFIG_PATH_ENV) {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var` in tests).
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SELF_DEFENCE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("SELF_DEFENCE_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(v));
        }
    }

    /// Parse a TOML string into config.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: DefenceConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Register everything in document order and resolve inheritance.
    ///
    /// Region first, then main, then each server followed by its locations,
    /// so every registration check runs exactly as if declared by hand.
    pub fn build_policies(&self) -> Result<PolicySet, ConfigError> {
        let mut builder = PolicyBuilder::new();
        if let Some(spec) = self.region {
            builder.declare_region(spec)?;
        }
        self.main.register(&mut builder, PolicyBuilder::MAIN)?;

        for server in &self.servers {
            let server_id = builder.server(&server.name)?;
            register_scope(&mut builder, server_id, server.offset, &server.actions)?;
            for location in &server.locations {
                let location_id = builder.location(server_id, &location.path)?;
                register_scope(&mut builder, location_id, location.offset, &location.actions)?;
            }
        }

        Ok(builder.build())
    }
}

// ── Logging config ──────────────────────────────────────────────

/// Logging settings (`[logging]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Tracing level filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotated JSON logs; stderr only when absent.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

// ── Scope config ────────────────────────────────────────────────

/// Settings of the main scope (`[main]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeConfig {
    /// Control region byte this scope observes.
    pub offset: Option<i64>,
    /// Actions (`[[main.action]]`), in match priority order.
    #[serde(rename = "action")]
    pub actions: Vec<ActionConfig>,
}

impl ScopeConfig {
    fn register(&self, builder: &mut PolicyBuilder, scope: ScopeId) -> Result<(), ConfigError> {
        register_scope(builder, scope, self.offset, &self.actions)
    }
}

// Server and location tables list the scope fields directly;
// `deny_unknown_fields` does not reach through `#[serde(flatten)]`.
fn register_scope(
    builder: &mut PolicyBuilder,
    scope: ScopeId,
    offset: Option<i64>,
    actions: &[ActionConfig],
) -> Result<(), ConfigError> {
    if let Some(offset) = offset {
        builder.set_offset(scope, offset)?;
    }
    for action in actions {
        builder.add_action(scope, action.value, action.target.as_deref(), action.ratio)?;
    }
    Ok(())
}

/// One `[[...action]]` entry, unvalidated.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    /// Trigger byte.
    pub value: i64,
    /// `@name`, `/path`, or absent for reject.
    #[serde(default)]
    pub target: Option<String>,
    /// Sampling ratio, default 100.
    #[serde(default)]
    pub ratio: Option<i64>,
}

/// A `[[server]]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name requests are routed by.
    pub name: String,
    /// Control region byte this server observes.
    #[serde(default)]
    pub offset: Option<i64>,
    /// Actions (`[[server.action]]`), in match priority order.
    #[serde(default, rename = "action")]
    pub actions: Vec<ActionConfig>,
    /// Locations (`[[server.location]]`).
    #[serde(default, rename = "location")]
    pub locations: Vec<LocationConfig>,
}

/// A `[[server.location]]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    /// Location path.
    pub path: String,
    /// Control region byte this location observes.
    #[serde(default)]
    pub offset: Option<i64>,
    /// Actions (`[[server.location.action]]`), in match priority order.
    #[serde(default, rename = "action")]
    pub actions: Vec<ActionConfig>,
}

// ── Tests ───────────────────────────────────────────────────────
