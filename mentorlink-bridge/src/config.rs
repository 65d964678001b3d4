//! Configuration system for the `MentorLink` bridge server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/mentorlink/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

/// Errors that can occur when loading bridge configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the bridge.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BridgeConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the bridge config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    history_capacity: Option<usize>,
    question_ttl_secs: Option<u64>,
    register_grace_secs: Option<u64>,
    max_payload_size: Option<usize>,
    outbound_queue_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the bridge server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "MentorLink bridge server")]
pub struct BridgeCliArgs {
    /// Address to bind the bridge server to.
    #[arg(short, long, env = "MENTORLINK_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/mentorlink/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of conversation entries replayed to late joiners.
    #[arg(long)]
    pub history_capacity: Option<usize>,

    /// Seconds a pending question stays answerable.
    #[arg(long)]
    pub question_ttl_secs: Option<u64>,

    /// Seconds a connection may stay silent before Register.
    #[arg(long)]
    pub register_grace_secs: Option<u64>,

    /// Maximum inbound frame size in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Outbound queue capacity per connection.
    #[arg(long)]
    pub outbound_queue_size: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "MENTORLINK_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved bridge server configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9400`).
    pub bind_addr: String,
    /// Number of conversation entries replayed to late joiners.
    pub history_capacity: usize,
    /// Seconds a pending question stays answerable.
    pub question_ttl_secs: u64,
    /// Seconds a connection may stay silent before Register.
    pub register_grace_secs: u64,
    /// Maximum inbound frame size in bytes.
    pub max_payload_size: usize,
    /// Outbound queue capacity per connection.
    pub outbound_queue_size: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9400".to_string(),
            history_capacity: 16,
            question_ttl_secs: 300,
            register_grace_secs: 10,
            max_payload_size: 64 * 1024,
            outbound_queue_size: 64,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &BridgeCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `BridgeConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &BridgeCliArgs, file: &BridgeConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            history_capacity: cli
                .history_capacity
                .or(file.server.history_capacity)
                .unwrap_or(defaults.history_capacity),
            question_ttl_secs: cli
                .question_ttl_secs
                .or(file.server.question_ttl_secs)
                .unwrap_or(defaults.question_ttl_secs),
            register_grace_secs: cli
                .register_grace_secs
                .or(file.server.register_grace_secs)
                .unwrap_or(defaults.register_grace_secs),
            max_payload_size: cli
                .max_payload_size
                .or(file.server.max_payload_size)
                .unwrap_or(defaults.max_payload_size),
            outbound_queue_size: cli
                .outbound_queue_size
                .or(file.server.outbound_queue_size)
                .unwrap_or(defaults.outbound_queue_size),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the bridge.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<BridgeConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(BridgeConfigFile::default());
        };
        config_dir.join("mentorlink").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
