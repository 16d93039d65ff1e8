//! Configuration module for randtext-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::protocol::{Framing, LengthMode};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the text server
#[derive(Parser, Debug)]
#[command(name = "randtext-server")]
#[command(author = "randtext-server authors")]
#[command(version = "0.1.0")]
#[command(about = "Streams randomly generated text items over TCP", long_about = None)]
pub struct CliArgs {
    /// TCP port to listen on
    pub port: u16,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host address to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Listen backlog size
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Timeout for receiving the request header, in milliseconds
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Timeout for each response write, in milliseconds
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Longest text a request may ask for, in bytes
    #[arg(long)]
    pub max_text_len: Option<u32>,

    /// How item lengths are drawn from the requested range
    #[arg(long, value_enum)]
    pub length_mode: Option<LengthMode>,

    /// How item boundaries are marked in the response
    #[arg(long, value_enum)]
    pub framing: Option<Framing>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub text: TextConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen backlog size
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            backlog: default_backlog(),
            workers: None,
        }
    }
}

/// Per-connection timeouts
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Text generation configuration
#[derive(Debug, Deserialize)]
pub struct TextConfig {
    /// Longest text a request may ask for
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default)]
    pub length_mode: LengthMode,
    #[serde(default)]
    pub framing: Framing,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            length_mode: LengthMode::default(),
            framing: Framing::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_backlog() -> u32 {
    1024
}

fn default_timeout_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_max_length() -> u32 {
    1024 * 1024 // 1 MiB
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backlog: u32,
    pub workers: Option<usize>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_text_len: u32,
    pub length_mode: LengthMode,
    pub framing: Framing,
    pub log_level: String,
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self::merge(
            CliArgs {
                port: 0,
                config: None,
                host: None,
                backlog: None,
                workers: None,
                read_timeout_ms: None,
                write_timeout_ms: None,
                max_text_len: None,
                length_mode: None,
                framing: None,
                log_level: None,
            },
            TomlConfig::default(),
        )
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::try_parse().map_err(ConfigError::Args)?;

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port,
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            workers: cli.workers.or(toml_config.server.workers),
            read_timeout: Duration::from_millis(
                cli.read_timeout_ms
                    .unwrap_or(toml_config.connection.read_timeout_ms),
            ),
            write_timeout: Duration::from_millis(
                cli.write_timeout_ms
                    .unwrap_or(toml_config.connection.write_timeout_ms),
            ),
            max_text_len: cli.max_text_len.unwrap_or(toml_config.text.max_length),
            length_mode: cli.length_mode.unwrap_or(toml_config.text.length_mode),
            framing: cli.framing.unwrap_or(toml_config.text.framing),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Address string to bind the listener to.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    Args(clap::Error),
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Args(e) => write!(f, "{}", e.render().to_string().trim_end()),
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("randtext-server").chain(args.iter().copied()))
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.backlog, 1024);
        assert_eq!(config.connection.read_timeout_ms, 30_000);
        assert_eq!(config.text.max_length, 1024 * 1024);
        assert_eq!(config.text.length_mode, LengthMode::Uniform);
        assert_eq!(config.text.framing, Framing::LengthPrefixed);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            backlog = 128
            workers = 4

            [connection]
            read_timeout_ms = 500
            write_timeout_ms = 2000

            [text]
            max_length = 4096
            length_mode = "legacy"
            framing = "raw"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.server.workers, Some(4));
        assert_eq!(config.connection.read_timeout_ms, 500);
        assert_eq!(config.connection.write_timeout_ms, 2000);
        assert_eq!(config.text.max_length, 4096);
        assert_eq!(config.text.length_mode, LengthMode::Legacy);
        assert_eq!(config.text.framing, Framing::Raw);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_port_is_single_positional() {
        let cli = parse(&["7000"]).unwrap();
        assert_eq!(cli.port, 7000);

        assert!(parse(&[]).is_err());
        assert!(parse(&["7000", "7001"]).is_err());
        assert!(parse(&["http"]).is_err());
        assert!(parse(&["70000"]).is_err());
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = parse(&[
            "9000",
            "--host",
            "127.0.0.1",
            "--read-timeout-ms",
            "250",
            "--length-mode",
            "legacy",
            "--framing",
            "raw",
        ])
        .unwrap();

        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            host = "10.0.0.1"
            backlog = 64

            [connection]
            read_timeout_ms = 9999
        "#,
        )
        .unwrap();

        let config = Config::merge(cli, toml_config);
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.backlog, 64);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.write_timeout, Duration::from_secs(30));
        assert_eq!(config.length_mode, LengthMode::Legacy);
        assert_eq!(config.framing, Framing::Raw);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_log_level_overrides_toml() {
        let file = r#"
            [logging]
            level = "debug"
        "#;

        let cli = parse(&["9000", "--log-level", "info"]).unwrap();
        let config = Config::merge(cli, toml::from_str(file).unwrap());
        assert_eq!(config.log_level, "info");

        let cli = parse(&["9000"]).unwrap();
        let config = Config::merge(cli, toml::from_str(file).unwrap());
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_listen_addr() {
        let mut config = Config {
            host: "127.0.0.1".to_string(),
            port: 4000,
            ..Config::default()
        };
        assert_eq!(config.listen_addr(), "127.0.0.1:4000");

        config.host = "::1".to_string();
        assert_eq!(config.listen_addr(), "[::1]:4000");
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = parse(&["--help"]).unwrap_err();
        assert!(!err.use_stderr());

        let err = parse(&[]).unwrap_err();
        assert!(err.use_stderr());
    }
}
