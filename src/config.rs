//! Configuration module for the pixelflut server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Highest supported frame rate; the tick period must stay non-zero
const MAX_FRAME_RATE: u32 = 1000;

/// Largest canvas area in pixels; each frame buffer then takes at most 1 GiB
const MAX_CANVAS_PIXELS: u64 = 1 << 28;

/// Command-line arguments for the canvas server
#[derive(Parser, Debug, Default)]
#[command(name = "pixelflut-server")]
#[command(author = "pixelflut-server authors")]
#[command(version = "0.1.0")]
#[command(about = "A shared Pixelflut canvas served over TCP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port number to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Canvas width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Canvas height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum number of concurrent client connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Longest accepted command line in bytes; longer lines close the connection
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Number of pixel updates that can be pending between two frames
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Frames presented per second
    #[arg(long)]
    pub frame_rate: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Verbose connection and frame logging
    #[arg(short, long)]
    pub debug: bool,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads
    pub workers: Option<usize>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
            max_connections: default_max_connections(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// Canvas and frame cycle configuration
#[derive(Debug, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Capacity of the pixel update queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Frames presented per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            queue_capacity: default_queue_capacity(),
            frame_rate: default_frame_rate(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            debug: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1337
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_line_length() -> usize {
    1024
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_queue_capacity() -> usize {
    210_000
}

fn default_frame_rate() -> u32 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub width: u32,
    pub height: u32,
    pub workers: Option<usize>,
    pub max_connections: usize,
    pub max_line_length: usize,
    pub queue_capacity: usize,
    pub frame_rate: u32,
    pub log_level: String,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents)
                .map_err(|source| ConfigError::TomlParse {
                    path: config_path.clone(),
                    source,
                })?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let debug = cli.debug || toml_config.logging.debug;

        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            width: cli.width.unwrap_or(toml_config.canvas.width),
            height: cli.height.unwrap_or(toml_config.canvas.height),
            workers: cli.workers.or(toml_config.server.workers),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            max_line_length: cli
                .max_line_length
                .unwrap_or(toml_config.server.max_line_length),
            queue_capacity: cli
                .queue_capacity
                .unwrap_or(toml_config.canvas.queue_capacity),
            frame_rate: cli.frame_rate.unwrap_or(toml_config.canvas.frame_rate),
            log_level: if debug {
                "debug".to_string()
            } else {
                cli.log_level.unwrap_or(toml_config.logging.level)
            },
            debug,
        }
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("width", self.width as usize),
            ("height", self.height as usize),
            ("max_connections", self.max_connections),
            ("max_line_length", self.max_line_length),
            ("queue_capacity", self.queue_capacity),
            ("frame_rate", self.frame_rate as usize),
            ("workers", self.workers.unwrap_or(1)),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid(name, "must be greater than zero"));
            }
        }

        if self.frame_rate > MAX_FRAME_RATE {
            return Err(ConfigError::Invalid("frame_rate", "must be at most 1000"));
        }

        // Coordinates are i32 on the wire
        if i32::try_from(self.width).is_err() || i32::try_from(self.height).is_err() {
            return Err(ConfigError::Invalid("width/height", "must fit in a signed 32-bit integer"));
        }

        if u64::from(self.width) * u64::from(self.height) > MAX_CANVAS_PIXELS {
            return Err(ConfigError::Invalid("width/height", "canvas area exceeds 2^28 pixels"));
        }

        Ok(())
    }

    /// Socket address string the listener binds to.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid configuration value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 1337);
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
        assert_eq!(config.queue_capacity, 210_000);
        assert_eq!(config.log_level, "info");
        assert!(!config.debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 4242
            workers = 4

            [canvas]
            width = 1920
            height = 1080
            frame_rate = 30

            [logging]
            level = "warn"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4242);
        assert_eq!(config.server.workers, Some(4));
        assert_eq!(config.server.max_line_length, 1024);
        assert_eq!(config.canvas.width, 1920);
        assert_eq!(config.canvas.height, 1080);
        assert_eq!(config.canvas.frame_rate, 30);
        assert_eq!(config.canvas.queue_capacity, 210_000);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 4242

            [canvas]
            width = 1920
        "#,
        )
        .unwrap();

        let cli = CliArgs::parse_from(["pixelflut-server", "--port", "9000", "--height", "100"]);
        let config = Config::merge(cli, toml_config);

        assert_eq!(config.port, 9000);
        assert_eq!(config.width, 1920);
        assert_eq!(config.height, 100);
    }

    #[test]
    fn test_debug_forces_debug_level() {
        let cli = CliArgs::parse_from(["pixelflut-server", "--debug", "--log-level", "warn"]);
        let config = Config::merge(cli, TomlConfig::default());

        assert!(config.debug);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = Config {
            width: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("width", _))
        ));

        let config = Config {
            workers: Some(0),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("workers", _))
        ));

        let config = Config {
            frame_rate: 5000,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("frame_rate", _))
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_canvas() {
        let config = Config {
            width: 2_000_000_000,
            height: 2_000_000_000,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("width/height", _))
        ));

        let config = Config {
            width: 16_384,
            height: 16_384,
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        let config = Config {
            width: 16_384,
            height: 16_385,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:1337");

        let config = Config {
            host: "::1".to_string(),
            ..Config::default()
        };
        assert_eq!(config.listen_addr(), "[::1]:1337");
    }
}
