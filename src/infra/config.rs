//! Configuration management infrastructure.
//!
//! This module provides configuration file support for the verification
//! engine: time-authority addresses, network timeout and retry policy,
//! clock-skew tolerance, trusted root store location and revocation checking.

use crate::domain::types::NtpServerAddr;
use crate::infra::error::{VerifyError, VerifyResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration with all verification preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfiguration {
    /// Primary network time authority (host or host:port, port 123 assumed)
    pub ntp_server: String,

    /// Fallback time authorities tried in order when the primary fails
    pub fallback_ntp_servers: Vec<String>,

    /// Network timeout applied to time queries and revocation fetches
    pub network_timeout_seconds: u64,

    /// Number of retry attempts per network endpoint
    pub retry_attempts: usize,

    /// Delay between retries, in milliseconds
    pub retry_delay_ms: u64,

    /// Tolerated clock skew when comparing embedded timestamps against
    /// the trusted time
    pub clock_skew_tolerance_seconds: u64,

    /// PEM bundle of trusted root certificates; chain building stops at
    /// a certificate found here. None means an empty trust set.
    pub trusted_roots_path: Option<PathBuf>,

    /// Whether to consult CRL distribution points declared by chain
    /// certificates
    pub check_revocation: bool,

    /// Whether to show verbose output
    pub verbose: bool,
}

impl Default for VerificationConfiguration {
    fn default() -> Self {
        Self {
            ntp_server: "pool.ntp.org".to_string(),
            fallback_ntp_servers: vec![
                "time.google.com".to_string(),
                "time.cloudflare.com".to_string(),
            ],
            network_timeout_seconds: 10,
            retry_attempts: 3,
            retry_delay_ms: 500,
            clock_skew_tolerance_seconds: 300,
            trusted_roots_path: None,
            check_revocation: true,
            verbose: false,
        }
    }
}

impl VerificationConfiguration {
    #[must_use]
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_seconds)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn clock_skew_tolerance(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.clock_skew_tolerance_seconds as i64)
    }
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager with default path
    pub fn new() -> VerifyResult<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> VerifyResult<PathBuf> {
        // Try to get the user's config directory
        if let Some(config_dir) = dirs::config_dir() {
            let engine_dir = config_dir.join("pec-verifier");
            Ok(engine_dir.join("config.toml"))
        } else {
            // Fallback to current directory
            Ok(PathBuf::from("pec-verifier-config.toml"))
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load_or_create_default(&self) -> VerifyResult<VerificationConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::info!(
                "Configuration file not found, creating default: {}",
                self.config_path.display()
            );
            let default_config = VerificationConfiguration::default();
            self.save(&default_config)?;
            Ok(default_config)
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> VerifyResult<VerificationConfiguration> {
        log::info!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            VerifyError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        let config: VerificationConfiguration = toml::from_str(&content).map_err(|e| {
            VerifyError::ConfigurationError(format!("Failed to parse config file: {e}"))
        })?;

        self.validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &VerificationConfiguration) -> VerifyResult<()> {
        log::info!("Saving configuration to: {}", self.config_path.display());

        // Ensure parent directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                VerifyError::ConfigurationError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| {
            VerifyError::ConfigurationError(format!("Failed to serialize config: {e}"))
        })?;

        fs::write(&self.config_path, content).map_err(|e| {
            VerifyError::ConfigurationError(format!(
                "Failed to write config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        log::info!("Configuration saved successfully");
        Ok(())
    }

    /// Validate configuration values
    fn validate_config(&self, config: &VerificationConfiguration) -> VerifyResult<()> {
        NtpServerAddr::new(&config.ntp_server)?;
        for server in &config.fallback_ntp_servers {
            NtpServerAddr::new(server)?;
        }

        if config.network_timeout_seconds == 0 {
            return Err(VerifyError::ConfigurationError(
                "Network timeout must be greater than 0".to_string(),
            ));
        }

        if config.retry_attempts == 0 {
            return Err(VerifyError::ConfigurationError(
                "Retry attempts must be greater than 0".to_string(),
            ));
        }

        // An unbounded skew tolerance would neutralize future-dating detection
        if config.clock_skew_tolerance_seconds > 86_400 {
            return Err(VerifyError::ConfigurationError(format!(
                "Clock skew tolerance too large: {} seconds (maximum 86400)",
                config.clock_skew_tolerance_seconds
            )));
        }

        Ok(())
    }

    /// Update a specific configuration value
    pub fn update_value(&self, key: &str, value: &str) -> VerifyResult<()> {
        let mut config = self.load()?;

        match key {
            "ntp_server" => {
                NtpServerAddr::new(value)?; // Validate
                config.ntp_server = value.to_string();
            }
            "network_timeout_seconds" => {
                config.network_timeout_seconds = value.parse().map_err(|_| {
                    VerifyError::ConfigurationError(format!("Invalid timeout value: {value}"))
                })?;
            }
            "retry_attempts" => {
                config.retry_attempts = value.parse().map_err(|_| {
                    VerifyError::ConfigurationError(format!("Invalid retry value: {value}"))
                })?;
            }
            "clock_skew_tolerance_seconds" => {
                config.clock_skew_tolerance_seconds = value.parse().map_err(|_| {
                    VerifyError::ConfigurationError(format!("Invalid tolerance value: {value}"))
                })?;
            }
            "trusted_roots_path" => {
                config.trusted_roots_path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "check_revocation" => {
                config.check_revocation = value.parse().map_err(|_| {
                    VerifyError::ConfigurationError(format!("Invalid boolean value: {value}"))
                })?;
            }
            "verbose" => {
                config.verbose = value.parse().map_err(|_| {
                    VerifyError::ConfigurationError(format!("Invalid boolean value: {value}"))
                })?;
            }
            _ => {
                return Err(VerifyError::ConfigurationError(format!(
                    "Unknown configuration key: {key}"
                )));
            }
        }

        self.validate_config(&config)?;
        self.save(&config)
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Export configuration as a portable format
    pub fn export_config(&self, format: ExportFormat) -> VerifyResult<String> {
        let config = self.load()?;

        match format {
            ExportFormat::Toml => toml::to_string_pretty(&config)
                .map_err(|e| VerifyError::ConfigurationError(format!("TOML export failed: {e}"))),
            ExportFormat::Json => serde_json::to_string_pretty(&config)
                .map_err(|e| VerifyError::ConfigurationError(format!("JSON export failed: {e}"))),
            ExportFormat::Yaml => serde_yaml::to_string(&config)
                .map_err(|e| VerifyError::ConfigurationError(format!("YAML export failed: {e}"))),
        }
    }

    /// Import configuration from a string
    pub fn import_config(&self, content: &str, format: ExportFormat) -> VerifyResult<()> {
        let config: VerificationConfiguration = match format {
            ExportFormat::Toml => toml::from_str(content).map_err(|e| {
                VerifyError::ConfigurationError(format!("TOML import failed: {e}"))
            })?,
            ExportFormat::Json => serde_json::from_str(content).map_err(|e| {
                VerifyError::ConfigurationError(format!("JSON import failed: {e}"))
            })?,
            ExportFormat::Yaml => serde_yaml::from_str(content).map_err(|e| {
                VerifyError::ConfigurationError(format!("YAML import failed: {e}"))
            })?,
        };

        self.validate_config(&config)?;
        self.save(&config)
    }
}

/// Configuration export/import formats
#[derive(Debug, Clone, Copy)]
pub enum ExportFormat {
    Toml,
    Json,
    Yaml,
}
