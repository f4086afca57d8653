//! Configuration loading and validation for the discovery server

use discovery::ControllerConfig;
use gateway::GatewayConfig;
use healthcheck::{PortRange, PortRangeError, ScanConfig, Scheme, ServiceAddress};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Invalid port range: {0}")]
    PortRange(#[from] PortRangeError),
}

impl From<ConfigError> for common::Error {
    fn from(err: ConfigError) -> Self {
        common::Error::config(err)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub registration: RegistrationSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.http.validate()?;
        self.discovery.validate()?;
        self.registration.validate()?;
        self.events.validate()?;
        self.gateway.validate()?;
        self.logging.validate()?;

        // Checks spanning more than one field
        let mut errors = ValidationErrors::new();
        if self.discovery.probe_timeout <= self.discovery.connect_timeout {
            errors.add(
                "probe_timeout",
                ValidationError::new("probe_timeout_not_above_connect_timeout"),
            );
        }
        if u32::from(self.discovery.ports.start) >= self.discovery.ports.end {
            errors.add("ports", ValidationError::new("port_range_empty"));
        }
        for host in &self.discovery.hosts {
            if ServiceAddress::canonical_host(self.discovery.scheme, host).is_err() {
                let mut error = ValidationError::new("host_invalid");
                error.add_param("host".into(), host);
                errors.add("hosts", error);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Control API settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HttpSettings {
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Scan loop settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DiscoverySettings {
    #[validate(length(min = 1), custom = "validate_hosts")]
    pub hosts: Vec<String>,

    pub scheme: Scheme,

    #[validate]
    pub ports: PortSettings,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_connect_timeout")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_probe_timeout")]
    pub probe_timeout: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_sweep_interval")]
    pub sweep_interval: Duration,

    #[validate(range(min = 1, max = 256))]
    pub concurrency: usize,

    /// Start sweeping as soon as the server is up
    pub autostart: bool,

    /// Records not probed within this window are reported as stale
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,
}

/// Half-open port range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PortSettings {
    #[validate(range(min = 1))]
    pub start: u16,

    #[validate(range(min = 2, max = 65536))]
    pub end: u32,
}

/// Manual registration settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RegistrationSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_registration_timeout")]
    pub probe_timeout: Duration,
}

/// Event channel settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EventSettings {
    #[validate(range(min = 1, max = 65536))]
    pub capacity: usize,
}

/// Model server settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewaySettings {
    #[validate(url)]
    pub base_url: String,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_request_timeout")]
    pub request_timeout: Duration,
}

/// Metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    #[validate(custom = "validate_log_level")]
    pub level: Option<String>,
    pub format: LogFormat,
}

// Default implementations

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8765".to_string(),
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            scheme: Scheme::Http,
            ports: PortSettings::default(),
            connect_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(10),
            concurrency: 32,
            autostart: true,
            stale_after: Duration::from_secs(60),
        }
    }
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            start: 8000,
            end: 8100,
        }
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.trim()
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_hosts(hosts: &[String]) -> Result<(), ValidationError> {
    if hosts.iter().any(|h| h.trim().is_empty()) {
        return Err(ValidationError::new("host_empty"));
    }
    Ok(())
}

fn validate_millis(duration: &Duration, min: u128, max: u128, code: &'static str) -> Result<(), ValidationError> {
    let millis = duration.as_millis();
    if millis < min || millis > max {
        return Err(ValidationError::new(code));
    }
    Ok(())
}

fn validate_connect_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    validate_millis(timeout, 1, 5_000, "connect_timeout_out_of_range")
}

fn validate_probe_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    validate_millis(timeout, 10, 30_000, "probe_timeout_out_of_range")
}

fn validate_sweep_interval(interval: &Duration) -> Result<(), ValidationError> {
    validate_millis(interval, 100, 3_600_000, "sweep_interval_out_of_range")
}

fn validate_registration_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    validate_millis(timeout, 10, 60_000, "registration_timeout_out_of_range")
}

fn validate_request_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    validate_millis(timeout, 100, 3_600_000, "request_timeout_out_of_range")
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new("log_level_unknown")),
    }
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/mcp-client/discovery.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./discovery.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/mcp-client/discovery.yaml"))
    }

    /// Port range swept by the scan loop
    pub fn port_range(&self) -> Result<PortRange, ConfigError> {
        Ok(PortRange::new(
            self.discovery.ports.start,
            self.discovery.ports.end,
        )?)
    }

    /// Convert to the controller's configuration
    ///
    /// Hosts come out canonical (lowercased, IPv6 bracketed) so swept
    /// addresses match manually registered ones.
    pub fn to_controller_config(&self) -> ControllerConfig {
        let scheme = self.discovery.scheme;
        ControllerConfig {
            hosts: self
                .discovery
                .hosts
                .iter()
                .filter_map(|h| ServiceAddress::canonical_host(scheme, h).ok())
                .collect(),
            scan: ScanConfig {
                scheme: self.discovery.scheme,
                connect_timeout: self.discovery.connect_timeout,
                probe_timeout: self.discovery.probe_timeout,
                concurrency: self.discovery.concurrency,
            },
            sweep_interval: self.discovery.sweep_interval,
            registration_timeout: self.registration.probe_timeout,
            event_capacity: self.events.capacity,
        }
    }

    /// Convert to the model server client's configuration
    pub fn to_gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.gateway.base_url.trim().to_string(),
            request_timeout: self.gateway.request_timeout,
        }
    }
}
