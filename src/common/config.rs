//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Device gateway settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Test execution settings
    #[serde(default)]
    pub run: RunConfig,

    /// Snapshot and log output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Configuration for the device gateway process
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Gateway executable (absolute path or a name looked up on PATH)
    #[serde(default = "default_gateway")]
    pub gateway: String,

    /// Additional arguments to pass to the gateway
    #[serde(default)]
    pub args: Vec<String>,

    /// Local network interface the gateway binds to (e.g. "192.168.1.10/24")
    #[serde(default)]
    pub network_address: Option<String>,

    /// Address of the controller under test
    #[serde(default)]
    pub device_address: Option<String>,

    /// Device instance number of the controller under test
    #[serde(default)]
    pub device_id: Option<u32>,

    /// Timeout for a single gateway request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            gateway: default_gateway(),
            args: Vec::new(),
            network_address: None,
            device_address: None,
            device_id: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_gateway() -> String {
    "bacnet-gateway".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

/// Test execution settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Sleep between two polls of the wait loop
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Seconds between two point snapshots while waiting
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Abort the run when the device rejects a write
    #[serde(default)]
    pub fatal_write_errors: bool,

    /// Period used by ramp() and periodic() cells that do not give one
    #[serde(default = "default_period")]
    pub default_period_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            snapshot_interval_secs: default_snapshot_interval(),
            fatal_write_errors: false,
            default_period_secs: default_period(),
        }
    }
}

fn default_poll_interval() -> u64 {
    250
}
fn default_snapshot_interval() -> u64 {
    60
}
fn default_period() -> u64 {
    10
}

/// Snapshot and log output settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    /// Directory for run snapshot files (defaults to the data dir)
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,

    /// Also write the run log to `<data dir>/logs/<run>.log`
    #[serde(default)]
    pub log_to_file: bool,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Locate the gateway executable
    ///
    /// Absolute or relative paths are used as-is, bare names are searched on PATH.
    pub fn gateway_path(&self) -> Result<PathBuf> {
        let gateway = Path::new(&self.device.gateway);
        if gateway.components().count() > 1 || gateway.is_absolute() {
            if gateway.exists() {
                return Ok(gateway.to_path_buf());
            }
            return Err(super::Error::gateway_not_found(
                &self.device.gateway,
                &[gateway.display().to_string()],
            ));
        }

        which::which(&self.device.gateway)
            .map_err(|_| super::Error::gateway_not_found(&self.device.gateway, &["PATH"]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.run.poll_interval_ms, 250);
        assert_eq!(config.run.snapshot_interval_secs, 60);
        assert_eq!(config.run.default_period_secs, 10);
        assert!(!config.run.fatal_write_errors);
        assert_eq!(config.device.request_timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [device]
            gateway = "/opt/gw/bacnet-gateway"
            args = ["--verbose"]
            network_address = "192.168.1.10/24"
            device_address = "192.168.1.20"
            device_id = 1001

            [run]
            poll_interval_ms = 100
            fatal_write_errors = true

            [output]
            snapshot_dir = "/var/lib/ctrltest"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.gateway, "/opt/gw/bacnet-gateway");
        assert_eq!(config.device.device_id, Some(1001));
        assert_eq!(config.run.poll_interval_ms, 100);
        assert!(config.run.fatal_write_errors);
        assert_eq!(config.run.snapshot_interval_secs, 60);
        assert_eq!(
            config.output.snapshot_dir,
            Some(PathBuf::from("/var/lib/ctrltest"))
        );
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[run]\npoll_interval_ms = \"fast\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, crate::common::Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_gateway_path_is_reported() {
        let mut config = Config::default();
        config.device.gateway = "/nonexistent/dir/gateway".to_string();
        assert!(matches!(
            config.gateway_path(),
            Err(crate::common::Error::GatewayNotFound { .. })
        ));
    }
}
