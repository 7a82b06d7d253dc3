//! Controller configuration using Figment
//!
//! Configuration is loaded from a TOML file layered with environment variables
//! prefixed with `P6K_` (nested keys separated by `__`):
//!
//! ```toml
//! name = "bench-6k"
//! num_axes = 4
//! timeout_ms = 5000
//!
//! [transport]
//! kind = "serial"
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [[axes]]
//! index = 2
//! precision = 3
//! encoder_ratio = 4.0
//! ```
//!
//! `P6K_TIMEOUT_MS=2000` or `P6K_TRANSPORT__PORT=/dev/ttyS1` override the file.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{P6kError, Result};

/// Go-mask width: the 6K addresses at most eight axes.
pub const MAX_AXES: u8 = 8;

/// Top-level controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller name used in logs and reports
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How to reach the controller
    pub transport: TransportConfig,
    /// Per-transaction read bound in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Number of axes to configure (1..=8)
    pub num_axes: u8,
    /// Poll period while any axis is moving
    #[serde(default = "default_moving_poll")]
    pub moving_poll_ms: u64,
    /// Poll period while all axes are idle
    #[serde(default = "default_idle_poll")]
    pub idle_poll_ms: u64,
    /// Fast cycles forced after a wake-up
    #[serde(default = "default_forced_fast_polls")]
    pub forced_fast_polls: u32,
    /// Minimum spacing between repeated poll-error reports
    #[serde(default = "default_error_print_interval")]
    pub error_print_interval_ms: u64,
    /// Per-axis overrides; axes not listed use defaults
    #[serde(default)]
    pub axes: Vec<AxisConfig>,
}

/// Transport selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// RS-232 link
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0`
        port: String,
        /// Line speed
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// Ethernet link (`host:port`)
    Tcp {
        /// Socket address of the controller
        address: String,
    },
}

/// Per-axis overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Axis index (1-based)
    pub index: u8,
    /// Decimal places used when formatting velocity and acceleration
    #[serde(default = "default_precision")]
    pub precision: i32,
    /// Encoder counts per motor step, used by set-position
    #[serde(default = "default_encoder_ratio")]
    pub encoder_ratio: f64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            index: 1,
            precision: default_precision(),
            encoder_ratio: default_encoder_ratio(),
        }
    }
}

fn default_name() -> String {
    "parker6k".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    5000
}

fn default_moving_poll() -> u64 {
    100
}

fn default_idle_poll() -> u64 {
    1000
}

fn default_forced_fast_polls() -> u32 {
    10
}

fn default_error_print_interval() -> u64 {
    1000
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_precision() -> i32 {
    2
}

fn default_encoder_ratio() -> f64 {
    1.0
}

impl ControllerConfig {
    /// Load from a TOML file plus `P6K_` environment overrides, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("P6K_").split("__"))
            .extract()
            .map_err(|e| P6kError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document (no environment layer), then validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::string(text))
            .extract()
            .map_err(|e| P6kError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and uniqueness.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(P6kError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.num_axes == 0 || self.num_axes > MAX_AXES {
            return Err(P6kError::Configuration(format!(
                "num_axes {} out of range 1..={}",
                self.num_axes, MAX_AXES
            )));
        }

        if self.timeout_ms == 0 {
            return Err(P6kError::Configuration("timeout_ms must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for axis in &self.axes {
            if axis.index == 0 || axis.index > self.num_axes {
                return Err(P6kError::Configuration(format!(
                    "Axis override index {} out of range 1..={}",
                    axis.index, self.num_axes
                )));
            }
            if !seen.insert(axis.index) {
                return Err(P6kError::Configuration(format!(
                    "Duplicate axis override: {}",
                    axis.index
                )));
            }
            if axis.precision < 0 {
                return Err(P6kError::Configuration(format!(
                    "Axis {} precision {} must not be negative",
                    axis.index, axis.precision
                )));
            }
            if !axis.encoder_ratio.is_finite() {
                return Err(P6kError::Configuration(format!(
                    "Axis {} encoder_ratio must be finite",
                    axis.index
                )));
            }
        }

        Ok(())
    }

    /// Override for `index`, or defaults.
    pub fn axis(&self, index: u8) -> AxisConfig {
        self.axes
            .iter()
            .find(|a| a.index == index)
            .cloned()
            .unwrap_or(AxisConfig {
                index,
                ..AxisConfig::default()
            })
    }

    /// Per-transaction read bound.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll period while moving.
    pub fn moving_poll_period(&self) -> Duration {
        Duration::from_millis(self.moving_poll_ms)
    }

    /// Poll period while idle.
    pub fn idle_poll_period(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Throttle interval for repeated poll errors.
    pub fn error_print_interval(&self) -> Duration {
        Duration::from_millis(self.error_print_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        num_axes = 2

        [transport]
        kind = "tcp"
        address = "192.168.0.50:5002"
    "#;

    #[test]
    fn test_defaults_applied() -> Result<()> {
        let config = ControllerConfig::from_toml_str(MINIMAL)?;

        assert_eq!(config.name, "parker6k");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.moving_poll_period(), Duration::from_millis(100));
        assert_eq!(config.idle_poll_period(), Duration::from_secs(1));
        assert_eq!(config.forced_fast_polls, 10);
        assert_eq!(config.error_print_interval(), Duration::from_secs(1));
        assert_eq!(
            config.transport,
            TransportConfig::Tcp {
                address: "192.168.0.50:5002".into()
            }
        );

        let axis = config.axis(2);
        assert_eq!(axis.index, 2);
        assert_eq!(axis.precision, 2);
        assert_eq!(axis.encoder_ratio, 1.0);
        Ok(())
    }

    #[test]
    fn test_serial_transport_and_overrides() -> Result<()> {
        let config = ControllerConfig::from_toml_str(
            r#"
            name = "bench"
            num_axes = 4

            [transport]
            kind = "serial"
            port = "/dev/ttyUSB0"

            [[axes]]
            index = 3
            precision = 4
            encoder_ratio = 2.5
            "#,
        )?;

        assert_eq!(
            config.transport,
            TransportConfig::Serial {
                port: "/dev/ttyUSB0".into(),
                baud_rate: 9600
            }
        );
        assert_eq!(config.axis(3).precision, 4);
        assert_eq!(config.axis(3).encoder_ratio, 2.5);
        assert_eq!(config.axis(1).precision, 2);
        Ok(())
    }

    #[test]
    fn test_validation_rejects_bad_axis_counts() {
        for count in [0u8, 9] {
            let text = MINIMAL.replace("num_axes = 2", &format!("num_axes = {}", count));
            assert!(matches!(
                ControllerConfig::from_toml_str(&text),
                Err(P6kError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_validation_rejects_bad_overrides() {
        let cases = [
            "[[axes]]\nindex = 0\n",
            "[[axes]]\nindex = 1\n[[axes]]\nindex = 1\n",
            "[[axes]]\nindex = 1\nprecision = -1\n",
            "[[axes]]\nindex = 3\n",
        ];
        for extra in cases {
            let text = format!("{}\n{}", MINIMAL, extra);
            let result = ControllerConfig::from_toml_str(&text);
            assert!(
                matches!(result, Err(P6kError::Configuration(_))),
                "accepted: {}",
                extra
            );
        }
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let text = format!("log_level = \"loud\"\n{}", MINIMAL);
        assert!(ControllerConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(MINIMAL.as_bytes())?;

        let config = ControllerConfig::load_from(file.path())?;

        assert_eq!(config.num_axes, 2);
        Ok(())
    }

    #[test]
    fn test_missing_file_without_required_fields_fails() {
        let result = ControllerConfig::load_from("/nonexistent/parker6k.toml");
        assert!(matches!(result, Err(P6kError::Configuration(_))));
    }
}
