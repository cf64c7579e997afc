//! Configuration management for Triton
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The `vebus` section carries the protocol
//! engine limits (request slots, frame size, timeouts) as runtime values.

use crate::controls::{ControlBand, EssMode};
use crate::error::{Result, TritonError};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RS-485 serial link configuration
    pub serial: SerialConfig,

    /// VE.Bus protocol engine limits
    pub vebus: VeBusConfig,

    /// ESS control policy configuration
    pub controls: ControlsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// RS-485 serial link parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path (e.g., "/dev/ttyUSB0")
    pub port: String,

    /// Baud rate; the MK3 side of a VE.Bus link runs at 256000
    pub baud: u32,

    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,

    /// Stop bits (1, 2)
    pub stop_bits: u8,

    /// Parity ("None", "Even", "Odd")
    pub parity: String,
}

/// VE.Bus protocol engine limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VeBusConfig {
    /// Outstanding request slots
    pub fifo_size: usize,

    /// Maximum frame size in bytes, including framing and checksum
    pub max_frame_size: usize,

    /// Raw-frame hand-off queue depth; frames beyond this are dropped
    pub receive_queue_depth: usize,

    /// Milliseconds after a send before a response is considered missing
    pub response_timeout_ms: u64,

    /// Retries before an unanswered request is dropped
    pub max_resend: u32,
}

/// ESS control policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Inverter/charger operating mode applied at startup
    pub mode: EssMode,

    /// Which measurement bounds the charge/discharge band
    pub band: ControlBand,

    /// Battery state-of-charge window in percent (band = soc)
    pub min_soc: f32,
    pub max_soc: f32,

    /// Battery voltage window in volts (band = voltage)
    pub min_voltage: f32,
    pub max_voltage: f32,

    /// Setpoints below this magnitude are flattened to zero
    pub min_power_w: i16,

    /// Magnitude clamp for charge/discharge setpoints
    pub max_power_w: i16,

    /// Setpoint applied while inside the band
    pub idle_power_w: i16,

    /// Interval between control evaluations in milliseconds
    pub update_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Directory for rotated log files
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// A `TRITON_CONFIG` environment variable overrides the search and any
    /// error loading that explicit path is returned as-is.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("TRITON_CONFIG") {
            return Self::from_file(path);
        }

        let default_paths = [
            "triton_config.yaml",
            "/data/triton_config.yaml",
            "/etc/triton/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(TritonError::validation(
                "serial.port",
                "Serial device path cannot be empty",
            ));
        }

        if self.serial.baud == 0 {
            return Err(TritonError::validation(
                "serial.baud",
                "Baud rate must be greater than 0",
            ));
        }

        if ![5, 6, 7, 8].contains(&self.serial.data_bits) {
            return Err(TritonError::validation(
                "serial.data_bits",
                "Data bits must be 5, 6, 7 or 8",
            ));
        }

        if ![1, 2].contains(&self.serial.stop_bits) {
            return Err(TritonError::validation(
                "serial.stop_bits",
                "Stop bits must be 1 or 2",
            ));
        }

        if !["None", "Even", "Odd"].contains(&self.serial.parity.as_str()) {
            return Err(TritonError::validation(
                "serial.parity",
                "Parity must be None, Even or Odd",
            ));
        }

        if self.vebus.fifo_size == 0 {
            return Err(TritonError::validation(
                "vebus.fifo_size",
                "Must be greater than 0",
            ));
        }

        // Smallest decodable broadcast is a 10-byte sync frame
        if self.vebus.max_frame_size < 10 {
            return Err(TritonError::validation(
                "vebus.max_frame_size",
                "Must be at least 10 bytes",
            ));
        }

        if self.vebus.receive_queue_depth == 0 {
            return Err(TritonError::validation(
                "vebus.receive_queue_depth",
                "Must be greater than 0",
            ));
        }

        if self.vebus.response_timeout_ms == 0 {
            return Err(TritonError::validation(
                "vebus.response_timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.controls.max_power_w <= 0 {
            return Err(TritonError::validation(
                "controls.max_power_w",
                "Must be positive",
            ));
        }

        if self.controls.min_power_w < 0 || self.controls.min_power_w > self.controls.max_power_w {
            return Err(TritonError::validation(
                "controls.min_power_w",
                "Must be in [0, max_power_w]",
            ));
        }

        if self.controls.update_interval_ms == 0 {
            return Err(TritonError::validation(
                "controls.update_interval_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
