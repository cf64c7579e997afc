use super::*;

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 256_000,
            data_bits: 8,
            stop_bits: 1,
            parity: "None".to_string(),
        }
    }
}

impl Default for VeBusConfig {
    fn default() -> Self {
        Self {
            fifo_size: 32,
            max_frame_size: 64,
            receive_queue_depth: 16,
            response_timeout_ms: 1000,
            max_resend: 2,
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            mode: EssMode::ChargerInverter,
            band: ControlBand::Soc,
            min_soc: 20.0,
            max_soc: 90.0,
            min_voltage: 48.0,
            max_voltage: 57.0,
            min_power_w: 50,
            max_power_w: 2500,
            idle_power_w: 0,
            update_interval_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/triton".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            vebus: VeBusConfig::default(),
            controls: ControlsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
