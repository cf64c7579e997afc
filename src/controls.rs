//! ESS control policy
//!
//! Derives the power setpoint written to the inverter from the configured
//! strategy plus live state: battery state of charge or DC voltage, and
//! whether the DC level currently allows inverting. The policy itself is a
//! pure function; the control task in `main` feeds it snapshots and pushes
//! the result through [`crate::vebus::VeBus::set_power`].

use crate::config::ControlsConfig;
use crate::logging::get_logger;
use crate::vebus::definition::SwitchState;
use crate::vebus::status::{DcInfo, MultiPlusStatus};
use serde::{Deserialize, Serialize};

/// Inverter/charger operating mode, mirroring the VE.Bus switch states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EssMode {
    Sleep,
    ChargerOnly,
    InverterOnly,
    ChargerInverter,
}

impl EssMode {
    /// The switch frame state this mode maps to
    pub fn switch_state(self) -> SwitchState {
        match self {
            EssMode::Sleep => SwitchState::Sleep,
            EssMode::ChargerOnly => SwitchState::ChargerOnly,
            EssMode::InverterOnly => SwitchState::InverterOnly,
            EssMode::ChargerInverter => SwitchState::ChargerInverter,
        }
    }
}

/// Which measurement bounds the charge/discharge band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlBand {
    Soc,
    Voltage,
}

/// ESS setpoint policy
pub struct EssControls {
    logger: crate::logging::StructuredLogger,
}

impl EssControls {
    pub fn new() -> Self {
        Self {
            logger: get_logger("controls"),
        }
    }

    /// Compute the next power setpoint in watts. Negative values charge the
    /// battery, positive values discharge it. `None` means the current mode
    /// takes no setpoints.
    ///
    /// Below the band the battery is charged at full clamp; above it, the
    /// inverter discharges if the DC level allows. Inside the band the idle
    /// setpoint applies. Magnitudes below `min_power_w` flatten to zero to
    /// keep the charger from dithering.
    pub fn compute_power_setpoint(
        &self,
        soc_percent: Option<f32>,
        status: &MultiPlusStatus,
        dc_info: &DcInfo,
        config: &ControlsConfig,
    ) -> Option<i16> {
        if config.mode != EssMode::ChargerInverter {
            return None;
        }

        let (measurement, low, high) = match config.band {
            ControlBand::Soc => (soc_percent?, config.min_soc, config.max_soc),
            ControlBand::Voltage => (dc_info.voltage, config.min_voltage, config.max_voltage),
        };
        if !measurement.is_finite() || measurement <= 0.0 {
            return None;
        }

        let mut target: i16 = if measurement < low {
            -config.max_power_w
        } else if measurement > high {
            config.max_power_w
        } else {
            config.idle_power_w
        };

        // Discharging needs DC headroom; the inverter reports whether the
        // battery level permits it.
        if target > 0 && !status.dc_level_allows_inverting {
            self.logger
                .debug("DC level forbids inverting, holding discharge setpoint at zero");
            target = 0;
        }

        target = target.clamp(-config.max_power_w, config.max_power_w);
        if target.unsigned_abs() < config.min_power_w.unsigned_abs() {
            target = 0;
        }

        Some(target)
    }
}

impl Default for EssControls {
    fn default() -> Self {
        Self::new()
    }
}
