//! Last-known decoded inverter state
//!
//! One record per broadcast family, each with a change flag. The decoder
//! only writes a record when the candidate value differs from what is
//! stored, so the flags really mean "changed since last read". Snapshot
//! getters copy the record out and clear its flag; the `new_*` probes
//! leave the flag alone.

use super::definition::{PHASES_COUNT, PhaseInfo, PhaseState};
use serde::Serialize;

/// One LED bank, decoded from its bitfield byte.
///
/// A LED with both the on and blink bit set is blinking; blink without on
/// is inverted blinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LedState {
    pub mains_on: bool,
    pub absorption: bool,
    pub bulk: bool,
    pub float_charge: bool,
    pub inverter_on: bool,
    pub overload: bool,
    pub low_battery: bool,
    pub temperature: bool,
}

impl LedState {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            mains_on: byte & 0x01 != 0,
            absorption: byte & 0x02 != 0,
            bulk: byte & 0x04 != 0,
            float_charge: byte & 0x08 != 0,
            inverter_on: byte & 0x10 != 0,
            overload: byte & 0x20 != 0,
            low_battery: byte & 0x40 != 0,
            temperature: byte & 0x80 != 0,
        }
    }
}

/// Front-panel LED broadcast plus input-current limits
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MasterMultiLed {
    pub led_on: LedState,
    pub led_blink: LedState,
    pub low_battery: bool,
    pub ac_input_configuration: u8,
    pub minimum_input_current_limit_a: f32,
    pub maximum_input_current_limit_a: f32,
    pub actual_input_current_limit_a: f32,
    pub switch_register: u8,
}

/// Charger/inverter condition broadcast
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MultiPlusStatus {
    /// Only refreshed when the broadcast carries a valid temperature nibble
    pub temperature_c: f32,
    pub dc_current_a: f32,
    pub battery_ah: i16,
    pub dc_level_allows_inverting: bool,
}

/// DC measurements from the info frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DcInfo {
    pub voltage: f32,
    pub current_inverting: f32,
    pub current_charging: f32,
}

/// Per-phase AC measurements from the info frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AcInfo {
    pub phase: PhaseInfo,
    pub state: PhaseState,
    pub main_voltage: f32,
    pub main_current: f32,
    pub inverter_voltage: f32,
    pub inverter_current: f32,
}

/// All last-known records and their change flags
#[derive(Debug, Default)]
pub struct StatusStore {
    master_multi_led: MasterMultiLed,
    master_multi_led_new: bool,
    multi_plus_status: MultiPlusStatus,
    multi_plus_status_new: bool,
    dc_info: DcInfo,
    dc_info_new: bool,
    ac_info: [AcInfo; PHASES_COUNT],
    ac_info_new: [bool; PHASES_COUNT],
}

impl StatusStore {
    pub fn new() -> Self {
        let mut store = Self::default();
        let tags = [
            PhaseInfo::L4,
            PhaseInfo::L3,
            PhaseInfo::L2,
            PhaseInfo::SL1,
            PhaseInfo::SL2,
            PhaseInfo::SL3,
            PhaseInfo::SL4,
        ];
        for (slot, tag) in store.ac_info.iter_mut().zip(tags) {
            slot.phase = tag;
        }
        store
    }

    pub fn update_master_multi_led(&mut self, candidate: MasterMultiLed) {
        if self.master_multi_led != candidate {
            self.master_multi_led = candidate;
            self.master_multi_led_new = true;
        }
    }

    /// Low-battery arrives on the charger/inverter broadcast as well
    pub fn update_low_battery(&mut self, low_battery: bool) {
        if self.master_multi_led.low_battery != low_battery {
            self.master_multi_led.low_battery = low_battery;
            self.master_multi_led_new = true;
        }
    }

    pub fn update_charger_inverter(
        &mut self,
        dc_level_allows_inverting: bool,
        dc_current_a: f32,
        temperature_c: Option<f32>,
    ) {
        let current = &self.multi_plus_status;
        let mut changed = current.dc_level_allows_inverting != dc_level_allows_inverting
            || current.dc_current_a != dc_current_a;
        if let Some(temperature) = temperature_c {
            changed |= current.temperature_c != temperature;
        }
        if !changed {
            return;
        }

        self.multi_plus_status.dc_level_allows_inverting = dc_level_allows_inverting;
        self.multi_plus_status.dc_current_a = dc_current_a;
        if let Some(temperature) = temperature_c {
            self.multi_plus_status.temperature_c = temperature;
        }
        self.multi_plus_status_new = true;
    }

    pub fn update_battery_ah(&mut self, battery_ah: i16) {
        if self.multi_plus_status.battery_ah != battery_ah {
            self.multi_plus_status.battery_ah = battery_ah;
            self.multi_plus_status_new = true;
        }
    }

    pub fn update_dc_info(&mut self, candidate: DcInfo) {
        if self.dc_info != candidate {
            self.dc_info = candidate;
            self.dc_info_new = true;
        }
    }

    pub fn update_ac_info(&mut self, candidate: AcInfo) {
        let index = candidate.phase.index();
        if index >= PHASES_COUNT {
            return;
        }
        if self.ac_info[index] != candidate {
            self.ac_info[index] = candidate;
            self.ac_info_new[index] = true;
        }
    }

    pub fn get_master_multi_led(&mut self) -> MasterMultiLed {
        self.master_multi_led_new = false;
        self.master_multi_led
    }

    pub fn get_multi_plus_status(&mut self) -> MultiPlusStatus {
        self.multi_plus_status_new = false;
        self.multi_plus_status
    }

    pub fn get_dc_info(&mut self) -> DcInfo {
        self.dc_info_new = false;
        self.dc_info
    }

    pub fn get_ac_info(&mut self, phase: PhaseInfo) -> AcInfo {
        let index = phase.index().min(PHASES_COUNT - 1);
        self.ac_info_new[index] = false;
        self.ac_info[index]
    }

    pub fn new_master_multi_led_available(&self) -> bool {
        self.master_multi_led_new
    }

    pub fn new_multi_plus_status_available(&self) -> bool {
        self.multi_plus_status_new
    }

    pub fn new_dc_info_available(&self) -> bool {
        self.dc_info_new
    }

    /// First phase with unread data, if any
    pub fn new_ac_info_available(&self) -> Option<PhaseInfo> {
        self.ac_info_new
            .iter()
            .position(|&fresh| fresh)
            .map(|index| self.ac_info[index].phase)
    }
}
