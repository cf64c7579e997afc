//! Scale/offset conversions between engineering values and raw wire values
//!
//! RAM variables use a sign-magnitude encoded scale: magnitudes at or above
//! 0x4000 wrap to `0x8000 - |scale|`. Settings use the scale directly as a
//! multiplier when positive and as a divisor when negative.

use super::definition::{RamVarInfo, SettingInfo};

/// Effective RAM-variable scale factor after the sign-magnitude wrap
fn ram_scale(info: &RamVarInfo) -> f32 {
    let magnitude = (info.scale as i32).abs();
    let magnitude = if magnitude >= 0x4000 {
        0x8000 - magnitude
    } else {
        magnitude
    };
    magnitude as f32
}

/// Engineering value to raw unsigned 16-bit RAM value
pub fn ram_to_raw_unsigned(info: &RamVarInfo, value: f32) -> u16 {
    let raw = (value * ram_scale(info)).round() as i64 - info.offset as i64;
    raw as u16
}

/// Engineering value to raw signed 16-bit RAM value
pub fn ram_to_raw_signed(info: &RamVarInfo, value: f32) -> i16 {
    let raw = (value * ram_scale(info)).round() as i64 - info.offset as i64;
    raw as i16
}

/// Raw unsigned 16-bit RAM value to engineering value
pub fn ram_from_raw_unsigned(info: &RamVarInfo, raw: u16) -> f32 {
    raw as f32 / ram_scale(info) + info.offset as f32
}

/// Raw signed 16-bit RAM value to engineering value
pub fn ram_from_raw_signed(info: &RamVarInfo, raw: i16) -> f32 {
    raw as f32 / ram_scale(info) + info.offset as f32
}

/// Wide raw RAM value to engineering value, for the 24-bit DC current fields
pub fn ram_from_raw_wide(info: &RamVarInfo, raw: u32) -> f32 {
    raw as f32 / ram_scale(info) + info.offset as f32
}

/// Engineering value to raw 16-bit setting value
pub fn setting_to_raw(info: &SettingInfo, value: f32) -> u16 {
    let scaled = if info.scale > 0 {
        value / info.scale as f32
    } else {
        value * -(info.scale as f32)
    };
    (scaled.round() as i64 - info.offset as i64) as u16
}

/// Raw 16-bit setting value to engineering value
pub fn setting_from_raw(info: &SettingInfo, raw: u16) -> f32 {
    let value = if info.scale > 0 {
        raw as f32 * info.scale as f32
    } else {
        raw as f32 / -(info.scale as f32)
    };
    value + info.offset as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vebus::definition::{
        DEFAULT_RAM_VAR_INFOS, DEFAULT_SETTING_INFOS, RamVariable, Setting,
    };

    #[test]
    fn ubat_scale_wraps_to_hundredths() {
        // UBat scale 32668 >= 0x4000 wraps to 0x8000 - 32668 = 100
        let info = DEFAULT_RAM_VAR_INFOS[RamVariable::UBat as usize];
        assert_eq!(ram_scale(&info), 100.0);
        assert_eq!(ram_from_raw_unsigned(&info, 5200), 52.0);
        assert_eq!(ram_to_raw_unsigned(&info, 52.0), 5200);
    }

    #[test]
    fn signed_ram_values_round_trip() {
        let info = DEFAULT_RAM_VAR_INFOS[RamVariable::IBat as usize];
        // IBat scale -32758 wraps to magnitude 10
        assert_eq!(ram_to_raw_signed(&info, -12.5), -125);
        assert_eq!(ram_from_raw_signed(&info, -125), -12.5);
    }

    #[test]
    fn offset_applies_after_scaling() {
        let info = DEFAULT_RAM_VAR_INFOS[RamVariable::InverterPeriodTime as usize];
        // scale 30815 wraps to 1953, offset 256
        let raw = ram_to_raw_unsigned(&info, 1.0);
        assert_eq!(raw, 1953 - 256);
        assert!((ram_from_raw_unsigned(&info, raw) - (raw as f32 / 1953.0 + 256.0)).abs() < 1e-3);
    }

    #[test]
    fn setting_conversions_honor_scale_sign() {
        // IMainsLimit scale -10: value is raw tenths of an amp
        let info = DEFAULT_SETTING_INFOS[Setting::IMainsLimit as usize];
        assert_eq!(setting_to_raw(&info, 32.0), 320);
        assert_eq!(setting_from_raw(&info, 320), 32.0);

        // RepeatedAbsorptionTime scale 15: raw counts of 15 minutes
        let info = DEFAULT_SETTING_INFOS[Setting::RepeatedAbsorptionTime as usize];
        assert_eq!(setting_to_raw(&info, 60.0), 4);
        assert_eq!(setting_from_raw(&info, 4), 60.0);
    }
}
