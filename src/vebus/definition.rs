//! Wire-level definitions for the VE.Bus master protocol
//!
//! Frame markers, the WinMon command set, the RAM-variable and setting
//! address spaces, and the compiled-in scale/offset tables for a
//! MultiPlus-II 48/5000. Individual table rows are refreshed at runtime
//! from `GetRAMVarInfo`/`GetSettingInfo` responses.

use serde::Serialize;

/// Master-side frame id bytes (MK3 interface)
pub const MK3_ID_0: u8 = 0x98;
pub const MK3_ID_1: u8 = 0xF7;
/// Inverter-side frame id bytes
pub const MP_ID_0: u8 = 0x83;
pub const MP_ID_1: u8 = 0x83;
pub const SYNC_BYTE: u8 = 0x55;
pub const SYNC_FRAME: u8 = 0xFD;
pub const DATA_FRAME: u8 = 0xFE;
pub const END_OF_FRAME: u8 = 0xFF;
pub const LOW_BATTERY: u8 = 0x02;

/// Frame counter advance: 7-bit wrap
pub fn next_frame_nr(frame_nr: u8) -> u8 {
    frame_nr.wrapping_add(1) & 0x7F
}

/// WinMon command codes understood by the MultiPlus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WinmonCommand {
    SendSoftwareVersionPart0 = 0x05,
    SendSoftwareVersionPart1 = 0x06,
    GetSetDeviceState = 0x0E,
    ReadRamVar = 0x30,
    ReadSetting = 0x31,
    WriteRamVar = 0x32,
    WriteSetting = 0x33,
    WriteData = 0x34,
    GetSettingInfo = 0x35,
    GetRamVarInfo = 0x36,
    WriteViaId = 0x37,
    ReadSnapShot = 0x38,
}

impl TryFrom<u8> for WinmonCommand {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        Ok(match value {
            0x05 => WinmonCommand::SendSoftwareVersionPart0,
            0x06 => WinmonCommand::SendSoftwareVersionPart1,
            0x0E => WinmonCommand::GetSetDeviceState,
            0x30 => WinmonCommand::ReadRamVar,
            0x31 => WinmonCommand::ReadSetting,
            0x32 => WinmonCommand::WriteRamVar,
            0x33 => WinmonCommand::WriteSetting,
            0x34 => WinmonCommand::WriteData,
            0x35 => WinmonCommand::GetSettingInfo,
            0x36 => WinmonCommand::GetRamVarInfo,
            0x37 => WinmonCommand::WriteViaId,
            0x38 => WinmonCommand::ReadSnapShot,
            other => return Err(other),
        })
    }
}

/// Sub-command byte for `GetSetDeviceState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceStateCommand {
    Inquire = 0,
    ForceToEqualise = 1,
    ForceToAbsorption = 2,
    ForceToFloat = 3,
}

/// Live-value address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RamVariable {
    UMainsRms = 0,
    IMainsRms = 1,
    UInverterRms = 2,
    IInverterRms = 3,
    UBat = 4,
    IBat = 5,
    /// RMS value of the battery ripple voltage
    UBatRms = 6,
    /// Time base 0.1s
    InverterPeriodTime = 7,
    /// Time base 0.1s
    MainsPeriodTime = 8,
    SignedAcLoadCurrent = 9,
    /// No variable info available
    VirtualSwitchPosition = 10,
    IgnoreAcInputState = 11,
    MultiFunctionalRelayState = 12,
    /// Battery monitor function
    ChargeState = 13,
    /// Filtered
    InverterPower = 14,
    InverterPower2 = 15,
    OutputPower = 16,
    InverterPowerNf = 17,
    InverterPower2Nf = 18,
    OutputPowerNf = 19,
}

pub const RAM_VARIABLE_COUNT: usize = 20;

/// Persisted-parameter address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Setting {
    Flags0 = 0,
    Flags1 = 1,
    UBatAbsorption = 2,
    UBatFloat = 3,
    IBatBulk = 4,
    UInvSetpoint = 5,
    IMainsLimit = 6,
    RepeatedAbsorptionTime = 7,
    RepeatedAbsorptionInterval = 8,
    MaximumAbsorptionDuration = 9,
    ChargeCharacteristic = 10,
    UBatLowLimitForInverter = 11,
    UBatLowHysteresisForInverter = 12,
    /// No setting info available
    NumberOfSlavesConnected = 13,
    /// No setting info available
    SpecialThreePhaseSetting = 14,
}

pub const SETTING_COUNT: usize = 15;

/// Flag bit in a `WriteViaID` payload selecting the address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VariableType {
    RamVar = 0x00,
    Setting = 0x01,
}

/// Flag bit in a `WriteViaID` payload selecting persistence.
///
/// EEPROM write endurance is limited; prefer `NoEeprom` for anything driven
/// from a control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageType {
    Eeprom = 0x00,
    NoEeprom = 0x02,
}

/// Front-switch position commanded through the short switch frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SwitchState {
    Sleep = 0x04,
    ChargerOnly = 0x05,
    /// Turns AC-in off
    InverterOnly = 0x06,
    /// Normal ON mode
    ChargerInverter = 0x07,
}

/// How a raw 16-bit response value is to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDataType {
    None,
    Float,
    Unsigned,
    Signed,
}

/// Phase tag in an info frame; `Dc` shares the dispatch byte space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum PhaseInfo {
    #[default]
    L4 = 0x05,
    L3 = 0x06,
    L2 = 0x07,
    SL1 = 0x08,
    SL2 = 0x09,
    SL3 = 0x0A,
    SL4 = 0x0B,
    Dc = 0x0C,
}

/// Number of AC phase slots (the `Dc` tag is tracked separately)
pub const PHASES_COUNT: usize = 7;

impl PhaseInfo {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x05 => PhaseInfo::L4,
            0x06 => PhaseInfo::L3,
            0x07 => PhaseInfo::L2,
            0x08 => PhaseInfo::SL1,
            0x09 => PhaseInfo::SL2,
            0x0A => PhaseInfo::SL3,
            0x0B => PhaseInfo::SL4,
            0x0C => PhaseInfo::Dc,
            _ => return None,
        })
    }

    /// Index into the AC info slot array; `Dc` has no slot
    pub fn index(self) -> usize {
        (self as u8 - PhaseInfo::L4 as u8) as usize
    }
}

/// Operating state reported per phase in info frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PhaseState {
    #[default]
    Down,
    Startup,
    Off,
    Slave,
    InvertFull,
    InvertHalf,
    InvertAes,
    PowerAssist,
    Bypass,
    Charge,
}

impl PhaseState {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => PhaseState::Startup,
            0x02 => PhaseState::Off,
            0x03 => PhaseState::Slave,
            0x04 => PhaseState::InvertFull,
            0x05 => PhaseState::InvertHalf,
            0x06 => PhaseState::InvertAes,
            0x07 => PhaseState::PowerAssist,
            0x08 => PhaseState::Bypass,
            0x09 => PhaseState::Charge,
            _ => PhaseState::Down,
        }
    }
}

/// Conversion row for one RAM variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamVarInfo {
    pub scale: i16,
    pub offset: i16,
    pub available: bool,
    pub data_type: ResponseDataType,
}

/// Conversion and range row for one setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingInfo {
    pub scale: i16,
    pub offset: i16,
    pub default: u16,
    pub minimum: u16,
    pub maximum: u16,
    pub access_level: u8,
    pub available: bool,
    pub data_type: ResponseDataType,
}

/// Both conversion tables, refreshed at runtime by info responses
#[derive(Debug, Clone)]
pub struct InfoTables {
    pub ram: [RamVarInfo; RAM_VARIABLE_COUNT],
    pub settings: [SettingInfo; SETTING_COUNT],
}

impl Default for InfoTables {
    fn default() -> Self {
        Self {
            ram: DEFAULT_RAM_VAR_INFOS,
            settings: DEFAULT_SETTING_INFOS,
        }
    }
}

const fn ram_row(scale: i16, offset: i16, available: bool, data_type: ResponseDataType) -> RamVarInfo {
    RamVarInfo {
        scale,
        offset,
        available,
        data_type,
    }
}

const fn setting_row(
    scale: i16,
    offset: i16,
    default: u16,
    minimum: u16,
    maximum: u16,
    access_level: u8,
    available: bool,
    data_type: ResponseDataType,
) -> SettingInfo {
    SettingInfo {
        scale,
        offset,
        default,
        minimum,
        maximum,
        access_level,
        available,
        data_type,
    }
}

/// Defaults for a MultiPlus-II 48/5000
pub const DEFAULT_RAM_VAR_INFOS: [RamVarInfo; RAM_VARIABLE_COUNT] = [
    ram_row(32668, 0, true, ResponseDataType::Float),  // UMainsRms
    ram_row(-32668, 0, true, ResponseDataType::Float), // IMainsRms
    ram_row(32668, 0, true, ResponseDataType::Float),  // UInverterRms
    ram_row(32668, 0, true, ResponseDataType::Float),  // IInverterRms
    ram_row(32668, 0, true, ResponseDataType::Float),  // UBat
    ram_row(-32758, 0, true, ResponseDataType::Float), // IBat
    ram_row(32668, 0, true, ResponseDataType::Float),  // UBatRms
    ram_row(30815, 256, true, ResponseDataType::Float), // InverterPeriodTime
    ram_row(31791, 0, true, ResponseDataType::Float),  // MainsPeriodTime
    ram_row(-32668, 0, true, ResponseDataType::Float), // SignedAcLoadCurrent
    ram_row(0, 0, false, ResponseDataType::None),      // VirtualSwitchPosition
    ram_row(5, -32768, true, ResponseDataType::Float), // IgnoreAcInputState
    ram_row(6, -32768, true, ResponseDataType::Float), // MultiFunctionalRelayState
    ram_row(32568, 0, true, ResponseDataType::Float),  // ChargeState
    ram_row(-1, 0, true, ResponseDataType::Float),     // InverterPower
    ram_row(-1, 0, true, ResponseDataType::Float),     // InverterPower2
    ram_row(-1, 0, true, ResponseDataType::Float),     // OutputPower
    ram_row(-1, 0, true, ResponseDataType::Float),     // InverterPowerNf
    ram_row(-1, 0, true, ResponseDataType::Float),     // InverterPower2Nf
    ram_row(-1, 0, true, ResponseDataType::Float),     // OutputPowerNf
];

/// Defaults for a MultiPlus-II 48/5000
pub const DEFAULT_SETTING_INFOS: [SettingInfo; SETTING_COUNT] = [
    setting_row(1, 0, 35248, 0, 28668, 0, true, ResponseDataType::Unsigned), // Flags0
    setting_row(2, 0, 19966, 0, 65535, 0, true, ResponseDataType::Unsigned), // Flags1
    setting_row(-100, 0, 5850, 4800, 5900, 0, true, ResponseDataType::Float), // UBatAbsorption
    setting_row(-100, 0, 5800, 4800, 5900, 0, true, ResponseDataType::Float), // UBatFloat
    setting_row(1, 0, 80, 0, 80, 0, true, ResponseDataType::Float),          // IBatBulk
    setting_row(1, 0, 230, 210, 245, 0, true, ResponseDataType::Float),      // UInvSetpoint
    setting_row(-10, 0, 320, 10, 500, 0, true, ResponseDataType::Float),     // IMainsLimit
    setting_row(15, 0, 4, 1, 96, 0, true, ResponseDataType::Float), // RepeatedAbsorptionTime
    setting_row(360, 0, 28, 1, 180, 0, true, ResponseDataType::Float), // RepeatedAbsorptionInterval
    setting_row(60, 0, 8, 1, 24, 0, true, ResponseDataType::Float), // MaximumAbsorptionDuration
    setting_row(1, 0, 3, 1, 3, 0, true, ResponseDataType::Float),   // ChargeCharacteristic
    setting_row(-100, 0, 4320, 4200, 4600, 128, true, ResponseDataType::Float), // UBatLowLimitForInverter
    setting_row(-100, 0, 160, 25, 600, 0, true, ResponseDataType::Float), // UBatLowHysteresisForInverter
    setting_row(0, 0, 0, 0, 0, 0, false, ResponseDataType::None), // NumberOfSlavesConnected
    setting_row(0, 0, 0, 0, 0, 0, false, ResponseDataType::None), // SpecialThreePhaseSetting
];
