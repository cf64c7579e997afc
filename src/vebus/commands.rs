//! WinMon request payload builders
//!
//! These produce the unframed payload only; the engine adds framing,
//! stuffing and checksum when the send window opens. Most requests carry a
//! one-byte request id so responses can be matched out of order. The switch
//! frame is the exception: a fixed short form with no id.

use super::definition::{DeviceStateCommand, StorageType, SwitchState, VariableType, WinmonCommand};

/// `WriteViaID` payload for a RAM variable or setting write.
///
/// The `command` argument selects the target address space; the wire
/// command byte is always `WriteViaID`.
pub fn write_via_id(
    id: u8,
    command: WinmonCommand,
    storage: StorageType,
    address: u8,
    low_byte: u8,
    high_byte: u8,
) -> Vec<u8> {
    let var_type = if command == WinmonCommand::WriteRamVar {
        VariableType::RamVar
    } else {
        VariableType::Setting
    };
    vec![
        0x00,
        id,
        WinmonCommand::WriteViaId as u8,
        var_type as u8 | storage as u8,
        address,
        low_byte,
        high_byte,
    ]
}

/// `ReadRAMVar` payload for up to six variable indices
pub fn read_ram_vars(id: u8, addresses: &[u8]) -> Vec<u8> {
    debug_assert!(!addresses.is_empty() && addresses.len() <= 6);
    let mut payload = vec![0x00, id, WinmonCommand::ReadRamVar as u8];
    payload.extend_from_slice(addresses);
    payload
}

/// `ReadSetting` payload
pub fn read_setting(id: u8, address: u16) -> Vec<u8> {
    vec![
        0x00,
        id,
        WinmonCommand::ReadSetting as u8,
        (address & 0xFF) as u8,
        (address >> 8) as u8,
    ]
}

/// `GetRAMVarInfo` / `GetSettingInfo` payload
pub fn read_info(id: u8, command: WinmonCommand, address: u16) -> Vec<u8> {
    vec![
        0x00,
        id,
        command as u8,
        (address & 0xFF) as u8,
        (address >> 8) as u8,
    ]
}

/// `SendSoftwareVersionPart0/1` payload
pub fn read_software_version(id: u8, command: WinmonCommand) -> Vec<u8> {
    vec![0x00, id, command as u8]
}

/// `GetSetDeviceState` payload
pub fn get_set_device_state(id: u8, command: DeviceStateCommand, state: u8) -> Vec<u8> {
    vec![
        0x00,
        id,
        WinmonCommand::GetSetDeviceState as u8,
        command as u8,
        state,
    ]
}

/// Switch-state payload; the short form carries no request id
pub fn set_switch_state(state: SwitchState) -> Vec<u8> {
    vec![0x3F, state as u8, 0x00, 0x00, 0x00]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_via_id_sets_flag_bits() {
        // RAM write, volatile: flags 0x00 | 0x02
        let payload = write_via_id(
            0x81,
            WinmonCommand::WriteRamVar,
            StorageType::NoEeprom,
            0x83,
            0x24,
            0xFA,
        );
        assert_eq!(payload, vec![0x00, 0x81, 0x37, 0x02, 0x83, 0x24, 0xFA]);

        // Setting write, persisted: flags 0x01 | 0x00
        let payload = write_via_id(
            0x90,
            WinmonCommand::WriteSetting,
            StorageType::Eeprom,
            0x06,
            0x40,
            0x01,
        );
        assert_eq!(payload, vec![0x00, 0x90, 0x37, 0x01, 0x06, 0x40, 0x01]);
    }

    #[test]
    fn read_payloads_carry_little_endian_addresses() {
        assert_eq!(
            read_ram_vars(0x80, &[0x04]),
            vec![0x00, 0x80, 0x30, 0x04]
        );
        assert_eq!(
            read_ram_vars(0x80, &[0x00, 0x04, 0x05]),
            vec![0x00, 0x80, 0x30, 0x00, 0x04, 0x05]
        );
        assert_eq!(read_setting(0x82, 0x0106), vec![0x00, 0x82, 0x31, 0x06, 0x01]);
        assert_eq!(
            read_info(0x83, WinmonCommand::GetSettingInfo, 0x0002),
            vec![0x00, 0x83, 0x35, 0x02, 0x00]
        );
        assert_eq!(
            read_info(0x84, WinmonCommand::GetRamVarInfo, 0x0004),
            vec![0x00, 0x84, 0x36, 0x04, 0x00]
        );
    }

    #[test]
    fn auxiliary_payloads_match_wire_format() {
        assert_eq!(
            read_software_version(0x85, WinmonCommand::SendSoftwareVersionPart0),
            vec![0x00, 0x85, 0x05]
        );
        assert_eq!(
            get_set_device_state(0x86, DeviceStateCommand::Inquire, 0),
            vec![0x00, 0x86, 0x0E, 0x00, 0x00]
        );
        assert_eq!(
            set_switch_state(SwitchState::ChargerInverter),
            vec![0x3F, 0x07, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            set_switch_state(SwitchState::Sleep),
            vec![0x3F, 0x04, 0x00, 0x00, 0x00]
        );
    }
}
