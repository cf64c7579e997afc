//! VE.Bus master protocol engine
//!
//! The hard core of the driver: framing and byte stuffing, the WinMon
//! command set, request lifecycle bookkeeping with retransmission, decoding
//! of broadcast status frames, and a send scheduler synchronized to the
//! inverter's sync frames.
//!
//! [`VeBus`] is the handle other subsystems talk to. It is cheap to clone
//! and safe to use from any task: requests are queued behind the registry
//! lock, decoded status is copied out behind the status lock. The actual
//! bus work happens on two other contexts, the [`engine::Engine`] loop that
//! owns the serial transport, and a maintainer task that periodically calls
//! [`VeBus::maintain`].

pub mod codec;
pub mod commands;
pub mod convert;
pub mod decoder;
pub mod definition;
pub mod engine;
pub mod registry;
pub mod status;

use crate::config::VeBusConfig;
use crate::logging::get_logger;
use crate::serial::SerialTransport;
use definition::*;
use engine::Engine;
use registry::{PendingRequest, RequestRegistry};
use status::{AcInfo, DcInfo, MasterMultiLed, MultiPlusStatus, StatusStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Lock a mutex, recovering from poisoning; critical sections here are
/// plain copies that cannot leave the data inconsistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Input value for a RAM variable or setting write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    U16(u16),
    I16(i16),
    F32(f32),
}

/// Decoded value delivered through the response callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseValue {
    U32(u32),
    I32(i32),
    F32(f32),
    None,
}

/// One matched response, delivered in maintainer context
#[derive(Debug, Clone)]
pub struct ResponseData {
    pub id: u8,
    pub command: u8,
    pub address: u8,
    pub value: ResponseValue,
}

/// Synchronous outcome of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    FifoFull,
    OutsideLowerRange,
    OutsideUpperRange,
    ConvertError,
}

/// Request id plus enqueue status; the id is only meaningful on success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestResult {
    pub id: u8,
    pub status: RequestStatus,
}

impl RequestResult {
    fn failed(status: RequestStatus) -> Self {
        Self { id: 0, status }
    }

    pub fn is_success(&self) -> bool {
        self.status == RequestStatus::Success
    }
}

type ResponseCallback = Arc<dyn Fn(ResponseData) + Send + Sync>;
type ReceiveCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// State shared between the handle, the engine loop and the maintainer
pub(crate) struct Shared {
    pub(crate) config: VeBusConfig,
    pub(crate) registry: Mutex<RequestRegistry>,
    pub(crate) status: Mutex<StatusStore>,
    pub(crate) tables: Mutex<InfoTables>,
    /// Raw (still stuffed) frames awaiting the receive callback
    pub(crate) rx_frames: Mutex<VecDeque<Vec<u8>>>,
    pub(crate) response_cb: Mutex<Option<ResponseCallback>>,
    pub(crate) receive_cb: Mutex<Option<ReceiveCallback>>,
    /// Communication gate; cleared by `stop_communication`
    pub(crate) running: AtomicBool,
    /// Set on resume so the engine drains TX once before listening
    pub(crate) resumed: AtomicBool,
    pub(crate) shutdown: AtomicBool,
    started_at: Instant,
}

impl Shared {
    pub(crate) fn new(config: VeBusConfig) -> Self {
        Self {
            registry: Mutex::new(RequestRegistry::new(
                config.fifo_size,
                config.response_timeout_ms,
                config.max_resend,
            )),
            status: Mutex::new(StatusStore::new()),
            tables: Mutex::new(InfoTables::default()),
            rx_frames: Mutex::new(VecDeque::with_capacity(config.receive_queue_depth)),
            response_cb: Mutex::new(None),
            receive_cb: Mutex::new(None),
            running: AtomicBool::new(false),
            resumed: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            started_at: Instant::now(),
            config,
        }
    }

    /// Milliseconds since engine start; the protocol clock
    pub(crate) fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Handle to the VE.Bus master engine
#[derive(Clone)]
pub struct VeBus {
    shared: Arc<Shared>,
    logger: crate::logging::StructuredLogger,
}

impl VeBus {
    /// Create the engine state. Communication stays paused until
    /// [`start_communication`](Self::start_communication).
    pub fn new(config: VeBusConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
            logger: get_logger("vebus"),
        }
    }

    /// Bind the run loop to its serial transport. The engine owns the
    /// transport and the receive buffer exclusively; spawn `run()` on a
    /// dedicated blocking task.
    pub fn engine(&self, serial: Box<dyn SerialTransport + Send>) -> Engine {
        Engine::new(self.shared.clone(), serial)
    }

    pub fn start_communication(&self) {
        self.shared.resumed.store(true, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::Relaxed);
        self.logger.info("VE.Bus communication started");
    }

    pub fn stop_communication(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
        self.logger.info("VE.Bus communication paused");
    }

    /// Ask the engine loop to exit
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
    }

    /// Maintainer-context step: retire timed-out requests, deliver matched
    /// responses, and drain the raw-frame queue into the receive callback.
    /// Idempotent; call it on a short interval.
    pub fn maintain(&self) {
        let now = self.shared.now_ms();
        lock(&self.shared.registry).expire_timeouts(now);
        let completed = lock(&self.shared.registry).harvest(now);

        for entry in &completed {
            let response = {
                let mut tables = lock(&self.shared.tables);
                decoder::decode_response(entry, &mut tables)
            };
            if let Some(data) = response
                && let Some(callback) = lock(&self.shared.response_cb).clone()
            {
                callback(data);
            }
        }

        let frames: Vec<Vec<u8>> = lock(&self.shared.rx_frames).drain(..).collect();
        if let Some(callback) = lock(&self.shared.receive_cb).clone() {
            for frame in &frames {
                callback(frame);
            }
        }
    }

    /// Write a RAM variable through `WriteViaID`.
    ///
    /// Float inputs are converted through the variable's scale/offset row;
    /// integer inputs pass through little-endian unchanged.
    pub fn write_ram(&self, variable: RamVariable, value: Value, eeprom: bool) -> RequestResult {
        let info = lock(&self.shared.tables).ram[variable as usize];
        let raw = match value {
            Value::U16(v) => v,
            Value::I16(v) => v as u16,
            Value::F32(v) => {
                if !info.available {
                    return RequestResult::failed(RequestStatus::ConvertError);
                }
                if info.scale < 0 {
                    convert::ram_to_raw_signed(&info, v) as u16
                } else {
                    convert::ram_to_raw_unsigned(&info, v)
                }
            }
        };

        let [low, high] = raw.to_le_bytes();
        let storage = storage_type(eeprom);
        self.enqueue_request(
            WinmonCommand::WriteRamVar,
            variable as u8,
            0x87,
            |id| commands::write_via_id(id, WinmonCommand::WriteRamVar, storage, variable as u8, low, high),
        )
    }

    /// Write a setting through `WriteViaID`, range-checked in raw units
    /// against the setting-info table.
    pub fn write_setting(&self, setting: Setting, value: Value, eeprom: bool) -> RequestResult {
        let info = lock(&self.shared.tables).settings[setting as usize];
        let raw = match value {
            Value::U16(v) => v,
            Value::I16(v) => v as u16,
            Value::F32(v) => {
                if !info.available {
                    return RequestResult::failed(RequestStatus::ConvertError);
                }
                convert::setting_to_raw(&info, v)
            }
        };
        if info.available {
            if raw > info.maximum {
                return RequestResult::failed(RequestStatus::OutsideUpperRange);
            }
            if raw < info.minimum {
                return RequestResult::failed(RequestStatus::OutsideLowerRange);
            }
        }

        let [low, high] = raw.to_le_bytes();
        let storage = storage_type(eeprom);
        self.enqueue_request(
            WinmonCommand::WriteSetting,
            setting as u8,
            0x87,
            |id| commands::write_via_id(id, WinmonCommand::WriteSetting, storage, setting as u8, low, high),
        )
    }

    /// Write the ESS power setpoint: negative watts charge the battery,
    /// positive watts discharge it. Never persisted to EEPROM.
    pub fn set_power(&self, watts: i16) -> RequestResult {
        let [low, high] = watts.to_le_bytes();
        self.enqueue_request(WinmonCommand::WriteRamVar, POWER_SETPOINT_ADDRESS, 0x87, |id| {
            commands::write_via_id(
                id,
                WinmonCommand::WriteRamVar,
                StorageType::NoEeprom,
                POWER_SETPOINT_ADDRESS,
                low,
                high,
            )
        })
    }

    pub fn read_ram(&self, variable: RamVariable) -> RequestResult {
        self.enqueue_request(WinmonCommand::ReadRamVar, variable as u8, 0x85, |id| {
            commands::read_ram_vars(id, &[variable as u8])
        })
    }

    pub fn read_setting(&self, setting: Setting) -> RequestResult {
        self.enqueue_request(WinmonCommand::ReadSetting, setting as u8, 0x86, |id| {
            commands::read_setting(id, setting as u16)
        })
    }

    pub fn read_ram_info(&self, variable: RamVariable) -> RequestResult {
        self.enqueue_request(WinmonCommand::GetRamVarInfo, variable as u8, 0x8E, |id| {
            commands::read_info(id, WinmonCommand::GetRamVarInfo, variable as u16)
        })
    }

    pub fn read_setting_info(&self, setting: Setting) -> RequestResult {
        self.enqueue_request(WinmonCommand::GetSettingInfo, setting as u8, 0x89, |id| {
            commands::read_info(id, WinmonCommand::GetSettingInfo, setting as u16)
        })
    }

    pub fn read_software_version(&self) -> RequestResult {
        self.enqueue_request(WinmonCommand::SendSoftwareVersionPart0, 0, 0x82, |id| {
            commands::read_software_version(id, WinmonCommand::SendSoftwareVersionPart0)
        })
    }

    pub fn read_device_state(&self) -> RequestResult {
        self.enqueue_request(WinmonCommand::GetSetDeviceState, 0, 0x94, |id| {
            commands::get_set_device_state(id, DeviceStateCommand::Inquire, 0)
        })
    }

    /// Queue a switch-state change. Fire and forget: the short switch frame
    /// carries no request id and no response is expected.
    pub fn set_switch(&self, state: SwitchState) {
        let now = self.shared.now_ms();
        let mut entry = PendingRequest::new(0, 0, 0x3F, 0, commands::set_switch_state(state), now);
        entry.response_expected = false;
        if !lock(&self.shared.registry).enqueue(entry, true) {
            self.logger.warn("Request queue full, switch command dropped");
        }
    }

    pub fn get_master_multi_led(&self) -> MasterMultiLed {
        lock(&self.shared.status).get_master_multi_led()
    }

    pub fn get_multi_plus_status(&self) -> MultiPlusStatus {
        lock(&self.shared.status).get_multi_plus_status()
    }

    pub fn get_dc_info(&self) -> DcInfo {
        lock(&self.shared.status).get_dc_info()
    }

    pub fn get_ac_info(&self, phase: PhaseInfo) -> AcInfo {
        lock(&self.shared.status).get_ac_info(phase)
    }

    pub fn new_master_multi_led_available(&self) -> bool {
        lock(&self.shared.status).new_master_multi_led_available()
    }

    pub fn new_multi_plus_status_available(&self) -> bool {
        lock(&self.shared.status).new_multi_plus_status_available()
    }

    pub fn new_dc_info_available(&self) -> bool {
        lock(&self.shared.status).new_dc_info_available()
    }

    pub fn new_ac_info_available(&self) -> Option<PhaseInfo> {
        lock(&self.shared.status).new_ac_info_available()
    }

    pub fn ram_var_info(&self, variable: RamVariable) -> RamVarInfo {
        lock(&self.shared.tables).ram[variable as usize]
    }

    pub fn setting_info(&self, setting: Setting) -> SettingInfo {
        lock(&self.shared.tables).settings[setting as usize]
    }

    /// Install the response callback. Set once at init, before the engine
    /// starts; responses are delivered in maintainer context.
    pub fn register_response_cb(&self, callback: impl Fn(ResponseData) + Send + Sync + 'static) {
        *lock(&self.shared.response_cb) = Some(Arc::new(callback));
    }

    /// Install the raw-frame callback. Set once at init; called in
    /// maintainer context with a copy of every received frame.
    pub fn register_receive_cb(&self, callback: impl Fn(&[u8]) + Send + Sync + 'static) {
        *lock(&self.shared.receive_cb) = Some(Arc::new(callback));
    }

    /// Outstanding request count, for diagnostics
    pub fn pending_requests(&self) -> usize {
        lock(&self.shared.registry).len()
    }

    fn enqueue_request(
        &self,
        command: WinmonCommand,
        address: u8,
        expected_response_code: u8,
        build: impl FnOnce(u8) -> Vec<u8>,
    ) -> RequestResult {
        let now = self.shared.now_ms();
        let mut registry = lock(&self.shared.registry);
        let Some(id) = registry.allocate_id() else {
            return RequestResult::failed(RequestStatus::FifoFull);
        };
        let entry = PendingRequest::new(
            id,
            command as u8,
            address,
            expected_response_code,
            build(id),
            now,
        );
        if !registry.enqueue(entry, true) {
            return RequestResult::failed(RequestStatus::FifoFull);
        }
        RequestResult {
            id,
            status: RequestStatus::Success,
        }
    }
}

/// Raw RAM address of the ESS power setpoint
const POWER_SETPOINT_ADDRESS: u8 = 0x83;

fn storage_type(eeprom: bool) -> StorageType {
    if eeprom {
        StorageType::Eeprom
    } else {
        StorageType::NoEeprom
    }
}
