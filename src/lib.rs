//! # Triton - VE.Bus MultiPlus Driver
//!
//! Firmware-grade driver for Victron MultiPlus inverter/chargers over their
//! proprietary VE.Bus protocol, talking RS-485 through an off-the-shelf
//! adapter. It implements the MK3 master side of the WinMon command subset:
//! framing with byte stuffing and checksums, per-request id allocation with
//! retransmission and timeouts, decoding of broadcast status frames, and a
//! send scheduler locked to the inverter's sync frames.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration with validation
//! - `logging`: structured logging on the tracing stack
//! - `serial`: RS-485 half-duplex transport contract and implementation
//! - `vebus`: the protocol engine and its public handle
//! - `controls`: ESS power-setpoint policy
//!
//! Three execution contexts share the engine state behind narrow locks: the
//! engine loop owning the serial port, a maintainer task retiring requests
//! and delivering callbacks, and any number of API callers.

pub mod config;
pub mod controls;
pub mod error;
pub mod logging;
pub mod serial;
pub mod vebus;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, TritonError};
pub use vebus::VeBus;
