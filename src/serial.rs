//! RS-485 serial transport for the VE.Bus link
//!
//! The protocol engine polls the transport; nothing here exposes interrupt
//! semantics. On the half-duplex link the caller must switch to [`Direction::Tx`],
//! write, flush, and return to [`Direction::Rx`] before the peer starts talking.

use crate::config::SerialConfig;
use crate::error::Result;
use crate::logging::get_logger;
use std::io::{Read, Write};
use std::time::Duration;

/// Line driver direction on the half-duplex link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

/// Byte-oriented half-duplex serial contract used by the protocol engine.
///
/// `get_byte` must only be called after `rx_available` reported true.
/// `tx_flush` blocks until the hardware has drained its transmit queue.
pub trait SerialTransport {
    fn rx_available(&mut self) -> bool;
    fn get_byte(&mut self) -> u8;
    fn write(&mut self, bytes: &[u8]);
    fn tx_flush(&mut self);
    fn set_direction(&mut self, direction: Direction);
}

/// RS-485 port backed by the `serialport` crate.
///
/// The direction-enable line is driven through RTS, which the usual RS-485
/// adapter breakouts route to the transceiver enable pin.
pub struct Rs485Port {
    port: Box<dyn serialport::SerialPort>,
    baud: u32,
    /// Bytes written since the last flush, used to pad the drain wait
    pending_tx: usize,
    logger: crate::logging::StructuredLogger,
}

impl Rs485Port {
    /// Open and configure the port described by `config`, receive-enabled.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let logger = get_logger("serial");

        let data_bits = match config.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let stop_bits = match config.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        };
        let parity = match config.parity.as_str() {
            "Even" => serialport::Parity::Even,
            "Odd" => serialport::Parity::Odd,
            _ => serialport::Parity::None,
        };

        let mut port = serialport::new(config.port.as_str(), config.baud)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(20))
            .open()?;

        port.write_request_to_send(false)?;

        logger.info(&format!(
            "Opened RS-485 port {} at {} baud",
            config.port, config.baud
        ));

        Ok(Self {
            port,
            baud: config.baud,
            pending_tx: 0,
            logger,
        })
    }
}

impl SerialTransport for Rs485Port {
    fn rx_available(&mut self) -> bool {
        self.port.bytes_to_read().map(|n| n > 0).unwrap_or(false)
    }

    fn get_byte(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => byte[0],
            Ok(_) => 0,
            Err(e) => {
                self.logger.error(&format!("Serial read failed: {}", e));
                0
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = self.port.write_all(bytes) {
            self.logger.error(&format!("Serial write failed: {}", e));
            return;
        }
        self.pending_tx += bytes.len();
    }

    fn tx_flush(&mut self) {
        if let Err(e) = self.port.flush() {
            self.logger.error(&format!("Serial flush failed: {}", e));
        }
        // flush() is advisory on some platforms; wait out the frame at
        // 10 bits per byte (8-N-1) before the direction pin may drop.
        if self.pending_tx > 0 {
            let drain_us = (self.pending_tx as u64 * 10 * 1_000_000) / self.baud as u64;
            std::thread::sleep(Duration::from_micros(drain_us + 1));
            self.pending_tx = 0;
        }
    }

    fn set_direction(&mut self, direction: Direction) {
        if let Err(e) = self
            .port
            .write_request_to_send(direction == Direction::Tx)
        {
            self.logger
                .error(&format!("Failed to toggle RS-485 direction: {}", e));
        }
    }
}
