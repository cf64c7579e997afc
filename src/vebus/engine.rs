//! The protocol engine run loop
//!
//! One cooperative loop owns the serial transport and the receive buffer.
//! It drains bytes into frames, hands raw frames to the upstream queue,
//! decodes, and transmits at most one pending request per received sync
//! frame. Sync frames are the only send synchronization on the half-duplex
//! link: they open the bus turnaround window.
//!
//! No lock is ever held across a serial operation; the registry is locked
//! once to copy the request out and once afterwards for the send
//! bookkeeping.

use super::codec;
use super::decoder::{self, FrameKind};
use super::definition::END_OF_FRAME;
use super::{Shared, lock};
use crate::logging::get_logger;
use crate::serial::{Direction, SerialTransport};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Protocol engine bound to one serial transport.
///
/// Constructed by [`crate::vebus::VeBus::engine`]; run it on a dedicated
/// blocking task.
pub struct Engine {
    serial: Box<dyn SerialTransport + Send>,
    shared: Arc<Shared>,
    receive_buffer: Vec<u8>,
    logger: crate::logging::StructuredLogger,
}

impl Engine {
    pub(crate) fn new(shared: Arc<Shared>, serial: Box<dyn SerialTransport + Send>) -> Self {
        let max_frame_size = shared.config.max_frame_size;
        Self {
            serial,
            shared,
            receive_buffer: Vec::with_capacity(max_frame_size),
            logger: get_logger("engine"),
        }
    }

    /// Run until shutdown is requested.
    ///
    /// The loop never sleeps on RX beyond a short idle pause; all waiting
    /// for the peer happens through the sync-frame send windows.
    pub fn run(mut self) {
        self.logger.info("VE.Bus engine started");
        while !self.shared.shutdown.load(Ordering::Relaxed) {
            if !self.poll() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.logger.info("VE.Bus engine stopped");
    }

    /// One engine iteration. Returns true when bytes were consumed.
    pub fn poll(&mut self) -> bool {
        if !self.shared.running.load(Ordering::Relaxed) {
            return false;
        }
        // Drain any transmit leftovers once after a resume
        if self.shared.resumed.swap(false, Ordering::Relaxed) {
            self.serial.tx_flush();
        }

        if !self.serial.rx_available() {
            return false;
        }

        while self.serial.rx_available() {
            let byte = self.serial.get_byte();
            if self.receive_buffer.len() < self.shared.config.max_frame_size {
                self.receive_buffer.push(byte);
            }
            if byte == END_OF_FRAME {
                break;
            }
        }

        if self.receive_buffer.last() != Some(&END_OF_FRAME) {
            if self.receive_buffer.len() >= self.shared.config.max_frame_size {
                self.logger.warn("Oversized frame without terminator, discarding");
                self.receive_buffer.clear();
            }
            // Otherwise a partial frame; keep collecting
            return true;
        }

        // Hand the raw frame to the upstream queue before destuffing
        {
            let mut queue = lock(&self.shared.rx_frames);
            if queue.len() < self.shared.config.receive_queue_depth {
                queue.push_back(self.receive_buffer.clone());
            } else {
                self.logger.warn("Receive hand-off queue full, dropping raw frame");
            }
        }

        codec::destuff(&mut self.receive_buffer);
        let kind = decoder::decode_frame(&self.receive_buffer, &self.shared);
        self.receive_buffer.clear();

        if let FrameKind::Sync { frame_nr } = kind {
            self.transmit_pending(frame_nr);
        }
        true
    }

    /// Send the oldest unsent request, if any, into the window opened by a
    /// sync frame. At most one frame goes out per sync.
    fn transmit_pending(&mut self, frame_nr: u8) {
        let pending = {
            let registry = lock(&self.shared.registry);
            registry
                .first_unsent()
                .map(|entry| (entry.id, codec::prepare_frame(&entry.request_bytes, frame_nr)))
        };
        let Some((id, frame)) = pending else {
            return;
        };

        self.serial.set_direction(Direction::Tx);
        self.serial.write(&frame);
        self.serial.tx_flush();
        self.serial.set_direction(Direction::Rx);

        let now = self.shared.now_ms();
        lock(&self.shared.registry).mark_sent(id, now);
        self.logger
            .trace(&format!("Sent request id={:#04x} ({} bytes)", id, frame.len()));
    }
}
