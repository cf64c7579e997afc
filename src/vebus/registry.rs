//! Outstanding-request registry
//!
//! A fixed-capacity queue of requests waiting for the next send window or
//! for their response. Request ids are allocated from a rolling counter in
//! `[0x80, 0xFF]` and stay unique among outstanding entries. Removal swaps
//! with the last slot; responses are matched by id, not by order.

use tracing::warn;

/// One outstanding request
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Request id in `[0x80, 0xFF]`; 0 for the id-less switch frame
    pub id: u8,
    /// WinMon command code this entry was built for
    pub command: u8,
    /// Command-specific target address
    pub address: u8,
    /// Byte expected at the response-code position for a match
    pub expected_response_code: u8,
    /// Entries that expect no response leave the queue once transmitted
    pub response_expected: bool,
    /// Unframed request payload
    pub request_bytes: Vec<u8>,
    /// Destuffed response frame, populated once per send attempt
    pub response_bytes: Vec<u8>,
    pub is_sent: bool,
    pub sent_time_ms: u64,
    pub resend_count: u32,
}

impl PendingRequest {
    pub fn new(
        id: u8,
        command: u8,
        address: u8,
        expected_response_code: u8,
        request_bytes: Vec<u8>,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            command,
            address,
            expected_response_code,
            response_expected: true,
            request_bytes,
            response_bytes: Vec::new(),
            is_sent: false,
            sent_time_ms: now_ms,
            resend_count: 0,
        }
    }
}

/// Fixed-capacity request queue with id allocation and retry bookkeeping
#[derive(Debug)]
pub struct RequestRegistry {
    slots: Vec<PendingRequest>,
    capacity: usize,
    response_timeout_ms: u64,
    max_resend: u32,
    /// Rolling id counter; ids 0xE4-0xE7 are also used by Venus OS but
    /// collisions only matter against our own outstanding entries
    last_id: u8,
}

impl RequestRegistry {
    pub fn new(capacity: usize, response_timeout_ms: u64, max_resend: u32) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            response_timeout_ms,
            max_resend,
            last_id: 0x7F,
        }
    }

    /// Allocate the next request id that does not collide with an
    /// outstanding entry. Fails only once 127 candidates are all taken.
    pub fn allocate_id(&mut self) -> Option<u8> {
        for _ in 0..127 {
            self.last_id = self.last_id.wrapping_add(1);
            if self.last_id < 0x80 {
                self.last_id = 0x80;
            }
            let candidate = self.last_id;
            if !self.slots.iter().any(|slot| slot.id == candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Queue a request.
    ///
    /// With `coalesce`, an outstanding entry for the same `(command, address)`
    /// is replaced in place: its response is discarded and its clock restarts,
    /// so a rapid series of writes to one target only ever occupies one slot.
    pub fn enqueue(&mut self, entry: PendingRequest, coalesce: bool) -> bool {
        if coalesce
            && let Some(slot) = self
                .slots
                .iter_mut()
                .find(|slot| slot.command == entry.command && slot.address == entry.address)
        {
            *slot = entry;
            return true;
        }

        if self.slots.len() >= self.capacity {
            return false;
        }
        self.slots.push(entry);
        true
    }

    /// Attach a response frame to the outstanding entry with `id`
    pub fn match_response(&mut self, id: u8, frame: &[u8]) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.id == id) {
            slot.response_bytes = frame.to_vec();
            true
        } else {
            false
        }
    }

    /// Reference to the first entry still waiting for its send window
    pub fn first_unsent(&self) -> Option<&PendingRequest> {
        self.slots.iter().find(|slot| !slot.is_sent)
    }

    /// Mark the entry with `id` transmitted, or drop it if it never
    /// expected a response.
    pub fn mark_sent(&mut self, id: u8, now_ms: u64) {
        let Some(index) = self.slots.iter().position(|slot| slot.id == id) else {
            return;
        };
        if !self.slots[index].response_expected {
            self.slots.swap_remove(index);
            return;
        }
        let slot = &mut self.slots[index];
        slot.is_sent = true;
        slot.sent_time_ms = now_ms;
    }

    /// Collect entries whose response matched their expected code; entries
    /// with a mismatched response are retried until the resend budget is
    /// spent, then dropped.
    pub fn harvest(&mut self, now_ms: u64) -> Vec<PendingRequest> {
        let mut completed = Vec::new();
        let mut index = 0;
        while index < self.slots.len() {
            if self.slots[index].response_bytes.is_empty() {
                index += 1;
                continue;
            }

            let expected = self.slots[index].expected_response_code;
            if self.slots[index].response_bytes.get(6) == Some(&expected) {
                completed.push(self.slots.swap_remove(index));
                continue;
            }

            if self.slots[index].resend_count >= self.max_resend {
                let slot = self.slots.swap_remove(index);
                warn!(
                    id = slot.id,
                    command = slot.command,
                    "Dropping request after {} mismatched responses",
                    slot.resend_count + 1
                );
                continue;
            }

            let slot = &mut self.slots[index];
            slot.resend_count += 1;
            slot.is_sent = false;
            slot.sent_time_ms = now_ms;
            slot.response_bytes.clear();
            index += 1;
        }
        completed
    }

    /// Retry or drop entries whose response window has elapsed
    pub fn expire_timeouts(&mut self, now_ms: u64) {
        let mut index = 0;
        while index < self.slots.len() {
            let elapsed = now_ms.saturating_sub(self.slots[index].sent_time_ms);
            if elapsed < self.response_timeout_ms {
                index += 1;
                continue;
            }

            if self.slots[index].resend_count >= self.max_resend {
                let slot = self.slots.swap_remove(index);
                warn!(
                    id = slot.id,
                    command = slot.command,
                    resend_count = slot.resend_count,
                    "Dropping request after response timeout"
                );
                continue;
            }

            let slot = &mut self.slots[index];
            warn!(
                id = slot.id,
                command = slot.command,
                resend_count = slot.resend_count,
                "Response timeout, scheduling retransmission"
            );
            slot.resend_count += 1;
            slot.is_sent = false;
            slot.sent_time_ms = now_ms;
            slot.response_bytes.clear();
            index += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.slots.iter()
    }
}
