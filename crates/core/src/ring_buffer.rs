//! Dual ring buffer and the outbound send helpers.
//!
//! Two fixed-capacity packet rings decouple the three actors of the
//! pipeline: the serial front end appends instructions to the inbound ring,
//! the scheduler tick consumes them, and every component reports results,
//! events and errors through the outbound ring. [`Exchange`] bundles both
//! rings with the virtual clock offset so the send helpers can stamp each
//! outgoing packet with the current virtual time and gate event traffic on
//! the clock running.
//!
//! Overflow contract of the outbound ring: when exactly two slots remain,
//! one `OUT_ERROR_OUTPUT_FULL` packet (value = 1) is written into the ring
//! instead of the caller's packet; when only the final disambiguation slot
//! remains, the previous entry's value field is bumped as a coalesced drop
//! counter. Prior entries are never overwritten.

use log::warn;

use crate::boards::BoardProfile;
use crate::headers::*;
use crate::packet::{ConfigPacket, DataPacket, ErrorPacket, I2cPacket, Packet, PinPacket};

/// Fixed-capacity circular packet queue. `start == next_free` means empty;
/// one slot always stays unwritten to keep full distinguishable from empty.
pub struct PacketRing {
    slots: Box<[Packet]>,
    start: usize,
    next_free: usize,
}

impl PacketRing {
    pub fn with_capacity(capacity: usize) -> Self {
        PacketRing {
            slots: vec![Packet::default(); capacity].into_boxed_slice(),
            start: 0,
            next_free: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.next_free
    }

    pub fn len(&self) -> usize {
        (self.next_free + self.capacity() - self.start) % self.capacity()
    }

    /// Usable free slots (the disambiguation slot is not counted).
    pub fn free_spots(&self) -> usize {
        self.capacity() - 1 - self.len()
    }

    /// Overflow check with the error-injection side effect; call before
    /// [`push`](Self::push). Returns false when the caller's packet must be
    /// dropped, in which case either an `OUT_ERROR_OUTPUT_FULL` packet took
    /// the slot or the newest entry's drop counter was bumped.
    pub fn has_room(&mut self) -> bool {
        let cap = self.capacity();
        if self.start == (self.next_free + 2) % cap {
            self.slots[self.next_free] = Packet::Error(ErrorPacket {
                header: OUT_ERROR_OUTPUT_FULL,
                org_header: OUT_ERROR_OUTPUT_FULL,
                value: 1,
                sub_header: ERROR_NO_SUB,
            });
            self.next_free = (self.next_free + 1) % cap;
            false
        } else if self.start == (self.next_free + 1) % cap {
            let prev = if self.next_free == 0 { cap - 1 } else { self.next_free - 1 };
            self.slots[prev].bump_value();
            false
        } else {
            true
        }
    }

    /// Unchecked append; the caller must have cleared [`has_room`](Self::has_room)
    /// (outbound) or [`try_push`](Self::try_push) must be used (inbound).
    pub fn push(&mut self, packet: Packet) {
        self.slots[self.next_free] = packet;
        self.next_free = (self.next_free + 1) % self.capacity();
    }

    /// Inbound append: refuses (without side effects) when only the
    /// disambiguation slot is left.
    pub fn try_push(&mut self, packet: Packet) -> bool {
        if (self.next_free + 1) % self.capacity() == self.start {
            return false;
        }
        self.push(packet);
        true
    }

    pub fn pop(&mut self) -> Option<Packet> {
        if self.is_empty() {
            return None;
        }
        let packet = self.slots[self.start];
        self.start = (self.start + 1) % self.capacity();
        Some(packet)
    }

    /// Oldest unread packet, not consumed.
    pub fn front(&self) -> Option<&Packet> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.start])
        }
    }

    /// Most recently written packet, not consumed.
    pub fn newest(&self) -> Option<&Packet> {
        if self.is_empty() {
            return None;
        }
        let prev = if self.next_free == 0 {
            self.capacity() - 1
        } else {
            self.next_free - 1
        };
        Some(&self.slots[prev])
    }

    /// Iterate oldest to newest without consuming.
    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        let cap = self.capacity();
        let start = self.start;
        (0..self.len()).map(move |i| &self.slots[(start + i) % cap])
    }

    /// Discard everything by fast-forwarding `start` to `next_free`.
    pub fn clear(&mut self) {
        self.start = self.next_free;
    }
}

/// Both rings plus the virtual clock offset and transmit-mode flags.
///
/// `offset_micros == 0` doubles as "clock stopped": timed dispatch and event
/// recording are disabled, and only confirmations and errors are queued.
pub struct Exchange {
    pub inbound: PacketRing,
    pub outbound: PacketRing,
    offset_micros: u32,
    /// When set, the outbound ring is transmitted only on `IN_READ`.
    pub(crate) read_on_request: bool,
    /// Reentrancy guard for outbound drains.
    pub(crate) read_active: bool,
}

impl Exchange {
    pub fn new(profile: &BoardProfile) -> Self {
        Exchange {
            inbound: PacketRing::with_capacity(profile.input_buffer_size),
            outbound: PacketRing::with_capacity(profile.output_buffer_size),
            offset_micros: 0,
            read_on_request: false,
            read_active: false,
        }
    }

    /// True while the virtual clock runs (recording epoch armed).
    pub fn recording(&self) -> bool {
        self.offset_micros != 0
    }

    pub fn set_offset(&mut self, offset: u32) {
        self.offset_micros = offset;
    }

    /// Current virtual time for a given hardware microsecond reading.
    pub fn virtual_now(&self, hw_micros: u32) -> u32 {
        hw_micros.wrapping_sub(self.offset_micros)
    }

    /// Queue a packet if it passes the gate. The overflow check runs first
    /// so saturation is reported even for traffic the gate would drop.
    fn queue(&mut self, packet: Packet, gate_open: bool) {
        let room = self.outbound.has_room();
        if room && gate_open {
            self.outbound.push(packet);
        }
    }

    /// Queue a 32-bit data packet. Non-confirmation (event) traffic is
    /// dropped while the clock is stopped.
    pub fn send_data32(&mut self, header: u8, value: u32, hw_micros: u32, is_confirmation: bool) {
        let exec_time = self.virtual_now(hw_micros);
        self.queue(
            Packet::Data(DataPacket { header, exec_time, value }),
            is_confirmation || self.recording(),
        );
    }

    pub fn send_pin(&mut self, header: u8, id: u8, value: u8, hw_micros: u32, is_confirmation: bool) {
        let exec_time = self.virtual_now(hw_micros);
        self.queue(
            Packet::Pin(PinPacket { header, exec_time, id, value }),
            is_confirmation || self.recording(),
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send_i2c(
        &mut self,
        header: u8,
        device_address: u8,
        register_address: u8,
        value_ms: u8,
        value_ls: u8,
        hw_micros: u32,
        is_confirmation: bool,
    ) {
        let exec_time = self.virtual_now(hw_micros);
        self.queue(
            Packet::I2c(I2cPacket {
                header,
                exec_time,
                device_address,
                register_address,
                value_ms,
                value_ls,
            }),
            is_confirmation || self.recording(),
        );
    }

    /// Configuration confirmations are never gated: the host relies on them
    /// before the clock is armed.
    pub fn send_config(&mut self, header: u8, config_header: u8, value: u8, hw_micros: u32) {
        let exec_time = self.virtual_now(hw_micros);
        self.queue(
            Packet::Config(ConfigPacket { header, exec_time, config_header, value }),
            true,
        );
    }

    /// Queue an error report; never gated.
    pub fn error(&mut self, error_header: u8, source_header: u8, value: u32) {
        self.error_sub(error_header, source_header, value, ERROR_NO_SUB);
    }

    pub fn error_sub(&mut self, error_header: u8, source_header: u8, value: u32, sub_header: u8) {
        warn!(
            "protocol error {} from instruction {} (value {}, sub {})",
            error_header, source_header, value, sub_header
        );
        self.queue(
            Packet::Error(ErrorPacket {
                header: error_header,
                org_header: source_header,
                value,
                sub_header,
            }),
            true,
        );
    }
}
