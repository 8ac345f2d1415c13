//! Async (AER) to-chip interfaces.
//!
//! Eight slots, each a parallel data bus of up to 32 bits with a 4-phase
//! request/acknowledge handshake driven by this side: data and request are
//! outputs, acknowledge is an input. A send drives the data bits, waits the
//! configured settle delay, asserts request, and polls acknowledge until the
//! chip answers or the timeout expires; request is always deasserted
//! afterwards so a dead chip cannot wedge the bus.

use log::debug;

use crate::hal::{Board, PinMode};
use crate::headers::*;
use crate::interfaces::{AER_MAX_WIDTH, AER_SLOTS};
use crate::pins::PinRegistry;
use crate::ring_buffer::Exchange;
use crate::AER_HANDSHAKE_TIMEOUT_MS;

#[derive(Clone, Copy)]
pub(crate) struct AerSlot {
    pub active: bool,
    pub req_pin: u8,
    pub ack_pin: u8,
    pub data_pins: [u8; AER_MAX_WIDTH as usize],
    /// Data bus width in bits, 0-32.
    pub width: u8,
    /// Settle delay before request transitions, in multiples of 20 ns.
    pub req_delay: u8,
    pub hs_active_low: bool,
    pub data_active_low: bool,
}

impl Default for AerSlot {
    fn default() -> Self {
        AerSlot {
            active: false,
            req_pin: 0,
            ack_pin: 0,
            data_pins: [0; AER_MAX_WIDTH as usize],
            width: 0,
            req_delay: 0,
            hs_active_low: false,
            data_active_low: false,
        }
    }
}

/// Stage one configuration field on a slot; shared by both directions.
pub(crate) fn stage_field(
    slot: &mut AerSlot,
    conf_header: u8,
    id: u8,
    sub: u8,
    data: u8,
    ex: &mut Exchange,
    hw: u32,
) {
    match sub {
        CONF_REQ => {
            slot.req_pin = data;
            ex.send_config(conf_header, sub, data, hw);
        }
        CONF_ACK => {
            slot.ack_pin = data;
            ex.send_config(conf_header, sub, data, hw);
        }
        CONF_WIDTH => {
            if data > AER_MAX_WIDTH {
                ex.error_sub(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, conf_header, data as u32, sub);
                slot.width = AER_MAX_WIDTH;
                ex.send_config(conf_header, sub, AER_MAX_WIDTH, hw);
            } else {
                slot.width = data;
                ex.send_config(conf_header, sub, data, hw);
            }
        }
        CONF_REQ_DELAY => {
            slot.req_delay = data;
            ex.send_config(conf_header, sub, data, hw);
        }
        CONF_TYPE => {
            if data == ASYNC_4PHASE_CLOW_DHIGH {
                slot.hs_active_low = true;
            }
            ex.send_config(conf_header, sub, data, hw);
        }
        sub if sub <= CONF_CHANNEL_MAX => {
            slot.data_pins[sub as usize] = data;
            ex.send_config(conf_header, sub, data, hw);
        }
        _ => {
            ex.error_sub(OUT_ERROR_UNKNOWN_CONFIGURATION, conf_header, id as u32, sub);
        }
    }
}

pub struct AerToChip {
    slots: [AerSlot; AER_SLOTS],
}

impl AerToChip {
    pub fn new() -> Self {
        AerToChip {
            slots: [AerSlot::default(); AER_SLOTS],
        }
    }

    pub fn is_active(&self, id: u8) -> bool {
        self.slots[id as usize].active
    }

    /// Handle one `IN_CONF_ASYNC_TO_CHIPx` sub-command.
    pub fn configure<B: Board>(
        &mut self,
        id: u8,
        sub: u8,
        data: u8,
        ex: &mut Exchange,
        pins: &mut PinRegistry,
        board: &mut B,
    ) {
        let hw = board.clock().micros();
        let conf_header = IN_CONF_ASYNC_TO_CHIP0 + id;
        if self.slots[id as usize].active {
            ex.error(OUT_ERROR_INTERFACE_ALREADY_ACTIVE, conf_header, sub as u32);
            return;
        }
        if sub == CONF_ACTIVE {
            if self.activate(id, ex, pins, board) {
                ex.send_config(conf_header, CONF_ACTIVE, 1, hw);
            }
            return;
        }
        stage_field(&mut self.slots[id as usize], conf_header, id, sub, data, ex, hw);
    }

    fn activate<B: Board>(
        &mut self,
        id: u8,
        ex: &mut Exchange,
        pins: &mut PinRegistry,
        board: &mut B,
    ) -> bool {
        let conf_header = IN_CONF_ASYNC_TO_CHIP0 + id;
        let slot = self.slots[id as usize];
        if !pins.reserve_input(slot.ack_pin, conf_header, ex) {
            return false;
        }
        board.gpio().pin_mode(slot.ack_pin, PinMode::Input);
        if !pins.reserve_output(slot.req_pin, conf_header, ex) {
            return false;
        }
        board.gpio().pin_mode(slot.req_pin, PinMode::Output);
        for i in 0..slot.width as usize {
            if !pins.reserve_output(slot.data_pins[i], conf_header, ex) {
                return false;
            }
            board.gpio().pin_mode(slot.data_pins[i], PinMode::Output);
        }
        // Idle: request deasserted.
        board.gpio().write(slot.req_pin, slot.hs_active_low);
        self.slots[id as usize].active = true;
        debug!("async to-chip {} active, width {}", id, slot.width);
        true
    }

    /// Execute one `IN_ASYNC_TO_CHIPx` send. The echo confirmation is only
    /// queued when the chip acknowledged in time.
    pub fn send<B: Board>(&mut self, id: u8, value: u32, ex: &mut Exchange, board: &mut B) {
        let in_header = IN_ASYNC_TO_CHIP0 + id;
        let slot = self.slots[id as usize];
        if !slot.active {
            ex.error(OUT_ERROR_INTERFACE_NOT_ACTIVE, in_header, value);
            return;
        }
        let hw = board.clock().micros();
        if self.handshake(&slot, in_header, value, ex, board) {
            ex.send_data32(in_header, value, hw, true);
        }
    }

    fn handshake<B: Board>(
        &self,
        slot: &AerSlot,
        in_header: u8,
        value: u32,
        ex: &mut Exchange,
        board: &mut B,
    ) -> bool {
        for i in 0..slot.width as usize {
            let bit = value >> i & 1 != 0;
            board.gpio().write(slot.data_pins[i], bit ^ slot.data_active_low);
        }
        if slot.req_delay > 0 {
            board.clock().delay_20ns(slot.req_delay);
        }
        board.gpio().write(slot.req_pin, !slot.hs_active_low);
        let timeout_us = AER_HANDSHAKE_TIMEOUT_MS * 1000;
        let start = board.clock().micros();
        let mut acknowledged = true;
        loop {
            if board.gpio().read(slot.ack_pin) ^ slot.hs_active_low {
                break;
            }
            if board.clock().micros().wrapping_sub(start) > timeout_us {
                ex.error(OUT_ERROR_ASYNC_HS_TIMEOUT, in_header, timeout_us);
                acknowledged = false;
                break;
            }
        }
        if slot.req_delay > 0 {
            board.clock().delay_20ns(slot.req_delay);
        }
        board.gpio().write(slot.req_pin, slot.hs_active_low);
        acknowledged
    }
}

impl Default for AerToChip {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards;
    use crate::packet::Packet;
    use crate::simboard::SimBoard;

    fn setup() -> (AerToChip, Exchange, PinRegistry, SimBoard) {
        let board = SimBoard::new(&boards::TEENSY41);
        (
            AerToChip::new(),
            Exchange::new(&boards::TEENSY41),
            PinRegistry::new(boards::TEENSY41.digital_pins),
            board,
        )
    }

    /// Bring up slot 0: req=2, ack=3, data pins 30..30+width.
    fn bring_up(
        aer: &mut AerToChip,
        width: u8,
        ex: &mut Exchange,
        pins: &mut PinRegistry,
        board: &mut SimBoard,
    ) {
        aer.configure(0, CONF_REQ, 2, ex, pins, board);
        aer.configure(0, CONF_ACK, 3, ex, pins, board);
        aer.configure(0, CONF_WIDTH, width, ex, pins, board);
        for ch in 0..width {
            aer.configure(0, ch, 30 + ch, ex, pins, board);
        }
        aer.configure(0, CONF_ACTIVE, 0, ex, pins, board);
        assert!(aer.is_active(0));
        while ex.outbound.pop().is_some() {}
    }

    #[test]
    fn test_send_drives_data_and_completes_handshake() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        bring_up(&mut aer, 6, &mut ex, &mut pins, &mut board);
        // Chip side: acknowledge follows the request line.
        board.follow(2, 3);
        aer.send(0, 0x2A, &mut ex, &mut board);
        // 0x2A = 0b101010 across data pins 30..36.
        for (i, expected) in [false, true, false, true, false, true].iter().enumerate() {
            assert_eq!(board.level(30 + i as u8), *expected, "data bit {}", i);
        }
        // Request deasserted after the handshake.
        assert!(!board.level(2));
        match ex.outbound.pop().unwrap() {
            Packet::Data(d) => {
                assert_eq!(d.header, IN_ASYNC_TO_CHIP0);
                assert_eq!(d.value, 0x2A);
            }
            other => panic!("expected echo confirmation, got {:?}", other),
        }
        assert!(ex.outbound.is_empty());
    }

    #[test]
    fn test_send_on_inactive_slot() {
        let (mut aer, mut ex, _pins, mut board) = setup();
        aer.send(3, 99, &mut ex, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => {
                assert_eq!(e.header, OUT_ERROR_INTERFACE_NOT_ACTIVE);
                assert_eq!(e.org_header, IN_ASYNC_TO_CHIP3);
                assert_eq!(e.value, 99);
            }
            other => panic!("expected error packet, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_timeout() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        bring_up(&mut aer, 2, &mut ex, &mut pins, &mut board);
        // No acknowledge responder; the clock must advance for the poll loop
        // to reach the timeout.
        board.set_clock_step(50);
        aer.send(0, 1, &mut ex, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => {
                assert_eq!(e.header, OUT_ERROR_ASYNC_HS_TIMEOUT);
                assert_eq!(e.org_header, IN_ASYNC_TO_CHIP0);
                assert_eq!(e.value, 10_000);
            }
            other => panic!("expected timeout error, got {:?}", other),
        }
        // No echo after a failed handshake, request released.
        assert!(ex.outbound.is_empty());
        assert!(!board.level(2));
    }

    #[test]
    fn test_data_pin_conflict_leaves_slot_inactive() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        // Pin 31 already belongs to someone else.
        assert!(pins.reserve_input(31, IN_CONF_PIN, &mut ex));
        aer.configure(0, CONF_REQ, 2, &mut ex, &mut pins, &mut board);
        aer.configure(0, CONF_ACK, 3, &mut ex, &mut pins, &mut board);
        aer.configure(0, CONF_WIDTH, 2, &mut ex, &mut pins, &mut board);
        aer.configure(0, 0, 30, &mut ex, &mut pins, &mut board);
        aer.configure(0, 1, 31, &mut ex, &mut pins, &mut board);
        while ex.outbound.pop().is_some() {}
        aer.configure(0, CONF_ACTIVE, 0, &mut ex, &mut pins, &mut board);
        assert!(!aer.is_active(0));
        // The conflicting pin keeps its original reservation.
        assert!(pins.is_input(31));
        assert!(!pins.is_output(31));
        let mut saw_conflict = false;
        while let Some(p) = ex.outbound.pop() {
            if let Packet::Error(e) = p {
                assert_eq!(e.header, OUT_ERROR_PIN_ALREADY_INUSE);
                assert_eq!(e.value, 31);
                saw_conflict = true;
            }
        }
        assert!(saw_conflict);
    }

    #[test]
    fn test_repeated_staging_last_write_wins() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        for pin in [5, 6, 7] {
            aer.configure(0, CONF_REQ, pin, &mut ex, &mut pins, &mut board);
        }
        aer.configure(0, CONF_ACK, 3, &mut ex, &mut pins, &mut board);
        // Staging alone touches neither pin modes nor reservations.
        for pin in [5u8, 6, 7] {
            assert!(board.mode(pin).is_none());
            assert!(!pins.is_output(pin));
        }
        aer.configure(0, CONF_ACTIVE, 0, &mut ex, &mut pins, &mut board);
        assert!(aer.is_active(0));
        // Only the last staged request pin was taken.
        assert_eq!(board.mode(7), Some(PinMode::Output));
        assert!(pins.is_output(7));
        assert!(!pins.is_output(5));
        assert!(!pins.is_output(6));
    }

    #[test]
    fn test_width_clamped_to_32() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        aer.configure(0, CONF_WIDTH, 40, &mut ex, &mut pins, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => {
                assert_eq!(e.header, OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS);
                assert_eq!(e.value, 40);
            }
            other => panic!("expected error packet, got {:?}", other),
        }
        match ex.outbound.pop().unwrap() {
            Packet::Config(c) => {
                assert_eq!(c.config_header, CONF_WIDTH);
                assert_eq!(c.value, 32);
            }
            other => panic!("expected clamped echo, got {:?}", other),
        }
    }

    #[test]
    fn test_config_after_activation_rejected() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        bring_up(&mut aer, 1, &mut ex, &mut pins, &mut board);
        aer.configure(0, CONF_WIDTH, 4, &mut ex, &mut pins, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => assert_eq!(e.header, OUT_ERROR_INTERFACE_ALREADY_ACTIVE),
            other => panic!("expected error packet, got {:?}", other),
        }
    }
}
