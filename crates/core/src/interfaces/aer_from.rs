//! Async (AER) from-chip interfaces.
//!
//! Mirror image of the to-chip direction: request and data are inputs, the
//! acknowledge is ours to drive. A change interrupt on the request pin
//! samples the data bus (while the clock runs) and answers with the
//! acknowledge; releasing the request releases the acknowledge, completing
//! the 4-phase cycle.

use log::debug;

use crate::hal::{Board, PinMode};
use crate::headers::*;
use crate::interfaces::aer_to::{stage_field, AerSlot};
use crate::interfaces::AER_SLOTS;
use crate::pins::PinRegistry;
use crate::ring_buffer::Exchange;

pub struct AerFromChip {
    slots: [AerSlot; AER_SLOTS],
}

impl AerFromChip {
    pub fn new() -> Self {
        AerFromChip {
            slots: [AerSlot::default(); AER_SLOTS],
        }
    }

    pub fn is_active(&self, id: u8) -> bool {
        self.slots[id as usize].active
    }

    /// Handle one `IN_CONF_ASYNC_FROM_CHIPx` sub-command. Returns the
    /// request pin when the slot just came up, so the caller can route that
    /// pin's change interrupt here.
    pub fn configure<B: Board>(
        &mut self,
        id: u8,
        sub: u8,
        data: u8,
        ex: &mut Exchange,
        pins: &mut PinRegistry,
        board: &mut B,
    ) -> Option<u8> {
        let hw = board.clock().micros();
        let conf_header = IN_CONF_ASYNC_FROM_CHIP0 + id;
        if self.slots[id as usize].active {
            ex.error(OUT_ERROR_INTERFACE_ALREADY_ACTIVE, conf_header, sub as u32);
            return None;
        }
        if sub == CONF_ACTIVE {
            if self.activate(id, ex, pins, board) {
                ex.send_config(conf_header, CONF_ACTIVE, 1, hw);
                return Some(self.slots[id as usize].req_pin);
            }
            return None;
        }
        stage_field(&mut self.slots[id as usize], conf_header, id, sub, data, ex, hw);
        None
    }

    fn activate<B: Board>(
        &mut self,
        id: u8,
        ex: &mut Exchange,
        pins: &mut PinRegistry,
        board: &mut B,
    ) -> bool {
        let conf_header = IN_CONF_ASYNC_FROM_CHIP0 + id;
        let slot = self.slots[id as usize];
        if !pins.reserve_input(slot.req_pin, conf_header, ex) {
            return false;
        }
        board.gpio().pin_mode(slot.req_pin, PinMode::Input);
        if !pins.reserve_output(slot.ack_pin, conf_header, ex) {
            return false;
        }
        board.gpio().pin_mode(slot.ack_pin, PinMode::Output);
        for i in 0..slot.width as usize {
            if !pins.reserve_input(slot.data_pins[i], conf_header, ex) {
                return false;
            }
            board.gpio().pin_mode(slot.data_pins[i], PinMode::Input);
        }
        // Idle: acknowledge deasserted.
        board.gpio().write(slot.ack_pin, slot.hs_active_low);
        self.slots[id as usize].active = true;
        debug!("async from-chip {} active, width {}", id, slot.width);
        true
    }

    /// Change-interrupt entry for the request pin of slot `id`. Request
    /// asserted: sample the bus (only recorded while the clock runs) and
    /// assert acknowledge; request released: release acknowledge.
    pub fn on_request_edge<B: Board>(&mut self, id: u8, ex: &mut Exchange, board: &mut B) {
        let slot = self.slots[id as usize];
        if !slot.active {
            return;
        }
        let asserted = board.gpio().read(slot.req_pin) ^ slot.hs_active_low;
        if asserted {
            if ex.recording() {
                let hw = board.clock().micros();
                let value = Self::sample(&slot, board);
                ex.send_data32(OUT_ASYNC_FROM_CHIP0 + id, value, hw, false);
            }
            board.gpio().write(slot.ack_pin, !slot.hs_active_low);
        } else {
            board.gpio().write(slot.ack_pin, slot.hs_active_low);
        }
    }

    fn sample<B: Board>(slot: &AerSlot, board: &mut B) -> u32 {
        if slot.req_delay > 0 {
            board.clock().delay_20ns(slot.req_delay);
        }
        let mut value = 0u32;
        for i in 0..slot.width as usize {
            if board.gpio().read(slot.data_pins[i]) ^ slot.data_active_low {
                value |= 1 << i;
            }
        }
        value
    }
}

impl Default for AerFromChip {
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

    fn setup() -> (AerFromChip, Exchange, PinRegistry, SimBoard) {
        let board = SimBoard::new(&boards::TEENSY41);
        (
            AerFromChip::new(),
            Exchange::new(&boards::TEENSY41),
            PinRegistry::new(boards::TEENSY41.digital_pins),
            board,
        )
    }

    /// Bring up slot 0: req=4, ack=5, data pins 20..20+width.
    fn bring_up(
        aer: &mut AerFromChip,
        width: u8,
        ex: &mut Exchange,
        pins: &mut PinRegistry,
        board: &mut SimBoard,
    ) -> Option<u8> {
        aer.configure(0, CONF_REQ, 4, ex, pins, board);
        aer.configure(0, CONF_ACK, 5, ex, pins, board);
        aer.configure(0, CONF_WIDTH, width, ex, pins, board);
        for ch in 0..width {
            aer.configure(0, ch, 20 + ch, ex, pins, board);
        }
        let req = aer.configure(0, CONF_ACTIVE, 0, ex, pins, board);
        while ex.outbound.pop().is_some() {}
        req
    }

    #[test]
    fn test_activation_reports_request_pin() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        let req = bring_up(&mut aer, 4, &mut ex, &mut pins, &mut board);
        assert_eq!(req, Some(4));
        assert!(aer.is_active(0));
        assert!(pins.is_input(4));
        assert!(pins.is_output(5));
        assert!(pins.is_input(20));
        assert_eq!(board.mode(4), Some(PinMode::Input));
        assert_eq!(board.mode(5), Some(PinMode::Output));
        assert_eq!(board.mode(20), Some(PinMode::Input));
    }

    #[test]
    fn test_event_captured_while_recording() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        bring_up(&mut aer, 4, &mut ex, &mut pins, &mut board);
        ex.set_offset(100);
        // Chip drives data 0b1010 then raises the request.
        board.drive_pin(21, true);
        board.drive_pin(23, true);
        board.drive_pin(4, true);
        aer.on_request_edge(0, &mut ex, &mut board);
        assert!(board.level(5), "acknowledge must be asserted");
        match ex.outbound.pop().unwrap() {
            Packet::Data(d) => {
                assert_eq!(d.header, OUT_ASYNC_FROM_CHIP0);
                assert_eq!(d.value, 0b1010);
            }
            other => panic!("expected event packet, got {:?}", other),
        }
        // Request released: acknowledge follows, no second event.
        board.drive_pin(4, false);
        aer.on_request_edge(0, &mut ex, &mut board);
        assert!(!board.level(5));
        assert!(ex.outbound.is_empty());
    }

    #[test]
    fn test_handshake_without_recording_drops_event() {
        let (mut aer, mut ex, mut pins, mut board) = setup();
        bring_up(&mut aer, 2, &mut ex, &mut pins, &mut board);
        board.drive_pin(20, true);
        board.drive_pin(4, true);
        aer.on_request_edge(0, &mut ex, &mut board);
        // Handshake still answered, event discarded (clock stopped).
        assert!(board.level(5));
        assert!(ex.outbound.is_empty());
    }
}
