//! Exclusive pin reservation and the raw GPIO instruction ops.
//!
//! Every pin a component wants to drive or sample must be reserved first;
//! the registry is the single arbiter, so a pin claimed by an SPI bus can
//! never also be handed to an async interface or a raw GPIO instruction.
//! Reservations are only released by a full device reset.

use crate::headers::*;
use crate::ring_buffer::Exchange;

/// Per-pin reservation table. A pin is free, reserved as input, or reserved
/// as output; the two directions are mutually exclusive.
pub struct PinRegistry {
    input_active: Box<[bool]>,
    output_active: Box<[bool]>,
}

impl PinRegistry {
    pub fn new(digital_pins: u8) -> Self {
        PinRegistry {
            input_active: vec![false; digital_pins as usize].into_boxed_slice(),
            output_active: vec![false; digital_pins as usize].into_boxed_slice(),
        }
    }

    pub fn is_input(&self, pin: u8) -> bool {
        self.input_active.get(pin as usize).copied().unwrap_or(false)
    }

    pub fn is_output(&self, pin: u8) -> bool {
        self.output_active.get(pin as usize).copied().unwrap_or(false)
    }

    /// Claim a pin as input for the instruction `from_op`. On failure an
    /// error packet is queued and the registry is unchanged.
    pub fn reserve_input(&mut self, pin: u8, from_op: u8, ex: &mut Exchange) -> bool {
        self.reserve(pin, from_op, ex, false)
    }

    /// Claim a pin as output for the instruction `from_op`.
    pub fn reserve_output(&mut self, pin: u8, from_op: u8, ex: &mut Exchange) -> bool {
        self.reserve(pin, from_op, ex, true)
    }

    fn reserve(&mut self, pin: u8, from_op: u8, ex: &mut Exchange, output: bool) -> bool {
        let i = pin as usize;
        if i >= self.input_active.len() {
            ex.error(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, from_op, pin as u32);
            return false;
        }
        if self.input_active[i] || self.output_active[i] {
            ex.error(OUT_ERROR_PIN_ALREADY_INUSE, from_op, pin as u32);
            return false;
        }
        if output {
            self.output_active[i] = true;
        } else {
            self.input_active[i] = true;
        }
        true
    }
}
