//! SPI controller slots.
//!
//! One slot per hardware SPI controller of the board. The host stages word
//! width (1-4 bytes), byte order, speed class and mode, then activates the
//! slot, which reserves the fixed SCK/COPI pins as outputs and CIPO as
//! input. A write instruction clocks the word out full-duplex and reports
//! both an echo of the sent word and the word read back.

use log::debug;

use crate::hal::{Board, SpiSettings};
use crate::headers::*;
use crate::pins::PinRegistry;
use crate::ring_buffer::Exchange;

/// Speed classes 0-8 map to these clock rates.
const SPEED_CLASSES: [u32; 9] = [
    10_000, 50_000, 100_000, 500_000, 1_000_000, 2_000_000, 4_000_000, 8_000_000, 12_000_000,
];

const DEFAULT_SPEED_CLASS: u8 = 2;

#[derive(Clone, Copy)]
struct SpiSlot {
    active: bool,
    /// Word width in bytes, 1-4. 0 means unconfigured; defaulted to 1 at
    /// activation.
    width: u8,
    frequency_hz: u32,
    mode: u8,
    ms_first: bool,
}

impl Default for SpiSlot {
    fn default() -> Self {
        SpiSlot {
            active: false,
            width: 0,
            frequency_hz: SPEED_CLASSES[DEFAULT_SPEED_CLASS as usize],
            mode: 0,
            ms_first: false,
        }
    }
}

pub struct SpiManager {
    slots: Vec<SpiSlot>,
}

impl SpiManager {
    pub fn new(bus_count: usize) -> Self {
        SpiManager {
            slots: vec![SpiSlot::default(); bus_count],
        }
    }

    pub fn is_active(&self, id: u8) -> bool {
        self.slots.get(id as usize).map(|s| s.active).unwrap_or(false)
    }

    /// Handle one `IN_CONF_SPIx` sub-command.
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
        let conf_header = IN_CONF_SPI0 + id;
        if id as usize >= self.slots.len() {
            ex.error_sub(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, conf_header, id as u32, sub);
            return;
        }
        if self.slots[id as usize].active {
            ex.error(OUT_ERROR_INTERFACE_ALREADY_ACTIVE, conf_header, sub as u32);
            return;
        }
        match sub {
            CONF_ACTIVE => self.activate(id, ex, pins, board),
            CONF_WIDTH => {
                if (1..=4).contains(&data) {
                    self.slots[id as usize].width = data;
                    ex.send_config(conf_header, sub, data, hw);
                } else {
                    ex.error_sub(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, conf_header, data as u32, sub);
                }
            }
            CONF_BYTE_ORDER => {
                let ms_first = data > 0;
                self.slots[id as usize].ms_first = ms_first;
                ex.send_config(conf_header, sub, ms_first as u8, hw);
            }
            CONF_SPEED_CLASS => {
                let class = if (data as usize) < SPEED_CLASSES.len() {
                    data
                } else {
                    DEFAULT_SPEED_CLASS
                };
                self.slots[id as usize].frequency_hz = SPEED_CLASSES[class as usize];
                ex.send_config(conf_header, sub, class, hw);
            }
            CONF_TYPE => {
                let mode = if data <= 3 { data } else { 0 };
                self.slots[id as usize].mode = mode;
                ex.send_config(conf_header, sub, mode, hw);
            }
            _ => ex.error_sub(OUT_ERROR_UNKNOWN_CONFIGURATION, conf_header, data as u32, sub),
        }
    }

    fn activate<B: Board>(
        &mut self,
        id: u8,
        ex: &mut Exchange,
        pins: &mut PinRegistry,
        board: &mut B,
    ) {
        let hw = board.clock().micros();
        let conf_header = IN_CONF_SPI0 + id;
        if self.slots[id as usize].width == 0 {
            self.slots[id as usize].width = 1;
            ex.send_config(conf_header, CONF_WIDTH, 1, hw);
        }
        let bus = board.profile().spi_buses[id as usize];
        if !pins.reserve_output(bus.sck, conf_header, ex)
            || !pins.reserve_output(bus.copi, conf_header, ex)
            || !pins.reserve_input(bus.cipo, conf_header, ex)
        {
            return;
        }
        match board.spi(id as usize) {
            Some(controller) => controller.begin(),
            None => {
                ex.error(OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY, conf_header, id as u32);
                return;
            }
        }
        self.slots[id as usize].active = true;
        debug!("spi{} active at {} Hz", id, self.slots[id as usize].frequency_hz);
        ex.send_config(conf_header, CONF_ACTIVE, 1, hw);
    }

    /// Execute one `IN_SPIx` write: clock the word out and report the echo
    /// plus the word read back.
    pub fn send_word<B: Board>(&mut self, id: u8, data: u32, ex: &mut Exchange, board: &mut B) {
        let hw = board.clock().micros();
        let in_header = IN_SPI0 + id;
        if id as usize >= self.slots.len() {
            ex.error_sub(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, in_header, id as u32, CONF_ACTIVE);
            return;
        }
        let slot = self.slots[id as usize];
        if !slot.active {
            ex.error(OUT_ERROR_INTERFACE_NOT_ACTIVE, in_header, id as u32);
            return;
        }
        let width = slot.width as usize;
        if width < 4 && data >= 1u32 << (8 * width) {
            ex.error_sub(OUT_ERROR_DATA_OUT_OF_BOUNDS, in_header, data, CONF_WIDTH);
            return;
        }
        let settings = SpiSettings {
            frequency_hz: slot.frequency_hz,
            mode: slot.mode,
            ms_first: slot.ms_first,
        };
        let mut bytes = data.to_le_bytes();
        match board.spi(id as usize) {
            Some(controller) => controller.transfer(&settings, &mut bytes[..width]),
            None => {
                ex.error(OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY, in_header, id as u32);
                return;
            }
        }
        let mut padded = [0u8; 4];
        padded[..width].copy_from_slice(&bytes[..width]);
        let readback = u32::from_le_bytes(padded);
        ex.send_data32(in_header, data, hw, true);
        ex.send_data32(OUT_SPI0 + id, readback, hw, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards;
    use crate::packet::Packet;
    use crate::simboard::SimBoard;

    fn setup() -> (SpiManager, Exchange, PinRegistry, SimBoard) {
        let board = SimBoard::new(&boards::TEENSY41);
        (
            SpiManager::new(3),
            Exchange::new(&boards::TEENSY41),
            PinRegistry::new(boards::TEENSY41.digital_pins),
            board,
        )
    }

    #[test]
    fn test_staged_config_then_activate() {
        let (mut spi, mut ex, mut pins, mut board) = setup();
        spi.configure(0, CONF_WIDTH, 2, &mut ex, &mut pins, &mut board);
        spi.configure(0, CONF_SPEED_CLASS, 4, &mut ex, &mut pins, &mut board);
        spi.configure(0, CONF_ACTIVE, 0, &mut ex, &mut pins, &mut board);
        assert!(spi.is_active(0));
        assert!(board.spi_begun(0));
        // SCK/COPI reserved as outputs, CIPO as input.
        assert!(pins.is_output(13));
        assert!(pins.is_output(11));
        assert!(pins.is_input(12));
        // Three confirmations, no errors.
        for _ in 0..3 {
            match ex.outbound.pop().unwrap() {
                Packet::Config(c) => assert_eq!(c.header, IN_CONF_SPI0),
                other => panic!("expected config echo, got {:?}", other),
            }
        }
        assert!(ex.outbound.is_empty());
    }

    #[test]
    fn test_config_after_activation_rejected() {
        let (mut spi, mut ex, mut pins, mut board) = setup();
        spi.configure(1, CONF_ACTIVE, 0, &mut ex, &mut pins, &mut board);
        assert!(spi.is_active(1));
        while ex.outbound.pop().is_some() {}
        spi.configure(1, CONF_WIDTH, 2, &mut ex, &mut pins, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => {
                assert_eq!(e.header, OUT_ERROR_INTERFACE_ALREADY_ACTIVE);
                assert_eq!(e.org_header, IN_CONF_SPI1);
            }
            other => panic!("expected error packet, got {:?}", other),
        }
    }

    #[test]
    fn test_reservation_conflict_leaves_slot_inactive() {
        let (mut spi, mut ex, mut pins, mut board) = setup();
        // Steal bus 0's SCK pin first.
        assert!(pins.reserve_output(13, IN_CONF_PIN, &mut ex));
        spi.configure(0, CONF_ACTIVE, 0, &mut ex, &mut pins, &mut board);
        assert!(!spi.is_active(0));
        let mut saw_conflict = false;
        while let Some(p) = ex.outbound.pop() {
            if let Packet::Error(e) = p {
                assert_eq!(e.header, OUT_ERROR_PIN_ALREADY_INUSE);
                assert_eq!(e.value, 13);
                saw_conflict = true;
            }
        }
        assert!(saw_conflict);
    }

    #[test]
    fn test_send_word_echo_and_readback() {
        let (mut spi, mut ex, mut pins, mut board) = setup();
        spi.configure(0, CONF_WIDTH, 2, &mut ex, &mut pins, &mut board);
        spi.configure(0, CONF_ACTIVE, 0, &mut ex, &mut pins, &mut board);
        while ex.outbound.pop().is_some() {}
        board.spi_queue_response(0, &[0xAA, 0x55]);
        // Clock stopped: the echo confirmation passes, the readback event is
        // gated away.
        spi.send_word(0, 0x1234, &mut ex, &mut board);
        assert_eq!(board.spi_sent(0), vec![vec![0x34, 0x12]]);
        match ex.outbound.pop().unwrap() {
            Packet::Data(d) => {
                assert_eq!(d.header, IN_SPI0);
                assert_eq!(d.value, 0x1234);
            }
            other => panic!("expected data echo, got {:?}", other),
        }
        assert!(ex.outbound.is_empty());
        // Clock running: the readback is recorded too.
        ex.set_offset(1);
        board.spi_queue_response(0, &[0xAA, 0x55]);
        spi.send_word(0, 0x1234, &mut ex, &mut board);
        ex.outbound.pop();
        match ex.outbound.pop().unwrap() {
            Packet::Data(d) => {
                assert_eq!(d.header, OUT_SPI0);
                assert_eq!(d.value, 0x55AA);
            }
            other => panic!("expected readback, got {:?}", other),
        }
    }

    #[test]
    fn test_send_word_width_violation() {
        let (mut spi, mut ex, mut pins, mut board) = setup();
        spi.configure(0, CONF_ACTIVE, 0, &mut ex, &mut pins, &mut board);
        while ex.outbound.pop().is_some() {}
        // Width defaulted to 1 byte at activation.
        spi.send_word(0, 0x100, &mut ex, &mut board);
        assert!(board.spi_sent(0).is_empty());
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => {
                assert_eq!(e.header, OUT_ERROR_DATA_OUT_OF_BOUNDS);
                assert_eq!(e.org_header, IN_SPI0);
                assert_eq!(e.value, 0x100);
                assert_eq!(e.sub_header, CONF_WIDTH);
            }
            other => panic!("expected error packet, got {:?}", other),
        }
    }

    #[test]
    fn test_send_word_inactive() {
        let (mut spi, mut ex, _pins, mut board) = setup();
        spi.send_word(2, 7, &mut ex, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => {
                assert_eq!(e.header, OUT_ERROR_INTERFACE_NOT_ACTIVE);
                assert_eq!(e.org_header, IN_SPI2);
            }
            other => panic!("expected error packet, got {:?}", other),
        }
    }
}
