//! I2C controller slots.
//!
//! One slot per hardware I2C controller. The data instruction carries the
//! 8-bit device address with the read flag in its LSB: flag clear writes
//! `[register, value...]` in one transaction, flag set performs a
//! register-pointer write followed by a repeated-start read of `value_ls`
//! words. Word width is 1 or 2 bytes; with 2-byte words the byte-order flag
//! decides whether the most significant byte travels first.

use log::debug;

use crate::hal::Board;
use crate::headers::*;
use crate::pins::PinRegistry;
use crate::ring_buffer::Exchange;

/// Speed classes 0-4 map to these clock rates.
const SPEED_CLASSES: [u32; 5] = [100_000, 400_000, 1_000_000, 3_400_000, 10_000];

/// Largest read burst the transaction buffer holds, in words.
const MAX_READ_WORDS: u8 = 32;

#[derive(Clone, Copy)]
struct I2cSlot {
    active: bool,
    /// Word width in bytes, 1 or 2.
    width: u8,
    frequency_hz: u32,
    ms_first: bool,
}

impl Default for I2cSlot {
    fn default() -> Self {
        I2cSlot {
            active: false,
            width: 1,
            frequency_hz: 0,
            ms_first: false,
        }
    }
}

pub struct I2cManager {
    slots: Vec<I2cSlot>,
}

impl I2cManager {
    pub fn new(bus_count: usize) -> Self {
        I2cManager {
            slots: vec![I2cSlot::default(); bus_count],
        }
    }

    pub fn is_active(&self, id: u8) -> bool {
        self.slots.get(id as usize).map(|s| s.active).unwrap_or(false)
    }

    /// Handle one `IN_CONF_I2Cx` sub-command.
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
        let conf_header = IN_CONF_I2C0 + id;
        if id as usize >= self.slots.len() {
            ex.error_sub(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, conf_header, id as u32, sub);
            return;
        }
        match sub {
            CONF_ACTIVE => self.activate(id, ex, pins, board),
            CONF_WIDTH => {
                if (1..=2).contains(&data) {
                    self.slots[id as usize].width = data;
                    ex.send_config(conf_header, sub, data, hw);
                } else {
                    ex.error_sub(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, conf_header, data as u32, sub);
                    self.slots[id as usize].width = 1;
                    ex.send_config(conf_header, sub, 1, hw);
                }
            }
            CONF_BYTE_ORDER => {
                let ms_first = data > 0;
                self.slots[id as usize].ms_first = ms_first;
                ex.send_config(conf_header, sub, ms_first as u8, hw);
            }
            CONF_SPEED_CLASS => {
                let class = if (data as usize) < SPEED_CLASSES.len() { data } else { 0 };
                self.slots[id as usize].frequency_hz = SPEED_CLASSES[class as usize];
                ex.send_config(conf_header, sub, class, hw);
            }
            _ => ex.error_sub(OUT_ERROR_UNKNOWN_CONFIGURATION, conf_header, id as u32, sub),
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
        let conf_header = IN_CONF_I2C0 + id;
        if self.slots[id as usize].frequency_hz == 0 {
            self.slots[id as usize].frequency_hz = SPEED_CLASSES[0];
        }
        let bus = board.profile().i2c_buses[id as usize];
        if !pins.reserve_output(bus.scl, conf_header, ex)
            || !pins.reserve_input(bus.sda, conf_header, ex)
        {
            return;
        }
        let frequency = self.slots[id as usize].frequency_hz;
        match board.i2c(id as usize) {
            Some(controller) => controller.begin(frequency),
            None => {
                ex.error(OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY, conf_header, id as u32);
                return;
            }
        }
        self.slots[id as usize].active = true;
        debug!("i2c{} active at {} Hz", id, frequency);
        ex.send_config(conf_header, CONF_ACTIVE, 1, hw);
    }

    /// Execute one `IN_I2Cx` transaction.
    pub fn process<B: Board>(
        &mut self,
        id: u8,
        device_address: u8,
        register: u8,
        value_ms: u8,
        value_ls: u8,
        ex: &mut Exchange,
        board: &mut B,
    ) {
        let in_header = IN_I2C0 + id;
        if id as usize >= self.slots.len() {
            ex.error_sub(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, in_header, id as u32, CONF_ACTIVE);
            return;
        }
        let slot = self.slots[id as usize];
        if !slot.active {
            ex.error(OUT_ERROR_INTERFACE_NOT_ACTIVE, in_header, id as u32);
            return;
        }
        let address = device_address >> 1;
        if device_address & 1 != 0 {
            self.read(id, &slot, address, register, value_ls, ex, board);
        } else {
            self.write(id, &slot, address, register, value_ms, value_ls, ex, board);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write<B: Board>(
        &mut self,
        id: u8,
        slot: &I2cSlot,
        address: u8,
        register: u8,
        value_ms: u8,
        value_ls: u8,
        ex: &mut Exchange,
        board: &mut B,
    ) {
        let hw = board.clock().micros();
        let in_header = IN_I2C0 + id;
        let mut bytes = [register, 0, 0];
        let len = if slot.width == 2 {
            if slot.ms_first {
                bytes[1] = value_ms;
                bytes[2] = value_ls;
            } else {
                bytes[1] = value_ls;
                bytes[2] = value_ms;
            }
            3
        } else {
            bytes[1] = value_ls;
            2
        };
        let result = match board.i2c(id as usize) {
            Some(controller) => controller.write(address, &bytes[..len]),
            None => {
                ex.error(OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY, in_header, id as u32);
                return;
            }
        };
        if let Err(e) = result {
            ex.error(OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY, in_header, e.code as u32);
            return;
        }
        ex.send_i2c(in_header, address << 1, register, value_ms, value_ls, hw, true);
    }

    /// Read `count` words starting at `register` and report each as one
    /// `OUT_I2Cx` packet.
    #[allow(clippy::too_many_arguments)]
    fn read<B: Board>(
        &mut self,
        id: u8,
        slot: &I2cSlot,
        address: u8,
        register: u8,
        count: u8,
        ex: &mut Exchange,
        board: &mut B,
    ) {
        let hw = board.clock().micros();
        let in_header = IN_I2C0 + id;
        if count > MAX_READ_WORDS {
            ex.error_sub(OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS, in_header, count as u32, CONF_INPUT);
            return;
        }
        let width = slot.width.max(1) as usize;
        let mut buf = vec![0u8; count as usize * width];
        let result = match board.i2c(id as usize) {
            Some(controller) => controller.read_register(address, register, &mut buf),
            None => {
                ex.error(OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY, in_header, id as u32);
                return;
            }
        };
        if let Err(e) = result {
            ex.error(OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY, in_header, e.code as u32);
            return;
        }
        for word in buf.chunks_exact(width) {
            let (ms, ls) = if width == 2 {
                if slot.ms_first {
                    (word[0], word[1])
                } else {
                    (word[1], word[0])
                }
            } else {
                (0, word[0])
            };
            ex.send_i2c(OUT_I2C0 + id, (address << 1) | 1, register, ms, ls, hw, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards;
    use crate::packet::Packet;
    use crate::simboard::SimBoard;

    fn setup() -> (I2cManager, Exchange, PinRegistry, SimBoard) {
        let board = SimBoard::new(&boards::TEENSY41);
        (
            I2cManager::new(3),
            Exchange::new(&boards::TEENSY41),
            PinRegistry::new(boards::TEENSY41.digital_pins),
            board,
        )
    }

    fn activate(
        i2c: &mut I2cManager,
        id: u8,
        ex: &mut Exchange,
        pins: &mut PinRegistry,
        board: &mut SimBoard,
    ) {
        i2c.configure(id, CONF_ACTIVE, 0, ex, pins, board);
        assert!(i2c.is_active(id));
        while ex.outbound.pop().is_some() {}
    }

    #[test]
    fn test_activation_defaults_to_100khz() {
        let (mut i2c, mut ex, mut pins, mut board) = setup();
        i2c.configure(0, CONF_ACTIVE, 0, &mut ex, &mut pins, &mut board);
        assert_eq!(board.i2c_frequency(0), Some(100_000));
        assert!(pins.is_output(19));
        assert!(pins.is_input(18));
    }

    #[test]
    fn test_write_ms_first_wire_order() {
        let (mut i2c, mut ex, mut pins, mut board) = setup();
        i2c.configure(0, CONF_WIDTH, 2, &mut ex, &mut pins, &mut board);
        i2c.configure(0, CONF_BYTE_ORDER, 1, &mut ex, &mut pins, &mut board);
        activate(&mut i2c, 0, &mut ex, &mut pins, &mut board);
        // Device 0x50, write, register 0x10, value 0x0201.
        i2c.process(0, 0x50 << 1, 0x10, 0x02, 0x01, &mut ex, &mut board);
        assert_eq!(board.i2c_written(0), vec![(0x50, vec![0x10, 0x02, 0x01])]);
        match ex.outbound.pop().unwrap() {
            Packet::I2c(p) => {
                assert_eq!(p.header, IN_I2C0);
                assert_eq!(p.device_address, 0x50 << 1);
                assert_eq!(p.value_ms, 0x02);
                assert_eq!(p.value_ls, 0x01);
            }
            other => panic!("expected i2c echo, got {:?}", other),
        }
    }

    #[test]
    fn test_read_reports_each_word() {
        let (mut i2c, mut ex, mut pins, mut board) = setup();
        activate(&mut i2c, 1, &mut ex, &mut pins, &mut board);
        board.i2c_set_register(1, 0x48, 0x04, &[0xAB, 0xCD]);
        // Read flag set, 2 single-byte words.
        i2c.process(1, (0x48 << 1) | 1, 0x04, 0, 2, &mut ex, &mut board);
        for expected in [0xAB, 0xCD] {
            match ex.outbound.pop().unwrap() {
                Packet::I2c(p) => {
                    assert_eq!(p.header, OUT_I2C1);
                    assert_eq!(p.device_address, (0x48 << 1) | 1);
                    assert_eq!(p.value_ls, expected);
                }
                other => panic!("expected i2c data, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_read_burst_too_long() {
        let (mut i2c, mut ex, mut pins, mut board) = setup();
        activate(&mut i2c, 0, &mut ex, &mut pins, &mut board);
        i2c.process(0, 0x01, 0x00, 0, 33, &mut ex, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => {
                assert_eq!(e.header, OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS);
                assert_eq!(e.value, 33);
                assert_eq!(e.sub_header, CONF_INPUT);
            }
            other => panic!("expected error packet, got {:?}", other),
        }
    }

    #[test]
    fn test_width_clamp_reports_error_and_echoes_clamped() {
        let (mut i2c, mut ex, mut pins, mut board) = setup();
        i2c.configure(0, CONF_WIDTH, 3, &mut ex, &mut pins, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => assert_eq!(e.header, OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS),
            other => panic!("expected error packet, got {:?}", other),
        }
        match ex.outbound.pop().unwrap() {
            Packet::Config(c) => {
                assert_eq!(c.config_header, CONF_WIDTH);
                assert_eq!(c.value, 1);
            }
            other => panic!("expected clamped echo, got {:?}", other),
        }
    }

    #[test]
    fn test_bus_fault_reported_with_driver_code() {
        let (mut i2c, mut ex, mut pins, mut board) = setup();
        activate(&mut i2c, 0, &mut ex, &mut pins, &mut board);
        board.i2c_fail_next(0, 3);
        i2c.process(0, 0x50 << 1, 0x10, 0, 0x7F, &mut ex, &mut board);
        match ex.outbound.pop().unwrap() {
            Packet::Error(e) => {
                assert_eq!(e.header, OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY);
                assert_eq!(e.value, 3);
            }
            other => panic!("expected error packet, got {:?}", other),
        }
        assert!(ex.outbound.is_empty());
    }
}
