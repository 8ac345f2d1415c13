//! Software board: every HAL seam backed by plain data structures.
//!
//! Used by the unit tests and by the host-side simulator front end. The
//! clock is under test control: it stands still by default and can be
//! advanced explicitly, or given a per-read step so busy-wait loops in the
//! code under test make progress toward their timeouts.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};

use crate::boards::BoardProfile;
use crate::hal::{Board, Clock, Gpio, I2cBus, PeripheralError, PinMode, SerialLink, SpiBus, SpiSettings};

#[derive(Default)]
pub struct SimGpio {
    modes: Vec<Option<PinMode>>,
    levels: Vec<bool>,
    /// Level copies: writing the first pin drives the second.
    wires: Vec<(u8, u8)>,
    /// Pins whose level changed under external drive, oldest first.
    changed: VecDeque<u8>,
}

impl SimGpio {
    fn new(digital_pins: u8) -> Self {
        SimGpio {
            modes: vec![None; digital_pins as usize],
            levels: vec![false; digital_pins as usize],
            wires: Vec::new(),
            changed: VecDeque::new(),
        }
    }

    fn set_external(&mut self, pin: u8, level: bool) {
        if self.levels[pin as usize] != level {
            self.levels[pin as usize] = level;
            self.changed.push_back(pin);
        }
    }
}

impl Gpio for SimGpio {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) {
        self.modes[pin as usize] = Some(mode);
    }

    fn write(&mut self, pin: u8, level: bool) {
        self.levels[pin as usize] = level;
        for i in 0..self.wires.len() {
            let (from, to) = self.wires[i];
            if from == pin {
                self.set_external(to, level);
            }
        }
    }

    fn read(&self, pin: u8) -> bool {
        self.levels[pin as usize]
    }
}

/// Manually advanced microsecond clock. A nonzero step makes every read
/// advance time, so polling loops eventually hit their timeouts.
#[derive(Default)]
pub struct SimClock {
    now: Cell<u32>,
    step: Cell<u32>,
}

impl Clock for SimClock {
    fn micros(&self) -> u32 {
        let t = self.now.get();
        self.now.set(t.wrapping_add(self.step.get()));
        t
    }

    fn delay_20ns(&self, _units: u8) {}
}

#[derive(Default)]
pub struct SimSpiBus {
    begun: bool,
    sent: Vec<Vec<u8>>,
    responses: VecDeque<u8>,
    pub last_settings: Option<SpiSettings>,
}

impl SpiBus for SimSpiBus {
    fn begin(&mut self) {
        self.begun = true;
    }

    fn transfer(&mut self, settings: &SpiSettings, bytes: &mut [u8]) {
        self.last_settings = Some(*settings);
        self.sent.push(bytes.to_vec());
        for b in bytes {
            *b = self.responses.pop_front().unwrap_or(0);
        }
    }
}

#[derive(Default)]
pub struct SimI2cBus {
    frequency_hz: Option<u32>,
    written: Vec<(u8, Vec<u8>)>,
    registers: HashMap<(u8, u8), Vec<u8>>,
    fail_next: Option<u8>,
}

impl I2cBus for SimI2cBus {
    fn begin(&mut self, frequency_hz: u32) {
        self.frequency_hz = Some(frequency_hz);
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), PeripheralError> {
        if let Some(code) = self.fail_next.take() {
            return Err(PeripheralError { code });
        }
        self.written.push((address, bytes.to_vec()));
        Ok(())
    }

    fn read_register(
        &mut self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), PeripheralError> {
        if let Some(code) = self.fail_next.take() {
            return Err(PeripheralError { code });
        }
        buf.fill(0);
        if let Some(stored) = self.registers.get(&(address, register)) {
            let n = stored.len().min(buf.len());
            buf[..n].copy_from_slice(&stored[..n]);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct SimSerial {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl SerialLink for SimSerial {
    fn write_byte(&mut self, byte: u8) {
        self.tx.push(byte);
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }
}

pub struct SimBoard {
    profile: &'static BoardProfile,
    gpio: SimGpio,
    clock: SimClock,
    spi: Vec<SimSpiBus>,
    i2c: Vec<SimI2cBus>,
    serial: SimSerial,
}

impl SimBoard {
    pub fn new(profile: &'static BoardProfile) -> Self {
        SimBoard {
            profile,
            gpio: SimGpio::new(profile.digital_pins),
            clock: SimClock::default(),
            spi: (0..profile.spi_buses.len()).map(|_| SimSpiBus::default()).collect(),
            i2c: (0..profile.i2c_buses.len()).map(|_| SimI2cBus::default()).collect(),
            serial: SimSerial::default(),
        }
    }

    // --- Wiring and chip-side stimulus ---

    /// Connect two pins: every write to `from` drives `to`.
    pub fn wire(&mut self, from: u8, to: u8) {
        self.gpio.wires.push((from, to));
    }

    /// Acknowledge responder: the `drive` pin mirrors every level written to
    /// `watch`, the way a cooperative chip answers a request line.
    pub fn follow(&mut self, watch: u8, drive: u8) {
        self.gpio.wires.push((watch, drive));
    }

    /// Externally drive a device input, as the chip under test would.
    pub fn drive_pin(&mut self, pin: u8, level: bool) {
        self.gpio.set_external(pin, level);
    }

    pub fn level(&self, pin: u8) -> bool {
        self.gpio.levels[pin as usize]
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        self.gpio.modes[pin as usize]
    }

    /// Pins whose level changed under external drive since the last call,
    /// ready to be pumped into `Device::pin_change`.
    pub fn take_changed(&mut self) -> Vec<u8> {
        self.gpio.changed.drain(..).collect()
    }

    // --- Clock control ---

    /// Current clock reading without the per-read step side effect.
    pub fn clock_now(&self) -> u32 {
        self.clock.now.get()
    }

    pub fn advance_micros(&mut self, us: u32) {
        self.clock.now.set(self.clock.now.get().wrapping_add(us));
    }

    /// Microseconds added on every clock read.
    pub fn set_clock_step(&mut self, us: u32) {
        self.clock.step.set(us);
    }

    // --- Serial helpers ---

    pub fn push_serial_rx(&mut self, bytes: &[u8]) {
        self.serial.rx.extend(bytes);
    }

    pub fn take_serial_tx(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.serial.tx)
    }

    // --- SPI / I2C inspection ---

    pub fn spi_begun(&self, bus: usize) -> bool {
        self.spi[bus].begun
    }

    pub fn spi_queue_response(&mut self, bus: usize, bytes: &[u8]) {
        self.spi[bus].responses.extend(bytes);
    }

    pub fn spi_sent(&self, bus: usize) -> Vec<Vec<u8>> {
        self.spi[bus].sent.clone()
    }

    pub fn i2c_frequency(&self, bus: usize) -> Option<u32> {
        self.i2c[bus].frequency_hz
    }

    pub fn i2c_written(&self, bus: usize) -> Vec<(u8, Vec<u8>)> {
        self.i2c[bus].written.clone()
    }

    pub fn i2c_set_register(&mut self, bus: usize, address: u8, register: u8, bytes: &[u8]) {
        self.i2c[bus].registers.insert((address, register), bytes.to_vec());
    }

    pub fn i2c_fail_next(&mut self, bus: usize, code: u8) {
        self.i2c[bus].fail_next = Some(code);
    }
}

impl Board for SimBoard {
    fn profile(&self) -> &'static BoardProfile {
        self.profile
    }

    fn gpio(&mut self) -> &mut dyn Gpio {
        &mut self.gpio
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }

    fn spi(&mut self, bus: usize) -> Option<&mut dyn SpiBus> {
        self.spi.get_mut(bus).map(|b| b as &mut dyn SpiBus)
    }

    fn i2c(&mut self, bus: usize) -> Option<&mut dyn I2cBus> {
        self.i2c.get_mut(bus).map(|b| b as &mut dyn I2cBus)
    }

    fn serial(&mut self) -> &mut dyn SerialLink {
        &mut self.serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards;

    #[test]
    fn test_wire_propagates_and_records_change() {
        let mut board = SimBoard::new(&boards::TEENSY41);
        board.wire(2, 3);
        board.gpio().write(2, true);
        assert!(board.level(3));
        assert_eq!(board.take_changed(), vec![3]);
        // Same level again: no new change event.
        board.gpio().write(2, true);
        assert!(board.take_changed().is_empty());
    }

    #[test]
    fn test_clock_step_advances_per_read() {
        let mut board = SimBoard::new(&boards::SAMD_ZERO);
        assert_eq!(board.clock().micros(), 0);
        board.set_clock_step(10);
        let t0 = board.clock().micros();
        let t1 = board.clock().micros();
        assert_eq!(t1, t0 + 10);
    }
}
