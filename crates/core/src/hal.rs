//! Hardware abstraction seams.
//!
//! The core never touches registers; everything platform-specific sits
//! behind these traits. A real port implements them over the vendor HAL,
//! tests and the simulator use [`SimBoard`](crate::simboard::SimBoard).

use crate::boards::BoardProfile;
use crate::PACKET_SIZE;

/// Direction of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// A bus transaction could not be carried out; the code is the raw status
/// the platform driver returned (reported to the host verbatim).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralError {
    pub code: u8,
}

/// Digital pin block.
pub trait Gpio {
    fn pin_mode(&mut self, pin: u8, mode: PinMode);
    fn write(&mut self, pin: u8, level: bool);
    fn read(&self, pin: u8) -> bool;
}

/// Free-running microsecond counter plus the sub-microsecond settle delay
/// used on async request/data lines.
pub trait Clock {
    /// Microseconds since boot; wraps around.
    fn micros(&self) -> u32;
    /// Busy-wait for `units` multiples of 20 ns.
    fn delay_20ns(&self, units: u8);
}

/// Per-transfer SPI settings, applied transaction-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    pub frequency_hz: u32,
    /// Clock polarity/phase, modes 0–3.
    pub mode: u8,
    /// Most-significant bit first when set.
    pub ms_first: bool,
}

/// One SPI controller.
pub trait SpiBus {
    fn begin(&mut self);
    /// Full-duplex transfer: `bytes` is sent and overwritten with the
    /// response, first byte first.
    fn transfer(&mut self, settings: &SpiSettings, bytes: &mut [u8]);
}

/// One I2C controller.
pub trait I2cBus {
    fn begin(&mut self, frequency_hz: u32);
    /// Address the device and write `bytes` in one transaction.
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), PeripheralError>;
    /// Write the register address, repeated-start, then read `buf.len()`
    /// bytes back.
    fn read_register(&mut self, address: u8, register: u8, buf: &mut [u8])
        -> Result<(), PeripheralError>;
}

/// Host-facing byte transport.
pub trait SerialLink {
    fn write_byte(&mut self, byte: u8);
    fn write_packet(&mut self, raw: &[u8; PACKET_SIZE]) {
        for &b in raw {
            self.write_byte(b);
        }
    }
    /// Next pending inbound byte, if any.
    fn read_byte(&mut self) -> Option<u8>;
}

/// One concrete microcontroller board: a profile (pin counts, buffer sizes,
/// fixed bus pins) plus accessors for its peripheral blocks. Bus indices
/// beyond what the board carries return `None`.
pub trait Board {
    fn profile(&self) -> &'static BoardProfile;
    fn gpio(&mut self) -> &mut dyn Gpio;
    fn clock(&self) -> &dyn Clock;
    fn spi(&mut self, bus: usize) -> Option<&mut dyn SpiBus>;
    fn i2c(&mut self, bus: usize) -> Option<&mut dyn I2cBus>;
    fn serial(&mut self) -> &mut dyn SerialLink;
}
