//! Board profiles: per-board sizing and fixed bus pin assignments, as data.
//!
//! | Profile    | Pins | Buffers | SPI | I2C |
//! |------------|------|---------|-----|-----|
//! | Teensy 4.1 | 55   | 4096    | 3   | 3   |
//! | Teensy 4.0 | 40   | 4096    | 3   | 3   |
//! | MKR        | 22   | 512     | 1   | 1   |
//! | SAMD Zero  | 22   | 512     | 1   | 1   |

/// Fixed pins of one SPI controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiBusPins {
    pub sck: u8,
    pub copi: u8,
    pub cipo: u8,
}

/// Fixed pins of one I2C controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cBusPins {
    pub scl: u8,
    pub sda: u8,
}

/// Everything board-dependent the core needs, as plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardProfile {
    pub name: &'static str,
    pub input_buffer_size: usize,
    pub output_buffer_size: usize,
    /// Number of digital pins; valid pin ids are `0..digital_pins`.
    pub digital_pins: u8,
    pub spi_buses: &'static [SpiBusPins],
    pub i2c_buses: &'static [I2cBusPins],
}

pub static TEENSY41: BoardProfile = BoardProfile {
    name: "teensy41",
    input_buffer_size: 4096,
    output_buffer_size: 4096,
    digital_pins: 55,
    spi_buses: &[
        SpiBusPins { sck: 13, copi: 11, cipo: 12 },
        SpiBusPins { sck: 27, copi: 26, cipo: 1 },
        SpiBusPins { sck: 45, copi: 43, cipo: 42 },
    ],
    i2c_buses: &[
        I2cBusPins { scl: 19, sda: 18 },
        I2cBusPins { scl: 16, sda: 17 },
        I2cBusPins { scl: 24, sda: 25 },
    ],
};

pub static TEENSY40: BoardProfile = BoardProfile {
    name: "teensy40",
    input_buffer_size: 4096,
    output_buffer_size: 4096,
    digital_pins: 40,
    spi_buses: TEENSY41.spi_buses,
    i2c_buses: TEENSY41.i2c_buses,
};

pub static MKR: BoardProfile = BoardProfile {
    name: "mkr",
    input_buffer_size: 512,
    output_buffer_size: 512,
    digital_pins: 22,
    spi_buses: &[SpiBusPins { sck: 9, copi: 8, cipo: 10 }],
    i2c_buses: &[I2cBusPins { scl: 12, sda: 11 }],
};

pub static SAMD_ZERO: BoardProfile = BoardProfile {
    name: "samd_zero",
    input_buffer_size: 512,
    output_buffer_size: 512,
    digital_pins: 22,
    spi_buses: &[SpiBusPins { sck: 13, copi: 11, cipo: 12 }],
    i2c_buses: &[I2cBusPins { scl: 21, sda: 20 }],
};
