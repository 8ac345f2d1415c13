//! Fixed-size wire packet and its byte-exact codec.
//!
//! Every packet occupies exactly [`PACKET_SIZE`] bytes on the wire and in the
//! ring buffers. The first byte is the header; it alone decides which of the
//! five layouts the remaining bytes follow. All multi-byte fields are
//! little-endian with no padding between fields; layouts shorter than the
//! wire size are zero-padded at the tail.
//!
//! | Layout  | Fields after the header                          |
//! |---------|--------------------------------------------------|
//! | Data    | exec_time:u32, value:u32                         |
//! | I2c     | exec_time:u32, dev:u8, reg:u8, ms:u8, ls:u8      |
//! | Config  | exec_time:u32, config_header:u8, value:u8        |
//! | Pin     | exec_time:u32, id:u8, value:u8                   |
//! | Error   | org_header:u8, value:u32, sub_header:u8          |
//!
//! The codec performs no header validation; rejecting unknown headers is the
//! dispatcher's job.

use serde::{Deserialize, Serialize};

use crate::headers::*;
use crate::PACKET_SIZE;

/// Generic 32-bit payload: AER words, SPI words, time values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    pub header: u8,
    pub exec_time: u32,
    pub value: u32,
}

/// I2C transaction: 8-bit device address (LSB = read flag), register, and a
/// value split into most/least significant bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct I2cPacket {
    pub header: u8,
    pub exec_time: u32,
    pub device_address: u8,
    pub register_address: u8,
    pub value_ms: u8,
    pub value_ls: u8,
}

/// Configuration sub-command under one of the `IN_CONF_*` main headers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPacket {
    pub header: u8,
    pub exec_time: u32,
    pub config_header: u8,
    pub value: u8,
}

/// Pin write/read instruction or pin level event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinPacket {
    pub header: u8,
    pub exec_time: u32,
    pub id: u8,
    pub value: u8,
}

/// Error or warning report. No exec_time field; `value` carries context
/// (often the offending id, or timing information by convention).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPacket {
    pub header: u8,
    pub org_header: u8,
    pub value: u32,
    pub sub_header: u8,
}

/// A wire packet: tagged union over the five layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Data(DataPacket),
    I2c(I2cPacket),
    Config(ConfigPacket),
    Pin(PinPacket),
    Error(ErrorPacket),
}

impl Default for Packet {
    fn default() -> Self {
        Packet::Data(DataPacket::default())
    }
}

/// Which layout a header byte selects.
fn is_pin_shaped(header: u8) -> bool {
    matches!(header, IN_PIN | IN_PIN_READ | OUT_PIN_LOW | OUT_PIN_HIGH)
}

fn is_i2c_shaped(header: u8) -> bool {
    matches!(header, IN_I2C0..=IN_I2C2 | OUT_I2C0..=OUT_I2C2)
}

fn is_config_shaped(header: u8) -> bool {
    matches!(
        header,
        IN_CONF_READ_ON_REQUEST
            | IN_CONF_PIN
            | IN_CONF_SPI0..=IN_CONF_SPI2
            | IN_CONF_I2C0..=IN_CONF_I2C2
            | IN_CONF_ASYNC_TO_CHIP0..=IN_CONF_ASYNC_FROM_CHIP7
    )
}

fn is_error_shaped(header: u8) -> bool {
    matches!(
        header,
        OUT_ERROR..=OUT_WARNING_DATA_COLLECTION_SQUEUED | OUT_ALIGN_SUCCESS_VERSION
    )
}

impl Packet {
    /// Serialize to the fixed wire representation, zero-padding short layouts.
    pub fn encode(&self) -> Result<[u8; PACKET_SIZE], bincode::Error> {
        let bytes = match self {
            Packet::Data(p) => bincode::serialize(p)?,
            Packet::I2c(p) => bincode::serialize(p)?,
            Packet::Config(p) => bincode::serialize(p)?,
            Packet::Pin(p) => bincode::serialize(p)?,
            Packet::Error(p) => bincode::serialize(p)?,
        };
        let mut raw = [0u8; PACKET_SIZE];
        raw[..bytes.len()].copy_from_slice(&bytes);
        Ok(raw)
    }

    /// Deserialize from the wire, picking the layout from the header byte.
    /// Headers that match no other layout decode as `Data`; the dispatcher
    /// rejects the ones that are actually unknown.
    pub fn decode(raw: &[u8; PACKET_SIZE]) -> Result<Packet, bincode::Error> {
        let header = raw[0];
        let packet = if is_pin_shaped(header) {
            Packet::Pin(bincode::deserialize(raw)?)
        } else if is_i2c_shaped(header) {
            Packet::I2c(bincode::deserialize(raw)?)
        } else if is_config_shaped(header) {
            Packet::Config(bincode::deserialize(raw)?)
        } else if is_error_shaped(header) {
            Packet::Error(bincode::deserialize(raw)?)
        } else {
            Packet::Data(bincode::deserialize(raw)?)
        };
        Ok(packet)
    }

    pub fn header(&self) -> u8 {
        match self {
            Packet::Data(p) => p.header,
            Packet::I2c(p) => p.header,
            Packet::Config(p) => p.header,
            Packet::Pin(p) => p.header,
            Packet::Error(p) => p.header,
        }
    }

    /// Execution time in virtual microseconds. Error packets carry none and
    /// report 0, which makes them immediately due.
    pub fn exec_time(&self) -> u32 {
        match self {
            Packet::Data(p) => p.exec_time,
            Packet::I2c(p) => p.exec_time,
            Packet::Config(p) => p.exec_time,
            Packet::Pin(p) => p.exec_time,
            Packet::Error(_) => 0,
        }
    }

    /// The 32-bit payload view used by the dispatcher and the drop counter.
    pub fn word(&self) -> u32 {
        match self {
            Packet::Data(p) => p.value,
            Packet::I2c(p) => ((p.value_ms as u32) << 8) | p.value_ls as u32,
            Packet::Config(p) => p.value as u32,
            Packet::Pin(p) => p.value as u32,
            Packet::Error(p) => p.value,
        }
    }

    /// Bump the value field in place. Used by the outbound ring to coalesce
    /// drops into the most recently written entry under total saturation.
    pub fn bump_value(&mut self) {
        match self {
            Packet::Data(p) => p.value = p.value.wrapping_add(1),
            Packet::I2c(p) => p.value_ls = p.value_ls.wrapping_add(1),
            Packet::Config(p) => p.value = p.value.wrapping_add(1),
            Packet::Pin(p) => p.value = p.value.wrapping_add(1),
            Packet::Error(p) => p.value = p.value.wrapping_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(p: Packet) {
        let raw = p.encode().unwrap();
        assert_eq!(Packet::decode(&raw).unwrap(), p);
    }

    #[test]
    fn test_roundtrip_all_shapes() {
        roundtrip(Packet::Data(DataPacket {
            header: IN_ASYNC_TO_CHIP0,
            exec_time: 1_000_000,
            value: 0x2A,
        }));
        roundtrip(Packet::I2c(I2cPacket {
            header: IN_I2C1,
            exec_time: 17,
            device_address: 0xA0,
            register_address: 0x10,
            value_ms: 0x02,
            value_ls: 0x01,
        }));
        roundtrip(Packet::Config(ConfigPacket {
            header: IN_CONF_ASYNC_TO_CHIP0,
            exec_time: 0,
            config_header: CONF_WIDTH,
            value: 6,
        }));
        roundtrip(Packet::Pin(PinPacket {
            header: IN_PIN,
            exec_time: 42,
            id: 13,
            value: 1,
        }));
        roundtrip(Packet::Error(ErrorPacket {
            header: OUT_ERROR_INTERFACE_NOT_ACTIVE,
            org_header: IN_ASYNC_TO_CHIP3,
            value: 0x2A,
            sub_header: ERROR_NO_SUB,
        }));
    }

    #[test]
    fn test_data_wire_layout() {
        let p = Packet::Data(DataPacket {
            header: IN_SET_TIME,
            exec_time: 0x0403_0201,
            value: 0x0807_0605,
        });
        assert_eq!(
            p.encode().unwrap(),
            [1, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn test_short_layouts_zero_padded() {
        let p = Packet::Pin(PinPacket {
            header: IN_PIN,
            exec_time: 0x0403_0201,
            id: 7,
            value: 1,
        });
        assert_eq!(p.encode().unwrap(), [10, 0x01, 0x02, 0x03, 0x04, 7, 1, 0, 0]);

        let e = Packet::Error(ErrorPacket {
            header: OUT_ERROR_OUTPUT_FULL,
            org_header: OUT_ERROR_OUTPUT_FULL,
            value: 1,
            sub_header: ERROR_NO_SUB,
        });
        assert_eq!(e.encode().unwrap(), [204, 204, 1, 0, 0, 0, 255, 0, 0]);
    }

    #[test]
    fn test_config_header_6_is_config_shaped() {
        let raw = [6u8, 0, 0, 0, 0, CONF_NONE, 1, 0, 0];
        match Packet::decode(&raw).unwrap() {
            Packet::Config(c) => {
                assert_eq!(c.config_header, CONF_NONE);
                assert_eq!(c.value, 1);
            }
            other => panic!("expected config packet, got {:?}", other),
        }
    }
}
