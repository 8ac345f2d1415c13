//! Wire-protocol header bytes.
//!
//! Every packet starts with a 1-byte header that selects both the packet
//! layout and the operation. Inbound headers are instructions from the host,
//! outbound headers are events/results/errors from the device, and config
//! sub-headers qualify a `Config` packet under one of the `IN_CONF_*` main
//! headers. The values match protocol revision 0.9.

// --- Inbound: buffer and clock management ---

/// Transmit the whole outbound buffer to the host, clearing it.
pub const IN_READ: u8 = 0;
/// Arm (value > 0) or stop (value = 0) the virtual clock.
pub const IN_SET_TIME: u8 = 1;
/// Report hardware and virtual time.
pub const IN_READ_TIME: u8 = 2;
/// Transmit all pending (not yet executed) instructions without consuming.
pub const IN_READ_INSTRUCTIONS: u8 = 3;
/// Transmit the most recently queued outbound packet without consuming.
pub const IN_READ_LAST: u8 = 4;
/// Report the number of free inbound instruction slots.
pub const IN_FREE_INSTRUCTION_SPOTS: u8 = 5;
/// Legacy toggle: outbound drain only on request vs continuously.
pub const IN_CONF_READ_ON_REQUEST: u8 = 6;

// --- Inbound: data instructions ---

/// Drive a reserved output pin.
pub const IN_PIN: u8 = 10;
/// Sample a reserved pin.
pub const IN_PIN_READ: u8 = 11;

pub const IN_SPI0: u8 = 20;
pub const IN_SPI1: u8 = 21;
pub const IN_SPI2: u8 = 22;

pub const IN_I2C0: u8 = 25;
pub const IN_I2C1: u8 = 26;
pub const IN_I2C2: u8 = 27;

/// Send a 0–32 bit word on async to-chip slot 0; slots 1–7 follow.
pub const IN_ASYNC_TO_CHIP0: u8 = 30;
pub const IN_ASYNC_TO_CHIP1: u8 = 31;
pub const IN_ASYNC_TO_CHIP2: u8 = 32;
pub const IN_ASYNC_TO_CHIP3: u8 = 33;
pub const IN_ASYNC_TO_CHIP4: u8 = 34;
pub const IN_ASYNC_TO_CHIP5: u8 = 35;
pub const IN_ASYNC_TO_CHIP6: u8 = 36;
pub const IN_ASYNC_TO_CHIP7: u8 = 37;

// --- Inbound: configuration main headers ---

pub const IN_CONF_PIN: u8 = 50;

pub const IN_CONF_SPI0: u8 = 60;
pub const IN_CONF_SPI1: u8 = 61;
pub const IN_CONF_SPI2: u8 = 62;

pub const IN_CONF_I2C0: u8 = 65;
pub const IN_CONF_I2C1: u8 = 66;
pub const IN_CONF_I2C2: u8 = 67;

pub const IN_CONF_ASYNC_TO_CHIP0: u8 = 70;
pub const IN_CONF_ASYNC_TO_CHIP7: u8 = 77;

pub const IN_CONF_ASYNC_FROM_CHIP0: u8 = 80;
pub const IN_CONF_ASYNC_FROM_CHIP7: u8 = 87;

// --- Inbound: session control ---

/// The next data word is a mapper key; following words are its values.
pub const IN_MAPPER_KEY: u8 = 190;
/// Leave mapper mode.
pub const IN_MAPPER_END: u8 = 191;
/// Full device reset (configuration reset, not a hardware reset).
pub const IN_RESET: u8 = 254;
/// Protocol alignment: nine bytes of 255 followed by one byte of 0.
pub const IN_ALIGN: u8 = 255;

// --- Outbound ---

/// Response to [`IN_READ_TIME`]: value = hardware micros, exec_time = virtual.
pub const OUT_TIME: u8 = 100;
/// Response to [`IN_FREE_INSTRUCTION_SPOTS`].
pub const OUT_FREE_INSTRUCTION_SPOTS: u8 = 101;

/// A watched input pin went low.
pub const OUT_PIN_LOW: u8 = 110;
/// A watched input pin went high.
pub const OUT_PIN_HIGH: u8 = 111;

pub const OUT_SPI0: u8 = 120;
pub const OUT_SPI1: u8 = 121;
pub const OUT_SPI2: u8 = 122;

pub const OUT_I2C0: u8 = 125;
pub const OUT_I2C1: u8 = 126;
pub const OUT_I2C2: u8 = 127;

/// Event recorded on async from-chip slot 0; slots 1–7 follow.
pub const OUT_ASYNC_FROM_CHIP0: u8 = 130;
pub const OUT_ASYNC_FROM_CHIP7: u8 = 137;

// --- Outbound: errors and warnings ---

pub const OUT_ERROR: u8 = 200;
pub const OUT_ERROR_PIN_ALREADY_INUSE: u8 = 201;
pub const OUT_ERROR_PIN_NOT_CONFIGURED: u8 = 202;
pub const OUT_ERROR_INPUT_FULL: u8 = 203;
pub const OUT_ERROR_OUTPUT_FULL: u8 = 204;
pub const OUT_ERROR_INTERFACE_ALREADY_ACTIVE: u8 = 205;
pub const OUT_ERROR_UNKNOWN_INSTRUCTION: u8 = 206;
pub const OUT_ERROR_INTERFACE_NOT_ACTIVE: u8 = 207;
pub const OUT_ERROR_UNKNOWN_CONFIGURATION: u8 = 208;
/// The to-chip handshake saw no acknowledge before the timeout.
pub const OUT_ERROR_ASYNC_HS_TIMEOUT: u8 = 209;
pub const OUT_ERROR_PERIPHERAL_INTERFACE_NOT_READY: u8 = 210;
pub const OUT_ERROR_CONFIGURATION_OUT_OF_BOUNDS: u8 = 211;
pub const OUT_ERROR_DATA_OUT_OF_BOUNDS: u8 = 212;
/// Warning: event recording outpaces the host; transmission is throttled.
pub const OUT_WARNING_DATA_COLLECTION_SQUEUED: u8 = 213;

/// Alignment succeeded; carries the firmware version triple.
pub const OUT_ALIGN_SUCCESS_VERSION: u8 = 253;

// --- Config sub-headers (shared across interface families) ---

/// Sub-headers 0–31 assign the physical pin of that async data channel.
pub const CONF_CHANNEL_MAX: u8 = 31;

/// Activate the interface; staged fields become immutable.
pub const CONF_ACTIVE: u8 = 60;
/// Reserve a pin as output (pin config).
pub const CONF_OUTPUT: u8 = 61;
/// Reserve a pin as input and record its changes (pin config).
pub const CONF_INPUT: u8 = 62;
/// Request pin of an async interface.
pub const CONF_REQ: u8 = 70;
/// Acknowledge pin of an async interface.
pub const CONF_ACK: u8 = 71;
/// Bit width (async) or byte width (SPI/I2C).
pub const CONF_WIDTH: u8 = 72;
/// Request-line delay, in multiples of 20 ns.
pub const CONF_REQ_DELAY: u8 = 73;
/// 0 = least-significant first (default), 1 = most-significant first.
pub const CONF_BYTE_ORDER: u8 = 74;
/// Bus speed class, see the interface manager docs.
pub const CONF_SPEED_CLASS: u8 = 75;
/// Interface sub-type (SPI mode, async handshake flavor).
pub const CONF_TYPE: u8 = 76;
/// No sub-category applies.
pub const CONF_NONE: u8 = 253;

/// Sub-header slot of an error packet when no sub-header is relevant.
pub const ERROR_NO_SUB: u8 = 255;

// --- Async interface sub-types (via CONF_TYPE) ---

/// 4-phase handshake, active-high handshake and data lines (default).
pub const ASYNC_4PHASE_CHIGH_DHIGH: u8 = 0;
/// 4-phase handshake, active-low handshake lines.
pub const ASYNC_4PHASE_CLOW_DHIGH: u8 = 1;
/// 2-phase handshake (reserved, not implemented).
pub const ASYNC_2PHASE: u8 = 10;
/// 4-phase handshake through an MCP23017 port extender (reserved).
pub const ASYNC_4PHASE_MCP23017: u8 = 20;
