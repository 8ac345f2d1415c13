//! Peripheral interface managers.
//!
//! Each manager owns the per-slot staged configuration of one interface
//! family and executes its data instructions against the board. Slots start
//! inactive; `CONF_*` sub-commands stage fields, `CONF_ACTIVE` reserves the
//! pins and brings the slot up. Once active, further configuration of the
//! same slot is rejected (SPI, async) so a running experiment cannot be
//! reconfigured under the host's feet.

pub mod aer_from;
pub mod aer_to;
pub mod i2c;
pub mod spi;

pub use aer_from::AerFromChip;
pub use aer_to::AerToChip;
pub use i2c::I2cManager;
pub use spi::SpiManager;

/// Async interface slots per direction.
pub const AER_SLOTS: usize = 8;

/// Widest async data bus, in bits.
pub const AER_MAX_WIDTH: u8 = 32;
