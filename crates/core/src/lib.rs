//! # aerlink-core
//!
//! Firmware core for a timed, packet-addressable I/O multiplexer used in
//! neuromorphic / asynchronous chip experiments. A host streams 9-byte
//! instruction packets over a serial link; the device executes them at the
//! requested virtual time, drives the configured interfaces (async
//! request/acknowledge handshakes, SPI, I2C, raw GPIO), and reports results
//! and asynchronously captured events back over the same link, timestamped
//! against the same virtual clock.
//!
//! ## Architecture
//!
//! - [`Device`]: top-level owner that wires the pipeline to a [`hal::Board`]
//! - [`packet`]: fixed 9-byte wire packet, five layouts, byte-exact codec
//! - [`headers`]: the protocol's header byte space
//! - [`ring_buffer`]: inbound/outbound packet rings and the send helpers
//! - [`pins`]: exclusive pin reservation table and the GPIO instruction ops
//! - [`interfaces`]: SPI, I2C and async to/from-chip interface managers
//! - [`dispatch`]: header-to-operation instruction routing
//! - [`scheduler`]: virtual clock and time-gated instruction replay
//! - [`boards`]: per-board sizing and fixed bus pins, as data
//! - [`simboard`]: software board for tests and the host-side simulator
//!
//! The core is single-threaded. The entry points a real firmware build would
//! call from interrupt context map onto `&mut self` methods
//! ([`Device::tick`], [`Device::pin_change`]), which gives the same
//! run-to-completion semantics the interrupt-masking discipline provides on
//! hardware.

pub mod boards;
pub mod device;
pub mod dispatch;
pub mod hal;
pub mod headers;
pub mod interfaces;
pub mod packet;
pub mod pins;
pub mod ring_buffer;
pub mod scheduler;
pub mod simboard;

pub use boards::BoardProfile;
pub use device::Device;
pub use hal::Board;
pub use packet::Packet;
pub use ring_buffer::{Exchange, PacketRing};
pub use simboard::SimBoard;

/// Fixed wire size of every packet, in bytes.
pub const PACKET_SIZE: usize = 9;

/// Scheduler tick period in microseconds.
pub const EXEC_PRECISION_US: u32 = 100;

/// Acknowledge timeout of the to-chip handshake, in milliseconds.
pub const AER_HANDSHAKE_TIMEOUT_MS: u32 = 10;

/// Protocol/firmware version, reported by the alignment handshake.
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 9;
pub const VERSION_PATCH: u8 = 2;
