//! Top-level device: serial framing, routing, and the management ops.
//!
//! [`Device`] owns the board, the packet rings and every interface manager,
//! and exposes the three entry points a firmware build wires up: [`poll`]
//! from the main loop, [`tick`] from the scheduler timer and [`pin_change`]
//! from the pin change interrupt.
//!
//! [`poll`]: Device::poll
//! [`tick`]: Device::tick
//! [`pin_change`]: Device::pin_change

use std::collections::BTreeMap;

use log::{error, info, warn};

use crate::hal::{Board, PinMode};
use crate::headers::*;
use crate::interfaces::{AerFromChip, AerToChip, I2cManager, SpiManager};
use crate::packet::{DataPacket, ErrorPacket, Packet};
use crate::pins::PinRegistry;
use crate::ring_buffer::Exchange;
use crate::scheduler::Scheduler;
use crate::{PACKET_SIZE, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};

/// What a pin's change interrupt is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IrqLine {
    Unassigned,
    /// Host-configured input pin: record level changes.
    Watch,
    /// Request line of the given async from-chip slot.
    AerRequest(u8),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum MapperState {
    #[default]
    Off,
    AwaitKey,
    Collect(u32),
}

/// Key-to-values routing table uploaded by the host between
/// `IN_MAPPER_KEY` and `IN_MAPPER_END`.
#[derive(Default)]
struct Mapper {
    state: MapperState,
    table: BTreeMap<u32, Vec<u32>>,
}

/// The whole firmware pipeline over one [`Board`].
pub struct Device<B: Board> {
    pub(crate) board: B,
    pub(crate) ex: Exchange,
    pub(crate) pins: PinRegistry,
    pub(crate) spi: SpiManager,
    pub(crate) i2c: I2cManager,
    pub(crate) aer_to: AerToChip,
    pub(crate) aer_from: AerFromChip,
    pub(crate) sched: Scheduler,
    irq: Vec<IrqLine>,
    frame: [u8; PACKET_SIZE],
    frame_len: usize,
    /// Nine alignment bytes seen; the next zero byte completes the handshake.
    await_align_zero: bool,
    mapper: Mapper,
    throttle_warned: bool,
}

impl<B: Board> Device<B> {
    pub fn new(board: B) -> Self {
        let profile = board.profile();
        info!(
            "device up on {} ({} pins, {} spi, {} i2c)",
            profile.name,
            profile.digital_pins,
            profile.spi_buses.len(),
            profile.i2c_buses.len()
        );
        Device {
            ex: Exchange::new(profile),
            pins: PinRegistry::new(profile.digital_pins),
            spi: SpiManager::new(profile.spi_buses.len()),
            i2c: I2cManager::new(profile.i2c_buses.len()),
            aer_to: AerToChip::new(),
            aer_from: AerFromChip::new(),
            sched: Scheduler::default(),
            irq: vec![IrqLine::Unassigned; profile.digital_pins as usize],
            frame: [0; PACKET_SIZE],
            frame_len: 0,
            await_align_zero: false,
            mapper: Mapper::default(),
            throttle_warned: false,
            board,
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn exchange(&self) -> &Exchange {
        &self.ex
    }

    /// True while the virtual clock runs.
    pub fn clock_running(&self) -> bool {
        self.ex.recording()
    }

    pub fn mapping(&self) -> &BTreeMap<u32, Vec<u32>> {
        &self.mapper.table
    }

    // --- Serial front end ---

    /// Main-loop entry: decode pending serial bytes and drain the outbound
    /// ring according to the transmit mode.
    pub fn poll(&mut self) {
        loop {
            let byte = match self.board.serial().read_byte() {
                Some(b) => b,
                None => break,
            };
            self.feed(byte);
        }
        if self.ex.read_on_request {
            self.throttle_drain();
        } else {
            self.transmit_outbound_ring();
        }
    }

    /// In on-request mode the outbound ring is normally held for `IN_READ`,
    /// but a recording burst can saturate it anyway. Warn the host once and
    /// bleed the ring in small bursts so the newest events survive.
    fn throttle_drain(&mut self) {
        let outbound = &self.ex.outbound;
        if outbound.free_spots() >= outbound.capacity() / 8 {
            return;
        }
        if !self.throttle_warned {
            self.throttle_warned = true;
            warn!("outbound ring nearly full, throttling event collection");
            self.ex.error(
                OUT_WARNING_DATA_COLLECTION_SQUEUED,
                OUT_WARNING_DATA_COLLECTION_SQUEUED,
                self.ex.outbound.len() as u32,
            );
        }
        for _ in 0..10 {
            match self.ex.outbound.pop() {
                Some(p) => self.write_direct(&p),
                None => break,
            }
        }
    }

    /// Push one received byte into the frame assembler.
    pub fn feed(&mut self, byte: u8) {
        if self.await_align_zero {
            self.await_align_zero = false;
            if byte == 0 {
                self.respond_alignment();
                return;
            }
            // Not the alignment terminator; treat it as the start of a
            // regular frame.
        }
        self.frame[self.frame_len] = byte;
        self.frame_len += 1;
        if self.frame_len < PACKET_SIZE {
            return;
        }
        self.frame_len = 0;
        let raw = self.frame;
        if raw.iter().all(|&b| b == IN_ALIGN) {
            self.await_align_zero = true;
            return;
        }
        match Packet::decode(&raw) {
            Ok(packet) => self.route(packet),
            Err(e) => error!("undecodable frame {:02x?}: {}", raw, e),
        }
    }

    /// Echo the alignment pattern and report the firmware version, straight
    /// to the serial link.
    fn respond_alignment(&mut self) {
        let serial = self.board.serial();
        for _ in 0..PACKET_SIZE {
            serial.write_byte(IN_ALIGN);
        }
        serial.write_byte(0);
        let version = Packet::Error(ErrorPacket {
            header: OUT_ALIGN_SUCCESS_VERSION,
            org_header: VERSION_MAJOR,
            value: VERSION_PATCH as u32,
            sub_header: VERSION_MINOR,
        });
        self.write_direct(&version);
        info!(
            "host aligned, version {}.{}.{}",
            VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH
        );
    }

    /// Immediate execution vs queuing for the scheduler: management
    /// instructions always run now, everything else runs now only while the
    /// clock is stopped.
    fn route(&mut self, packet: Packet) {
        let header = packet.header();
        if self.route_mapper(header, &packet) {
            return;
        }
        let immediate = !self.ex.recording()
            || matches!(
                header,
                IN_READ..=IN_CONF_READ_ON_REQUEST | IN_RESET | IN_ALIGN
            );
        if immediate {
            self.exec_instruction(packet, false);
        } else if !self.ex.inbound.try_push(packet) {
            self.ex.error(OUT_ERROR_INPUT_FULL, header, self.ex.inbound.capacity() as u32);
        }
    }

    /// Mapper upload protocol; returns true when the packet was consumed.
    fn route_mapper(&mut self, header: u8, packet: &Packet) -> bool {
        let hw = self.board.clock().micros();
        match header {
            IN_MAPPER_KEY => {
                self.mapper.state = MapperState::AwaitKey;
                true
            }
            IN_MAPPER_END => {
                self.mapper.state = MapperState::Off;
                self.ex.send_data32(IN_MAPPER_END, self.mapper.table.len() as u32, hw, true);
                true
            }
            _ => match self.mapper.state {
                MapperState::Off => false,
                MapperState::AwaitKey => {
                    let key = packet.word();
                    self.mapper.table.insert(key, Vec::new());
                    self.mapper.state = MapperState::Collect(key);
                    self.ex.send_data32(IN_MAPPER_KEY, key, hw, true);
                    true
                }
                MapperState::Collect(key) => {
                    if let Some(values) = self.mapper.table.get_mut(&key) {
                        values.push(packet.word());
                    }
                    true
                }
            },
        }
    }

    // --- Outbound transmission ---

    fn write_direct(&mut self, packet: &Packet) {
        match packet.encode() {
            Ok(raw) => self.board.serial().write_packet(&raw),
            Err(e) => error!("packet encode failed: {}", e),
        }
    }

    fn transmit_outbound_ring(&mut self) {
        if self.ex.read_active {
            return;
        }
        self.ex.read_active = true;
        loop {
            match self.ex.outbound.pop() {
                Some(p) => self.write_direct(&p),
                None => break,
            }
        }
        self.ex.read_active = false;
    }

    /// Transmit the oldest queued outbound packet immediately.
    fn transmit_first(&mut self) {
        if self.ex.read_active {
            return;
        }
        if let Some(p) = self.ex.outbound.pop() {
            self.write_direct(&p);
        }
    }

    /// `IN_READ`: drain the whole outbound ring, then queue and flush the
    /// confirmation so the host sees a terminator.
    pub(crate) fn transmit_all_outbound(&mut self) {
        self.transmit_outbound_ring();
        let hw = self.board.clock().micros();
        self.ex.send_data32(IN_READ, 0, hw, true);
        self.transmit_first();
    }

    /// `IN_READ_LAST`: transmit the newest outbound packet without
    /// consuming it.
    pub(crate) fn transmit_newest_outbound(&mut self) {
        if self.ex.read_active {
            return;
        }
        if let Some(p) = self.ex.outbound.newest().copied() {
            self.write_direct(&p);
        }
        let hw = self.board.clock().micros();
        self.ex.send_data32(IN_READ_LAST, 0, hw, true);
        self.transmit_first();
    }

    /// `IN_READ_INSTRUCTIONS`: stream every pending instruction without
    /// consuming them.
    pub(crate) fn transmit_pending_instructions(&mut self) {
        let pending: Vec<Packet> = self.ex.inbound.iter().copied().collect();
        for p in &pending {
            self.write_direct(p);
        }
        let hw = self.board.clock().micros();
        self.ex.send_data32(IN_READ_INSTRUCTIONS, 0, hw, true);
    }

    /// `IN_FREE_INSTRUCTION_SPOTS`: report the free inbound slots straight
    /// over the serial link so the answer cannot get stuck behind a full
    /// outbound ring.
    pub(crate) fn transmit_free_spots(&mut self) {
        let hw = self.board.clock().micros();
        let report = Packet::Data(DataPacket {
            header: OUT_FREE_INSTRUCTION_SPOTS,
            exec_time: self.ex.virtual_now(hw),
            value: self.ex.inbound.free_spots() as u32,
        });
        self.write_direct(&report);
        self.ex.send_data32(IN_FREE_INSTRUCTION_SPOTS, 0, hw, true);
    }

    /// Unknown header on the immediate path: the host may be desynchronized,
    /// so the report bypasses the outbound ring entirely.
    pub(crate) fn report_unknown_bypassing_buffer(&mut self, header: u8, value: u32) {
        warn!("unknown instruction {} (value {})", header, value);
        let report = Packet::Error(ErrorPacket {
            header: OUT_ERROR_UNKNOWN_INSTRUCTION,
            org_header: header,
            value,
            sub_header: ERROR_NO_SUB,
        });
        self.write_direct(&report);
    }

    // --- GPIO instruction ops ---

    /// `IN_CONF_PIN`: reserve and configure a raw GPIO pin.
    pub(crate) fn configure_pin(&mut self, sub: u8, pin: u8) {
        let hw = self.board.clock().micros();
        match sub {
            CONF_OUTPUT => {
                if self.pins.reserve_output(pin, IN_CONF_PIN, &mut self.ex) {
                    self.board.gpio().pin_mode(pin, PinMode::Output);
                    self.ex.send_config(IN_CONF_PIN, sub, pin, hw);
                }
            }
            CONF_INPUT => {
                if self.pins.reserve_input(pin, IN_CONF_PIN, &mut self.ex) {
                    self.board.gpio().pin_mode(pin, PinMode::Input);
                    self.irq[pin as usize] = IrqLine::Watch;
                    self.ex.send_config(IN_CONF_PIN, sub, pin, hw);
                }
            }
            _ => {
                self.ex.error_sub(OUT_ERROR_UNKNOWN_CONFIGURATION, IN_CONF_PIN, pin as u32, sub);
            }
        }
    }

    /// `IN_PIN`: drive a reserved output pin.
    pub(crate) fn set_pin(&mut self, pin: u8, value: u8) {
        if !self.pins.is_output(pin) {
            self.ex.error(OUT_ERROR_PIN_NOT_CONFIGURED, IN_PIN, pin as u32);
            return;
        }
        let hw = self.board.clock().micros();
        self.board.gpio().write(pin, value != 0);
        self.ex.send_pin(IN_PIN, pin, value, hw, true);
    }

    /// `IN_PIN_READ`: sample any reserved pin.
    pub(crate) fn read_pin(&mut self, pin: u8) {
        if !self.pins.is_input(pin) && !self.pins.is_output(pin) {
            self.ex.error(OUT_ERROR_PIN_NOT_CONFIGURED, IN_PIN_READ, pin as u32);
            return;
        }
        let hw = self.board.clock().micros();
        let level = self.board.gpio().read(pin);
        let header = if level { OUT_PIN_HIGH } else { OUT_PIN_LOW };
        self.ex.send_pin(header, pin, level as u8, hw, false);
        self.ex.send_pin(IN_PIN_READ, pin, 0, hw, true);
    }

    // --- Interrupt entry points ---

    /// Pin change interrupt entry. The level event of a watched pin is only
    /// recorded while the clock runs; async request edges always answer
    /// their handshake.
    pub fn pin_change(&mut self, pin: u8) {
        match self.irq.get(pin as usize).copied() {
            Some(IrqLine::Watch) => {
                let hw = self.board.clock().micros();
                let level = self.board.gpio().read(pin);
                let header = if level { OUT_PIN_HIGH } else { OUT_PIN_LOW };
                self.ex.send_pin(header, pin, level as u8, hw, false);
            }
            Some(IrqLine::AerRequest(id)) => {
                self.aer_from.on_request_edge(id, &mut self.ex, &mut self.board);
            }
            _ => {}
        }
    }

    pub(crate) fn watch_request_pin(&mut self, pin: u8, slot: u8) {
        if let Some(line) = self.irq.get_mut(pin as usize) {
            *line = IrqLine::AerRequest(slot);
        }
    }

    // --- Session control ---

    /// `IN_RESET`: drop every reservation, configuration and queue. The
    /// serial link stays up; the host realigns afterwards.
    pub(crate) fn reset(&mut self) {
        info!("device reset");
        let profile = self.board.profile();
        self.ex = Exchange::new(profile);
        self.pins = PinRegistry::new(profile.digital_pins);
        self.spi = SpiManager::new(profile.spi_buses.len());
        self.i2c = I2cManager::new(profile.i2c_buses.len());
        self.aer_to = AerToChip::new();
        self.aer_from = AerFromChip::new();
        self.sched = Scheduler::default();
        self.irq = vec![IrqLine::Unassigned; profile.digital_pins as usize];
        self.frame_len = 0;
        self.await_align_zero = false;
        self.mapper = Mapper::default();
        self.throttle_warned = false;
    }
}
