//! Header-to-operation instruction routing.
//!
//! Every decoded packet ends up here, either straight from the serial front
//! end (management instructions, or any instruction while the clock is
//! stopped) or out of the inbound ring when its time comes. The header byte
//! alone selects the operation; payload interpretation is delegated to the
//! managers.

use crate::hal::Board;
use crate::headers::*;
use crate::packet::Packet;
use crate::Device;

impl<B: Board> Device<B> {
    /// Execute one instruction. `from_timed` tells how an unknown header is
    /// reported: the timed path queues the error, the immediate path writes
    /// it straight to the serial link so a desynchronized host hears about
    /// it even with a saturated outbound ring.
    pub(crate) fn exec_instruction(&mut self, packet: Packet, from_timed: bool) {
        match packet.header() {
            IN_READ => self.transmit_all_outbound(),
            IN_SET_TIME => self.set_time_offset(packet.word()),
            IN_READ_TIME => self.read_time(),
            IN_READ_INSTRUCTIONS => self.transmit_pending_instructions(),
            IN_READ_LAST => self.transmit_newest_outbound(),
            IN_FREE_INSTRUCTION_SPOTS => self.transmit_free_spots(),
            IN_CONF_READ_ON_REQUEST => {
                if let Packet::Config(c) = packet {
                    self.set_read_on_request(c.value);
                }
            }
            IN_PIN => {
                if let Packet::Pin(p) = packet {
                    self.set_pin(p.id, p.value);
                }
            }
            IN_PIN_READ => {
                if let Packet::Pin(p) = packet {
                    self.read_pin(p.id);
                }
            }
            h @ IN_SPI0..=IN_SPI2 => {
                self.spi.send_word(h - IN_SPI0, packet.word(), &mut self.ex, &mut self.board);
            }
            h @ IN_I2C0..=IN_I2C2 => {
                if let Packet::I2c(p) = packet {
                    self.i2c.process(
                        h - IN_I2C0,
                        p.device_address,
                        p.register_address,
                        p.value_ms,
                        p.value_ls,
                        &mut self.ex,
                        &mut self.board,
                    );
                }
            }
            h @ IN_ASYNC_TO_CHIP0..=IN_ASYNC_TO_CHIP7 => {
                self.aer_to.send(h - IN_ASYNC_TO_CHIP0, packet.word(), &mut self.ex, &mut self.board);
            }
            IN_CONF_PIN => {
                if let Packet::Config(c) = packet {
                    self.configure_pin(c.config_header, c.value);
                }
            }
            h @ IN_CONF_SPI0..=IN_CONF_SPI2 => {
                if let Packet::Config(c) = packet {
                    self.spi.configure(
                        h - IN_CONF_SPI0,
                        c.config_header,
                        c.value,
                        &mut self.ex,
                        &mut self.pins,
                        &mut self.board,
                    );
                }
            }
            h @ IN_CONF_I2C0..=IN_CONF_I2C2 => {
                if let Packet::Config(c) = packet {
                    self.i2c.configure(
                        h - IN_CONF_I2C0,
                        c.config_header,
                        c.value,
                        &mut self.ex,
                        &mut self.pins,
                        &mut self.board,
                    );
                }
            }
            h @ IN_CONF_ASYNC_TO_CHIP0..=IN_CONF_ASYNC_TO_CHIP7 => {
                if let Packet::Config(c) = packet {
                    self.aer_to.configure(
                        h - IN_CONF_ASYNC_TO_CHIP0,
                        c.config_header,
                        c.value,
                        &mut self.ex,
                        &mut self.pins,
                        &mut self.board,
                    );
                }
            }
            h @ IN_CONF_ASYNC_FROM_CHIP0..=IN_CONF_ASYNC_FROM_CHIP7 => {
                if let Packet::Config(c) = packet {
                    let id = h - IN_CONF_ASYNC_FROM_CHIP0;
                    if let Some(req_pin) = self.aer_from.configure(
                        id,
                        c.config_header,
                        c.value,
                        &mut self.ex,
                        &mut self.pins,
                        &mut self.board,
                    ) {
                        self.watch_request_pin(req_pin, id);
                    }
                }
            }
            IN_RESET => self.reset(),
            unknown => {
                if from_timed {
                    self.ex.error(OUT_ERROR_UNKNOWN_INSTRUCTION, unknown, packet.word());
                } else {
                    self.report_unknown_bypassing_buffer(unknown, packet.word());
                }
            }
        }
    }
}
