//! Virtual clock and time-gated instruction replay.
//!
//! `IN_SET_TIME` with a nonzero offset arms the clock: hardware micros at
//! that instant plus the offset becomes virtual time zero, and from then on
//! the periodic tick drains every queued instruction whose exec_time has
//! come due. Offset zero stops the clock, discards whatever is still queued
//! and disables event recording.

use log::info;

use crate::hal::Board;
use crate::headers::*;
use crate::Device;

/// Tick bookkeeping. `exec_active` guards against the tick reentering
/// itself; on hardware the timer interrupt can fire while a slow
/// instruction (an async handshake) is still executing.
#[derive(Default)]
pub struct Scheduler {
    pub(crate) exec_active: bool,
    pub(crate) timer_armed: bool,
}

impl<B: Board> Device<B> {
    /// Periodic scheduler entry; a no-op while the clock is stopped.
    /// Executes every queued instruction whose time has come, oldest first,
    /// all against the virtual time computed once at entry.
    pub fn tick(&mut self) {
        if self.sched.exec_active || !self.sched.timer_armed {
            return;
        }
        self.sched.exec_active = true;
        let now = self.ex.virtual_now(self.board.clock().micros());
        loop {
            // Signed wraparound comparison: before virtual zero `now` sits
            // just below the wrap point and nothing is due.
            let due = match self.ex.inbound.front() {
                Some(p) if now.wrapping_sub(p.exec_time()) as i32 >= 0 => *p,
                _ => break,
            };
            self.ex.inbound.pop();
            self.exec_instruction(due, true);
        }
        self.sched.exec_active = false;
    }

    /// `IN_SET_TIME`: arm the clock (offset > 0) or stop it (offset = 0).
    /// Stopping discards all pending instructions.
    pub(crate) fn set_time_offset(&mut self, offset: u32) {
        let hw = self.board.clock().micros();
        if offset != 0 {
            self.ex.set_offset(hw.wrapping_add(offset));
            self.sched.timer_armed = true;
            info!("clock armed, virtual zero in {} us", offset);
            self.ex.send_data32(IN_SET_TIME, offset, hw, true);
        } else {
            self.sched.timer_armed = false;
            let dropped = self.ex.inbound.len();
            self.ex.inbound.clear();
            info!("clock stopped, {} pending instructions discarded", dropped);
            // Confirmation stamped against the epoch that is ending.
            self.ex.send_data32(IN_SET_TIME, offset, hw, true);
            self.ex.set_offset(0);
        }
    }

    /// `IN_READ_TIME`: value carries hardware micros, exec_time the current
    /// virtual time.
    pub(crate) fn read_time(&mut self) {
        let hw = self.board.clock().micros();
        self.ex.send_data32(OUT_TIME, hw, hw, true);
    }

    /// `IN_CONF_READ_ON_REQUEST`: choose between continuous outbound drain
    /// and drain-on-`IN_READ` only.
    pub(crate) fn set_read_on_request(&mut self, value: u8) {
        let hw = self.board.clock().micros();
        self.ex.read_on_request = value > 0;
        self.ex.send_config(IN_CONF_READ_ON_REQUEST, CONF_NONE, (value > 0) as u8, hw);
    }
}
