//! Intel 8253/8254-compatible programmable interval timer (`spec.md`
//! §4.2). Three independent counters share one control-word port; only
//! modes 0 (interrupt on terminal count), 2 (rate generator) and 3
//! (square wave generator) are modeled, matching what the firmware and
//! guest OS this subsystem targets actually program.

use es40_io_snapshot::Savable;
use tracing::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AccessMode {
    Latch,
    Lsb,
    Msb,
    LsbThenMsb,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct PendingWrite {
    lsb_received: bool,
    lsb: u8,
}

struct Counter {
    mode: u8,
    access: AccessMode,
    reload: u16,
    count: u16,
    output: bool,
    latch: Option<u16>,
    pending: Option<PendingWrite>,
    armed: bool,
}

impl Counter {
    fn new() -> Self {
        Counter {
            mode: 3,
            access: AccessMode::LsbThenMsb,
            reload: 0,
            count: 0,
            output: true,
            latch: None,
            pending: None,
            armed: false,
        }
    }

    fn set_control(&mut self, access: u8, mode: u8) {
        self.access = match access {
            0 => AccessMode::Latch,
            1 => AccessMode::Lsb,
            2 => AccessMode::Msb,
            _ => AccessMode::LsbThenMsb,
        };
        self.mode = mode;
        self.pending = None;
        self.armed = false;
    }

    fn latch_count(&mut self) {
        self.latch = Some(self.count);
    }

    fn write_data(&mut self, byte: u8) {
        match self.access {
            AccessMode::Lsb => self.reload_and_arm((self.reload & 0xFF00) | byte as u16),
            AccessMode::Msb => self.reload_and_arm((byte as u16) << 8),
            AccessMode::LsbThenMsb => match self.pending.take() {
                None => {
                    self.pending = Some(PendingWrite {
                        lsb_received: true,
                        lsb: byte,
                    });
                }
                Some(p) => {
                    let value = (p.lsb as u16) | ((byte as u16) << 8);
                    self.reload_and_arm(value);
                }
            },
            AccessMode::Latch => {}
        }
    }

    fn reload_and_arm(&mut self, value: u16) {
        self.reload = value;
        self.count = if value == 0 { 0x10000 - 1 } else { value };
        self.armed = true;
        self.output = matches!(self.mode, 2 | 3);
    }

    fn read_data(&mut self) -> u8 {
        if let Some(latched) = self.latch {
            let byte = match self.access {
                AccessMode::Msb => (latched >> 8) as u8,
                _ => (latched & 0xFF) as u8,
            };
            // A latched LSB-then-MSB read clears after the second byte;
            // this simplified model clears on any read for the common
            // single-byte access modes and after two reads otherwise.
            if matches!(self.access, AccessMode::Lsb | AccessMode::Msb) {
                self.latch = None;
            } else {
                self.latch = Some(latched >> 8);
            }
            byte
        } else {
            (self.count & 0xFF) as u8
        }
    }

    /// Advance by one PIT tick (1.193182 MHz in the real hardware; the
    /// tick rate itself is a clock-dispatch concern outside this module).
    /// Returns `true` exactly on the tick that should raise IRQ0.
    fn tick(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        if self.count == 0 {
            self.count = self.reload.max(1);
        }
        self.count -= 1;
        match self.mode {
            0 => {
                if self.count == 0 {
                    self.output = true;
                    true
                } else {
                    false
                }
            }
            2 => {
                if self.count == 0 {
                    self.count = self.reload.max(1);
                    true
                } else {
                    false
                }
            }
            3 => {
                if self.count == 0 {
                    self.output = !self.output;
                    self.count = self.reload.max(1);
                    self.output
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    fn output_level(&self) -> bool {
        self.output
    }
}

/// The three-counter 8253/8254 block at ports 0x40-0x43. Counter 0
/// drives IRQ0; counter 2's output is the PC speaker gate, readable
/// through chipset port 0x61 bit 5 (`spec.md` §9 open question).
pub struct Pit {
    counters: [Counter; 3],
}

impl Pit {
    pub fn new() -> Self {
        Pit {
            counters: [Counter::new(), Counter::new(), Counter::new()],
        }
    }

    pub fn write_control(&mut self, byte: u8) {
        let channel = (byte >> 6) & 0b11;
        let access = (byte >> 4) & 0b11;
        let mode = (byte >> 1) & 0b111;
        if channel == 3 {
            // Read-back command: not required by this subsystem's guest
            // software; ignored rather than guessed at.
            return;
        }
        if access == 0 {
            self.counters[channel as usize].latch_count();
        } else {
            trace!(channel, access, mode, "PIT counter reprogrammed");
            self.counters[channel as usize].set_control(access, mode);
        }
    }

    pub fn write_counter(&mut self, channel: u8, byte: u8) {
        self.counters[channel as usize].write_data(byte);
    }

    pub fn read_counter(&mut self, channel: u8) -> u8 {
        self.counters[channel as usize].read_data()
    }

    /// Advance every counter by one tick; returns whether counter 0 just
    /// asserted (IRQ0 should fire).
    pub fn tick(&mut self) -> bool {
        let c0 = self.counters[0].tick();
        self.counters[1].tick();
        self.counters[2].tick();
        c0
    }

    /// Counter 2's output level, used to derive chipset port 0x61 bit 5.
    pub fn counter2_output(&self) -> bool {
        self.counters[2].output_level()
    }
}

impl Default for Pit {
    fn default() -> Self {
        Self::new()
    }
}

fn access_to_u8(a: AccessMode) -> u8 {
    match a {
        AccessMode::Latch => 0,
        AccessMode::Lsb => 1,
        AccessMode::Msb => 2,
        AccessMode::LsbThenMsb => 3,
    }
}

fn access_from_u8(v: u8) -> AccessMode {
    match v {
        1 => AccessMode::Lsb,
        2 => AccessMode::Msb,
        3 => AccessMode::LsbThenMsb,
        _ => AccessMode::Latch,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
struct CounterWire {
    mode: u8,
    access: u8,
    reload: u16,
    count: u16,
    output: u8,
    armed: u8,
    latch_present: u8,
    latch: u16,
    pending_present: u8,
    pending_lsb: u8,
}

impl Counter {
    fn to_wire(&self) -> CounterWire {
        CounterWire {
            mode: self.mode,
            access: access_to_u8(self.access),
            reload: self.reload,
            count: self.count,
            output: self.output as u8,
            armed: self.armed as u8,
            latch_present: self.latch.is_some() as u8,
            latch: self.latch.unwrap_or(0),
            pending_present: self.pending.is_some() as u8,
            pending_lsb: self.pending.map(|p| p.lsb).unwrap_or(0),
        }
    }

    fn from_wire(wire: CounterWire) -> Self {
        Counter {
            mode: wire.mode,
            access: access_from_u8(wire.access),
            reload: wire.reload,
            count: wire.count,
            output: wire.output != 0,
            latch: (wire.latch_present != 0).then_some(wire.latch),
            pending: (wire.pending_present != 0).then_some(PendingWrite {
                lsb_received: true,
                lsb: wire.pending_lsb,
            }),
            armed: wire.armed != 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct PitWireState {
    counters: [CounterWire; 3],
}

impl Savable for Pit {
    type Wire = PitWireState;

    fn to_wire(&self) -> Self::Wire {
        PitWireState {
            counters: [
                self.counters[0].to_wire(),
                self.counters[1].to_wire(),
                self.counters[2].to_wire(),
            ],
        }
    }

    fn from_wire(&mut self, wire: Self::Wire) {
        for i in 0..3 {
            self.counters[i] = Counter::from_wire(wire.counters[i]);
        }
    }
}
