use bitflags::bitflags;
use es40_io_snapshot::Savable;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct LptStatus: u8 {
        const BUSY = 1 << 7;
        const ACK = 1 << 6;
        const PAPER_OUT = 1 << 5;
        const SELECT_IN = 1 << 4;
        const ERROR = 1 << 3;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct LptControl: u8 {
        const STROBE = 1 << 0;
        const AUTO_FEED = 1 << 1;
        const INIT = 1 << 2;
        const SELECT = 1 << 3;
        const IRQ_ENABLE = 1 << 4;
    }
}

/// A minimal parallel port (`spec.md` §6 legacy port map, 0x3BC-0x3BF):
/// data latch plus status/control registers. A byte is considered
/// "printed" (captured into `output`) on the falling edge of STROBE,
/// matching the Centronics handshake.
pub struct Lpt {
    data: u8,
    status: LptStatus,
    control: LptControl,
    output: Vec<u8>,
}

impl Lpt {
    pub fn new() -> Self {
        Lpt {
            data: 0,
            status: LptStatus::SELECT_IN,
            control: LptControl::empty(),
            output: Vec::new(),
        }
    }

    pub fn write_data(&mut self, byte: u8) {
        self.data = byte;
    }

    pub fn read_data(&self) -> u8 {
        self.data
    }

    pub fn write_control(&mut self, byte: u8) {
        let new = LptControl::from_bits_truncate(byte);
        let strobe_falling = self.control.contains(LptControl::STROBE) && !new.contains(LptControl::STROBE);
        self.control = new;
        if strobe_falling {
            self.output.push(self.data);
        }
    }

    pub fn read_control(&self) -> u8 {
        self.control.bits()
    }

    pub fn read_status(&self) -> u8 {
        self.status.bits()
    }

    /// Drain whatever bytes have been latched in since the last drain.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Default for Lpt {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the register-level state only; the host-side `output`
/// spool is a captured side effect (like a UART backend) rather than
/// architectural state, so it isn't part of the wire format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct LptWireState {
    data: u8,
    status: u8,
    control: u8,
}

impl Savable for Lpt {
    type Wire = LptWireState;

    fn to_wire(&self) -> Self::Wire {
        LptWireState {
            data: self.data,
            status: self.status.bits(),
            control: self.control.bits(),
        }
    }

    fn from_wire(&mut self, wire: Self::Wire) {
        self.data = wire.data;
        self.status = LptStatus::from_bits_truncate(wire.status);
        self.control = LptControl::from_bits_truncate(wire.control);
    }
}
