//! 16550-compatible UART (`spec.md` §6 legacy port map, ports 0x3F8/0x2F8)
//! with a pluggable [`SerialBackend`] so the byte stream can be routed to
//! a network socket, a file, or nothing at all — none of which this
//! crate needs to know about.

use std::collections::VecDeque;
use std::io;

use bitflags::bitflags;
use es40_io_snapshot::Savable;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        const DATA_READY = 1 << 0;
        const OVERRUN_ERROR = 1 << 1;
        const PARITY_ERROR = 1 << 2;
        const FRAMING_ERROR = 1 << 3;
        const BREAK_INTERRUPT = 1 << 4;
        const THR_EMPTY = 1 << 5;
        const TRANSMITTER_EMPTY = 1 << 6;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct InterruptEnable: u8 {
        const RX_DATA_AVAILABLE = 1 << 0;
        const THR_EMPTY = 1 << 1;
        const LINE_STATUS = 1 << 2;
        const MODEM_STATUS = 1 << 3;
    }
}

/// `spec.md` §3 Data Model: "1024-byte receive FIFO with head/tail
/// indices and count".
const RX_FIFO_CAPACITY: usize = 1024;

/// The byte-stream endpoint a UART is wired to. `try_read` is polled
/// once per chipset tick; `write` is called synchronously on THR writes.
pub trait SerialBackend: Send {
    fn try_read(&mut self) -> Option<u8>;
    fn write(&mut self, byte: u8) -> io::Result<()>;
}

/// A backend that discards everything written and never has input,
/// standing in for an unconnected port.
pub struct NullBackend;

impl SerialBackend for NullBackend {
    fn try_read(&mut self) -> Option<u8> {
        None
    }

    fn write(&mut self, _byte: u8) -> io::Result<()> {
        Ok(())
    }
}

pub struct Uart {
    rx_fifo: VecDeque<u8>,
    ier: InterruptEnable,
    lcr: u8,
    mcr: u8,
    divisor: u16,
    backend: Box<dyn SerialBackend>,
}

impl Uart {
    pub fn new(backend: Box<dyn SerialBackend>) -> Self {
        Uart {
            rx_fifo: VecDeque::with_capacity(RX_FIFO_CAPACITY),
            ier: InterruptEnable::empty(),
            lcr: 0,
            mcr: 0,
            divisor: 1,
            backend,
        }
    }

    fn dlab(&self) -> bool {
        self.lcr & 0x80 != 0
    }

    pub fn write_port(&mut self, offset: u16, value: u8) {
        match offset {
            0 if self.dlab() => self.divisor = (self.divisor & 0xFF00) | value as u16,
            1 if self.dlab() => self.divisor = (self.divisor & 0x00FF) | ((value as u16) << 8),
            0 => {
                let _ = self.backend.write(value);
            }
            1 => self.ier = InterruptEnable::from_bits_truncate(value),
            2 => {} // FCR: FIFO control, no-op beyond fixed 16-byte RX FIFO.
            3 => self.lcr = value,
            4 => self.mcr = value,
            _ => {}
        }
    }

    pub fn read_port(&mut self, offset: u16) -> u8 {
        match offset {
            0 if self.dlab() => (self.divisor & 0xFF) as u8,
            1 if self.dlab() => (self.divisor >> 8) as u8,
            0 => self.rx_fifo.pop_front().unwrap_or(0),
            1 => self.ier.bits(),
            2 => 0xC1, // IIR: FIFOs enabled, no interrupt pending.
            3 => self.lcr,
            4 => self.mcr,
            5 => self.line_status().bits(),
            6 => 0x00, // MSR: no modem lines wired up.
            7 => 0,
            _ => 0xFF,
        }
    }

    fn line_status(&self) -> LineStatus {
        let mut s = LineStatus::THR_EMPTY | LineStatus::TRANSMITTER_EMPTY;
        if !self.rx_fifo.is_empty() {
            s |= LineStatus::DATA_READY;
        }
        s
    }

    /// Pull any pending input from the backend into the RX FIFO, dropping
    /// bytes (overrun) once the FIFO is full. Called once per chipset
    /// tick.
    pub fn poll_backend(&mut self) -> bool {
        let mut raised = false;
        while self.rx_fifo.len() < RX_FIFO_CAPACITY {
            match self.backend.try_read() {
                Some(byte) => {
                    self.rx_fifo.push_back(byte);
                    raised = true;
                }
                None => break,
            }
        }
        raised && self.ier.contains(InterruptEnable::RX_DATA_AVAILABLE)
    }
}

/// Savable snapshot of the register state only; the boxed [`SerialBackend`]
/// is a host-side collaborator (a socket, a file) rather than architectural
/// state, so it is rebuilt by the caller and never part of the wire format.
/// The RX FIFO is flattened into a fixed-size 1024-byte slot per `spec.md`
/// §3's Data Model.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UartWireState {
    ier: u8,
    lcr: u8,
    mcr: u8,
    divisor: u16,
    rx_len: u16,
    rx_bytes: [u8; RX_FIFO_CAPACITY],
}

impl Savable for Uart {
    type Wire = UartWireState;

    fn to_wire(&self) -> Self::Wire {
        let mut rx_bytes = [0u8; RX_FIFO_CAPACITY];
        let mut rx_len = 0u16;
        for &b in self.rx_fifo.iter() {
            rx_bytes[rx_len as usize] = b;
            rx_len += 1;
        }
        UartWireState {
            ier: self.ier.bits(),
            lcr: self.lcr,
            mcr: self.mcr,
            divisor: self.divisor,
            rx_len,
            rx_bytes,
        }
    }

    fn from_wire(&mut self, wire: Self::Wire) {
        self.ier = InterruptEnable::from_bits_truncate(wire.ier);
        self.lcr = wire.lcr;
        self.mcr = wire.mcr;
        self.divisor = wire.divisor;
        self.rx_fifo.clear();
        self.rx_fifo
            .extend(wire.rx_bytes[..wire.rx_len as usize].iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LoopbackBackend {
        pending: VecDeque<u8>,
    }

    impl SerialBackend for LoopbackBackend {
        fn try_read(&mut self) -> Option<u8> {
            self.pending.pop_front()
        }

        fn write(&mut self, byte: u8) -> io::Result<()> {
            self.pending.push_back(byte);
            Ok(())
        }
    }

    #[test]
    fn divisor_latch_round_trips_when_dlab_is_set() {
        let mut uart = Uart::new(Box::new(NullBackend));
        uart.write_port(3, 0x80); // set DLAB.
        uart.write_port(0, 0x01);
        uart.write_port(1, 0x00);
        assert_eq!(uart.read_port(0), 0x01);
        assert_eq!(uart.read_port(1), 0x00);
    }

    #[test]
    fn data_ready_bit_tracks_the_rx_fifo() {
        let mut uart = Uart::new(Box::new(LoopbackBackend {
            pending: VecDeque::from(vec![b'X']),
        }));
        assert_eq!(uart.read_port(5) & 0x01, 0);
        uart.poll_backend();
        assert_eq!(uart.read_port(5) & 0x01, 0x01);
        assert_eq!(uart.read_port(0), b'X');
        assert_eq!(uart.read_port(5) & 0x01, 0);
    }

    #[test]
    fn rx_fifo_caps_at_one_thousand_and_twenty_four_bytes() {
        let mut uart = Uart::new(Box::new(LoopbackBackend {
            pending: (0..2000u32).map(|b| b as u8).collect(),
        }));
        uart.poll_backend();
        assert_eq!(uart.rx_fifo.len(), RX_FIFO_CAPACITY);
    }

    #[test]
    fn thr_write_reaches_the_backend() {
        let mut uart = Uart::new(Box::new(LoopbackBackend {
            pending: VecDeque::new(),
        }));
        uart.write_port(0, b'Y');
        uart.poll_backend();
        assert_eq!(uart.read_port(0), b'Y');
    }

    #[test]
    fn snapshot_round_trip_preserves_registers_and_rx_fifo() {
        let mut uart = Uart::new(Box::new(LoopbackBackend {
            pending: VecDeque::from(vec![b'A', b'B']),
        }));
        uart.write_port(1, InterruptEnable::RX_DATA_AVAILABLE.bits());
        uart.write_port(3, 0x03);
        uart.poll_backend();
        let wire = uart.to_wire();
        let mut restored = Uart::new(Box::new(NullBackend));
        restored.from_wire(wire);
        assert_eq!(restored.read_port(1), InterruptEnable::RX_DATA_AVAILABLE.bits());
        assert_eq!(restored.read_port(3), 0x03);
        assert_eq!(restored.read_port(0), b'A');
        assert_eq!(restored.read_port(0), b'B');
    }
}
