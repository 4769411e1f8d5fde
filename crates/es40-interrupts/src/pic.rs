use es40_io_snapshot::Savable;
use tracing::trace;

/// ICW sequencing state for one PIC (`spec.md` §3 "Interrupt pair").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PicMode {
    Std,
    Init0,
    Init1,
    Init2,
}

#[derive(Copy, Clone, Debug)]
struct Bank {
    mode: PicMode,
    vector_base: u8,
    mask: u8,
    asserted: u8,
    edge_level: u8,
}

impl Bank {
    fn new() -> Self {
        Bank {
            mode: PicMode::Std,
            vector_base: 0,
            mask: 0,
            asserted: 0,
            edge_level: 0,
        }
    }
}

/// The 8259A master+slave pair (`spec.md` §4.1). `bank` 0 is the master,
/// `bank` 1 is the slave, cascaded on master line 2.
pub struct InterruptController {
    banks: [Bank; 2],
    /// Tracks the composite "master has any asserted bit" signal so the
    /// CPU line can be edge-triggered rather than polled every tick.
    cpu_line_asserted: bool,
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController {
    pub fn new() -> Self {
        InterruptController {
            banks: [Bank::new(), Bank::new()],
            cpu_line_asserted: false,
        }
    }

    /// Whether the CPU-facing interrupt line is currently raised.
    pub fn cpu_line(&self) -> bool {
        self.cpu_line_asserted
    }

    fn recompute_cpu_line(&mut self) {
        self.cpu_line_asserted = self.banks[0].asserted != 0;
    }

    pub fn read(&self, bank: usize, reg: usize) -> u8 {
        let b = &self.banks[bank];
        match reg {
            0 => b.asserted,
            1 => b.mask,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, bank: usize, reg: usize, byte: u8) {
        match reg {
            0 => self.write_reg0(bank, byte),
            1 => self.write_reg1(bank, byte),
            _ => {}
        }
        self.recompute_cpu_line();
    }

    fn write_reg0(&mut self, bank: usize, byte: u8) {
        if byte & 0x10 != 0 {
            // ICW1: enter the init sequence, store the vector base.
            let b = &mut self.banks[bank];
            b.mode = PicMode::Init0;
            b.vector_base = byte & 0xF8;
            b.mode = PicMode::Init1;
            return;
        }

        // Mid-ICW-sequence writes (ICW2/ICW3) land here in INIT1/INIT2;
        // they are accepted and discarded per spec.md §4.1.
        let mode = self.banks[bank].mode;
        match mode {
            PicMode::Init1 => {
                self.banks[bank].mode = PicMode::Init2;
                return;
            }
            PicMode::Init2 => {
                self.banks[bank].mode = PicMode::Std;
                return;
            }
            _ => {}
        }

        if byte & 0x08 == 0 {
            // OCW2.
            let op = (byte >> 5) & 7;
            let level = byte & 7;
            let b = &mut self.banks[bank];
            match op {
                1 => {
                    trace!(bank, "non-specific EOI");
                    b.asserted = 0;
                }
                3 => {
                    trace!(bank, level, "specific EOI");
                    b.asserted &= !(1 << level);
                }
                _ => {}
            }
            if bank == 1 && self.banks[1].asserted == 0 {
                // An EOI on the slave that empties it also clears IRQ2 on
                // the master (spec.md §4.1, §9 open question resolved: yes).
                self.banks[0].asserted &= !(1 << 2);
            }
        }
        // byte & 0x08 != 0 with bit 4 clear is an OCW3 read-command; no
        // readable state changes as a result (spec.md doesn't require us
        // to model the read-register-select bit beyond `read`).
    }

    fn write_reg1(&mut self, bank: usize, byte: u8) {
        if self.banks[bank].mode != PicMode::Std {
            return;
        }
        let b = &mut self.banks[bank];
        b.mask = byte;
        b.asserted &= !byte;
        drop(b);
        if bank == 1 && self.banks[1].asserted == 0 {
            self.banks[0].asserted &= !(1 << 2);
        }
    }

    /// Raises `line` on `bank`. A no-op if masked or already asserted.
    /// Cascades slave assertions through master line 2.
    pub fn interrupt(&mut self, bank: usize, line: u8) {
        let bit = 1u8 << line;
        let b = &mut self.banks[bank];
        if b.mask & bit != 0 || b.asserted & bit != 0 {
            return;
        }
        b.asserted |= bit;
        if bank == 1 {
            self.interrupt(0, 2);
        }
        self.recompute_cpu_line();
    }

    pub fn deassert(&mut self, bank: usize, line: u8) {
        let bit = 1u8 << line;
        self.banks[bank].asserted &= !bit;
        if bank == 1 && self.banks[1].asserted == 0 {
            self.banks[0].asserted &= !(1 << 2);
        }
        self.recompute_cpu_line();
    }

    /// Interrupt-acknowledge: returns the vector of the lowest-numbered
    /// asserted bit on the master, descending into the slave through IRQ2.
    pub fn iack(&self) -> u8 {
        let master = &self.banks[0];
        let lowest = master.asserted.trailing_zeros() as u8;
        if lowest == 2 && master.asserted & (1 << 2) != 0 {
            let slave = &self.banks[1];
            let slowest = slave.asserted.trailing_zeros() as u8;
            return slave.vector_base.wrapping_add(slowest);
        }
        master.vector_base.wrapping_add(lowest)
    }

    pub fn edge_level(&self, bank: usize) -> u8 {
        self.banks[bank].edge_level
    }

    pub fn write_edge_level(&mut self, bank: usize, byte: u8) {
        self.banks[bank].edge_level = byte;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct PicWireState {
    mode: [u8; 2],
    vector_base: [u8; 2],
    mask: [u8; 2],
    asserted: [u8; 2],
    edge_level: [u8; 2],
    cpu_line_asserted: u8,
}

fn mode_to_u8(m: PicMode) -> u8 {
    match m {
        PicMode::Std => 0,
        PicMode::Init0 => 1,
        PicMode::Init1 => 2,
        PicMode::Init2 => 3,
    }
}

fn mode_from_u8(v: u8) -> PicMode {
    match v {
        1 => PicMode::Init0,
        2 => PicMode::Init1,
        3 => PicMode::Init2,
        _ => PicMode::Std,
    }
}

impl Savable for InterruptController {
    type Wire = PicWireState;

    fn to_wire(&self) -> PicWireState {
        PicWireState {
            mode: [
                mode_to_u8(self.banks[0].mode),
                mode_to_u8(self.banks[1].mode),
            ],
            vector_base: [self.banks[0].vector_base, self.banks[1].vector_base],
            mask: [self.banks[0].mask, self.banks[1].mask],
            asserted: [self.banks[0].asserted, self.banks[1].asserted],
            edge_level: [self.banks[0].edge_level, self.banks[1].edge_level],
            cpu_line_asserted: self.cpu_line_asserted as u8,
        }
    }

    fn from_wire(&mut self, wire: PicWireState) {
        for i in 0..2 {
            self.banks[i].mode = mode_from_u8(wire.mode[i]);
            self.banks[i].vector_base = wire.vector_base[i];
            self.banks[i].mask = wire.mask[i];
            self.banks[i].asserted = wire.asserted[i];
            self.banks[i].edge_level = wire.edge_level[i];
        }
        self.cpu_line_asserted = wire.cpu_line_asserted != 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_std(pic: &mut InterruptController, bank: usize) {
        pic.write(bank, 1, 0x00); // leave in STD mode with a clear mask
    }

    #[test]
    fn slave_cascade_asserts_master_irq2_and_iack_descends() {
        let mut pic = InterruptController::new();
        init_std(&mut pic, 0);
        init_std(&mut pic, 1);

        pic.interrupt(1, 10);

        assert_eq!(pic.read(0, 0) & (1 << 2), 1 << 2);
        assert_eq!(pic.iack(), 10); // slave vector_base defaults to 0

        // Non-specific EOI on both clears everything.
        pic.write(1, 0, 0x20);
        pic.write(0, 0, 0x20);
        assert_eq!(pic.read(0, 0), 0);
        assert_eq!(pic.read(1, 0), 0);
    }

    #[test]
    fn masked_line_does_not_assert() {
        let mut pic = InterruptController::new();
        pic.write(0, 1, 0x01); // mask bit 0
        pic.interrupt(0, 0);
        assert_eq!(pic.read(0, 0), 0);
    }

    #[test]
    fn masking_an_already_asserted_line_clears_it() {
        let mut pic = InterruptController::new();
        pic.interrupt(0, 3);
        assert_ne!(pic.read(0, 0) & (1 << 3), 0);
        pic.write(0, 1, 1 << 3);
        assert_eq!(pic.read(0, 0) & (1 << 3), 0);
    }

    #[test]
    fn cpu_line_follows_master_asserted_transitions() {
        let mut pic = InterruptController::new();
        assert!(!pic.cpu_line());
        pic.interrupt(0, 5);
        assert!(pic.cpu_line());
        pic.deassert(0, 5);
        assert!(!pic.cpu_line());
    }

    #[test]
    fn icw_sequence_stores_masked_vector_base() {
        let mut pic = InterruptController::new();
        pic.write(0, 0, 0x11); // ICW1
        pic.write(0, 0, 0x20); // ICW2 (vector base byte, discarded as a write target but consumed)
        pic.write(0, 0, 0x04); // ICW3 (discarded)
        // vector_base was captured from ICW1's own byte (masked to 0xF8).
        pic.interrupt(0, 0);
        assert_eq!(pic.iack(), 0x11 & 0xF8);
    }

    #[test]
    fn save_restore_round_trips() {
        let mut pic = InterruptController::new();
        pic.interrupt(1, 4);
        let wire = pic.to_wire();
        let mut restored = InterruptController::new();
        restored.from_wire(wire);
        assert_eq!(restored.to_wire(), wire);
        assert_ne!(restored.read(0, 0) & (1 << 2), 0);
    }
}
