//! Legacy I/O dispatcher hosting the PIC, PIT, TOY/CMOS, 8042 keyboard
//! controller, DMA pair, and parallel port behind the flat port space a
//! real PC motherboard exposes (`spec.md` §6).

use es40_devices_input::I8042Controller;
use es40_interrupts::SharedPic;
use es40_pc_constants::{irq, ports};

use crate::dma8237::{DmaController, DmaCtrl};
use crate::lpt::Lpt;
use crate::pit::Pit;
use crate::toy::Toy;

/// Decodes one of the sixteen internal 8237A register offsets shared by
/// both controllers (`spec.md` §6): channel address/count pairs at
/// 0-7, then command/mask/mode control registers at 8 and above. The
/// secondary controller's 16-bit channels sit on even port addresses
/// only, so callers halve its raw port offset before reaching here.
fn read_dma_controller(ctrl: &mut DmaController, internal_offset: u16) -> u8 {
    match internal_offset {
        0 | 2 | 4 | 6 => ctrl.read_address((internal_offset / 2) as usize),
        1 | 3 | 5 | 7 => ctrl.read_count((internal_offset / 2) as usize),
        8 => ctrl.read_status(),
        _ => 0xFF,
    }
}

fn write_dma_controller(ctrl: &mut DmaController, internal_offset: u16, value: u8) {
    match internal_offset {
        0 | 2 | 4 | 6 => ctrl.write_address((internal_offset / 2) as usize, value),
        1 | 3 | 5 | 7 => ctrl.write_count((internal_offset / 2) as usize, value),
        8 => ctrl.write_command(value),
        0xA => ctrl.write_single_mask(value),
        0xB => ctrl.write_mode(value),
        0xD => ctrl.master_clear(),
        0xF => ctrl.write_all_mask(value),
        _ => {}
    }
}

struct PicIrqSink {
    pic: SharedPic,
}

impl es40_devices_input::IrqSink for PicIrqSink {
    fn raise_irq(&mut self, line: u8) {
        let mut pic = self.pic.lock();
        pic.interrupt(if line >= 8 { 1 } else { 0 }, line % 8);
    }
}

pub struct Southbridge {
    pub pic: SharedPic,
    pub pit: Pit,
    pub toy: Toy,
    pub kbd: I8042Controller,
    pub dma: DmaCtrl,
    pub lpt: Lpt,
}

impl Southbridge {
    pub fn new(pic: SharedPic) -> Self {
        let mut kbd = I8042Controller::new();
        kbd.set_irq_sink(Box::new(PicIrqSink { pic: pic.clone() }));
        Southbridge {
            pic,
            pit: Pit::new(),
            toy: Toy::new(),
            kbd,
            dma: DmaCtrl::new(),
            lpt: Lpt::new(),
        }
    }

    /// Read a legacy I/O port decoded directly by the southbridge (not
    /// the IDE/UART ports, which the system dispatches to their own
    /// devices). Returns `None` if this port isn't one of them.
    pub fn read_port(&mut self, port: u16) -> Option<u8> {
        Some(match port {
            p if p == ports::PIC_MASTER.0 || p == ports::PIC_MASTER.1 => {
                let reg = (p - ports::PIC_MASTER.0) as usize;
                self.pic.lock().read(0, reg)
            }
            p if p == ports::PIC_SLAVE.0 || p == ports::PIC_SLAVE.1 => {
                let reg = (p - ports::PIC_SLAVE.0) as usize;
                self.pic.lock().read(1, reg)
            }
            p if (ports::PIT.0..ports::PIT.1).contains(&p) => {
                self.pit.read_counter((p - ports::PIT.0) as u8)
            }
            ports::KBD_DATA => self.kbd.read_port(ports::KBD_DATA),
            ports::KBD_COMMAND => self.kbd.read_port(ports::KBD_COMMAND),
            ports::MISC_SPEAKER => self.read_port_61(),
            p if p == ports::TOY.0 + 1 => self.toy.read_data(),
            p if p == ports::TOY.0 + 3 => self.toy.read_ext_data(),
            p if (ports::DMA_LOW_PAGE.0..=ports::DMA_LOW_PAGE.1).contains(&p) => {
                self.dma.primary.read_page(((p - ports::DMA_LOW_PAGE.0) % 4) as usize)
            }
            p if (ports::DMA_HIGH_PAGE.0..=ports::DMA_HIGH_PAGE.1).contains(&p) => {
                self.dma.secondary.read_page(((p - ports::DMA_HIGH_PAGE.0) % 4) as usize)
            }
            p if (ports::DMA_CONTROLLERS_LOW.0..=ports::DMA_CONTROLLERS_LOW.1).contains(&p) => {
                read_dma_controller(&mut self.dma.primary, p - ports::DMA_CONTROLLERS_LOW.0)
            }
            p if (ports::DMA_CONTROLLERS_HIGH.0..=ports::DMA_CONTROLLERS_HIGH.1).contains(&p) => {
                read_dma_controller(&mut self.dma.secondary, (p - ports::DMA_CONTROLLERS_HIGH.0) / 2)
            }
            p if p == ports::PIC_EDGE_LEVEL.0 => self.pic.lock().edge_level(0),
            p if p == ports::PIC_EDGE_LEVEL.1 => self.pic.lock().edge_level(1),
            p if (ports::LPT.0..=ports::LPT.1).contains(&p) => {
                self.read_lpt(p - ports::LPT.0)
            }
            _ => return None,
        })
    }

    pub fn write_port(&mut self, port: u16, value: u8) -> bool {
        match port {
            p if p == ports::PIC_MASTER.0 || p == ports::PIC_MASTER.1 => {
                let reg = (p - ports::PIC_MASTER.0) as usize;
                self.pic.lock().write(0, reg, value);
            }
            p if p == ports::PIC_SLAVE.0 || p == ports::PIC_SLAVE.1 => {
                let reg = (p - ports::PIC_SLAVE.0) as usize;
                self.pic.lock().write(1, reg, value);
            }
            p if p == ports::PIT.0 + 3 => self.pit.write_control(value),
            p if (ports::PIT.0..ports::PIT.0 + 3).contains(&p) => {
                self.pit.write_counter((p - ports::PIT.0) as u8, value)
            }
            ports::KBD_DATA => self.kbd.write_port(ports::KBD_DATA, value),
            ports::KBD_COMMAND => self.kbd.write_port(ports::KBD_COMMAND, value),
            p if p == ports::TOY.0 => self.toy.write_index(value),
            p if p == ports::TOY.0 + 1 => self.toy.write_data(value),
            p if p == ports::TOY.0 + 2 => self.toy.write_ext_index(value),
            p if p == ports::TOY.0 + 3 => self.toy.write_ext_data(value),
            p if (ports::DMA_LOW_PAGE.0..=ports::DMA_LOW_PAGE.1).contains(&p) => {
                self.dma.primary.write_page(((p - ports::DMA_LOW_PAGE.0) % 4) as usize, value)
            }
            p if (ports::DMA_HIGH_PAGE.0..=ports::DMA_HIGH_PAGE.1).contains(&p) => {
                self.dma.secondary.write_page(((p - ports::DMA_HIGH_PAGE.0) % 4) as usize, value)
            }
            p if (ports::DMA_CONTROLLERS_LOW.0..=ports::DMA_CONTROLLERS_LOW.1).contains(&p) => {
                write_dma_controller(&mut self.dma.primary, p - ports::DMA_CONTROLLERS_LOW.0, value)
            }
            p if (ports::DMA_CONTROLLERS_HIGH.0..=ports::DMA_CONTROLLERS_HIGH.1).contains(&p) => {
                write_dma_controller(&mut self.dma.secondary, (p - ports::DMA_CONTROLLERS_HIGH.0) / 2, value)
            }
            p if p == ports::PIC_EDGE_LEVEL.0 => self.pic.lock().write_edge_level(0, value),
            p if p == ports::PIC_EDGE_LEVEL.1 => self.pic.lock().write_edge_level(1, value),
            p if (ports::LPT.0..=ports::LPT.1).contains(&p) => {
                self.write_lpt(p - ports::LPT.0, value)
            }
            _ => return false,
        }
        true
    }

    fn read_port_61(&self) -> u8 {
        let mut byte = 0u8;
        if self.pit.counter2_output() {
            byte |= 1 << 5;
        }
        byte
    }

    fn read_lpt(&mut self, offset: u16) -> u8 {
        match offset {
            0 => self.lpt.read_data(),
            1 => self.lpt.read_status(),
            2 => self.lpt.read_control(),
            _ => 0xFF,
        }
    }

    fn write_lpt(&mut self, offset: u16, value: u8) {
        match offset {
            0 => self.lpt.write_data(value),
            2 => self.lpt.write_control(value),
            _ => {}
        }
    }

    /// Advance every device that runs off the system clock, in the fixed
    /// order `spec.md` §4.8 specifies: the keyboard/mouse periodic scan
    /// first (it promotes queued bytes into the 8042's output buffers and
    /// raises IRQ1/IRQ12 on its own), then the PIT (it drives IRQ0), then
    /// the TOY's UIP cadence.
    pub fn tick(&mut self) {
        self.kbd.tick();
        if self.pit.tick() {
            self.pic.lock().interrupt(0, irq::PIT);
        }
        self.toy.tick();
    }
}
