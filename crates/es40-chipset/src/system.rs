//! The top-level assembly (`spec.md` §4.8, §6): the southbridge's legacy
//! I/O, two IDE channels, the pair of 16550 UARTs, and the PCI identity
//! registers the ALi M1543C southbridge and its IDE function publish,
//! driven by a single `tick()` in the fixed order the spec lays out.

use es40_devices_storage::{DriveSelect, GuestMemory, IdeChannel};
use es40_interrupts::SharedPic;
use es40_pc_constants::{irq, ports, pci};

use crate::pci::PciConfigSpace;
use crate::southbridge::Southbridge;
use crate::uart::{NullBackend, SerialBackend, Uart};

/// Which IDE channel a call addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IdeChannelId {
    Primary,
    Secondary,
}

/// Which of the two serial ports a call addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UartId {
    Uart1,
    Uart2,
}

/// Everything the rest of the emulator drives through one ordered
/// `tick()` and one flat port-I/O surface: the southbridge (PIC/PIT/TOY/
/// 8042/DMA/LPT), both IDE channels with their bus-master engines, the
/// two serial ports, and the PCI configuration space each PCI-visible
/// function publishes.
pub struct System {
    pub pic: SharedPic,
    pub southbridge: Southbridge,
    pub ide_primary: IdeChannel,
    pub ide_secondary: IdeChannel,
    pub uart1: Uart,
    pub uart2: Uart,
    pub pci_southbridge: PciConfigSpace,
    pub pci_ide: PciConfigSpace,
}

impl System {
    pub fn new() -> Self {
        let pic = es40_interrupts::new_shared_pic();
        let southbridge = Southbridge::new(pic.clone());

        let pci_southbridge = PciConfigSpace::new(pci::ALI_M1543C_VENDOR_DEVICE, pci::ALI_M1543C_CLASS);

        let mut pci_ide = PciConfigSpace::new(pci::IDE_VENDOR_DEVICE, pci::IDE_CLASS);
        // BAR4: bus-master I/O base, 16-byte aligned.
        pci_ide.set_writable(4, 0xFFFF_FFF0);
        pci_ide.set_word(4, (ports::BUS_MASTER_PRIMARY.0 as u32) | 1);

        System {
            pic,
            southbridge,
            ide_primary: IdeChannel::new(),
            ide_secondary: IdeChannel::new(),
            uart1: Uart::new(Box::new(NullBackend)),
            uart2: Uart::new(Box::new(NullBackend)),
            pci_southbridge,
            pci_ide,
        }
    }

    pub fn attach_drive(
        &mut self,
        channel: IdeChannelId,
        select: DriveSelect,
        drive: es40_devices_storage::AtaDrive,
    ) {
        match channel {
            IdeChannelId::Primary => self.ide_primary.attach(select, drive),
            IdeChannelId::Secondary => self.ide_secondary.attach(select, drive),
        }
    }

    pub fn set_serial_backend(&mut self, which: UartId, backend: Box<dyn SerialBackend>) {
        match which {
            UartId::Uart1 => self.uart1 = Uart::new(backend),
            UartId::Uart2 => self.uart2 = Uart::new(backend),
        }
    }

    fn ide_channel(&mut self, id: IdeChannelId) -> &mut IdeChannel {
        match id {
            IdeChannelId::Primary => &mut self.ide_primary,
            IdeChannelId::Secondary => &mut self.ide_secondary,
        }
    }

    fn ide_command_block(port: u16) -> Option<(IdeChannelId, u16)> {
        if (ports::IDE_PRIMARY_CMD..ports::IDE_PRIMARY_CMD + 8).contains(&port) {
            Some((IdeChannelId::Primary, port - ports::IDE_PRIMARY_CMD))
        } else if (ports::IDE_SECONDARY_CMD..ports::IDE_SECONDARY_CMD + 8).contains(&port) {
            Some((IdeChannelId::Secondary, port - ports::IDE_SECONDARY_CMD))
        } else {
            None
        }
    }

    fn bus_master_block(port: u16) -> Option<(IdeChannelId, u16)> {
        if (ports::BUS_MASTER_PRIMARY.0..=ports::BUS_MASTER_PRIMARY.1).contains(&port) {
            Some((IdeChannelId::Primary, port - ports::BUS_MASTER_PRIMARY.0))
        } else if (ports::BUS_MASTER_SECONDARY.0..=ports::BUS_MASTER_SECONDARY.1).contains(&port) {
            Some((IdeChannelId::Secondary, port - ports::BUS_MASTER_SECONDARY.0))
        } else {
            None
        }
    }

    /// Read a byte from anywhere in the flat legacy port space this
    /// subsystem decodes: the southbridge's own ports, both IDE command/
    /// control/bus-master blocks, and the two UARTs.
    pub fn read_port(&mut self, port: u16) -> Option<u8> {
        if let Some(byte) = self.southbridge.read_port(port) {
            return Some(byte);
        }
        if let Some((id, offset)) = Self::ide_command_block(port) {
            return Some(self.ide_channel(id).read_register(offset));
        }
        if port == ports::IDE_PRIMARY_CTRL {
            return Some(self.ide_primary.read_alt_status());
        }
        if port == ports::IDE_SECONDARY_CTRL {
            return Some(self.ide_secondary.read_alt_status());
        }
        if let Some((id, offset)) = Self::bus_master_block(port) {
            return Some(match offset {
                0 => self.ide_channel(id).bus_master.command,
                2 => self.ide_channel(id).bus_master.status,
                4..=7 => {
                    let shift = (offset - 4) * 8;
                    ((self.ide_channel(id).bus_master.prd_table_address >> shift as u32) & 0xFF) as u8
                }
                _ => 0xFF,
            });
        }
        if (ports::UART1..ports::UART1 + 8).contains(&port) {
            return Some(self.uart1.read_port(port - ports::UART1));
        }
        if (ports::UART2..ports::UART2 + 8).contains(&port) {
            return Some(self.uart2.read_port(port - ports::UART2));
        }
        None
    }

    /// Write a byte anywhere in the flat legacy port space. `mem` backs
    /// the bus-master engine's PRD-table walk and transfer for whichever
    /// IDE channel the guest starts a DMA command on; it goes unused for
    /// every other port (`spec.md` §6: system bus addressing is an
    /// external collaborator this subsystem only names a contract for).
    pub fn write_port(&mut self, port: u16, value: u8, mem: &mut dyn GuestMemory) -> bool {
        if self.southbridge.write_port(port, value) {
            return true;
        }
        if let Some((id, offset)) = Self::ide_command_block(port) {
            if offset == 0 {
                // Data register writes are word-wide; callers driving
                // 16-bit I/O should prefer `write_data` directly.
                self.ide_channel(id).write_data(value as u16);
            } else {
                self.ide_channel(id).write_register(offset, value);
            }
            return true;
        }
        if port == ports::IDE_PRIMARY_CTRL {
            self.ide_primary.write_device_control(value);
            return true;
        }
        if port == ports::IDE_SECONDARY_CTRL {
            self.ide_secondary.write_device_control(value);
            return true;
        }
        if let Some((id, offset)) = Self::bus_master_block(port) {
            match offset {
                0 => self.ide_channel(id).write_bus_master_command(value, mem),
                2 => self.ide_channel(id).write_bus_master_status(value),
                4..=7 => {
                    let shift = ((offset - 4) * 8) as u8;
                    self.ide_channel(id).write_bus_master_prd_address(shift, value)
                }
                _ => {}
            }
            return true;
        }
        if (ports::UART1..ports::UART1 + 8).contains(&port) {
            self.uart1.write_port(port - ports::UART1, value);
            return true;
        }
        if (ports::UART2..ports::UART2 + 8).contains(&port) {
            self.uart2.write_port(port - ports::UART2, value);
            return true;
        }
        false
    }

    /// Advance every clocked device exactly once, in the fixed order
    /// `spec.md` §4.8 lays out: (1) the keyboard/mouse periodic scan and
    /// (2) the PIT, both via the southbridge; (3) the UARTs' RX poll;
    /// (4) each IDE channel's staged command; then collapsing each
    /// channel's resulting command-completion interrupt onto the PIC.
    /// The SCSI target behind an ATAPI transport never yields mid-tick on
    /// its own — its DP34 re-entry point is driven by the host's own PIO
    /// reads/writes of the data port, not by this loop — so step 5's
    /// "advance it if anything yielded" has no separate call here.
    pub fn tick(&mut self) {
        self.southbridge.tick();

        if self.uart1.poll_backend() {
            self.assert_irq(irq::SERIAL1);
        }
        if self.uart2.poll_backend() {
            self.assert_irq(irq::SERIAL2);
        }

        self.ide_primary.tick();
        self.ide_secondary.tick();

        self.collapse_ide_interrupt(IdeChannelId::Primary, irq::IDE_PRIMARY);
        self.collapse_ide_interrupt(IdeChannelId::Secondary, irq::IDE_SECONDARY);
    }

    /// Raises a flat 0..=15 IRQ line on whichever bank it belongs to,
    /// cascading through the slave the same way `PicIrqSink` does for the
    /// 8042 (`spec.md` §4.1).
    fn assert_irq(&mut self, line: u8) {
        let (bank, bit) = if line < 8 { (0, line) } else { (1, line - 8) };
        self.pic.lock().interrupt(bank, bit);
    }

    fn collapse_ide_interrupt(&mut self, id: IdeChannelId, line: u8) {
        let (pending, enabled) = {
            let channel = self.ide_channel(id);
            let pending = channel.irq_pending;
            channel.irq_pending = false;
            (pending, channel.interrupts_enabled())
        };
        if pending && enabled {
            self.assert_irq(line);
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}
