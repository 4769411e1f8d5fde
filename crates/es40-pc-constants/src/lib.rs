//! Legacy port map, IRQ line numbers, and PCI identity constants shared
//! across the southbridge and its children (`spec.md` §6). A leaf crate
//! with no device logic, mirroring the teacher's own constants-only crate.

/// IRQ line numbers as seen by [`es40_interrupts::InterruptSink`] (flat
/// 0..=15, cascaded automatically above 8).
pub mod irq {
    pub const PIT: u8 = 0;
    pub const KEYBOARD: u8 = 1;
    pub const CASCADE: u8 = 2;
    pub const SERIAL2: u8 = 3;
    pub const SERIAL1: u8 = 4;
    pub const PARALLEL: u8 = 7;
    pub const RTC: u8 = 8;
    pub const MOUSE: u8 = 12;
    pub const IDE_PRIMARY: u8 = 14;
    pub const IDE_SECONDARY: u8 = 15;
}

/// Legacy I/O port ranges (`spec.md` §6 "Legacy port map").
pub mod ports {
    pub const PIC_MASTER: (u16, u16) = (0x020, 0x021);
    pub const PIC_SLAVE: (u16, u16) = (0x0A0, 0x0A1);
    pub const PIT: (u16, u16) = (0x040, 0x043);
    pub const KBD_DATA: u16 = 0x060;
    pub const KBD_COMMAND: u16 = 0x064;
    pub const MISC_SPEAKER: u16 = 0x061;
    pub const TOY: (u16, u16) = (0x070, 0x073);
    pub const DMA_LOW_PAGE: (u16, u16) = (0x080, 0x08F);
    pub const DMA_HIGH_PAGE: (u16, u16) = (0x480, 0x48F);
    pub const DMA_CONTROLLERS_LOW: (u16, u16) = (0x000, 0x00F);
    pub const DMA_CONTROLLERS_HIGH: (u16, u16) = (0x0C0, 0x0DF);
    pub const IDE_PRIMARY_CMD: u16 = 0x1F0;
    pub const IDE_PRIMARY_CTRL: u16 = 0x3F6;
    pub const IDE_SECONDARY_CMD: u16 = 0x170;
    pub const IDE_SECONDARY_CTRL: u16 = 0x376;
    pub const LPT: (u16, u16) = (0x3BC, 0x3BF);
    pub const UART1: u16 = 0x3F8;
    pub const UART2: u16 = 0x2F8;
    pub const PIC_EDGE_LEVEL: (u16, u16) = (0x4D0, 0x4D1);
    /// Bus-master IDE register windows. Real hardware has the PCI BIOS
    /// assign these dynamically through the IDE function's BAR4; this
    /// subsystem fixes them instead since the address-decode mechanism
    /// that would otherwise place them is out of scope (`spec.md` §6).
    pub const BUS_MASTER_PRIMARY: (u16, u16) = (0xC000, 0xC007);
    pub const BUS_MASTER_SECONDARY: (u16, u16) = (0xC008, 0xC00F);
}

/// PCI vendor/device IDs and class codes published by the core devices
/// (`spec.md` §6 "PCI config space").
pub mod pci {
    pub const ALI_M1543C_VENDOR_DEVICE: u32 = 0x1533_10B9;
    pub const ALI_M1543C_CLASS: u32 = 0x0601_00;
    pub const IDE_VENDOR_DEVICE: u32 = 0x5229_10B9;
    pub const IDE_CLASS: u32 = 0x0101_FA;
}
