//! The ALi M1543C-class southbridge and the system-level glue around it
//! (`spec.md` §2, §4.8, §9): PIC/PIT/TOY/8042/DMA/LPT legacy I/O, the
//! 16550 UART(s), a generic PCI configuration-space register file, and
//! the [`System`] that assembles all of the above plus the IDE channels
//! into the single ordered `tick()` the rest of the emulator drives.

pub mod dma8237;
pub mod error;
pub mod lock;
pub mod lpt;
pub mod pci;
pub mod pit;
pub mod southbridge;
pub mod system;
pub mod toy;
pub mod uart;

pub use error::{Error, Result};
pub use lock::NamedMutex;
pub use pci::PciConfigSpace;
pub use southbridge::Southbridge;
pub use system::{IdeChannelId, System, UartId};
