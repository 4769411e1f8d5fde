//! ATA/ATAPI task-file registers, command dispatch, bus-master DMA, and
//! the SCSI command set an ATAPI CD-ROM exposes through it (`spec.md`
//! §4.5-§4.6).

pub mod atapi;
pub mod controller;
pub mod dma;
pub mod drive;
mod error;
pub mod identify;
pub mod scsi;
pub mod taskfile;

pub use controller::{DriveSelect, IdeChannel};
pub use dma::{BusMasterChannel, DmaOutcome, GuestMemory};
pub use drive::{AtaDrive, DriveKind};
pub use error::{Error, Result};
