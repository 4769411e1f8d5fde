//! The block-device contract shared by the ATA and SCSI paths (`spec.md`
//! §6 "Block-device contract") and the geometry derivation it relies on.
//!
//! The disk image file format and raw block I/O are explicitly out of
//! scope (`spec.md` §1); this crate only specifies the seekable,
//! fixed-block-size contract and ships a couple of reference backends
//! (in-memory, and any `Read + Write + Seek`) so the IDE/SCSI crates have
//! something concrete to drive in their own tests.

mod geometry;
mod mem;
mod raw;

pub use geometry::Geometry;
pub use mem::MemBackend;
pub use raw::{GenericDisk, SeekableBackend};

use thiserror::Error;

pub const DEFAULT_BLOCK_SIZE: u32 = 512;
pub const CDROM_BLOCK_SIZE: u32 = 2048;

#[derive(Debug, Error)]
pub enum Error {
    #[error("lba {lba} out of range for a device with {total} blocks")]
    OutOfRange { lba: u64, total: u64 },
    #[error("device is read-only")]
    ReadOnly,
    #[error("requested transfer of {requested} blocks exceeds buffer of {available} blocks")]
    BufferTooSmall { requested: u32, available: usize },
    #[error("backing store error: {0}")]
    Backend(#[from] std::io::Error),
}

/// Seekable fixed-block storage, backing both the ATA and SCSI command
/// paths (`spec.md` §3 "BlockDevice").
pub trait BlockDevice: Send {
    fn seek_block(&mut self, lba: u64) -> Result<(), Error>;
    fn read_blocks(&mut self, buf: &mut [u8], n: u32) -> Result<(), Error>;
    fn write_blocks(&mut self, buf: &[u8], n: u32) -> Result<(), Error>;

    fn get_lba_size(&self) -> u64;
    fn get_block_size(&self) -> u32;
    /// Changes the logical block size and re-derives geometry (`spec.md`
    /// §3 invariant: "block size change must re-derive cylinders").
    fn set_block_size(&mut self, size: u32);

    fn get_cylinders(&self) -> u32;
    fn get_heads(&self) -> u32;
    fn get_sectors(&self) -> u32;

    fn cdrom(&self) -> bool;
    fn ro(&self) -> bool;

    fn get_serial(&self) -> &str;
    fn get_rev(&self) -> &str;
    fn get_model(&self) -> &str;
}

/// Truncates (never pads) a label to the documented maximum length,
/// matching the `spec.md` §3 limits on serial/revision/model strings.
pub(crate) fn clamp_label(s: &str, max_len: usize) -> String {
    s.chars().take(max_len).collect()
}

pub const SERIAL_MAX_LEN: usize = 20;
pub const REV_MAX_LEN: usize = 8;
pub const MODEL_MAX_LEN: usize = 40;
