#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no drive attached on this channel")]
    NoDrive,
    #[error("unsupported ATA command 0x{0:02X}")]
    UnsupportedCommand(u8),
    #[error("unsupported SCSI opcode 0x{0:02X}")]
    UnsupportedScsiOpcode(u8),
    #[error("storage backend error: {0}")]
    Storage(#[from] es40_storage::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] es40_io_snapshot::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
