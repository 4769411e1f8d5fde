#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("timed out waiting for the \"{name}\" lock")]
    LockTimeout { name: &'static str },
    #[error("port 0x{port:04X} is not decoded by this chipset")]
    UnmappedPort { port: u16 },
    #[error("storage error: {0}")]
    Storage(#[from] es40_storage::Error),
    #[error("devices-storage error: {0}")]
    DevicesStorage(#[from] es40_devices_storage::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] es40_io_snapshot::Error),
    #[error("serial backend I/O error: {0}")]
    SerialIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
