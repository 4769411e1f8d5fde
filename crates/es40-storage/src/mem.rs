use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::raw::SeekableBackend;

/// An in-memory backing store, used by tests and by the SCSI/ATA unit
/// tests that don't want real file I/O (out of scope per `spec.md` §1).
pub struct MemBackend {
    cursor: Cursor<Vec<u8>>,
}

impl MemBackend {
    pub fn new(byte_size: u64) -> Self {
        MemBackend {
            cursor: Cursor::new(vec![0u8; byte_size as usize]),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MemBackend {
            cursor: Cursor::new(bytes),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for MemBackend {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemBackend {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.cursor.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.cursor.flush()
    }
}

impl Seek for MemBackend {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl SeekableBackend for MemBackend {
    fn byte_len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }
}
