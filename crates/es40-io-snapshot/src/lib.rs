//! Magic-framed, size-checked savestate blocks for plain device state structs.
//!
//! Every clocked device in the workspace keeps its live runtime state in
//! whatever shape is convenient (queues, `Vec`s, trait objects behind
//! `Box`), and projects a `Copy` "wire state" struct out of it for
//! save/restore. This mirrors the `SystemComponent::SaveState` /
//! `RestoreState` pair in the original emulator, which dumped an object's
//! raw memory between two magic markers.

use std::io::{self, Read, Write};
use std::mem::size_of;

use thiserror::Error;

/// First magic written before a component's state block.
pub const MAGIC1: u32 = 0xE540_0001;
/// Second magic written after a component's state block.
pub const MAGIC2: u32 = 0xE540_00FE;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("state mismatch: expected leading magic {expected:#010x}, found {found:#010x}")]
    LeadingMagic { expected: u32, found: u32 },
    #[error("state mismatch: expected trailing magic {expected:#010x}, found {found:#010x}")]
    TrailingMagic { expected: u32, found: u32 },
    #[error("state mismatch: expected {expected} bytes of state, found {found}")]
    SizeMismatch { expected: i64, found: i64 },
}

/// A plain-old-data wire representation of a device's saved state.
///
/// Implementors must be `Copy` so that saving/restoring is a raw byte dump,
/// matching the original component's behavior of writing its object memory
/// verbatim between the two magics.
pub trait WireState: Copy + 'static {}

impl<T: Copy + 'static> WireState for T {}

/// Writes `MAGIC1 | size_of::<T>() | state (raw LE bytes) | MAGIC2`.
pub fn write_block<T: WireState, W: Write>(w: &mut W, state: &T) -> Result<(), Error> {
    w.write_all(&MAGIC1.to_le_bytes())?;
    w.write_all(&(size_of::<T>() as i64).to_le_bytes())?;
    // SAFETY: `T: Copy + 'static` plain-old-data; we read exactly
    // `size_of::<T>()` bytes out of it, matching the original's raw
    // struct dump.
    let bytes =
        unsafe { std::slice::from_raw_parts((state as *const T) as *const u8, size_of::<T>()) };
    w.write_all(bytes)?;
    w.write_all(&MAGIC2.to_le_bytes())?;
    Ok(())
}

/// Reads back a block written by [`write_block`], erroring on any magic or
/// size mismatch. A mismatch is always a fatal `StateMismatch` per the
/// error-handling design: there is no guest-visible recovery from a corrupt
/// savestate file.
pub fn read_block<T: WireState, R: Read>(r: &mut R) -> Result<T, Error> {
    let mut magic_buf = [0u8; 4];
    r.read_exact(&mut magic_buf)?;
    let magic1 = u32::from_le_bytes(magic_buf);
    if magic1 != MAGIC1 {
        return Err(Error::LeadingMagic {
            expected: MAGIC1,
            found: magic1,
        });
    }

    let mut size_buf = [0u8; 8];
    r.read_exact(&mut size_buf)?;
    let size = i64::from_le_bytes(size_buf);
    let expected = size_of::<T>() as i64;
    if size != expected {
        return Err(Error::SizeMismatch {
            expected,
            found: size,
        });
    }

    let mut state = std::mem::MaybeUninit::<T>::uninit();
    let dst = unsafe {
        std::slice::from_raw_parts_mut(state.as_mut_ptr() as *mut u8, size_of::<T>())
    };
    r.read_exact(dst)?;
    let state = unsafe { state.assume_init() };

    r.read_exact(&mut magic_buf)?;
    let magic2 = u32::from_le_bytes(magic_buf);
    if magic2 != MAGIC2 {
        return Err(Error::TrailingMagic {
            expected: MAGIC2,
            found: magic2,
        });
    }

    Ok(state)
}

/// Implemented by every component that participates in savestates. `save`
/// projects the live state into a wire struct and frames it; `restore`
/// un-frames and applies it back.
pub trait Savable {
    type Wire: WireState;

    fn to_wire(&self) -> Self::Wire;
    fn from_wire(&mut self, wire: Self::Wire);

    fn save<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        write_block(w, &self.to_wire())
    }

    fn restore<R: Read>(&mut self, r: &mut R) -> Result<(), Error> {
        let wire = read_block::<Self::Wire, R>(r)?;
        self.from_wire(wire);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq)]
    struct Demo {
        a: u32,
        b: i64,
        c: [u8; 3],
    }

    #[test]
    fn round_trip_matches() {
        let mut buf = Vec::new();
        let demo = Demo {
            a: 0xDEAD_BEEF,
            b: -12,
            c: [1, 2, 3],
        };
        write_block(&mut buf, &demo).unwrap();
        let mut cursor = io::Cursor::new(buf);
        let restored: Demo = read_block(&mut cursor).unwrap();
        assert_eq!(demo, restored);
    }

    #[test]
    fn corrupted_leading_magic_is_rejected() {
        let mut buf = Vec::new();
        write_block(&mut buf, &Demo { a: 1, b: 2, c: [0; 3] }).unwrap();
        buf[0] ^= 0xFF;
        let mut cursor = io::Cursor::new(buf);
        let err = read_block::<Demo, _>(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::LeadingMagic { .. }));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut buf = Vec::new();
        write_block(&mut buf, &Demo { a: 1, b: 2, c: [0; 3] }).unwrap();
        // Corrupt the encoded size field (bytes 4..12).
        buf[4] = 0xFF;
        let mut cursor = io::Cursor::new(buf);
        let err = read_block::<Demo, _>(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn corrupted_trailing_magic_is_rejected() {
        let mut buf = Vec::new();
        write_block(&mut buf, &Demo { a: 1, b: 2, c: [0; 3] }).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let mut cursor = io::Cursor::new(buf);
        let err = read_block::<Demo, _>(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::TrailingMagic { .. }));
    }
}
