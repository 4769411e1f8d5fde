//! Scan Set 2 (native PS/2) and Scan Set 1 (XT-compatible, post-translation)
//! tables for a practical keyboard layout, keyed by browser
//! `KeyboardEvent.code` strings. The GUI's keysym encoding itself is out
//! of scope (`spec.md` §1); the browser `code` string is simply a stable,
//! ASCII key identity a caller can supply without this crate needing to
//! know anything about a specific GUI toolkit.

/// A key's native Scan Set 2 encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Set2Scancode {
    /// A single data byte, optionally `0xE0`-prefixed.
    Simple { make: u8, extended: bool },
    /// A fixed multi-byte sequence that doesn't follow the normal
    /// make/`F0`-prefixed-break pattern (`PrintScreen`, `Pause`).
    Sequence {
        make: &'static [u8],
        break_seq: &'static [u8],
    },
}

/// The same key's Scan Set 1 (post-8042-translation) encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Set1Scancode {
    Simple { make: u8, extended: bool },
    Sequence {
        make: &'static [u8],
        break_seq: &'static [u8],
    },
}

struct KeyEntry {
    code: &'static str,
    set2: Set2Scancode,
    set1: Set1Scancode,
}

macro_rules! simple {
    ($code:expr, $set2_make:expr, $set1_make:expr) => {
        KeyEntry {
            code: $code,
            set2: Set2Scancode::Simple {
                make: $set2_make,
                extended: false,
            },
            set1: Set1Scancode::Simple {
                make: $set1_make,
                extended: false,
            },
        }
    };
}

macro_rules! ext {
    ($code:expr, $set2_make:expr, $set1_make:expr) => {
        KeyEntry {
            code: $code,
            set2: Set2Scancode::Simple {
                make: $set2_make,
                extended: true,
            },
            set1: Set1Scancode::Simple {
                make: $set1_make,
                extended: true,
            },
        }
    };
}

#[rustfmt::skip]
static TABLE: &[KeyEntry] = &[
    // Letters.
    simple!("KeyA", 0x1C, 0x1E), simple!("KeyB", 0x32, 0x30), simple!("KeyC", 0x21, 0x2E),
    simple!("KeyD", 0x23, 0x20), simple!("KeyE", 0x24, 0x12), simple!("KeyF", 0x2B, 0x21),
    simple!("KeyG", 0x34, 0x22), simple!("KeyH", 0x33, 0x23), simple!("KeyI", 0x43, 0x17),
    simple!("KeyJ", 0x3B, 0x24), simple!("KeyK", 0x42, 0x25), simple!("KeyL", 0x4B, 0x26),
    simple!("KeyM", 0x3A, 0x32), simple!("KeyN", 0x31, 0x31), simple!("KeyO", 0x44, 0x18),
    simple!("KeyP", 0x4D, 0x19), simple!("KeyQ", 0x15, 0x10), simple!("KeyR", 0x2D, 0x13),
    simple!("KeyS", 0x1B, 0x1F), simple!("KeyT", 0x2C, 0x14), simple!("KeyU", 0x3C, 0x16),
    simple!("KeyV", 0x2A, 0x2F), simple!("KeyW", 0x1D, 0x11), simple!("KeyX", 0x22, 0x2D),
    simple!("KeyY", 0x35, 0x15), simple!("KeyZ", 0x1A, 0x2C),
    // Digits.
    simple!("Digit1", 0x16, 0x02), simple!("Digit2", 0x1E, 0x03), simple!("Digit3", 0x26, 0x04),
    simple!("Digit4", 0x25, 0x05), simple!("Digit5", 0x2E, 0x06), simple!("Digit6", 0x36, 0x07),
    simple!("Digit7", 0x3D, 0x08), simple!("Digit8", 0x3E, 0x09), simple!("Digit9", 0x46, 0x0A),
    simple!("Digit0", 0x45, 0x0B),
    // Punctuation / whitespace / control.
    simple!("Backquote", 0x0E, 0x29), simple!("Minus", 0x4E, 0x0C), simple!("Equal", 0x55, 0x0D),
    simple!("Backslash", 0x5D, 0x2B), simple!("Backspace", 0x66, 0x0E), simple!("Tab", 0x0D, 0x0F),
    simple!("BracketLeft", 0x54, 0x1A), simple!("BracketRight", 0x5B, 0x1B), simple!("Enter", 0x5A, 0x1C),
    simple!("CapsLock", 0x58, 0x3A), simple!("Semicolon", 0x4C, 0x27), simple!("Quote", 0x52, 0x28),
    simple!("ShiftLeft", 0x12, 0x2A), simple!("Comma", 0x41, 0x33), simple!("Period", 0x49, 0x34),
    simple!("Slash", 0x4A, 0x35), simple!("ShiftRight", 0x59, 0x36), simple!("ControlLeft", 0x14, 0x1D),
    simple!("AltLeft", 0x11, 0x38), simple!("Space", 0x29, 0x39), simple!("Escape", 0x76, 0x01),
    // Function keys.
    simple!("F1", 0x05, 0x3B), simple!("F2", 0x06, 0x3C), simple!("F3", 0x04, 0x3D),
    simple!("F4", 0x0C, 0x3E), simple!("F5", 0x03, 0x3F), simple!("F6", 0x0B, 0x40),
    simple!("F7", 0x83, 0x41), simple!("F8", 0x0A, 0x42), simple!("F9", 0x01, 0x43),
    simple!("F10", 0x09, 0x44), simple!("F11", 0x78, 0x57), simple!("F12", 0x07, 0x58),
    // Lock keys / numpad.
    simple!("NumLock", 0x77, 0x45), simple!("ScrollLock", 0x7E, 0x46),
    simple!("Numpad7", 0x6C, 0x47), simple!("Numpad8", 0x75, 0x48), simple!("Numpad9", 0x7D, 0x49),
    simple!("NumpadSubtract", 0x7B, 0x4A), simple!("Numpad4", 0x6B, 0x4B), simple!("Numpad5", 0x73, 0x4C),
    simple!("Numpad6", 0x74, 0x4D), simple!("NumpadAdd", 0x79, 0x4E), simple!("Numpad1", 0x69, 0x4F),
    simple!("Numpad2", 0x72, 0x50), simple!("Numpad3", 0x7A, 0x51), simple!("Numpad0", 0x70, 0x52),
    simple!("NumpadDecimal", 0x71, 0x53),
    // Non-US best-effort.
    simple!("IntlYen", 0x5D, 0x7D), simple!("IntlRo", 0x61, 0x73),
    // Right-hand / extended (E0-prefixed in both sets).
    ext!("ControlRight", 0x14, 0x1D), ext!("AltRight", 0x11, 0x38),
    ext!("Insert", 0x70, 0x52), ext!("Delete", 0x71, 0x53),
    ext!("Home", 0x6C, 0x47), ext!("End", 0x69, 0x4F),
    ext!("PageUp", 0x7D, 0x49), ext!("PageDown", 0x7A, 0x51),
    ext!("ArrowUp", 0x75, 0x48), ext!("ArrowDown", 0x72, 0x50),
    ext!("ArrowLeft", 0x6B, 0x4B), ext!("ArrowRight", 0x74, 0x4D),
    ext!("NumpadEnter", 0x5A, 0x1C), ext!("NumpadDivide", 0x4A, 0x35),
    ext!("MetaLeft", 0x1F, 0x5B), ext!("MetaRight", 0x27, 0x5C),
    ext!("ContextMenu", 0x2F, 0x5D),
];

const PRINT_SCREEN_SET2_MAKE: &[u8] = &[0xE0, 0x12, 0xE0, 0x7C];
const PRINT_SCREEN_SET2_BREAK: &[u8] = &[0xE0, 0xF0, 0x7C, 0xE0, 0xF0, 0x12];
const PRINT_SCREEN_SET1_MAKE: &[u8] = &[0xE0, 0x2A, 0xE0, 0x37];
const PRINT_SCREEN_SET1_BREAK: &[u8] = &[0xE0, 0xB7, 0xE0, 0xAA];

const PAUSE_SET2_MAKE: &[u8] = &[0xE1, 0x14, 0x77, 0xE1, 0xF0, 0x14, 0xF0, 0x77];
const PAUSE_SET1_MAKE: &[u8] = &[0xE1, 0x1D, 0x45, 0xE1, 0x9D, 0xC5];

fn special(code: &str) -> Option<(Set2Scancode, Set1Scancode)> {
    match code {
        "PrintScreen" => Some((
            Set2Scancode::Sequence {
                make: PRINT_SCREEN_SET2_MAKE,
                break_seq: PRINT_SCREEN_SET2_BREAK,
            },
            Set1Scancode::Sequence {
                make: PRINT_SCREEN_SET1_MAKE,
                break_seq: PRINT_SCREEN_SET1_BREAK,
            },
        )),
        "Pause" => Some((
            Set2Scancode::Sequence {
                make: PAUSE_SET2_MAKE,
                break_seq: &[],
            },
            Set1Scancode::Sequence {
                make: PAUSE_SET1_MAKE,
                break_seq: &[],
            },
        )),
        _ => None,
    }
}

pub fn browser_code_to_set2(code: &str) -> Option<Set2Scancode> {
    if let Some((s2, _)) = special(code) {
        return Some(s2);
    }
    TABLE.iter().find(|e| e.code == code).map(|e| e.set2)
}

pub fn browser_code_to_set1(code: &str) -> Option<Set1Scancode> {
    if let Some((_, s1)) = special(code) {
        return Some(s1);
    }
    TABLE.iter().find(|e| e.code == code).map(|e| e.set1)
}

pub fn browser_code_to_set2_bytes(code: &str, pressed: bool) -> Option<Vec<u8>> {
    browser_code_to_set2(code).map(|sc| match sc {
        Set2Scancode::Simple { make, extended } => {
            let mut v = Vec::with_capacity(4);
            if extended {
                v.push(0xE0);
            }
            if !pressed {
                if extended {
                    v.push(0xF0);
                } else {
                    v.push(0xF0);
                }
            }
            // Break bytes for a simple extended key are E0 F0 <make>; for
            // a non-extended key they are F0 <make>. The logic above
            // already pushed the right prefix bytes; now push `make`.
            v.push(make);
            v
        }
        Set2Scancode::Sequence { make, break_seq } => {
            if pressed {
                make.to_vec()
            } else {
                break_seq.to_vec()
            }
        }
    })
}

pub fn browser_code_to_set1_bytes(code: &str, pressed: bool) -> Option<Vec<u8>> {
    browser_code_to_set1(code).map(|sc| match sc {
        Set1Scancode::Simple { make, extended } => {
            if pressed {
                if extended {
                    vec![0xE0, make]
                } else {
                    vec![make]
                }
            } else if extended {
                vec![0xE0, make | 0x80]
            } else {
                vec![make | 0x80]
            }
        }
        Set1Scancode::Sequence { make, break_seq } => {
            if pressed {
                make.to_vec()
            } else {
                break_seq.to_vec()
            }
        }
    })
}
