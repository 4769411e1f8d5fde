use crate::scancode::{browser_code_to_set1_bytes, browser_code_to_set2_bytes};

const ACK: u8 = 0xFA;
const RESEND: u8 = 0xFE;
const BAT_OK: u8 = 0xAA;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Pending {
    SetLeds,
    SetScanCodeSet,
    SetTypematic,
}

/// Scan code set the keyboard is currently emitting. The 8042 translates
/// set 2 down to set 1 for the host unless translation has been turned
/// off; this model exposes both so the controller can pick per its own
/// translate-mode flag (`spec.md` §4.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScanCodeSet {
    Set1,
    Set2,
}

/// Keyboard-side PS/2 command/scancode state machine, independent of the
/// 8042 controller logic that owns the shared output buffer.
pub struct Keyboard {
    scanning_enabled: bool,
    scan_code_set: ScanCodeSet,
    leds: u8,
    pending: Option<Pending>,
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard {
            scanning_enabled: true,
            scan_code_set: ScanCodeSet::Set2,
            leds: 0,
            pending: None,
        }
    }

    pub fn scan_code_set(&self) -> ScanCodeSet {
        self.scan_code_set
    }

    /// Feed a data byte sent to the keyboard on the data port (0x60 while
    /// the command is addressed to it). Returns the byte(s) to place in
    /// the output buffer in response, in order.
    pub fn write(&mut self, byte: u8) -> Vec<u8> {
        if let Some(pending) = self.pending.take() {
            return self.finish_pending(pending, byte);
        }

        match byte {
            0xED => {
                self.pending = Some(Pending::SetLeds);
                vec![ACK]
            }
            0xEE => vec![0xEE],
            0xF0 => {
                self.pending = Some(Pending::SetScanCodeSet);
                vec![ACK]
            }
            0xF2 => vec![ACK, 0xAB, 0x83],
            0xF3 => {
                self.pending = Some(Pending::SetTypematic);
                vec![ACK]
            }
            0xF4 => {
                self.scanning_enabled = true;
                vec![ACK]
            }
            0xF5 => {
                self.scanning_enabled = false;
                self.reset_defaults();
                vec![ACK]
            }
            0xF6 => {
                self.reset_defaults();
                vec![ACK]
            }
            RESEND => vec![ACK],
            0xFF => {
                self.reset_defaults();
                vec![ACK, BAT_OK]
            }
            _ => vec![RESEND],
        }
    }

    fn finish_pending(&mut self, pending: Pending, byte: u8) -> Vec<u8> {
        match pending {
            Pending::SetLeds => {
                self.leds = byte & 0x07;
                vec![ACK]
            }
            Pending::SetScanCodeSet => {
                match byte {
                    0 => {
                        // Query current set: echo it back (0 = set1, 1 = set2
                        // in the reply's low byte, per controller convention
                        // of this model).
                        let set = match self.scan_code_set {
                            ScanCodeSet::Set1 => 1,
                            ScanCodeSet::Set2 => 2,
                        };
                        return vec![ACK, set];
                    }
                    1 => self.scan_code_set = ScanCodeSet::Set1,
                    2 => self.scan_code_set = ScanCodeSet::Set2,
                    _ => return vec![RESEND],
                }
                vec![ACK]
            }
            Pending::SetTypematic => vec![ACK],
        }
    }

    fn reset_defaults(&mut self) {
        self.scanning_enabled = true;
        self.scan_code_set = ScanCodeSet::Set2;
        self.leds = 0;
        self.pending = None;
    }

    pub fn leds(&self) -> u8 {
        self.leds
    }

    /// Translate a browser key code + press/release edge into the bytes
    /// that should be pushed to the output queue, honoring the disabled
    /// scanning state (dropped entirely, as on real hardware).
    pub fn key_event(&self, code: &str, pressed: bool) -> Option<Vec<u8>> {
        if !self.scanning_enabled {
            return None;
        }
        match self.scan_code_set {
            ScanCodeSet::Set1 => browser_code_to_set1_bytes(code, pressed),
            ScanCodeSet::Set2 => browser_code_to_set2_bytes(code, pressed),
        }
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}
