const ACK: u8 = 0xFA;
const BAT_OK: u8 = 0xAA;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Pending {
    SampleRate,
    Resolution,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Stream,
    Remote,
    /// Echoes whatever byte the host writes, until 0xEC or 0xFF.
    Wrap,
}

/// `spec.md` §4.4 "IntelliMouse" detection: writing the sample-rate
/// sequence 200, 100, 80 unlocks the wheel extension (device ID 3);
/// following that with 200, 200, 80 unlocks the 5-button extension
/// (device ID 4).
const WHEEL_MAGIC: [u8; 3] = [200, 100, 80];
const FIVE_BUTTON_MAGIC: [u8; 3] = [200, 200, 80];

/// Delayed dx/dy/dz deltas are clamped to this range before being emitted
/// in a single packet (`spec.md` §4.4 "Mouse packet synthesis").
const MAX_DELTA: i32 = 254;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Buttons {
    pub left: bool,
    pub right: bool,
    pub middle: bool,
    pub button4: bool,
    pub button5: bool,
}

pub struct Mouse {
    reporting_enabled: bool,
    sample_rate: u8,
    resolution: u8,
    scaling_2to1: bool,
    mode: Mode,
    saved_mode: Mode,
    device_id: u8,
    sample_rate_history: Vec<u8>,
    pending: Option<Pending>,
    delayed_dx: i32,
    delayed_dy: i32,
    delayed_dz: i32,
    buttons: Buttons,
}

impl Mouse {
    pub fn new() -> Self {
        Mouse {
            reporting_enabled: false,
            sample_rate: 100,
            resolution: 2,
            scaling_2to1: false,
            mode: Mode::Stream,
            saved_mode: Mode::Stream,
            device_id: 0,
            sample_rate_history: Vec::new(),
            pending: None,
            delayed_dx: 0,
            delayed_dy: 0,
            delayed_dz: 0,
            buttons: Buttons::default(),
        }
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    pub fn reporting_enabled(&self) -> bool {
        self.reporting_enabled
    }

    pub fn packet_size(&self) -> usize {
        if self.device_id >= 3 {
            4
        } else {
            3
        }
    }

    fn reset_defaults(&mut self) {
        self.sample_rate = 100;
        self.resolution = 2;
        self.scaling_2to1 = false;
        self.mode = Mode::Stream;
        self.saved_mode = Mode::Stream;
        self.reporting_enabled = false;
        self.pending = None;
        self.delayed_dx = 0;
        self.delayed_dy = 0;
        self.delayed_dz = 0;
    }

    pub fn write(&mut self, byte: u8) -> Vec<u8> {
        if self.mode == Mode::Wrap && byte != 0xFF && byte != 0xEC {
            // Wrap mode echoes any byte other than reset/exit-wrap back
            // to the host unmodified.
            return vec![byte];
        }

        if let Some(pending) = self.pending.take() {
            return self.finish_pending(pending, byte);
        }

        match byte {
            0xE6 => {
                self.scaling_2to1 = false;
                vec![ACK]
            }
            0xE7 => {
                self.scaling_2to1 = true;
                vec![ACK]
            }
            0xE8 => {
                self.pending = Some(Pending::Resolution);
                vec![ACK]
            }
            0xE9 => {
                let byte0 = 0u8
                    | if self.reporting_enabled { 1 << 5 } else { 0 }
                    | if self.scaling_2to1 { 1 << 4 } else { 0 };
                vec![ACK, byte0, self.resolution, self.sample_rate]
            }
            0xEA => {
                self.mode = Mode::Stream;
                vec![ACK]
            }
            0xEB => {
                let (dx, dy, dz) = self.take_clamped_deltas();
                let mut resp = vec![ACK];
                resp.extend(self.build_packet(dx, dy, dz));
                resp
            }
            0xEC => {
                // Reset wrap mode: restore whatever mode was active
                // before 0xEE put the device into wrap mode.
                self.mode = self.saved_mode;
                vec![ACK]
            }
            0xEE => {
                self.saved_mode = self.mode;
                self.mode = Mode::Wrap;
                vec![ACK]
            }
            0xEF => {
                self.mode = Mode::Remote;
                vec![ACK]
            }
            0xF2 => vec![ACK, self.device_id],
            0xF3 => {
                self.pending = Some(Pending::SampleRate);
                vec![ACK]
            }
            0xF4 => {
                self.reporting_enabled = true;
                vec![ACK]
            }
            0xF5 => {
                self.reporting_enabled = false;
                vec![ACK]
            }
            0xF6 => {
                self.reset_defaults();
                vec![ACK]
            }
            0xFF => {
                self.device_id = 0;
                self.sample_rate_history.clear();
                self.reset_defaults();
                vec![ACK, BAT_OK, 0]
            }
            _ => vec![0xFE],
        }
    }

    fn finish_pending(&mut self, pending: Pending, byte: u8) -> Vec<u8> {
        match pending {
            Pending::Resolution => {
                self.resolution = byte;
                vec![ACK]
            }
            Pending::SampleRate => {
                self.sample_rate = byte;
                self.sample_rate_history.push(byte);
                if self.sample_rate_history.len() > 3 {
                    self.sample_rate_history.remove(0);
                }
                if self.device_id < 4 && self.sample_rate_history[..] == FIVE_BUTTON_MAGIC[..] {
                    self.device_id = 4;
                } else if self.device_id == 0 && self.sample_rate_history[..] == WHEEL_MAGIC[..] {
                    self.device_id = 3;
                }
                vec![ACK]
            }
        }
    }

    /// Accumulate a relative motion/button sample into the delayed
    /// dx/dy/dz accumulator; actual emission happens in
    /// `synthesize_delayed_packet` on tick, or immediately for an 0xEB
    /// poll in REMOTE mode.
    pub fn accumulate_motion(&mut self, dx: i32, dy: i32, dz: i32, buttons: Buttons) {
        self.delayed_dx += dx;
        self.delayed_dy += dy;
        self.delayed_dz += dz;
        self.buttons = buttons;
    }

    fn take_clamped_deltas(&mut self) -> (i32, i32, i32) {
        let dx = self.delayed_dx.clamp(-MAX_DELTA, MAX_DELTA);
        let dy = self.delayed_dy.clamp(-MAX_DELTA, MAX_DELTA);
        let dz = self.delayed_dz.clamp(-MAX_DELTA, MAX_DELTA);
        self.delayed_dx -= dx;
        self.delayed_dy -= dy;
        self.delayed_dz -= dz;
        (dx, dy, dz)
    }

    /// `spec.md` §4.4 "Mouse packet synthesis": on periodic tick, if the
    /// accumulator holds unreported motion and the device is reporting in
    /// STREAM mode, clamp and emit one packet, subtracting the emitted
    /// delta from the accumulators.
    pub fn synthesize_delayed_packet(&mut self) -> Option<Vec<u8>> {
        if self.mode != Mode::Stream || !self.reporting_enabled {
            return None;
        }
        if self.delayed_dx == 0 && self.delayed_dy == 0 {
            return None;
        }
        let (dx, dy, dz) = self.take_clamped_deltas();
        Some(self.build_packet(dx, dy, dz))
    }

    /// Encode a motion/button packet for the given already-clamped deltas,
    /// using the device's current button state and wheel/5-button mode.
    /// Used both for the delayed-accumulator drain and for an explicit
    /// REMOTE-mode 0xEB poll.
    pub fn build_packet(&self, dx: i32, dy: i32, dz: i32) -> Vec<u8> {
        let x = (dx & 0xFF) as u8;
        let y = (dy & 0xFF) as u8;
        let x_sign = dx < 0;
        let y_sign = dy < 0;

        let mut byte0 = 0x08u8; // bit 3 always set.
        if self.buttons.left {
            byte0 |= 1 << 0;
        }
        if self.buttons.right {
            byte0 |= 1 << 1;
        }
        if self.buttons.middle {
            byte0 |= 1 << 2;
        }
        if x_sign {
            byte0 |= 1 << 4;
        }
        if y_sign {
            byte0 |= 1 << 5;
        }
        // Deltas are clamped to [-254, 254], which always fits the 9-bit
        // signed wire format, so the overflow bits (6/7) never need to be
        // set here.

        let mut packet = vec![byte0, x, y];
        if self.device_id == 3 {
            packet.push(dz as u8);
        } else if self.device_id == 4 {
            let mut byte3 = (dz as u8) & 0x0F;
            if self.buttons.button4 {
                byte3 |= 1 << 4;
            }
            if self.buttons.button5 {
                byte3 |= 1 << 5;
            }
            packet.push(byte3);
        }
        packet
    }

    /// Encode a packet for an explicit delta and button state without
    /// touching the delayed accumulator.
    pub fn motion_packet(&self, dx: i32, dy: i32, dz: i32, buttons: Buttons) -> Vec<u8> {
        let mut m = Mouse {
            buttons,
            ..Mouse::new()
        };
        m.device_id = self.device_id;
        m.build_packet(dx, dy, dz)
    }
}

impl Default for Mouse {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_reports_standard_device_id() {
        let mut m = Mouse::new();
        assert_eq!(m.write(0xFF), vec![ACK, BAT_OK, 0]);
        assert_eq!(m.device_id(), 0);
    }

    #[test]
    fn wheel_magic_sequence_unlocks_device_id_three() {
        let mut m = Mouse::new();
        for rate in WHEEL_MAGIC {
            m.write(0xF3);
            m.write(rate);
        }
        assert_eq!(m.device_id(), 3);
        assert_eq!(m.packet_size(), 4);
    }

    #[test]
    fn five_button_magic_sequence_unlocks_device_id_four() {
        let mut m = Mouse::new();
        for rate in FIVE_BUTTON_MAGIC {
            m.write(0xF3);
            m.write(rate);
        }
        assert_eq!(m.device_id(), 4);
    }

    #[test]
    fn enable_disable_reporting_toggles_flag() {
        let mut m = Mouse::new();
        assert!(!m.reporting_enabled());
        m.write(0xF4);
        assert!(m.reporting_enabled());
        m.write(0xF5);
        assert!(!m.reporting_enabled());
    }

    #[test]
    fn motion_packet_encodes_negative_deltas_and_buttons() {
        let m = Mouse::new();
        let packet = m.motion_packet(
            -5,
            3,
            0,
            Buttons {
                left: true,
                ..Default::default()
            },
        );
        assert_eq!(packet.len(), 3);
        assert_eq!(packet[1], (-5i8) as u8);
        assert_eq!(packet[2], 3);
        assert_eq!(packet[0] & 0x01, 1);
        assert_eq!(packet[0] & (1 << 4), 1 << 4);
    }

    #[test]
    fn status_request_reflects_current_settings() {
        let mut m = Mouse::new();
        m.write(0xF4);
        let resp = m.write(0xE9);
        assert_eq!(resp[0], ACK);
        assert_eq!(resp[1] & (1 << 5), 1 << 5);
    }

    #[test]
    fn delayed_motion_is_drained_on_tick_and_clamped() {
        let mut m = Mouse::new();
        m.write(0xF4); // enable reporting, stays in default stream mode.
        m.accumulate_motion(300, -300, 0, Buttons::default());
        let packet = m.synthesize_delayed_packet().unwrap();
        assert_eq!(packet[1], (MAX_DELTA as u8)); // clamped to +254.
        assert_eq!(packet[2], (-MAX_DELTA) as i8 as u8); // clamped to -254.
        // Remaining 46 units still pending after the first clamp-drain.
        let second = m.synthesize_delayed_packet().unwrap();
        assert_eq!(second[1], 46);
        assert_eq!(second[2], (-46i8) as u8);
        assert!(m.synthesize_delayed_packet().is_none());
    }

    #[test]
    fn remote_mode_0xeb_reports_accumulated_deltas_on_demand() {
        let mut m = Mouse::new();
        m.write(0xF4);
        m.write(0xEF); // remote mode.
        m.accumulate_motion(10, -10, 0, Buttons::default());
        // No autonomous packet in remote mode.
        assert!(m.synthesize_delayed_packet().is_none());
        let resp = m.write(0xEB);
        assert_eq!(resp[0], ACK);
        assert_eq!(resp[2], 10);
        assert_eq!(resp[3], (-10i8) as u8);
    }

    #[test]
    fn wrap_mode_echoes_bytes_until_reset_or_exit() {
        let mut m = Mouse::new();
        assert_eq!(m.write(0xEE), vec![ACK]); // enter wrap.
        assert_eq!(m.write(0x55), vec![0x55]); // echoed, not interpreted.
        assert_eq!(m.write(0xEC), vec![ACK]); // exit wrap, restore stream mode.
        assert_eq!(m.write(0xF4), vec![ACK]); // back to normal command handling.
    }
}
