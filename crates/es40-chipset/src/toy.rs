//! MC146818-compatible TOY clock / CMOS NVRAM (`spec.md` §4.3): 256 bytes
//! of battery-backed RAM addressed through an index/data port pair, with
//! the first fourteen bytes doubling as the real-time clock registers.

use chrono::Timelike;
use chrono::{Datelike, Local};
use es40_io_snapshot::Savable;

const REG_SECONDS: usize = 0x00;
const REG_MINUTES: usize = 0x02;
const REG_HOURS: usize = 0x04;
const REG_WEEKDAY: usize = 0x06;
const REG_DAY_OF_MONTH: usize = 0x07;
const REG_MONTH: usize = 0x08;
const REG_YEAR: usize = 0x09;
const REG_STATUS_A: usize = 0x0A;
const REG_STATUS_B: usize = 0x0B;
const REG_STATUS_C: usize = 0x0C;
const REG_STATUS_D: usize = 0x0D;

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// `spec.md` §9: the TOY's UIP (update-in-progress) bit toggles on a
/// fixed cadence independent of host wall-clock reads, so a guest that
/// polls status A eventually observes it clear.
pub struct Toy {
    nvram: [u8; 256],
    index: u8,
    ext_index: u8,
    uip: bool,
    ticks_since_uip_toggle: u32,
}

const UIP_TOGGLE_PERIOD_TICKS: u32 = 32768;

impl Toy {
    pub fn new() -> Self {
        let mut nvram = [0u8; 256];
        nvram[REG_STATUS_A] = 0x26; // 32.768 kHz divider, no periodic rate.
        nvram[REG_STATUS_B] = 0b0000_0010; // 24-hour mode, BCD.
        nvram[REG_STATUS_D] = 0x80; // battery (VRT) good.
        Toy {
            nvram,
            index: 0,
            ext_index: 0,
            uip: false,
            ticks_since_uip_toggle: 0,
        }
    }

    pub fn write_index(&mut self, value: u8) {
        self.index = value & 0x7F;
    }

    /// Port 0x72: selects a register in the upper 128 bytes, addressed
    /// symmetrically to port 0x70 (`spec.md` §4.3).
    pub fn write_ext_index(&mut self, value: u8) {
        self.ext_index = 0x80 | (value & 0x7F);
    }

    /// Port 0x73 read.
    pub fn read_ext_data(&mut self) -> u8 {
        self.nvram[self.ext_index as usize]
    }

    /// Port 0x73 write.
    pub fn write_ext_data(&mut self, value: u8) {
        self.nvram[self.ext_index as usize] = value;
    }

    fn binary_mode(&self) -> bool {
        self.nvram[REG_STATUS_B] & (1 << 2) != 0
    }

    /// Register 0x0B bit 1: 1 = 24-hour mode, 0 = 12-hour mode with the
    /// hour's high bit used as a PM flag.
    fn twenty_four_hour_mode(&self) -> bool {
        self.nvram[REG_STATUS_B] & (1 << 1) != 0
    }

    fn clock_frozen(&self) -> bool {
        self.nvram[REG_STATUS_B] & (1 << 7) != 0
    }

    fn encode_hour(&self, hour24: u8) -> u8 {
        let encode = |v: u8| if self.binary_mode() { v } else { to_bcd(v) };
        if self.twenty_four_hour_mode() {
            encode(hour24)
        } else {
            let pm = hour24 >= 12;
            let hour12 = match hour24 % 12 {
                0 => 12,
                h => h,
            };
            let mut byte = encode(hour12);
            if pm {
                byte |= 0x80;
            }
            byte
        }
    }

    fn refresh_clock_registers(&mut self) {
        if self.clock_frozen() {
            return;
        }
        let now = Local::now();
        let encode = |v: u8| if self.binary_mode() { v } else { to_bcd(v) };
        self.nvram[REG_SECONDS] = encode(now.second() as u8);
        self.nvram[REG_MINUTES] = encode(now.minute() as u8);
        self.nvram[REG_HOURS] = self.encode_hour(now.hour() as u8);
        self.nvram[REG_WEEKDAY] = encode(now.weekday().num_days_from_sunday() as u8 + 1);
        self.nvram[REG_DAY_OF_MONTH] = encode(now.day() as u8);
        self.nvram[REG_MONTH] = encode(now.month() as u8);
        self.nvram[REG_YEAR] = encode((now.year() % 100) as u8);
    }

    pub fn read_data(&mut self) -> u8 {
        match self.index as usize {
            REG_SECONDS..=REG_YEAR => {
                self.refresh_clock_registers();
                self.nvram[self.index as usize]
            }
            REG_STATUS_A => {
                let mut byte = self.nvram[REG_STATUS_A] & 0x7F;
                if self.uip {
                    byte |= 0x80;
                }
                byte
            }
            REG_STATUS_C => {
                let byte = self.nvram[REG_STATUS_C];
                self.nvram[REG_STATUS_C] = 0; // reading clears pending flags.
                byte
            }
            idx => self.nvram[idx],
        }
    }

    pub fn write_data(&mut self, value: u8) {
        let idx = self.index as usize;
        match idx {
            REG_STATUS_A => self.nvram[idx] = value & 0x7F, // UIP is read-only.
            REG_STATUS_B => {
                self.nvram[idx] = value;
                // Enabling the periodic interrupt (bit 6) latches the
                // periodic-interrupt-pending flag into status C, which
                // the guest observes the next time it reads that register.
                if value & (1 << 6) != 0 {
                    self.nvram[REG_STATUS_C] = 0xF0;
                }
            }
            _ => self.nvram[idx] = value,
        }
    }

    /// Advance the UIP toggle cadence; called once per chipset tick
    /// (`spec.md` §4.8 fixed dispatch order).
    pub fn tick(&mut self) {
        self.ticks_since_uip_toggle += 1;
        if self.ticks_since_uip_toggle >= UIP_TOGGLE_PERIOD_TICKS {
            self.ticks_since_uip_toggle = 0;
            self.uip = !self.uip;
        }
    }
}

impl Default for Toy {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct ToyWireState {
    nvram: [u8; 256],
    index: u8,
    ext_index: u8,
    uip: u8,
    ticks_since_uip_toggle: u32,
}

impl Savable for Toy {
    type Wire = ToyWireState;

    fn to_wire(&self) -> Self::Wire {
        ToyWireState {
            nvram: self.nvram,
            index: self.index,
            ext_index: self.ext_index,
            uip: self.uip as u8,
            ticks_since_uip_toggle: self.ticks_since_uip_toggle,
        }
    }

    fn from_wire(&mut self, wire: Self::Wire) {
        self.nvram = wire.nvram;
        self.index = wire.index;
        self.ext_index = wire.ext_index;
        self.uip = wire.uip != 0;
        self.ticks_since_uip_toggle = wire.ticks_since_uip_toggle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_d_reports_battery_good_on_reset() {
        let mut toy = Toy::new();
        toy.write_index(REG_STATUS_D as u8);
        assert_eq!(toy.read_data() & 0x80, 0x80);
    }

    #[test]
    fn status_c_clears_on_read() {
        let mut toy = Toy::new();
        toy.nvram[REG_STATUS_C] = 0xFF;
        toy.write_index(REG_STATUS_C as u8);
        assert_eq!(toy.read_data(), 0xFF);
        assert_eq!(toy.read_data(), 0);
    }

    #[test]
    fn uip_bit_toggles_after_its_period_elapses() {
        let mut toy = Toy::new();
        toy.write_index(REG_STATUS_A as u8);
        assert_eq!(toy.read_data() & 0x80, 0);
        for _ in 0..UIP_TOGGLE_PERIOD_TICKS {
            toy.tick();
        }
        assert_eq!(toy.read_data() & 0x80, 0x80);
    }

    #[test]
    fn freezing_the_clock_holds_the_seconds_register_steady() {
        let mut toy = Toy::new();
        toy.nvram[REG_STATUS_B] |= 1 << 7; // SET bit.
        toy.write_index(REG_SECONDS as u8);
        toy.nvram[REG_SECONDS] = 0x42;
        assert_eq!(toy.read_data(), 0x42); // untouched by refresh.
    }

    #[test]
    fn twelve_hour_mode_encodes_pm_in_the_hour_register_high_bit() {
        let mut toy = Toy::new();
        toy.nvram[REG_STATUS_B] &= !(1 << 1); // clear bit 1: 12-hour mode.
        assert_eq!(toy.encode_hour(0), to_bcd(12)); // midnight -> 12 AM.
        assert_eq!(toy.encode_hour(13), to_bcd(1) | 0x80); // 1 PM.
        assert_eq!(toy.encode_hour(23), to_bcd(11) | 0x80); // 11 PM.
    }

    #[test]
    fn twenty_four_hour_mode_encodes_hour_directly() {
        let toy = Toy::new(); // default is 24-hour mode.
        assert_eq!(toy.encode_hour(0), to_bcd(0));
        assert_eq!(toy.encode_hour(23), to_bcd(23));
    }

    #[test]
    fn enabling_periodic_interrupt_schedules_status_c_for_next_access() {
        let mut toy = Toy::new();
        toy.write_index(REG_STATUS_B as u8);
        toy.write_data(0b0100_0010); // bit 6 set, 24-hour mode kept.
        toy.write_index(REG_STATUS_C as u8);
        assert_eq!(toy.read_data(), 0xF0);
        assert_eq!(toy.read_data(), 0); // cleared after being observed.
    }

    #[test]
    fn arbitrary_nvram_byte_round_trips() {
        let mut toy = Toy::new();
        toy.write_index(0x20);
        toy.write_data(0xAB);
        toy.write_index(0x20);
        assert_eq!(toy.read_data(), 0xAB);
    }

    #[test]
    fn ext_ports_address_the_upper_128_bytes() {
        let mut toy = Toy::new();
        toy.write_ext_index(0x10); // selects nvram[0x90]
        toy.write_ext_data(0x77);
        toy.write_index(0x90);
        assert_eq!(toy.read_data(), 0x77);
    }

    #[test]
    fn snapshot_round_trip_preserves_nvram_and_uip_phase() {
        let mut toy = Toy::new();
        toy.write_index(0x20);
        toy.write_data(0xAB);
        for _ in 0..UIP_TOGGLE_PERIOD_TICKS {
            toy.tick();
        }
        let wire = toy.to_wire();
        let mut restored = Toy::new();
        restored.from_wire(wire);
        assert_eq!(restored.to_wire(), wire);
        restored.write_index(0x20);
        assert_eq!(restored.read_data(), 0xAB);
    }

    #[test]
    fn savestate_round_trips_through_a_file_on_disk() {
        let mut toy = Toy::new();
        toy.write_index(0x30);
        toy.write_data(0x5A);

        let file = tempfile::NamedTempFile::new().unwrap();
        toy.save(&mut file.reopen().unwrap()).unwrap();

        let mut restored = Toy::new();
        restored.restore(&mut file.reopen().unwrap()).unwrap();
        restored.write_index(0x30);
        assert_eq!(restored.read_data(), 0x5A);
    }
}
