use es40_storage::{BlockDevice, CDROM_BLOCK_SIZE};

/// SCSI bus phase, tracked independently of the ATAPI packet-interface
/// phase that wraps it (`spec.md` §4.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Command,
    DataIn,
    DataOut,
    Status,
    MessageIn,
    MessageOut,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SenseKey {
    NoSense = 0x00,
    NotReady = 0x02,
    IllegalRequest = 0x05,
    UnitAttention = 0x06,
}

/// A target-mode SCSI command processor for a CD-ROM class device,
/// addressed either through an ATAPI PACKET transport or (for the
/// per-target session state this module also owns) a generic bus
/// initiator. Owns the six phase-scoped byte buffers (command, data-in,
/// data-out, status, message-in, message-out) the bus protocol
/// distinguishes, plus the per-target flags `spec.md` §4.6 names.
pub struct ScsiTarget {
    pub phase: Phase,
    command: Vec<u8>,
    data_in: Vec<u8>,
    data_out: Vec<u8>,
    status: Vec<u8>,
    message_in: Vec<u8>,
    message_out: Vec<u8>,
    xfer_pos: usize,
    sense_key: SenseKey,
    media_present: bool,
    /// Set once an IDENTIFY message has named a LUN (`spec.md` §4.6).
    pub lun_selected: bool,
    /// IDENTIFY bit 6: the initiator grants this target permission to
    /// disconnect mid-command. This target never exercises it (command
    /// execution is synchronous), but the flag is tracked for fidelity.
    pub disconnect_priv: bool,
    pub will_disconnect: bool,
    pub disconnected: bool,
    pub reselected: bool,
}

impl ScsiTarget {
    pub fn new() -> Self {
        ScsiTarget {
            phase: Phase::Command,
            command: Vec::new(),
            data_in: Vec::new(),
            data_out: Vec::new(),
            status: vec![0],
            message_in: Vec::new(),
            message_out: Vec::new(),
            xfer_pos: 0,
            sense_key: SenseKey::NoSense,
            media_present: true,
            lun_selected: false,
            disconnect_priv: false,
            will_disconnect: false,
            disconnected: false,
            reselected: false,
        }
    }

    /// Selection entry (`spec.md` §4.6): clear every sub-buffer pointer
    /// and per-target flag. An ATAPI PACKET transport performs its own
    /// selection and command framing and has no message phase of its
    /// own, so it enters COMMAND directly; a generic initiator enters
    /// MSG_OUT to identify itself first.
    pub fn select(&mut self, atapi_transport: bool) {
        self.command.clear();
        self.data_in.clear();
        self.data_out.clear();
        self.status.clear();
        self.message_in.clear();
        self.message_out.clear();
        self.xfer_pos = 0;
        self.lun_selected = false;
        self.disconnected = false;
        self.reselected = false;
        self.will_disconnect = false;
        self.phase = if atapi_transport { Phase::Command } else { Phase::MessageOut };
    }

    fn buffer_for(&self, phase: Phase) -> &[u8] {
        match phase {
            Phase::Command => &self.command,
            Phase::DataIn => &self.data_in,
            Phase::DataOut => &self.data_out,
            Phase::Status => &self.status,
            Phase::MessageIn => &self.message_in,
            Phase::MessageOut => &self.message_out,
        }
    }

    /// Number of bytes still owed in the current phase.
    pub fn expected(&self) -> usize {
        self.buffer_for(self.phase).len().saturating_sub(self.xfer_pos)
    }

    /// The next byte(s) to hand the host in a DATA IN / STATUS / MESSAGE
    /// IN phase.
    pub fn xfer_ptr(&self) -> &[u8] {
        &self.buffer_for(self.phase)[self.xfer_pos..]
    }

    /// Append one byte received during a MSG_OUT or DATA_OUT phase at the
    /// transfer cursor, growing the buffer as needed. Used by a generic
    /// initiator clocking bytes in one at a time; the ATAPI transport
    /// instead hands this target a whole assembled CDB via `execute`.
    pub fn feed_message_out_byte(&mut self, byte: u8) -> bool {
        self.message_out.push(byte);
        match self.message_out[0] {
            0x01 => self.message_out.len() >= 2 && self.message_out.len() >= 2 + self.message_out[1] as usize,
            _ => true,
        }
    }

    /// Evaluate the phase transition after `n` more bytes of the current
    /// phase's sub-buffer have crossed the bus (`spec.md` §4.6's
    /// `xfer_done` table). Returns `true` once the current phase's
    /// buffer has fully drained and the transition ran.
    pub fn xfer_done(&mut self, n: usize, dev: &mut dyn BlockDevice) -> bool {
        self.xfer_pos += n;
        if self.xfer_pos < self.buffer_for(self.phase).len() {
            return false;
        }
        self.xfer_pos = 0;
        match self.phase {
            Phase::DataOut => {
                if matches!(self.command.first(), Some(0x0A) | Some(0x2A)) {
                    let _ = self.commit_write10(dev);
                }
                self.phase = if self.data_in.is_empty() { Phase::Status } else { Phase::DataIn };
            }
            Phase::DataIn => self.phase = Phase::Status,
            Phase::Command => {
                let cdb: [u8; 12] = self.command.clone().try_into().unwrap_or([0; 12]);
                self.run_command(&cdb, dev);
            }
            Phase::Status => {
                self.phase = Phase::MessageIn;
                if self.message_in.is_empty() {
                    self.message_in = vec![0x00]; // COMMAND COMPLETE.
                }
            }
            Phase::MessageOut => {
                if let Some(reply) = self.process_message_out() {
                    self.message_in = reply;
                    self.phase = Phase::MessageIn;
                } else {
                    self.phase = Phase::Command;
                }
            }
            Phase::MessageIn => {
                // No further command byte queued on this transport: free the bus.
                self.disconnected = true;
            }
        }
        true
    }

    /// Process every message accumulated in MSG_OUT (`spec.md` §4.6),
    /// returning a reply to stage into MSG_IN if one was produced.
    fn process_message_out(&mut self) -> Option<Vec<u8>> {
        let msg = std::mem::take(&mut self.message_out);
        let first = *msg.first()?;
        if first & 0x80 != 0 {
            // IDENTIFY: bit 7 set, bit 6 disconnect privilege, bits 2-0 LUN.
            self.disconnect_priv = first & 0x40 != 0;
            self.lun_selected = true;
            return None;
        }
        if first == 0x01 && msg.len() >= 3 {
            // Extended message: byte 1 is the length of what follows,
            // byte 2 the extended opcode (SDTR 0x01, WDTR 0x03).
            return match msg[2] {
                0x01 | 0x03 => Some(msg),
                _ => Some(vec![0x07]), // MESSAGE REJECT.
            };
        }
        None
    }

    /// Execute a twelve-byte CDB against an attached CD-ROM backend,
    /// populating the appropriate sub-buffer and leaving the target
    /// parked in the resulting phase. Used directly by the ATAPI
    /// transport, which assembles the whole CDB before handing it over
    /// rather than clocking it in byte-by-byte through COMMAND.
    pub fn execute(&mut self, cdb: &[u8; 12], dev: &mut dyn BlockDevice) {
        self.xfer_pos = 0;
        self.run_command(cdb, dev);
    }

    fn run_command(&mut self, cdb: &[u8; 12], dev: &mut dyn BlockDevice) {
        self.command = cdb.to_vec();
        self.data_in.clear();
        self.data_out.clear();

        match cdb[0] {
            0x00 => self.test_unit_ready(),
            0x03 => self.request_sense(),
            0x12 => self.inquiry(cdb),
            0x15 => self.accept_mode_select(cdb),
            0x1A | 0x5A => self.mode_sense(cdb),
            0x1B => self.start_stop_unit(),
            0x1E => self.prevent_allow(),
            0x25 => self.read_capacity(dev),
            0x08 | 0x28 | 0xA8 | 0xBE => self.read_variable(cdb, dev),
            0x0A | 0x2A => self.write_variable(cdb),
            0x35 => self.synchronize_cache(),
            0x43 => self.read_toc(),
            _ => {
                self.sense_key = SenseKey::IllegalRequest;
                self.status = vec![0x02]; // CHECK CONDITION.
                self.phase = Phase::Status;
            }
        }
    }

    fn good_status(&mut self) {
        self.status = vec![0x00];
        self.sense_key = SenseKey::NoSense;
    }

    fn test_unit_ready(&mut self) {
        if self.media_present {
            self.good_status();
        } else {
            self.sense_key = SenseKey::NotReady;
            self.status = vec![0x02];
        }
        self.phase = Phase::Status;
    }

    fn request_sense(&mut self) {
        let mut sense = vec![0u8; 18];
        sense[0] = 0x70;
        sense[2] = self.sense_key as u8;
        sense[7] = 10;
        self.data_in = sense;
        self.good_status();
        self.phase = Phase::DataIn;
    }

    /// INQUIRY (0x12): standard data, or (EVPD set) the page named by
    /// the CDB's page-code byte — only page 0x80 (unit serial number) is
    /// modeled (`spec.md` §4.6).
    fn inquiry(&mut self, cdb: &[u8; 12]) {
        let evpd = cdb[1] & 0x01 != 0;
        let page_code = cdb[2];
        let data = if evpd && page_code == 0x80 {
            let serial = b"ES40EMU0001";
            let mut d = vec![0u8; 4 + serial.len()];
            d[0] = 0x05; // CD-ROM device type.
            d[1] = 0x80; // page code.
            d[3] = serial.len() as u8;
            d[4..].copy_from_slice(serial);
            d
        } else {
            let mut d = vec![0u8; 36];
            d[0] = 0x05; // CD-ROM device type.
            d[1] = 0x80; // removable.
            d[2] = 0x00;
            d[3] = 0x21; // ATAPI/response data format.
            d[4] = 31; // additional length.
            d[8..16].copy_from_slice(b"ES40EMU ");
            d[16..32].copy_from_slice(b"VIRTUAL CD-ROM  ");
            d[32..36].copy_from_slice(b"1.0 ");
            d
        };
        self.data_in = data;
        self.good_status();
        self.phase = Phase::DataIn;
    }

    fn accept_mode_select(&mut self, _cdb: &[u8; 12]) {
        self.good_status();
        self.phase = Phase::DataOut;
    }

    /// MODE SENSE(6)/(10) (0x1A/0x5A): serve the page named by the CDB's
    /// page-code byte (bits 5-0 of byte 2), `spec.md` §4.6's subset
    /// (0x00/0x01/0x03/0x04/0x05/0x2A).
    fn mode_sense(&mut self, cdb: &[u8; 12]) {
        let page_code = cdb[2] & 0x3F;
        let page = Self::mode_page(page_code);
        let mut data = vec![0u8; 4]; // mode parameter header (6-byte form).
        data.extend_from_slice(&page);
        data[0] = (data.len() - 1) as u8; // mode data length.
        self.data_in = data;
        self.good_status();
        self.phase = Phase::DataIn;
    }

    fn mode_page(page_code: u8) -> Vec<u8> {
        let page_len: u8 = match page_code {
            0x01 => 0x0A, // read-write error recovery.
            0x03 => 0x16, // format device parameters.
            0x04 => 0x16, // rigid disk geometry.
            0x05 => 0x1E, // flexible disk.
            0x2A => 0x14, // CD-ROM capabilities and mechanical status.
            _ => 0x06,    // page 0x00, vendor-specific.
        };
        let mut page = vec![page_code, page_len];
        page.extend(std::iter::repeat(0u8).take(page_len as usize));
        page
    }

    fn start_stop_unit(&mut self) {
        self.good_status();
        self.phase = Phase::Status;
    }

    fn prevent_allow(&mut self) {
        self.good_status();
        self.phase = Phase::Status;
    }

    fn read_capacity(&mut self, dev: &mut dyn BlockDevice) {
        let last_lba = dev.get_lba_size().saturating_sub(1) as u32;
        let mut data = vec![0u8; 8];
        data[0..4].copy_from_slice(&last_lba.to_be_bytes());
        data[4..8].copy_from_slice(&(CDROM_BLOCK_SIZE as u32).to_be_bytes());
        self.data_in = data;
        self.good_status();
        self.phase = Phase::DataIn;
    }

    /// READ(6)/(10)/(12)/READ CD (0x08/0x28/0xA8/0xBE): decode LBA and
    /// block count per the opcode's own CDB layout (`spec.md` §4.6).
    fn read_variable(&mut self, cdb: &[u8; 12], dev: &mut dyn BlockDevice) {
        let (lba, count) = match cdb[0] {
            0x08 => {
                let lba = (((cdb[1] & 0x1F) as u32) << 16) | ((cdb[2] as u32) << 8) | cdb[3] as u32;
                let count = if cdb[4] == 0 { 256 } else { cdb[4] as u32 };
                (lba as u64, count)
            }
            0x28 => {
                let lba = u32::from_be_bytes([cdb[2], cdb[3], cdb[4], cdb[5]]) as u64;
                let count = u16::from_be_bytes([cdb[7], cdb[8]]) as u32;
                (lba, count)
            }
            _ => {
                // 0xA8 READ(12), 0xBE READ CD.
                let lba = u32::from_be_bytes([cdb[2], cdb[3], cdb[4], cdb[5]]) as u64;
                let count = u32::from_be_bytes([cdb[6], cdb[7], cdb[8], cdb[9]]);
                (lba, count)
            }
        };
        let mut buf = vec![0u8; (count as u64 * CDROM_BLOCK_SIZE as u64) as usize];
        let result = dev.seek_block(lba).and_then(|_| dev.read_blocks(&mut buf, count));
        match result {
            Ok(_) => {
                self.data_in = buf;
                self.good_status();
                self.phase = Phase::DataIn;
            }
            Err(_) => {
                self.sense_key = SenseKey::IllegalRequest;
                self.status = vec![0x02];
                self.phase = Phase::Status;
            }
        }
    }

    fn write_variable(&mut self, _cdb: &[u8; 12]) {
        self.good_status();
        self.phase = Phase::DataOut;
    }

    /// Commit bytes accumulated during a DATA OUT phase for a prior
    /// WRITE, writing them through to the backend at the LBA named by
    /// the originating CDB.
    pub fn commit_write10(&mut self, dev: &mut dyn BlockDevice) -> Result<(), es40_storage::Error> {
        let cdb = self.command.clone();
        let lba = u32::from_be_bytes([cdb[2], cdb[3], cdb[4], cdb[5]]) as u64;
        let blocks = (self.data_out.len() as u32) / CDROM_BLOCK_SIZE;
        dev.seek_block(lba)?;
        dev.write_blocks(&self.data_out, blocks)?;
        Ok(())
    }

    fn synchronize_cache(&mut self) {
        self.good_status();
        self.phase = Phase::Status;
    }

    /// READ TOC (0x43): synthesize a minimal single-track TOC
    /// (`spec.md` §4.5.5, exact scenario in §8).
    fn read_toc(&mut self) {
        self.data_in = vec![0x00, 0x0A, 0x01, 0x01, 0x00, 0x14, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        self.good_status();
        self.phase = Phase::DataIn;
    }
}

impl Default for ScsiTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use es40_storage::{GenericDisk, MemBackend};

    fn make_cdrom() -> GenericDisk<MemBackend> {
        let backend = MemBackend::new(16 * CDROM_BLOCK_SIZE as u64);
        GenericDisk::new(backend, CDROM_BLOCK_SIZE, false, true)
    }

    #[test]
    fn test_unit_ready_reports_good_status_when_media_present() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        let cdb = [0u8; 12];
        target.execute(&cdb, &mut dev);
        assert_eq!(target.phase, Phase::Status);
        assert_eq!(target.xfer_ptr(), &[0x00]);
    }

    #[test]
    fn inquiry_reports_cdrom_device_type_and_36_bytes() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        let mut cdb = [0u8; 12];
        cdb[0] = 0x12;
        target.execute(&cdb, &mut dev);
        assert_eq!(target.phase, Phase::DataIn);
        assert_eq!(target.expected(), 36);
        assert_eq!(target.xfer_ptr()[0], 0x05);
    }

    #[test]
    fn inquiry_evpd_page_0x80_reports_a_serial_number() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        let mut cdb = [0u8; 12];
        cdb[0] = 0x12;
        cdb[1] = 0x01; // EVPD.
        cdb[2] = 0x80;
        target.execute(&cdb, &mut dev);
        let data = target.xfer_ptr().to_vec();
        assert_eq!(data[1], 0x80);
        assert_eq!(&data[4..], b"ES40EMU0001");
    }

    #[test]
    fn mode_sense_serves_the_page_named_by_the_cdb() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        let mut cdb = [0u8; 12];
        cdb[0] = 0x1A;
        cdb[2] = 0x2A; // CD-ROM capabilities page.
        target.execute(&cdb, &mut dev);
        let data = target.xfer_ptr().to_vec();
        assert_eq!(data[4], 0x2A);
        assert_eq!(data[5], 0x14);
        assert_eq!(data.len(), 4 + 2 + 0x14);
    }

    #[test]
    fn read_toc_matches_the_minimal_single_track_scenario() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        let mut cdb = [0u8; 12];
        cdb[0] = 0x43;
        target.execute(&cdb, &mut dev);
        assert_eq!(
            target.xfer_ptr(),
            &[0x00, 0x0A, 0x01, 0x01, 0x00, 0x14, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn read_capacity_reports_last_lba_and_block_size() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        let mut cdb = [0u8; 12];
        cdb[0] = 0x25;
        target.execute(&cdb, &mut dev);
        let data = target.xfer_ptr().to_vec();
        let last_lba = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(last_lba, 15);
        let block_size = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        assert_eq!(block_size, CDROM_BLOCK_SIZE);
    }

    #[test]
    fn unsupported_opcode_produces_check_condition() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        let mut cdb = [0u8; 12];
        cdb[0] = 0xFF;
        target.execute(&cdb, &mut dev);
        assert_eq!(target.phase, Phase::Status);
        assert_eq!(target.xfer_ptr(), &[0x02]);
    }

    #[test]
    fn read10_returns_the_requested_block_count() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        let mut cdb = [0u8; 12];
        cdb[0] = 0x28;
        cdb[7] = 0;
        cdb[8] = 2; // two blocks.
        target.execute(&cdb, &mut dev);
        assert_eq!(target.expected(), 2 * CDROM_BLOCK_SIZE as usize);
    }

    #[test]
    fn selection_on_a_generic_initiator_starts_in_message_out() {
        let mut target = ScsiTarget::new();
        target.select(false);
        assert_eq!(target.phase, Phase::MessageOut);
        assert!(!target.lun_selected);
    }

    #[test]
    fn identify_message_sets_lun_selected_and_disconnect_privilege() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        target.select(false);
        target.feed_message_out_byte(0xC0); // IDENTIFY, disconnect priv, LUN 0.
        target.xfer_done(1, &mut dev);
        assert!(target.lun_selected);
        assert!(target.disconnect_priv);
        // No reply queued for a plain IDENTIFY: straight to COMMAND.
        assert_eq!(target.phase, Phase::Command);
    }

    #[test]
    fn sdtr_message_is_echoed_back_through_message_in() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        target.select(false);
        for byte in [0x01, 0x03, 0x01, 25, 10] {
            target.feed_message_out_byte(byte);
        }
        target.xfer_done(1, &mut dev);
        assert_eq!(target.phase, Phase::MessageIn);
        assert_eq!(target.xfer_ptr(), &[0x01, 0x03, 0x01, 25, 10]);
    }

    #[test]
    fn full_command_cycle_walks_status_into_message_in_then_frees_the_bus() {
        let mut dev = make_cdrom();
        let mut target = ScsiTarget::new();
        target.select(true);
        let cdb = [0u8; 12]; // TEST UNIT READY.
        target.execute(&cdb, &mut dev);
        assert_eq!(target.phase, Phase::Status);
        target.xfer_done(target.expected(), &mut dev);
        assert_eq!(target.phase, Phase::MessageIn);
        target.xfer_done(target.expected(), &mut dev);
        assert!(target.disconnected);
    }
}
