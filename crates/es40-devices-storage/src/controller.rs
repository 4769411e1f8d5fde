use crate::atapi::{AtapiPacket, PacketPhase};
use crate::dma::{BusMasterChannel, DmaOutcome, GuestMemory};
use crate::drive::AtaDrive;
use crate::identify::{identify_device, identify_packet_device};
use crate::scsi::{Phase as ScsiPhase, ScsiTarget};
use crate::taskfile::{ErrorFlags, InterruptReason, Status, TaskFile};

const CMD_DEVICE_RESET: u8 = 0x08;
const CMD_RECALIBRATE: u8 = 0x10;
const CMD_READ_SECTORS: u8 = 0x20;
const CMD_READ_SECTORS_RETRY: u8 = 0x21;
const CMD_WRITE_SECTORS: u8 = 0x30;
const CMD_WRITE_SECTORS_RETRY: u8 = 0x31;
const CMD_SEEK: u8 = 0x70;
const CMD_EXECUTE_DEVICE_DIAGNOSTIC: u8 = 0x90;
const CMD_INIT_DEVICE_PARAMS: u8 = 0x91;
const CMD_PACKET: u8 = 0xA0;
const CMD_IDENTIFY_PACKET_DEVICE: u8 = 0xA1;
const CMD_SET_MULTIPLE_MODE: u8 = 0xC6;
const CMD_READ_DMA: u8 = 0xC8;
const CMD_READ_DMA_EXT: u8 = 0xC9;
const CMD_WRITE_DMA: u8 = 0xCA;
const CMD_WRITE_DMA_EXT: u8 = 0xCB;
const CMD_FLUSH_CACHE: u8 = 0xE7;
const CMD_IDENTIFY_DEVICE: u8 = 0xEC;
const CMD_SET_FEATURES: u8 = 0xEF;

/// Which direction a staged DMA command will move bytes once the guest
/// triggers the bus-master engine (`spec.md` §4.5.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DmaDirection {
    /// READ DMA: disk contents flow into guest memory.
    ReadFromDisk,
    /// WRITE DMA: guest memory supplies bytes this channel writes to disk.
    WriteToDisk,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DriveSelect {
    Master,
    Slave,
}

/// One IDE channel (primary or secondary): task-file registers, up to
/// two attached drives, and the PIO/ATAPI/SCSI state needed to carry a
/// command to completion (`spec.md` §4.5).
pub struct IdeChannel {
    pub taskfile: TaskFile,
    drives: [Option<AtaDrive>; 2],
    pio_buffer: Vec<u8>,
    pio_pos: usize,
    atapi: AtapiPacket,
    scsi: ScsiTarget,
    pub irq_pending: bool,
    pub bus_master: BusMasterChannel,
    dma_pending: Option<DmaDirection>,
    dma_lba: u64,
    device_control: u8,
    /// §4.5.3: true while `tick()` still has work to do for the command
    /// named by `taskfile.command`. ATAPI PACKET commands clear this
    /// immediately — their own `NONE/DP1/DP2/DP34/DI` machine (§4.5.5)
    /// progresses from host reads/writes of the data port instead.
    command_in_progress: bool,
    multiple_sector_count: u8,
}

impl IdeChannel {
    pub fn new() -> Self {
        IdeChannel {
            taskfile: TaskFile::default(),
            drives: [None, None],
            pio_buffer: Vec::new(),
            pio_pos: 0,
            atapi: AtapiPacket::new(),
            scsi: ScsiTarget::new(),
            irq_pending: false,
            bus_master: BusMasterChannel::new(),
            dma_pending: None,
            dma_lba: 0,
            device_control: 0,
            command_in_progress: false,
            multiple_sector_count: 1,
        }
    }

    /// Write to the device control register (0x3F6/0x376): bit 1 is
    /// nIEN (interrupts masked while set), bit 2 triggers a software
    /// reset for as long as it stays set (`spec.md` §4.5.1). A rising
    /// edge asserts BUSY and clears pending work; the falling edge
    /// clears BUSY and re-applies the device signature.
    pub fn write_device_control(&mut self, value: u8) {
        let was_reset = self.device_control & 0x04 != 0;
        let now_reset = value & 0x04 != 0;
        self.device_control = value;
        if !was_reset && now_reset {
            self.taskfile.error = 0;
            self.set_status(Status::BUSY);
            self.pio_buffer.clear();
            self.pio_pos = 0;
            self.dma_pending = None;
            self.irq_pending = false;
            self.command_in_progress = false;
            self.atapi = AtapiPacket::new();
        } else if was_reset && !now_reset {
            self.apply_device_signature();
            let mut status = self.status();
            status.remove(Status::BUSY);
            status.insert(Status::READY);
            self.set_status(status);
        }
    }

    /// Fill the task-file registers with the post-reset signature
    /// (`spec.md` §4.5.2).
    fn apply_device_signature(&mut self) {
        self.taskfile.drive_head &= 0xF0; // head = 0, preserve drive-select bits.
        self.taskfile.sector_count = 1;
        self.taskfile.sector_number = 1;
        let cylinder: u16 = match self.selected_drive() {
            Some(d) if d.is_atapi() => 0xEB14,
            Some(_) => 0x0000,
            None => 0xFFFF,
        };
        self.taskfile.cylinder_low = (cylinder & 0xFF) as u8;
        self.taskfile.cylinder_high = (cylinder >> 8) as u8;
    }

    /// Read of the alternate status register (0x3F6/0x376): identical to
    /// the command-block status register but never clears a pending
    /// interrupt as a read of 0x1F7/0x177 would.
    pub fn read_alt_status(&self) -> u8 {
        self.taskfile.status
    }

    /// Whether this channel's interrupt line is currently allowed to
    /// reach the PIC, per the nIEN bit in the device control register.
    pub fn interrupts_enabled(&self) -> bool {
        self.device_control & 0x02 == 0
    }

    /// Write to the bus-master command register (offset 0 of the
    /// bus-master block). A rising edge of the start bit while a DMA
    /// command is staged runs the transfer immediately against `mem`;
    /// this subsystem has no mid-transfer suspension (`spec.md` §5).
    pub fn write_bus_master_command(&mut self, value: u8, mem: &mut dyn GuestMemory) {
        let was_active = self.bus_master.is_active();
        self.bus_master.command = value;
        if !was_active && self.bus_master.is_active() {
            self.bus_master.status |= 1; // ACTIVE
            self.run_staged_dma(mem);
        } else if !self.bus_master.is_active() {
            self.bus_master.status &= !1;
        }
    }

    pub fn write_bus_master_status(&mut self, value: u8) {
        // Bits 1 (error) and 2 (interrupt) are host write-one-to-clear;
        // the rest of the register is read-only from the host's side.
        self.bus_master.status &= !(value & 0b0000_0110);
    }

    pub fn write_bus_master_prd_address(&mut self, shift: u8, byte: u8) {
        let mask = !(0xFFu32 << shift);
        self.bus_master.prd_table_address =
            (self.bus_master.prd_table_address & mask) | ((byte as u32) << shift);
    }

    fn run_staged_dma(&mut self, mem: &mut dyn GuestMemory) {
        let Some(direction) = self.dma_pending else {
            return;
        };
        match direction {
            DmaDirection::ReadFromDisk => {
                let outcome = self.bus_master.run_transfer(mem, &mut self.pio_buffer);
                if matches!(outcome, DmaOutcome::Completed | DmaOutcome::PrdTooShort) {
                    self.dma_pending = None;
                    self.finish_dma(outcome);
                }
            }
            DmaDirection::WriteToDisk => {
                let outcome = self.bus_master.run_transfer(mem, &mut self.pio_buffer);
                if matches!(outcome, DmaOutcome::Completed | DmaOutcome::PrdTooShort) {
                    let buf = std::mem::take(&mut self.pio_buffer);
                    let count = self.taskfile.sector_count.max(1) as u32;
                    let lba = self.dma_lba;
                    self.dma_pending = None;
                    if let Some(drive) = self.selected_drive_mut() {
                        let dev = drive.block_device_mut();
                        let _ = dev.seek_block(lba).and_then(|_| dev.write_blocks(&buf, count));
                    }
                    self.finish_dma(outcome);
                }
            }
        }
    }

    fn finish_dma(&mut self, outcome: DmaOutcome) {
        match outcome {
            DmaOutcome::Completed => self.set_status(Status::READY | Status::SEEK_COMPLETE),
            _ => self.set_status(Status::READY | Status::ERROR),
        }
        self.irq_pending = true;
    }

    pub fn attach(&mut self, select: DriveSelect, drive: AtaDrive) {
        self.drives[select as usize] = Some(drive);
    }

    fn selected(&self) -> DriveSelect {
        if self.taskfile.slave_selected() {
            DriveSelect::Slave
        } else {
            DriveSelect::Master
        }
    }

    fn selected_drive(&self) -> Option<&AtaDrive> {
        self.drives[self.selected() as usize].as_ref()
    }

    fn selected_drive_mut(&mut self) -> Option<&mut AtaDrive> {
        self.drives[self.selected() as usize].as_mut()
    }

    fn set_status(&mut self, status: Status) {
        self.taskfile.status = status.bits();
    }

    fn status(&self) -> Status {
        Status::from_bits_truncate(self.taskfile.status)
    }

    fn abort_command(&mut self, error: ErrorFlags) {
        self.command_in_progress = false;
        self.set_status(Status::READY | Status::ERROR);
        self.taskfile.error = error.bits();
        self.irq_pending = true;
    }

    /// Word-wide read from the data register (0x1F0 / 0x170).
    pub fn read_data(&mut self) -> u16 {
        if self.pio_pos + 1 < self.pio_buffer.len() {
            let lo = self.pio_buffer[self.pio_pos];
            let hi = self.pio_buffer[self.pio_pos + 1];
            self.pio_pos += 2;
            if self.pio_pos >= self.pio_buffer.len() {
                self.finish_pio_in();
            }
            u16::from_le_bytes([lo, hi])
        } else {
            0
        }
    }

    fn finish_pio_in(&mut self) {
        self.pio_buffer.clear();
        self.pio_pos = 0;
        if self.taskfile.command == CMD_PACKET {
            self.finish_atapi_data_phase();
        } else {
            self.set_status(Status::READY | Status::SEEK_COMPLETE);
        }
    }

    /// Word-wide write to the data register.
    pub fn write_data(&mut self, value: u16) {
        if self.taskfile.command == CMD_PACKET && self.atapi.phase == PacketPhase::Dp1 {
            if let Some(cdb) = self.atapi.feed_command_word(value) {
                self.dispatch_atapi_dp2(cdb);
            }
            return;
        }

        if self.pio_pos + 1 < self.pio_buffer.len() {
            let bytes = value.to_le_bytes();
            self.pio_buffer[self.pio_pos] = bytes[0];
            self.pio_buffer[self.pio_pos + 1] = bytes[1];
            self.pio_pos += 2;
            if self.pio_pos >= self.pio_buffer.len() {
                self.finish_pio_out();
            }
        }
    }

    fn finish_pio_out(&mut self) {
        if self.taskfile.command == CMD_PACKET {
            self.finish_atapi_data_phase();
            return;
        }
        let lba = self.taskfile.lba28() as u64;
        let count = self.taskfile.sector_count.max(1) as u32;
        let buf = std::mem::take(&mut self.pio_buffer);
        self.pio_pos = 0;
        if let Some(drive) = self.selected_drive_mut() {
            let dev = drive.block_device_mut();
            let result = dev.seek_block(lba).and_then(|_| dev.write_blocks(&buf, count));
            match result {
                Ok(_) => self.set_status(Status::READY | Status::SEEK_COMPLETE),
                Err(_) => self.set_status(Status::READY | Status::ERROR),
            }
        }
        self.irq_pending = true;
    }

    /// Write to one of the non-data task-file registers (offsets 1..7
    /// from the command block base).
    pub fn write_register(&mut self, offset: u16, value: u8) {
        match offset {
            1 => self.taskfile.features = value,
            2 => self.taskfile.sector_count = value,
            3 => self.taskfile.sector_number = value,
            4 => self.taskfile.cylinder_low = value,
            5 => self.taskfile.cylinder_high = value,
            6 => self.taskfile.drive_head = value,
            7 => self.execute_command(value),
            _ => {}
        }
    }

    pub fn read_register(&self, offset: u16) -> u8 {
        match offset {
            1 => self.taskfile.error,
            2 => {
                if self.taskfile.command == CMD_PACKET {
                    self.atapi.interrupt_reason().bits()
                } else {
                    self.taskfile.sector_count
                }
            }
            3 => self.taskfile.sector_number,
            4 => self.taskfile.cylinder_low,
            5 => self.taskfile.cylinder_high,
            6 => self.taskfile.drive_head,
            7 => self.taskfile.status,
            _ => 0xFF,
        }
    }

    /// A host write to the command register: record the command, clear
    /// `drq`, set `busy`, and arm `command_in_progress` so the next
    /// `tick()` carries it out per the table in `spec.md` §4.5.3.
    fn execute_command(&mut self, command: u8) {
        tracing::trace!(command, "IDE command dispatch");
        self.irq_pending = false;

        if self.selected_drive().is_none() && command != CMD_EXECUTE_DEVICE_DIAGNOSTIC {
            self.taskfile.command = command;
            self.set_status(Status::READY | Status::ERROR);
            self.taskfile.error = ErrorFlags::ABORT.bits();
            self.irq_pending = true;
            return;
        }

        self.taskfile.command = command;
        self.taskfile.error = 0;
        self.pio_pos = 0;
        let mut status = self.status();
        status.remove(Status::DRQ);
        status.insert(Status::BUSY);
        self.set_status(status);

        if command == CMD_PACKET {
            // The ATAPI packet machine is host-I/O-driven, not
            // tick-driven: it has no entry in the §4.5.3 table.
            self.command_in_progress = false;
            match self.atapi.begin_command(self.taskfile.features & 0x02 != 0, self.taskfile.features & 0x01 != 0) {
                Ok(()) => self.set_status(Status::READY | Status::DRQ),
                Err(()) => self.abort_command(ErrorFlags::ABORT),
            }
        } else {
            self.command_in_progress = true;
        }
    }

    /// Advance whichever command is in progress by one step, per the
    /// per-tick dispatch table in `spec.md` §4.5.3. Every command this
    /// subsystem models is synchronous against the backing store, so one
    /// call here carries a command to completion; `command_in_progress`
    /// exists so callers that never invoke `tick()` leave a command
    /// staged rather than silently finished.
    pub fn tick(&mut self) {
        if !self.command_in_progress {
            return;
        }
        match self.taskfile.command {
            0x00 => self.tick_nop(),
            CMD_DEVICE_RESET => self.tick_device_reset(),
            CMD_RECALIBRATE => self.tick_recalibrate(),
            CMD_READ_SECTORS | CMD_READ_SECTORS_RETRY => self.tick_read_sectors(),
            CMD_WRITE_SECTORS | CMD_WRITE_SECTORS_RETRY => self.tick_write_sectors_setup(),
            CMD_SEEK => self.tick_seek(),
            CMD_INIT_DEVICE_PARAMS => self.tick_init_device_params(),
            CMD_IDENTIFY_PACKET_DEVICE => self.tick_identify(true),
            CMD_IDENTIFY_DEVICE => self.tick_identify(false),
            CMD_SET_MULTIPLE_MODE => self.tick_set_multiple_mode(),
            CMD_READ_DMA | CMD_READ_DMA_EXT => self.tick_read_dma_setup(),
            CMD_WRITE_DMA | CMD_WRITE_DMA_EXT => self.tick_write_dma_setup(),
            0xE0..=0xE3 | 0xE6 | CMD_FLUSH_CACHE | 0xEA => self.tick_accept_silently(),
            CMD_SET_FEATURES => self.tick_set_features(),
            CMD_EXECUTE_DEVICE_DIAGNOSTIC => self.tick_execute_diagnostic(),
            _ => self.abort_command(ErrorFlags::ABORT),
        }
    }

    fn tick_nop(&mut self) {
        self.abort_command(ErrorFlags::ABORT);
        let mut status = self.status();
        status.insert(Status::WRITE_FAULT);
        self.set_status(status);
    }

    fn tick_device_reset(&mut self) {
        self.command_in_progress = false;
        self.apply_device_signature();
        self.taskfile.error = 0;
        self.set_status(Status::READY);
    }

    fn tick_recalibrate(&mut self) {
        self.command_in_progress = false;
        self.taskfile.cylinder_low = 0;
        self.taskfile.cylinder_high = 0;
        self.set_status(Status::READY | Status::SEEK_COMPLETE);
        self.irq_pending = true;
    }

    fn tick_seek(&mut self) {
        self.command_in_progress = false;
        match self.selected_drive() {
            Some(d) if !d.is_atapi() => {
                self.set_status(Status::READY | Status::SEEK_COMPLETE);
                self.irq_pending = true;
            }
            _ => self.abort_command(ErrorFlags::ABORT),
        }
    }

    fn tick_init_device_params(&mut self) {
        self.command_in_progress = false;
        let requested_heads = (self.taskfile.drive_head & 0x0F) as u32 + 1;
        let requested_sectors = self.taskfile.sector_count as u32;
        let matches = matches!(
            self.selected_drive(),
            Some(d) if !d.is_atapi()
                && d.block_device().get_heads() == requested_heads
                && d.block_device().get_sectors() == requested_sectors
        );
        if matches {
            self.set_status(Status::READY | Status::SEEK_COMPLETE);
            self.irq_pending = true;
        } else {
            self.abort_command(ErrorFlags::ABORT);
        }
    }

    fn tick_set_multiple_mode(&mut self) {
        self.command_in_progress = false;
        match self.selected_drive() {
            Some(d) if !d.is_atapi() => {
                self.multiple_sector_count = self.taskfile.sector_count;
                self.set_status(Status::READY);
                self.irq_pending = true;
            }
            _ => self.abort_command(ErrorFlags::ABORT),
        }
    }

    fn tick_accept_silently(&mut self) {
        self.command_in_progress = false;
        let mut status = self.status();
        status.remove(Status::BUSY | Status::ERROR);
        status.insert(Status::READY | Status::SEEK_COMPLETE);
        self.set_status(status);
        self.irq_pending = true;
    }

    fn tick_set_features(&mut self) {
        self.command_in_progress = false;
        let subcommand = self.taskfile.features;
        let mode = self.taskfile.sector_count;
        let ok = match subcommand {
            0x03 => matches!(mode, 0x00..=0x0F | 0x20..=0x22), // PIO or MWDMA0-2.
            _ => true,
        };
        if ok {
            self.set_status(Status::READY);
            self.irq_pending = true;
        } else {
            self.abort_command(ErrorFlags::ABORT);
        }
    }

    fn tick_execute_diagnostic(&mut self) {
        self.command_in_progress = false;
        self.taskfile.error = 0x01; // no error detected, drive 0 passed.
        self.set_status(Status::READY);
    }

    fn tick_identify(&mut self, packet: bool) {
        self.command_in_progress = false;
        let words = match (packet, self.selected_drive()) {
            (false, Some(drive)) if !drive.is_atapi() => identify_device(drive.block_device()),
            (true, Some(drive)) if drive.is_atapi() => {
                identify_packet_device(&drive.model, &drive.serial, &drive.rev)
            }
            _ => {
                self.abort_command(ErrorFlags::ABORT);
                return;
            }
        };
        let mut bytes = Vec::with_capacity(512);
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        self.pio_buffer = bytes;
        self.pio_pos = 0;
        self.set_status(Status::READY | Status::DRQ);
        self.irq_pending = true;
    }

    fn tick_read_sectors(&mut self) {
        self.command_in_progress = false;
        let lba = self.taskfile.lba28() as u64;
        let count = self.taskfile.sector_count.max(1) as u32;
        let block_size = self
            .selected_drive()
            .map(|d| d.block_device().get_block_size())
            .unwrap_or(512);
        let mut buf = vec![0u8; count as usize * block_size as usize];
        if let Some(drive) = self.selected_drive_mut() {
            let dev = drive.block_device_mut();
            let result = dev.seek_block(lba).and_then(|_| dev.read_blocks(&mut buf, count));
            match result {
                Ok(_) => {
                    self.pio_buffer = buf;
                    self.pio_pos = 0;
                    self.set_status(Status::READY | Status::DRQ);
                }
                Err(_) => {
                    self.set_status(Status::READY | Status::ERROR);
                    self.taskfile.error = ErrorFlags::ID_NOT_FOUND.bits();
                }
            }
        }
        self.irq_pending = true;
    }

    fn tick_write_sectors_setup(&mut self) {
        self.command_in_progress = false;
        let block_size = self
            .selected_drive()
            .map(|d| d.block_device().get_block_size())
            .unwrap_or(512);
        let count = self.taskfile.sector_count.max(1) as usize;
        self.pio_buffer = vec![0u8; count * block_size as usize];
        self.pio_pos = 0;
        self.set_status(Status::READY | Status::DRQ);
    }

    /// READ DMA (0xC8/0xC9): stage the sectors into the channel buffer
    /// now (disk reads are synchronous in this model, `spec.md` §5), set
    /// BUSY, and wait for the guest to trigger the bus-master engine to
    /// actually move the bytes into its memory (`spec.md` §4.5.6).
    fn tick_read_dma_setup(&mut self) {
        self.command_in_progress = false;
        let lba = self.taskfile.lba28() as u64;
        let count = self.taskfile.sector_count.max(1) as u32;
        let block_size = self
            .selected_drive()
            .map(|d| d.block_device().get_block_size())
            .unwrap_or(512);
        let mut buf = vec![0u8; count as usize * block_size as usize];
        if let Some(drive) = self.selected_drive_mut() {
            let dev = drive.block_device_mut();
            match dev.seek_block(lba).and_then(|_| dev.read_blocks(&mut buf, count)) {
                Ok(_) => {
                    self.pio_buffer = buf;
                    self.pio_pos = 0;
                    self.dma_pending = Some(DmaDirection::ReadFromDisk);
                    self.set_status(Status::BUSY);
                }
                Err(_) => {
                    self.set_status(Status::READY | Status::ERROR);
                    self.taskfile.error = ErrorFlags::ID_NOT_FOUND.bits();
                    self.irq_pending = true;
                }
            }
        }
    }

    /// WRITE DMA (0xCA/0xCB): arm an empty buffer of the requested size;
    /// the bus-master engine fills it from guest memory, then this
    /// channel writes it through to the backing store.
    fn tick_write_dma_setup(&mut self) {
        self.command_in_progress = false;
        let block_size = self
            .selected_drive()
            .map(|d| d.block_device().get_block_size())
            .unwrap_or(512);
        let count = self.taskfile.sector_count.max(1) as usize;
        self.pio_buffer = vec![0u8; count * block_size as usize];
        self.pio_pos = 0;
        self.dma_lba = self.taskfile.lba28() as u64;
        self.dma_pending = Some(DmaDirection::WriteToDisk);
        self.set_status(Status::BUSY);
    }

    /// DP2: decode the packet command and enter DP34 (data phase) or DI
    /// (no data phase) per `spec.md` §4.5.5. Dispatch itself is handed
    /// off to the `ScsiTarget`'s command table (`spec.md` §4.6), which
    /// this transport enters directly (no MSG_OUT negotiation).
    fn dispatch_atapi_dp2(&mut self, cdb: [u8; 12]) {
        tracing::trace!(opcode = cdb[0], "ATAPI packet dispatched");
        let idx = self.selected() as usize;
        // Indexed directly (rather than through `selected_drive_mut`) so
        // the borrow checker sees this touches only `self.drives`, not
        // `self.scsi`, which the very next statement also borrows.
        let Some(drive) = self.drives[idx].as_mut() else {
            self.abort_command(ErrorFlags::ABORT);
            return;
        };
        let dev = drive.block_device_mut();
        self.scsi.select(true);
        self.scsi.execute(&cdb, dev);
        tracing::trace!(phase = ?self.scsi.phase, "ATAPI phase transition");
        match self.scsi.phase {
            ScsiPhase::DataIn => {
                self.atapi.enter_dp34(false);
                self.pio_buffer = self.scsi.xfer_ptr().to_vec();
                self.pio_pos = 0;
                self.set_status(Status::READY | Status::DRQ);
                self.irq_pending = true;
            }
            ScsiPhase::DataOut => {
                self.atapi.enter_dp34(true);
                self.set_status(Status::READY | Status::DRQ);
                self.irq_pending = true;
            }
            _ => {
                self.atapi.enter_di();
                self.set_status(Status::READY);
                self.irq_pending = true;
            }
        }
    }

    /// DP34 drained by the host's PIO reads/writes: commit any pending
    /// write, then move to DI (`spec.md` §4.5.5).
    fn finish_atapi_data_phase(&mut self) {
        if self.scsi.phase == ScsiPhase::DataOut {
            let idx = self.selected() as usize;
            if let Some(drive) = self.drives[idx].as_mut() {
                let dev = drive.block_device_mut();
                let _ = self.scsi.commit_write10(dev);
            }
        }
        self.atapi.enter_di();
        self.set_status(Status::READY | Status::SEEK_COMPLETE);
        self.irq_pending = true;
    }

    pub fn interrupt_reason(&self) -> InterruptReason {
        self.atapi.interrupt_reason()
    }
}

impl Default for IdeChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use es40_storage::{GenericDisk, MemBackend};

    fn ata_drive(sectors: u64) -> AtaDrive {
        let backend = MemBackend::new(sectors * 512);
        let disk = GenericDisk::new(backend, 512, false, false).with_identity("S1", "R1", "M1");
        AtaDrive::new_ata(Box::new(disk))
    }

    #[test]
    fn identify_device_sets_drq_and_fills_512_bytes() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, ata_drive(64));
        ch.write_register(7, CMD_IDENTIFY_DEVICE);
        ch.tick();
        assert!(ch.status().contains(Status::DRQ));
        let mut words = Vec::new();
        for _ in 0..256 {
            words.push(ch.read_data());
        }
        assert_eq!(words[1], ch.selected_drive().unwrap().block_device().get_cylinders() as u16);
        assert!(!ch.status().contains(Status::DRQ));
    }

    #[test]
    fn read_sectors_transfers_the_requested_block() {
        let mut ch = IdeChannel::new();
        let mut drive = ata_drive(8);
        {
            let dev = drive.block_device_mut();
            dev.seek_block(2).unwrap();
            dev.write_blocks(&[0xCDu8; 512], 1).unwrap();
        }
        ch.attach(DriveSelect::Master, drive);
        ch.taskfile.set_lba28(2);
        ch.taskfile.sector_count = 1;
        ch.taskfile.drive_head |= 1 << 6; // LBA mode.
        ch.write_register(7, CMD_READ_SECTORS);
        ch.tick();
        assert!(ch.status().contains(Status::DRQ));
        let first_word = ch.read_data();
        assert_eq!(first_word, 0xCDCD);
    }

    #[test]
    fn missing_drive_aborts_the_command() {
        let mut ch = IdeChannel::new();
        ch.write_register(7, CMD_IDENTIFY_DEVICE);
        assert!(ch.status().contains(Status::ERROR));
        assert!(ch.irq_pending);
    }

    #[test]
    fn execute_device_diagnostic_reports_drive_0_passed() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, ata_drive(8));
        ch.write_register(7, CMD_EXECUTE_DEVICE_DIAGNOSTIC);
        ch.tick();
        assert_eq!(ch.taskfile.error, 0x01);
        assert!(ch.status().contains(Status::READY));
    }

    #[test]
    fn nop_aborts_with_error_and_write_fault() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, ata_drive(8));
        ch.write_register(7, 0x00);
        ch.tick();
        assert!(ch.status().contains(Status::ERROR | Status::WRITE_FAULT));
        assert!(ch.irq_pending);
    }

    #[test]
    fn device_reset_restores_signature_without_an_interrupt() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, ata_drive(8));
        ch.write_register(7, CMD_DEVICE_RESET);
        ch.tick();
        assert_eq!(ch.taskfile.cylinder_low, 0);
        assert_eq!(ch.taskfile.cylinder_high, 0);
        assert!(!ch.irq_pending);
    }

    #[test]
    fn init_device_params_succeeds_only_for_matching_geometry() {
        let mut ch = IdeChannel::new();
        let drive = ata_drive(64);
        let heads = drive.block_device().get_heads();
        let sectors = drive.block_device().get_sectors();
        ch.attach(DriveSelect::Master, drive);
        ch.taskfile.drive_head = (heads - 1) as u8;
        ch.taskfile.sector_count = sectors as u8;
        ch.write_register(7, CMD_INIT_DEVICE_PARAMS);
        ch.tick();
        assert!(ch.status().contains(Status::READY));
        assert!(!ch.status().contains(Status::ERROR));
    }

    #[test]
    fn init_device_params_aborts_on_geometry_mismatch() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, ata_drive(64));
        ch.taskfile.drive_head = 0xFF; // bogus head count.
        ch.taskfile.sector_count = 0xFF;
        ch.write_register(7, CMD_INIT_DEVICE_PARAMS);
        ch.tick();
        assert!(ch.status().contains(Status::ERROR));
    }

    #[test]
    fn command_stays_staged_until_tick_advances_it() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, ata_drive(8));
        ch.write_register(7, CMD_EXECUTE_DEVICE_DIAGNOSTIC);
        assert!(ch.status().contains(Status::BUSY));
        assert_eq!(ch.taskfile.error, 0);
        ch.tick();
        assert_eq!(ch.taskfile.error, 0x01);
    }

    struct FlatMemory {
        bytes: Vec<u8>,
    }

    impl GuestMemory for FlatMemory {
        fn read(&mut self, addr: u32, buf: &mut [u8]) {
            let start = addr as usize;
            let n = buf.len().min(self.bytes.len().saturating_sub(start));
            buf[..n].copy_from_slice(&self.bytes[start..start + n]);
        }

        fn write(&mut self, addr: u32, buf: &[u8]) {
            let start = addr as usize;
            self.bytes[start..start + buf.len()].copy_from_slice(buf);
        }
    }

    fn flat_memory_with_prd(data_addr: u32, byte_count: u32) -> FlatMemory {
        let mut bytes = vec![0u8; 65536];
        bytes[0..4].copy_from_slice(&data_addr.to_le_bytes());
        bytes[4..8].copy_from_slice(&(byte_count | 0x8000_0000).to_le_bytes());
        FlatMemory { bytes }
    }

    #[test]
    fn read_dma_moves_disk_contents_into_guest_memory() {
        let mut ch = IdeChannel::new();
        let mut drive = ata_drive(8);
        drive.block_device_mut().seek_block(0).unwrap();
        drive.block_device_mut().write_blocks(&[0x42u8; 512], 1).unwrap();
        ch.attach(DriveSelect::Master, drive);
        ch.taskfile.sector_count = 1;
        ch.taskfile.drive_head |= 1 << 6; // LBA mode.
        ch.write_register(7, CMD_READ_DMA);
        ch.tick();
        assert!(ch.status().contains(Status::BUSY));

        let mut mem = flat_memory_with_prd(4096, 512);
        ch.write_bus_master_command(0x01, &mut mem); // START, read-from-disk.
        assert!(!ch.bus_master.is_active());
        assert!(ch.status().contains(Status::READY));
        assert_eq!(&mem.bytes[4096..4096 + 512], &[0x42u8; 512][..]);
    }

    #[test]
    fn write_dma_pulls_guest_memory_through_to_the_disk() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, ata_drive(8));
        ch.taskfile.sector_count = 1;
        ch.taskfile.drive_head |= 1 << 6;
        ch.write_register(7, CMD_WRITE_DMA);
        ch.tick();
        assert!(ch.status().contains(Status::BUSY));

        let mut mem = flat_memory_with_prd(4096, 512);
        mem.bytes[4096..4096 + 512].copy_from_slice(&[0x99u8; 512]);
        // bit 3 set: write-to-disk direction.
        ch.write_bus_master_command(0x01 | 0x08, &mut mem);
        assert!(ch.status().contains(Status::READY));

        let drive = ch.selected_drive_mut().unwrap();
        let dev = drive.block_device_mut();
        let mut readback = [0u8; 512];
        dev.seek_block(0).unwrap();
        dev.read_blocks(&mut readback, 1).unwrap();
        assert_eq!(readback, [0x99u8; 512]);
    }

    fn atapi_drive() -> AtaDrive {
        let backend = MemBackend::new(16 * 2048);
        let disk = GenericDisk::new(backend, 2048, false, true).with_identity("S1", "R1", "CDROM");
        AtaDrive::new_atapi(Box::new(disk))
    }

    fn send_packet(ch: &mut IdeChannel, cdb: [u8; 12]) {
        ch.write_register(1, 0); // features: PIO, no overlap.
        ch.write_register(7, CMD_PACKET);
        assert!(ch.status().contains(Status::DRQ));
        for chunk in cdb.chunks(2) {
            ch.write_data(u16::from_le_bytes([chunk[0], chunk[1]]));
        }
    }

    #[test]
    fn atapi_packet_walks_dp1_through_dp34_to_di() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, atapi_drive());
        let mut cdb = [0u8; 12];
        cdb[0] = 0x25; // READ CAPACITY.
        send_packet(&mut ch, cdb);
        assert_eq!(ch.atapi.phase, PacketPhase::Dp34);
        assert!(ch.status().contains(Status::DRQ));
        let _ = ch.read_data();
        let _ = ch.read_data();
        let _ = ch.read_data();
        let _ = ch.read_data();
        assert_eq!(ch.atapi.phase, PacketPhase::Di);
        assert!(!ch.status().contains(Status::DRQ));
    }

    #[test]
    fn atapi_read_toc_returns_the_twelve_literal_bytes() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, atapi_drive());
        let mut cdb = [0u8; 12];
        cdb[0] = 0x43;
        send_packet(&mut ch, cdb);
        let mut bytes = Vec::new();
        for _ in 0..6 {
            let word = ch.read_data();
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        assert_eq!(
            bytes,
            vec![0x00, 0x0A, 0x01, 0x01, 0x00, 0x14, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn atapi_test_unit_ready_has_no_data_phase_and_goes_straight_to_di() {
        let mut ch = IdeChannel::new();
        ch.attach(DriveSelect::Master, atapi_drive());
        send_packet(&mut ch, [0u8; 12]);
        assert_eq!(ch.atapi.phase, PacketPhase::Di);
        assert!(!ch.status().contains(Status::DRQ));
        assert!(ch.irq_pending);
    }
}
