use es40_storage::BlockDevice;

/// A single ATA or ATAPI drive attached to one side of an IDE channel.
pub enum DriveKind {
    Ata(Box<dyn BlockDevice>),
    Atapi(Box<dyn BlockDevice>),
}

pub struct AtaDrive {
    pub kind: DriveKind,
    pub model: String,
    pub serial: String,
    pub rev: String,
}

impl AtaDrive {
    pub fn new_ata(backend: Box<dyn BlockDevice>) -> Self {
        AtaDrive {
            model: backend.get_model().to_string(),
            serial: backend.get_serial().to_string(),
            rev: backend.get_rev().to_string(),
            kind: DriveKind::Ata(backend),
        }
    }

    pub fn new_atapi(backend: Box<dyn BlockDevice>) -> Self {
        AtaDrive {
            model: backend.get_model().to_string(),
            serial: backend.get_serial().to_string(),
            rev: backend.get_rev().to_string(),
            kind: DriveKind::Atapi(backend),
        }
    }

    pub fn is_atapi(&self) -> bool {
        matches!(self.kind, DriveKind::Atapi(_))
    }

    pub fn block_device(&self) -> &dyn BlockDevice {
        match &self.kind {
            DriveKind::Ata(b) => b.as_ref(),
            DriveKind::Atapi(b) => b.as_ref(),
        }
    }

    pub fn block_device_mut(&mut self) -> &mut dyn BlockDevice {
        match &mut self.kind {
            DriveKind::Ata(b) => b.as_mut(),
            DriveKind::Atapi(b) => b.as_mut(),
        }
    }
}
