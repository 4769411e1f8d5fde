use crate::SharedPic;

/// Capability handed to devices so they can request an interrupt without
/// owning the PIC (`spec.md` §9 "Cyclic references"). `line` is a flat
/// IRQ number 0..=15; lines 8..=15 address the slave PIC and cascade
/// through master line 2 automatically.
pub trait InterruptSink: Send {
    fn assert(&self, line: u8);
    fn deassert(&self, line: u8);
}

fn split(line: u8) -> (usize, u8) {
    if line < 8 {
        (0, line)
    } else {
        (1, line - 8)
    }
}

/// The concrete [`InterruptSink`] backed by the shared PIC pair.
#[derive(Clone)]
pub struct PicSink {
    pic: SharedPic,
}

impl PicSink {
    pub fn new(pic: SharedPic) -> Self {
        PicSink { pic }
    }
}

impl InterruptSink for PicSink {
    fn assert(&self, line: u8) {
        let (bank, bit) = split(line);
        self.pic.lock().interrupt(bank, bit);
    }

    fn deassert(&self, line: u8) {
        let (bank, bit) = split(line);
        self.pic.lock().deassert(bank, bit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_shared_pic;

    #[test]
    fn line_14_cascades_through_the_slave() {
        let pic = new_shared_pic();
        let sink = PicSink::new(pic.clone());
        sink.assert(14);
        let guard = pic.lock();
        assert_ne!(guard.read(1, 0) & (1 << 6), 0);
        assert_ne!(guard.read(0, 0) & (1 << 2), 0);
    }
}
