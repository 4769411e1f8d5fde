//! The 8259A-pair PIC (`spec.md` §4.1) plus the `InterruptSink` capability
//! devices use to request interrupts without owning the PIC
//! (`spec.md` §9 "Cyclic references").

use std::sync::Arc;

use parking_lot::Mutex;

mod pic;
pub mod sink;

pub use pic::{InterruptController, PicMode};
pub use sink::{InterruptSink, PicSink};

/// A shared, lockable PIC pair. Devices never own this directly; they are
/// handed a [`PicSink`] capability instead.
pub type SharedPic = Arc<Mutex<InterruptController>>;

pub fn new_shared_pic() -> SharedPic {
    Arc::new(Mutex::new(InterruptController::new()))
}
