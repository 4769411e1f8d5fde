use es40_devices_input::{I8042Controller, IrqSink, Status};

struct NullSink;
impl IrqSink for NullSink {
    fn raise_irq(&mut self, _irq: u8) {}
}

#[test]
fn output_buffer_full_bit_clears_after_read() {
    let mut ctrl = I8042Controller::new();
    ctrl.set_irq_sink(Box::new(NullSink));
    ctrl.inject_browser_key("KeyA", false);
    assert!(Status::from_bits_truncate(ctrl.read_port(0x64)).contains(Status::OUTPUT_FULL));
    let _ = ctrl.read_port(0x60);
    assert!(!Status::from_bits_truncate(ctrl.read_port(0x64)).contains(Status::OUTPUT_FULL));
}

#[test]
fn controller_self_test_reports_success() {
    let mut ctrl = I8042Controller::new();
    ctrl.write_port(0x64, 0xAA);
    assert_eq!(ctrl.read_port(0x60), 0x55);
}

#[test]
fn config_byte_round_trips_through_command_port() {
    let mut ctrl = I8042Controller::new();
    ctrl.write_port(0x64, 0x60);
    ctrl.write_port(0x60, 0b0000_0011);
    ctrl.write_port(0x64, 0x20);
    assert_eq!(ctrl.read_port(0x60) & 0b0000_0011, 0b0000_0011);
}
