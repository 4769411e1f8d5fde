use es40_devices_input::{Buttons, I8042Controller};

fn enable_mouse_reporting(ctrl: &mut I8042Controller) {
    ctrl.write_port(0x64, 0xD4);
    ctrl.write_port(0x60, 0xF4);
}

#[test]
fn disabled_mouse_port_drops_motion_silently() {
    let mut ctrl = I8042Controller::new();
    enable_mouse_reporting(&mut ctrl);
    ctrl.write_port(0x64, 0xA7);
    ctrl.inject_mouse_motion(3, -2, 0, Buttons::default());
    ctrl.tick();
    assert_eq!(ctrl.read_port(0x60), 0);
}

#[test]
fn re_enabling_mouse_port_resumes_reporting() {
    let mut ctrl = I8042Controller::new();
    enable_mouse_reporting(&mut ctrl);
    ctrl.write_port(0x64, 0xA7);
    ctrl.write_port(0x64, 0xA8);
    ctrl.inject_mouse_motion(1, 1, 0, Buttons::default());
    ctrl.tick();
    assert_ne!(ctrl.read_port(0x60), 0);
}
