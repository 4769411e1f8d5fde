use es40_devices_input::Mouse;

fn send_sample_rate_sequence(m: &mut Mouse, rates: [u8; 3]) {
    for rate in rates {
        m.write(0xF3);
        m.write(rate);
    }
}

#[test]
fn wheel_extension_adds_a_fourth_packet_byte() {
    let mut m = Mouse::new();
    send_sample_rate_sequence(&mut m, [200, 100, 80]);
    assert_eq!(m.device_id(), 3);
    assert_eq!(m.packet_size(), 4);
}

#[test]
fn five_button_sequence_unlocks_device_id_four_directly() {
    let mut m = Mouse::new();
    send_sample_rate_sequence(&mut m, [200, 200, 80]);
    assert_eq!(m.device_id(), 4);
}

#[test]
fn unrelated_sample_rate_changes_do_not_unlock_extensions() {
    let mut m = Mouse::new();
    send_sample_rate_sequence(&mut m, [40, 60, 80]);
    assert_eq!(m.device_id(), 0);
}
