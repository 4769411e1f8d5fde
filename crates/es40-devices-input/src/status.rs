use bitflags::bitflags;

bitflags! {
    /// 8042 status register (port 0x64 read), `spec.md` §4.4.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Output buffer full: a byte is waiting at port 0x60.
        const OUTPUT_FULL = 1 << 0;
        /// Input buffer full: the host wrote a byte not yet consumed.
        const INPUT_FULL = 1 << 1;
        /// System flag, set by the controller self-test command.
        const SYSTEM_FLAG = 1 << 2;
        /// Command/data: the last input-buffer write was a command (1) or
        /// data (0).
        const COMMAND = 1 << 3;
        /// Inhibit switch / keyboard-lock state (kept set; unused here).
        const KEYBOARD_ENABLED = 1 << 4;
        /// Set when the byte currently in the output buffer came from the
        /// auxiliary (mouse) port rather than the keyboard.
        const AUX_OUTPUT_FULL = 1 << 5;
        /// Timeout error on the last transmission.
        const TIMEOUT_ERROR = 1 << 6;
        /// Parity error on the last transmission.
        const PARITY_ERROR = 1 << 7;
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::KEYBOARD_ENABLED
    }
}
