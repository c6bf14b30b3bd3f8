/// Interface for port-based I/O devices attached to the 1802 bus
pub trait IoPeriph {
    /// Value driven onto an input port, `None` when the device ignores the port
    fn read(&mut self, port: u8) -> Option<u8>;
    fn write(&mut self, port: u8, value: u8);

    /// Level of external flag line EF1-EF4
    fn flag(&self, _ef: u8) -> bool {
        false
    }

    /// Called whenever the Q latch is set or reset
    fn set_q(&mut self, _level: bool) {}
}
