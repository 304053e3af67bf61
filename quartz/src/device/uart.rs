/// Byte-oriented serial port, as used for the debug console.
pub trait Uart {
    /// Block until TX buffer is flushed, and has been sent over the wire.
    fn flush_tx(&self);

    /// Return true if the FIFO is not full (and more bytes can be written to it).
    fn can_write(&self) -> bool;
    /// Write a byte to the FIFO. Callers check [`can_write`](Uart::can_write) first.
    fn write_byte(&self, byte: u8);
    /// Return true if data is available to be read.
    fn data_available(&self) -> bool;
    /// Read a byte from the input FIFO.
    fn read_byte(&self) -> u8;

    /// Write as much of `bytes` as fits in the FIFO right now; returns how many were written.
    fn write_bytes_nonblocking(&self, bytes: &[u8]) -> usize {
        let mut written = 0;
        for &byte in bytes {
            if !self.can_write() {
                break;
            }
            self.write_byte(byte);
            written += 1;
        }
        written
    }
}
