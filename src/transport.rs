use std::time::Duration;

use crate::error::BusError;

/// Duplex byte link to the servo line.
///
/// The bus owns its channel exclusively and never has more than one
/// request outstanding on it.
pub trait ByteChannel: Send + 'static {
    /// Write every byte or fail.
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError>;

    /// Read whatever is available into `buf`, waiting at most `max_wait` for
    /// the first byte. Returns 0 if nothing arrived in time.
    fn read_available(&mut self, buf: &mut [u8], max_wait: Duration) -> Result<usize, BusError>;

    /// Drop stale input before a new request goes out.
    fn clear_input(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}
