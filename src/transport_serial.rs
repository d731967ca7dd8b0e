use std::{
    io::{ErrorKind, Read, Write},
    time::Duration,
};

use serialport::{ClearBuffer, SerialPort};
use tracing::debug;

use crate::{error::BusError, transport::ByteChannel};

#[derive(Debug, Clone, Copy)]
pub struct SerialConfig {
    pub baudrate: u32,
    /// Initial port timeout; every read overrides it with its own deadline.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { baudrate: 115_200, timeout: Duration::from_secs(1) }
    }
}

/// [`ByteChannel`] over a serial port (USB debug board or UART).
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    pub fn open(path: &str, cfg: SerialConfig) -> Result<Self, BusError> {
        let port = serialport::new(path, cfg.baudrate)
            .timeout(cfg.timeout)
            .open()
            .map_err(|e| BusError::Transport(format!("{path}: {e}")))?;
        debug!(path, baudrate = cfg.baudrate, "serial port opened");
        Ok(Self { port })
    }

    /// Wrap a port opened elsewhere.
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl ByteChannel for SerialChannel {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8], max_wait: Duration) -> Result<usize, BusError> {
        self.port
            .set_timeout(max_wait)
            .map_err(|e| BusError::Transport(e.to_string()))?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_input(&mut self) -> Result<(), BusError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| BusError::Transport(e.to_string()))
    }
}
