//! Serial device the Firmata board is attached to.

use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// How long a read waits for data before reporting `TimedOut`
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A serial device in 8N1 mode without flow control
///
/// Reads wait at most 100ms and then fail with [`io::ErrorKind::TimedOut`],
/// so a reader thread can notice shutdown. Any other read error, or a read of
/// 0 bytes, means the device went away.
pub struct SerialPort {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialPort {
    pub fn open(path: &Path, baud: u32) -> io::Result<Self> {
        let port = serialport::new(path.to_string_lossy(), baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        port.clear(serialport::ClearBuffer::All)?;

        Ok(Self { port })
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            port: self.port.try_clone()?,
        })
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort").field("name", &self.name()).finish()
    }
}

impl Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
