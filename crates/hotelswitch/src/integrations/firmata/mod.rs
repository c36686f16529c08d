//! Hardware link to an Arduino running StandardFirmata over a serial port.

mod codec;
mod serial;

use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use self::codec::Decoder;
use self::codec::Message;
use self::codec::PinMode;
pub use self::serial::SerialPort;
use crate::config::HardwareConfig;
use crate::engine::HardwareLink;
use crate::engine::InputSink;
use crate::engine::LinkError;
use crate::engine::LinkStatus;

/// The board resets when the port is opened and ignores commands until
/// its bootloader has handed over to the sketch
const BOOT_DELAY: Duration = Duration::from_secs(2);

const PORTS: usize = 16;

pub struct FirmataLink<W: Write + Send = SerialPort> {
    writer: Option<W>,
    /// Last level written to each output port
    outputs: [u8; PORTS],
    /// Pins with change reporting enabled, per port
    reporting: [u8; PORTS],
    stop: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl FirmataLink<SerialPort> {
    /// Open the serial device and start delivering input edges to `sink`
    ///
    /// Blocks for the board's boot delay; use [`FirmataLink::connect`] from
    /// async code.
    pub fn open(
        config: &HardwareConfig,
        sink: Arc<dyn InputSink>,
        status: LinkStatus,
    ) -> Result<Self, LinkError> {
        let device = config.device.display().to_string();
        let port = SerialPort::open(&config.device, config.baud_rate)
            .map_err(|e| LinkError::Open(device.clone(), e))?;
        let reader = port.try_clone().map_err(|e| LinkError::Open(device.clone(), e))?;

        debug!("Waiting {:?} for board on {} to boot", BOOT_DELAY, device);
        thread::sleep(BOOT_DELAY);

        let link = Self::start(port, reader, sink, status)?;
        info!("Connected to Firmata board on {}", device);
        Ok(link)
    }

    pub async fn connect(
        config: &HardwareConfig,
        sink: Arc<dyn InputSink>,
        status: LinkStatus,
    ) -> Result<Self, LinkError> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || Self::open(&config, sink, status))
            .await
            .map_err(|e| LinkError::Io(io::Error::other(e)))?
    }
}

impl<W: Write + Send> FirmataLink<W> {
    /// Wrap an already-open byte stream. `reader` is drained on its own
    /// thread until [`HardwareLink::close`] or until it fails.
    pub fn start<R: Read + Send + 'static>(
        writer: W,
        reader: R,
        sink: Arc<dyn InputSink>,
        status: LinkStatus,
    ) -> Result<Self, LinkError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("firmata-reader".to_string())
            .spawn(move || read_loop(reader, sink, status, thread_stop))?;

        Ok(Self {
            writer: Some(writer),
            outputs: [0; PORTS],
            reporting: [0; PORTS],
            stop,
            reader: Some(handle),
        })
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let writer = self.writer.as_mut().ok_or(LinkError::Closed)?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn check(pin: u8) -> Result<(usize, u8), LinkError> {
        if pin > codec::MAX_PIN {
            return Err(LinkError::InvalidPin(pin));
        }
        Ok((codec::port_of(pin) as usize, codec::bit_of(pin)))
    }

    fn stop_reader(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("Firmata reader thread panicked");
            }
        }
    }
}

impl<W: Write + Send> HardwareLink for FirmataLink<W> {
    fn configure_output(&mut self, pin: u8) -> Result<(), LinkError> {
        Self::check(pin)?;
        self.send(&codec::set_pin_mode(pin, PinMode::Output))
    }

    fn configure_input(&mut self, pin: u8) -> Result<(), LinkError> {
        Self::check(pin)?;
        self.send(&codec::set_pin_mode(pin, PinMode::Input))
    }

    fn write_digital(&mut self, pin: u8, high: bool) -> Result<(), LinkError> {
        let (port, bit) = Self::check(pin)?;
        if high {
            self.outputs[port] |= bit;
        } else {
            self.outputs[port] &= !bit;
        }
        trace!("Pin {} -> {}", pin, high);
        self.send(&codec::digital_port(port as u8, self.outputs[port]))
    }

    fn set_reporting(&mut self, pin: u8, enabled: bool) -> Result<(), LinkError> {
        let (port, bit) = Self::check(pin)?;
        if enabled {
            self.reporting[port] |= bit;
        } else {
            self.reporting[port] &= !bit;
        }
        // Reporting is per port: keep it on while any pin in the port wants it
        self.send(&codec::report_digital(port as u8, self.reporting[port] != 0))
    }

    fn close(&mut self) -> Result<(), LinkError> {
        let mut writer = self.writer.take().ok_or(LinkError::Closed)?;
        let flushed = writer.flush();
        drop(writer);
        self.stop_reader();
        flushed?;
        Ok(())
    }
}

impl<W: Write + Send> Drop for FirmataLink<W> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Decode board messages and turn port reports into per-pin edges
///
/// Every pin of a port is reported the first time the port is seen, after
/// that only pins whose level changed.
fn read_loop<R: Read>(mut reader: R, sink: Arc<dyn InputSink>, status: LinkStatus, stop: Arc<AtomicBool>) {
    let mut decoder = Decoder::new();
    let mut ports: [Option<u8>; PORTS] = [None; PORTS];
    let mut buf = [0u8; 64];

    let failure = loop {
        if stop.load(Ordering::Acquire) {
            debug!("Firmata reader stopping");
            return;
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break "device hung up".to_string(),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => continue,
            Err(e) => break e.to_string(),
        };

        for byte in &buf[..n] {
            match decoder.push(*byte) {
                Some(Message::DigitalPort { port, levels }) => {
                    let previous = ports[port as usize].replace(levels);
                    let changed = previous.map_or(0xFF, |p| p ^ levels);
                    for bit in 0..codec::PORT_WIDTH {
                        if changed & (1 << bit) != 0 {
                            sink.on_edge(port * codec::PORT_WIDTH + bit, levels & (1 << bit) != 0);
                        }
                    }
                }
                Some(Message::Version { major, minor }) => {
                    info!("Board speaks Firmata protocol {}.{}", major, minor)
                }
                Some(Message::Ignored(command)) => trace!("Ignoring Firmata message 0x{:02X}", command),
                None => {}
            }
        }
    };

    if stop.load(Ordering::Acquire) {
        return;
    }
    if status.mark_lost() {
        warn!("Lost connection to Firmata board: {}", failure);
    }
    sink.on_link_lost();
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        edges: Mutex<Vec<(u8, bool)>>,
        lost: AtomicBool,
    }

    impl InputSink for RecordingSink {
        fn on_edge(&self, pin: u8, raw: bool) {
            self.edges.lock().unwrap().push((pin, raw));
        }

        fn on_link_lost(&self) {
            self.lost.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A quiet board: every read times out
    struct Idle;

    impl Read for Idle {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(1));
            Err(io::ErrorKind::TimedOut.into())
        }
    }

    #[test]
    fn test_commands_on_the_wire() {
        let out = SharedBuf::default();
        let sink = Arc::new(RecordingSink::default());
        let mut link = FirmataLink::start(out.clone(), Idle, sink, LinkStatus::new(true)).unwrap();

        link.configure_output(10).unwrap();
        link.configure_input(8).unwrap();
        link.write_digital(10, true).unwrap();
        link.write_digital(11, true).unwrap();
        link.write_digital(10, false).unwrap();
        link.set_reporting(8, true).unwrap();
        link.set_reporting(9, true).unwrap();
        link.set_reporting(8, false).unwrap();
        link.set_reporting(9, false).unwrap();
        link.close().unwrap();

        assert_eq!(
            *out.0.lock().unwrap(),
            vec![
                0xF4, 10, 1, //
                0xF4, 8, 0, //
                0x91, 0b0000_0100, 0, //
                0x91, 0b0000_1100, 0, //
                0x91, 0b0000_1000, 0, //
                0xD1, 1, //
                0xD1, 1, //
                0xD1, 1, //
                0xD1, 0,
            ]
        );

        assert!(matches!(link.write_digital(10, true), Err(LinkError::Closed)));
        assert!(matches!(link.close(), Err(LinkError::Closed)));
    }

    #[test]
    fn test_invalid_pin() {
        let sink = Arc::new(RecordingSink::default());
        let mut link = FirmataLink::start(SharedBuf::default(), Idle, sink, LinkStatus::new(true)).unwrap();

        assert!(matches!(link.write_digital(128, true), Err(LinkError::InvalidPin(128))));
        link.close().unwrap();
    }

    #[test]
    fn test_port_reports_become_edges_then_hangup() {
        let sink = Arc::new(RecordingSink::default());
        let status = LinkStatus::new(true);
        // Version, then port 1 with pin 9 high, then pin 8 high and pin 9 low
        let input = Cursor::new(vec![0xF9, 2, 5, 0x91, 0b10, 0, 0x91, 0b01, 0]);
        let mut link = FirmataLink::start(SharedBuf::default(), input, sink.clone(), status.clone()).unwrap();

        for _ in 0..500 {
            if sink.lost.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        link.close().unwrap();

        let edges = sink.edges.lock().unwrap().clone();
        let mut expected: Vec<(u8, bool)> = (8..16).map(|pin| (pin, pin == 9)).collect();
        expected.extend([(8, true), (9, false)]);
        assert_eq!(edges, expected);
        assert!(sink.lost.load(Ordering::SeqCst));
        assert!(!status.is_up());
    }

    #[test]
    fn test_close_does_not_report_loss() {
        let sink = Arc::new(RecordingSink::default());
        let status = LinkStatus::new(true);
        let mut link = FirmataLink::start(SharedBuf::default(), Idle, sink.clone(), status.clone()).unwrap();

        link.close().unwrap();
        assert!(!sink.lost.load(Ordering::SeqCst));
        assert!(status.is_up());
    }
}
