//! Abstraction over the microcontroller that reads the switch and drives the
//! relay board.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Errors raised by a hardware link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to open hardware link {0}: {1}")]
    Open(String, #[source] std::io::Error),

    #[error("Hardware link I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pin {0} is not addressable over the hardware link")]
    InvalidPin(u8),

    #[error("Hardware link is closed")]
    Closed,
}

/// Trait for digital I/O over the hardware link
///
/// This trait allows for mocking the hardware for testing purposes. Pin
/// numbers are physical pin identities; polarity is applied by the caller.
pub trait HardwareLink: Send {
    /// Configure a pin as a digital output
    fn configure_output(&mut self, pin: u8) -> Result<(), LinkError>;

    /// Configure a pin as a digital input
    fn configure_input(&mut self, pin: u8) -> Result<(), LinkError>;

    /// Drive an output pin to the given electrical level
    fn write_digital(&mut self, pin: u8, high: bool) -> Result<(), LinkError>;

    /// Enable or disable change reporting for an input pin
    fn set_reporting(&mut self, pin: u8, enabled: bool) -> Result<(), LinkError>;

    /// Release the link. Further calls fail with [`LinkError::Closed`].
    fn close(&mut self) -> Result<(), LinkError>;
}

/// Shared view of whether the hardware link is currently usable.
///
/// Written by the link owner (acquire, loss, teardown) and read by the state
/// machine to force UNDETERMINED while degraded.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus(Arc<AtomicBool>);

impl LinkStatus {
    pub fn new(up: bool) -> Self {
        Self(Arc::new(AtomicBool::new(up)))
    }

    pub fn is_up(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_up(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Mark the link lost. Returns true if it was up before.
    pub fn mark_lost(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Operation recorded by [`MockLink`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp {
    ConfigureOutput(u8),
    ConfigureInput(u8),
    Write {
        pin: u8,
        high: bool,
        at: tokio::time::Instant,
    },
    Reporting {
        pin: u8,
        enabled: bool,
    },
    Close,
}

/// Mock hardware link for testing
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    pub ops: Arc<std::sync::Mutex<Vec<LinkOp>>>,
    pub fail_writes: Arc<AtomicBool>,
}

#[cfg(test)]
impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<LinkOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Writes to `pin` as (level, time) pairs in issue order
    pub fn writes_to(&self, pin: u8) -> Vec<(bool, tokio::time::Instant)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                LinkOp::Write { pin: p, high, at } if p == pin => Some((high, at)),
                _ => None,
            })
            .collect()
    }

    /// Last electrical level written to `pin`
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.writes_to(pin).last().map(|(high, _)| *high)
    }

    fn record(&self, op: LinkOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[cfg(test)]
impl HardwareLink for MockLink {
    fn configure_output(&mut self, pin: u8) -> Result<(), LinkError> {
        self.record(LinkOp::ConfigureOutput(pin));
        Ok(())
    }

    fn configure_input(&mut self, pin: u8) -> Result<(), LinkError> {
        self.record(LinkOp::ConfigureInput(pin));
        Ok(())
    }

    fn write_digital(&mut self, pin: u8, high: bool) -> Result<(), LinkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LinkError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        self.record(LinkOp::Write {
            pin,
            high,
            at: tokio::time::Instant::now(),
        });
        Ok(())
    }

    fn set_reporting(&mut self, pin: u8, enabled: bool) -> Result<(), LinkError> {
        self.record(LinkOp::Reporting { pin, enabled });
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.record(LinkOp::Close);
        Ok(())
    }
}
