use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;

use super::state::SwitchContact;
use super::state::SwitchReading;
use super::state_machine::SpaceStateMachine;
use crate::config::InputPins;
use crate::config::Polarity;

/// Receiver of raw input events from the hardware link
pub trait InputSink: Send + Sync {
    /// A reported input pin changed electrical level
    fn on_edge(&self, pin: u8, raw: bool);

    /// The link stopped delivering input reports
    fn on_link_lost(&self);
}

struct Pending {
    reading: SwitchReading,
    /// Bumped on every reschedule; a timer only fires for its own generation
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Coalesces bouncy switch edges into one evaluation per quiet period
///
/// Every edge aborts the not-yet-fired evaluation and schedules a new one
/// `quiet` in the future, so a burst yields a single evaluation using the
/// values present when it settles.
pub struct SwitchDebouncer {
    pins: InputPins,
    polarity: Polarity,
    quiet: Duration,
    machine: Arc<SpaceStateMachine>,
    runtime: Handle,
    pending: Arc<Mutex<Pending>>,
}

impl SwitchDebouncer {
    /// Create a debouncer. Must be called from within a tokio runtime; edges
    /// may then arrive from any thread.
    pub fn new(
        pins: InputPins,
        polarity: Polarity,
        quiet: Duration,
        machine: Arc<SpaceStateMachine>,
    ) -> Self {
        Self {
            pins,
            polarity,
            quiet,
            machine,
            runtime: Handle::current(),
            pending: Arc::new(Mutex::new(Pending {
                reading: SwitchReading::default(),
                generation: 0,
                timer: None,
            })),
        }
    }

    fn contact(&self, pin: u8) -> Option<SwitchContact> {
        if pin == self.pins.top {
            Some(SwitchContact::Top)
        } else if pin == self.pins.bottom {
            Some(SwitchContact::Bottom)
        } else {
            None
        }
    }

    /// Record the new value of a contact and restart the quiet interval
    pub fn on_contact(&self, contact: SwitchContact, raw: bool) {
        let active = self.polarity.is_active(raw);
        trace!("Switch edge: {}={} (raw {})", contact, active, raw);

        let Ok(mut pending) = self.pending.lock() else {
            return;
        };
        match contact {
            SwitchContact::Top => pending.reading.top = active,
            SwitchContact::Bottom => pending.reading.bottom = active,
        }
        self.reschedule(&mut pending);
    }

    fn reschedule(&self, pending: &mut Pending) {
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        pending.generation = pending.generation.wrapping_add(1);
        let generation = pending.generation;
        let quiet = self.quiet;
        let machine = self.machine.clone();
        let shared = self.pending.clone();
        pending.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(quiet).await;

            let reading = match shared.lock() {
                Ok(mut pending) if pending.generation == generation => {
                    pending.timer = None;
                    pending.reading
                }
                // Superseded after the sleep finished but before we got here
                _ => return,
            };
            debug!(
                "Switch settled: top={}, bottom={}",
                reading.top, reading.bottom
            );
            machine.evaluate(reading.top, reading.bottom);
        }));
    }
}

impl InputSink for SwitchDebouncer {
    fn on_edge(&self, pin: u8, raw: bool) {
        match self.contact(pin) {
            Some(contact) => self.on_contact(contact, raw),
            None => trace!("Ignoring edge on unrelated pin {}", pin),
        }
    }

    fn on_link_lost(&self) {
        debug!("Link lost, scheduling re-evaluation");
        if let Ok(mut pending) = self.pending.lock() {
            self.reschedule(&mut pending);
        }
    }
}
