use std::sync::Mutex;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::link::LinkStatus;
use super::state::SpaceState;
use super::state::SwitchReading;

/// Callback invoked with every new status
pub type Subscriber = Box<dyn Fn(SpaceState) + Send + Sync>;

/// Map the two contact readings to a status.
///
/// Both contacts made at once is physically impossible with a healthy switch
/// and resolves to UNDETERMINED.
pub fn resolve(reading: SwitchReading) -> SpaceState {
    match (reading.top, reading.bottom) {
        (true, true) => {
            warn!("Both open and closed contacts are made, treating switch as undetermined");
            SpaceState::Undetermined
        }
        (true, false) => SpaceState::Open,
        (false, true) => SpaceState::Closed,
        (false, false) => SpaceState::Undetermined,
    }
}

struct Inner {
    last: SpaceState,
    subscribers: Vec<Subscriber>,
}

/// Turns switch readings into status change notifications
///
/// Notifications are deduplicated against the last emitted status and
/// delivered to every subscriber while the machine's lock is held, so one
/// change is fully handled before the next is delivered. Subscribers must not
/// call back into the machine.
pub struct SpaceStateMachine {
    link: LinkStatus,
    inner: Mutex<Inner>,
}

impl SpaceStateMachine {
    pub fn new(link: LinkStatus) -> Self {
        Self {
            link,
            inner: Mutex::new(Inner {
                last: SpaceState::default(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register a subscriber for status changes
    pub fn subscribe(&self, subscriber: impl Fn(SpaceState) + Send + Sync + 'static) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.push(Box::new(subscriber));
        }
    }

    /// Last emitted status
    pub fn current(&self) -> SpaceState {
        self.inner
            .lock()
            .map(|inner| inner.last)
            .unwrap_or_default()
    }

    /// Evaluate a settled reading, notifying subscribers if the status changed
    pub fn evaluate(&self, top: bool, bottom: bool) -> SpaceState {
        let state = if self.link.is_up() {
            resolve(SwitchReading { top, bottom })
        } else {
            debug!("Hardware link unavailable, forcing undetermined");
            SpaceState::Undetermined
        };

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        if inner.last == state {
            debug!("Switch re-evaluated to unchanged state {}", state);
            return state;
        }

        info!("Space state changed: {} -> {}", inner.last, state);
        inner.last = state;
        for subscriber in &inner.subscribers {
            subscriber(state);
        }

        state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn recording_machine(link_up: bool) -> (SpaceStateMachine, Arc<Mutex<Vec<SpaceState>>>) {
        let machine = SpaceStateMachine::new(LinkStatus::new(link_up));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        machine.subscribe(move |state| sink.lock().unwrap().push(state));
        (machine, seen)
    }

    #[test]
    fn test_resolve_table() {
        let cases = [
            (true, true, SpaceState::Undetermined),
            (true, false, SpaceState::Open),
            (false, true, SpaceState::Closed),
            (false, false, SpaceState::Undetermined),
        ];
        for (top, bottom, expected) in cases {
            assert_eq!(resolve(SwitchReading { top, bottom }), expected);
        }
    }

    #[test]
    fn test_duplicate_evaluation_is_silent() {
        let (machine, seen) = recording_machine(true);

        assert_eq!(machine.evaluate(true, false), SpaceState::Open);
        assert_eq!(machine.evaluate(true, false), SpaceState::Open);
        assert_eq!(*seen.lock().unwrap(), vec![SpaceState::Open]);

        assert_eq!(machine.evaluate(false, true), SpaceState::Closed);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![SpaceState::Open, SpaceState::Closed]
        );
        assert_eq!(machine.current(), SpaceState::Closed);
    }

    #[test]
    fn test_initial_undetermined_is_not_reported() {
        let (machine, seen) = recording_machine(true);

        machine.evaluate(false, false);
        machine.evaluate(true, true);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(machine.current(), SpaceState::Undetermined);
    }

    #[test]
    fn test_link_down_forces_undetermined() {
        let link = LinkStatus::new(true);
        let machine = SpaceStateMachine::new(link.clone());

        assert_eq!(machine.evaluate(true, false), SpaceState::Open);
        link.mark_lost();
        assert_eq!(machine.evaluate(true, false), SpaceState::Undetermined);
        assert_eq!(machine.current(), SpaceState::Undetermined);
    }

    #[test]
    fn test_every_subscriber_notified() {
        let machine = SpaceStateMachine::new(LinkStatus::new(true));
        let count = Arc::new(Mutex::new(0));
        for _ in 0..3 {
            let count = count.clone();
            machine.subscribe(move |_| *count.lock().unwrap() += 1);
        }

        machine.evaluate(false, true);
        assert_eq!(*count.lock().unwrap(), 3);
    }
}
