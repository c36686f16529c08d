use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::debounce::InputSink;
use super::link::HardwareLink;
use super::link::LinkError;
use super::link::LinkStatus;
use super::state::LampColor;
use crate::config::HardwareConfig;
use crate::config::InputPins;
use crate::config::OutputPin;
use crate::config::RelayChannel;
use crate::config::RelayTable;

/// Outputs an animation can drive
pub trait Lamps: Send + Sync {
    fn set_color(&self, color: LampColor);

    /// Trigger one confetti pulse. Returns false if a pulse is already running.
    fn fire_confetti(&self) -> bool;
}

struct Inner {
    link: Mutex<Option<Box<dyn HardwareLink>>>,
    status: LinkStatus,
    /// Told when a write failure takes the link down
    loss_sink: Option<Arc<dyn InputSink>>,
    outputs: RelayTable,
    inputs: InputPins,
    pulse: Duration,
    confetti_active: AtomicBool,
}

impl Inner {
    /// Run `f` against the link if it is usable. A failure marks the link
    /// lost and notifies the loss sink; nothing is propagated.
    fn with_link(&self, what: &str, f: impl FnOnce(&mut dyn HardwareLink) -> Result<(), LinkError>) {
        if !self.status.is_up() {
            debug!("Hardware link down, skipping {}", what);
            return;
        }

        let result = {
            let mut guard = match self.link.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let Some(link) = guard.as_mut() else {
                return;
            };
            f(link.as_mut())
        };

        if let Err(e) = result {
            if self.status.mark_lost() {
                warn!("Hardware link lost during {}: {}", what, e);
                if let Some(sink) = &self.loss_sink {
                    sink.on_link_lost();
                }
            }
        }
    }

    fn write(&self, out: OutputPin, active: bool, what: &str) {
        self.with_link(what, |link| link.write_digital(out.pin, out.level(active)));
    }

    fn write_channel(&self, channel: RelayChannel, active: bool) {
        let out = self.outputs.get(channel);
        self.write(out, active, &format!("write {}", channel));
    }
}

/// Drives the lamp relays and the confetti relay
///
/// Owns the hardware link; the only other user is the input reader that was
/// started before the link was handed over.
pub struct ActuatorController {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl ActuatorController {
    /// Take ownership of the link. Pass `None` to run degraded without
    /// hardware. `loss_sink` is told when a failed write takes the link down,
    /// so the reported status can be re-evaluated. Must be called from within
    /// a tokio runtime.
    pub fn new(
        link: Option<Box<dyn HardwareLink>>,
        config: &HardwareConfig,
        status: LinkStatus,
        loss_sink: Option<Arc<dyn InputSink>>,
    ) -> Self {
        if link.is_some() {
            status.mark_up();
        } else {
            status.mark_lost();
        }

        Self {
            inner: Arc::new(Inner {
                link: Mutex::new(link),
                status,
                loss_sink,
                outputs: config.outputs,
                inputs: config.inputs,
                pulse: Duration::from_millis(config.confetti_pulse_ms),
                confetti_active: AtomicBool::new(false),
            }),
            runtime: Handle::current(),
        }
    }

    pub fn link_status(&self) -> &LinkStatus {
        &self.inner.status
    }

    /// Bring the relay board up in a known state and start input reporting
    ///
    /// Relay power is held off while every relay is driven inactive so that no
    /// relay clicks on during setup.
    pub fn initialize(&self) {
        let inner = &self.inner;
        let power = inner.outputs.power();

        inner.with_link("pin setup", |link| {
            for (_, out) in inner.outputs.channels() {
                link.configure_output(out.pin)?;
            }
            link.configure_output(power.pin)?;
            link.configure_input(inner.inputs.top)?;
            link.configure_input(inner.inputs.bottom)
        });

        inner.write(power, false, "relay power off");
        for (channel, _) in inner.outputs.channels() {
            inner.write_channel(channel, false);
        }
        inner.write(power, true, "relay power on");

        inner.with_link("enable input reporting", |link| {
            link.set_reporting(inner.inputs.top, true)?;
            link.set_reporting(inner.inputs.bottom, true)
        });

        if inner.status.is_up() {
            info!("Relay board initialized");
        }
    }

    /// Whether a confetti pulse is currently running
    pub fn confetti_active(&self) -> bool {
        self.inner.confetti_active.load(Ordering::Acquire)
    }

    /// Drive every output inactive and release the link
    ///
    /// Order: input reporting off, relays off, relay power off, close. Safe to
    /// call when no link was ever acquired.
    pub fn teardown(&self) {
        let inner = &self.inner;

        let mut guard = match inner.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(mut link) = guard.take() else {
            debug!("No hardware link to tear down");
            return;
        };
        inner.status.mark_lost();

        let result = (|| -> Result<(), LinkError> {
            link.set_reporting(inner.inputs.top, false)?;
            link.set_reporting(inner.inputs.bottom, false)?;
            for (_, out) in inner.outputs.channels() {
                link.write_digital(out.pin, out.level(false))?;
            }
            let power = inner.outputs.power();
            link.write_digital(power.pin, power.level(false))
        })();
        if let Err(e) = result {
            warn!("Failed to drive outputs inactive during teardown: {}", e);
        }

        match link.close() {
            Ok(()) => info!("Hardware link closed"),
            Err(e) => warn!("Failed to close hardware link: {}", e),
        }
    }
}

impl Lamps for ActuatorController {
    fn set_color(&self, color: LampColor) {
        debug!("Setting lamp color {}", color);
        let inner = &self.inner;
        for (channels, active) in [
            ([RelayChannel::Red1, RelayChannel::Red2], color.red()),
            ([RelayChannel::Orange1, RelayChannel::Orange2], color.orange()),
            ([RelayChannel::Green1, RelayChannel::Green2], color.green()),
        ] {
            for channel in channels {
                inner.write_channel(channel, active);
            }
        }
    }

    fn fire_confetti(&self) -> bool {
        if self
            .inner
            .confetti_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Confetti already firing, ignoring trigger");
            return false;
        }

        info!("Firing confetti");
        self.inner.write_channel(RelayChannel::Confetti, true);

        let inner = self.inner.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(inner.pulse).await;
            inner.write_channel(RelayChannel::Confetti, false);
            inner.confetti_active.store(false, Ordering::Release);
            debug!("Confetti pulse finished");
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::minimal;
    use crate::engine::link::LinkOp;
    use crate::engine::link::MockLink;

    fn controller(mock: &MockLink) -> ActuatorController {
        let config = minimal();
        ActuatorController::new(
            Some(Box::new(mock.clone())),
            &config.hardware,
            LinkStatus::default(),
            None,
        )
    }

    #[tokio::test]
    async fn test_set_color_drives_both_channels_active_low() {
        let mock = MockLink::new();
        let actuator = controller(&mock);

        actuator.set_color(LampColor::Yellow);

        // red1/red2 = 10/11, orange1/orange2 = 12/13, green1/green2 = 2/3
        for pin in [10, 11, 12, 13] {
            assert_eq!(mock.level(pin), Some(false), "pin {} should be energized", pin);
        }
        for pin in [2, 3] {
            assert_eq!(mock.level(pin), Some(true), "pin {} should be released", pin);
        }

        actuator.set_color(LampColor::Off);
        for pin in [10, 11, 12, 13, 2, 3] {
            assert_eq!(mock.level(pin), Some(true));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confetti_single_pulse() {
        let mock = MockLink::new();
        let actuator = controller(&mock);
        let start = tokio::time::Instant::now();

        assert!(actuator.fire_confetti());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!actuator.fire_confetti());
        assert!(actuator.confetti_active());

        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert!(actuator.confetti_active());
        assert_eq!(mock.writes_to(4).len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!actuator.confetti_active());

        let writes = mock.writes_to(4);
        assert_eq!(writes.len(), 2);
        // Active low: energized = low, released = high
        assert!(!writes[0].0);
        assert!(writes[1].0);
        assert_eq!(writes[0].1 - start, Duration::ZERO);
        assert_eq!(writes[1].1 - start, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confetti_can_fire_again_after_pulse() {
        let mock = MockLink::new();
        let actuator = controller(&mock);

        assert!(actuator.fire_confetti());
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(actuator.fire_confetti());
        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert_eq!(mock.writes_to(4).len(), 4);
    }

    #[tokio::test]
    async fn test_initialize_order() {
        let mock = MockLink::new();
        let actuator = controller(&mock);

        actuator.initialize();

        let ops = mock.ops();
        let power_writes: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, LinkOp::Write { pin: 7, .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(power_writes.len(), 2);

        // Every relay is released while relay power is off
        let relay_writes: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, LinkOp::Write { pin, high: true, .. } if *pin != 7))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(relay_writes.len(), 7);
        assert!(relay_writes.iter().all(|i| *i > power_writes[0] && *i < power_writes[1]));
        assert_eq!(mock.level(7), Some(true));

        assert!(ops.contains(&LinkOp::Reporting { pin: 8, enabled: true }));
        assert!(ops.contains(&LinkOp::Reporting { pin: 9, enabled: true }));
    }

    #[tokio::test]
    async fn test_teardown_order() {
        let mock = MockLink::new();
        let actuator = controller(&mock);
        actuator.set_color(LampColor::Green);

        actuator.teardown();

        let ops = mock.ops();
        let first_reporting_off = ops
            .iter()
            .position(|op| matches!(op, LinkOp::Reporting { enabled: false, .. }))
            .unwrap();
        let power_off = ops
            .iter()
            .rposition(|op| matches!(op, LinkOp::Write { pin: 7, high: false, .. }))
            .unwrap();
        assert_eq!(ops.last(), Some(&LinkOp::Close));
        assert!(first_reporting_off < power_off);
        for pin in [10, 11, 12, 13, 2, 3, 4] {
            assert_eq!(mock.level(pin), Some(true));
        }
        assert!(!actuator.link_status().is_up());

        // Second teardown is a no-op
        let len = mock.ops().len();
        actuator.teardown();
        assert_eq!(mock.ops().len(), len);
    }

    #[tokio::test]
    async fn test_without_link_is_noop() {
        let config = minimal();
        let actuator = ActuatorController::new(None, &config.hardware, LinkStatus::default(), None);

        actuator.initialize();
        actuator.set_color(LampColor::Red);
        actuator.teardown();
        assert!(!actuator.link_status().is_up());
    }

    #[tokio::test]
    async fn test_write_failure_marks_link_lost() {
        let mock = MockLink::new();
        let actuator = controller(&mock);
        mock.fail_writes.store(true, Ordering::SeqCst);

        actuator.set_color(LampColor::Red);
        assert!(!actuator.link_status().is_up());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_degrades_reported_status() {
        use crate::engine::state::SpaceState;
        use crate::engine::SpaceStateMachine;
        use crate::engine::SwitchDebouncer;

        let config = minimal();
        let status = LinkStatus::default();
        let machine = Arc::new(SpaceStateMachine::new(status.clone()));
        let debouncer = Arc::new(SwitchDebouncer::new(
            config.hardware.inputs,
            config.hardware.input_polarity,
            Duration::from_millis(config.hardware.debounce_ms),
            machine.clone(),
        ));
        let mock = MockLink::new();
        let actuator = ActuatorController::new(
            Some(Box::new(mock.clone())),
            &config.hardware,
            status,
            Some(debouncer.clone()),
        );

        debouncer.on_edge(config.hardware.inputs.top, true);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(machine.current(), SpaceState::Open);

        mock.fail_writes.store(true, Ordering::SeqCst);
        actuator.set_color(LampColor::Green);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!actuator.link_status().is_up());
        assert_eq!(machine.current(), SpaceState::Undetermined);
    }
}
