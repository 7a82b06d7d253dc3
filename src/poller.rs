//! Background polling thread.
//!
//! Each cycle takes the controller lock once, polls `TSS` and then every
//! configured axis, and releases the lock before sleeping. The sleep is the
//! moving period while any axis reports motion (or while forced fast cycles
//! remain after a [`Poller::wakeup`]), otherwise the idle period.
//!
//! Poll failures are not handled here: the controller reports them through
//! its error throttles and the next cycle simply tries again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::error::Result;

/// Poll cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Period while any axis is moving
    pub moving_period: Duration,
    /// Period while all axes are idle
    pub idle_period: Duration,
    /// Fast cycles forced by a wake-up
    pub forced_fast_polls: u32,
}

impl From<&ControllerConfig> for PollSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            moving_period: config.moving_poll_period(),
            idle_period: config.idle_poll_period(),
            forced_fast_polls: config.forced_fast_polls,
        }
    }
}

#[derive(Default)]
struct Signal {
    stop: bool,
    wake: bool,
}

struct Shared {
    signal: Mutex<Signal>,
    condvar: Condvar,
    cycles: AtomicU64,
}

impl Shared {
    fn raise(&self, apply: impl FnOnce(&mut Signal)) {
        apply(&mut self.signal.lock());
        self.condvar.notify_one();
    }
}

/// Cloneable wake-up handle. Waking a stopped poller does nothing.
#[derive(Clone)]
pub struct PollWaker {
    shared: Arc<Shared>,
}

impl PollWaker {
    /// Cut the current sleep short and poll fast for a while.
    pub fn wakeup(&self) {
        self.shared.raise(|signal| signal.wake = true);
    }
}

/// Handle to the polling thread. Dropping it stops the thread.
pub struct Poller {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling `controller`.
    pub fn spawn(controller: Arc<Mutex<Controller>>, settings: PollSettings) -> Result<Self> {
        let shared = Arc::new(Shared {
            signal: Mutex::new(Signal::default()),
            condvar: Condvar::new(),
            cycles: AtomicU64::new(0),
        });
        let worker = shared.clone();
        let name = format!("p6k-poller-{}", controller.lock().name());

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(&controller, &worker, settings))?;

        tracing::debug!(?settings, "Poller started");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Cut the current sleep short and poll fast for a while.
    pub fn wakeup(&self) {
        self.waker().wakeup();
    }

    /// Wake-up handle for command paths.
    pub fn waker(&self) -> PollWaker {
        PollWaker {
            shared: self.shared.clone(),
        }
    }

    /// Completed poll cycles.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    /// Whether the thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for the current cycle to finish.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shared.raise(|signal| signal.stop = true);
        if handle.join().is_err() {
            tracing::error!("Poller thread panicked");
        }
        tracing::debug!(cycles = self.cycles(), "Poller stopped");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(controller: &Mutex<Controller>, shared: &Shared, settings: PollSettings) {
    let mut forced = 0u32;

    loop {
        let moving = poll_cycle(controller);
        shared.cycles.fetch_add(1, Ordering::Relaxed);

        let period = if moving || forced > 0 {
            settings.moving_period
        } else {
            settings.idle_period
        };
        forced = forced.saturating_sub(1);

        let deadline = Instant::now() + period;
        let mut signal = shared.signal.lock();
        while !signal.stop && !signal.wake {
            if shared.condvar.wait_until(&mut signal, deadline).timed_out() {
                break;
            }
        }
        if signal.stop {
            break;
        }
        if std::mem::take(&mut signal.wake) {
            forced = settings.forced_fast_polls;
        }
    }
}

/// One poll pass under the controller lock. Returns true if any axis moves.
///
/// An axis whose poll failed counts with its last known motion state.
pub fn poll_cycle(controller: &Mutex<Controller>) -> bool {
    let mut controller = controller.lock();
    // Failures are reported through the controller's throttles.
    if let Err(e) = controller.poll_controller() {
        tracing::debug!(error = %e, "Controller poll failed");
    }

    let mut any_moving = false;
    for index in controller.axis_indices() {
        let moving = match controller.poll_axis(index) {
            Ok(moving) => moving,
            Err(_) => controller
                .axis(index)
                .ok()
                .and_then(|axis| axis.status.as_ref())
                .is_some_and(|status| status.moving_out()),
        };
        any_moving |= moving;
    }
    any_moving
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::config::TransportConfig;
    use crate::mock::MockTransport;
    use crate::params::ParamStore;
    use crate::status::tests::tas_with;
    use tracing_test::traced_test;

    fn controller(mock: &MockTransport) -> Result<Arc<Mutex<Controller>>> {
        let config = ControllerConfig {
            name: "poll-test".into(),
            log_level: "info".into(),
            transport: TransportConfig::Tcp {
                address: "127.0.0.1:5002".into(),
            },
            timeout_ms: 100,
            num_axes: 2,
            moving_poll_ms: 5,
            idle_poll_ms: 10_000,
            forced_fast_polls: 3,
            error_print_interval_ms: 1000,
            axes: Vec::new(),
        };
        let channel = Channel::new(Box::new(mock.clone()), config.timeout());
        let mut controller = Controller::new(config, channel, Box::new(ParamStore::new()));
        // Setup reads are unscripted: both axes register as steppers.
        for index in [1, 2] {
            if let Err(e) = controller.configure_axis(index) {
                tracing::debug!(axis = index, error = %e, "Axis setup incomplete");
            }
        }
        mock.clear_calls();
        Ok(Arc::new(Mutex::new(controller)))
    }

    fn script_positions(mock: &MockTransport) {
        for index in [1u8, 2] {
            mock.value(&format!("{}TPC", index), &format!("{}TPC+0", index));
            mock.value(&format!("{}TPE", index), &format!("{}TPE+0", index));
        }
        mock.value("TSS", &format!("TSS{}", tas_with(&[0])));
    }

    #[test]
    fn test_cycle_polls_controller_then_each_axis() -> Result<()> {
        let mock = MockTransport::new();
        script_positions(&mock);
        mock.value("1TAS", &format!("1TAS{}", tas_with(&[])));
        mock.value("2TAS", &format!("2TAS{}", tas_with(&[0])));
        let controller = controller(&mock)?;

        assert!(poll_cycle(&controller));
        assert_eq!(
            mock.calls(),
            vec!["TSS", "1TPC", "1TPE", "1TAS", "2TPC", "2TPE", "2TAS"]
        );
        Ok(())
    }

    #[test]
    #[traced_test]
    fn test_failed_controller_poll_is_logged() -> Result<()> {
        let mock = MockTransport::new();
        script_positions(&mock);
        mock.clear_replies("TSS");
        mock.error_reply("TSS", "INVALID COMMAND");
        let controller = controller(&mock)?;

        poll_cycle(&controller);

        assert!(logs_contain("Controller poll failed"));
        assert_eq!(&mock.calls()[..2], ["TSS", "1TPC"]);
        Ok(())
    }

    #[test]
    fn test_failed_axis_keeps_last_motion_state() -> Result<()> {
        let mock = MockTransport::new();
        script_positions(&mock);
        mock.value("1TAS", &format!("1TAS{}", tas_with(&[0])));
        let controller = controller(&mock)?;
        assert!(poll_cycle(&controller));

        mock.clear_replies("1TAS");
        mock.error_reply("1TAS", "INVALID COMMAND");
        assert!(poll_cycle(&controller));
        Ok(())
    }

    #[test]
    fn test_moving_axis_polls_fast_and_stop_joins() -> Result<()> {
        let mock = MockTransport::new();
        script_positions(&mock);
        mock.value("1TAS", &format!("1TAS{}", tas_with(&[0])));
        let controller = controller(&mock)?;

        let mut poller = Poller::spawn(controller, PollSettings {
            moving_period: Duration::from_millis(5),
            idle_period: Duration::from_secs(10),
            forced_fast_polls: 0,
        })?;
        let deadline = Instant::now() + Duration::from_secs(5);
        while poller.cycles() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(poller.cycles() >= 3);

        poller.stop();
        assert!(!poller.is_running());
        let after_stop = mock.calls().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(mock.calls().len(), after_stop);
        Ok(())
    }

    #[test]
    fn test_wakeup_cuts_idle_sleep() -> Result<()> {
        let mock = MockTransport::new();
        script_positions(&mock);
        let controller = controller(&mock)?;

        let poller = Poller::spawn(controller, PollSettings {
            moving_period: Duration::from_millis(5),
            idle_period: Duration::from_secs(30),
            forced_fast_polls: 2,
        })?;
        let deadline = Instant::now() + Duration::from_secs(5);
        while poller.cycles() < 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        poller.wakeup();
        // One cycle for the wake-up plus the forced fast cycles.
        while poller.cycles() < 4 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(poller.cycles() >= 4);
        Ok(())
    }
}
