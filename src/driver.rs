//! Parker 6K driver handle and the `MotionAxis` capability.
//!
//! [`Parker6k`] owns the controller behind one coarse lock and the polling
//! thread. Schedulers and applications hold [`AxisHandle`]s and talk to them
//! through [`MotionAxis`]; they never see the protocol state.
//!
//! ```no_run
//! use daq_driver_parker6k::{ControllerConfig, MotionAxis, ParamStore, Parker6k};
//!
//! # fn main() -> daq_driver_parker6k::Result<()> {
//! let config = ControllerConfig::load_from("config/parker6k.example.toml")?;
//! let mut driver = Parker6k::connect(config, Box::new(ParamStore::new()))?;
//!
//! let x = driver.axis(1)?;
//! x.move_abs(10_000.0)?;
//!
//! driver.shutdown();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::channel::Channel;
use crate::command::MoveRequest;
use crate::config::ControllerConfig;
use crate::controller::{Controller, CONTROLLER_ADDRESS};
use crate::deferred::FireOutcome;
use crate::error::{P6kError, Result};
use crate::params::{Param, ParamSink};
use crate::poller::{self, PollSettings, PollWaker, Poller};
use crate::status::AxisStatus;
use crate::transport::{self, DynTransport};

// =============================================================================
// Capability
// =============================================================================

/// Capability for one positioning axis.
///
/// All operations are synchronous and return once the controller has
/// acknowledged (or rejected) every command they send. Motion completion is
/// observed through [`MotionAxis::poll`].
pub trait MotionAxis: Send + Sync {
    /// 1-based axis index on the controller.
    fn index(&self) -> u8;

    /// Start a move, or stage it while deferred moves are armed.
    ///
    /// # Arguments
    /// * `request` - Target, mode, velocity and acceleration in steps
    ///
    /// # Returns
    /// - Ok(()) if every command was accepted
    /// - Err(Configuration) if scaling is impossible (nothing sent)
    /// - Err(Command) if some steps failed (the others were still sent)
    fn move_axis(&self, request: MoveRequest) -> Result<()>;

    /// Stop immediately and drop any staged move.
    fn stop(&self) -> Result<()>;

    /// Refresh positions and status.
    ///
    /// # Returns
    /// The moving flag: true until the axis is done.
    fn poll(&self) -> Result<bool>;

    /// Redefine the current position without moving.
    fn set_position(&self, position: f64) -> Result<()>;

    /// Enable or disable the drive.
    fn set_closed_loop(&self, enable: bool) -> Result<()>;

    /// Absolute move with the controller's current velocity and acceleration.
    fn move_abs(&self, position: f64) -> Result<()> {
        self.move_axis(MoveRequest {
            position,
            ..MoveRequest::default()
        })
    }

    /// Relative move with the controller's current velocity and acceleration.
    fn move_rel(&self, distance: f64) -> Result<()> {
        self.move_axis(MoveRequest {
            position: distance,
            relative: true,
            ..MoveRequest::default()
        })
    }
}

// =============================================================================
// Driver
// =============================================================================

type SharedWaker = Arc<Mutex<Option<PollWaker>>>;

/// Connected 6K controller.
pub struct Parker6k {
    controller: Arc<Mutex<Controller>>,
    waker: SharedWaker,
    poller: Option<Poller>,
    settings: PollSettings,
}

impl Parker6k {
    /// Open the configured transport, set up the controller and every axis,
    /// and start polling.
    ///
    /// Only an invalid configuration or a transport that cannot be opened is
    /// fatal. Initialisation and axis setup failures are logged and leave the
    /// comms flag set.
    pub fn connect(config: ControllerConfig, params: Box<dyn ParamSink>) -> Result<Self> {
        config.validate()?;
        let transport = transport::open(&config.transport, config.timeout())?;
        let mut driver = Self::open(config, transport, params);
        driver.start_polling()?;
        Ok(driver)
    }

    /// Set up the controller over an already open transport. No poller runs
    /// until [`Self::start_polling`].
    pub fn open(
        config: ControllerConfig,
        transport: DynTransport,
        params: Box<dyn ParamSink>,
    ) -> Self {
        let settings = PollSettings::from(&config);
        let num_axes = config.num_axes;
        let channel = Channel::new(transport, config.timeout());
        let mut controller = Controller::new(config, channel, params);

        if let Err(e) = controller.initialize() {
            tracing::error!(controller = controller.name(), error = %e, "Controller initialisation failed");
        }
        for index in 1..=num_axes {
            if let Err(e) = controller.configure_axis(index) {
                tracing::warn!(axis = index, error = %e, "Axis setup incomplete");
            }
        }
        tracing::info!("{}", controller.report());

        Self {
            controller: Arc::new(Mutex::new(controller)),
            waker: Arc::new(Mutex::new(None)),
            poller: None,
            settings,
        }
    }

    /// Start the polling thread. Does nothing if it already runs.
    pub fn start_polling(&mut self) -> Result<()> {
        if self.poller.is_some() {
            return Ok(());
        }
        let poller = Poller::spawn(self.controller.clone(), self.settings)?;
        *self.waker.lock() = Some(poller.waker());
        self.poller = Some(poller);
        Ok(())
    }

    /// Whether the polling thread runs.
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(Poller::is_running)
    }

    /// Handle for axis `index`.
    pub fn axis(&self, index: u8) -> Result<AxisHandle> {
        self.controller.lock().axis(index)?;
        Ok(AxisHandle {
            index,
            controller: self.controller.clone(),
            waker: self.waker.clone(),
        })
    }

    /// Handles for every configured axis.
    pub fn axes(&self) -> Vec<AxisHandle> {
        let indices = self.controller.lock().axis_indices();
        indices
            .into_iter()
            .map(|index| AxisHandle {
                index,
                controller: self.controller.clone(),
                waker: self.waker.clone(),
            })
            .collect()
    }

    /// Take the coarse controller lock.
    pub fn lock(&self) -> MutexGuard<'_, Controller> {
        self.controller.lock()
    }

    /// Arm (`true`) or fire (`false`) deferred moves.
    pub fn set_deferred_moves(&self, defer: bool) -> Result<()> {
        if defer {
            self.controller.lock().arm_deferred_moves();
            return Ok(());
        }
        let outcome = self.controller.lock().fire_deferred_moves();
        if matches!(outcome, Ok(FireOutcome::Started(_))) {
            wake(&self.waker);
        }
        outcome.map(|_| ())
    }

    /// Integer parameter write. `DeferMoves` on the controller address goes
    /// through [`Self::set_deferred_moves`] so a fire wakes the poller.
    pub fn write_int(&self, address: u8, param: Param, value: i64) -> Result<()> {
        if address == CONTROLLER_ADDRESS && param == Param::DeferMoves {
            return self.set_deferred_moves(value != 0);
        }
        self.controller.lock().write_int(address, param, value)
    }

    /// Real parameter write.
    pub fn write_float(&self, address: u8, param: Param, value: f64) -> Result<()> {
        self.controller.lock().write_float(address, param, value)
    }

    /// String parameter write (raw commands).
    pub fn write_string(&self, address: u8, param: Param, value: &str) -> Result<()> {
        self.controller.lock().write_string(address, param, value)
    }

    /// Completed background poll cycles (0 while not polling).
    pub fn poll_cycles(&self) -> u64 {
        self.poller.as_ref().map_or(0, Poller::cycles)
    }

    /// Raw controller command; returns the reply payload.
    pub fn send_command(&self, raw: &str) -> Result<String> {
        self.controller.lock().send_command(raw)
    }

    /// Run one poll pass now. Returns true if any axis moves.
    pub fn poll_now(&self) -> bool {
        poller::poll_cycle(&self.controller)
    }

    /// Controller and axis summary.
    pub fn report(&self) -> String {
        self.controller.lock().report()
    }

    /// Stop the poller, then close the transport.
    pub fn shutdown(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        *self.waker.lock() = None;

        let mut controller = self.controller.lock();
        if controller.is_connected() {
            controller.close();
            tracing::info!(controller = controller.name(), "Disconnected");
        }
    }
}

impl Drop for Parker6k {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn wake(waker: &SharedWaker) {
    if let Some(waker) = waker.lock().as_ref() {
        waker.wakeup();
    }
}

// =============================================================================
// Axis handle
// =============================================================================

/// One axis of a [`Parker6k`]. Cheap to clone.
#[derive(Clone)]
pub struct AxisHandle {
    index: u8,
    controller: Arc<Mutex<Controller>>,
    waker: SharedWaker,
}

impl AxisHandle {
    /// Last decoded status.
    pub fn status(&self) -> Result<Option<AxisStatus>> {
        Ok(self.controller.lock().axis(self.index)?.status.clone())
    }

    /// Last commanded position read by a poll (steps).
    pub fn position(&self) -> Result<Option<i64>> {
        Ok(self.controller.lock().axis(self.index)?.position)
    }

    /// Cached error text of the last failed command.
    pub fn last_error(&self) -> Result<Option<String>> {
        Ok(self.controller.lock().axis(self.index)?.last_error.clone())
    }

    /// Raw command prefixed with this axis' index.
    pub fn send_command(&self, raw: &str) -> Result<String> {
        self.controller.lock().send_axis_command(self.index, raw)
    }

    /// Soft limits in steps.
    pub fn set_limits(&self, low: f64, high: f64) -> Result<()> {
        if low > high {
            return Err(P6kError::Configuration(format!(
                "Axis {} low limit {} above high limit {}",
                self.index, low, high
            )));
        }
        let mut controller = self.controller.lock();
        let high_result = controller.set_high_limit(self.index, high);
        let low_result = controller.set_low_limit(self.index, low);
        high_result.and(low_result)
    }
}

impl MotionAxis for AxisHandle {
    fn index(&self) -> u8 {
        self.index
    }

    fn move_axis(&self, request: MoveRequest) -> Result<()> {
        self.controller.lock().move_axis(self.index, request)?;
        wake(&self.waker);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let result = self.controller.lock().stop_axis(self.index);
        wake(&self.waker);
        result
    }

    fn poll(&self) -> Result<bool> {
        self.controller.lock().poll_axis(self.index)
    }

    fn set_position(&self, position: f64) -> Result<()> {
        self.controller.lock().set_position(self.index, position)
    }

    fn set_closed_loop(&self, enable: bool) -> Result<()> {
        self.controller.lock().set_closed_loop(self.index, enable)
    }
}
