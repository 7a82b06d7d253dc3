//! Controller state and every controller/axis operation.
//!
//! `Controller` owns the channel, the per-axis caches, the deferred-move
//! coordinator and the parameter sink. Every method takes `&mut self`: the
//! caller holds the coarse controller lock (see [`crate::driver::Parker6k`]),
//! which also serializes transport access.
//!
//! # Operation summary
//!
//! | Operation | Commands |
//! |---|---|
//! | `initialize` | `ECHO0`, then `COMEXC1` |
//! | `configure_axis` | `nAXSDEF nDRES nERES nDRIVE nENCCNT nLH nLS nLSPOS nLSNEG` |
//! | `poll_controller` | `TSS` |
//! | `poll_axis` | `nTPC nTPE nTAS` |
//! | `move_axis` | `nMA`, `nV`, `nA nAA nAD nADA`, `nD nGO` (or stage) |
//! | `stop_axis` | `!nS` |
//! | `set_position` | `!nS nPSET nPESET`, then `poll_axis` |
//! | `set_closed_loop` | `nDRIVE1` / `nDRIVE0` |
//! | `set_high_limit` / `set_low_limit` | `nLS3`, `nLSPOS` / `nLSNEG` |
//! | `set_deferred_moves(false)` | staged `nD`..., `GO<mask>` |

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::instrument;

use crate::axis::{AxisState, Direction};
use crate::channel::{Channel, CommsStatus};
use crate::command::{self, MoveRequest, StepTracker};
use crate::config::ControllerConfig;
use crate::deferred::{DeferredMoves, DeferredState, FireOutcome};
use crate::error::{P6kError, Result};
use crate::params::{Param, ParamSink};
use crate::status::{self, SystemStatus};
use crate::throttle::ErrorThrottle;

/// Controller-wide pseudo-axis address.
pub const CONTROLLER_ADDRESS: u8 = 0;

/// Parker 6K controller state.
pub struct Controller {
    config: ControllerConfig,
    channel: Channel,
    axes: BTreeMap<u8, AxisState>,
    deferred: DeferredMoves,
    system: SystemStatus,
    last_error: Option<String>,
    command_readback: String,
    throttle: ErrorThrottle,
    params: Box<dyn ParamSink>,
}

impl Controller {
    /// Controller over an open channel. No I/O happens until [`Self::initialize`].
    pub fn new(config: ControllerConfig, channel: Channel, params: Box<dyn ParamSink>) -> Self {
        let throttle = ErrorThrottle::new(config.error_print_interval());
        Self {
            config,
            channel,
            axes: BTreeMap::new(),
            deferred: DeferredMoves::new(),
            system: SystemStatus::default(),
            last_error: None,
            command_readback: String::new(),
            throttle,
            params,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Controller name from the configuration.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Link state after the last exchange.
    pub fn comms_status(&self) -> CommsStatus {
        self.channel.comms_status()
    }

    /// Last decoded TSS.
    pub fn system_status(&self) -> &SystemStatus {
        &self.system
    }

    /// Last controller-level error text.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Reply to the last raw controller command.
    pub fn command_readback(&self) -> &str {
        &self.command_readback
    }

    /// Deferred-move state.
    pub fn deferred_state(&self) -> DeferredState {
        self.deferred.state()
    }

    /// Cached state of a configured axis.
    pub fn axis(&self, index: u8) -> Result<&AxisState> {
        self.axes.get(&index).ok_or(P6kError::UnknownAxis(index))
    }

    /// Configured axis indexes, ascending.
    pub fn axis_indices(&self) -> Vec<u8> {
        self.axes.keys().copied().collect()
    }

    /// Whether the transport is attached.
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Drop the transport. Polls and commands fail with `Comms` afterwards.
    pub fn close(&mut self) {
        self.channel.close();
        self.publish_comms();
        self.params.call_callbacks(CONTROLLER_ADDRESS);
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Publish controller defaults, disable echo and enable continuous
    /// command execution.
    ///
    /// `COMEXC1` is only sent when `ECHO0` succeeded.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn initialize(&mut self) -> Result<()> {
        for param in [Param::Command, Param::CommandReadback, Param::ControllerError] {
            self.params.set_string(CONTROLLER_ADDRESS, param, "");
        }
        for param in [
            Param::SystemReady,
            Param::ProgramRunning,
            Param::Immediate,
            Param::CommandErrorFlag,
            Param::MemoryError,
            Param::DeferMoves,
        ] {
            self.params.set_int(CONTROLLER_ADDRESS, param, 0);
        }

        let result = self
            .channel
            .request(&command::echo_off())
            .and_then(|_| self.channel.request(&command::continuous_execution()));

        self.publish_comms();
        self.params.call_callbacks(CONTROLLER_ADDRESS);
        result?;
        tracing::info!(endpoint = ?self.channel.describe(), "6K initialised");
        Ok(())
    }

    /// Register axis `index` and read its setup from the controller.
    ///
    /// The axis stays registered even when some reads fail; values that did
    /// not parse keep their defaults and the failure is returned as
    /// `Command`.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn configure_axis(&mut self, index: u8) -> Result<()> {
        if index == CONTROLLER_ADDRESS {
            return Err(P6kError::Configuration(
                "Axis 0 is reserved for controller parameters".into(),
            ));
        }
        if index > self.config.num_axes {
            return Err(P6kError::UnknownAxis(index));
        }

        let axis_config = self.config.axis(index);
        let mut axis = AxisState::new(&axis_config, self.config.error_print_interval());
        let mut tracker = StepTracker::new("configure_axis", index);
        let channel = &mut self.channel;

        if let Some(v) = query_int(channel, &mut tracker, index, command::AXSDEF) {
            axis.axis_def = v;
        }
        if let Some(v) = query_int(channel, &mut tracker, index, command::DRES) {
            axis.drive_resolution = v;
        }
        if let Some(v) = query_int(channel, &mut tracker, index, command::ERES) {
            axis.encoder_resolution = v;
        }
        if let Some(v) = query_int(channel, &mut tracker, index, command::DRIVE) {
            axis.drive_enabled = v != 0;
        }
        if let Some(v) = query_int(channel, &mut tracker, index, command::ENCCNT) {
            axis.has_encoder = v != 0;
        }
        if let Some(v) = query_int(channel, &mut tracker, index, command::LH) {
            axis.hard_limit_enable = v;
        }
        if let Some(v) = query_int(channel, &mut tracker, index, command::LS) {
            axis.soft_limit_enable = v;
        }
        if let Some(v) = query_real(channel, &mut tracker, index, command::LSPOS) {
            axis.high_limit = v;
        }
        if let Some(v) = query_real(channel, &mut tracker, index, command::LSNEG) {
            axis.low_limit = v;
        }

        for warning in axis.limit_warnings() {
            tracing::warn!(axis = index, "{}", warning);
        }
        tracing::info!(axis = index, drive = %axis.drive_type(), "Axis configured");
        tracing::debug!("{}", axis.describe());

        publish_axis_setup(self.params.as_mut(), &axis);
        self.params.set_string(index, Param::AxisCommand, "");
        self.params.set_string(index, Param::AxisError, "");
        self.axes.insert(index, axis);
        self.publish_comms();
        self.params.call_callbacks(index);

        if !tracker.all_ok() {
            tracing::error!(axis = index, "Could not read all axis parameters at startup");
        }
        tracker.finish()
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Read and publish the system status (`TSS`).
    ///
    /// Failures are reported through the controller throttle and leave the
    /// previous status in place.
    pub fn poll_controller(&mut self) -> Result<SystemStatus> {
        let now = Instant::now();
        let result = self
            .channel
            .request(command::TSS)
            .and_then(|payload| {
                let (_, text) = status::split_reply(&payload, command::TSS)?;
                status::decode_system(text)
            });

        match &result {
            Ok(system) => {
                let address = CONTROLLER_ADDRESS;
                self.params.set_flag(address, Param::SystemReady, system.system_ready);
                self.params
                    .set_flag(address, Param::ProgramRunning, system.program_running);
                self.params.set_flag(address, Param::Immediate, system.immediate);
                self.params
                    .set_flag(address, Param::CommandErrorFlag, system.command_error);
                self.params.set_flag(address, Param::MemoryError, system.memory_error);
                self.system = system.clone();
                self.throttle.clear();
            }
            Err(e) => {
                if self.throttle.should_report(now) {
                    tracing::error!(
                        controller = %self.config.name,
                        error = %e,
                        "Problem reading status on controller"
                    );
                }
            }
        }

        self.publish_comms();
        self.params.call_callbacks(CONTROLLER_ADDRESS);
        result
    }

    /// Read positions and status of one axis. Returns the moving flag.
    ///
    /// `TPC`, `TPE` and `TAS` are all attempted. A reply that does not parse
    /// leaves the matching cached value untouched. Failures are reported
    /// through the axis throttle.
    pub fn poll_axis(&mut self, index: u8) -> Result<bool> {
        let now = Instant::now();
        let axis = self
            .axes
            .get_mut(&index)
            .ok_or(P6kError::UnknownAxis(index))?;
        let channel = &mut self.channel;
        let params = self.params.as_mut();
        let mut tracker = StepTracker::new("poll", index).quiet();

        if let Some(position) = query_int(channel, &mut tracker, index, command::TPC) {
            let direction = axis.record_position(position);
            params.set_float(index, Param::Position, position as f64);
            params.set_flag(
                index,
                Param::StatusDirection,
                direction == Direction::Positive,
            );
        }

        if let Some(position) = query_int(channel, &mut tracker, index, command::TPE) {
            axis.encoder_position = Some(position);
            params.set_float(index, Param::EncoderPosition, position as f64);
        }

        let tas = command::query(index, command::TAS);
        let decoded = channel.request(&tas).and_then(|payload| {
            let text = status::axis_value(&payload, index, command::TAS)?;
            status::decode_axis(
                text,
                axis.drive_type(),
                axis.is_staged(),
                axis.has_command_error(),
            )
        });
        if let Some(decoded) = tracker.record(&tas, decoded) {
            axis.status = Some(decoded);
            publish_axis_status(params, axis);
        }

        let comms = channel.comms_status();
        params.set_int(index, Param::StatusCommsError, comms.as_int());
        params.set_int(CONTROLLER_ADDRESS, Param::CommsError, comms.as_int());

        if tracker.all_ok() {
            axis.throttle.clear();
        } else if axis.throttle.should_report(now) {
            tracing::error!(
                controller = %self.config.name,
                axis = index,
                failure = tracker.first_failure().unwrap_or_default(),
                "Axis status poll failed"
            );
        }

        let moving = axis.status.as_ref().map(|s| s.moving_out()).unwrap_or(false);
        params.call_callbacks(index);
        params.call_callbacks(CONTROLLER_ADDRESS);
        tracker.finish().map(|_| moving)
    }

    // =========================================================================
    // Motion
    // =========================================================================

    /// Move an axis, or stage the target while deferred moves are armed.
    ///
    /// Fails with `Configuration` before anything is sent if the request
    /// needs scaling and the axis has no usable resolution.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn move_axis(&mut self, index: u8, request: MoveRequest) -> Result<()> {
        let armed = self.deferred.is_armed();
        let axis = self
            .axes
            .get_mut(&index)
            .ok_or(P6kError::UnknownAxis(index))?;
        let plan = command::plan_move(index, &request, &axis.scaling())?;
        let mut tracker = StepTracker::new("move", index);

        for step in &plan.setup {
            tracker.send(&mut self.channel, step);
        }

        if armed {
            axis.stage(plan.target);
            tracing::debug!(axis = index, target = plan.target, "Move staged");
        } else {
            if tracker
                .send(&mut self.channel, &command::distance(index, plan.target))
                .is_some()
            {
                axis.commanded_target = Some(plan.target);
            }
            tracker.send(&mut self.channel, &command::go(index));
        }

        self.finish_axis_command(index, tracker)
    }

    /// Stop an axis and drop any staged deferred move.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn stop_axis(&mut self, index: u8) -> Result<()> {
        let axis = self
            .axes
            .get_mut(&index)
            .ok_or(P6kError::UnknownAxis(index))?;
        axis.unstage();
        let mut tracker = StepTracker::new("stop", index);
        tracker.send(&mut self.channel, &command::stop(index));
        self.finish_axis_command(index, tracker)
    }

    /// Redefine the current position (steps) on the motor and encoder.
    ///
    /// After all three commands succeed the axis is polled at once so the new
    /// position is visible before the next scheduled poll.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn set_position(&mut self, index: u8, position: f64) -> Result<()> {
        if !position.is_finite() {
            return Err(P6kError::Configuration(format!(
                "Axis {} position {} is not finite",
                index, position
            )));
        }
        let axis = self.axes.get(&index).ok_or(P6kError::UnknownAxis(index))?;
        let steps = position.round() as i64;
        let counts = (position * axis.encoder_ratio).round() as i64;

        let mut tracker = StepTracker::new("set_position", index);
        tracker.send(&mut self.channel, &command::stop(index));
        tracker.send(&mut self.channel, &command::set_position(index, steps));
        tracker.send(
            &mut self.channel,
            &command::set_encoder_position(index, counts),
        );

        if tracker.all_ok() {
            if let Err(e) = self.poll_axis(index) {
                tracing::debug!(axis = index, error = %e, "Refresh after set_position failed");
            }
        }
        self.finish_axis_command(index, tracker)
    }

    /// Enable or disable the drive.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn set_closed_loop(&mut self, index: u8, enable: bool) -> Result<()> {
        let axis = self
            .axes
            .get_mut(&index)
            .ok_or(P6kError::UnknownAxis(index))?;
        let mut tracker = StepTracker::new("set_closed_loop", index);
        if tracker
            .send(&mut self.channel, &command::drive(index, enable))
            .is_some()
        {
            axis.drive_enabled = enable;
            self.params.set_flag(index, Param::Drive, enable);
        }
        self.finish_axis_command(index, tracker)
    }

    /// Enable soft limits and set the positive one.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn set_high_limit(&mut self, index: u8, value: f64) -> Result<()> {
        self.set_soft_limit(index, true, value)
    }

    /// Enable soft limits and set the negative one.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn set_low_limit(&mut self, index: u8, value: f64) -> Result<()> {
        self.set_soft_limit(index, false, value)
    }

    fn set_soft_limit(&mut self, index: u8, high: bool, value: f64) -> Result<()> {
        let axis = self
            .axes
            .get_mut(&index)
            .ok_or(P6kError::UnknownAxis(index))?;
        let precision = axis.scaling().precision;
        let mut tracker = StepTracker::new("set_limit", index);

        if tracker
            .send(&mut self.channel, &command::enable_soft_limits(index))
            .is_some()
        {
            axis.soft_limit_enable = command::LIMITS_ENABLED;
            self.params
                .set_int(index, Param::SoftLimitEnable, command::LIMITS_ENABLED);
        }
        if tracker
            .send(
                &mut self.channel,
                &command::soft_limit(index, high, value, precision),
            )
            .is_some()
        {
            let param = if high {
                axis.high_limit = value;
                Param::HighLimit
            } else {
                axis.low_limit = value;
                Param::LowLimit
            };
            self.params.set_float(index, param, value);
        }
        self.finish_axis_command(index, tracker)
    }

    // =========================================================================
    // Deferred moves
    // =========================================================================

    /// `true` arms deferred moves, `false` fires whatever was staged.
    pub fn set_deferred_moves(&mut self, defer: bool) -> Result<()> {
        if defer {
            self.arm_deferred_moves();
            Ok(())
        } else {
            self.fire_deferred_moves().map(|_| ())
        }
    }

    /// Stage subsequent moves until fired. Arming twice changes nothing.
    pub fn arm_deferred_moves(&mut self) {
        if self.deferred.arm() {
            tracing::debug!(controller = %self.config.name, "Deferred moves armed");
        }
        self.params.set_flag(CONTROLLER_ADDRESS, Param::DeferMoves, true);
        self.params.call_callbacks(CONTROLLER_ADDRESS);
    }

    /// Send staged targets and the synchronized start, then disarm.
    ///
    /// Success clears the controller error text; failure sets it.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn fire_deferred_moves(&mut self) -> Result<FireOutcome> {
        let result = self.deferred.fire(&mut self.channel, &mut self.axes);

        match &result {
            Ok(FireOutcome::NotArmed) => {}
            Ok(outcome) => {
                tracing::debug!(?outcome, "Deferred moves fired");
                self.last_error = None;
            }
            Err(e) => {
                self.last_error = Some(format!("Deferred move failed: {}", e.summary()));
            }
        }

        self.params.set_flag(CONTROLLER_ADDRESS, Param::DeferMoves, false);
        self.params.set_string(
            CONTROLLER_ADDRESS,
            Param::ControllerError,
            self.last_error.as_deref().unwrap_or(""),
        );
        self.publish_comms();
        self.params.call_callbacks(CONTROLLER_ADDRESS);
        result
    }

    // =========================================================================
    // Raw commands and parameter writes
    // =========================================================================

    /// Send a controller command verbatim and keep its reply as readback.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn send_command(&mut self, raw: &str) -> Result<String> {
        self.params.set_string(CONTROLLER_ADDRESS, Param::Command, raw);
        let result = self.channel.request(raw);
        if let Ok(reply) = &result {
            self.command_readback = reply.clone();
            self.params
                .set_string(CONTROLLER_ADDRESS, Param::CommandReadback, reply);
        }
        self.publish_comms();
        self.params.call_callbacks(CONTROLLER_ADDRESS);
        result
    }

    /// Send `{index}{raw}` and keep the reply as the axis readback.
    #[instrument(skip(self), fields(controller = %self.config.name), err)]
    pub fn send_axis_command(&mut self, index: u8, raw: &str) -> Result<String> {
        let axis = self
            .axes
            .get_mut(&index)
            .ok_or(P6kError::UnknownAxis(index))?;
        self.params.set_string(index, Param::AxisCommand, raw);
        let result = self.channel.request(&format!("{}{}", index, raw));
        if let Ok(reply) = &result {
            axis.command_readback = reply.clone();
            self.params.set_string(index, Param::AxisCommandReadback, reply);
        }
        self.publish_comms();
        self.params.call_callbacks(index);
        result
    }

    /// Integer parameter write.
    ///
    /// Axis scaling writes (`DriveResolution`, `EncoderResolution`,
    /// `AxisDefinition`, `MaxDigits`) only update the cache; the next move
    /// reads them. `DeferMoves` on address 0 arms or fires deferred moves.
    pub fn write_int(&mut self, address: u8, param: Param, value: i64) -> Result<()> {
        if address == CONTROLLER_ADDRESS {
            return match param {
                Param::DeferMoves => self.set_deferred_moves(value != 0),
                other => Err(not_writable(address, other)),
            };
        }

        let axis = self
            .axes
            .get_mut(&address)
            .ok_or(P6kError::UnknownAxis(address))?;
        match param {
            Param::DriveResolution => axis.drive_resolution = value,
            Param::EncoderResolution => axis.encoder_resolution = value,
            Param::AxisDefinition => axis.axis_def = value,
            Param::MaxDigits => {
                axis.precision = i32::try_from(value)
                    .ok()
                    .filter(|p| *p >= 0)
                    .ok_or_else(|| {
                        P6kError::Configuration(format!("Invalid precision {}", value))
                    })?;
            }
            Param::Drive => return self.set_closed_loop(address, value != 0),
            other => return Err(not_writable(address, other)),
        }

        self.params.set_int(address, param, value);
        self.params.call_callbacks(address);
        Ok(())
    }

    /// Real parameter write: `EncoderRatio`, `HighLimit`, `LowLimit`.
    pub fn write_float(&mut self, address: u8, param: Param, value: f64) -> Result<()> {
        match param {
            Param::HighLimit => self.set_high_limit(address, value),
            Param::LowLimit => self.set_low_limit(address, value),
            Param::EncoderRatio => {
                if !value.is_finite() {
                    return Err(P6kError::Configuration(format!(
                        "Encoder ratio {} is not finite",
                        value
                    )));
                }
                let axis = self
                    .axes
                    .get_mut(&address)
                    .ok_or(P6kError::UnknownAxis(address))?;
                axis.encoder_ratio = value;
                self.params.set_float(address, param, value);
                self.params.call_callbacks(address);
                Ok(())
            }
            other => Err(not_writable(address, other)),
        }
    }

    /// String parameter write: raw controller or axis commands.
    pub fn write_string(&mut self, address: u8, param: Param, value: &str) -> Result<()> {
        match (address, param) {
            (CONTROLLER_ADDRESS, Param::Command) => self.send_command(value).map(|_| ()),
            (axis, Param::AxisCommand) if axis != CONTROLLER_ADDRESS => {
                self.send_axis_command(axis, value).map(|_| ())
            }
            (address, other) => Err(not_writable(address, other)),
        }
    }

    // =========================================================================
    // Report
    // =========================================================================

    /// Human-readable summary of the controller and its axes.
    pub fn report(&self) -> String {
        let mut text = format!(
            "p6k motor driver {}, numAxes={}, moving poll period={:?}, idle poll period={:?}\n",
            self.config.name,
            self.config.num_axes,
            self.config.moving_poll_period(),
            self.config.idle_poll_period(),
        );
        text.push_str(&format!(
            "  endpoint: {}, comms: {:?}, deferred: {:?}\n",
            self.channel.describe().unwrap_or_else(|| "closed".into()),
            self.channel.comms_status(),
            self.deferred.state(),
        ));
        for axis in self.axes.values() {
            text.push_str(&axis.describe());
        }
        text
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn publish_comms(&mut self) {
        self.params.set_int(
            CONTROLLER_ADDRESS,
            Param::CommsError,
            self.channel.comms_status().as_int(),
        );
    }

    /// Cache or clear the axis error text, publish, and turn the tracker into
    /// the operation result.
    fn finish_axis_command(&mut self, index: u8, tracker: StepTracker) -> Result<()> {
        if let Some(axis) = self.axes.get_mut(&index) {
            axis.last_error = tracker.first_message().map(str::to_string);
            self.params.set_string(
                index,
                Param::AxisError,
                axis.last_error.as_deref().unwrap_or(""),
            );
            self.params.set_int(
                index,
                Param::StatusCommsError,
                self.channel.comms_status().as_int(),
            );
        }
        self.publish_comms();
        self.params.call_callbacks(index);
        self.params.call_callbacks(CONTROLLER_ADDRESS);
        tracker.finish()
    }
}

fn not_writable(address: u8, param: Param) -> P6kError {
    P6kError::Configuration(format!(
        "Parameter {:?} is not writable on address {}",
        param, address
    ))
}

/// `{index}{mnemonic}` query parsed as an integer, tracked as one step.
fn query_int(
    channel: &mut Channel,
    tracker: &mut StepTracker,
    index: u8,
    mnemonic: &str,
) -> Option<i64> {
    let query = command::query(index, mnemonic);
    let result = channel
        .request(&query)
        .and_then(|payload| status::axis_int(&payload, index, mnemonic));
    tracker.record(&query, result)
}

/// `{index}{mnemonic}` query parsed as a real, tracked as one step.
fn query_real(
    channel: &mut Channel,
    tracker: &mut StepTracker,
    index: u8,
    mnemonic: &str,
) -> Option<f64> {
    let query = command::query(index, mnemonic);
    let result = channel
        .request(&query)
        .and_then(|payload| status::axis_real(&payload, index, mnemonic));
    tracker.record(&query, result)
}

fn publish_axis_setup(params: &mut dyn ParamSink, axis: &AxisState) {
    let index = axis.index;
    params.set_int(index, Param::AxisDefinition, axis.axis_def);
    params.set_int(index, Param::DriveResolution, axis.drive_resolution);
    params.set_int(index, Param::EncoderResolution, axis.encoder_resolution);
    params.set_flag(index, Param::Drive, axis.drive_enabled);
    params.set_flag(index, Param::StatusHasEncoder, axis.has_encoder);
    params.set_int(index, Param::HardLimitEnable, axis.hard_limit_enable);
    params.set_int(index, Param::SoftLimitEnable, axis.soft_limit_enable);
    params.set_float(index, Param::HighLimit, axis.high_limit);
    params.set_float(index, Param::LowLimit, axis.low_limit);
    params.set_int(index, Param::MaxDigits, i64::from(axis.precision));
    params.set_float(index, Param::EncoderRatio, axis.encoder_ratio);
}

fn publish_axis_status(params: &mut dyn ParamSink, axis: &AxisState) {
    let Some(status) = &axis.status else {
        return;
    };
    let index = axis.index;
    params.set_flag(index, Param::StatusDone, status.done_moving);
    params.set_flag(index, Param::StatusMoving, status.moving);
    params.set_flag(index, Param::StatusHighLimit, status.high_limit);
    params.set_flag(index, Param::StatusLowLimit, status.low_limit);
    params.set_flag(index, Param::StatusHomed, status.homed);
    params.set_flag(index, Param::StatusPowerOn, status.power_on);
    params.set_flag(index, Param::StatusFollowingError, status.following_error);
    params.set_flag(index, Param::StatusProblem, status.problem);
}
