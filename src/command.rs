//! Command Formatter
//!
//! Builds 6K command strings and plans multi-step sequences.
//!
//! Syntax: `{axis}{mnemonic}{args}`; the channel appends the terminator.
//! - `1MA1` absolute mode, `1MA0` incremental
//! - `1V2.50` velocity (revs/s, after scaling)
//! - `1D4000` distance in steps, `1GO` start
//! - `!1S` immediate stop
//! - `GO01010000` synchronized start of axes 2 and 4
//!
//! Multi-step operations do not short-circuit: every step is sent and
//! [`StepTracker`] records which ones failed.

use crate::channel::Channel;
use crate::config::MAX_AXES;
use crate::error::{P6kError, Result};

// =============================================================================
// Mnemonics
// =============================================================================

/// Acceleration
pub const A: &str = "A";
/// Average acceleration (S-curve smoothing)
pub const AA: &str = "AA";
/// Deceleration
pub const AD: &str = "AD";
/// Average deceleration (S-curve smoothing)
pub const ADA: &str = "ADA";
/// Axis definition (0 = stepper, 1 = servo)
pub const AXSDEF: &str = "AXSDEF";
/// Continuous command execution
pub const COMEXC: &str = "COMEXC";
/// Distance / target position
pub const D: &str = "D";
/// Drive enable
pub const DRIVE: &str = "DRIVE";
/// Drive resolution
pub const DRES: &str = "DRES";
/// Command echo
pub const ECHO: &str = "ECHO";
/// Encoder-present
pub const ENCCNT: &str = "ENCCNT";
/// Encoder resolution
pub const ERES: &str = "ERES";
/// Start motion
pub const GO: &str = "GO";
/// Hard limit enable
pub const LH: &str = "LH";
/// Soft limit enable
pub const LS: &str = "LS";
/// Negative soft limit
pub const LSNEG: &str = "LSNEG";
/// Positive soft limit
pub const LSPOS: &str = "LSPOS";
/// Absolute/incremental mode
pub const MA: &str = "MA";
/// Set encoder position
pub const PESET: &str = "PESET";
/// Set commanded position
pub const PSET: &str = "PSET";
/// Stop
pub const S: &str = "S";
/// Transfer axis status
pub const TAS: &str = "TAS";
/// Transfer commanded position
pub const TPC: &str = "TPC";
/// Transfer encoder position
pub const TPE: &str = "TPE";
/// Transfer system status
pub const TSS: &str = "TSS";
/// Velocity
pub const V: &str = "V";

/// Limit-enable value with both directions enabled.
pub const LIMITS_ENABLED: i64 = 3;

// =============================================================================
// Builders
// =============================================================================

/// `{axis}{mnemonic}` query, e.g. `1DRES`.
pub fn query(axis: u8, mnemonic: &str) -> String {
    format!("{}{}", axis, mnemonic)
}

/// `MA1` for absolute moves, `MA0` for relative ones.
pub fn direction_mode(axis: u8, relative: bool) -> String {
    format!("{}{}{}", axis, MA, u8::from(!relative))
}

/// Scaled real argument with `precision` decimals, e.g. `1V2.50`.
pub fn scaled(axis: u8, mnemonic: &str, value: f64, precision: usize) -> String {
    format!("{}{}{:.*}", axis, mnemonic, precision, value)
}

/// `{axis}D{steps}`
pub fn distance(axis: u8, steps: i64) -> String {
    format!("{}{}{}", axis, D, steps)
}

/// `{axis}GO`
pub fn go(axis: u8) -> String {
    format!("{}{}", axis, GO)
}

/// Immediate stop, `!{axis}S`.
pub fn stop(axis: u8) -> String {
    format!("!{}{}", axis, S)
}

/// `{axis}PSET{steps}`
pub fn set_position(axis: u8, steps: i64) -> String {
    format!("{}{}{}", axis, PSET, steps)
}

/// `{axis}PESET{counts}`
pub fn set_encoder_position(axis: u8, counts: i64) -> String {
    format!("{}{}{}", axis, PESET, counts)
}

/// `{axis}DRIVE1` / `{axis}DRIVE0`
pub fn drive(axis: u8, enable: bool) -> String {
    format!("{}{}{}", axis, DRIVE, u8::from(enable))
}

/// `{axis}LS3`: enable both soft limits.
pub fn enable_soft_limits(axis: u8) -> String {
    format!("{}{}{}", axis, LS, LIMITS_ENABLED)
}

/// `{axis}LSPOS{value}` or `{axis}LSNEG{value}`
pub fn soft_limit(axis: u8, high: bool, value: f64, precision: usize) -> String {
    let mnemonic = if high { LSPOS } else { LSNEG };
    scaled(axis, mnemonic, value, precision)
}

/// Disable command echo.
pub fn echo_off() -> String {
    format!("{}0", ECHO)
}

/// Enable continuous command execution.
pub fn continuous_execution() -> String {
    format!("{}1", COMEXC)
}

/// Synchronized start: `GO` followed by one flag per axis slot.
///
/// `axes` are 1-based; indexes outside `1..=MAX_AXES` are ignored.
pub fn go_mask(axes: impl IntoIterator<Item = u8>) -> String {
    let mut mask = [b'0'; MAX_AXES as usize];
    for axis in axes {
        if (1..=MAX_AXES).contains(&axis) {
            mask[usize::from(axis - 1)] = b'1';
        }
    }
    format!("{}{}", GO, String::from_utf8_lossy(&mask))
}

// =============================================================================
// Move planning
// =============================================================================

/// A positioning request in engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveRequest {
    /// Target (absolute) or distance (relative), in steps
    pub position: f64,
    /// Incremental instead of absolute
    pub relative: bool,
    /// Base velocity (unused by the 6K)
    pub min_velocity: f64,
    /// Slew velocity; 0 keeps the controller's current setting
    pub max_velocity: f64,
    /// Acceleration; 0 keeps the controller's current setting
    pub acceleration: f64,
}

/// Scaling parameters read from the axis cache at the moment a move is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaling {
    /// `AXSDEF` value
    pub axis_def: i64,
    /// `DRES`
    pub drive_resolution: i64,
    /// `ERES`
    pub encoder_resolution: i64,
    /// Decimal places for velocity/acceleration arguments
    pub precision: usize,
}

impl Scaling {
    /// ERES when `AXSDEF` is 0, DRES otherwise.
    pub fn scale(&self) -> i64 {
        if self.axis_def == 0 {
            self.encoder_resolution
        } else {
            self.drive_resolution
        }
    }
}

/// Commands for one move.
#[derive(Debug, Clone, PartialEq)]
pub struct MovePlan {
    /// Mode, velocity and acceleration commands, in send order
    pub setup: Vec<String>,
    /// Rounded target in steps
    pub target: i64,
}

/// Plan a move: `MA`, then `V` if a velocity is given, then `A`/`AA`/`AD`/`ADA`
/// if both velocity and acceleration are given. The target is not included;
/// it is either sent as `D` + `GO` or staged for a deferred start.
pub fn plan_move(axis: u8, request: &MoveRequest, scaling: &Scaling) -> Result<MovePlan> {
    if !request.position.is_finite() {
        return Err(P6kError::Configuration(format!(
            "Axis {} move target {} is not finite",
            axis, request.position
        )));
    }

    let mut setup = vec![direction_mode(axis, request.relative)];

    if request.max_velocity != 0.0 {
        let scale = scaling.scale();
        if scale <= 0 {
            return Err(P6kError::Configuration(format!(
                "Axis {} has no usable resolution (AXSDEF={}, DRES={}, ERES={})",
                axis, scaling.axis_def, scaling.drive_resolution, scaling.encoder_resolution
            )));
        }
        let scale = scale as f64;
        let precision = scaling.precision;

        setup.push(scaled(axis, V, request.max_velocity / scale, precision));

        if request.acceleration != 0.0 {
            let accel = request.acceleration / scale;
            setup.push(scaled(axis, A, accel, precision));
            setup.push(scaled(axis, AA, accel / 2.0, precision));
            setup.push(scaled(axis, AD, accel, precision));
            setup.push(scaled(axis, ADA, accel, precision));
        }
    }

    Ok(MovePlan {
        setup,
        target: request.position.round() as i64,
    })
}

// =============================================================================
// Independent step tracking
// =============================================================================

/// Runs the steps of one logical operation without short-circuiting.
#[derive(Debug)]
pub struct StepTracker {
    operation: &'static str,
    axis: u8,
    attempted: usize,
    failures: Vec<String>,
    first_message: Option<String>,
    quiet: bool,
}

impl StepTracker {
    /// Start tracking `operation` on `axis` (0 for controller-wide).
    pub fn new(operation: &'static str, axis: u8) -> Self {
        Self {
            operation,
            axis,
            attempted: 0,
            failures: Vec::new(),
            first_message: None,
            quiet: false,
        }
    }

    /// Log failed steps at debug level. The caller reports failures itself.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Send `command` and record the outcome. Returns the reply payload on success.
    pub fn send(&mut self, channel: &mut Channel, command: &str) -> Option<String> {
        let result = channel.request(command);
        self.record(command, result)
    }

    /// Record the outcome of a step run elsewhere.
    pub fn record<T>(&mut self, command: &str, result: Result<T>) -> Option<T> {
        self.attempted += 1;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                if self.quiet {
                    tracing::debug!(
                        operation = self.operation,
                        axis = self.axis,
                        command,
                        error = %e,
                        "Command step failed"
                    );
                } else {
                    tracing::warn!(
                        operation = self.operation,
                        axis = self.axis,
                        command,
                        error = %e,
                        "Command step failed"
                    );
                }
                if self.first_message.is_none() {
                    self.first_message = Some(e.summary());
                }
                self.failures.push(format!("{}: {}", command, e.summary()));
                None
            }
        }
    }

    /// No step failed so far.
    pub fn all_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Steps attempted so far.
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Controller text of the first failure, for the axis error cache.
    pub fn first_message(&self) -> Option<&str> {
        self.first_message.as_deref()
    }

    /// `command: text` of the first failed step.
    pub fn first_failure(&self) -> Option<&str> {
        self.failures.first().map(String::as_str)
    }

    /// `Ok` if every step succeeded, otherwise a `Command` error.
    pub fn finish(self) -> Result<()> {
        match self.failures.first() {
            None => Ok(()),
            Some(first) => Err(P6kError::Command {
                operation: self.operation,
                axis: self.axis,
                attempted: self.attempted,
                failed: self.failures.len(),
                first_failure: first.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::time::Duration;

    fn servo(dres: i64, precision: usize) -> Scaling {
        Scaling {
            axis_def: 1,
            drive_resolution: dres,
            encoder_resolution: 4000,
            precision,
        }
    }

    #[test]
    fn test_simple_builders() {
        assert_eq!(query(3, TAS), "3TAS");
        assert_eq!(direction_mode(1, false), "1MA1");
        assert_eq!(direction_mode(1, true), "1MA0");
        assert_eq!(distance(2, -1500), "2D-1500");
        assert_eq!(go(2), "2GO");
        assert_eq!(stop(4), "!4S");
        assert_eq!(set_position(1, 10), "1PSET10");
        assert_eq!(set_encoder_position(1, 40), "1PESET40");
        assert_eq!(drive(1, true), "1DRIVE1");
        assert_eq!(drive(1, false), "1DRIVE0");
        assert_eq!(enable_soft_limits(5), "5LS3");
        assert_eq!(soft_limit(1, true, 1000.0, 2), "1LSPOS1000.00");
        assert_eq!(soft_limit(1, false, -1000.0, 0), "1LSNEG-1000");
        assert_eq!(echo_off(), "ECHO0");
        assert_eq!(continuous_execution(), "COMEXC1");
    }

    #[test]
    fn test_go_mask_marks_exact_slots() {
        assert_eq!(go_mask([2, 4]), "GO01010000");
        assert_eq!(go_mask([1, 8]), "GO10000001");
        assert_eq!(go_mask(std::iter::empty()), "GO00000000");
        // Controller pseudo-axis and out-of-range slots are ignored.
        assert_eq!(go_mask([0, 9, 3]), "GO00100000");
    }

    #[test]
    fn test_scale_selection() {
        let stepper = Scaling {
            axis_def: 0,
            drive_resolution: 25000,
            encoder_resolution: 4000,
            precision: 2,
        };
        assert_eq!(stepper.scale(), 4000);
        assert_eq!(servo(25000, 2).scale(), 25000);
    }

    #[test]
    fn test_full_move_plan() -> Result<()> {
        let request = MoveRequest {
            position: 10000.4,
            relative: false,
            max_velocity: 50000.0,
            acceleration: 100000.0,
            ..Default::default()
        };

        let plan = plan_move(1, &request, &servo(25000, 2))?;

        assert_eq!(
            plan.setup,
            vec!["1MA1", "1V2.00", "1A4.00", "1AA2.00", "1AD4.00", "1ADA4.00"]
        );
        assert_eq!(plan.target, 10000);
        Ok(())
    }

    #[test]
    fn test_zero_velocity_skips_rates() -> Result<()> {
        let request = MoveRequest {
            position: -250.6,
            relative: true,
            acceleration: 1000.0,
            ..Default::default()
        };

        // Without a velocity neither V nor the acceleration group is sent,
        // and the resolution is never consulted.
        let plan = plan_move(2, &request, &servo(0, 2))?;

        assert_eq!(plan.setup, vec!["2MA0"]);
        assert_eq!(plan.target, -251);
        Ok(())
    }

    #[test]
    fn test_velocity_without_acceleration() -> Result<()> {
        let request = MoveRequest {
            position: 1.0,
            max_velocity: 1000.0,
            ..Default::default()
        };
        let plan = plan_move(1, &request, &servo(4000, 3))?;
        assert_eq!(plan.setup, vec!["1MA1", "1V0.250"]);
        Ok(())
    }

    #[test]
    fn test_zero_resolution_is_configuration_error() {
        let request = MoveRequest {
            position: 1.0,
            max_velocity: 1000.0,
            ..Default::default()
        };
        let result = plan_move(1, &request, &servo(0, 2));
        assert!(matches!(result, Err(P6kError::Configuration(_))));
    }

    #[test]
    fn test_scaled_arguments_round_trip_within_precision() -> Result<()> {
        for (velocity, accel, dres, precision) in [
            (12345.0, 54321.0, 25000, 2usize),
            (1.0, 3.0, 7, 4),
            (999.9, 0.5, 4000, 3),
        ] {
            let request = MoveRequest {
                position: 0.0,
                max_velocity: velocity,
                acceleration: accel,
                ..Default::default()
            };
            let plan = plan_move(1, &request, &servo(dres, precision))?;
            let tolerance = 0.5 * 10f64.powi(-(precision as i32)) + 1e-12;

            let parse = |command: &str, mnemonic: &str| -> f64 {
                command
                    .strip_prefix(&format!("1{}", mnemonic))
                    .and_then(|arg| arg.parse().ok())
                    .unwrap_or(f64::NAN)
            };
            let v = parse(&plan.setup[1], V);
            let a = parse(&plan.setup[2], A);
            assert!((v - velocity / dres as f64).abs() <= tolerance, "{}", plan.setup[1]);
            assert!((a - accel / dres as f64).abs() <= tolerance, "{}", plan.setup[2]);
        }
        Ok(())
    }

    #[test]
    fn test_non_finite_target_rejected() {
        let request = MoveRequest {
            position: f64::NAN,
            ..Default::default()
        };
        assert!(plan_move(1, &request, &servo(1, 2)).is_err());
    }

    #[test]
    fn test_tracker_runs_every_step() {
        let mock = MockTransport::new();
        mock.error_reply("1PSET5", "INVALID DATA");
        let mut channel = Channel::new(Box::new(mock.clone()), Duration::from_millis(200));

        let mut tracker = StepTracker::new("set_position", 1);
        for command in ["!1S", "1PSET5", "1PESET5"] {
            tracker.send(&mut channel, command);
        }

        assert_eq!(mock.calls(), vec!["!1S", "1PSET5", "1PESET5"]);
        assert!(!tracker.all_ok());
        assert_eq!(tracker.attempted(), 3);
        assert_eq!(tracker.first_message(), Some("INVALID DATA"));
        match tracker.finish() {
            Err(P6kError::Command {
                operation,
                axis,
                attempted,
                failed,
                first_failure,
            }) => {
                assert_eq!(operation, "set_position");
                assert_eq!(axis, 1);
                assert_eq!(attempted, 3);
                assert_eq!(failed, 1);
                assert_eq!(first_failure, "1PSET5: INVALID DATA");
            }
            other => panic!("expected command error, got {:?}", other),
        }
    }

    #[test]
    fn test_tracker_success() {
        let mut tracker = StepTracker::new("move", 2);
        assert_eq!(tracker.record("2GO", Ok(5)), Some(5));
        assert!(tracker.all_ok());
        assert!(tracker.finish().is_ok());
    }
}
