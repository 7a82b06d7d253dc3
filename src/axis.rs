//! Per-axis cached state.
//!
//! Everything here is owned by one axis and mutated only by that axis'
//! command and poll paths, under the controller lock.

use std::time::Duration;

use crate::command::{Scaling, LIMITS_ENABLED};
use crate::config::AxisConfig;
use crate::status::AxisStatus;
use crate::throttle::ErrorThrottle;

/// Drive family from `AXSDEF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    /// `AXSDEF0`
    Stepper,
    /// `AXSDEF1`
    Servo,
    /// Anything else the controller reports. Decoded like a stepper.
    Unknown(i64),
}

impl DriveType {
    /// Map an `AXSDEF` value.
    pub fn from_axis_def(value: i64) -> Self {
        match value {
            0 => DriveType::Stepper,
            1 => DriveType::Servo,
            other => DriveType::Unknown(other),
        }
    }
}

impl std::fmt::Display for DriveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveType::Stepper => write!(f, "Stepper Drive"),
            DriveType::Servo => write!(f, "Servo Drive"),
            DriveType::Unknown(v) => write!(f, "Unknown Drive Type ({})", v),
        }
    }
}

/// Deferred-move slot of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagedMove {
    /// Moves start immediately
    #[default]
    Unstaged,
    /// Target waiting for the synchronized start
    Staged {
        /// Target in steps
        target: i64,
    },
}

/// Travel direction inferred from successive positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Position increasing (or never moved)
    #[default]
    Positive,
    /// Position decreasing
    Negative,
}

/// Cached state of one configured axis.
#[derive(Debug, Clone)]
pub struct AxisState {
    /// 1-based axis index
    pub index: u8,
    /// `AXSDEF`
    pub axis_def: i64,
    /// `DRES`
    pub drive_resolution: i64,
    /// `ERES`
    pub encoder_resolution: i64,
    /// `DRIVE`
    pub drive_enabled: bool,
    /// `ENCCNT`
    pub has_encoder: bool,
    /// `LS` (3 = both soft limits enabled)
    pub soft_limit_enable: i64,
    /// `LH` (3 = both hard limits enabled)
    pub hard_limit_enable: i64,
    /// `LSPOS`
    pub high_limit: f64,
    /// `LSNEG`
    pub low_limit: f64,
    /// Decimal places for velocity and acceleration arguments
    pub precision: i32,
    /// Encoder counts per step, used by set-position
    pub encoder_ratio: f64,
    /// Last target sent with `D`
    pub commanded_target: Option<i64>,
    /// Deferred-move slot
    pub staged: StagedMove,
    /// Controller text of the last failed command
    pub last_error: Option<String>,
    /// Readback of the last raw axis command
    pub command_readback: String,
    /// `TPC`
    pub position: Option<i64>,
    /// `TPE`
    pub encoder_position: Option<i64>,
    /// Last successfully decoded `TAS`
    pub status: Option<AxisStatus>,
    /// Poll-error throttle for this axis
    pub throttle: ErrorThrottle,
    direction: Direction,
}

impl AxisState {
    /// Fresh axis with the configured overrides and nothing read yet.
    pub fn new(config: &AxisConfig, error_interval: Duration) -> Self {
        Self {
            index: config.index,
            axis_def: 0,
            drive_resolution: 0,
            encoder_resolution: 0,
            drive_enabled: false,
            has_encoder: true,
            soft_limit_enable: 0,
            hard_limit_enable: 0,
            high_limit: 0.0,
            low_limit: 0.0,
            precision: config.precision,
            encoder_ratio: config.encoder_ratio,
            commanded_target: None,
            staged: StagedMove::Unstaged,
            last_error: None,
            command_readback: String::new(),
            position: None,
            encoder_position: None,
            status: None,
            throttle: ErrorThrottle::new(error_interval),
            direction: Direction::Positive,
        }
    }

    /// Drive family from the cached `AXSDEF`.
    pub fn drive_type(&self) -> DriveType {
        DriveType::from_axis_def(self.axis_def)
    }

    /// Current scaling parameters.
    pub fn scaling(&self) -> Scaling {
        Scaling {
            axis_def: self.axis_def,
            drive_resolution: self.drive_resolution,
            encoder_resolution: self.encoder_resolution,
            precision: usize::try_from(self.precision).unwrap_or(0),
        }
    }

    /// Stage a deferred target.
    pub fn stage(&mut self, target: i64) {
        self.staged = StagedMove::Staged { target };
    }

    /// Staged target, if any.
    pub fn staged_target(&self) -> Option<i64> {
        match self.staged {
            StagedMove::Staged { target } => Some(target),
            StagedMove::Unstaged => None,
        }
    }

    /// Whether a deferred move is waiting.
    pub fn is_staged(&self) -> bool {
        self.staged_target().is_some()
    }

    /// Drop any staged target.
    pub fn unstage(&mut self) {
        self.staged = StagedMove::Unstaged;
    }

    /// A command failure is pending on this axis.
    pub fn has_command_error(&self) -> bool {
        self.last_error.is_some()
    }

    /// Record a new commanded position and return the inferred direction.
    ///
    /// An unchanged position keeps the previous direction.
    pub fn record_position(&mut self, position: i64) -> Direction {
        if let Some(previous) = self.position {
            if position > previous {
                self.direction = Direction::Positive;
            } else if position < previous {
                self.direction = Direction::Negative;
            }
        }
        self.position = Some(position);
        self.direction
    }

    /// Direction inferred at the last poll.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Limit-enable warnings for the startup report.
    pub fn limit_warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.soft_limit_enable != LIMITS_ENABLED {
            warnings.push("One or both soft limits are disabled");
        }
        if self.hard_limit_enable != LIMITS_ENABLED {
            warnings.push("One or both hard limits are disabled");
        }
        warnings
    }

    /// Multi-line description for reports.
    pub fn describe(&self) -> String {
        let mut text = format!(
            "Axis {}\n  AXSDEF: {}\n  {}\n  DRIVE: {}\n  DRES: {}\n  ERES: {}\n  LS: {}\n  LH: {}\n  LSPOS: {}\n  LSNEG: {}\n",
            self.index,
            self.axis_def,
            self.drive_type(),
            u8::from(self.drive_enabled),
            self.drive_resolution,
            self.encoder_resolution,
            self.soft_limit_enable,
            self.hard_limit_enable,
            self.high_limit,
            self.low_limit,
        );
        for warning in self.limit_warnings() {
            text.push_str("  WARNING: ");
            text.push_str(warning);
            text.push_str(".\n");
        }
        text
    }
}
