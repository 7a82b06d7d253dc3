//! Deferred-Move Coordinator
//!
//! While armed, moves stage their target on the axis instead of sending
//! `D` + `GO`. Firing sends each staged `D` and then one synchronized
//! `GO<mask>` so every participating axis starts on the same cycle.
//!
//! If any staged `D` fails the `GO` is not sent. Either way every staged slot
//! and the armed state are cleared.

use std::collections::BTreeMap;

use crate::axis::AxisState;
use crate::channel::Channel;
use crate::command::{self, StepTracker};
use crate::error::Result;

/// Controller-wide deferral state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeferredState {
    /// Moves start immediately
    #[default]
    Idle,
    /// Moves are staged until fired
    Armed,
}

/// Result of a fire request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// Not armed: nothing sent, nothing cleared
    NotArmed,
    /// Armed but no axis had staged a move
    NothingStaged,
    /// Synchronized start sent for these axes
    Started(Vec<u8>),
}

/// Arm/fire state machine.
#[derive(Debug, Default)]
pub struct DeferredMoves {
    state: DeferredState,
}

impl DeferredMoves {
    /// Idle coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> DeferredState {
        self.state
    }

    /// Whether moves are being staged.
    pub fn is_armed(&self) -> bool {
        self.state == DeferredState::Armed
    }

    /// Start staging moves. Returns false if already armed (nothing changes).
    pub fn arm(&mut self) -> bool {
        if self.is_armed() {
            return false;
        }
        self.state = DeferredState::Armed;
        true
    }

    /// Send staged targets and the synchronized start, then disarm.
    ///
    /// Staging commands are all attempted. The `GO` mask is only sent when
    /// every one of them succeeded, and commanded targets are only recorded
    /// once it was accepted. On failure the `Command` error names the first
    /// failed step.
    pub fn fire(
        &mut self,
        channel: &mut Channel,
        axes: &mut BTreeMap<u8, AxisState>,
    ) -> Result<FireOutcome> {
        if !self.is_armed() {
            return Ok(FireOutcome::NotArmed);
        }

        let mut tracker = StepTracker::new("deferred_move", 0);
        let mut staged = Vec::new();

        for (&index, axis) in axes.iter() {
            if index == 0 {
                continue;
            }
            if let Some(target) = axis.staged_target() {
                tracker.send(channel, &command::distance(index, target));
                staged.push((index, target));
            }
        }
        let participants: Vec<u8> = staged.iter().map(|(index, _)| *index).collect();

        let outcome = if !tracker.all_ok() {
            tracing::error!(
                axes = ?participants,
                "Deferred move positions failed, synchronized start not sent"
            );
            None
        } else if participants.is_empty() {
            Some(FireOutcome::NothingStaged)
        } else {
            let go = command::go_mask(participants.iter().copied());
            if tracker.send(channel, &go).is_some() {
                for (index, target) in staged {
                    if let Some(axis) = axes.get_mut(&index) {
                        axis.commanded_target = Some(target);
                    }
                }
            }
            Some(FireOutcome::Started(participants))
        };

        for axis in axes.values_mut() {
            axis.unstage();
        }
        self.state = DeferredState::Idle;

        tracker.finish()?;
        Ok(outcome.unwrap_or(FireOutcome::NothingStaged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisConfig;
    use crate::error::P6kError;
    use crate::mock::MockTransport;
    use std::time::Duration;

    fn axes(count: u8) -> BTreeMap<u8, AxisState> {
        (1..=count)
            .map(|index| {
                let config = AxisConfig {
                    index,
                    ..AxisConfig::default()
                };
                (index, AxisState::new(&config, Duration::from_secs(1)))
            })
            .collect()
    }

    fn stage(axes: &mut BTreeMap<u8, AxisState>, index: u8, target: i64) {
        if let Some(axis) = axes.get_mut(&index) {
            axis.stage(target);
        }
    }

    fn channel(mock: &MockTransport) -> Channel {
        Channel::new(Box::new(mock.clone()), Duration::from_millis(200))
    }

    #[test]
    fn test_arm_is_idempotent() {
        let mut deferred = DeferredMoves::new();
        assert!(deferred.arm());
        assert!(!deferred.arm());
        assert_eq!(deferred.state(), DeferredState::Armed);
    }

    #[test]
    fn test_fire_without_arm_is_noop() -> Result<()> {
        let mock = MockTransport::new();
        let mut channel = channel(&mock);
        let mut axes = axes(4);
        stage(&mut axes, 2, 100);

        let outcome = DeferredMoves::new().fire(&mut channel, &mut axes)?;

        assert_eq!(outcome, FireOutcome::NotArmed);
        assert!(mock.calls().is_empty());
        // Nothing cleared either.
        assert_eq!(axes[&2].staged_target(), Some(100));
        Ok(())
    }

    #[test]
    fn test_fire_sends_targets_then_mask() -> Result<()> {
        let mock = MockTransport::new();
        let mut channel = channel(&mock);
        let mut axes = axes(8);
        stage(&mut axes, 2, 1000);
        stage(&mut axes, 4, -250);

        let mut deferred = DeferredMoves::new();
        deferred.arm();
        let outcome = deferred.fire(&mut channel, &mut axes)?;

        assert_eq!(outcome, FireOutcome::Started(vec![2, 4]));
        assert_eq!(mock.calls(), vec!["2D1000", "4D-250", "GO01010000"]);
        assert!(axes.values().all(|a| !a.is_staged()));
        assert_eq!(axes[&4].commanded_target, Some(-250));
        assert!(!deferred.is_armed());
        Ok(())
    }

    #[test]
    fn test_failed_staging_aborts_start() {
        let mock = MockTransport::new();
        mock.error_reply("4D-250", "INVALID DISTANCE");
        let mut channel = channel(&mock);
        let mut axes = axes(4);
        stage(&mut axes, 2, 1000);
        stage(&mut axes, 4, -250);
        let mut deferred = DeferredMoves::new();
        deferred.arm();

        let result = deferred.fire(&mut channel, &mut axes);

        assert!(matches!(result, Err(P6kError::Command { .. })));
        assert_eq!(mock.calls(), vec!["2D1000", "4D-250"]);
        assert!(axes.values().all(|a| !a.is_staged()));
        // Axis 2 took its distance but never started.
        assert_eq!(axes[&2].commanded_target, None);
        assert_eq!(axes[&4].commanded_target, None);
        assert!(!deferred.is_armed());
    }

    #[test]
    fn test_armed_with_nothing_staged() -> Result<()> {
        let mock = MockTransport::new();
        let mut channel = channel(&mock);
        let mut axes = axes(2);
        let mut deferred = DeferredMoves::new();
        deferred.arm();

        assert_eq!(
            deferred.fire(&mut channel, &mut axes)?,
            FireOutcome::NothingStaged
        );
        assert!(mock.calls().is_empty());
        assert!(!deferred.is_armed());
        Ok(())
    }

    #[test]
    fn test_failed_go_is_command_error() {
        let mock = MockTransport::new();
        mock.error_reply("GO10000000", "AXIS NOT READY");
        let mut channel = channel(&mock);
        let mut axes = axes(1);
        stage(&mut axes, 1, 5);
        let mut deferred = DeferredMoves::new();
        deferred.arm();

        let result = deferred.fire(&mut channel, &mut axes);

        assert!(matches!(result, Err(P6kError::Command { .. })));
        assert_eq!(axes[&1].commanded_target, None);
        assert!(!deferred.is_armed());
    }
}
