//! Status Decoder
//!
//! `TAS` (transfer axis status) and `TSS` (transfer system status) return
//! fixed-width strings where each character is one flag:
//!
//! ```text
//! *1TAS0000_0000_0000_0000_0000_0000_0000_0000
//!      ^^^^ ^^^^ ...     '1' = ON, '0' = OFF, '_' separators
//! ```
//!
//! Offsets are character positions, not TAS bit numbers (the separators
//! occupy offsets 4, 9, 14, ...). Both strings are decoded through the same
//! table-driven routine, [`extract`].

use crate::axis::DriveType;
use crate::error::{P6kError, Result};

/// Flag character for ON.
pub const ON: u8 = b'1';
/// Flag character for OFF.
pub const OFF: u8 = b'0';

// =============================================================================
// Field tables
// =============================================================================

/// Named TAS flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisField {
    /// Motion in progress
    Moving,
    /// Negative direction
    Direction,
    /// Accelerating
    Accelerating,
    /// At commanded velocity
    AtVelocity,
    /// Home successful
    Homed,
    /// Absolute positioning mode
    Absolute,
    /// Continuous positioning mode
    Continuous,
    /// Jog mode
    Jog,
    /// Joystick mode
    Joystick,
    /// Stall detected (steppers)
    Stall,
    /// Drive enabled
    DriveEnabled,
    /// Drive fault input active
    DriveFault,
    /// Positive hardware limit hit
    PosHardLimit,
    /// Negative hardware limit hit
    NegHardLimit,
    /// Positive software limit hit
    PosSoftLimit,
    /// Negative software limit hit
    NegSoftLimit,
    /// Position error exceeded (servos)
    PositionError,
    /// Within target zone
    TargetZone,
    /// Target zone timeout
    TargetTimeout,
    /// GO-when pending
    GoWhenPending,
    /// Move pending
    MovePending,
    /// Pre-emptive GO
    Preempt,
}

/// TAS character offsets.
pub static TAS_FIELDS: &[(AxisField, usize)] = &[
    (AxisField::Moving, 0),
    (AxisField::Direction, 1),
    (AxisField::Accelerating, 2),
    (AxisField::AtVelocity, 3),
    (AxisField::Homed, 5),
    (AxisField::Absolute, 6),
    (AxisField::Continuous, 7),
    (AxisField::Jog, 8),
    (AxisField::Joystick, 10),
    (AxisField::Stall, 13),
    (AxisField::DriveEnabled, 15),
    (AxisField::DriveFault, 16),
    (AxisField::PosHardLimit, 17),
    (AxisField::NegHardLimit, 18),
    (AxisField::PosSoftLimit, 20),
    (AxisField::NegSoftLimit, 21),
    (AxisField::PositionError, 27),
    (AxisField::TargetZone, 28),
    (AxisField::TargetTimeout, 30),
    (AxisField::GoWhenPending, 31),
    (AxisField::MovePending, 33),
    (AxisField::Preempt, 36),
];

/// Named TSS flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemField {
    /// Controller ready
    SystemReady,
    /// A program is executing
    ProgramRunning,
    /// Immediate mode (no program)
    Immediate,
    /// Command error occurred
    CommandError,
    /// Memory error
    MemoryError,
}

/// TSS character offsets.
pub static TSS_FIELDS: &[(SystemField, usize)] = &[
    (SystemField::SystemReady, 0),
    (SystemField::ProgramRunning, 2),
    (SystemField::Immediate, 3),
    (SystemField::CommandError, 12),
    (SystemField::MemoryError, 26),
];

/// Flags decoded through a field table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet<F> {
    values: Vec<(F, bool)>,
}

impl<F: Copy + PartialEq> FieldSet<F> {
    /// State of `field`; false for fields not in the table.
    pub fn get(&self, field: F) -> bool {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, on)| *on)
            .unwrap_or(false)
    }

    /// Fields that are ON, in table order.
    pub fn active(&self) -> impl Iterator<Item = F> + '_ {
        self.values.iter().filter(|(_, on)| *on).map(|(f, _)| *f)
    }
}

/// Decode every field of `table` from `status`.
///
/// Fails if the string is too short for the table or a flag position holds
/// anything other than `0`/`1`.
pub fn extract<F: Copy>(status: &str, table: &[(F, usize)]) -> Result<FieldSet<F>> {
    let bytes = status.as_bytes();
    let needed = table.iter().map(|(_, offset)| offset + 1).max().unwrap_or(0);
    if bytes.len() < needed {
        return Err(P6kError::Decode {
            reply: status.to_string(),
            reason: format!("status string has {} characters, need {}", bytes.len(), needed),
        });
    }

    let values = table
        .iter()
        .map(|&(field, offset)| match bytes[offset] {
            ON => Ok((field, true)),
            OFF => Ok((field, false)),
            other => Err(P6kError::Decode {
                reply: status.to_string(),
                reason: format!("unexpected '{}' at offset {}", other as char, offset),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FieldSet { values })
}

// =============================================================================
// Reply tokenizing
// =============================================================================

/// Split `<axis><MNEMONIC><value>` into the axis prefix and the value text.
///
/// Controller-wide replies (`TSS...`) have no axis prefix.
pub fn split_reply<'a>(payload: &'a str, mnemonic: &str) -> Result<(Option<u8>, &'a str)> {
    let payload = payload.trim();
    let digits = payload
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(payload.len());
    let (prefix, rest) = payload.split_at(digits);

    let value = rest.strip_prefix(mnemonic).ok_or_else(|| P6kError::Decode {
        reply: payload.to_string(),
        reason: format!("expected {} reply", mnemonic),
    })?;

    let axis = if prefix.is_empty() {
        None
    } else {
        Some(prefix.parse::<u8>().map_err(|e| P6kError::Decode {
            reply: payload.to_string(),
            reason: format!("bad axis prefix: {}", e),
        })?)
    };

    Ok((axis, value.trim()))
}

/// Value text of an axis reply, checking the axis prefix.
pub fn axis_value<'a>(payload: &'a str, axis: u8, mnemonic: &str) -> Result<&'a str> {
    match split_reply(payload, mnemonic)? {
        (Some(found), value) if found == axis => Ok(value),
        (found, _) => Err(P6kError::Decode {
            reply: payload.to_string(),
            reason: format!("reply for axis {:?}, expected axis {}", found, axis),
        }),
    }
}

/// Integer axis reply, e.g. `1DRES25000` -> 25000.
pub fn axis_int(payload: &str, axis: u8, mnemonic: &str) -> Result<i64> {
    let value = axis_value(payload, axis, mnemonic)?;
    value.parse::<i64>().map_err(|e| P6kError::Decode {
        reply: payload.to_string(),
        reason: format!("{} value '{}': {}", mnemonic, value, e),
    })
}

/// Real axis reply, e.g. `1LSPOS+1000.0` -> 1000.0.
pub fn axis_real(payload: &str, axis: u8, mnemonic: &str) -> Result<f64> {
    let value = axis_value(payload, axis, mnemonic)?;
    value.parse::<f64>().map_err(|e| P6kError::Decode {
        reply: payload.to_string(),
        reason: format!("{} value '{}': {}", mnemonic, value, e),
    })
}

// =============================================================================
// Axis status
// =============================================================================

/// One decoded TAS plus the states derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisStatus {
    /// The status string as received
    pub raw: String,
    /// Every TAS flag
    pub flags: FieldSet<AxisField>,
    /// Motion complete (see [`decode_axis`])
    pub done_moving: bool,
    /// Raw moving bit
    pub moving: bool,
    /// Raw direction bit
    pub direction: bool,
    /// Home complete
    pub homed: bool,
    /// Drive enabled
    pub power_on: bool,
    /// Positive hard or soft limit
    pub high_limit: bool,
    /// Negative hard or soft limit
    pub low_limit: bool,
    /// Position error (servo) or stall (stepper)
    pub following_error: bool,
    /// Anything worth surfacing as an axis problem
    pub problem: bool,
}

impl AxisStatus {
    /// Moving flag handed to the poller.
    pub fn moving_out(&self) -> bool {
        !self.done_moving
    }
}

/// Decode a TAS string.
///
/// - a staged deferred move is never done
/// - otherwise done is the inverse of the moving bit, and a servo is only done
///   once it is in the target zone without a target timeout
/// - following error comes from the position-error bit on servos and from the
///   stall bit on steppers
pub fn decode_axis(
    status: &str,
    drive_type: DriveType,
    staged: bool,
    command_error: bool,
) -> Result<AxisStatus> {
    let flags = extract(status, TAS_FIELDS)?;
    let on = |field| flags.get(field);

    let moving = on(AxisField::Moving);
    let mut done_moving = !staged && !moving;
    if done_moving && drive_type == DriveType::Servo {
        done_moving = on(AxisField::TargetZone) && !on(AxisField::TargetTimeout);
    }

    let following_error = match drive_type {
        DriveType::Servo => on(AxisField::PositionError),
        _ => on(AxisField::Stall),
    };

    let problem = on(AxisField::DriveFault)
        || on(AxisField::TargetTimeout)
        || following_error
        || command_error;

    Ok(AxisStatus {
        raw: status.to_string(),
        done_moving,
        moving,
        direction: on(AxisField::Direction),
        homed: on(AxisField::Homed),
        power_on: on(AxisField::DriveEnabled),
        high_limit: on(AxisField::PosHardLimit) || on(AxisField::PosSoftLimit),
        low_limit: on(AxisField::NegHardLimit) || on(AxisField::NegSoftLimit),
        following_error,
        problem,
        flags,
    })
}

// =============================================================================
// System status
// =============================================================================

/// Decoded TSS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemStatus {
    /// Controller ready
    pub system_ready: bool,
    /// Program executing
    pub program_running: bool,
    /// Immediate mode
    pub immediate: bool,
    /// Command error latched
    pub command_error: bool,
    /// Memory error latched
    pub memory_error: bool,
}

/// Decode a TSS string.
pub fn decode_system(status: &str) -> Result<SystemStatus> {
    let flags = extract(status, TSS_FIELDS)?;
    Ok(SystemStatus {
        system_ready: flags.get(SystemField::SystemReady),
        program_running: flags.get(SystemField::ProgramRunning),
        immediate: flags.get(SystemField::Immediate),
        command_error: flags.get(SystemField::CommandError),
        memory_error: flags.get(SystemField::MemoryError),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a TAS string with the listed offsets ON.
    pub(crate) fn tas_with(on: &[usize]) -> String {
        let mut chars: Vec<u8> = b"0000_0000_0000_0000_0000_0000_0000_0000".to_vec();
        for &offset in on {
            chars[offset] = ON;
        }
        String::from_utf8_lossy(&chars).into_owned()
    }

    #[test]
    fn test_table_offsets_skip_separators() {
        let template = tas_with(&[]);
        for &(field, offset) in TAS_FIELDS {
            assert_ne!(template.as_bytes()[offset], b'_', "{:?}", field);
        }
    }

    #[test]
    fn test_extract_reads_each_offset() -> Result<()> {
        for &(field, offset) in TAS_FIELDS {
            let flags = extract(&tas_with(&[offset]), TAS_FIELDS)?;
            assert!(flags.get(field), "{:?}", field);
            assert_eq!(flags.active().count(), 1);
        }
        Ok(())
    }

    #[test]
    fn test_short_or_garbled_status_rejected() {
        assert!(matches!(
            extract("0000_0000", TAS_FIELDS),
            Err(P6kError::Decode { .. })
        ));
        let garbled = tas_with(&[]).replacen('0', "x", 1);
        assert!(matches!(
            extract(&garbled, TAS_FIELDS),
            Err(P6kError::Decode { .. })
        ));
    }

    #[test]
    fn test_staged_move_never_done() -> Result<()> {
        let status = decode_axis(&tas_with(&[28]), DriveType::Stepper, true, false)?;
        assert!(!status.moving);
        assert!(!status.done_moving);
        assert!(status.moving_out());
        Ok(())
    }

    #[test]
    fn test_unknown_drive_decodes_like_stepper() -> Result<()> {
        let unknown = DriveType::Unknown(2);
        let stalled = decode_axis(&tas_with(&[13]), unknown, false, false)?;
        assert!(stalled.following_error);
        assert!(stalled.problem);

        let pos_error = decode_axis(&tas_with(&[27]), unknown, false, false)?;
        assert!(!pos_error.following_error);
        // No target-zone refinement either.
        assert!(pos_error.done_moving);
        Ok(())
    }

    #[test]
    fn test_servo_refinement() -> Result<()> {
        let settled = decode_axis(&tas_with(&[28]), DriveType::Servo, false, false)?;
        assert!(settled.done_moving);

        let timed_out = decode_axis(&tas_with(&[28, 30]), DriveType::Servo, false, false)?;
        assert!(!timed_out.done_moving);
        assert!(timed_out.problem);

        let settling = decode_axis(&tas_with(&[]), DriveType::Servo, false, false)?;
        assert!(!settling.done_moving);

        // Steppers ignore the target zone.
        let stepper = decode_axis(&tas_with(&[]), DriveType::Stepper, false, false)?;
        assert!(stepper.done_moving);
        Ok(())
    }

    #[test]
    fn test_moving_bit() -> Result<()> {
        let status = decode_axis(&tas_with(&[0, 28]), DriveType::Servo, false, false)?;
        assert!(status.moving);
        assert!(!status.done_moving);
        Ok(())
    }

    #[test]
    fn test_following_error_source_depends_on_drive() -> Result<()> {
        let stall = tas_with(&[13]);
        let pos_error = tas_with(&[27]);

        assert!(decode_axis(&stall, DriveType::Stepper, false, false)?.following_error);
        assert!(!decode_axis(&stall, DriveType::Servo, false, false)?.following_error);
        assert!(decode_axis(&pos_error, DriveType::Servo, false, false)?.following_error);
        assert!(!decode_axis(&pos_error, DriveType::Stepper, false, false)?.following_error);
        Ok(())
    }

    #[test]
    fn test_problem_sources() -> Result<()> {
        let clean = tas_with(&[]);
        assert!(!decode_axis(&clean, DriveType::Stepper, false, false)?.problem);
        assert!(decode_axis(&clean, DriveType::Stepper, false, true)?.problem);
        assert!(decode_axis(&tas_with(&[16]), DriveType::Stepper, false, false)?.problem);
        assert!(decode_axis(&tas_with(&[30]), DriveType::Stepper, false, false)?.problem);
        Ok(())
    }

    #[test]
    fn test_limits_combine_hard_and_soft() -> Result<()> {
        for (offset, high) in [(17, true), (20, true), (18, false), (21, false)] {
            let status = decode_axis(&tas_with(&[offset]), DriveType::Stepper, false, false)?;
            assert_eq!(status.high_limit, high, "offset {}", offset);
            assert_eq!(status.low_limit, !high, "offset {}", offset);
        }
        Ok(())
    }

    #[test]
    fn test_decode_is_idempotent() -> Result<()> {
        let text = tas_with(&[1, 5, 15, 28]);
        for drive in [DriveType::Stepper, DriveType::Servo] {
            assert_eq!(
                decode_axis(&text, drive, false, false)?,
                decode_axis(&text, drive, false, false)?
            );
        }
        Ok(())
    }

    #[test]
    fn test_power_and_homed() -> Result<()> {
        let status = decode_axis(&tas_with(&[5, 15]), DriveType::Stepper, false, false)?;
        assert!(status.homed);
        assert!(status.power_on);
        Ok(())
    }

    #[test]
    fn test_split_reply() -> Result<()> {
        assert_eq!(split_reply("1TPC+1000", "TPC")?, (Some(1), "+1000"));
        assert_eq!(split_reply("TSS1000", "TSS")?, (None, "1000"));
        assert_eq!(split_reply(" 12DRES25000 ", "DRES")?, (Some(12), "25000"));
        assert!(split_reply("1TPE5", "TPC").is_err());
        Ok(())
    }

    #[test]
    fn test_typed_axis_values() -> Result<()> {
        assert_eq!(axis_int("1TPC+1000", 1, "TPC")?, 1000);
        assert_eq!(axis_int("2TPE-42", 2, "TPE")?, -42);
        assert_eq!(axis_real("1LSPOS+1000.5", 1, "LSPOS")?, 1000.5);
        assert!(matches!(
            axis_int("2TPC5", 1, "TPC"),
            Err(P6kError::Decode { .. })
        ));
        assert!(axis_int("1TPCabc", 1, "TPC").is_err());
        Ok(())
    }

    #[test]
    fn test_decode_system() -> Result<()> {
        let mut chars = b"0000_0000_0000_0000_0000_0000_0000_0000".to_vec();
        for offset in [0, 3, 26] {
            chars[offset] = ON;
        }
        let text = String::from_utf8_lossy(&chars).into_owned();

        let status = decode_system(&text)?;

        assert!(status.system_ready);
        assert!(!status.program_running);
        assert!(status.immediate);
        assert!(!status.command_error);
        assert!(status.memory_error);
        Ok(())
    }
}
