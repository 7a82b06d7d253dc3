//! Parameter cache and callback boundary.
//!
//! The controller publishes everything it caches (scaling, limits, decoded
//! status, positions, error strings) through a [`ParamSink`], keyed by
//! address (0 = controller, 1..=8 = axis) and [`Param`]. After each top-level
//! operation it calls [`ParamSink::call_callbacks`] for the addresses it
//! touched, so observers see one consistent update per operation.
//!
//! [`ParamStore`] is the in-memory sink used by the console and the tests.
//!
//! ```
//! use daq_driver_parker6k::params::{Param, ParamSink, ParamStore, ParamValue};
//!
//! let store = ParamStore::new();
//! let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
//! let log = seen.clone();
//! store.subscribe(move |address, param, value| {
//!     log.lock().push((address, param, value.clone()));
//! });
//!
//! let mut sink = store.clone();
//! sink.set_int(1, Param::DriveResolution, 25000);
//! sink.call_callbacks(1);
//!
//! assert_eq!(store.get_int(1, Param::DriveResolution), Some(25000));
//! assert_eq!(seen.lock().len(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

/// Published parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    // Controller (address 0)
    /// Link state, 0 = OK, 1 = ERROR
    CommsError,
    /// Raw controller command
    Command,
    /// Reply to the raw controller command
    CommandReadback,
    /// Last controller-level error text
    ControllerError,
    /// TSS system ready
    SystemReady,
    /// TSS program running
    ProgramRunning,
    /// TSS immediate mode
    Immediate,
    /// TSS command error
    CommandErrorFlag,
    /// TSS memory error
    MemoryError,
    /// Deferred moves armed
    DeferMoves,

    // Axis scaling and setup
    /// DRES
    DriveResolution,
    /// ERES
    EncoderResolution,
    /// DRIVE
    Drive,
    /// AXSDEF
    AxisDefinition,
    /// Decimal places for velocity/acceleration
    MaxDigits,
    /// Encoder counts per step
    EncoderRatio,
    /// LS
    SoftLimitEnable,
    /// LH
    HardLimitEnable,
    /// LSPOS
    HighLimit,
    /// LSNEG
    LowLimit,
    /// Raw axis command
    AxisCommand,
    /// Reply to the raw axis command
    AxisCommandReadback,
    /// Last axis error text
    AxisError,

    // Axis readbacks
    /// TPC
    Position,
    /// TPE
    EncoderPosition,
    /// Motion complete
    StatusDone,
    /// Raw moving bit
    StatusMoving,
    /// Inferred travel direction (1 = positive)
    StatusDirection,
    /// Positive limit (hard or soft)
    StatusHighLimit,
    /// Negative limit (hard or soft)
    StatusLowLimit,
    /// Homed
    StatusHomed,
    /// Drive enabled
    StatusPowerOn,
    /// Following error
    StatusFollowingError,
    /// Problem summary
    StatusProblem,
    /// Encoder present
    StatusHasEncoder,
    /// Per-axis comms flag
    StatusCommsError,
}

/// A published value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Integer
    Int(i64),
    /// Real
    Float(f64),
    /// Text
    Str(String),
}

/// Where the controller publishes its state.
pub trait ParamSink: Send {
    /// Publish an integer.
    fn set_int(&mut self, address: u8, param: Param, value: i64);

    /// Publish a real.
    fn set_float(&mut self, address: u8, param: Param, value: f64);

    /// Publish a string.
    fn set_string(&mut self, address: u8, param: Param, value: &str);

    /// Notify observers of everything changed on `address` since the last call.
    fn call_callbacks(&mut self, address: u8);

    /// Publish a flag as 0/1.
    fn set_flag(&mut self, address: u8, param: Param, value: bool) {
        self.set_int(address, param, i64::from(value));
    }
}

type Listener = Arc<dyn Fn(u8, Param, &ParamValue) + Send + Sync>;

#[derive(Default)]
struct StoreInner {
    values: BTreeMap<(u8, Param), ParamValue>,
    dirty: BTreeSet<(u8, Param)>,
    listeners: Vec<Listener>,
}

/// Shared in-memory parameter cache. Clones share the same cache.
#[derive(Clone, Default)]
pub struct ParamStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ParamStore {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer called for every changed value on `call_callbacks`.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(u8, Param, &ParamValue) + Send + Sync + 'static,
    {
        self.inner.lock().listeners.push(Arc::new(listener));
    }

    /// Current value.
    pub fn get(&self, address: u8, param: Param) -> Option<ParamValue> {
        self.inner.lock().values.get(&(address, param)).cloned()
    }

    /// Current integer value.
    pub fn get_int(&self, address: u8, param: Param) -> Option<i64> {
        match self.get(address, param) {
            Some(ParamValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    /// Current real value.
    pub fn get_float(&self, address: u8, param: Param) -> Option<f64> {
        match self.get(address, param) {
            Some(ParamValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    /// Current string value.
    pub fn get_string(&self, address: u8, param: Param) -> Option<String> {
        match self.get(address, param) {
            Some(ParamValue::Str(v)) => Some(v),
            _ => None,
        }
    }

    /// Current flag value.
    pub fn get_flag(&self, address: u8, param: Param) -> Option<bool> {
        self.get_int(address, param).map(|v| v != 0)
    }

    fn store(&self, address: u8, param: Param, value: ParamValue) {
        let mut inner = self.inner.lock();
        let key = (address, param);
        if inner.values.get(&key) != Some(&value) {
            inner.values.insert(key, value);
            inner.dirty.insert(key);
        }
    }
}

impl ParamSink for ParamStore {
    fn set_int(&mut self, address: u8, param: Param, value: i64) {
        self.store(address, param, ParamValue::Int(value));
    }

    fn set_float(&mut self, address: u8, param: Param, value: f64) {
        self.store(address, param, ParamValue::Float(value));
    }

    fn set_string(&mut self, address: u8, param: Param, value: &str) {
        self.store(address, param, ParamValue::Str(value.to_string()));
    }

    fn call_callbacks(&mut self, address: u8) {
        // Listeners run outside the lock so they may read the store.
        let (changed, listeners) = {
            let mut inner = self.inner.lock();
            let keys: Vec<_> = inner
                .dirty
                .iter()
                .filter(|(a, _)| *a == address)
                .copied()
                .collect();
            let mut changed = Vec::with_capacity(keys.len());
            for key in keys {
                inner.dirty.remove(&key);
                if let Some(value) = inner.values.get(&key) {
                    changed.push((key.1, value.clone()));
                }
            }
            (changed, inner.listeners.clone())
        };

        for (param, value) in &changed {
            for listener in &listeners {
                listener(address, *param, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_store() -> (ParamStore, Arc<Mutex<Vec<(u8, Param, ParamValue)>>>) {
        let store = ParamStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        store.subscribe(move |address, param, value| {
            log.lock().push((address, param, value.clone()));
        });
        (store, seen)
    }

    #[test]
    fn test_typed_getters() {
        let mut store = ParamStore::new();
        store.set_int(1, Param::DriveResolution, 25000);
        store.set_float(1, Param::EncoderRatio, 2.5);
        store.set_string(0, Param::ControllerError, "ERROR");
        store.set_flag(2, Param::StatusDone, true);

        assert_eq!(store.get_int(1, Param::DriveResolution), Some(25000));
        assert_eq!(store.get_float(1, Param::EncoderRatio), Some(2.5));
        assert_eq!(
            store.get_string(0, Param::ControllerError).as_deref(),
            Some("ERROR")
        );
        assert_eq!(store.get_flag(2, Param::StatusDone), Some(true));
        // Wrong type or address reads as absent.
        assert_eq!(store.get_float(1, Param::DriveResolution), None);
        assert_eq!(store.get_int(2, Param::DriveResolution), None);
    }

    #[test]
    fn test_callbacks_only_for_changed_values_on_address() {
        let (mut store, seen) = recording_store();

        store.set_int(1, Param::Position, 10);
        store.set_int(2, Param::Position, 20);
        store.call_callbacks(1);

        assert_eq!(seen.lock().clone(), vec![(1, Param::Position, ParamValue::Int(10))]);

        // Same value again is not a change.
        store.set_int(1, Param::Position, 10);
        store.call_callbacks(1);
        assert_eq!(seen.lock().len(), 1);

        store.call_callbacks(2);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_listener_can_read_store() {
        let store = ParamStore::new();
        let reader = store.clone();
        let observed = Arc::new(Mutex::new(None));
        let slot = observed.clone();
        store.subscribe(move |address, param, _| {
            *slot.lock() = reader.get_int(address, param);
        });

        let mut sink = store.clone();
        sink.set_int(0, Param::CommsError, 1);
        sink.call_callbacks(0);

        assert_eq!(*observed.lock(), Some(1));
    }
}
