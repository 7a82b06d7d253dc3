//! Parker Compumotor 6K motion controller driver.
//!
//! This crate speaks the 6K's half-duplex ASCII protocol over RS-232 or
//! Ethernet and exposes each axis through the [`MotionAxis`] capability:
//! - transaction channel with prompt/terminator framing and a bounded wait
//! - command formatting with resolution scaling and independent step tracking
//! - TAS/TSS status decoding into done/moving/limit/problem flags
//! - deferred (synchronized) multi-axis moves
//! - background polling with moving/idle periods and throttled error reports
//!
//! # Usage
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! daq-driver-parker6k = { path = "../daq-driver-parker6k" }
//! ```
//!
//! Connect and move:
//!
//! ```rust,ignore
//! use daq_driver_parker6k::{ControllerConfig, MotionAxis, ParamStore, Parker6k};
//!
//! let config = ControllerConfig::load_from("config/parker6k.example.toml")?;
//! let driver = Parker6k::connect(config, Box::new(ParamStore::new()))?;
//! driver.axis(1)?.move_abs(4000.0)?;
//! ```

pub mod axis;
pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod deferred;
pub mod driver;
pub mod error;
pub mod mock;
pub mod params;
pub mod poller;
pub mod response;
pub mod status;
pub mod throttle;
pub mod transport;

pub use axis::{AxisState, DriveType};
pub use channel::{Channel, CommsStatus};
pub use command::MoveRequest;
pub use config::{AxisConfig, ControllerConfig, TransportConfig};
pub use controller::Controller;
pub use deferred::{DeferredState, FireOutcome};
pub use driver::{AxisHandle, MotionAxis, Parker6k};
pub use error::{P6kError, Result};
pub use params::{Param, ParamSink, ParamStore, ParamValue};
pub use status::{AxisStatus, SystemStatus};
pub use transport::{DynTransport, Transport};
