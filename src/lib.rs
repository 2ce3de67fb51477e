//! CrashGuard rider-safety core.
//!
//! Watches accelerometer magnitude while paired with the bike unit, gives the
//! rider a confirmation window after an impact spike, then texts the last known
//! position to up to two emergency contacts.
//!
//! Platform services (radio, location, SMS, on-screen notices) sit behind the
//! traits in [`pairing`], [`location`], [`alert`] and [`controller`], so the
//! same core drives the Android app through JNI and the desktop simulator.

pub mod alert;
pub mod config;
pub mod contacts;
pub mod controller;
pub mod error;
pub mod location;
pub mod monitor;
pub mod pairing;
pub mod sensors;
pub mod service;
pub mod sim;
pub mod status;
pub mod timer;

pub use alert::{AlertDispatcher, AlertMessage, AlertOutcome, DispatchReport, MessageTransport};
pub use config::CrashGuardConfig;
pub use contacts::ContactConfiguration;
pub use controller::{Controller, Notice, NoticeSink, Phase, Platform, Snapshot};
pub use error::{ConfigError, ControlError, PairingError, TransportError};
pub use location::{Coordinates, LocationProvider};
pub use monitor::{Breach, MotionMonitor};
pub use pairing::{PairingSession, PeerInfo, RadioAdapter, RadioChannel, SessionState};
pub use sensors::MotionSample;
pub use service::{Command, Input, ServiceHandle};
pub use timer::ConfirmationTimer;
