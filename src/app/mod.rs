//! Application core: orchestration, zero I/O.
//!
//! Ties the state machine, telemetry sampler, safety supervisor and the two
//! control loops together behind [`service::PowerPathController`].  All
//! interaction with hardware happens through the port traits defined in
//! [`ports`], keeping this layer testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
