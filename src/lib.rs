//! Battery power-path manager control core.
//!
//! Selects among USB-PD 60 W, USB-PD 100 W, solar (MPPT) and battery
//! discharge, runs the charge-current profile and cell balancing, and
//! latches into a safe `Fault` state on any protection trip.  Every
//! peripheral is reached through the port traits in [`app::ports`]; the
//! crate itself never touches a register.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fsm;
pub mod safety;
pub mod scheduler;
pub mod sensors;

pub use app::service::PowerPathController;
pub use error::{Error, Result};
pub use events::{Event, EventQueue};
pub use fsm::StateId;
