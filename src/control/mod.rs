//! Periodic control loops.
//!
//! Both run from scheduler due flags, independent of the event path:
//! [`charge_profile`] picks the charger current from the battery voltage
//! and [`balancing`] drives the cell bleed resistors with hysteresis.

pub mod balancing;
pub mod charge_profile;
