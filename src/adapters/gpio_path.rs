//! Power-path switch driven by four enable GPIOs.
//!
//! One active-high enable per source: USB-PD 60 W, USB-PD 100 W, MPPT and
//! the battery output switch.  Switching is break-before-make: every
//! enable other than the target is driven low first, and the target is
//! only driven high once all of them acknowledged.

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::PowerPath;
use crate::error::ActuatorError;

/// The four enable lines behind [`PowerPath`].
pub struct GpioPowerPath<P> {
    usb_60w: P,
    usb_100w: P,
    mppt: P,
    battery: P,
    current: PowerPath,
}

impl<P: OutputPin> GpioPowerPath<P> {
    /// Take ownership of the pins and drive them all low.
    pub fn new(usb_60w: P, usb_100w: P, mppt: P, battery: P) -> Result<Self, ActuatorError> {
        let mut path = Self {
            usb_60w,
            usb_100w,
            mppt,
            battery,
            current: PowerPath::Off,
        };
        path.select(PowerPath::Off)?;
        Ok(path)
    }

    /// Switch to `path`, break-before-make.
    ///
    /// If any other enable fails to drop, the target is left low and the
    /// error is returned. Any failure leaves [`current`](Self::current) at
    /// `Off`.
    pub fn select(&mut self, path: PowerPath) -> Result<(), ActuatorError> {
        let mut first_error = None;
        for (line, pin) in self.lines() {
            if line == path {
                continue;
            }
            if let Err(e) = pin.set_low() {
                warn!("Power path: {line:?} enable stuck: {e:?}");
                first_error.get_or_insert(ActuatorError::Transport);
            }
        }
        if let Some(e) = first_error {
            self.current = PowerPath::Off;
            return Err(e);
        }

        if let Some(pin) = self.pin(path) {
            if let Err(e) = pin.set_high() {
                warn!("Power path: {path:?} enable failed: {e:?}");
                self.current = PowerPath::Off;
                return Err(ActuatorError::Transport);
            }
        }
        debug!("Power path: {:?} -> {path:?}", self.current);
        self.current = path;
        Ok(())
    }

    /// Path last switched in successfully.
    pub fn current(&self) -> PowerPath {
        self.current
    }

    /// Hand the pins back.
    pub fn release(self) -> (P, P, P, P) {
        (self.usb_60w, self.usb_100w, self.mppt, self.battery)
    }

    fn pin(&mut self, path: PowerPath) -> Option<&mut P> {
        match path {
            PowerPath::Off => None,
            PowerPath::Usb60W => Some(&mut self.usb_60w),
            PowerPath::Usb100W => Some(&mut self.usb_100w),
            PowerPath::Mppt => Some(&mut self.mppt),
            PowerPath::Battery => Some(&mut self.battery),
        }
    }

    fn lines(&mut self) -> [(PowerPath, &mut P); 4] {
        [
            (PowerPath::Usb60W, &mut self.usb_60w),
            (PowerPath::Usb100W, &mut self.usb_100w),
            (PowerPath::Mppt, &mut self.mppt),
            (PowerPath::Battery, &mut self.battery),
        ]
    }
}
