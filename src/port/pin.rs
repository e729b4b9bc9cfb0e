//! embedded-hal pin handle over a shared port.

use core::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};

use super::{DigitalPort, Level, PinId};

/// A single pin on a shared [`DigitalPort`].
///
/// Cheap to clone; clones address the same physical pin. Implements the
/// embedded-hal 1.0 digital traits so the motor and input drivers stay
/// generic over real pins and test mocks.
#[derive(Clone)]
pub struct PortPin {
    port: Arc<dyn DigitalPort>,
    pin: PinId,
}

impl PortPin {
    /// Create a handle for `pin` on `port`. Does not configure the pin.
    pub fn new(port: Arc<dyn DigitalPort>, pin: PinId) -> Self {
        Self { port, pin }
    }

    /// Pin number.
    #[inline]
    pub fn id(&self) -> PinId {
        self.pin
    }

    /// Drive the pin low.
    #[inline]
    pub fn write_low(&self) {
        self.port.write(self.pin, Level::Low);
    }

    /// Current level as read from the port.
    #[inline]
    pub fn level(&self) -> Level {
        self.port.read(self.pin)
    }
}

impl fmt::Debug for PortPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortPin").field("pin", &self.pin).finish()
    }
}

impl ErrorType for PortPin {
    type Error = Infallible;
}

impl OutputPin for PortPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.port.write(self.pin, Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.port.write(self.pin, Level::High);
        Ok(())
    }
}

impl StatefulOutputPin for PortPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level().is_high())
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level().is_high())
    }
}

impl InputPin for PortPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level().is_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level().is_high())
    }
}
