//! Raspberry Pi backends (feature `rpi`).
//!
//! GPIO through rppal's register-mapped pins and an MCP3008 ADC on SPI0
//! for the joystick.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rppal::gpio::{self, Gpio, IoPin, Mode, PullUpDown};
use rppal::spi::{self, Bus, SlaveSelect, Spi};

use super::{Clock, DigitalPort, Level, PinId, PinMode, Pull};
use crate::input::AnalogInput;

struct PinSlot {
    pin: IoPin,
    last: Level,
}

/// rppal-backed GPIO port.
pub struct RppalPort {
    gpio: Gpio,
    pins: Mutex<HashMap<PinId, PinSlot>>,
    origin: Instant,
}

impl RppalPort {
    /// Open the GPIO peripheral.
    pub fn new() -> gpio::Result<Self> {
        Ok(Self {
            gpio: Gpio::new()?,
            pins: Mutex::new(HashMap::new()),
            origin: Instant::now(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PinId, PinSlot>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_pin<R>(&self, pin: PinId, f: impl FnOnce(&mut PinSlot) -> R) -> Option<R> {
        let mut pins = self.lock();
        if !pins.contains_key(&pin) {
            match self.gpio.get(pin) {
                Ok(p) => {
                    pins.insert(
                        pin,
                        PinSlot {
                            pin: p.into_io(Mode::Input),
                            last: Level::Low,
                        },
                    );
                }
                Err(e) => {
                    log::error!("GPIO {} unavailable: {}", pin, e);
                    return None;
                }
            }
        }
        pins.get_mut(&pin).map(f)
    }
}

impl Clock for RppalPort {
    fn ticks_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

impl DigitalPort for RppalPort {
    fn set_mode(&self, pin: PinId, mode: PinMode) {
        self.with_pin(pin, |slot| {
            slot.pin.set_mode(match mode {
                PinMode::Input => Mode::Input,
                PinMode::Output => Mode::Output,
            })
        });
    }

    fn set_pull(&self, pin: PinId, pull: Pull) {
        self.with_pin(pin, |slot| {
            slot.pin.set_pullupdown(match pull {
                Pull::Off => PullUpDown::Off,
                Pull::Up => PullUpDown::PullUp,
                Pull::Down => PullUpDown::PullDown,
            })
        });
    }

    fn read(&self, pin: PinId) -> Level {
        self.with_pin(pin, |slot| {
            slot.last = match slot.pin.read() {
                gpio::Level::High => Level::High,
                gpio::Level::Low => Level::Low,
            };
            slot.last
        })
        .unwrap_or(Level::Low)
    }

    fn write(&self, pin: PinId, level: Level) {
        self.with_pin(pin, |slot| {
            slot.pin.write(match level {
                Level::High => gpio::Level::High,
                Level::Low => gpio::Level::Low,
            });
            slot.last = level;
        });
    }
}

/// One channel of an MCP3008 10-bit ADC on SPI0/CE0.
pub struct Mcp3008 {
    spi: Mutex<Spi>,
    channel: u8,
    last: Mutex<u16>,
}

impl Mcp3008 {
    /// Open SPI0 at 1.35 MHz for `channel` (0-7).
    pub fn new(channel: u8) -> spi::Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_350_000, spi::Mode::Mode0)?;
        Ok(Self {
            spi: Mutex::new(spi),
            channel: channel & 0x07,
            last: Mutex::new(512),
        })
    }
}

impl AnalogInput for Mcp3008 {
    fn read_raw(&self) -> u16 {
        let write = [0x01, (0x08 | self.channel) << 4, 0x00];
        let mut read = [0u8; 3];
        let spi = self.spi.lock().unwrap_or_else(PoisonError::into_inner);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match spi.transfer(&mut read, &write) {
            Ok(_) => {
                *last = (u16::from(read[1] & 0x03) << 8) | u16::from(read[2]);
            }
            Err(e) => log::warn!("MCP3008 read failed, keeping {}: {}", *last, e),
        }
        *last
    }
}
