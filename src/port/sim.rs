//! In-memory GPIO simulator.
//!
//! Keeps a pin table (mode, pull, value) behind a mutex, counts rising
//! edges written to each pin, and can drive the limit switches of a
//! simulated linear axis from the step/direction outputs so homing and
//! travel limits behave without hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::{Clock, ClockDelay, DigitalPort, Level, PinId, PinMode, Pull};

#[derive(Debug, Default, Clone, Copy)]
struct SimPin {
    mode: Option<PinMode>,
    pull: Pull,
    value: Option<Level>,
    rising_edges: u64,
}

impl SimPin {
    fn level(&self) -> Level {
        match self.value {
            Some(level) => level,
            None if self.pull == Pull::Up => Level::High,
            None => Level::Low,
        }
    }
}

/// Linear axis driven by a step/direction pair.
///
/// Every rising edge on `step` moves the carriage one step, toward home
/// when `dir` reads `toward_home`. The home switch is held active while
/// the carriage is within `home_travel` steps of zero; the final switch
/// while it is at or beyond `length`.
#[derive(Debug, Clone)]
pub struct AxisModel {
    /// STEP output pin.
    pub step: PinId,
    /// DIR output pin.
    pub dir: PinId,
    /// DIR level that moves toward home.
    pub toward_home: Level,
    /// Current position in steps (0 = home switch edge).
    pub position: i64,
    /// Switch actuation zone near home, in steps.
    pub home_travel: i64,
    /// Position of the final switch, in steps.
    pub length: i64,
    /// Home limit input pin.
    pub home_pin: PinId,
    /// Final limit input pin.
    pub final_pin: PinId,
    /// Level a closed switch presents.
    pub active: Level,
}

impl AxisModel {
    fn switch_levels(&self) -> (Level, Level) {
        let at_home = self.position <= self.home_travel;
        let at_final = self.position >= self.length;
        let level = |on: bool| if on { self.active } else { !self.active };
        (level(at_home), level(at_final))
    }
}

enum SimClock {
    Real(Instant),
    Manual(AtomicU64),
}

struct SimState {
    pins: HashMap<PinId, SimPin>,
    axes: Vec<AxisModel>,
}

/// Simulated digital port.
pub struct SimPort {
    state: Mutex<SimState>,
    clock: SimClock,
}

impl SimPort {
    /// Simulator whose clock follows wall time.
    pub fn new() -> Self {
        Self::with_clock(SimClock::Real(Instant::now()))
    }

    /// Simulator whose clock only moves through [`SimPort::advance`] or
    /// [`Clock::sleep_us`]. Makes timing-dependent tests deterministic.
    pub fn manual() -> Self {
        Self::with_clock(SimClock::Manual(AtomicU64::new(0)))
    }

    fn with_clock(clock: SimClock) -> Self {
        Self {
            state: Mutex::new(SimState {
                pins: HashMap::new(),
                axes: Vec::new(),
            }),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` if the clock only advances explicitly.
    pub fn is_manual(&self) -> bool {
        matches!(self.clock, SimClock::Manual(_))
    }

    /// Advance a manual clock. Sleeps for the same time on a real clock.
    pub fn advance(&self, us: u64) {
        match &self.clock {
            SimClock::Manual(ticks) => {
                ticks.fetch_add(us, Ordering::SeqCst);
            }
            SimClock::Real(_) => thread::sleep(Duration::from_micros(us)),
        }
    }

    /// Drive an input pin from outside (button, switch, sensor).
    pub fn drive(&self, pin: PinId, level: Level) {
        let mut state = self.lock();
        let entry = state.pins.entry(pin).or_default();
        entry.value = Some(level);
        log::debug!("[SIM] pin {} driven {:?}", pin, level);
    }

    /// Close a button wired active-high.
    pub fn press(&self, pin: PinId) {
        self.drive(pin, Level::High);
    }

    /// Open a button wired active-high.
    pub fn release(&self, pin: PinId) {
        self.drive(pin, Level::Low);
    }

    /// Current level of a pin.
    pub fn level(&self, pin: PinId) -> Level {
        self.lock().pins.get(&pin).map(SimPin::level).unwrap_or(Level::Low)
    }

    /// Configured mode of a pin, if any.
    pub fn mode(&self, pin: PinId) -> Option<PinMode> {
        self.lock().pins.get(&pin).and_then(|p| p.mode)
    }

    /// Configured pull of a pin.
    pub fn pull(&self, pin: PinId) -> Pull {
        self.lock().pins.get(&pin).map(|p| p.pull).unwrap_or_default()
    }

    /// Number of Low-to-High transitions written to a pin.
    pub fn rising_edges(&self, pin: PinId) -> u64 {
        self.lock().pins.get(&pin).map(|p| p.rising_edges).unwrap_or(0)
    }

    /// Reset the rising-edge counter of a pin.
    pub fn clear_edges(&self, pin: PinId) {
        if let Some(p) = self.lock().pins.get_mut(&pin) {
            p.rising_edges = 0;
        }
    }

    /// Attach a linear axis model and publish its limit switch levels.
    /// Returns the axis index.
    pub fn attach_axis(&self, axis: AxisModel) -> usize {
        let mut state = self.lock();
        let (home, fin) = axis.switch_levels();
        state.pins.entry(axis.home_pin).or_default().value = Some(home);
        state.pins.entry(axis.final_pin).or_default().value = Some(fin);
        state.axes.push(axis);
        state.axes.len() - 1
    }

    /// Current carriage position of an attached axis.
    pub fn axis_position(&self, index: usize) -> Option<i64> {
        self.lock().axes.get(index).map(|a| a.position)
    }

    /// A delay provider tied to this simulator's clock.
    pub fn delay(self: &Arc<Self>) -> ClockDelay {
        ClockDelay::new(self.clone())
    }
}

impl Default for SimPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimPort {
    fn ticks_us(&self) -> u64 {
        match &self.clock {
            SimClock::Real(origin) => origin.elapsed().as_micros() as u64,
            SimClock::Manual(ticks) => ticks.load(Ordering::SeqCst),
        }
    }

    fn sleep_us(&self, us: u64) {
        self.advance(us);
    }
}

impl DigitalPort for SimPort {
    fn set_mode(&self, pin: PinId, mode: PinMode) {
        self.lock().pins.entry(pin).or_default().mode = Some(mode);
        log::debug!("[SIM] pin {} set to {:?}", pin, mode);
    }

    fn set_pull(&self, pin: PinId, pull: Pull) {
        self.lock().pins.entry(pin).or_default().pull = pull;
    }

    fn read(&self, pin: PinId) -> Level {
        self.level(pin)
    }

    fn write(&self, pin: PinId, level: Level) {
        let mut state = self.lock();
        let SimState { pins, axes } = &mut *state;

        let entry = pins.entry(pin).or_default();
        let rising = entry.level() == Level::Low && level == Level::High;
        entry.value = Some(level);
        if !rising {
            return;
        }
        entry.rising_edges += 1;

        for axis in axes.iter_mut().filter(|a| a.step == pin) {
            let dir = pins.get(&axis.dir).map(SimPin::level).unwrap_or(Level::Low);
            axis.position += if dir == axis.toward_home { -1 } else { 1 };
            let (home, fin) = axis.switch_levels();
            pins.entry(axis.home_pin).or_default().value = Some(home);
            pins.entry(axis.final_pin).or_default().value = Some(fin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::delay::DelayNs;

    #[test]
    fn test_unconfigured_read_follows_pull() {
        let sim = SimPort::manual();
        sim.set_input(4, Pull::Up);
        sim.set_input(5, Pull::Down);

        assert_eq!(sim.read(4), Level::High);
        assert_eq!(sim.read(5), Level::Low);

        sim.drive(4, Level::Low);
        assert_eq!(sim.read(4), Level::Low);
    }

    #[test]
    fn test_rising_edges_counted() {
        let sim = SimPort::manual();
        sim.set_output(18, Level::Low);

        for _ in 0..3 {
            sim.write(18, Level::High);
            sim.write(18, Level::High);
            sim.write(18, Level::Low);
        }

        assert_eq!(sim.rising_edges(18), 3);
    }

    #[test]
    fn test_axis_moves_and_drives_switches() {
        let sim = SimPort::manual();
        let index = sim.attach_axis(AxisModel {
            step: 18,
            dir: 23,
            toward_home: Level::High,
            position: 3,
            home_travel: 0,
            length: 10,
            home_pin: 13,
            final_pin: 19,
            active: Level::High,
        });
        assert_eq!(sim.read(13), Level::Low);

        sim.write(23, Level::High);
        for _ in 0..3 {
            sim.write(18, Level::High);
            sim.write(18, Level::Low);
        }

        assert_eq!(sim.axis_position(index), Some(0));
        assert_eq!(sim.read(13), Level::High);
        assert_eq!(sim.read(19), Level::Low);
    }

    #[test]
    fn test_manual_clock_only_moves_on_demand() {
        let sim = Arc::new(SimPort::manual());
        assert_eq!(sim.ticks_us(), 0);

        let mut delay = sim.delay();
        delay.delay_us(250);
        delay.delay_ms(2);
        sim.advance(50);

        assert_eq!(sim.ticks_us(), 2300);
    }
}
