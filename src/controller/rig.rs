//! Controller hardware.
//!
//! [`Rig`] holds the motors and the inputs automatic motion is guarded
//! by. It is owned by exactly one thread at a time: the controller loop,
//! or the cycle thread while a cycle runs. [`Operator`] holds the inputs
//! only the controller loop reads.

use std::sync::Arc;

use crate::config::CycleConfig;
use crate::error::Result;
use crate::input::{AnalogInput, EdgeInput, InputKind, Joystick};
use crate::motor::{NonBlockingStepper, StepperMotorBuilder};
use crate::port::{Clock, ClockDelay, Level, PinId, PortHandle, PortPin, Pull};

/// Stepper type used by the controllers.
pub type Stepper = NonBlockingStepper<PortPin, PortPin, ClockDelay>;

/// Edge input type used by the controllers.
pub type Input = EdgeInput<PortPin>;

/// Inputs that gate motion, plus handles to force the STEP outputs low.
pub struct Guards {
    /// Start button
    pub start: Input,
    /// Stop button
    pub stop: Input,
    /// Safety interlock
    pub safety: Input,
    /// Home limit
    pub home: Input,
    /// Final limit
    pub final_limit: Input,
    pub(crate) clock: Arc<dyn Clock>,
    step_outputs: [PortPin; 2],
}

impl Guards {
    /// Drive both STEP outputs low. DIR levels are kept so motion resumes
    /// in the commanded direction.
    pub fn halt(&self) {
        for pin in &self.step_outputs {
            pin.write_low();
        }
    }

    /// Sleep on the rig clock.
    pub fn sleep_ms(&self, ms: u64) {
        self.clock.sleep_us(ms * 1000);
    }
}

/// Motors and guard inputs.
pub struct Rig {
    /// Linear axis
    pub linear: Stepper,
    /// Drill
    pub drill: Stepper,
    /// Guard inputs
    pub guards: Guards,
}

impl Rig {
    /// Disable both steppers and drive all outputs low.
    pub fn stop_motors(&mut self) -> Result<()> {
        self.linear.stop()?;
        self.drill.stop()?;
        self.guards.halt();
        Ok(())
    }
}

/// Operator inputs read by the controller loop only.
pub struct Operator {
    /// Reset button
    pub reset: Input,
    /// Drill toggle button
    pub drill_toggle: Input,
    /// Jog joystick
    pub joystick: Joystick,
}

/// Everything a controller drives.
pub struct Hardware {
    /// Motors and guard inputs
    pub rig: Rig,
    /// Operator inputs
    pub operator: Operator,
}

impl Hardware {
    /// Configure the pins named by `config` and build the drivers.
    pub fn build(port: &PortHandle, adc: Arc<dyn AnalogInput>, config: &CycleConfig) -> Result<Self> {
        let mp = &config.motor_pins;
        let ip = &config.input_pins;
        let params = &config.motor_parameters;

        for pin in config.output_pins() {
            port.io.set_output(pin, Level::Low);
        }

        let (active, pull) = if config.input_polarity.active_high {
            (Level::High, Pull::Down)
        } else {
            (Level::Low, Pull::Up)
        };
        let input = |pin: PinId, name: &str, kind: InputKind| {
            port.io.set_input(pin, pull);
            EdgeInput::new(port.pin(pin), port.clock.clone(), name, kind, active)
        };

        let linear = StepperMotorBuilder::new()
            .step_pin(port.pin(mp.pulsos1))
            .dir_pin(port.pin(mp.dir1))
            .delay(port.delay())
            .name("linear")
            .initial_direction(params.sentido_giro_lineal)
            .build()?;
        let drill = StepperMotorBuilder::new()
            .step_pin(port.pin(mp.pulsos2))
            .dir_pin(port.pin(mp.dir2))
            .delay(port.delay())
            .name("drill")
            .initial_direction(params.sentido_giro_taladro)
            .build()?;

        let guards = Guards {
            start: input(ip.btn_start, "start", InputKind::button()),
            stop: input(ip.btn_stop, "stop", InputKind::button()),
            safety: input(ip.switch_s, "safety", InputKind::Switch),
            home: input(ip.fin_home, "home", InputKind::Switch),
            final_limit: input(ip.fin_final, "final", InputKind::Switch),
            clock: port.clock.clone(),
            step_outputs: [port.pin(mp.pulsos1), port.pin(mp.pulsos2)],
        };
        let operator = Operator {
            reset: input(ip.btn_reset, "reset", InputKind::button()),
            drill_toggle: input(ip.btn_tala, "drill", InputKind::button()),
            joystick: Joystick::new(adc, config.joystick),
        };

        Ok(Self {
            rig: Rig {
                linear: NonBlockingStepper::new(linear, port.clock.clone()),
                drill: NonBlockingStepper::new(drill, port.clock.clone()),
                guards,
            },
            operator,
        })
    }
}

/// Drive every output of `config` low without owning the drivers.
pub fn force_outputs_low(port: &PortHandle, config: &CycleConfig) {
    for pin in config.output_pins() {
        port.io.write(pin, Level::Low);
    }
}
