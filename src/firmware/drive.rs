use diffdrive::config::MAX_OUTPUT;
use diffdrive::{Axis, MotorActuator};
use drv8830::WriteRegister as _;
use embedded_hal::i2c::I2c;

const FAULT_REGISTER: u8 = 0x01;
// FAULT, OCP, UVLO, OTS and ILIMIT bits
const FAULT_MASK: u8 = 0b0001_1111;

const fn i2c_address(axis: Axis) -> u8 {
    match axis {
        Axis::Left => 0x60,
        Axis::Right => 0x61,
    }
}

/// One DRV8830 H-bridge per wheel on the shared I2C bus.
pub struct Drv8830Pair<I> {
    i2c: I,
    enabled: bool,
}

impl<I: I2c> Drv8830Pair<I> {
    pub const fn new(i2c: I) -> Self {
        Self { i2c, enabled: true }
    }

    fn drive(&mut self, axis: Axis, speed: i16) {
        let address = i2c_address(axis);
        // Clear a latched fault first, the driver ignores commands until then
        let _ = drv8830::Fault {
            clear: true,
            ..Default::default()
        }
        .write(&mut self.i2c, address);

        // Right motor is mounted mirrored
        let speed = match axis {
            Axis::Left => speed,
            Axis::Right => speed.saturating_neg(),
        };
        let magnitude = speed.unsigned_abs().min(MAX_OUTPUT.unsigned_abs());
        let mut control = if speed == 0 || !self.enabled {
            drv8830::Control::BRAKE
        } else if speed > 0 {
            drv8830::Control::FORWARD
        } else {
            drv8830::Control::REVERSE
        };
        control.speed_mult = f32::from(magnitude) / f32::from(MAX_OUTPUT);
        let _ = control.write(&mut self.i2c, address);
    }

    /// A driver that does not answer counts as faulted.
    fn faulted(&mut self, axis: Axis) -> bool {
        let mut fault = [0];
        self.i2c
            .write_read(i2c_address(axis), &[FAULT_REGISTER], &mut fault)
            .map_or(true, |()| fault[0] & FAULT_MASK != 0)
    }
}

impl<I: I2c> MotorActuator for Drv8830Pair<I> {
    fn set_motor_speeds(&mut self, left: i16, right: i16) {
        self.drive(Axis::Left, left);
        self.drive(Axis::Right, right);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.set_motor_speeds(0, 0);
        }
    }

    fn is_fault(&mut self) -> bool {
        let left = self.faulted(Axis::Left);
        let right = self.faulted(Axis::Right);
        left || right
    }
}
