//! Two wheel velocity controller driven once per control frame.
//!
//! ```ignore
//! let mut controller = VelocityController::new(VelocityForm::new(), ControllerGains::default());
//! controller.set_targets(40, 40);
//!
//! loop {
//!     wait_for_frame();
//!     controller.tick(&mut encoders, &mut motors);
//! }
//! ```

use crate::config::OutputLimits;
use crate::motors::pid::{AxisState, ControlLaw, ControllerGains, GainsError};
use crate::motors::{Axis, DriveCommand, EncoderReader, MotorActuator};
use strum::IntoStaticStr;

/// Motion state shared by both wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No target, motors left at rest. Controller memory follows the encoders.
    Idle,
    /// Motion was commanded, both axes resynchronise on the next frame.
    Reset,
    Active,
}

/// Effect of a new pair of targets on the motion flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Transition {
    Started,
    Stopped,
    Unchanged,
}

impl ufmt::uDisplay for Transition {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// Read only snapshot for telemetry and stall detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    pub moving: bool,
    pub output: DriveCommand,
    pub left_encoder: i32,
    pub right_encoder: i32,
}

impl ufmt::uDisplay for Diagnostics {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        ufmt::uwrite!(
            f,
            "moving={} out=({}, {}) enc=({}, {})",
            u8::from(self.moving),
            self.output.left,
            self.output.right,
            self.left_encoder,
            self.right_encoder
        )
    }
}

pub struct VelocityController<L: ControlLaw> {
    law: L,
    gains: ControllerGains,
    limits: OutputLimits,
    axes: [AxisState<L::Memory>; 2], // Indexed by `Axis::as_index`
    phase: Phase,
}

impl<L: ControlLaw> VelocityController<L> {
    pub fn new(law: L, gains: ControllerGains) -> Self {
        Self::with_limits(law, gains, OutputLimits::DEFAULT)
    }

    pub fn with_limits(law: L, gains: ControllerGains, limits: OutputLimits) -> Self {
        Self {
            law,
            gains,
            limits,
            axes: [AxisState::default(); 2],
            phase: Phase::Idle,
        }
    }

    /// Resynchronise `axis` to `reading` and clear its history. The target is kept.
    pub fn reset(&mut self, axis: Axis, reading: i32) {
        self.axes[axis.as_index()].reset(reading);
    }

    /// Run the control law for one wheel and return the limited drive command.
    pub fn step(&mut self, axis: Axis, reading: i32) -> i16 {
        self.axes[axis.as_index()].step(&self.law, &self.gains, self.limits, reading)
    }

    /// Control frame entry point.
    ///
    /// While idle nothing is driven; if a wheel moved on its own both axes are
    /// reset so that stale history cannot cause a spike once motion resumes.
    /// While moving both wheels are stepped, right first, and the pair is
    /// applied with a single actuator call.
    pub fn update_frame<M: MotorActuator>(
        &mut self,
        left: i32,
        right: i32,
        motors: &mut M,
    ) -> Option<DriveCommand> {
        match self.phase {
            Phase::Idle => {
                if self.axes[Axis::Left.as_index()].prev_encoder() != left
                    || self.axes[Axis::Right.as_index()].prev_encoder() != right
                {
                    self.reset(Axis::Left, left);
                    self.reset(Axis::Right, right);
                }
                return None;
            }
            Phase::Reset => {
                self.reset(Axis::Left, left);
                self.reset(Axis::Right, right);
                self.phase = Phase::Active;
            }
            Phase::Active => {}
        }

        let right = self.step(Axis::Right, right);
        let left = self.step(Axis::Left, left);
        motors.set_motor_speeds(left, right);
        Some(DriveCommand { left, right })
    }

    /// Read both encoders and run [`Self::update_frame`].
    pub fn tick<E, M>(&mut self, encoders: &mut E, motors: &mut M) -> Option<DriveCommand>
    where
        E: EncoderReader,
        M: MotorActuator,
    {
        let left = encoders.read(Axis::Left);
        let right = encoders.read(Axis::Right);
        self.update_frame(left, right, motors)
    }

    /// Set targets in ticks per frame. Any nonzero target sets the motion flag.
    pub fn set_targets(&mut self, left: i16, right: i16) -> Transition {
        self.axes[Axis::Left.as_index()].target = left;
        self.axes[Axis::Right.as_index()].target = right;

        let moving = left != 0 || right != 0;
        match (self.is_moving(), moving) {
            (false, true) => {
                self.phase = Phase::Reset;
                Transition::Started
            }
            (true, false) => {
                self.phase = Phase::Idle;
                Transition::Stopped
            }
            _ => Transition::Unchanged,
        }
    }

    /// Drop both targets and stop the motors once.
    pub fn halt<M: MotorActuator>(&mut self, motors: &mut M) {
        self.set_targets(0, 0);
        motors.set_motor_speeds(0, 0);
    }

    /// Halt a moving base when the motor driver reports a fault. Returns true if it did.
    pub fn halt_on_fault<M: MotorActuator>(&mut self, motors: &mut M) -> bool {
        if self.is_moving() && motors.is_fault() {
            self.halt(motors);
            return true;
        }
        false
    }

    /// Replace the gains with user constants scaled for `rate_hz`.
    ///
    /// Must be called between frames. On error the previous gains stay.
    pub fn set_gains(
        &mut self,
        kp: i16,
        kd: i16,
        ki: i16,
        ko: i16,
        rate_hz: u16,
    ) -> Result<(), GainsError> {
        self.gains = ControllerGains::from_user(kp, kd, ki, ko, rate_hz)?;
        Ok(())
    }

    pub const fn gains(&self) -> &ControllerGains {
        &self.gains
    }

    pub const fn limits(&self) -> OutputLimits {
        self.limits
    }

    pub fn is_moving(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn axis(&self, axis: Axis) -> &AxisState<L::Memory> {
        &self.axes[axis.as_index()]
    }

    pub const fn output(&self, axis: Axis) -> i16 {
        self.axes[axis.as_index()].output()
    }

    pub const fn diagnostics(&self) -> Diagnostics {
        let left = &self.axes[Axis::Left.as_index()];
        let right = &self.axes[Axis::Right.as_index()];
        Diagnostics {
            moving: !matches!(self.phase, Phase::Idle),
            output: DriveCommand {
                left: left.output(),
                right: right.output(),
            },
            left_encoder: left.encoder(),
            right_encoder: right.encoder(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_OUTPUT, MIN_OUTPUT};
    use crate::motors::pid::{PositionForm, VelocityForm};

    #[derive(Default)]
    struct RecordingMotors {
        calls: std::vec::Vec<(i16, i16)>,
        fault: bool,
        fault_checks: usize,
    }

    impl MotorActuator for RecordingMotors {
        fn set_motor_speeds(&mut self, left: i16, right: i16) {
            self.calls.push((left, right));
        }

        fn is_fault(&mut self) -> bool {
            self.fault_checks += 1;
            self.fault
        }
    }

    struct Wheels {
        left: i32,
        right: i32,
        reads: usize,
    }

    impl EncoderReader for Wheels {
        fn read(&mut self, axis: Axis) -> i32 {
            self.reads += 1;
            match axis {
                Axis::Left => self.left,
                Axis::Right => self.right,
            }
        }
    }

    fn controller() -> VelocityController<VelocityForm> {
        VelocityController::new(VelocityForm::new(), ControllerGains::new(20, 0, 0, 1).unwrap())
    }

    #[test]
    fn idle_frames_do_not_drive() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        controller.reset(Axis::Left, 10);
        controller.reset(Axis::Right, 20);
        let before = (*controller.axis(Axis::Left), *controller.axis(Axis::Right));

        for _ in 0..5 {
            assert_eq!(controller.update_frame(10, 20, &mut motors), None);
        }
        assert!(motors.calls.is_empty());
        assert_eq!((*controller.axis(Axis::Left), *controller.axis(Axis::Right)), before);
    }

    #[test]
    fn idle_drift_resets_both_axes() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        // Leave some history behind
        controller.set_targets(30, 30);
        controller.update_frame(0, 0, &mut motors);
        controller.set_targets(0, 0);

        // Left wheel got pushed while idle
        assert_eq!(controller.update_frame(15, 0, &mut motors), None);
        for axis in [Axis::Left, Axis::Right] {
            let state = controller.axis(axis);
            assert_eq!(state.encoder(), state.prev_encoder());
            assert_eq!(state.output(), 0);
        }
        assert_eq!(controller.axis(Axis::Left).encoder(), 15);
        assert_eq!(motors.calls.len(), 1);
    }

    #[test]
    fn start_resets_before_first_step() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        assert_eq!(controller.set_targets(50, -50), Transition::Started);
        assert_eq!(controller.phase(), Phase::Reset);

        // Encoders are far from the stored snapshot, the reset hides that distance
        let command = controller.update_frame(5000, -7000, &mut motors).unwrap();
        assert_eq!(controller.phase(), Phase::Active);
        assert_eq!(command, DriveCommand { left: MAX_OUTPUT, right: -MAX_OUTPUT });
        assert_eq!(motors.calls, [(MAX_OUTPUT, -MAX_OUTPUT)]);
        assert_eq!(controller.axis(Axis::Left).prev_encoder(), 5000);
    }

    #[test]
    fn outputs_follow_target_signs() {
        let mut controller = VelocityController::new(
            PositionForm,
            ControllerGains::new(3, 1, 1, 8).unwrap(),
        );
        let mut motors = RecordingMotors::default();
        controller.set_targets(12, -4);
        let (mut left, mut right) = (0, 0);
        for (dl, dr) in [(0, 0), (20, 10), (12, -4), (3, -9), (40, 2), (12, -4)] {
            left += dl;
            right += dr;
            let command = controller.update_frame(left, right, &mut motors).unwrap();
            assert!((MIN_OUTPUT..=MAX_OUTPUT).contains(&command.left));
            assert!((-MAX_OUTPUT..=-MIN_OUTPUT).contains(&command.right));
        }
    }

    #[test]
    fn stop_is_not_driven_by_the_controller() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        controller.set_targets(10, 10);
        controller.update_frame(0, 0, &mut motors);
        controller.update_frame(10, 10, &mut motors);
        assert_eq!(motors.calls.len(), 2);

        assert_eq!(controller.set_targets(0, 0), Transition::Stopped);
        assert!(!controller.is_moving());
        for _ in 0..3 {
            assert_eq!(controller.update_frame(10, 10, &mut motors), None);
        }
        assert_eq!(motors.calls.len(), 2);
    }

    #[test]
    fn halt_sends_a_single_stop() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        controller.set_targets(-10, 0);
        controller.update_frame(0, 0, &mut motors);
        controller.halt(&mut motors);

        assert_eq!(motors.calls.last(), Some(&(0, 0)));
        assert_eq!(controller.axis(Axis::Left).target(), 0);
        assert!(!controller.is_moving());
        assert_eq!(controller.update_frame(0, 0, &mut motors), None);
        assert_eq!(motors.calls.len(), 2);
    }

    #[test]
    fn retargeting_while_moving_keeps_history() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        assert_eq!(controller.set_targets(10, 10), Transition::Started);
        controller.update_frame(0, 0, &mut motors);
        assert_eq!(controller.set_targets(20, 0), Transition::Unchanged);
        assert_eq!(controller.phase(), Phase::Active);
        // No reset: the 8 ticks since the last frame count as velocity
        controller.update_frame(8, 8, &mut motors);
        assert_eq!(controller.axis(Axis::Left).memory().prev_input, 8);
    }

    #[test]
    fn commanded_wheel_is_never_left_at_zero() {
        let mut controller = VelocityController::with_limits(
            VelocityForm::new(),
            ControllerGains::new(1, 0, 0, 1).unwrap(),
            OutputLimits::new(1, 255).unwrap(),
        );
        let mut motors = RecordingMotors::default();
        controller.set_targets(5, 5);
        controller.update_frame(0, 0, &mut motors);
        // Overshoot: raw command is -5, the forward target keeps it at the minimum
        let command = controller.update_frame(10, 10, &mut motors).unwrap();
        assert_eq!(command, DriveCommand { left: 1, right: 1 });
        assert_eq!(motors.calls, [(5, 5), (1, 1)]);
    }

    #[test]
    fn motor_fault_halts_a_moving_base() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        assert!(!controller.halt_on_fault(&mut motors));
        // Idle base does not poll the driver
        assert_eq!(motors.fault_checks, 0);

        controller.set_targets(10, 10);
        controller.update_frame(0, 0, &mut motors);
        assert!(!controller.halt_on_fault(&mut motors));
        assert!(controller.is_moving());

        motors.fault = true;
        assert!(controller.halt_on_fault(&mut motors));
        assert!(!controller.is_moving());
        assert_eq!(motors.calls.last(), Some(&(0, 0)));
        assert_eq!(motors.fault_checks, 2);
    }

    #[test]
    fn tick_reads_both_encoders() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        let mut wheels = Wheels { left: 3, right: 4, reads: 0 };
        controller.set_targets(5, 5);
        assert!(controller.tick(&mut wheels, &mut motors).is_some());
        assert_eq!(wheels.reads, 2);
        assert_eq!(controller.axis(Axis::Right).encoder(), 4);
    }

    #[test]
    fn rejected_gains_keep_previous() {
        let mut controller = controller();
        assert_eq!(controller.set_gains(1, 0, 0, 0, 30), Err(GainsError::InvalidOutputScale));
        assert_eq!(controller.gains().proportional(), 20);

        controller.set_gains(1, 0, 0, 1, 30).unwrap();
        assert_eq!(controller.gains().proportional(), 30);
        assert_eq!(controller.gains().output_scale(), 30);
        assert_eq!(controller.gains().integral(), 0);
    }

    #[test]
    fn diagnostics_display() {
        let mut controller = controller();
        let mut motors = RecordingMotors::default();
        controller.set_targets(10, 0);
        controller.update_frame(100, 200, &mut motors);
        let diagnostics = controller.diagnostics();
        assert!(diagnostics.moving);
        assert_eq!(diagnostics.output.left, controller.output(Axis::Left));

        let mut out = heapless::String::<64>::new();
        ufmt::uwrite!(&mut out, "{}", diagnostics).unwrap();
        assert_eq!(out.as_str(), "moving=1 out=(200, 0) enc=(100, 200)");
    }
}
