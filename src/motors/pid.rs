//! Fixed-point wheel velocity PID.
//!
//! All arithmetic is integer and divisions truncate toward zero. Gains are
//! pre-scaled by the control rate so no floating point is needed on the AVR.

use crate::config::{OutputLimits, DEFAULT_KD, DEFAULT_KI, DEFAULT_KO, DEFAULT_KP, PID_RATE_HZ};
use strum::IntoStaticStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum GainsError {
    /// `Ko * rate` is not positive, the control law divides by it.
    InvalidOutputScale,
    ZeroRate,
    /// A scaled gain does not fit the fixed-point range.
    Overflow,
}

impl ufmt::uDisplay for GainsError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// Gains shared by both wheels, already scaled for the control rate.
///
/// `output_scale` is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerGains {
    kp: i32, // Proportional, Kp * rate
    kd: i32, // Derivative, Kd * rate^2
    ki: i32, // Integral, unscaled
    ko: i32, // Output divisor, Ko * rate
}

impl ControllerGains {
    /// Gains used directly by the control law, without rate scaling.
    pub const fn new(kp: i32, kd: i32, ki: i32, ko: i32) -> Result<Self, GainsError> {
        if ko <= 0 {
            return Err(GainsError::InvalidOutputScale);
        }
        Ok(Self { kp, kd, ki, ko })
    }

    /// Scale user facing constants given per second to per control frame.
    pub fn from_user(kp: i16, kd: i16, ki: i16, ko: i16, rate_hz: u16) -> Result<Self, GainsError> {
        if rate_hz == 0 {
            return Err(GainsError::ZeroRate);
        }
        let rate = i32::from(rate_hz);
        let scaled_kp = i32::from(kp).checked_mul(rate).ok_or(GainsError::Overflow)?;
        let scaled_kd = i32::from(kd)
            .checked_mul(rate)
            .and_then(|kd| kd.checked_mul(rate))
            .ok_or(GainsError::Overflow)?;
        let scaled_ko = i32::from(ko).checked_mul(rate).ok_or(GainsError::Overflow)?;
        Self::new(scaled_kp, scaled_kd, i32::from(ki), scaled_ko)
    }

    pub const fn proportional(&self) -> i32 {
        self.kp
    }

    pub const fn integral(&self) -> i32 {
        self.ki
    }

    pub const fn derivative(&self) -> i32 {
        self.kd
    }

    pub const fn output_scale(&self) -> i32 {
        self.ko
    }
}

impl Default for ControllerGains {
    fn default() -> Self {
        let rate = i32::from(PID_RATE_HZ);
        Self {
            kp: i32::from(DEFAULT_KP) * rate,
            kd: i32::from(DEFAULT_KD) * rate * rate,
            ki: i32::from(DEFAULT_KI),
            ko: i32::from(DEFAULT_KO) * rate,
        }
    }
}

/// Measurement of one control frame handed to a [`ControlLaw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Ticks counted during the frame.
    pub input: i32,
    pub error: i32,
    /// Command applied during the previous frame.
    pub previous_output: i16,
}

/// Policy computing the raw drive command of a frame.
///
/// The law owns the controller memory layout it needs. It differentiates the
/// measured input only, never the target, so target changes do not kick the
/// derivative term.
pub trait ControlLaw {
    type Memory: Default + Copy + PartialEq + core::fmt::Debug;

    /// Raw command before dead band and saturation limits. Shifts `memory` for the next frame.
    fn update(
        &self,
        gains: &ControllerGains,
        limits: OutputLimits,
        memory: &mut Self::Memory,
        sample: Sample,
    ) -> i32;
}

/// Incremental PID: every frame adjusts the previous output by difference terms only.
///
/// There is no running integral, so there is nothing to wind up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VelocityForm {
    proportional_on_measurement: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VelocityMemory {
    pub prev_input: i32,
    pub prev_prev_input: i32,
    pub prev_error: i32,
}

impl VelocityForm {
    pub const fn new() -> Self {
        Self {
            proportional_on_measurement: false,
        }
    }

    /// Proportional term on the measured input instead of the error.
    ///
    /// Softer reaction to large target steps.
    pub const fn proportional_on_measurement() -> Self {
        Self {
            proportional_on_measurement: true,
        }
    }
}

impl ControlLaw for VelocityForm {
    type Memory = VelocityMemory;

    fn update(
        &self,
        gains: &ControllerGains,
        _limits: OutputLimits,
        memory: &mut VelocityMemory,
        sample: Sample,
    ) -> i32 {
        let p_term = if self.proportional_on_measurement {
            gains.kp.saturating_mul(memory.prev_input.saturating_sub(sample.input))
        } else {
            gains.kp.saturating_mul(sample.error.saturating_sub(memory.prev_error))
        };
        let i_term = gains.ki.saturating_mul(sample.error);
        let curvature = sample
            .input
            .saturating_sub(memory.prev_input.saturating_mul(2))
            .saturating_add(memory.prev_prev_input);
        let d_term = gains.kd.saturating_mul(curvature);

        let delta = p_term.saturating_add(i_term).saturating_sub(d_term) / gains.ko;

        memory.prev_prev_input = memory.prev_input;
        memory.prev_input = sample.input;
        memory.prev_error = sample.error;

        i32::from(sample.previous_output).saturating_add(delta)
    }
}

/// Classic PID with an explicit integral term.
///
/// The integral is bounded by `max - min` of the output limits and stops
/// accumulating toward a side the output is already saturated on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionForm;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionMemory {
    pub prev_input: i32,
    pub integral: i32,
}

impl ControlLaw for PositionForm {
    type Memory = PositionMemory;

    fn update(
        &self,
        gains: &ControllerGains,
        limits: OutputLimits,
        memory: &mut PositionMemory,
        sample: Sample,
    ) -> i32 {
        let max = limits.max();
        let saturated = (sample.previous_output >= max && sample.error > 0)
            || (sample.previous_output <= -max && sample.error < 0);
        if !saturated {
            let bound = limits.integral_bound();
            memory.integral = memory
                .integral
                .saturating_add(gains.ki.saturating_mul(sample.error) / gains.ko)
                .clamp(-bound, bound);
        }

        let p_term = gains.kp.saturating_mul(sample.error);
        let d_term = gains
            .kd
            .saturating_mul(sample.input.saturating_sub(memory.prev_input));
        memory.prev_input = sample.input;

        (p_term.saturating_sub(d_term) / gains.ko).saturating_add(memory.integral)
    }
}

/// Control state of one wheel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisState<M> {
    /// Commanded ticks per frame
    pub(crate) target: i16,
    pub(crate) encoder: i32,
    pub(crate) prev_encoder: i32,
    /// Last applied command, seed of the next frame
    pub(crate) output: i16,
    pub(crate) memory: M,
}

impl<M: Default> AxisState<M> {
    /// Resynchronise to `reading` and forget the controller history.
    ///
    /// The first frame after a reset measures zero velocity instead of the
    /// distance travelled while idle.
    pub fn reset(&mut self, reading: i32) {
        self.encoder = reading;
        self.prev_encoder = reading;
        self.output = 0;
        self.memory = M::default();
    }

    pub fn step<L>(
        &mut self,
        law: &L,
        gains: &ControllerGains,
        limits: OutputLimits,
        reading: i32,
    ) -> i16
    where
        L: ControlLaw<Memory = M>,
    {
        self.encoder = reading;
        let input = self.encoder.wrapping_sub(self.prev_encoder);
        let error = i32::from(self.target).saturating_sub(input);

        let raw = law.update(
            gains,
            limits,
            &mut self.memory,
            Sample {
                input,
                error,
                previous_output: self.output,
            },
        );

        self.output = limits.limit(self.target, raw);
        self.prev_encoder = self.encoder;
        self.output
    }

    pub const fn target(&self) -> i16 {
        self.target
    }

    pub const fn encoder(&self) -> i32 {
        self.encoder
    }

    pub const fn prev_encoder(&self) -> i32 {
        self.prev_encoder
    }

    pub const fn output(&self) -> i16 {
        self.output
    }

    pub const fn memory(&self) -> &M {
        &self.memory
    }
}

impl<M> ufmt::uDisplay for AxisState<M> {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        ufmt::uwrite!(
            f,
            "target={} enc={} out={}",
            self.target,
            self.encoder,
            self.output
        )
    }
}
