//! Compile time configuration of the drive base.

use strum::IntoStaticStr;

/// Largest drive command magnitude accepted by the motor drivers.
pub const MAX_OUTPUT: i16 = 255;
/// Smallest drive magnitude that still turns a wheel. Commands below it stall in the dead band.
pub const MIN_OUTPUT: i16 = 30;

/// Control frames per second.
pub const PID_RATE_HZ: u16 = 30;

// User facing gains, scaled by the control rate in `ControllerGains::from_user`
pub const DEFAULT_KP: i16 = 20;
pub const DEFAULT_KD: i16 = 12;
pub const DEFAULT_KI: i16 = 0;
pub const DEFAULT_KO: i16 = 50;

/// Stop the base when no motion command arrived for this long.
pub const AUTO_STOP_INTERVAL_MS: u32 = 2000;

pub const BAUD_RATE: u32 = 57_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum LimitsError {
    /// A zero minimum would let a commanded wheel be driven with 0.
    NonPositiveMinimum,
    MinimumAboveMaximum,
}

impl ufmt::uDisplay for LimitsError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// Bounds applied to every computed drive command.
///
/// `max` saturates the command, `min` is the dead band escape applied while a
/// nonzero velocity is commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    min: i16,
    max: i16,
}

impl OutputLimits {
    pub const DEFAULT: Self = Self {
        min: MIN_OUTPUT,
        max: MAX_OUTPUT,
    };

    pub const fn new(min: i16, max: i16) -> Result<Self, LimitsError> {
        if min <= 0 {
            return Err(LimitsError::NonPositiveMinimum);
        }
        if min > max {
            return Err(LimitsError::MinimumAboveMaximum);
        }
        Ok(Self { min, max })
    }

    pub const fn min(self) -> i16 {
        self.min
    }

    pub const fn max(self) -> i16 {
        self.max
    }

    /// Magnitude the position form integral is allowed to reach.
    pub const fn integral_bound(self) -> i32 {
        self.max as i32 - self.min as i32
    }

    /// Apply the dead band escape for `target` and saturate.
    ///
    /// A forward target never yields less than `min`, a reverse target never
    /// more than `-min`, so the wheel is not driven against the command.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "Value is clamped to the i16 output range first"
    )]
    pub fn limit(self, target: i16, raw: i32) -> i16 {
        let min = i32::from(self.min);
        let max = i32::from(self.max);
        let raw = if target > 0 && raw < min {
            min
        } else if target < 0 && raw > -min {
            -min
        } else {
            raw
        };
        raw.clamp(-max, max) as i16
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}
