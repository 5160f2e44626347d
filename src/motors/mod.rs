use strum::EnumIter;

pub mod controller;
pub mod pid;
pub mod quadrature;

/// Driven wheel of the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Axis {
    Left,
    Right,
}

impl Axis {
    pub const fn to_str(self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }

    pub const fn as_index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

impl ufmt::uDisplay for Axis {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str(self.to_str())
    }
}

/// Pair of drive commands applied to both wheels in the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveCommand {
    pub left: i16,
    pub right: i16,
}

/// Source of absolute wheel positions.
///
/// Reading must have no side effects, the count wraps naturally.
pub trait EncoderReader {
    fn read(&mut self, axis: Axis) -> i32;
}

/// Motor driver applying signed drive commands.
pub trait MotorActuator {
    /// Apply both wheel commands in one call so they change in the same frame.
    fn set_motor_speeds(&mut self, left: i16, right: i16);

    fn set_enabled(&mut self, _enabled: bool) {}

    /// True while a driver reports a latched fault. Drivers without fault reporting never do.
    fn is_fault(&mut self) -> bool {
        false
    }
}
