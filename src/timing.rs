use crate::config::AUTO_STOP_INTERVAL_MS;

/// CTC compare value for a timer firing at `target_hz`.
///
/// The timer counts `compare + 1` prescaled ticks per period, so 16 MHz with
/// a prescaler of 256 at 30 Hz gives 2082.
pub const fn calc_overflow(clock_hz: u32, target_hz: u32, prescale: u32) -> u32 {
    clock_hz / target_hz / prescale - 1
}

/// Stops the base when the command source went quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoStop {
    interval_ms: u32,
    last_command_ms: u32,
    armed: bool,
}

impl AutoStop {
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_command_ms: 0,
            armed: false,
        }
    }

    /// Record a motion command received at `now_ms`.
    pub fn feed(&mut self, now_ms: u32) {
        self.last_command_ms = now_ms;
        self.armed = true;
    }

    /// True once per silence longer than the interval. The millisecond counter may wrap.
    pub fn expired(&mut self, now_ms: u32) -> bool {
        if self.armed && now_ms.wrapping_sub(self.last_command_ms) > self.interval_ms {
            self.armed = false;
            return true;
        }
        false
    }
}

impl Default for AutoStop {
    fn default() -> Self {
        Self::new(AUTO_STOP_INTERVAL_MS)
    }
}
