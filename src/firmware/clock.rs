//! TC0 keeps a millisecond counter, TC1 paces the control frames.

use crate::CoreClock;
use atmega_hal::clock::Clock as _;
use atmega_hal::pac;
use avr_device::interrupt::{self, Mutex};
use core::cell::Cell;
use diffdrive::config::PID_RATE_HZ;
use diffdrive::timing::calc_overflow;

static MILLIS_COUNTER: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));
static FRAME_PENDING: Mutex<Cell<bool>> = Mutex::new(Cell::new(false));

const MILLIS_PRESCALER: u32 = 64;
const MILLIS_TIMER_COUNTS: u32 = 250;
// 16 MHz / 64 / 250 = 1 kHz
const MILLIS_INCREMENT: u32 = MILLIS_PRESCALER * MILLIS_TIMER_COUNTS / 16000;

pub fn init_millis(tc0: &pac::TC0) {
    tc0.tccr0a.write(|w| w.wgm0().ctc());
    #[expect(
        clippy::cast_possible_truncation,
        reason = "Compare value fits in the 8 bit register"
    )]
    tc0.ocr0a.write(|w| w.bits((MILLIS_TIMER_COUNTS - 1) as u8));
    tc0.tccr0b.write(|w| w.cs0().prescale_64());
    tc0.timsk0.write(|w| w.ocie0a().set_bit());

    interrupt::free(|cs| {
        MILLIS_COUNTER.borrow(cs).set(0);
    });
}

const FRAME_PRESCALER: u32 = 256;
#[expect(
    clippy::cast_possible_truncation,
    reason = "2082 ticks at 30 Hz, well inside 16 bits"
)]
const FRAME_TICKS: u16 =
    calc_overflow(CoreClock::FREQ, PID_RATE_HZ as u32, FRAME_PRESCALER) as u16;

/// TC1 in CTC mode, one compare match per control frame.
pub fn init_frames(tc1: &pac::TC1) {
    tc1.tccr1a.write(|w| w.wgm1().bits(0b00));
    tc1.tccr1b.write(|w| w.cs1().prescale_256().wgm1().bits(0b01));
    tc1.ocr1a.write(|w| w.bits(FRAME_TICKS));
    tc1.timsk1.write(|w| w.ocie1a().set_bit());
}

#[avr_device::interrupt(atmega328p)]
fn TIMER0_COMPA() {
    interrupt::free(|cs| {
        let counter = MILLIS_COUNTER.borrow(cs);
        counter.set(counter.get().wrapping_add(MILLIS_INCREMENT));
    });
}

#[avr_device::interrupt(atmega328p)]
fn TIMER1_COMPA() {
    interrupt::free(|cs| FRAME_PENDING.borrow(cs).set(true));
}

pub fn millis() -> u32 {
    interrupt::free(|cs| MILLIS_COUNTER.borrow(cs).get())
}

/// True once for every elapsed control frame. Frames missed by a slow loop collapse into one.
pub fn take_frame() -> bool {
    interrupt::free(|cs| FRAME_PENDING.borrow(cs).replace(false))
}
