//! Wheel encoders counted from pin change interrupts.
//!
//! Left encoder on PD2/PD3 (PCINT18/19), right encoder on PC0/PC1 (PCINT8/9).

use atmega_hal::pac;
use core::cell::Cell;
use critical_section::Mutex;
use diffdrive::motors::quadrature::QuadratureCounter;
use diffdrive::{Axis, EncoderReader};

static LEFT: Mutex<Cell<QuadratureCounter>> = Mutex::new(Cell::new(QuadratureCounter::new()));
static RIGHT: Mutex<Cell<QuadratureCounter>> = Mutex::new(Cell::new(QuadratureCounter::new()));

const LEFT_A: u8 = 1 << 2;
const LEFT_B: u8 = 1 << 3;
const RIGHT_A: u8 = 1 << 0;
const RIGHT_B: u8 = 1 << 1;

pub fn init(exint: &pac::EXINT) {
    // Enable pin change interrupt groups 1 (port C) and 2 (port D)
    exint.pcicr.write(|w| unsafe { w.bits(0b110) });
    exint.pcmsk1.write(|w| unsafe { w.bits(RIGHT_A | RIGHT_B) });
    exint.pcmsk2.write(|w| unsafe { w.bits(LEFT_A | LEFT_B) });
}

fn count(counter: &Mutex<Cell<QuadratureCounter>>, pins: u8, a: u8, b: u8) {
    critical_section::with(|cs| {
        let cell = counter.borrow(cs);
        let mut value = cell.get();
        value.update(pins & a != 0, pins & b != 0);
        cell.set(value);
    });
}

#[avr_device::interrupt(atmega328p)]
fn PCINT2() {
    // SAFETY: Read only access to the input register
    let pins = unsafe { &*pac::PORTD::ptr() }.pind.read().bits();
    count(&LEFT, pins, LEFT_A, LEFT_B);
}

#[avr_device::interrupt(atmega328p)]
fn PCINT1() {
    // SAFETY: Read only access to the input register
    let pins = unsafe { &*pac::PORTC::ptr() }.pinc.read().bits();
    count(&RIGHT, pins, RIGHT_A, RIGHT_B);
}

/// Both wheel counters. The right wheel is mounted mirrored, its count is negated.
pub struct Encoders;

impl Encoders {
    pub fn clear(&mut self) {
        critical_section::with(|cs| {
            for counter in [&LEFT, &RIGHT] {
                let cell = counter.borrow(cs);
                let mut value = cell.get();
                value.clear();
                cell.set(value);
            }
        });
    }
}

impl EncoderReader for Encoders {
    fn read(&mut self, axis: Axis) -> i32 {
        critical_section::with(|cs| match axis {
            Axis::Left => LEFT.borrow(cs).get().position(),
            Axis::Right => RIGHT.borrow(cs).get().position().wrapping_neg(),
        })
    }
}
