#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

use atmega_hal::pac::USART0;
use atmega_hal::port::mode::{Input, Output};
use atmega_hal::port::{Pin, PD0, PD1};
use atmega_hal::prelude::*;
use diffdrive::config::{BAUD_RATE, PID_RATE_HZ};
use diffdrive::serial::{encode_telemetry, Command, FrameReader};
use diffdrive::timing::AutoStop;
use diffdrive::{ControllerGains, EncoderReader as _, MotorActuator as _, VelocityController};
use panic_halt as _;
use strum::IntoEnumIterator as _;
#[cfg(feature = "log")]
use ufmt::uwriteln;

mod firmware;

use firmware::clock::{millis, take_frame};
use firmware::drive::Drv8830Pair;
use firmware::encoders::Encoders;

pub type CoreClock = atmega_hal::clock::MHz16;
pub type I2c = atmega_hal::I2c<CoreClock>;
type Serial = atmega_hal::Usart<USART0, Pin<Input, PD0>, Pin<Output, PD1>, CoreClock>;

#[cfg(not(feature = "position-pid"))]
type Law = diffdrive::VelocityForm;
#[cfg(feature = "position-pid")]
type Law = diffdrive::PositionForm;

struct State {
    serial: Serial,
    frames: FrameReader,
    motors: Drv8830Pair<I2c>,
    encoders: Encoders,
    auto_stop: AutoStop,
}

fn handle_command(state: &mut State, controller: &mut VelocityController<Law>, command: Command) {
    match command {
        Command::SetTargets { left, right } => {
            state.auto_stop.feed(millis());
            if left == 0 && right == 0 {
                controller.halt(&mut state.motors);
            } else {
                let _transition = controller.set_targets(left, right);
                #[cfg(feature = "log_info")]
                uwriteln!(&mut state.serial, "targets {} {}: {}\r", left, right, _transition)
                    .unwrap_infallible();
            }
        }
        Command::SetGains { kp, kd, ki, ko } => {
            if let Err(_error) = controller.set_gains(kp, kd, ki, ko, PID_RATE_HZ) {
                #[cfg(feature = "log")]
                uwriteln!(&mut state.serial, "Rejected gains: {}\r", _error).unwrap_infallible();
            }
        }
        Command::Stop => controller.halt(&mut state.motors),
    }
}

fn read_serial(state: &mut State, controller: &mut VelocityController<Law>) {
    while let Ok(data) = state.serial.read() {
        match state.frames.push(data) {
            Some(Ok(command)) => handle_command(state, controller, command),
            Some(Err(_error)) => {
                #[cfg(feature = "log_info")]
                uwriteln!(&mut state.serial, "Bad frame: {}\r", _error).unwrap_infallible();
            }
            None => {}
        }
    }
}

#[avr_device::entry]
fn main() -> ! {
    let dp = atmega_hal::Peripherals::take().unwrap();
    let pins = atmega_hal::pins!(dp);
    let serial = atmega_hal::Usart::new(
        dp.USART0,
        pins.pd0,
        pins.pd1.into_output(),
        atmega_hal::usart::Baudrate::<CoreClock>::new(BAUD_RATE),
    );
    let i2c = atmega_hal::I2c::new(
        dp.TWI,
        pins.pc4.into_pull_up_input(),
        pins.pc5.into_pull_up_input(),
        100_000,
    );
    // Encoder inputs with pull ups
    let _encoder_pins = (
        pins.pd2.into_pull_up_input(),
        pins.pd3.into_pull_up_input(),
        pins.pc0.into_pull_up_input(),
        pins.pc1.into_pull_up_input(),
    );
    let mut led = pins.pb5.into_output();

    firmware::clock::init_millis(&dp.TC0);
    firmware::clock::init_frames(&dp.TC1);
    firmware::encoders::init(&dp.EXINT);

    // Enable interrupts globally
    unsafe { avr_device::interrupt::enable() };

    let mut state = State {
        serial,
        frames: FrameReader::new(),
        motors: Drv8830Pair::new(i2c),
        encoders: Encoders,
        auto_stop: AutoStop::default(),
    };
    state.encoders.clear();
    state.motors.set_enabled(true);

    let mut controller = VelocityController::new(Law::default(), ControllerGains::default());
    // Start from the current wheel positions so the first idle frame has nothing to resync
    for axis in diffdrive::Axis::iter() {
        let reading = state.encoders.read(axis);
        controller.reset(axis, reading);
    }

    #[cfg(feature = "log")]
    uwriteln!(&mut state.serial, "Starting...\r").unwrap_infallible();

    let mut frame_counter: u16 = 0;
    loop {
        read_serial(&mut state, &mut controller);

        if controller.is_moving() && state.auto_stop.expired(millis()) {
            controller.halt(&mut state.motors);
            #[cfg(feature = "log_info")]
            uwriteln!(&mut state.serial, "Auto stop\r").unwrap_infallible();
        }

        if !take_frame() {
            continue;
        }

        if controller.halt_on_fault(&mut state.motors) {
            #[cfg(feature = "log")]
            uwriteln!(&mut state.serial, "Motor fault\r").unwrap_infallible();
        }

        let _command = controller.tick(&mut state.encoders, &mut state.motors);
        #[cfg(feature = "log_trace")]
        if let Some(command) = _command {
            uwriteln!(&mut state.serial, "drive {} {}\r", command.left, command.right)
                .unwrap_infallible();
        }
        #[cfg(feature = "log_debug")]
        uwriteln!(
            &mut state.serial,
            "L {} R {}\r",
            controller.axis(diffdrive::Axis::Left),
            controller.axis(diffdrive::Axis::Right)
        )
        .unwrap_infallible();

        for byte in encode_telemetry(&controller.diagnostics()) {
            state.serial.write_byte(byte);
        }

        // Blink once per second while running
        frame_counter = (frame_counter + 1) % PID_RATE_HZ;
        if frame_counter == 0 {
            led.toggle();
        }
    }
}
