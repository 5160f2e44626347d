//! Wheel velocity control for a two-motor differential-drive base.
//!
//! The library is hardware agnostic and runs on the host for testing. The
//! firmware binary (`firmware` feature) wires it to the Atmega328p timers,
//! encoder interrupts and DRV8830 motor drivers.
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod motors;
pub mod serial;
pub mod timing;

pub use motors::controller::{Diagnostics, Phase, Transition, VelocityController};
pub use motors::pid::{
    AxisState, ControlLaw, ControllerGains, GainsError, PositionForm, VelocityForm,
};
pub use motors::{Axis, DriveCommand, EncoderReader, MotorActuator};
