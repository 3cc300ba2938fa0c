#![deny(clippy::all)]
#![deny(warnings)]
#![cfg_attr(not(feature = "std"), no_std)]

//! # Klipper MCU firmware core
//!
//! The board-independent half of a Klipper-compatible MCU: the timer
//! scheduler, step-generation pipeline, and every oid-indexed peripheral
//! (ADC, digital/PWM outputs, endstops, trigger sync, I2C/SPI devices),
//! wired to the wire format from [`klipper_proto`] through [`dispatch`].
//!
//! A board owns a concrete [`hal::HalBundle`] and an [`firmware::Firmware`]
//! built from it, then calls [`firmware::Firmware::poll`] from a bare
//! `loop {}` (or a non-yielding RTIC/embassy task). No module here reads a
//! register directly or blocks on I/O beyond what the backend traits do.

pub mod analog_in;
#[cfg(feature = "std")]
pub mod board;
pub mod digital_out;
mod dispatch;
#[cfg(feature = "std")]
pub mod dictionary_gen;
pub mod endstop;
pub mod firmware;
pub mod hal;
pub mod i2c_device;
pub mod pwm_out;
pub mod scheduler;
pub mod shutdown;
pub mod spi_device;
pub mod stepper;
pub mod trsync;

pub use firmware::Firmware;
pub use hal::HalBundle;
