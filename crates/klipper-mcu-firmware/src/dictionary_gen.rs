//! # Dictionary generation (host-side, `std` only)
//!
//! Builds the exact zlib-wrapped JSON document `identify` serves, by
//! replaying [`dispatch::register_all`]'s registration order against a
//! throwaway registry typed over a backend that is never actually
//! constructed. A board's build script runs this once, off-device, and
//! `include_bytes!`s the result, so the render step and the firmware's own
//! bootstrap order can never drift apart.
#![cfg(feature = "std")]

use klipper_proto::dictionary::{self, ConstantValue, DictionaryInput, IdentifiedDescriptor};
use klipper_proto::registry::CommandRegistry;

use crate::dispatch;
use crate::firmware::{Firmware, ADC_MAX, MAX_COMMANDS, PWM_MAX, STATS_SUMSQ_BASE};
use crate::hal::{AdcDriver, ByteSink, Clock, GpioDriver, HalBundle, HalError, I2cDriver, PwmDriver, SpiDriver, StepperBackend};

/// A backend that implements every HAL trait but is never called: the
/// registry only needs `Firmware<H>`'s *type* to hang handler function
/// pointers off of, never a live `H` value.
struct Unreachable;

impl GpioDriver for Unreachable {
    fn configure_output(&mut self, _pin: u16, _initial_high: bool) -> Result<(), HalError> {
        unreachable!()
    }
    fn configure_input(&mut self, _pin: u16, _pull_up: bool) -> Result<(), HalError> {
        unreachable!()
    }
    fn set_output(&mut self, _pin: u16, _high: bool) -> Result<(), HalError> {
        unreachable!()
    }
    fn read_input(&mut self, _pin: u16) -> Result<bool, HalError> {
        unreachable!()
    }
}

impl AdcDriver for Unreachable {
    fn configure_channel(&mut self, _pin: u16) -> Result<(), HalError> {
        unreachable!()
    }
    fn read_raw(&mut self, _pin: u16) -> Result<u16, HalError> {
        unreachable!()
    }
}

impl PwmDriver for Unreachable {
    fn configure(&mut self, _pin: u16, _cycle_ticks: u32) -> Result<(), HalError> {
        unreachable!()
    }
    fn set_duty(&mut self, _pin: u16, _value: u16) -> Result<(), HalError> {
        unreachable!()
    }
}

impl SpiDriver for Unreachable {
    fn set_cs(&mut self, _bus: u8, _asserted: bool) -> Result<(), HalError> {
        unreachable!()
    }
    fn transfer(&mut self, _bus: u8, _data: &mut [u8]) -> Result<(), HalError> {
        unreachable!()
    }
    fn send(&mut self, _bus: u8, _data: &[u8]) -> Result<(), HalError> {
        unreachable!()
    }
}

impl I2cDriver for Unreachable {
    fn write(&mut self, _bus: u8, _addr: u8, _data: &[u8]) -> Result<(), HalError> {
        unreachable!()
    }
    fn read(&mut self, _bus: u8, _addr: u8, _reg: &[u8], _into: &mut [u8]) -> Result<(), HalError> {
        unreachable!()
    }
}

impl StepperBackend for Unreachable {
    fn new(_step_pin: u16, _dir_pin: u16) -> Self {
        Unreachable
    }
    fn init(&mut self, _invert_step: bool, _invert_dir: bool) -> Result<(), HalError> {
        unreachable!()
    }
    fn step(&mut self) -> Result<(), HalError> {
        unreachable!()
    }
    fn set_direction(&mut self, _forward: bool) -> Result<(), HalError> {
        unreachable!()
    }
    fn set_step_interval(&mut self, _ticks: u32) -> Result<(), HalError> {
        unreachable!()
    }
    fn stop(&mut self) -> Result<(), HalError> {
        unreachable!()
    }
    fn name(&self) -> &'static str {
        "unreachable"
    }
}

impl Clock for Unreachable {
    fn now(&self) -> u32 {
        unreachable!()
    }
    fn uptime(&mut self) -> u64 {
        unreachable!()
    }
    fn timer_freq(&self) -> u32 {
        unreachable!()
    }
}

impl ByteSink for Unreachable {
    fn write(&mut self, _data: &[u8]) -> usize {
        unreachable!()
    }
    fn flush(&mut self) {
        unreachable!()
    }
    fn available(&self) -> usize {
        unreachable!()
    }
    fn read(&mut self) -> Option<u8> {
        unreachable!()
    }
}

struct PreviewHal;

impl HalBundle for PreviewHal {
    type Gpio = Unreachable;
    type Adc = Unreachable;
    type Pwm = Unreachable;
    type Spi = Unreachable;
    type I2c = Unreachable;
    type Stepper = Unreachable;
    type Clock = Unreachable;
    type Sink = Unreachable;
}

/// Renders the dictionary a board running at `clock_freq` would serve via
/// `identify`, ready to `include_bytes!` into firmware.
pub fn build_dictionary(version: &str, build_versions: &str, clock_freq: u32) -> Vec<u8> {
    let mut registry: CommandRegistry<Firmware<PreviewHal>, MAX_COMMANDS> = CommandRegistry::new();
    dispatch::register_all(&mut registry);

    let mut commands = Vec::new();
    let mut responses = Vec::new();
    for (id, entry) in registry.iter() {
        let descriptor = IdentifiedDescriptor { id, name: entry.name(), format: entry.format() };
        if entry.is_command() {
            commands.push(descriptor);
        } else {
            responses.push(descriptor);
        }
    }

    let constants = [
        ("CLOCK_FREQ", ConstantValue::Unsigned(clock_freq as u64)),
        ("ADC_MAX", ConstantValue::Signed(ADC_MAX)),
        ("PWM_MAX", ConstantValue::Signed(PWM_MAX)),
        ("STATS_SUMSQ_BASE", ConstantValue::Signed(STATS_SUMSQ_BASE)),
    ];

    let input = DictionaryInput {
        version,
        build_versions,
        constants: &constants,
        commands: &commands,
        responses: &responses,
        enumerations: &[],
    };
    dictionary::build(&input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_pair_lands_at_ids_zero_and_one() {
        let mut registry: CommandRegistry<Firmware<PreviewHal>, MAX_COMMANDS> = CommandRegistry::new();
        dispatch::register_all(&mut registry);
        assert_eq!(registry.id_for_name("identify_response"), Some(0));
        assert_eq!(registry.id_for_name("identify"), Some(1));
    }

    #[test]
    fn rendered_document_is_nonempty_and_zlib_framed() {
        let blob = build_dictionary("v1", "test-build", 12_000_000);
        assert_eq!(&blob[..2], &[0x78, 0x01]);
    }

    #[test]
    fn every_required_command_and_response_is_registered() {
        let mut registry: CommandRegistry<Firmware<PreviewHal>, MAX_COMMANDS> = CommandRegistry::new();
        dispatch::register_all(&mut registry);
        for d in klipper_proto::commands::REQUIRED_COMMANDS {
            assert!(registry.id_for_name(d.name).is_some(), "missing command {}", d.name);
        }
        for d in klipper_proto::commands::REQUIRED_RESPONSES {
            assert!(registry.id_for_name(d.name).is_some(), "missing response {}", d.name);
        }
    }
}
