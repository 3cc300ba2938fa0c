//! # Simulator board
//!
//! The one concrete [`HalBundle`] this crate ships itself: a host-process
//! stand-in for real hardware, modeled on the simulator MCU target real
//! Klipper ships alongside its AVR/STM32/RP2040 builds. It speaks the exact
//! same framed protocol over stdin/stdout that a real board speaks over
//! USB-CDC, so the host (`klippy`) cannot tell the difference. Useful for
//! exercising the dispatch and scheduling logic without flashing anything.
//!
//! Real boards provide their own `HalBundle` the same way this one does,
//! wiring `Gpio`/`Adc`/`Pwm`/`Spi`/`I2c` to a PAC and `Sink` to a USB-CDC or
//! UART peripheral; nothing in [`crate::firmware`] changes.
#![cfg(feature = "std")]

use std::io::{Read, Write};
use std::time::Instant;

use crate::hal::{AdcDriver, ByteSink, Clock, GpioDriver, HalBundle, HalError, I2cDriver, PwmDriver, SpiDriver, StepperBackend};

/// Matches the `CLOCK_FREQ` a typical 32-bit ARM board reports; the
/// simulator has no real tick source, so it derives ticks from wall time at
/// this rate.
pub const SIM_CLOCK_FREQ: u32 = 12_000_000;

const MAX_PINS: usize = 64;

pub struct SimGpio {
    outputs: [bool; MAX_PINS],
    inputs: [bool; MAX_PINS],
}

impl SimGpio {
    pub fn new() -> Self {
        Self { outputs: [false; MAX_PINS], inputs: [false; MAX_PINS] }
    }

    /// Test/demo hook: flips what `read_input` will report for `pin`,
    /// standing in for an external signal (an endstop being hit, say).
    pub fn set_input(&mut self, pin: u16, high: bool) {
        if let Some(slot) = self.inputs.get_mut(pin as usize) {
            *slot = high;
        }
    }
}

impl Default for SimGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioDriver for SimGpio {
    fn configure_output(&mut self, pin: u16, initial_high: bool) -> Result<(), HalError> {
        let slot = self.outputs.get_mut(pin as usize).ok_or(HalError::InvalidIndex)?;
        *slot = initial_high;
        Ok(())
    }
    fn configure_input(&mut self, pin: u16, _pull_up: bool) -> Result<(), HalError> {
        if (pin as usize) >= MAX_PINS {
            return Err(HalError::InvalidIndex);
        }
        Ok(())
    }
    fn set_output(&mut self, pin: u16, high: bool) -> Result<(), HalError> {
        let slot = self.outputs.get_mut(pin as usize).ok_or(HalError::InvalidIndex)?;
        *slot = high;
        Ok(())
    }
    fn read_input(&mut self, pin: u16) -> Result<bool, HalError> {
        self.inputs.get(pin as usize).copied().ok_or(HalError::InvalidIndex)
    }
}

pub struct SimAdc {
    channels: [u16; MAX_PINS],
}

impl SimAdc {
    pub fn new() -> Self {
        Self { channels: [0; MAX_PINS] }
    }

    pub fn set_reading(&mut self, pin: u16, value: u16) {
        if let Some(slot) = self.channels.get_mut(pin as usize) {
            *slot = value;
        }
    }
}

impl Default for SimAdc {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcDriver for SimAdc {
    fn configure_channel(&mut self, pin: u16) -> Result<(), HalError> {
        if (pin as usize) >= MAX_PINS {
            return Err(HalError::InvalidIndex);
        }
        Ok(())
    }
    fn read_raw(&mut self, pin: u16) -> Result<u16, HalError> {
        self.channels.get(pin as usize).copied().ok_or(HalError::InvalidIndex)
    }
}

pub struct SimPwm {
    duty: [u16; MAX_PINS],
}

impl SimPwm {
    pub fn new() -> Self {
        Self { duty: [0; MAX_PINS] }
    }
}

impl Default for SimPwm {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmDriver for SimPwm {
    fn configure(&mut self, pin: u16, _cycle_ticks: u32) -> Result<(), HalError> {
        if (pin as usize) >= MAX_PINS {
            return Err(HalError::InvalidIndex);
        }
        Ok(())
    }
    fn set_duty(&mut self, pin: u16, value: u16) -> Result<(), HalError> {
        let slot = self.duty.get_mut(pin as usize).ok_or(HalError::InvalidIndex)?;
        *slot = value;
        Ok(())
    }
}

#[derive(Default)]
pub struct SimSpi;

impl SpiDriver for SimSpi {
    fn set_cs(&mut self, _bus: u8, _asserted: bool) -> Result<(), HalError> {
        Ok(())
    }
    fn transfer(&mut self, _bus: u8, data: &mut [u8]) -> Result<(), HalError> {
        // Loopback: no simulated peripheral answers, so echo what was sent.
        Ok(data.iter_mut().for_each(|b| *b = !*b))
    }
    fn send(&mut self, _bus: u8, _data: &[u8]) -> Result<(), HalError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct SimI2c;

impl I2cDriver for SimI2c {
    fn write(&mut self, _bus: u8, _addr: u8, _data: &[u8]) -> Result<(), HalError> {
        Ok(())
    }
    fn read(&mut self, _bus: u8, _addr: u8, _reg: &[u8], into: &mut [u8]) -> Result<(), HalError> {
        into.fill(0);
        Ok(())
    }
}

pub struct SimStepper {
    step_pin: u16,
    dir_pin: u16,
    steps: u64,
}

impl StepperBackend for SimStepper {
    fn new(step_pin: u16, dir_pin: u16) -> Self {
        Self { step_pin, dir_pin, steps: 0 }
    }
    fn init(&mut self, _invert_step: bool, _invert_dir: bool) -> Result<(), HalError> {
        Ok(())
    }
    fn step(&mut self) -> Result<(), HalError> {
        self.steps += 1;
        Ok(())
    }
    fn set_direction(&mut self, _forward: bool) -> Result<(), HalError> {
        Ok(())
    }
    fn set_step_interval(&mut self, _ticks: u32) -> Result<(), HalError> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), HalError> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "sim-stepper"
    }
}

pub struct SimClock {
    start: Instant,
}

impl SimClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> u32 {
        (self.uptime_raw() & 0xffff_ffff) as u32
    }
    fn uptime(&mut self) -> u64 {
        self.uptime_raw()
    }
    fn timer_freq(&self) -> u32 {
        SIM_CLOCK_FREQ
    }
}

impl SimClock {
    fn uptime_raw(&self) -> u64 {
        let elapsed = self.start.elapsed();
        elapsed.as_secs() * SIM_CLOCK_FREQ as u64 + (elapsed.subsec_nanos() as u64 * SIM_CLOCK_FREQ as u64) / 1_000_000_000
    }
}

/// Stdin/stdout byte sink. Reads are non-blocking best-effort: `read()`
/// drains whatever the OS has buffered without stalling the main loop.
pub struct SimSink {
    stdin: std::io::Stdin,
    stdout: std::io::Stdout,
    pending: heapless::Deque<u8, 256>,
}

impl SimSink {
    pub fn new() -> Self {
        Self { stdin: std::io::stdin(), stdout: std::io::stdout(), pending: heapless::Deque::new() }
    }

    fn fill_pending(&mut self) {
        if !self.pending.is_empty() {
            return;
        }
        let mut buf = [0u8; 256];
        if let Ok(n) = self.stdin.lock().read(&mut buf) {
            for &b in &buf[..n] {
                let _ = self.pending.push_back(b);
            }
        }
    }
}

impl Default for SimSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSink for SimSink {
    fn write(&mut self, data: &[u8]) -> usize {
        match self.stdout.lock().write_all(data) {
            Ok(()) => data.len(),
            Err(_) => 0,
        }
    }
    fn flush(&mut self) {
        let _ = self.stdout.lock().flush();
    }
    fn available(&self) -> usize {
        self.pending.len()
    }
    fn read(&mut self) -> Option<u8> {
        self.fill_pending();
        self.pending.pop_front()
    }
}

pub struct SimHal;

impl HalBundle for SimHal {
    type Gpio = SimGpio;
    type Adc = SimAdc;
    type Pwm = SimPwm;
    type Spi = SimSpi;
    type I2c = SimI2c;
    type Stepper = SimStepper;
    type Clock = SimClock;
    type Sink = SimSink;
}
