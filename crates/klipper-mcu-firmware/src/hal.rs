//! # Backend contracts
//!
//! The core never touches a register directly. Every peripheral module holds
//! a handle into one of these traits and drives it through `oid`/`pin`-
//! indexed calls; a board's `main.rs` is the only place that wires a
//! concrete implementation (GPIO PAC, software bit-bang SPI, …) to them.
//!
//! All operations return `Result<_, HalError>`; a bus error from any of them
//! is the caller's cue to call into `shutdown`.

/// Failure from a backend operation. Carries no payload beyond "which kind"
/// — backends that want richer diagnostics log before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The pin, bus, or oid index is outside what this backend was
    /// configured for.
    InvalidIndex,
    /// The underlying bus or peripheral reported a transfer error.
    BusError,
    /// The backend has no more storage for a newly configured peripheral.
    OutOfResources,
}

/// Digital input/output pins, addressed by the board-assigned pin number the
/// host passes to `config_*` commands.
pub trait GpioDriver {
    fn configure_output(&mut self, pin: u16, initial_high: bool) -> Result<(), HalError>;
    fn configure_input(&mut self, pin: u16, pull_up: bool) -> Result<(), HalError>;
    fn set_output(&mut self, pin: u16, high: bool) -> Result<(), HalError>;
    fn read_input(&mut self, pin: u16) -> Result<bool, HalError>;
}

/// Analog input channels. `read_raw` is synchronous: the sampler timer
/// handler calls it directly and blocks for the conversion.
pub trait AdcDriver {
    fn configure_channel(&mut self, pin: u16) -> Result<(), HalError>;
    fn read_raw(&mut self, pin: u16) -> Result<u16, HalError>;
}

/// Hardware PWM channels. `value` and `cycle_ticks` share the stepper
/// clock's tick base; `0..=PWM_MAX` duty resolution per §6.
pub trait PwmDriver {
    fn configure(&mut self, pin: u16, cycle_ticks: u32) -> Result<(), HalError>;
    fn set_duty(&mut self, pin: u16, value: u16) -> Result<(), HalError>;
}

/// SPI buses, addressed by the host-assigned bus id. Bus ids `>= 0x80`
/// select a software (bit-banged) implementation per §4.9; the driver is
/// free to ignore the distinction if it has no hardware SPI at all.
pub trait SpiDriver {
    fn set_cs(&mut self, bus: u8, asserted: bool) -> Result<(), HalError>;
    fn transfer(&mut self, bus: u8, data: &mut [u8]) -> Result<(), HalError>;
    fn send(&mut self, bus: u8, data: &[u8]) -> Result<(), HalError>;
}

/// I2C buses, addressed by host-assigned bus id and 7-bit device address.
pub trait I2cDriver {
    fn write(&mut self, bus: u8, addr: u8, data: &[u8]) -> Result<(), HalError>;
    fn read(&mut self, bus: u8, addr: u8, reg: &[u8], into: &mut [u8]) -> Result<(), HalError>;
}

/// A single stepper's pulse-generation backend. The core never toggles a
/// pin itself: it calls `step()` and trusts the backend to produce a pulse
/// meeting the driver's minimum width.
pub trait StepperBackend {
    /// Builds a backend bound to a given step/dir pin pair. `config_stepper`
    /// calls this once per oid; the pins are fixed for the backend's
    /// lifetime afterward.
    fn new(step_pin: u16, dir_pin: u16) -> Self;
    fn init(&mut self, invert_step: bool, invert_dir: bool) -> Result<(), HalError>;
    fn step(&mut self) -> Result<(), HalError>;
    fn set_direction(&mut self, forward: bool) -> Result<(), HalError>;
    fn set_step_interval(&mut self, ticks: u32) -> Result<(), HalError>;
    fn stop(&mut self) -> Result<(), HalError>;
    fn name(&self) -> &'static str;
}

/// The monotonic tick source driving every timer comparison in the core.
pub trait Clock {
    /// Current 32-bit tick count.
    fn now(&self) -> u32;
    /// 64-bit uptime, stitched from rollovers of [`Clock::now`]. Backends
    /// typically track a high half incremented whenever `now()` wraps.
    fn uptime(&mut self) -> u64;
    /// Ticks per second; exported to the host as the `CLOCK_FREQ` constant.
    fn timer_freq(&self) -> u32;
}

/// The byte transport underlying framed messages (USB-CDC in practice).
pub trait ByteSink {
    /// Writes as much of `data` as fits, returning the count consumed.
    fn write(&mut self, data: &[u8]) -> usize;
    /// Blocks until everything previously written has left the device.
    fn flush(&mut self);
    /// Bytes currently buffered and ready to [`ByteSink::read`].
    fn available(&self) -> usize;
    /// Reads one byte, if any is available.
    fn read(&mut self) -> Option<u8>;
}

/// The complete set of backends a board wires up. Bundled so [`crate::firmware::Firmware`]
/// only needs one type parameter instead of six.
pub trait HalBundle {
    type Gpio: GpioDriver;
    type Adc: AdcDriver;
    type Pwm: PwmDriver;
    type Spi: SpiDriver;
    type I2c: I2cDriver;
    type Stepper: StepperBackend;
    type Clock: Clock;
    type Sink: ByteSink;
}
