//! # Firmware core
//!
//! Owns every oid-indexed peripheral, the timer queue, and the command
//! registry, and drives them all from one synchronous [`Firmware::poll`]
//! call per main-loop iteration. There is no interrupt simulation here and
//! no `await`: `poll` is meant to be called from a bare `loop {}` (or from a
//! RTIC/embassy task that itself never yields mid-call), matching §5.

use heapless::Vec;

use klipper_proto::cursor::{BytesCursor, ScratchWriter};
use klipper_proto::registry::CommandRegistry;
use klipper_proto::transport::{self, ReceiveEvent, Transport};
use klipper_proto::{Error, MESSAGE_LENGTH_MAX};

use crate::analog_in::AnalogIn;
use crate::digital_out::DigitalOut;
use crate::dispatch;
use crate::endstop::Endstop;
use crate::hal::{Clock, HalBundle};
use crate::i2c_device::I2cDevice;
use crate::pwm_out::HardwarePwm;
use crate::scheduler::{Scheduler, DEFAULT_PAST_THRESHOLD_1MHZ};
use crate::shutdown::{FirmwareState, ShutdownCause};
use crate::spi_device::SpiDevice;
use crate::stepper::Stepper;
use crate::trsync::Trsync;

/// Upper bound on simultaneously allocated oids. `allocate_oids` rejects a
/// count above this.
pub const MAX_OIDS: usize = 32;
/// Upper bound on timers in flight across every peripheral at once.
pub const MAX_TIMERS: usize = 64;
/// Upper bound on distinct command/response registrations (identify's two
/// bootstrap entries plus every descriptor in `commands.rs`).
pub const MAX_COMMANDS: usize = 48;
/// Byte capacity of the receive accumulation buffer: two max-size frames,
/// enough slack for a split read plus one fully buffered frame.
const RX_CAPACITY: usize = MESSAGE_LENGTH_MAX * 2;

/// Dictionary constants exported verbatim in `identify`'s `config` map.
pub const STATS_SUMSQ_BASE: i64 = 256;
pub const ADC_MAX: i64 = 4095;
pub const PWM_MAX: i64 = 255;

/// The peripheral kind an oid was assigned by its first `config_*`/`*_start`
/// command. `Empty` oids exist (post `allocate_oids`) but haven't been
/// configured yet.
pub enum Slot<H: HalBundle> {
    Empty,
    Stepper(Stepper<H::Stepper>),
    AnalogIn(AnalogIn),
    DigitalOut(DigitalOut),
    HardwarePwm(HardwarePwm),
    Endstop(Endstop),
    Trsync(Trsync),
    I2c(I2cDevice),
    Spi(SpiDevice),
}

/// The complete firmware core for one board. Generic over the six backend
/// traits bundled by `H`; a board's `main.rs` is the only place a concrete
/// `H` is named.
pub struct Firmware<H: HalBundle> {
    pub gpio: H::Gpio,
    pub adc: H::Adc,
    pub pwm: H::Pwm,
    pub spi: H::Spi,
    pub i2c: H::I2c,
    pub clock: H::Clock,
    pub sink: H::Sink,

    pub state: FirmwareState,
    pub scheduler: Scheduler<MAX_TIMERS>,
    pub registry: CommandRegistry<Firmware<H>, MAX_COMMANDS>,
    pub oids: Vec<Slot<H>, MAX_OIDS>,
    pub config_finalized: bool,
    dictionary: &'static [u8],
    transport: Transport,
    rx: Vec<u8, RX_CAPACITY>,
}

impl<H: HalBundle> Firmware<H> {
    /// Builds a firmware core with every backend already attached and its
    /// command registry frozen. `dictionary` is the zlib-wrapped JSON blob
    /// `identify` serves in chunks; boards embed it with `include_bytes!`
    /// from a file rendered off-device (mirrored, for tests, by
    /// [`crate::dictionary_gen::build_dictionary`]).
    #[allow(clippy::too_many_arguments)]
    pub fn new(gpio: H::Gpio, adc: H::Adc, pwm: H::Pwm, spi: H::Spi, i2c: H::I2c, clock: H::Clock, sink: H::Sink, dictionary: &'static [u8]) -> Self {
        let mut fw = Self {
            gpio,
            adc,
            pwm,
            spi,
            i2c,
            clock,
            sink,
            state: FirmwareState::new(),
            scheduler: Scheduler::new(DEFAULT_PAST_THRESHOLD_1MHZ),
            registry: CommandRegistry::new(),
            oids: Vec::new(),
            config_finalized: false,
            dictionary,
            transport: Transport::new(),
            rx: Vec::new(),
        };
        dispatch::register_all(&mut fw.registry);
        fw.registry.freeze();
        fw
    }

    /// One main-loop iteration: drain inbound bytes, dispatch any complete
    /// frames, run due timers, and flush any cooperative report tasks.
    /// Returns `true` if a `reset` command was dispatched this cycle and the
    /// caller must now perform the platform reset, per spec: the ACK for
    /// `reset` has already flushed by the time this returns, but the reset
    /// itself is a HAL concern this core never performs directly.
    pub fn poll(&mut self) -> bool {
        self.fill_rx();
        self.drain_frames();
        self.run_timers();
        self.drain_analog_reports();
        self.drain_trsync_reports();
        self.state.take_reset_pending()
    }

    fn fill_rx(&mut self) {
        while self.rx.len() < RX_CAPACITY {
            match self.sink.read() {
                Some(byte) => {
                    if self.rx.push(byte).is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    fn drain_frames(&mut self) {
        loop {
            if self.rx.is_empty() {
                return;
            }
            let (consumed, event) = self.transport.receive(&self.rx);
            if consumed == 0 {
                return;
            }
            match event {
                ReceiveEvent::Incomplete => {
                    self.shift_rx(consumed);
                    return;
                }
                ReceiveEvent::Desynced => {
                    self.shift_rx(consumed);
                }
                ReceiveEvent::Resynced { ack_seq } => {
                    self.shift_rx(consumed);
                    self.send_ack(ack_seq);
                }
                ReceiveEvent::AckOnly { ack_seq } => {
                    self.shift_rx(consumed);
                    self.send_ack(ack_seq);
                }
                ReceiveEvent::Frame { payload, ack_seq, .. } => {
                    // Copy the payload out: dispatching into `self` would
                    // otherwise hold an immutable borrow of `self.rx` (where
                    // `payload` points) across a call that needs `&mut self`.
                    let mut scratch = [0u8; MESSAGE_LENGTH_MAX];
                    let len = payload.len();
                    scratch[..len].copy_from_slice(payload);
                    self.shift_rx(consumed);
                    self.send_ack(ack_seq);
                    self.dispatch_payload(&scratch[..len]);
                }
            }
        }
    }

    fn shift_rx(&mut self, consumed: usize) {
        let remaining = self.rx.len() - consumed;
        for i in 0..remaining {
            self.rx[i] = self.rx[i + consumed];
        }
        self.rx.truncate(remaining);
    }

    fn dispatch_payload(&mut self, payload: &[u8]) {
        let mut cursor = BytesCursor::new(payload);
        while !cursor.is_empty() {
            let Ok(id) = cursor.read_u32() else { break };
            let Some(handler) = self.registry.entry(id as u16).and_then(|e| e.handler()) else {
                break;
            };
            if handler(self, &mut cursor).is_err() {
                break;
            }
        }
    }

    fn run_timers(&mut self) {
        let mut pending_cause = None;
        let fault = {
            let clock = &self.clock;
            let gpio = &mut self.gpio;
            let adc = &mut self.adc;
            let pwm = &mut self.pwm;
            let oids = &mut self.oids;
            let pending_cause = &mut pending_cause;
            self.scheduler.process_timers(
                || clock.now(),
                |token, wake_time| {
                    let (outcome, cause) = dispatch::fire_timer(oids, gpio, adc, pwm, token, wake_time);
                    if cause.is_some() {
                        *pending_cause = cause;
                    }
                    outcome
                },
            )
        };
        if let Some(fault) = fault {
            let _ = fault;
            self.try_shutdown(ShutdownCause::RescheduledTimerInPast);
        } else if let Some(cause) = pending_cause {
            self.try_shutdown(cause);
        }
    }

    fn drain_analog_reports(&mut self) {
        for oid in 0..self.oids.len() {
            if let Slot::AnalogIn(a) = &mut self.oids[oid] {
                if let Some((clock, value)) = a.take_pending_report() {
                    let id = self.response_id("analog_in_state");
                    self.send_response(|w| {
                        w.write_u32(id as u32)?;
                        w.write_u32(oid as u32)?;
                        w.write_u32(clock)?;
                        w.write_u32(value as u32)
                    });
                }
            }
        }
    }

    fn drain_trsync_reports(&mut self) {
        for oid in 0..self.oids.len() {
            let report = match &mut self.oids[oid] {
                Slot::Trsync(t) => t.take_pending_report().map(|clock| (clock, t.can_trigger(), t.trigger_reason())),
                _ => None,
            };
            if let Some((clock, can_trigger, trigger_reason)) = report {
                let id = self.response_id("trsync_state");
                self.send_response(|w| {
                    w.write_u32(id as u32)?;
                    w.write_u32(oid as u32)?;
                    w.write_u32(can_trigger as u32)?;
                    w.write_u32(trigger_reason.unwrap_or(0) as u32)?;
                    w.write_u32(clock)
                });
            }
        }
    }

    /// Runs the shutdown cascade exactly once (idempotent across repeated
    /// faults). Drives every configured output to its safe default and
    /// disarms every sampler.
    pub fn try_shutdown(&mut self, cause: ShutdownCause) {
        if !self.state.mark_shutdown() {
            return;
        }
        #[cfg(feature = "defmt-logging")]
        defmt::error!("shutdown: {}", cause.message());
        #[cfg(not(feature = "defmt-logging"))]
        let _ = cause;
        for slot in self.oids.iter_mut() {
            match slot {
                Slot::DigitalOut(d) => d.shutdown_to_default(&mut self.gpio),
                Slot::HardwarePwm(p) => p.shutdown_to_default(&mut self.pwm),
                Slot::AnalogIn(a) => a.shutdown(),
                Slot::Endstop(e) => e.shutdown(),
                Slot::Stepper(s) => s.stop_on_trigger(),
                Slot::Spi(s) => s.shutdown(&mut self.spi),
                Slot::Trsync(_) | Slot::I2c(_) | Slot::Empty => {}
            }
        }
    }

    pub fn send_ack(&mut self, seq: u8) {
        let mut buf = [0u8; MESSAGE_LENGTH_MAX];
        let mut w = ScratchWriter::new(&mut buf);
        if transport::encode_ack(seq, &mut w).is_ok() {
            self.sink.write(w.as_slice());
        }
    }

    /// Encodes one response frame (a single command id + its args) and
    /// writes it straight to the byte sink. Carries the transport's current
    /// `expected_seq`, the same value every ACK in this receive-dispatch
    /// cycle carries, so a command that emits several responses (or the
    /// cooperative report drains right after it) sends them all under one
    /// shared sequence rather than each claiming its own.
    pub fn send_response(&mut self, write_args: impl FnOnce(&mut ScratchWriter) -> Result<(), Error>) {
        let mut buf = [0u8; MESSAGE_LENGTH_MAX];
        let mut w = ScratchWriter::new(&mut buf);
        let seq = self.transport.expected_seq();
        if transport::encode_frame(seq, &mut w, write_args).is_ok() {
            self.sink.write(w.as_slice());
        }
    }

    pub fn dictionary(&self) -> &'static [u8] {
        self.dictionary
    }

    /// Looks up a response's registered id by name. Every name passed here
    /// is one dispatch.rs itself registered in [`Firmware::new`], so the
    /// fallback only matters if registration and lookup names ever drift.
    pub fn response_id(&self, name: &'static str) -> u16 {
        self.registry.id_for_name(name).unwrap_or(u16::MAX)
    }
}
