//! # Endstops & oversampling
//!
//! A two-stage state machine shared by digital, analog, and I2C endstops:
//! `Armed` waits for a matching sample, `Oversampling` requires
//! `sample_count` consecutive matches before declaring a trigger. A
//! mismatch during oversampling reverts to `Armed` rather than failing the
//! whole home.

use crate::hal::{GpioDriver, HalError};
use crate::scheduler::{Component, Scheduler, TimerOutcome, TimerToken};
use crate::trsync::Trsync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Armed,
    Oversampling,
}

/// A snapshot of an endstop's state, returned by `endstop_query_state` with
/// interrupts disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndstopSnapshot {
    pub homing: bool,
    pub pin_value: bool,
}

pub struct Endstop {
    pin: u16,
    homing: bool,
    trigger_on_high: bool,
    stage: Stage,
    sample_time: u32,
    sample_count: u8,
    trigger_count: u8,
    rest_time: u32,
    next_wake: u32,
    trsync_oid: u16,
    trigger_reason: u8,
    last_pin_value: bool,
}

impl Endstop {
    pub fn new(pin: u16) -> Self {
        Self {
            pin,
            homing: false,
            trigger_on_high: true,
            stage: Stage::Armed,
            sample_time: 0,
            sample_count: 0,
            trigger_count: 0,
            rest_time: 0,
            next_wake: 0,
            trsync_oid: 0,
            trigger_reason: 0,
            last_pin_value: false,
        }
    }

    /// `endstop_home`: arms the oversampling state machine. Returns the
    /// wake time to schedule the endstop timer at.
    #[allow(clippy::too_many_arguments)]
    pub fn home(
        &mut self,
        clock: u32,
        sample_ticks: u32,
        sample_count: u8,
        rest_ticks: u32,
        trigger_on_high: bool,
        trsync_oid: u16,
        trigger_reason: u8,
    ) -> u32 {
        self.homing = true;
        self.trigger_on_high = trigger_on_high;
        self.sample_time = sample_ticks;
        self.sample_count = sample_count;
        self.trigger_count = sample_count;
        self.rest_time = rest_ticks;
        self.trsync_oid = trsync_oid;
        self.trigger_reason = trigger_reason;
        self.stage = Stage::Armed;
        self.next_wake = clock;
        clock
    }

    pub fn trsync_oid(&self) -> u16 {
        self.trsync_oid
    }

    /// `trsync` is the trsync object named by this endstop's `trsync_oid`;
    /// the caller (dispatch.rs, which owns every registry) resolves it.
    pub fn on_timer(
        &mut self,
        wake_time: u32,
        gpio: &mut impl GpioDriver,
        trsync: &mut Trsync,
    ) -> Result<(TimerOutcome, bool), HalError> {
        let sample = gpio.read_input(self.pin)?;
        self.last_pin_value = sample;
        let matched = sample == self.trigger_on_high;

        match self.stage {
            Stage::Armed => {
                if matched {
                    self.stage = Stage::Oversampling;
                    self.trigger_count = self.sample_count.saturating_sub(1);
                    self.next_wake = wake_time.wrapping_add(self.rest_time);
                    if self.trigger_count == 0 {
                        self.fire(trsync);
                        return Ok((TimerOutcome::Done, true));
                    }
                    Ok((TimerOutcome::Reschedule(wake_time.wrapping_add(self.sample_time)), false))
                } else {
                    let next = wake_time.wrapping_add(self.rest_time);
                    Ok((TimerOutcome::Reschedule(next), false))
                }
            }
            Stage::Oversampling => {
                if matched {
                    self.trigger_count -= 1;
                    if self.trigger_count == 0 {
                        self.fire(trsync);
                        return Ok((TimerOutcome::Done, true));
                    }
                    Ok((TimerOutcome::Reschedule(wake_time.wrapping_add(self.sample_time)), false))
                } else {
                    self.stage = Stage::Armed;
                    self.trigger_count = self.sample_count;
                    Ok((TimerOutcome::Reschedule(self.next_wake), false))
                }
            }
        }
    }

    fn fire(&mut self, trsync: &mut Trsync) {
        self.homing = false;
        trsync.do_trigger(self.trigger_reason);
    }

    pub fn query_state(&self) -> EndstopSnapshot {
        EndstopSnapshot { homing: self.homing, pin_value: self.last_pin_value }
    }

    pub fn shutdown(&mut self) {
        self.homing = false;
        self.stage = Stage::Armed;
    }
}

pub fn timer_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::Endstop, oid)
}

pub fn arm<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, timer_token(oid));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGpio(bool);
    impl GpioDriver for FixedGpio {
        fn configure_output(&mut self, _pin: u16, _initial_high: bool) -> Result<(), HalError> {
            Ok(())
        }
        fn configure_input(&mut self, _pin: u16, _pull_up: bool) -> Result<(), HalError> {
            Ok(())
        }
        fn set_output(&mut self, _pin: u16, _high: bool) -> Result<(), HalError> {
            Ok(())
        }
        fn read_input(&mut self, _pin: u16) -> Result<bool, HalError> {
            Ok(self.0)
        }
    }

    #[test]
    fn three_consecutive_matches_trigger_trsync() {
        let mut t = Trsync::new();
        t.start(0, 0, 9);
        let mut e = Endstop::new(20);
        let mut gpio = FixedGpio(false);
        let wake = e.home(0, 1200, 3, 12000, false, 1, 7);

        let mut w = wake;
        let mut triggered = false;
        for _ in 0..3 {
            let (outcome, fired) = e.on_timer(w, &mut gpio, &mut t).unwrap();
            if fired {
                triggered = true;
            }
            w = match outcome {
                TimerOutcome::Reschedule(n) => n,
                _ => break,
            };
        }
        assert!(triggered);
        assert_eq!(t.trigger_reason(), Some(7));
    }

    #[test]
    fn a_mismatch_during_oversampling_resets_to_armed() {
        let mut t = Trsync::new();
        t.start(0, 0, 9);
        let mut e = Endstop::new(20);
        let mut gpio = FixedGpio(false);
        let wake = e.home(0, 1200, 3, 12000, false, 1, 7);
        let (outcome, fired) = e.on_timer(wake, &mut gpio, &mut t).unwrap();
        assert!(!fired);
        assert_eq!(e.stage, Stage::Oversampling);
        let w2 = match outcome { TimerOutcome::Reschedule(n) => n, _ => panic!() };

        gpio.0 = true; // mismatch: expected low, got high
        let (outcome, fired) = e.on_timer(w2, &mut gpio, &mut t).unwrap();
        assert!(!fired);
        assert_eq!(e.stage, Stage::Armed);
        assert_eq!(e.trigger_count, 3);
        let _ = outcome;
    }
}
