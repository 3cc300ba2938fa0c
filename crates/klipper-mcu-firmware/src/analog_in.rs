//! # ADC sampler (AnalogIn)
//!
//! Each configured channel runs a small state machine driven entirely by
//! timer fires: accumulate `sample_count` raw reads, fold them into a
//! 16-bit-wrapped sum, range-check it, and hand the result to the
//! cooperative report task the main loop drains every iteration.

use crate::hal::{AdcDriver, HalError};
use crate::scheduler::{Component, Scheduler, TimerOutcome, TimerToken};
use crate::shutdown::ShutdownCause;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Sampling,
    ReportPending,
}

pub struct AnalogIn {
    pin: u16,
    state: State,
    sample_time: u32,
    sample_count: u8,
    cur_sample: u8,
    accum_value: u32,
    rest_time: u32,
    next_begin_time: u32,
    min: u16,
    max: u16,
    range_check_count: u8,
    invalid_count: u8,
    pending_value: u16,
    pending_clock: u32,
}

impl AnalogIn {
    pub fn new(pin: u16) -> Self {
        Self {
            pin,
            state: State::Idle,
            sample_time: 0,
            sample_count: 0,
            cur_sample: 0,
            accum_value: 0,
            rest_time: 0,
            next_begin_time: 0,
            min: 0,
            max: u16::MAX,
            range_check_count: 0,
            invalid_count: 0,
            pending_value: 0,
            pending_clock: 0,
        }
    }

    /// `query_analog_in`. `sample_count == 0` disarms sampling. Returns the
    /// wake time to arm the sampler timer at, if sampling was armed.
    #[allow(clippy::too_many_arguments)]
    pub fn query(
        &mut self,
        clock: u32,
        sample_ticks: u32,
        sample_count: u8,
        rest_ticks: u32,
        min: u16,
        max: u16,
        range_check_count: u8,
    ) -> Option<u32> {
        self.sample_time = sample_ticks;
        self.sample_count = sample_count;
        self.rest_time = rest_ticks;
        self.min = min;
        self.max = max;
        self.range_check_count = range_check_count;
        self.invalid_count = 0;

        if sample_count == 0 {
            self.state = State::Idle;
            return None;
        }
        self.cur_sample = 0;
        self.accum_value = 0;
        self.next_begin_time = clock;
        self.state = State::Sampling;
        Some(clock)
    }

    /// Sampler timer fire. Returns the next action and, on the final sample
    /// of a batch, whether the reading was out of range badly enough to
    /// demand a shutdown.
    pub fn on_sample_timer(
        &mut self,
        wake_time: u32,
        adc: &mut impl AdcDriver,
    ) -> (TimerOutcome, Option<ShutdownCause>) {
        if self.state != State::Sampling {
            return (TimerOutcome::Done, None);
        }

        let sample = match adc.read_raw(self.pin) {
            Ok(v) => v,
            Err(HalError::InvalidIndex | HalError::BusError | HalError::OutOfResources) => {
                self.state = State::Idle;
                return (TimerOutcome::Done, None);
            }
        };
        self.accum_value = self.accum_value.wrapping_add(sample as u32);
        self.cur_sample += 1;

        if self.cur_sample < self.sample_count {
            let next = wake_time.wrapping_add(self.sample_time);
            return (TimerOutcome::Reschedule(next), None);
        }

        let sum = (self.accum_value & 0xffff) as u16;
        let cause = self.range_check(sum);
        self.next_begin_time = self.next_begin_time.wrapping_add(self.rest_time);
        self.pending_value = sum;
        self.pending_clock = self.next_begin_time;
        self.state = State::ReportPending;
        (TimerOutcome::Reschedule(self.next_begin_time), cause)
    }

    fn range_check(&mut self, sum: u16) -> Option<ShutdownCause> {
        if sum < self.min || sum > self.max {
            self.invalid_count = self.invalid_count.saturating_add(1);
            if self.range_check_count == 0 || self.invalid_count >= self.range_check_count {
                self.invalid_count = 0;
                return Some(ShutdownCause::AdcOutOfRange);
            }
        } else {
            self.invalid_count = 0;
        }
        None
    }

    /// Cooperative report-task drain: if a result is pending, flips back to
    /// `Sampling` (ready for the next batch, matching the timer already
    /// rescheduled by `on_sample_timer`) and returns the value to emit as
    /// `analog_in_state`.
    pub fn take_pending_report(&mut self) -> Option<(u32, u16)> {
        if self.state != State::ReportPending {
            return None;
        }
        self.state = State::Sampling;
        self.cur_sample = 0;
        self.accum_value = 0;
        Some((self.pending_clock, self.pending_value))
    }

    pub fn shutdown(&mut self) {
        self.state = State::Idle;
    }
}

pub fn timer_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::AnalogIn, oid)
}

pub fn arm<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, timer_token(oid));
}
