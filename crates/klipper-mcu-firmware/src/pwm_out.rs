//! # HardwarePWM scheduling
//!
//! Same shape as [`crate::digital_out`] but delegates duty cycle to the PWM
//! HAL instead of bit-banging a GPIO; values are `0..=PWM_MAX` (255).

use crate::hal::{HalError, PwmDriver};
use crate::scheduler::{Component, Scheduler, TimerOutcome, TimerToken};

pub struct HardwarePwm {
    oid: u16,
    pin: u16,
    value: u16,
    default_value: u16,
    max_duration: u32,
    end_time: u32,
    armed_watchdog: bool,
    queued_value: u16,
}

impl HardwarePwm {
    pub fn new(oid: u16, pin: u16) -> Self {
        Self {
            oid,
            pin,
            value: 0,
            default_value: 0,
            max_duration: 0,
            end_time: 0,
            armed_watchdog: false,
            queued_value: 0,
        }
    }

    /// `queue_pwm_out(oid, clock, value)`: remembers `value` for the load
    /// event the caller schedules at `clock`.
    pub fn queue(&mut self, value: u16) {
        self.queued_value = value;
    }

    pub fn configure(
        &mut self,
        pwm: &mut impl PwmDriver,
        cycle_ticks: u32,
        value: u16,
        default_value: u16,
        max_duration: u32,
    ) -> Result<(), HalError> {
        self.default_value = default_value;
        self.max_duration = max_duration;
        pwm.configure(self.pin, cycle_ticks)?;
        pwm.set_duty(self.pin, value)?;
        self.value = value;
        Ok(())
    }

    /// `set_pwm_out`: applies a duty value immediately, arming the
    /// max-duration watchdog if one is configured.
    pub fn set(&mut self, pwm: &mut impl PwmDriver, now: u32, value: u16) -> Result<Option<u32>, HalError> {
        pwm.set_duty(self.pin, value)?;
        self.value = value;
        if self.max_duration != 0 && value != self.default_value {
            self.armed_watchdog = true;
            self.end_time = now.wrapping_add(self.max_duration);
            Ok(Some(self.end_time))
        } else {
            self.armed_watchdog = false;
            Ok(None)
        }
    }

    /// Timer fire for a value enqueued via [`HardwarePwm::queue`]; dispatch.rs
    /// arms the timer at the target clock and calls this from the handler.
    pub fn load_event(&mut self, pwm: &mut impl PwmDriver, now: u32) -> Result<TimerOutcome, HalError> {
        let value = self.queued_value;
        match self.set(pwm, now, value)? {
            Some(end) => Ok(TimerOutcome::RescheduleAs(end_token(self.oid), end)),
            None => Ok(TimerOutcome::Done),
        }
    }

    pub fn end_event(&mut self, pwm: &mut impl PwmDriver) -> Result<TimerOutcome, HalError> {
        pwm.set_duty(self.pin, self.default_value)?;
        self.value = self.default_value;
        self.armed_watchdog = false;
        Ok(TimerOutcome::Done)
    }

    pub fn shutdown_to_default(&mut self, pwm: &mut impl PwmDriver) {
        let _ = pwm.set_duty(self.pin, self.default_value);
        self.value = self.default_value;
        self.armed_watchdog = false;
    }
}

pub fn load_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::PwmLoad, oid)
}

pub fn end_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::PwmEnd, oid)
}

pub fn arm_load<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, load_token(oid));
}

pub fn arm_end<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, end_token(oid));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockPwm {
        duty: u16,
    }
    impl PwmDriver for MockPwm {
        fn configure(&mut self, _pin: u16, _cycle_ticks: u32) -> Result<(), HalError> {
            Ok(())
        }
        fn set_duty(&mut self, _pin: u16, value: u16) -> Result<(), HalError> {
            self.duty = value;
            Ok(())
        }
    }

    #[test]
    fn non_default_value_arms_the_watchdog() {
        let mut p = HardwarePwm::new(0, 9);
        let mut pwm = MockPwm::default();
        p.configure(&mut pwm, 1000, 0, 0, 5000).unwrap();
        let wake = p.set(&mut pwm, 100, 200).unwrap();
        assert_eq!(wake, Some(5100));
        assert_eq!(pwm.duty, 200);
    }

    #[test]
    fn end_event_restores_default_duty() {
        let mut p = HardwarePwm::new(0, 9);
        let mut pwm = MockPwm::default();
        p.configure(&mut pwm, 1000, 0, 64, 5000).unwrap();
        p.set(&mut pwm, 0, 255).unwrap();
        p.end_event(&mut pwm).unwrap();
        assert_eq!(pwm.duty, 64);
    }
}
