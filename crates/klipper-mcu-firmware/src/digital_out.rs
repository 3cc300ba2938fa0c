//! # DigitalOut scheduling
//!
//! A scheduled on/off output with an optional software-PWM mode
//! (`on_ticks + off_ticks == cycle_ticks`) and a max-duration watchdog that
//! forces the pin back to its default state if it's left non-default too
//! long.

use crate::hal::{GpioDriver, HalError};
use crate::scheduler::{Component, Scheduler, TimerOutcome, TimerToken};

// A tiny bitflags stand-in: the teacher's codebase has no bitflags
// dependency, and the set here is small enough that a hand-rolled const
// newtype reads cleaner than adding one just for four bits.
macro_rules! bitflags_lite {
    (struct $name:ident: $repr:ty { $(const $flag:ident = $val:expr;)* }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        struct $name($repr);
        impl $name {
            $(const $flag: $repr = $val;)*
            fn contains(self, bit: $repr) -> bool { self.0 & bit != 0 }
            fn set_bit(&mut self, bit: $repr, on: bool) {
                if on { self.0 |= bit } else { self.0 &= !bit }
            }
        }
    };
}

bitflags_lite! {
    struct Flags: u8 {
        const ON = 0b0001;
        const TOGGLING = 0b0010;
        const CHECK_END = 0b0100;
        const DEFAULT_ON = 0b1000;
    }
}

pub struct DigitalOut {
    oid: u16,
    pin: u16,
    flags: Flags,
    on_ticks: u32,
    off_ticks: u32,
    cycle_ticks: u32,
    end_time: u32,
    max_duration: u32,
}

impl DigitalOut {
    pub fn new(oid: u16, pin: u16, default_on: bool) -> Self {
        let mut flags = Flags::default();
        flags.set_bit(Flags::DEFAULT_ON, default_on);
        Self { oid, pin, flags, on_ticks: 0, off_ticks: 0, cycle_ticks: 0, end_time: 0, max_duration: 0 }
    }

    /// `config_digital_out`: drives the pin to its initial value immediately
    /// (no timer involved).
    pub fn configure(&mut self, gpio: &mut impl GpioDriver, value: bool, max_duration: u32) -> Result<(), HalError> {
        self.max_duration = max_duration;
        gpio.configure_output(self.pin, value)?;
        self.flags.set_bit(Flags::ON, value);
        Ok(())
    }

    /// `queue_digital_out(oid, clock, on_ticks)`: schedules a load event at
    /// `clock` that turns the pin on for `on_ticks` then back off.
    pub fn queue(&mut self, on_ticks: u32) -> u32 {
        self.on_ticks = on_ticks;
        self.flags.set_bit(Flags::CHECK_END, self.max_duration != 0);
        0 // caller supplies the wake clock explicitly; this records duration only
    }

    /// `update_digital_out(oid, value)`: applies a value immediately,
    /// bypassing the scheduled load/toggle path entirely.
    pub fn set_immediate(&mut self, gpio: &mut impl GpioDriver, value: bool) -> Result<(), HalError> {
        gpio.set_output(self.pin, value)?;
        self.flags.set_bit(Flags::ON, value);
        Ok(())
    }

    pub fn set_pwm_cycle(&mut self, cycle_ticks: u32) {
        self.cycle_ticks = cycle_ticks;
        self.off_ticks = self.cycle_ticks.saturating_sub(self.on_ticks);
        self.flags.set_bit(Flags::TOGGLING, self.cycle_ticks != 0);
    }

    /// `load_event`: apply the scheduled value and arm the matching
    /// follow-up (`toggle_event` if PWMing, `end_event` if a max-duration
    /// watchdog is active, otherwise nothing further).
    pub fn load_event(&mut self, gpio: &mut impl GpioDriver, now: u32) -> Result<TimerOutcome, HalError> {
        gpio.set_output(self.pin, true)?;
        self.flags.set_bit(Flags::ON, true);
        if self.flags.contains(Flags::TOGGLING) {
            Ok(TimerOutcome::RescheduleAs(toggle_token(self.oid), now.wrapping_add(self.on_ticks)))
        } else if self.flags.contains(Flags::CHECK_END) {
            self.end_time = now.wrapping_add(self.max_duration);
            Ok(TimerOutcome::RescheduleAs(end_token(self.oid), self.end_time))
        } else {
            Ok(TimerOutcome::Done)
        }
    }

    /// `toggle_event`: flips the pin and reschedules by whichever of
    /// `on_ticks`/`off_ticks` now applies.
    pub fn toggle_event(&mut self, gpio: &mut impl GpioDriver, now: u32) -> Result<TimerOutcome, HalError> {
        let turning_on = !self.flags.contains(Flags::ON);
        gpio.set_output(self.pin, turning_on)?;
        self.flags.set_bit(Flags::ON, turning_on);
        let delta = if turning_on { self.on_ticks } else { self.off_ticks };
        Ok(TimerOutcome::RescheduleAs(toggle_token(self.oid), now.wrapping_add(delta)))
    }

    /// `end_event`: drives the pin to its default state and clears the
    /// watchdog flag.
    pub fn end_event(&mut self, gpio: &mut impl GpioDriver) -> Result<TimerOutcome, HalError> {
        let default_on = self.flags.contains(Flags::DEFAULT_ON);
        gpio.set_output(self.pin, default_on)?;
        self.flags.set_bit(Flags::ON, default_on);
        self.flags.set_bit(Flags::CHECK_END, false);
        Ok(TimerOutcome::Done)
    }

    pub fn shutdown_to_default(&mut self, gpio: &mut impl GpioDriver) {
        let default_on = self.flags.contains(Flags::DEFAULT_ON);
        let _ = gpio.set_output(self.pin, default_on);
        self.flags = Flags::default();
        self.flags.set_bit(Flags::DEFAULT_ON, default_on);
        self.flags.set_bit(Flags::ON, default_on);
    }
}

pub fn load_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::DigitalOutLoad, oid)
}

pub fn toggle_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::DigitalOutToggle, oid)
}

pub fn end_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::DigitalOutEnd, oid)
}

pub fn arm_load<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, load_token(oid));
}

pub fn arm_toggle<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, toggle_token(oid));
}

pub fn arm_end<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, end_token(oid));
}
