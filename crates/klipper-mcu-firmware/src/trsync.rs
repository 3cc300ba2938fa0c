//! # Trigger Synchronization (trsync)
//!
//! Coordinates an N-of-anything trigger: endstops arm it, a timeout also
//! arms it, and the first trigger (whichever source gets there) fires every
//! registered callback exactly once. Subsequent triggers are no-ops.

use crate::scheduler::{Component, Scheduler, TimerOutcome, TimerToken};
use heapless::Vec;

/// Capacity for registered trigger callbacks (steppers calling
/// `stepper_stop_on_trigger`) per trsync object.
pub const MAX_SIGNALS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flags {
    can_trigger: bool,
    triggered: bool,
}

pub struct Trsync {
    flags: Flags,
    trigger_reason: Option<u8>,
    expire_reason: u8,
    report_ticks: u32,
    signals: Vec<u16, MAX_SIGNALS>,
    pending_signal_fire: Option<u8>,
    pending_report: Option<u32>,
}

impl Trsync {
    pub fn new() -> Self {
        Self {
            flags: Flags { can_trigger: false, triggered: false },
            trigger_reason: None,
            expire_reason: 0,
            report_ticks: 0,
            signals: Vec::new(),
            pending_signal_fire: None,
            pending_report: None,
        }
    }

    /// `trsync_start(oid, report_clock, report_ticks, expire_reason)`:
    /// resets state to armed. `report_clock` is handled by the caller
    /// scheduling the report timer.
    pub fn start(&mut self, _report_clock: u32, report_ticks: u32, expire_reason: u8) {
        self.flags = Flags { can_trigger: true, triggered: false };
        self.trigger_reason = None;
        self.expire_reason = expire_reason;
        self.report_ticks = report_ticks;
    }

    pub fn register_signal(&mut self, stepper_oid: u16) -> Result<(), u16> {
        self.signals.push(stepper_oid)
    }

    pub fn can_trigger(&self) -> bool {
        self.flags.can_trigger
    }

    pub fn trigger_reason(&self) -> Option<u8> {
        self.trigger_reason
    }

    /// Fires the trigger if still armed; idempotent otherwise. Records
    /// `reason` for the periodic `trsync_state` report and for
    /// `do_trigger`'s single-shot semantics.
    pub fn do_trigger(&mut self, reason: u8) {
        if !self.flags.can_trigger {
            return;
        }
        self.flags.can_trigger = false;
        self.flags.triggered = true;
        self.trigger_reason = Some(reason);
        self.pending_signal_fire = Some(reason);
    }

    /// Drains the set of stepper oids registered for this trsync's signal,
    /// clearing the pending-fire marker. `dispatch.rs` calls this once per
    /// `do_trigger` to invoke `Stepper::stop_on_trigger` on each.
    pub fn take_signal_targets(&mut self) -> Option<heapless::Vec<u16, MAX_SIGNALS>> {
        self.pending_signal_fire.take()?;
        Some(self.signals.clone())
    }

    /// Expire timer fire: triggers with `expire_reason` if still armed.
    pub fn on_expire_timer(&mut self) -> TimerOutcome {
        if self.flags.can_trigger {
            self.do_trigger(self.expire_reason);
        }
        TimerOutcome::Done
    }

    /// Report timer fire: while armed, reschedules itself every
    /// `report_ticks`; once triggered, fires one last report and stops.
    /// Either way, a `trsync_state` report is now pending for the main loop
    /// to pick up and send.
    pub fn on_report_timer(&mut self, wake_time: u32) -> TimerOutcome {
        self.pending_report = Some(wake_time);
        if self.flags.can_trigger {
            TimerOutcome::Reschedule(wake_time.wrapping_add(self.report_ticks))
        } else {
            TimerOutcome::Done
        }
    }

    /// Drains a pending `trsync_state` report, if the report timer fired
    /// since the last drain. Returns the report clock; `can_trigger()` and
    /// `trigger_reason()` supply the rest of the response fields.
    pub fn take_pending_report(&mut self) -> Option<u32> {
        self.pending_report.take()
    }
}

impl Default for Trsync {
    fn default() -> Self {
        Self::new()
    }
}

pub fn report_timer_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::TrsyncReport, oid)
}

pub fn expire_timer_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::TrsyncExpire, oid)
}

pub fn arm_report<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, report_timer_token(oid));
}

pub fn arm_expire<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, expire_timer_token(oid));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_wins_subsequent_calls_are_no_ops() {
        let mut t = Trsync::new();
        t.start(0, 1000, 5);
        t.do_trigger(7);
        assert_eq!(t.trigger_reason(), Some(7));
        assert!(!t.can_trigger());
        t.do_trigger(9);
        assert_eq!(t.trigger_reason(), Some(7));
    }

    #[test]
    fn expire_timer_fires_expire_reason_when_still_armed() {
        let mut t = Trsync::new();
        t.start(0, 1000, 5);
        let outcome = t.on_expire_timer();
        assert!(matches!(outcome, TimerOutcome::Done));
        assert_eq!(t.trigger_reason(), Some(5));
    }

    #[test]
    fn report_timer_reschedules_while_armed_and_stops_after_trigger() {
        let mut t = Trsync::new();
        t.start(0, 1000, 5);
        assert!(matches!(t.on_report_timer(0), TimerOutcome::Reschedule(1000)));
        t.do_trigger(1);
        assert!(matches!(t.on_report_timer(1000), TimerOutcome::Done));
    }

    #[test]
    fn report_timer_leaves_a_pending_report_on_every_fire() {
        let mut t = Trsync::new();
        t.start(0, 1000, 5);
        t.on_report_timer(0);
        assert_eq!(t.take_pending_report(), Some(0));
        assert!(t.take_pending_report().is_none());
        t.do_trigger(1);
        t.on_report_timer(1000);
        assert_eq!(t.take_pending_report(), Some(1000));
    }

    #[test]
    fn signal_targets_are_delivered_exactly_once() {
        let mut t = Trsync::new();
        t.start(0, 1000, 5);
        t.register_signal(3).unwrap();
        t.do_trigger(2);
        assert_eq!(t.take_signal_targets().unwrap().as_slice(), [3]);
        assert!(t.take_signal_targets().is_none());
    }
}
