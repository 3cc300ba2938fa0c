//! # Scheduler
//!
//! A single global ascending-ordered timer queue. Every periodic activity in
//! the core (step pulses, ADC sampling, endstop oversampling, PWM
//! transitions, trsync timeouts) is a timer on this queue; there is no other
//! source of deferred work.
//!
//! Timers are *not* heap nodes: a [`TimerToken`] is an opaque back-pointer
//! (component tag + oid) the owner already stores, so cancelling or
//! re-scheduling never touches storage the scheduler itself doesn't already
//! hold in its fixed-capacity queue. `process_timers` never allocates.

use heapless::Vec;

/// Ticks are interpreted circularly: `a` is before `b` iff `(a - b)` viewed
/// as signed is negative. Any ordering comparison in this module goes
/// through this function.
pub fn is_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

fn is_due(wake_time: u32, now: u32) -> bool {
    !is_before(now, wake_time)
}

/// Which peripheral kind a [`TimerToken`] belongs to. Lets a single
/// `process_timers` dispatch closure route to the right module without the
/// scheduler knowing anything about peripheral types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Component {
    Stepper,
    AnalogIn,
    DigitalOutLoad,
    DigitalOutToggle,
    DigitalOutEnd,
    PwmLoad,
    PwmEnd,
    Endstop,
    TrsyncReport,
    TrsyncExpire,
}

/// An opaque handle identifying a timer's owner: a component tag plus the
/// oid the host assigned it. Replaces the intrusive-pointer-to-owner pattern
/// with a value the owner already carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    component: Component,
    oid: u16,
}

impl TimerToken {
    pub const fn new(component: Component, oid: u16) -> Self {
        Self { component, oid }
    }

    pub fn component(self) -> Component {
        self.component
    }

    pub fn oid(self) -> u16 {
        self.oid
    }
}

/// What a timer handler tells the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Done,
    /// Fire again under the same token.
    Reschedule(u32),
    /// Fire again under a different token: digital-out and PWM chain
    /// load/toggle/end through distinct `Component` variants rather than a
    /// single recurring one.
    RescheduleAs(TimerToken, u32),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    wake_time: u32,
    token: TimerToken,
}

/// Raised when [`Scheduler::process_timers`] finds a timer scheduled too far
/// in the past to trust; the caller must treat this as a fatal fault.
#[derive(Debug, Clone, Copy)]
pub struct PastDeadline {
    pub token: TimerToken,
    pub behind_ticks: u32,
}

/// The ordered timer queue. `N` bounds the number of timers simultaneously
/// in flight across every peripheral; a full queue rejects new schedules
/// rather than growing.
pub struct Scheduler<const N: usize> {
    queue: Vec<Entry, N>,
    past_threshold: u32,
}

/// Default "rescheduled timer in the past" threshold: 100ms at a 1MHz tick.
/// Boards running at a different `CLOCK_FREQ` should scale this.
pub const DEFAULT_PAST_THRESHOLD_1MHZ: u32 = 100_000;

impl<const N: usize> Scheduler<N> {
    pub fn new(past_threshold: u32) -> Self {
        Self { queue: Vec::new(), past_threshold }
    }

    /// True if nothing is queued. Used by tests and by shutdown cascades
    /// that want to confirm every timer was drained.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn insert_sorted(&mut self, entry: Entry) -> Result<(), TimerToken> {
        let idx = self
            .queue
            .iter()
            .position(|e| is_before(entry.wake_time, e.wake_time))
            .unwrap_or(self.queue.len());
        self.queue.insert(idx, entry).map_err(|_| entry.token)
    }

    fn remove_token(&mut self, token: TimerToken) {
        if let Some(pos) = self.queue.iter().position(|e| e.token == token) {
            self.queue.remove(pos);
        }
    }

    /// Schedules `token` to fire at `wake_time`, replacing any existing
    /// schedule for the same token. Interrupt-safe: callable from ISR
    /// context per §5.
    pub fn schedule(&mut self, wake_time: u32, token: TimerToken) -> Result<(), TimerToken> {
        critical_section::with(|_cs| {
            self.remove_token(token);
            self.insert_sorted(Entry { wake_time, token })
        })
    }

    /// Cancels `token` if it is currently queued; a no-op otherwise.
    pub fn cancel(&mut self, token: TimerToken) {
        critical_section::with(|_cs| self.remove_token(token));
    }

    /// Drains every timer that is due as of `now`, invoking `dispatch` for
    /// each. Must only be called from main-loop context (never from an
    /// ISR). Re-reads `now` via `refresh_now` after every handler, since
    /// handlers may block briefly.
    ///
    /// Stops immediately (without dispatching the rest of the batch) if a
    /// popped timer is more than `past_threshold` ticks overdue, reporting
    /// it via the returned [`PastDeadline`].
    pub fn process_timers(
        &mut self,
        mut refresh_now: impl FnMut() -> u32,
        mut dispatch: impl FnMut(TimerToken, u32) -> TimerOutcome,
    ) -> Option<PastDeadline> {
        loop {
            let now = refresh_now();
            let due = critical_section::with(|_cs| {
                match self.queue.first() {
                    Some(e) if is_due(e.wake_time, now) => Some(self.queue.remove(0)),
                    _ => None,
                }
            });
            let Some(entry) = due else { return None };

            let behind = now.wrapping_sub(entry.wake_time);
            if behind > self.past_threshold {
                return Some(PastDeadline { token: entry.token, behind_ticks: behind });
            }

            match dispatch(entry.token, entry.wake_time) {
                TimerOutcome::Done => {}
                TimerOutcome::Reschedule(next) => {
                    critical_section::with(|_cs| {
                        let _ = self.insert_sorted(Entry { wake_time: next, token: entry.token });
                    });
                }
                TimerOutcome::RescheduleAs(token, next) => {
                    critical_section::with(|_cs| {
                        let _ = self.insert_sorted(Entry { wake_time: next, token });
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(oid: u16) -> TimerToken {
        TimerToken::new(Component::Stepper, oid)
    }

    #[test]
    fn pops_in_ascending_wake_time_order_regardless_of_insertion_order() {
        let mut s: Scheduler<8> = Scheduler::new(DEFAULT_PAST_THRESHOLD_1MHZ);
        s.schedule(300, tok(2)).unwrap();
        s.schedule(100, tok(0)).unwrap();
        s.schedule(200, tok(1)).unwrap();

        let mut now = 1000u32;
        let mut order = Vec::<u16, 8>::new();
        loop {
            let stop_now = now;
            let result = s.process_timers(
                || stop_now,
                |token, _wake| {
                    order.push(token.oid()).unwrap();
                    TimerOutcome::Done
                },
            );
            assert!(result.is_none());
            if s.is_empty() {
                break;
            }
            now += 1;
        }
        assert_eq!(order.as_slice(), [0, 1, 2]);
    }

    #[test]
    fn wraparound_fires_near_future_before_far_past() {
        let mut s: Scheduler<8> = Scheduler::new(DEFAULT_PAST_THRESHOLD_1MHZ);
        let now: u32 = 0;
        s.schedule(now.wrapping_add(10), tok(0)).unwrap();
        s.schedule(now.wrapping_sub(0x7FFF_FF00), tok(1)).unwrap();

        let mut fired = None;
        s.process_timers(
            || now.wrapping_add(10),
            |token, _wake| {
                fired = Some(token.oid());
                TimerOutcome::Done
            },
        );
        assert_eq!(fired, Some(0));
    }

    #[test]
    fn past_threshold_fault_stops_the_batch() {
        let mut s: Scheduler<8> = Scheduler::new(1000);
        s.schedule(0, tok(5)).unwrap();
        s.schedule(5, tok(6)).unwrap();

        let mut dispatched = 0;
        let fault = s.process_timers(|| 5000, |_token, _wake| {
            dispatched += 1;
            TimerOutcome::Done
        });
        assert_eq!(dispatched, 0);
        let fault = fault.expect("expected a past-deadline fault");
        assert_eq!(fault.token.oid(), 5);
        assert!(!s.is_empty(), "second timer must remain undispatched");
    }

    #[test]
    fn reschedule_reinserts_in_order() {
        let mut s: Scheduler<8> = Scheduler::new(DEFAULT_PAST_THRESHOLD_1MHZ);
        s.schedule(100, tok(0)).unwrap();
        s.schedule(150, tok(1)).unwrap();

        let mut calls = 0u32;
        s.process_timers(
            || 100,
            |token, _wake| {
                calls += 1;
                if token.oid() == 0 && calls == 1 {
                    TimerOutcome::Reschedule(200)
                } else {
                    TimerOutcome::Done
                }
            },
        );
        // first pass: oid 0 fires (reschedules to 200), then oid 1 fires and
        // is done. oid 0's rescheduled timer should still be pending.
        assert!(!s.is_empty());
    }

    #[test]
    fn cancel_removes_a_pending_timer() {
        let mut s: Scheduler<8> = Scheduler::new(DEFAULT_PAST_THRESHOLD_1MHZ);
        s.schedule(100, tok(0)).unwrap();
        s.cancel(tok(0));
        assert!(s.is_empty());
    }
}
