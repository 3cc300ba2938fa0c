//! # Stepper motor control
//!
//! The step-generation pipeline: a per-axis ring of queued moves, interval
//! ramp arithmetic, direction latching, and a backend pulse on every timer
//! fire. This is the hot path of the whole firmware — at a 12MHz tick an
//! interval of 120 is a 100kHz step rate, so the handler below has to stay
//! allocation-free and branch-light.

use crate::hal::{HalError, StepperBackend};
use crate::scheduler::{Component, Scheduler, TimerOutcome, TimerToken};
use heapless::Deque;

/// Capacity of a single stepper's move queue. The reference recommends 64;
/// the spec's floor is 16.
pub const MOVE_QUEUE_CAPACITY: usize = 64;

/// One queued move: a linear ramp of `count` pulses starting at `interval`
/// ticks apart and changing by `add` each pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperMove {
    pub interval: u32,
    pub count: u16,
    pub add: i16,
    pub direction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperError {
    QueueFull,
    Hal(HalError),
}

impl From<HalError> for StepperError {
    fn from(e: HalError) -> Self {
        StepperError::Hal(e)
    }
}

/// A single axis. Owns its move queue and position; the timer queue only
/// ever holds a [`TimerToken`] naming this stepper's `oid`, never a pointer
/// into this struct.
pub struct Stepper<B: StepperBackend> {
    backend: B,
    min_stop_interval: u32,
    position: i64,
    next_dir: bool,
    queue: Deque<StepperMove, MOVE_QUEUE_CAPACITY>,
    cur_interval: u32,
    cur_count: u16,
    cur_add: i16,
    cur_direction: bool,
    next_step_clock: u32,
    clock_set: bool,
    last_step_time: u32,
}

impl<B: StepperBackend> Stepper<B> {
    pub fn new(backend: B, invert_step: bool, invert_dir: bool, min_stop_interval: u32) -> Result<Self, StepperError> {
        let mut backend = backend;
        backend.init(invert_step, invert_dir)?;
        Ok(Self {
            backend,
            min_stop_interval,
            position: 0,
            next_dir: false,
            queue: Deque::new(),
            cur_interval: 0,
            cur_count: 0,
            cur_add: 0,
            cur_direction: false,
            next_step_clock: 0,
            clock_set: false,
            last_step_time: 0,
        })
    }

    /// `true` iff no move is currently loaded (the hot timer is not armed).
    pub fn is_idle(&self) -> bool {
        self.cur_count == 0
    }

    /// Stamps the direction to apply to the *next* enqueued move.
    pub fn set_next_step_dir(&mut self, forward: bool) {
        self.next_dir = forward;
    }

    /// Re-anchors the step clock. If a move is in flight, returns the wake
    /// time the caller must (re-)arm the step timer at.
    pub fn reset_step_clock(&mut self, clock: u32) -> Option<u32> {
        self.next_step_clock = clock;
        self.clock_set = true;
        self.last_step_time = clock;
        if !self.is_idle() {
            Some(self.last_step_time.wrapping_add(self.cur_interval))
        } else {
            None
        }
    }

    /// Appends a move. If the stepper was idle, loads it immediately and
    /// returns the wake time to (re-)schedule the step timer at.
    pub fn queue_step(&mut self, interval: u32, count: u16, add: i16) -> Result<Option<u32>, StepperError> {
        let interval = interval.max(self.min_stop_interval);
        let was_idle = self.is_idle() && self.queue.is_empty();
        self.queue
            .push_back(StepperMove { interval, count, add, direction: self.next_dir })
            .map_err(|_| StepperError::QueueFull)?;
        if was_idle {
            Ok(Some(self.load_next_move()?))
        } else {
            Ok(None)
        }
    }

    /// Pops the queue head into the current fields and commands the
    /// backend. Returns the wake time the step timer must be armed at.
    fn load_next_move(&mut self) -> Result<u32, StepperError> {
        let mv = self.queue.pop_front().expect("load_next_move called on empty queue");
        self.backend.set_direction(mv.direction)?;
        self.backend.set_step_interval(mv.interval)?;
        self.cur_interval = mv.interval;
        self.cur_count = mv.count;
        self.cur_add = mv.add;
        self.cur_direction = mv.direction;

        if self.clock_set {
            self.last_step_time = self.next_step_clock;
            self.clock_set = false;
        }
        Ok(self.last_step_time.wrapping_add(self.cur_interval))
    }

    /// The per-pulse timer handler. `wake_time` is the scheduled fire time
    /// of the timer that just fired (not the current clock reading).
    pub fn on_step_timer(&mut self, wake_time: u32) -> Result<TimerOutcome, StepperError> {
        if self.is_idle() {
            return Ok(TimerOutcome::Done);
        }

        self.last_step_time = wake_time;
        self.backend.step()?;
        self.position += if self.cur_direction { 1 } else { -1 };

        self.cur_count -= 1;
        if self.cur_add != 0 {
            self.cur_interval = interval_after_add(self.cur_interval, self.cur_add, self.min_stop_interval);
        }

        if self.cur_count == 0 {
            if self.queue.is_empty() {
                return Ok(TimerOutcome::Done);
            }
            let next_wake = self.load_next_move()?;
            Ok(TimerOutcome::Reschedule(next_wake))
        } else {
            let next_wake = self.last_step_time.wrapping_add(self.cur_interval);
            Ok(TimerOutcome::Reschedule(next_wake))
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Moves still queued behind the in-flight one. Reported in `get_config`
    /// as a coarse "is the host about to starve the pipe" signal.
    pub fn queued_moves(&self) -> u16 {
        self.queue.len() as u16
    }

    /// Clears the move queue and halts on a trsync trigger. The in-flight
    /// move (if any) is abandoned; the next timer fire, if one is still
    /// scheduled, observes `is_idle()` (zeroed `cur_count`) and returns
    /// `Done`. A later `reset_step_clock` + `queue_step` starts a fresh move
    /// normally, since nothing here latches past the current move.
    pub fn stop_on_trigger(&mut self) {
        self.cur_count = 0;
        self.queue.clear();
        let _ = self.backend.stop();
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Applies `add` to `interval`, saturating at `min_stop_interval` below.
/// `add` ramps the interval down (accelerating) or up (decelerating) one
/// pulse at a time.
fn interval_after_add(interval: u32, add: i16, min_stop_interval: u32) -> u32 {
    let next = if add >= 0 {
        interval.saturating_add(add as u32)
    } else {
        interval.saturating_sub((-add) as u32)
    };
    next.max(min_stop_interval)
}

pub fn timer_token(oid: u16) -> TimerToken {
    TimerToken::new(Component::Stepper, oid)
}

/// Schedules (or re-schedules) a stepper's step timer on `scheduler` for
/// `wake_time`. Thin wrapper kept next to the stepper type so dispatch.rs
/// doesn't need to import the scheduler's token-construction details.
pub fn arm<const N: usize>(scheduler: &mut Scheduler<N>, oid: u16, wake_time: u32) {
    let _ = scheduler.schedule(wake_time, timer_token(oid));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockBackend {
        steps: u32,
        direction: Option<bool>,
        interval: Option<u32>,
        stopped: bool,
    }

    impl StepperBackend for MockBackend {
        fn new(_step_pin: u16, _dir_pin: u16) -> Self {
            Self::default()
        }
        fn init(&mut self, _invert_step: bool, _invert_dir: bool) -> Result<(), HalError> {
            Ok(())
        }
        fn step(&mut self) -> Result<(), HalError> {
            self.steps += 1;
            Ok(())
        }
        fn set_direction(&mut self, forward: bool) -> Result<(), HalError> {
            self.direction = Some(forward);
            Ok(())
        }
        fn set_step_interval(&mut self, ticks: u32) -> Result<(), HalError> {
            self.interval = Some(ticks);
            Ok(())
        }
        fn stop(&mut self) -> Result<(), HalError> {
            self.stopped = true;
            Ok(())
        }
        fn name(&self) -> &'static str {
            "mock"
        }
    }

    fn run_move(s: &mut Stepper<MockBackend>, mut wake: u32) -> (heapless::Vec<u32, 16>, i64) {
        let mut fire_times = heapless::Vec::new();
        loop {
            fire_times.push(wake).unwrap();
            match s.on_step_timer(wake).unwrap() {
                TimerOutcome::Reschedule(next) => wake = next,
                _ => break,
            }
        }
        (fire_times, s.position())
    }

    #[test]
    fn interval_ramp_matches_the_spec_example() {
        let mut s = Stepper::new(MockBackend::default(), false, false, 1).unwrap();
        s.set_next_step_dir(true);
        let l = 100_000u32;
        s.reset_step_clock(l);
        let wake = s.queue_step(1000, 4, 10).unwrap().unwrap();
        assert_eq!(wake, l + 1000);
        let (fire_times, position) = run_move(&mut s, wake);
        assert_eq!(fire_times.as_slice(), [l + 1000, l + 2010, l + 3030, l + 4060]);
        assert_eq!(position, 4);
    }

    #[test]
    fn min_interval_clamp_applies_at_queue_time() {
        let mut s = Stepper::new(MockBackend::default(), false, false, 50).unwrap();
        s.reset_step_clock(0);
        let wake = s.queue_step(0, 1, 0).unwrap().unwrap();
        assert_eq!(wake, 50);
    }

    #[test]
    fn stop_on_trigger_empties_the_queue_and_halts() {
        let mut s = Stepper::new(MockBackend::default(), false, false, 1).unwrap();
        s.reset_step_clock(0);
        s.queue_step(100, 5, 0).unwrap();
        s.queue_step(100, 5, 0).unwrap();
        s.stop_on_trigger();
        assert!(s.is_idle());
        assert_eq!(s.on_step_timer(100).unwrap(), TimerOutcome::Done);
    }

    #[test]
    fn queue_full_is_reported_as_a_fatal_host_error() {
        let mut s = Stepper::new(MockBackend::default(), false, false, 1).unwrap();
        for _ in 0..MOVE_QUEUE_CAPACITY {
            s.queue_step(100, 1, 0).unwrap();
        }
        assert!(matches!(s.queue_step(100, 1, 0), Err(StepperError::QueueFull)));
    }
}
