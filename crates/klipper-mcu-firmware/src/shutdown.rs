//! # Shutdown, identify, reset
//!
//! `try_shutdown` and the `emergency_stop` command share one cascade: drive
//! every output to its safe default and disarm every sampler. Idempotent —
//! firing it twice (a host `emergency_stop` after an ADC range fault, say)
//! is a no-op beyond the first.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Why a shutdown cascade fired. Reported to the host via log lines and
/// available for tests; the host itself only observes `is_shutdown` through
/// `get_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    AdcOutOfRange,
    I2cError,
    SpiError,
    RescheduledTimerInPast,
    QueueOverflow,
    HostRequested,
}

impl ShutdownCause {
    pub fn message(self) -> &'static str {
        match self {
            ShutdownCause::AdcOutOfRange => "ADC out of range",
            ShutdownCause::I2cError => "I2C read/write error",
            ShutdownCause::SpiError => "SPI transfer error",
            ShutdownCause::RescheduledTimerInPast => "Rescheduled timer in the past",
            ShutdownCause::QueueOverflow => "Stepper queue overflow",
            ShutdownCause::HostRequested => "Emergency stop requested",
        }
    }
}

/// Process-wide firmware flags. All atomic: read from main-loop context,
/// written from either main-loop or ISR context (a timer handler may call
/// `try_shutdown` directly).
pub struct FirmwareState {
    is_shutdown: AtomicBool,
    reset_pending: AtomicBool,
    config_crc: AtomicU32,
}

impl FirmwareState {
    pub const fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
            reset_pending: AtomicBool::new(false),
            config_crc: AtomicU32::new(0),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// Marks shutdown active. Returns `true` the first time (the caller
    /// should run the cascade); `false` on every subsequent call.
    pub fn mark_shutdown(&self) -> bool {
        !self.is_shutdown.swap(true, Ordering::AcqRel)
    }

    pub fn config_crc(&self) -> u32 {
        self.config_crc.load(Ordering::Acquire)
    }

    pub fn set_config_crc(&self, crc: u32) {
        self.config_crc.store(crc, Ordering::Release);
    }

    /// `config_reset`/`reset`: drops every latched flag back to power-on
    /// state. The caller is responsible for re-running peripheral config
    /// from scratch afterward.
    pub fn clear_for_reset(&self) {
        self.is_shutdown.store(false, Ordering::Release);
        self.reset_pending.store(false, Ordering::Release);
        self.config_crc.store(0, Ordering::Release);
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending.load(Ordering::Acquire)
    }

    pub fn request_reset(&self) {
        self.reset_pending.store(true, Ordering::Release);
    }

    /// Consumes the pending flag: `true` at most once per `request_reset`
    /// call. The main loop uses this at the end of `poll` so it invokes the
    /// platform reset exactly once per `reset` command.
    pub fn take_reset_pending(&self) -> bool {
        self.reset_pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for FirmwareState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_shutdown_is_idempotent() {
        let state = FirmwareState::new();
        assert!(state.mark_shutdown(), "first call should report it just fired");
        assert!(!state.mark_shutdown(), "second call must be a no-op");
        assert!(state.is_shutdown());
    }

    #[test]
    fn reset_is_deferred_until_requested() {
        let state = FirmwareState::new();
        assert!(!state.reset_pending());
        state.request_reset();
        assert!(state.reset_pending());
    }
}
