//! Instruction timer: converts block timing cost into wall-clock pacing.

use std::time::{Duration, Instant};

use log::trace;

use crate::cpu::block::TimingResult;
use crate::cpu::CoreError;
use crate::runner::CancellationToken;

/// Pacing strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerMode {
    /// No pacing; runs as fast as possible. Used for tests and throughput
    /// benchmarking.
    Null,
    /// Delay = machine cycles / MHz.
    MachineCycles { mhz: f64 },
    /// Delay = throttling states / MHz. Four times finer than machine
    /// cycles; preferred when the platform clock provides it.
    ThrottlingStates { mhz: f64 },
}

/// Callback invoked on every sync with the cost just retired, so peripherals
/// (frame pacing, serial clocks) can derive their own time from CPU time
/// rather than wall time.
pub type SyncListener = Box<dyn FnMut(TimingResult) + Send>;

/// Sleeps below this are deferred; short blocks batch into one longer sleep
/// once the accumulated virtual clock runs far enough ahead.
const MIN_SLEEP: Duration = Duration::from_micros(500);

pub struct InstructionTimer {
    mode: TimerMode,
    epoch: Instant,
    /// Virtual nanoseconds retired since the epoch.
    virtual_nanos: f64,
    listeners: Vec<SyncListener>,
}

impl InstructionTimer {
    pub fn new(mode: TimerMode) -> Self {
        Self {
            mode,
            epoch: Instant::now(),
            virtual_nanos: 0.0,
            listeners: Vec::new(),
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn add_sync_listener(&mut self, listener: SyncListener) {
        self.listeners.push(listener);
    }

    /// Reset the wall-clock epoch; called when the driver loop starts so
    /// accumulated idle time is not paid back as a burst.
    pub fn restart(&mut self) {
        self.epoch = Instant::now();
        self.virtual_nanos = 0.0;
    }

    /// Suspend until wall-clock time catches up with the virtual time the
    /// cost represents. Cancellation aborts the wait.
    pub fn sync(&mut self, cost: TimingResult, token: &CancellationToken) -> Result<(), CoreError> {
        let nanos = match self.mode {
            TimerMode::Null => 0.0,
            TimerMode::MachineCycles { mhz } => cost.machine_cycles as f64 * 1_000.0 / mhz,
            TimerMode::ThrottlingStates { mhz } => cost.throttling_states as f64 * 1_000.0 / mhz,
        };
        self.virtual_nanos += nanos;

        if nanos > 0.0 {
            let target = self.epoch + Duration::from_nanos(self.virtual_nanos as u64);
            let now = Instant::now();
            if target > now {
                let wait = target - now;
                if wait >= MIN_SLEEP {
                    trace!("pacing {}us", wait.as_micros());
                    if token.wait_timeout(wait) {
                        return Err(CoreError::Cancelled);
                    }
                }
            }
        }

        for listener in &mut self.listeners {
            listener(cost);
        }
        Ok(())
    }
}
