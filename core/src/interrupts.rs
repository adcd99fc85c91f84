//! Interrupt manager: halt/resume state machine, pending latches, and
//! vector dispatch per interrupt mode.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::config::CpuMode;
use crate::cpu::block::TimingResult;
use crate::cpu::registers::RegisterSet;
use crate::cpu::CoreError;
use crate::mem::Mmu;
use crate::runner::CancellationToken;

/// Z80 maskable-interrupt modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterruptMode {
    /// Vector supplied directly by the interrupting device.
    #[default]
    Im0,
    /// Fixed vector 0x0038.
    Im1,
    /// Indirect: jump through the table at `(I << 8) | vector`.
    Im2,
}

#[derive(Debug, Default)]
struct PendingInterrupts {
    /// Level-held maskable latch; stays set while IFF1 is clear.
    maskable: Option<u8>,
    /// Edge-latched non-maskable interrupt.
    non_maskable: bool,
}

#[derive(Default)]
struct InterruptShared {
    pending: Mutex<PendingInterrupts>,
    wakeup: Condvar,
}

/// Cloneable handle peripherals use to raise interrupts from any thread.
#[derive(Clone)]
pub struct InterruptLine {
    shared: Arc<InterruptShared>,
}

impl InterruptLine {
    /// Raise a maskable interrupt with the device-supplied vector byte.
    /// Replaces any vector still latched from an earlier raise.
    pub fn raise(&self, vector: u8) {
        let mut pending = self.shared.pending.lock().unwrap();
        pending.maskable = Some(vector);
        self.shared.wakeup.notify_all();
    }

    pub fn raise_non_maskable(&self) {
        let mut pending = self.shared.pending.lock().unwrap();
        pending.non_maskable = true;
        self.shared.wakeup.notify_all();
    }
}

/// Owns the halt state machine and pending latches; consulted by the core
/// driver every loop iteration.
pub struct InterruptManager {
    shared: Arc<InterruptShared>,
    mode: CpuMode,
    halted: bool,
}

// Dispatch costs (machine cycles, throttling states).
const COST_NMI: TimingResult = TimingResult { machine_cycles: 3, throttling_states: 11 };
const COST_IM0_IM1: TimingResult = TimingResult { machine_cycles: 4, throttling_states: 13 };
const COST_IM2: TimingResult = TimingResult { machine_cycles: 5, throttling_states: 19 };
const COST_GB: TimingResult = TimingResult { machine_cycles: 5, throttling_states: 20 };

impl InterruptManager {
    pub fn new(mode: CpuMode) -> Self {
        Self {
            shared: Arc::new(InterruptShared::default()),
            mode,
            halted: false,
        }
    }

    /// Handle for raising interrupts; cloneable, thread-safe.
    pub fn line(&self) -> InterruptLine {
        InterruptLine {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// `Running -> Halted`. The core loop parks on
    /// [`InterruptManager::wait_for_interrupt`] until something is raised.
    pub fn halt(&mut self) {
        if !self.halted {
            debug!("cpu halted");
            self.halted = true;
        }
    }

    pub fn resume(&mut self) {
        if self.halted {
            debug!("cpu resumed");
            self.halted = false;
        }
    }

    fn has_pending(pending: &PendingInterrupts) -> bool {
        pending.maskable.is_some() || pending.non_maskable
    }

    /// Block until any interrupt is observed (masked or not: a pending
    /// latch wakes a halted core, dispatch is decided separately) or the
    /// token is cancelled. Condvar-based; no busy-waiting.
    pub fn wait_for_interrupt(&self, token: &CancellationToken) -> Result<(), CoreError> {
        let mut pending = self.shared.pending.lock().unwrap();
        loop {
            if Self::has_pending(&pending) {
                return Ok(());
            }
            if token.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            // Bounded wait so cancellation from another thread is observed
            // even though it signals a different condvar.
            let (guard, _timeout) = self
                .shared
                .wakeup
                .wait_timeout(pending, Duration::from_millis(10))
                .unwrap();
            pending = guard;
        }
    }

    /// Accept and dispatch whatever is pending, honoring priorities and the
    /// flip-flops: NMI always preempts; a maskable vector is only consumed
    /// while IFF1 is set, otherwise it stays latched. Returns the dispatch
    /// cost when a jump was taken.
    pub fn service(
        &mut self,
        registers: &mut RegisterSet,
        mmu: &mut Mmu,
    ) -> Result<Option<TimingResult>, CoreError> {
        let (non_maskable, vector) = {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.non_maskable {
                pending.non_maskable = false;
                (true, None)
            } else if registers.iff1 {
                (false, pending.maskable.take())
            } else {
                (false, None)
            }
        };

        if non_maskable {
            self.resume();
            push_pc(registers, mmu)?;
            registers.iff2 = registers.iff1;
            registers.iff1 = false;
            registers.pc = 0x0066;
            trace!("nmi accepted, pc={:#06x}", registers.pc);
            return Ok(Some(COST_NMI));
        }

        let Some(vector) = vector else {
            // An interrupt was observed but not accepted; it still ends the
            // halt state.
            if self.halted {
                let pending = self.shared.pending.lock().unwrap();
                if Self::has_pending(&pending) {
                    drop(pending);
                    self.resume();
                }
            }
            return Ok(None);
        };

        self.resume();
        push_pc(registers, mmu)?;
        registers.iff1 = false;
        registers.iff2 = false;

        let cost = match self.mode {
            CpuMode::GameBoy => {
                registers.pc = vector as u16;
                COST_GB
            }
            CpuMode::Intel8080 | CpuMode::Z80 => match registers.im {
                InterruptMode::Im0 => {
                    registers.pc = vector as u16;
                    COST_IM0_IM1
                }
                InterruptMode::Im1 => {
                    registers.pc = 0x0038;
                    COST_IM0_IM1
                }
                InterruptMode::Im2 => {
                    let table = ((registers.i as u16) << 8) | vector as u16;
                    registers.pc = mmu.read_word(table);
                    COST_IM2
                }
            },
        };
        trace!("interrupt accepted, pc={:#06x}", registers.pc);
        Ok(Some(cost))
    }
}

fn push_pc(registers: &mut RegisterSet, mmu: &mut Mmu) -> Result<(), CoreError> {
    registers.sp = registers.sp.wrapping_sub(2);
    mmu.write_word(registers.sp, registers.pc)?;
    Ok(())
}
