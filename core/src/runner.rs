//! The CPU core driver loop and cooperative cancellation.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::cache::BlockCache;
use crate::config::CpuMode;
use crate::cpu::alu::Alu;
use crate::cpu::block::{ExecutionContext, TimingResult};
use crate::cpu::decode::InstructionDecoder;
use crate::cpu::registers::{Intel8080RegisterState, RegisterSet, Z80RegisterState};
use crate::cpu::CoreError;
use crate::interrupts::{InterruptLine, InterruptManager};
use crate::mem::Mmu;
use crate::peripherals::PeripheralManager;
use crate::timer::InstructionTimer;

#[derive(Default)]
struct TokenInner {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// Cooperative cancellation signal. Cloneable; cancelling from any thread
/// wakes the driver out of its pacing suspension, and the loop unwinds
/// between instructions, never mid-write.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        *cancelled = true;
        self.inner.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().unwrap()
    }

    /// Sleep for `duration` unless cancelled first. Returns true when the
    /// wait ended by cancellation.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .wakeup
                .wait_timeout(cancelled, deadline - now)
                .unwrap();
            cancelled = guard;
        }
    }
}

/// The CPU core: sole owner of registers, MMU, cache, and peripherals; one
/// fetch→decode-or-cache→execute→pace→interrupt-check iteration per step.
pub struct CpuCore {
    mode: CpuMode,
    registers: RegisterSet,
    mmu: Mmu,
    alu: Alu,
    decoder: InstructionDecoder,
    cache: BlockCache,
    interrupts: InterruptManager,
    timer: InstructionTimer,
    peripherals: PeripheralManager,
}

impl CpuCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        mode: CpuMode,
        registers: RegisterSet,
        mmu: Mmu,
        alu: Alu,
        decoder: InstructionDecoder,
        cache: BlockCache,
        interrupts: InterruptManager,
        timer: InstructionTimer,
        peripherals: PeripheralManager,
    ) -> Self {
        Self {
            mode,
            registers,
            mmu,
            alu,
            decoder,
            cache,
            interrupts,
            timer,
            peripherals,
        }
    }

    pub fn mode(&self) -> CpuMode {
        self.mode
    }

    pub fn registers(&self) -> &RegisterSet {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterSet {
        &mut self.registers
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub fn interrupts(&self) -> &InterruptManager {
        &self.interrupts
    }

    /// Handle peripherals use to raise interrupts.
    pub fn interrupt_line(&self) -> InterruptLine {
        self.interrupts.line()
    }

    pub fn timer_mut(&mut self) -> &mut InstructionTimer {
        &mut self.timer
    }

    pub fn peripherals_mut(&mut self) -> &mut PeripheralManager {
        &mut self.peripherals
    }

    // --- Snapshot/reset surface ---

    pub fn reset(&mut self) {
        self.registers.reset();
        self.interrupts.resume();
    }

    pub fn z80_state(&self) -> Z80RegisterState {
        self.registers.z80_state()
    }

    pub fn reset_to_z80_state(&mut self, state: &Z80RegisterState) {
        self.registers.reset_to_z80_state(state);
        self.interrupts.resume();
    }

    pub fn intel8080_state(&self) -> Intel8080RegisterState {
        self.registers.intel8080_state()
    }

    pub fn reset_to_intel8080_state(&mut self, state: &Intel8080RegisterState) {
        self.registers.reset_to_intel8080_state(state);
        self.interrupts.resume();
    }

    /// Run until cancelled or a fatal error. Cancellation is a normal exit.
    pub fn run(&mut self, token: &CancellationToken) -> Result<(), CoreError> {
        self.timer.restart();
        debug!("core loop starting at pc={:#06x}", self.registers.pc);
        loop {
            match self.step(token) {
                Ok(_) => {}
                Err(CoreError::Cancelled) => {
                    debug!("core loop cancelled at pc={:#06x}", self.registers.pc);
                    return Ok(());
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// One driver iteration. Returns the cost retired this step.
    pub fn step(&mut self, token: &CancellationToken) -> Result<TimingResult, CoreError> {
        if token.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        // (1) A halted core parks until an interrupt or NMI is observed.
        if self.interrupts.is_halted() {
            self.interrupts.wait_for_interrupt(token)?;
            if self.peripherals.is_halted() {
                self.peripherals.resume_all();
            }
        }

        // (2) Accept pending interrupts at the instruction boundary.
        let mut retired = TimingResult::default();
        if let Some(cost) = self.interrupts.service(&mut self.registers, &mut self.mmu)? {
            retired.accumulate(cost.machine_cycles, cost.throttling_states);
        }

        // (3) Fetch the block at PC, decoding on a miss. Pending write
        // notifications are drained first, so invalidation happens-before
        // this fetch.
        let pc = self.registers.pc;
        let block = self.cache.get_or_decode(pc, &self.decoder, &self.mmu)?;
        let end_address = block.end_address();
        let halts_cpu = block.halts_cpu();
        let halts_peripherals = block.halts_peripherals();
        let opcode_fetches = block.ops().len();

        // (4) Execute against registers, MMU, ALU, and peripherals.
        let outcome = {
            let mut ctx = ExecutionContext {
                registers: &mut self.registers,
                mmu: &mut self.mmu,
                alu: &self.alu,
                peripherals: &mut self.peripherals,
            };
            block.execute(&mut ctx)?
        };

        // (5) Advance PC past the block unless the block redirected it, and
        // age the refresh register one tick per executed instruction.
        if !outcome.pc_redirected {
            self.registers.pc = end_address;
        }
        for _ in 0..opcode_fetches {
            self.registers.increment_refresh();
        }

        // (6) Pace to the virtual clock.
        retired.accumulate(
            outcome.timing.machine_cycles,
            outcome.timing.throttling_states,
        );
        self.timer.sync(retired, token)?;

        // (7) Halt signals from the executed block.
        if halts_cpu {
            self.interrupts.halt();
        }
        if halts_peripherals {
            self.peripherals.halt_all();
        }

        Ok(retired)
    }
}
