#![allow(dead_code)]

use tachyon_core::prelude::*;

/// RUST_LOG-driven logging for test debugging; safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Flat 64KB RAM platform for the given CPU mode, unthrottled.
pub fn flat_config(mode: CpuMode) -> PlatformConfig {
    PlatformConfig::new(mode, vec![MemoryBankConfig::ram(0, 0x0000, 0x1_0000)])
}

pub fn flat_core(mode: CpuMode) -> CpuCore {
    CpuCoreBuilder::new(flat_config(mode))
        .build()
        .expect("flat 64KB map always validates")
}

/// Load a program and leave PC at its origin.
pub fn load_program(core: &mut CpuCore, origin: u16, program: &[u8]) {
    core.mmu_mut()
        .write_bytes(origin, program)
        .expect("program load into RAM");
    core.registers_mut().pc = origin;
}

/// Run driver iterations with a fresh token.
pub fn step_n(core: &mut CpuCore, steps: usize) -> TimingResult {
    let token = CancellationToken::new();
    let mut total = TimingResult::default();
    for _ in 0..steps {
        let retired = core.step(&token).expect("step succeeds");
        total.accumulate(retired.machine_cycles, retired.throttling_states);
    }
    total
}
