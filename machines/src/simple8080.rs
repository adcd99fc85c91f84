use std::sync::{Arc, Mutex};

use tachyon_core::prelude::*;

use crate::simplez80::OUTPUT_PORT;
use crate::CapturePort;

/// An Intel 8080 on flat 64KB RAM with one output-capture port.
pub struct Simple8080System {
    core: CpuCore,
    output: Arc<Mutex<Vec<u8>>>,
}

impl Simple8080System {
    pub fn new() -> Result<Self, CoreError> {
        Self::with_config(|config| config)
    }

    pub fn with_config(
        tweak: impl FnOnce(PlatformConfig) -> PlatformConfig,
    ) -> Result<Self, CoreError> {
        let config = PlatformConfig::new(
            CpuMode::Intel8080,
            vec![MemoryBankConfig::ram(0, 0x0000, 0x1_0000)],
        );
        let port = CapturePort::new(OUTPUT_PORT);
        let output = port.captured();
        let core = CpuCoreBuilder::new(tweak(config))
            .with_io_peripheral(Box::new(port))
            .build()?;
        Ok(Self { core, output })
    }

    pub fn core(&self) -> &CpuCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CpuCore {
        &mut self.core
    }

    pub fn load_program(&mut self, offset: u16, program: &[u8]) -> Result<(), MemoryError> {
        log::debug!("loading {} bytes at {offset:#06x}", program.len());
        self.core.mmu_mut().write_bytes(offset, program)
    }

    pub fn run_steps(&mut self, steps: usize) -> Result<TimingResult, CoreError> {
        let token = CancellationToken::new();
        let mut total = TimingResult::default();
        for _ in 0..steps {
            let retired = self.core.step(&token)?;
            total.accumulate(retired.machine_cycles, retired.throttling_states);
        }
        Ok(total)
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }

    pub fn state(&self) -> Intel8080RegisterState {
        self.core.intel8080_state()
    }
}
