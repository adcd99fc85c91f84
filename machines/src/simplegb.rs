use tachyon_core::prelude::*;

/// A GameBoy-mode core with a cartridge-like map: 32KB ROM, 32KB RAM.
/// Writes into the ROM half are silently dropped, matching real cartridge
/// behavior (`WriteFaultMode::Continue`).
pub struct SimpleGameBoySystem {
    core: CpuCore,
}

impl SimpleGameBoySystem {
    /// `rom` is padded with NOPs to the full 32KB bank.
    pub fn new(rom: &[u8]) -> Result<Self, CoreError> {
        log::debug!("gameboy rom image {} bytes", rom.len());
        let mut image = rom.to_vec();
        image.resize(0x8000, 0x00);
        let mut config = PlatformConfig::new(
            CpuMode::GameBoy,
            vec![
                MemoryBankConfig::rom(0, 0x0000, image),
                MemoryBankConfig::ram(1, 0x8000, 0x8000),
            ],
        );
        config.write_fault_mode = WriteFaultMode::Continue;
        let core = CpuCoreBuilder::new(config).build()?;
        Ok(Self { core })
    }

    pub fn core(&self) -> &CpuCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CpuCore {
        &mut self.core
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

    pub fn state(&self) -> Z80RegisterState {
        self.core.z80_state()
    }
}
