//! JSON test-vector types and runners for validating core behavior:
//! register-state round-trips and small end-to-end programs.

use serde::{Deserialize, Serialize};
use tachyon_core::prelude::*;

/// A register-state round-trip vector: `reset_to_state(s)` followed by
/// `state()` must reproduce `s` exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCase {
    pub name: String,
    pub state: Z80RegisterState,
}

/// A small program with expected final registers and RAM contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramCase {
    pub name: String,
    pub cpu_mode: CpuMode,
    pub origin: u16,
    pub program: Vec<u8>,
    pub initial: Z80RegisterState,
    #[serde(rename = "final")]
    pub final_state: Z80RegisterState,
    /// Driver iterations to run.
    pub steps: usize,
    /// (address, value) pairs written before the run.
    #[serde(default)]
    pub setup_ram: Vec<(u16, u8)>,
    /// Expected (address, value) pairs after the run.
    #[serde(default)]
    pub ram: Vec<(u16, u8)>,
}

/// Flat-RAM core for vector execution.
fn flat_core(mode: CpuMode) -> CpuCore {
    let config = PlatformConfig::new(mode, vec![MemoryBankConfig::ram(0, 0x0000, 0x1_0000)]);
    CpuCoreBuilder::new(config)
        .build()
        .expect("flat 64KB map always validates")
}

/// Run one round-trip vector. Returns the first mismatch, if any.
pub fn run_state_case(case: &StateCase) -> Option<String> {
    let mut core = flat_core(CpuMode::Z80);
    core.reset_to_z80_state(&case.state);
    let observed = core.z80_state();
    if observed != case.state {
        return Some(format!(
            "{}: state round-trip mismatch\n  expected {:?}\n  observed {observed:?}",
            case.name, case.state
        ));
    }
    // The round-trip must also hold with the alternate banks selected when
    // the snapshot is taken.
    core.registers_mut().switch_general_purpose_banks();
    core.registers_mut().switch_accumulator_and_flags_banks();
    let swapped = core.z80_state();
    core.reset_to_z80_state(&swapped);
    if core.z80_state() != swapped {
        return Some(format!("{}: round-trip broken after bank switch", case.name));
    }
    None
}

/// Run one program vector. Returns the first mismatch, if any.
pub fn run_program_case(case: &ProgramCase) -> Option<String> {
    let mut core = flat_core(case.cpu_mode);
    core.reset_to_z80_state(&case.initial);
    if let Err(error) = core.mmu_mut().write_bytes(case.origin, &case.program) {
        return Some(format!("{}: program load failed: {error}", case.name));
    }
    for &(address, value) in &case.setup_ram {
        if let Err(error) = core.mmu_mut().write_byte(address, value) {
            return Some(format!("{}: ram setup failed: {error}", case.name));
        }
    }

    let token = CancellationToken::new();
    for step in 0..case.steps {
        if let Err(error) = core.step(&token) {
            return Some(format!("{}: step {step} failed: {error}", case.name));
        }
    }

    let observed = core.z80_state();
    macro_rules! check {
        ($field:ident) => {
            if observed.$field != case.final_state.$field {
                return Some(format!(
                    "{}: {} (got {:#x} exp {:#x})",
                    case.name,
                    stringify!($field),
                    observed.$field as u64,
                    case.final_state.$field as u64
                ));
            }
        };
    }
    check!(a);
    check!(f);
    check!(b);
    check!(c);
    check!(d);
    check!(e);
    check!(h);
    check!(l);
    check!(ix);
    check!(iy);
    check!(sp);
    check!(pc);

    for &(address, expected) in &case.ram {
        let got = core.mmu().read_byte(address);
        if got != expected {
            return Some(format!(
                "{}: ram[{address:#06x}] (got {got:#04x} exp {expected:#04x})",
                case.name
            ));
        }
    }
    None
}
