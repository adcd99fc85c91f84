//! Block-execution behavior driven through small programs on a flat map.

use tachyon_core::prelude::*;

mod common;
use common::{flat_core, load_program, step_n};

#[test]
fn push_pop_move_through_the_stack() {
    let mut core = flat_core(CpuMode::Z80);
    // LD BC,0x1234; PUSH BC; POP DE; HALT
    load_program(&mut core, 0, &[0x01, 0x34, 0x12, 0xC5, 0xD1, 0x76]);
    step_n(&mut core, 1);

    let state = core.z80_state();
    assert_eq!(state.d, 0x12);
    assert_eq!(state.e, 0x34);
    assert_eq!(state.sp, 0xFFFF, "push then pop balances SP");
}

#[test]
fn exchange_sp_indirect_swaps_with_stack_top() {
    let mut core = flat_core(CpuMode::Z80);
    // LD HL,0x1111; LD BC,0x2222; PUSH BC; EX (SP),HL; HALT
    load_program(
        &mut core,
        0,
        &[0x21, 0x11, 0x11, 0x01, 0x22, 0x22, 0xC5, 0xE3, 0x76],
    );
    step_n(&mut core, 1);

    assert_eq!(core.registers().hl(), 0x2222);
    let sp = core.registers().sp;
    assert_eq!(core.mmu().read_word(sp), 0x1111, "old HL now on the stack");
}

#[test]
fn af_bank_exchange_preserves_both_accumulators() {
    let mut core = flat_core(CpuMode::Z80);
    // LD A,0x11; EX AF,AF'; LD A,0x22; EX AF,AF'; HALT
    load_program(&mut core, 0, &[0x3E, 0x11, 0x08, 0x3E, 0x22, 0x08, 0x76]);
    step_n(&mut core, 1);

    let state = core.z80_state();
    assert_eq!(state.a, 0x11, "primary accumulator restored");
    assert_eq!(state.a_prime, 0x22, "alternate holds the interleaved value");
}

#[test]
fn exx_swaps_general_purpose_banks() {
    let mut core = flat_core(CpuMode::Z80);
    // LD BC,0x1234; EXX; LD BC,0x5678; EXX; HALT
    load_program(
        &mut core,
        0,
        &[0x01, 0x34, 0x12, 0xD9, 0x01, 0x78, 0x56, 0xD9, 0x76],
    );
    step_n(&mut core, 1);

    let state = core.z80_state();
    assert_eq!((state.b, state.c), (0x12, 0x34));
    assert_eq!((state.b_prime, state.c_prime), (0x56, 0x78));
}

#[test]
fn adc_hl_consumes_carry_from_scf() {
    let mut core = flat_core(CpuMode::Z80);
    // SCF; LD HL,0; LD BC,0; ADC HL,BC; HALT
    load_program(
        &mut core,
        0,
        &[0x37, 0x21, 0x00, 0x00, 0x01, 0x00, 0x00, 0xED, 0x4A, 0x76],
    );
    step_n(&mut core, 1);
    assert_eq!(core.registers().hl(), 0x0001);
}

#[test]
fn rld_rotates_digits_between_a_and_memory() {
    let mut core = flat_core(CpuMode::Z80);
    core.mmu_mut().write_byte(0x8000, 0x34).expect("operand cell");
    // LD HL,0x8000; LD A,0x12; RLD; HALT
    load_program(&mut core, 0, &[0x21, 0x00, 0x80, 0x3E, 0x12, 0xED, 0x6F, 0x76]);
    step_n(&mut core, 1);

    assert_eq!(core.registers().a(), 0x13);
    assert_eq!(core.mmu().read_byte(0x8000), 0x42);
}

#[test]
fn input_from_unmapped_port_reads_floating_bus() {
    let mut core = flat_core(CpuMode::Z80);
    // IN B,(C); HALT — no peripheral on the port.
    load_program(&mut core, 0, &[0xED, 0x40, 0x76]);
    step_n(&mut core, 1);

    assert_eq!(core.registers().b(), 0xFF);
    let flags = core.registers().flags();
    assert!(flags.sign(), "S from the input byte");
    assert!(flags.parity_overflow(), "0xFF has even parity");
    assert!(!flags.half_carry() && !flags.subtract());
}

#[test]
fn jump_indirect_through_hl() {
    let mut core = flat_core(CpuMode::Z80);
    load_program(&mut core, 0, &[0x21, 0x00, 0x02, 0xE9]); // LD HL,0x200; JP (HL)
    core.mmu_mut().write_byte(0x0200, 0x76).expect("target halt");
    core.registers_mut().pc = 0;
    step_n(&mut core, 2);
    assert_eq!(core.registers().pc, 0x0201);
}

#[test]
fn cpir_stops_on_match_with_zero_set() {
    let mut core = flat_core(CpuMode::Z80);
    core.mmu_mut()
        .write_bytes(0x8000, &[0xAA, 0xBB, 0xCC])
        .expect("haystack");
    // LD HL,0x8000; LD BC,3; LD A,0xBB; CPIR; HALT
    load_program(
        &mut core,
        0,
        &[0x21, 0x00, 0x80, 0x01, 0x03, 0x00, 0x3E, 0xBB, 0xED, 0xB1, 0x76],
    );
    // First iteration misses and rewinds; second matches; then the HALT.
    step_n(&mut core, 3);

    assert_eq!(core.registers().hl(), 0x8002, "HL past the match");
    assert_eq!(core.registers().bc(), 0x0001);
    assert!(core.registers().flags().zero(), "match sets Z");
}

#[test]
fn call_and_return_round_trip() {
    let mut core = flat_core(CpuMode::Z80);
    load_program(&mut core, 0, &[0xCD, 0x00, 0x02, 0x76]); // CALL 0x200; HALT
    core.mmu_mut().write_byte(0x0200, 0xC9).expect("subroutine RET");
    core.registers_mut().pc = 0;

    step_n(&mut core, 1);
    assert_eq!(core.registers().pc, 0x0200);
    assert_eq!(core.registers().sp, 0xFFFD);
    assert_eq!(core.mmu().read_word(0xFFFD), 0x0003, "return address");

    step_n(&mut core, 2); // RET, then HALT
    assert_eq!(core.registers().pc, 0x0004);
    assert_eq!(core.registers().sp, 0xFFFF);
}

#[test]
fn conditional_call_not_taken_falls_through() {
    let mut core = flat_core(CpuMode::Z80);
    // XOR A (sets Z); CALL NZ,0x200; HALT
    load_program(&mut core, 0, &[0xAF, 0xC4, 0x00, 0x02, 0x76]);
    step_n(&mut core, 2);
    assert_eq!(core.registers().pc, 5, "untaken call falls through");
    assert_eq!(core.registers().sp, 0xFFFF, "nothing pushed");
}

#[test]
fn negate_two_complements_accumulator() {
    let mut core = flat_core(CpuMode::Z80);
    // LD A,1; NEG; HALT
    load_program(&mut core, 0, &[0x3E, 0x01, 0xED, 0x44, 0x76]);
    step_n(&mut core, 1);
    assert_eq!(core.registers().a(), 0xFF);
    assert!(core.registers().flags().carry());
    assert!(core.registers().flags().subtract());
}

#[test]
fn retn_restores_iff1_from_iff2() {
    let mut core = flat_core(CpuMode::Z80);
    core.registers_mut().iff1 = false;
    core.registers_mut().iff2 = true;
    // Push a return address by hand, then RETN.
    core.registers_mut().sp = 0xFFF0;
    core.mmu_mut().write_word(0xFFF0, 0x0200).expect("stacked pc");
    core.mmu_mut().write_byte(0x0200, 0x76).expect("target halt");
    load_program(&mut core, 0, &[0xED, 0x45]);

    step_n(&mut core, 1);
    assert_eq!(core.registers().pc, 0x0200);
    assert!(core.registers().iff1, "RETN copies IFF2 back");
}
