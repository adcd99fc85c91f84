use std::thread;
use std::time::{Duration, Instant};

use tachyon_core::config::CpuMode;
use tachyon_core::cpu::registers::RegisterSet;
use tachyon_core::cpu::CoreError;
use tachyon_core::interrupts::{InterruptManager, InterruptMode};
use tachyon_core::mem::{MemoryBank, Mmu, WriteFaultMode};
use tachyon_core::runner::CancellationToken;

fn flat_mmu() -> Mmu {
    let bank = MemoryBank::ram(0x0000, 0x1_0000).expect("flat bank");
    Mmu::new(vec![Box::new(bank)], WriteFaultMode::Throw).expect("flat map")
}

fn running_registers() -> RegisterSet {
    let mut registers = RegisterSet::new();
    registers.pc = 0x1234;
    registers.sp = 0xFF00;
    registers.iff1 = true;
    registers.iff2 = true;
    registers
}

#[test]
fn masked_interrupt_stays_latched_until_enabled() {
    let mut manager = InterruptManager::new(CpuMode::Z80);
    let mut registers = running_registers();
    registers.iff1 = false;
    let mut mmu = flat_mmu();

    manager.line().raise(0x42);
    let dispatched = manager.service(&mut registers, &mut mmu).expect("service");
    assert!(dispatched.is_none(), "masked interrupt must not dispatch");
    assert_eq!(registers.pc, 0x1234);

    registers.iff1 = true;
    let dispatched = manager.service(&mut registers, &mut mmu).expect("service");
    assert!(dispatched.is_some(), "latch survives until IFF1 is set");
}

#[test]
fn im0_jumps_to_supplied_vector() {
    let mut manager = InterruptManager::new(CpuMode::Z80);
    let mut registers = running_registers();
    registers.im = InterruptMode::Im0;
    let mut mmu = flat_mmu();

    manager.line().raise(0x42);
    manager.service(&mut registers, &mut mmu).expect("service");
    assert_eq!(registers.pc, 0x0042);
    assert!(!registers.iff1 && !registers.iff2, "maskable accept clears both flip-flops");
    assert_eq!(registers.sp, 0xFEFE);
    assert_eq!(mmu.read_word(0xFEFE), 0x1234, "old PC pushed");
}

#[test]
fn im1_uses_fixed_vector() {
    let mut manager = InterruptManager::new(CpuMode::Z80);
    let mut registers = running_registers();
    registers.im = InterruptMode::Im1;
    let mut mmu = flat_mmu();

    manager.line().raise(0xFF);
    let cost = manager
        .service(&mut registers, &mut mmu)
        .expect("service")
        .expect("dispatches");
    assert_eq!(registers.pc, 0x0038);
    assert_eq!(cost.throttling_states, 13);
}

#[test]
fn im2_reads_vector_table_through_i() {
    let mut manager = InterruptManager::new(CpuMode::Z80);
    let mut registers = running_registers();
    registers.im = InterruptMode::Im2;
    registers.i = 0x20;
    let mut mmu = flat_mmu();
    mmu.write_word(0x2010, 0x5678).expect("vector entry");

    manager.line().raise(0x10);
    let cost = manager
        .service(&mut registers, &mut mmu)
        .expect("service")
        .expect("dispatches");
    assert_eq!(registers.pc, 0x5678);
    assert_eq!(cost.throttling_states, 19);
}

#[test]
fn nmi_preempts_and_preserves_iff2() {
    let mut manager = InterruptManager::new(CpuMode::Z80);
    let mut registers = running_registers();
    let mut mmu = flat_mmu();

    let line = manager.line();
    line.raise(0x42);
    line.raise_non_maskable();
    manager.service(&mut registers, &mut mmu).expect("service");
    assert_eq!(registers.pc, 0x0066, "NMI wins");
    assert!(registers.iff2, "IFF2 preserves the pre-NMI IFF1");
    assert!(!registers.iff1);

    // The maskable latch survived the NMI; re-enable and dispatch it.
    registers.iff1 = true;
    let dispatched = manager.service(&mut registers, &mut mmu).expect("service");
    assert!(dispatched.is_some());
    assert_eq!(registers.pc, 0x0042);
}

#[test]
fn nmi_dispatches_even_with_interrupts_disabled() {
    let mut manager = InterruptManager::new(CpuMode::Z80);
    let mut registers = running_registers();
    registers.iff1 = false;
    registers.iff2 = false;
    let mut mmu = flat_mmu();

    manager.line().raise_non_maskable();
    let cost = manager
        .service(&mut registers, &mut mmu)
        .expect("service")
        .expect("NMI ignores IFF1");
    assert_eq!(registers.pc, 0x0066);
    assert_eq!(cost.throttling_states, 11);
}

#[test]
fn gameboy_mode_uses_supplied_vector() {
    let mut manager = InterruptManager::new(CpuMode::GameBoy);
    let mut registers = running_registers();
    let mut mmu = flat_mmu();

    manager.line().raise(0x48);
    let cost = manager
        .service(&mut registers, &mut mmu)
        .expect("service")
        .expect("dispatches");
    assert_eq!(registers.pc, 0x0048);
    assert_eq!(cost.throttling_states, 20);
}

#[test]
fn raised_interrupt_wakes_a_waiting_core() {
    let mut manager = InterruptManager::new(CpuMode::Z80);
    manager.halt();
    assert!(manager.is_halted());

    let line = manager.line();
    let raiser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        line.raise(0x01);
    });

    let token = CancellationToken::new();
    let started = Instant::now();
    manager.wait_for_interrupt(&token).expect("wait resumes");
    assert!(
        started.elapsed() >= Duration::from_millis(20),
        "wait blocked until the raise"
    );
    raiser.join().expect("raiser thread");
}

#[test]
fn cancellation_aborts_interrupt_wait() {
    let manager = InterruptManager::new(CpuMode::Z80);
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            token.cancel();
        })
    };

    let result = manager.wait_for_interrupt(&token);
    assert_eq!(result, Err(CoreError::Cancelled));
    canceller.join().expect("canceller thread");
}

#[test]
fn observed_but_masked_interrupt_still_ends_halt() {
    let mut manager = InterruptManager::new(CpuMode::Z80);
    let mut registers = running_registers();
    registers.iff1 = false;
    let mut mmu = flat_mmu();

    manager.halt();
    manager.line().raise(0x01);
    let dispatched = manager.service(&mut registers, &mut mmu).expect("service");
    assert!(dispatched.is_none());
    assert!(!manager.is_halted(), "observation alone resumes the core");
}
