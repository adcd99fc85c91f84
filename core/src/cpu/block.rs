//! Executable instruction blocks.
//!
//! A block is the unit of dynamic recompilation: one run of decoded
//! instructions ending at control flow, executed as a straight dispatch loop
//! against registers, MMU, ALU, and peripherals. Blocks are immutable after
//! decode and owned by the cache; identical bytes always decode to an
//! equivalent block, so a cached block may be reused until a write lands in
//! its address range.

use crate::cpu::alu::Alu;
use crate::cpu::ops::{AluOp, Condition, Op, Operand8, Reg16, Reg8, ShiftOp};
use crate::cpu::registers::RegisterSet;
use crate::cpu::CoreError;
use crate::mem::Mmu;
use crate::peripherals::PeripheralManager;

/// Static cost of one executed block, in both hardware timing units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingResult {
    pub machine_cycles: u32,
    pub throttling_states: u32,
}

impl TimingResult {
    pub fn accumulate(&mut self, machine_cycles: u32, throttling_states: u32) {
        self.machine_cycles += machine_cycles;
        self.throttling_states += throttling_states;
    }
}

/// What a block execution reported back to the driver loop.
#[derive(Debug, Clone, Copy)]
pub struct BlockOutcome {
    pub timing: TimingResult,
    /// True when the block assigned the program counter (taken jump, call,
    /// return, repeating block op). Otherwise the driver advances PC past
    /// the block.
    pub pc_redirected: bool,
}

/// Everything a block needs to execute. Borrowed from the driver for the
/// duration of one block; the driver remains the sole owner.
pub struct ExecutionContext<'a> {
    pub registers: &'a mut RegisterSet,
    pub mmu: &'a mut Mmu,
    pub alu: &'a Alu,
    pub peripherals: &'a mut PeripheralManager,
}

/// One decoded, immutable instruction block.
#[derive(Debug, Clone)]
pub struct InstructionBlock {
    start_address: u16,
    length: u16,
    halts_cpu: bool,
    halts_peripherals: bool,
    machine_cycles: u32,
    throttling_states: u32,
    ops: Vec<Op>,
}

impl InstructionBlock {
    pub(crate) fn new(
        start_address: u16,
        length: u16,
        halts_cpu: bool,
        halts_peripherals: bool,
        timing: TimingResult,
        ops: Vec<Op>,
    ) -> Self {
        Self {
            start_address,
            length,
            halts_cpu,
            halts_peripherals,
            machine_cycles: timing.machine_cycles,
            throttling_states: timing.throttling_states,
            ops,
        }
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// Decoded length in bytes.
    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn halts_cpu(&self) -> bool {
        self.halts_cpu
    }

    pub fn halts_peripherals(&self) -> bool {
        self.halts_peripherals
    }

    pub fn machine_cycles(&self) -> u32 {
        self.machine_cycles
    }

    pub fn throttling_states(&self) -> u32 {
        self.throttling_states
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Address of the instruction following this block.
    pub fn end_address(&self) -> u16 {
        self.start_address.wrapping_add(self.length)
    }

    /// Run the block to completion. Memory write faults abort mid-block and
    /// propagate; writes are atomic at byte/word granularity so the caller
    /// observes a consistent machine.
    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<BlockOutcome, CoreError> {
        let mut redirected = false;
        for op in &self.ops {
            execute_op(op, ctx, &mut redirected)?;
        }
        Ok(BlockOutcome {
            timing: TimingResult {
                machine_cycles: self.machine_cycles,
                throttling_states: self.throttling_states,
            },
            pc_redirected: redirected,
        })
    }
}

// --- Register/operand plumbing ---

fn read_reg8(registers: &RegisterSet, reg: Reg8) -> u8 {
    match reg {
        Reg8::B => registers.b(),
        Reg8::C => registers.c(),
        Reg8::D => registers.d(),
        Reg8::E => registers.e(),
        Reg8::H => registers.h(),
        Reg8::L => registers.l(),
        Reg8::A => registers.a(),
        Reg8::IxH => (registers.ix >> 8) as u8,
        Reg8::IxL => registers.ix as u8,
        Reg8::IyH => (registers.iy >> 8) as u8,
        Reg8::IyL => registers.iy as u8,
    }
}

fn write_reg8(registers: &mut RegisterSet, reg: Reg8, value: u8) {
    match reg {
        Reg8::B => registers.set_b(value),
        Reg8::C => registers.set_c(value),
        Reg8::D => registers.set_d(value),
        Reg8::E => registers.set_e(value),
        Reg8::H => registers.set_h(value),
        Reg8::L => registers.set_l(value),
        Reg8::A => registers.set_a(value),
        Reg8::IxH => registers.ix = (registers.ix & 0x00FF) | ((value as u16) << 8),
        Reg8::IxL => registers.ix = (registers.ix & 0xFF00) | value as u16,
        Reg8::IyH => registers.iy = (registers.iy & 0x00FF) | ((value as u16) << 8),
        Reg8::IyL => registers.iy = (registers.iy & 0xFF00) | value as u16,
    }
}

fn read_reg16(registers: &RegisterSet, reg: Reg16) -> u16 {
    match reg {
        Reg16::Af => registers.af(),
        Reg16::Bc => registers.bc(),
        Reg16::De => registers.de(),
        Reg16::Hl => registers.hl(),
        Reg16::Ix => registers.ix,
        Reg16::Iy => registers.iy,
        Reg16::Sp => registers.sp,
    }
}

fn write_reg16(registers: &mut RegisterSet, reg: Reg16, value: u16) {
    match reg {
        Reg16::Af => registers.set_af(value),
        Reg16::Bc => registers.set_bc(value),
        Reg16::De => registers.set_de(value),
        Reg16::Hl => registers.set_hl(value),
        Reg16::Ix => registers.ix = value,
        Reg16::Iy => registers.iy = value,
        Reg16::Sp => registers.sp = value,
    }
}

fn indexed_address(registers: &RegisterSet, reg: Reg16, displacement: i8) -> u16 {
    read_reg16(registers, reg).wrapping_add(displacement as i16 as u16)
}

fn read_operand8(ctx: &mut ExecutionContext<'_>, operand: Operand8) -> u8 {
    match operand {
        Operand8::Reg(reg) => read_reg8(ctx.registers, reg),
        Operand8::Imm(value) => value,
        Operand8::Ind(reg) => ctx.mmu.read_byte(read_reg16(ctx.registers, reg)),
        Operand8::Idx(reg, d) => ctx.mmu.read_byte(indexed_address(ctx.registers, reg, d)),
        Operand8::Abs(address) => ctx.mmu.read_byte(address),
        Operand8::HlPostInc => {
            let hl = ctx.registers.hl();
            ctx.registers.set_hl(hl.wrapping_add(1));
            ctx.mmu.read_byte(hl)
        }
        Operand8::HlPostDec => {
            let hl = ctx.registers.hl();
            ctx.registers.set_hl(hl.wrapping_sub(1));
            ctx.mmu.read_byte(hl)
        }
        Operand8::High(offset) => ctx.mmu.read_byte(0xFF00 | offset as u16),
        Operand8::HighC => {
            let c = ctx.registers.c();
            ctx.mmu.read_byte(0xFF00 | c as u16)
        }
    }
}

fn write_operand8(
    ctx: &mut ExecutionContext<'_>,
    operand: Operand8,
    value: u8,
) -> Result<(), CoreError> {
    match operand {
        Operand8::Reg(reg) => write_reg8(ctx.registers, reg, value),
        Operand8::Imm(_) => unreachable!("immediate is never a write destination"),
        Operand8::Ind(reg) => {
            let address = read_reg16(ctx.registers, reg);
            ctx.mmu.write_byte(address, value)?;
        }
        Operand8::Idx(reg, d) => {
            let address = indexed_address(ctx.registers, reg, d);
            ctx.mmu.write_byte(address, value)?;
        }
        Operand8::Abs(address) => ctx.mmu.write_byte(address, value)?,
        Operand8::HlPostInc => {
            let hl = ctx.registers.hl();
            ctx.registers.set_hl(hl.wrapping_add(1));
            ctx.mmu.write_byte(hl, value)?;
        }
        Operand8::HlPostDec => {
            let hl = ctx.registers.hl();
            ctx.registers.set_hl(hl.wrapping_sub(1));
            ctx.mmu.write_byte(hl, value)?;
        }
        Operand8::High(offset) => ctx.mmu.write_byte(0xFF00 | offset as u16, value)?,
        Operand8::HighC => {
            let address = 0xFF00 | ctx.registers.c() as u16;
            ctx.mmu.write_byte(address, value)?;
        }
    }
    Ok(())
}

fn condition_met(registers: &RegisterSet, condition: Condition) -> bool {
    let flags = registers.flags();
    match condition {
        Condition::Always => true,
        Condition::NonZero => !flags.zero(),
        Condition::Zero => flags.zero(),
        Condition::NoCarry => !flags.carry(),
        Condition::Carry => flags.carry(),
        Condition::ParityOdd => !flags.parity_overflow(),
        Condition::ParityEven => flags.parity_overflow(),
        Condition::Positive => !flags.sign(),
        Condition::Negative => flags.sign(),
    }
}

fn push_word(ctx: &mut ExecutionContext<'_>, value: u16) -> Result<(), CoreError> {
    ctx.registers.sp = ctx.registers.sp.wrapping_sub(2);
    ctx.mmu.write_word(ctx.registers.sp, value)?;
    Ok(())
}

fn pop_word(ctx: &mut ExecutionContext<'_>) -> u16 {
    let value = ctx.mmu.read_word(ctx.registers.sp);
    ctx.registers.sp = ctx.registers.sp.wrapping_add(2);
    value
}

fn set_pc(ctx: &mut ExecutionContext<'_>, redirected: &mut bool, target: u16) {
    ctx.registers.pc = target;
    *redirected = true;
}

// --- Dispatch ---

fn execute_op(
    op: &Op,
    ctx: &mut ExecutionContext<'_>,
    redirected: &mut bool,
) -> Result<(), CoreError> {
    match *op {
        Op::Nop | Op::Halt | Op::Stop => {}

        // --- Loads ---
        Op::Load8(dst, src) => {
            let value = read_operand8(ctx, src);
            write_operand8(ctx, dst, value)?;
        }
        Op::Load16(reg, value) => write_reg16(ctx.registers, reg, value),
        Op::Load16FromMemory(reg, address) => {
            let value = ctx.mmu.read_word(address);
            write_reg16(ctx.registers, reg, value);
        }
        Op::Store16(address, reg) => {
            let value = read_reg16(ctx.registers, reg);
            ctx.mmu.write_word(address, value)?;
        }
        Op::LoadSpFrom(reg) => ctx.registers.sp = read_reg16(ctx.registers, reg),
        Op::LoadHlSpDisplaced(displacement) => {
            let sp = ctx.registers.sp;
            let result = sp.wrapping_add(displacement as i16 as u16);
            sp_displacement_flags(ctx, sp, displacement);
            ctx.registers.set_hl(result);
        }
        Op::Push(reg) => {
            let value = read_reg16(ctx.registers, reg);
            push_word(ctx, value)?;
        }
        Op::Pop(reg) => {
            let value = pop_word(ctx);
            write_reg16(ctx.registers, reg, value);
        }

        // --- Exchanges ---
        Op::ExchangeAfAf => ctx.registers.switch_accumulator_and_flags_banks(),
        Op::ExchangeDeHl => ctx.registers.exchange_de_hl(),
        Op::ExchangeBanks => ctx.registers.switch_general_purpose_banks(),
        Op::ExchangeSpIndirect(reg) => {
            let sp = ctx.registers.sp;
            let from_stack = ctx.mmu.read_word(sp);
            let from_reg = read_reg16(ctx.registers, reg);
            ctx.mmu.write_word(sp, from_reg)?;
            write_reg16(ctx.registers, reg, from_stack);
        }

        // --- 8-bit arithmetic/logic ---
        Op::Alu(alu_op, operand) => {
            let value = read_operand8(ctx, operand);
            let a = ctx.registers.a();
            let mut flags = ctx.registers.flags();
            let result = match alu_op {
                AluOp::Add => Some(ctx.alu.add(&mut flags, a, value)),
                AluOp::AddWithCarry => Some(ctx.alu.add_with_carry(&mut flags, a, value)),
                AluOp::Subtract => Some(ctx.alu.subtract(&mut flags, a, value)),
                AluOp::SubtractWithCarry => {
                    Some(ctx.alu.subtract_with_carry(&mut flags, a, value))
                }
                AluOp::And => Some(ctx.alu.and(&mut flags, a, value)),
                AluOp::Xor => Some(ctx.alu.xor(&mut flags, a, value)),
                AluOp::Or => Some(ctx.alu.or(&mut flags, a, value)),
                AluOp::Compare => {
                    ctx.alu.compare(&mut flags, a, value);
                    None
                }
            };
            *ctx.registers.flags_mut() = flags;
            if let Some(result) = result {
                ctx.registers.set_a(result);
            }
        }
        Op::Increment8(operand) => {
            let value = read_operand8(ctx, operand);
            let mut flags = ctx.registers.flags();
            let result = ctx.alu.increment(&mut flags, value);
            *ctx.registers.flags_mut() = flags;
            write_operand8(ctx, operand, result)?;
        }
        Op::Decrement8(operand) => {
            let value = read_operand8(ctx, operand);
            let mut flags = ctx.registers.flags();
            let result = ctx.alu.decrement(&mut flags, value);
            *ctx.registers.flags_mut() = flags;
            write_operand8(ctx, operand, result)?;
        }
        Op::DecimalAdjust => {
            let mut flags = ctx.registers.flags();
            let result = ctx.alu.decimal_adjust(&mut flags, ctx.registers.a());
            *ctx.registers.flags_mut() = flags;
            ctx.registers.set_a(result);
        }
        Op::Complement => {
            let result = !ctx.registers.a();
            ctx.registers.set_a(result);
            let flags = ctx.registers.flags_mut();
            flags.set_half_carry(true);
            flags.set_subtract(true);
            flags.set_undocumented(result);
        }
        Op::Negate => {
            let mut flags = ctx.registers.flags();
            let result = ctx.alu.negate(&mut flags, ctx.registers.a());
            *ctx.registers.flags_mut() = flags;
            ctx.registers.set_a(result);
        }
        Op::SetCarryFlag => {
            let a = ctx.registers.a();
            let flags = ctx.registers.flags_mut();
            flags.set_carry(true);
            flags.set_half_carry(false);
            flags.set_subtract(false);
            flags.set_undocumented(a);
        }
        Op::ComplementCarryFlag => {
            let a = ctx.registers.a();
            let flags = ctx.registers.flags_mut();
            let old_carry = flags.carry();
            flags.set_half_carry(old_carry);
            flags.set_carry(!old_carry);
            flags.set_subtract(false);
            flags.set_undocumented(a);
        }

        // --- 16-bit arithmetic ---
        Op::Add16(dst, src) => {
            let left = read_reg16(ctx.registers, dst);
            let right = read_reg16(ctx.registers, src);
            let mut flags = ctx.registers.flags();
            let result = ctx.alu.add16(&mut flags, left, right);
            *ctx.registers.flags_mut() = flags;
            write_reg16(ctx.registers, dst, result);
        }
        Op::Add16WithCarry(src) => {
            let left = ctx.registers.hl();
            let right = read_reg16(ctx.registers, src);
            let mut flags = ctx.registers.flags();
            let result = ctx.alu.add16_with_carry(&mut flags, left, right);
            *ctx.registers.flags_mut() = flags;
            ctx.registers.set_hl(result);
        }
        Op::Subtract16WithCarry(src) => {
            let left = ctx.registers.hl();
            let right = read_reg16(ctx.registers, src);
            let mut flags = ctx.registers.flags();
            let result = ctx.alu.subtract16_with_carry(&mut flags, left, right);
            *ctx.registers.flags_mut() = flags;
            ctx.registers.set_hl(result);
        }
        Op::Increment16(reg) => {
            let value = read_reg16(ctx.registers, reg).wrapping_add(1);
            write_reg16(ctx.registers, reg, value);
        }
        Op::Decrement16(reg) => {
            let value = read_reg16(ctx.registers, reg).wrapping_sub(1);
            write_reg16(ctx.registers, reg, value);
        }
        Op::AddSp(displacement) => {
            let sp = ctx.registers.sp;
            sp_displacement_flags(ctx, sp, displacement);
            ctx.registers.sp = sp.wrapping_add(displacement as i16 as u16);
        }

        // --- Rotates/shifts/bits ---
        Op::RotateALeftCircular => rotate_accumulator(ctx, Alu::rlca),
        Op::RotateARightCircular => rotate_accumulator(ctx, Alu::rrca),
        Op::RotateALeft => rotate_accumulator(ctx, Alu::rla),
        Op::RotateARight => rotate_accumulator(ctx, Alu::rra),
        Op::Shift(shift_op, operand, copy) => {
            let value = read_operand8(ctx, operand);
            let mut flags = ctx.registers.flags();
            let result = match shift_op {
                ShiftOp::RotateLeftCircular => ctx.alu.rotate_left_circular(&mut flags, value),
                ShiftOp::RotateRightCircular => ctx.alu.rotate_right_circular(&mut flags, value),
                ShiftOp::RotateLeft => ctx.alu.rotate_left(&mut flags, value),
                ShiftOp::RotateRight => ctx.alu.rotate_right(&mut flags, value),
                ShiftOp::ShiftLeftArithmetic => ctx.alu.shift_left_arithmetic(&mut flags, value),
                ShiftOp::ShiftRightArithmetic => {
                    ctx.alu.shift_right_arithmetic(&mut flags, value)
                }
                ShiftOp::ShiftLeftLogical => ctx.alu.shift_left_logical(&mut flags, value),
                ShiftOp::ShiftRightLogical => ctx.alu.shift_right_logical(&mut flags, value),
                ShiftOp::Swap => ctx.alu.swap(&mut flags, value),
            };
            *ctx.registers.flags_mut() = flags;
            write_operand8(ctx, operand, result)?;
            if let Some(reg) = copy {
                write_reg8(ctx.registers, reg, result);
            }
        }
        Op::BitTest(bit, operand) => {
            let value = read_operand8(ctx, operand);
            let mut flags = ctx.registers.flags();
            ctx.alu.bit_test(&mut flags, bit, value);
            *ctx.registers.flags_mut() = flags;
        }
        Op::BitSet(bit, operand, copy) => {
            let result = read_operand8(ctx, operand) | (1 << bit);
            write_operand8(ctx, operand, result)?;
            if let Some(reg) = copy {
                write_reg8(ctx.registers, reg, result);
            }
        }
        Op::BitReset(bit, operand, copy) => {
            let result = read_operand8(ctx, operand) & !(1 << bit);
            write_operand8(ctx, operand, result)?;
            if let Some(reg) = copy {
                write_reg8(ctx.registers, reg, result);
            }
        }
        Op::RotateDigitLeft => {
            let hl = ctx.registers.hl();
            let memory = ctx.mmu.read_byte(hl);
            let a = ctx.registers.a();
            let new_memory = (memory << 4) | (a & 0x0F);
            let new_a = (a & 0xF0) | (memory >> 4);
            ctx.mmu.write_byte(hl, new_memory)?;
            digit_rotate_flags(ctx, new_a);
        }
        Op::RotateDigitRight => {
            let hl = ctx.registers.hl();
            let memory = ctx.mmu.read_byte(hl);
            let a = ctx.registers.a();
            let new_memory = (memory >> 4) | (a << 4);
            let new_a = (a & 0xF0) | (memory & 0x0F);
            ctx.mmu.write_byte(hl, new_memory)?;
            digit_rotate_flags(ctx, new_a);
        }

        // --- Control flow ---
        Op::Jump(condition, target) => {
            if condition_met(ctx.registers, condition) {
                set_pc(ctx, redirected, target);
            }
        }
        Op::JumpIndirect(reg) => {
            let target = read_reg16(ctx.registers, reg);
            set_pc(ctx, redirected, target);
        }
        Op::DecrementJumpNonZero(target) => {
            let b = ctx.registers.b().wrapping_sub(1);
            ctx.registers.set_b(b);
            if b != 0 {
                set_pc(ctx, redirected, target);
            }
        }
        Op::Call {
            condition,
            target,
            return_address,
        } => {
            if condition_met(ctx.registers, condition) {
                push_word(ctx, return_address)?;
                set_pc(ctx, redirected, target);
            }
        }
        Op::Return(condition) => {
            if condition_met(ctx.registers, condition) {
                let target = pop_word(ctx);
                set_pc(ctx, redirected, target);
            }
        }
        Op::ReturnFromInterrupt { enable_interrupts } => {
            let target = pop_word(ctx);
            if enable_interrupts {
                ctx.registers.iff1 = true;
                ctx.registers.iff2 = true;
            }
            set_pc(ctx, redirected, target);
        }
        Op::ReturnFromNonMaskable => {
            let target = pop_word(ctx);
            ctx.registers.iff1 = ctx.registers.iff2;
            set_pc(ctx, redirected, target);
        }
        Op::Restart {
            target,
            return_address,
        } => {
            push_word(ctx, return_address)?;
            set_pc(ctx, redirected, target);
        }

        // --- IO ---
        Op::InputA(port) => {
            let msb = ctx.registers.a();
            let value = ctx.peripherals.input(port, msb);
            ctx.registers.set_a(value);
        }
        Op::InputReg(reg) => {
            let port = ctx.registers.c();
            let msb = ctx.registers.b();
            let value = ctx.peripherals.input(port, msb);
            let mut flags = ctx.registers.flags();
            ctx.alu.io_input_flags(&mut flags, value);
            *ctx.registers.flags_mut() = flags;
            if let Some(reg) = reg {
                write_reg8(ctx.registers, reg, value);
            }
        }
        Op::OutputA(port) => {
            let a = ctx.registers.a();
            ctx.peripherals.output(port, a, a);
        }
        Op::OutputReg(reg) => {
            let port = ctx.registers.c();
            let msb = ctx.registers.b();
            let value = reg.map_or(0, |reg| read_reg8(ctx.registers, reg));
            ctx.peripherals.output(port, msb, value);
        }

        // --- Interrupt-register transfers ---
        Op::LoadAFromI => {
            let value = ctx.registers.i;
            interrupt_register_flags(ctx, value);
            ctx.registers.set_a(value);
        }
        Op::LoadAFromR => {
            let value = ctx.registers.r;
            interrupt_register_flags(ctx, value);
            ctx.registers.set_a(value);
        }
        Op::LoadIFromA => ctx.registers.i = ctx.registers.a(),
        Op::LoadRFromA => ctx.registers.r = ctx.registers.a(),

        // --- Block operations ---
        Op::BlockTransfer {
            decrement,
            repeat_at,
        } => {
            let hl = ctx.registers.hl();
            let de = ctx.registers.de();
            let transferred = ctx.mmu.read_byte(hl);
            ctx.mmu.transfer_byte(hl, de)?;
            step_pair(ctx.registers, decrement);
            let bc = ctx.registers.bc().wrapping_sub(1);
            ctx.registers.set_bc(bc);

            let a = ctx.registers.a();
            let mut flags = ctx.registers.flags();
            ctx.alu.block_load_flags(&mut flags, transferred, a, bc != 0);
            *ctx.registers.flags_mut() = flags;

            if let Some(address) = repeat_at {
                if bc != 0 {
                    set_pc(ctx, redirected, address);
                }
            }
        }
        Op::BlockCompare {
            decrement,
            repeat_at,
        } => {
            let hl = ctx.registers.hl();
            let value = ctx.mmu.read_byte(hl);
            step_hl_only(ctx.registers, decrement);
            let bc = ctx.registers.bc().wrapping_sub(1);
            ctx.registers.set_bc(bc);

            let a = ctx.registers.a();
            let mut flags = ctx.registers.flags();
            let matched = ctx.alu.block_compare_flags(&mut flags, a, value, bc != 0);
            *ctx.registers.flags_mut() = flags;

            if let Some(address) = repeat_at {
                if bc != 0 && !matched {
                    set_pc(ctx, redirected, address);
                }
            }
        }
        Op::BlockInput {
            decrement,
            repeat_at,
        } => {
            let port = ctx.registers.c();
            let msb = ctx.registers.b();
            let value = ctx.peripherals.input(port, msb);
            let hl = ctx.registers.hl();
            ctx.mmu.write_byte(hl, value)?;
            step_hl_only(ctx.registers, decrement);
            let b = ctx.registers.b().wrapping_sub(1);
            ctx.registers.set_b(b);
            block_io_flags(ctx, b);

            if let Some(address) = repeat_at {
                if b != 0 {
                    set_pc(ctx, redirected, address);
                }
            }
        }
        Op::BlockOutput {
            decrement,
            repeat_at,
        } => {
            let hl = ctx.registers.hl();
            let value = ctx.mmu.read_byte(hl);
            let b = ctx.registers.b().wrapping_sub(1);
            ctx.registers.set_b(b);
            let port = ctx.registers.c();
            ctx.peripherals.output(port, b, value);
            step_hl_only(ctx.registers, decrement);
            block_io_flags(ctx, b);

            if let Some(address) = repeat_at {
                if b != 0 {
                    set_pc(ctx, redirected, address);
                }
            }
        }

        // --- Interrupt control ---
        Op::DisableInterrupts => {
            ctx.registers.iff1 = false;
            ctx.registers.iff2 = false;
        }
        Op::EnableInterrupts => {
            ctx.registers.iff1 = true;
            ctx.registers.iff2 = true;
        }
        Op::SetInterruptMode(mode) => ctx.registers.im = mode,
    }
    Ok(())
}

fn rotate_accumulator(
    ctx: &mut ExecutionContext<'_>,
    operation: fn(&Alu, &mut crate::cpu::registers::FlagsRegister, u8) -> u8,
) {
    let mut flags = ctx.registers.flags();
    let result = operation(ctx.alu, &mut flags, ctx.registers.a());
    *ctx.registers.flags_mut() = flags;
    ctx.registers.set_a(result);
}

/// LDI/LDD advance HL and DE together; CPI/INI/OUTI step HL alone.
fn step_pair(registers: &mut RegisterSet, decrement: bool) {
    let delta: u16 = if decrement { 0xFFFF } else { 1 };
    let hl = registers.hl().wrapping_add(delta);
    let de = registers.de().wrapping_add(delta);
    registers.set_hl(hl);
    registers.set_de(de);
}

fn step_hl_only(registers: &mut RegisterSet, decrement: bool) {
    let delta: u16 = if decrement { 0xFFFF } else { 1 };
    let hl = registers.hl().wrapping_add(delta);
    registers.set_hl(hl);
}

/// LD A,I / LD A,R: S/Z from the value, H and N cleared, P/V = IFF2.
fn interrupt_register_flags(ctx: &mut ExecutionContext<'_>, value: u8) {
    let iff2 = ctx.registers.iff2;
    let flags = ctx.registers.flags_mut();
    flags.set_result(value);
    flags.set_half_carry(false);
    flags.set_subtract(false);
    flags.set_parity_overflow(iff2);
}

/// INI/IND/OUTI/OUTD documented flags: Z from the new B, N set.
fn block_io_flags(ctx: &mut ExecutionContext<'_>, b: u8) {
    let flags = ctx.registers.flags_mut();
    flags.set_zero(b == 0);
    flags.set_subtract(true);
}

/// RLD/RRD: S/Z/P from the new accumulator, H and N cleared, C preserved.
fn digit_rotate_flags(ctx: &mut ExecutionContext<'_>, new_a: u8) {
    let mut flags = ctx.registers.flags();
    ctx.alu.io_input_flags(&mut flags, new_a);
    *ctx.registers.flags_mut() = flags;
    ctx.registers.set_a(new_a);
}

/// GameBoy ADD SP,e / LD HL,SP+e: Z and N cleared, H/C from the low byte.
fn sp_displacement_flags(ctx: &mut ExecutionContext<'_>, sp: u16, displacement: i8) {
    let unsigned = displacement as u8;
    let flags = ctx.registers.flags_mut();
    flags.set_zero(false);
    flags.set_sign(false);
    flags.set_subtract(false);
    flags.set_half_carry((sp & 0x0F) as u8 + (unsigned & 0x0F) > 0x0F);
    flags.set_carry((sp & 0xFF) + unsigned as u16 > 0xFF);
}
