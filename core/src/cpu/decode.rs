//! Instruction decoder/recompiler.
//!
//! `decode_block` reads bytes from the MMU at an address and folds one real
//! instruction at a time into an [`InstructionBlock`], accumulating each
//! instruction's static machine-cycle/throttling-state cost, until control
//! flow or the block-size bound ends the run. Decoding is purely a function
//! of the bytes read, so the cache may reuse blocks freely.
//!
//! Conditional control flow charges the documented taken cost; repeat block
//! operations (LDIR family) charge the repeating cost and loop by rewinding
//! PC, one iteration per block execution.

use log::trace;

use crate::config::CpuMode;
use crate::cpu::block::{InstructionBlock, TimingResult};
use crate::cpu::ops::{AluOp, Condition, Op, Operand8, Reg16, Reg8, ShiftOp};
use crate::cpu::CoreError;
use crate::interrupts::InterruptMode;
use crate::mem::{MemoryError, Mmu};

/// Sequential byte source over the MMU. Reading past the top of the address
/// space mid-instruction is a decode error, never a wrap or an out-of-bounds
/// read.
struct ByteReader<'a> {
    mmu: &'a Mmu,
    /// Cursor in `start..=0x1_0000`.
    position: u32,
}

impl<'a> ByteReader<'a> {
    fn new(mmu: &'a Mmu, address: u16) -> Self {
        Self {
            mmu,
            position: address as u32,
        }
    }

    /// Current cursor, modulo the address space; used for branch targets and
    /// return addresses.
    fn address(&self) -> u16 {
        self.position as u16
    }

    fn next(&mut self) -> Result<u8, MemoryError> {
        if self.position > 0xFFFF {
            return Err(MemoryError::DecodeOverrun { address: 0xFFFF });
        }
        let byte = self.mmu.read_byte(self.position as u16);
        self.position += 1;
        Ok(byte)
    }

    fn next_word(&mut self) -> Result<u16, MemoryError> {
        let low = self.next()?;
        let high = self.next()?;
        Ok(u16::from_le_bytes([low, high]))
    }

    fn next_displacement(&mut self) -> Result<i8, MemoryError> {
        Ok(self.next()? as i8)
    }
}

/// One decoded instruction plus its static cost.
struct Decoded {
    op: Op,
    machine_cycles: u32,
    throttling_states: u32,
}

/// Shorthand used throughout the tables.
fn d(op: Op, machine_cycles: u32, throttling_states: u32) -> Decoded {
    Decoded {
        op,
        machine_cycles,
        throttling_states,
    }
}

/// Translates opcode byte streams into executable instruction blocks for the
/// configured CPU mode.
pub struct InstructionDecoder {
    mode: CpuMode,
    lock_on_undefined: bool,
    max_block_instructions: usize,
}

impl InstructionDecoder {
    pub fn new(mode: CpuMode, lock_on_undefined: bool, max_block_instructions: usize) -> Self {
        Self {
            mode,
            lock_on_undefined,
            max_block_instructions,
        }
    }

    pub fn mode(&self) -> CpuMode {
        self.mode
    }

    /// Decode one block starting at `address`.
    pub fn decode_block(&self, mmu: &Mmu, address: u16) -> Result<InstructionBlock, CoreError> {
        let mut reader = ByteReader::new(mmu, address);
        let mut ops = Vec::new();
        let mut timing = TimingResult::default();
        let mut halts_cpu = false;
        let mut halts_peripherals = false;

        loop {
            let decoded = match self.mode {
                CpuMode::Z80 => self.decode_z80(&mut reader)?,
                CpuMode::Intel8080 => self.decode_intel8080(&mut reader)?,
                CpuMode::GameBoy => self.decode_gameboy(&mut reader)?,
            };
            timing.accumulate(decoded.machine_cycles, decoded.throttling_states);
            match &decoded.op {
                Op::Halt => halts_cpu = true,
                Op::Stop => {
                    halts_cpu = true;
                    halts_peripherals = true;
                }
                _ => {}
            }
            let terminal = decoded.op.terminates_block();
            ops.push(decoded.op);
            if terminal || ops.len() >= self.max_block_instructions {
                break;
            }
        }

        let length = (reader.position - address as u32) as u16;
        trace!(
            "decoded block at {address:#06x}: {} ops, {} bytes, {}T",
            ops.len(),
            length,
            timing.throttling_states
        );
        Ok(InstructionBlock::new(
            address,
            length,
            halts_cpu,
            halts_peripherals,
            timing,
            ops,
        ))
    }

    fn undefined(&self, address: u16, opcode: u8) -> Result<Decoded, CoreError> {
        if self.lock_on_undefined {
            return Err(CoreError::UndefinedInstruction { address, opcode });
        }
        trace!("undefined opcode {opcode:#04x} at {address:#06x}, treating as NOP");
        Ok(d(Op::Nop, 1, 4))
    }

    // =====================================================================
    // Z80
    // =====================================================================

    fn decode_z80(&self, reader: &mut ByteReader<'_>) -> Result<Decoded, CoreError> {
        let instruction_start = reader.address();
        let mut index: Option<Reg16> = None;
        let mut prefix_cycles = 0u32;
        let mut opcode = reader.next()?;
        // DD/FD chains: the last prefix wins, each costs one M1 cycle.
        while opcode == 0xDD || opcode == 0xFD {
            index = Some(if opcode == 0xDD { Reg16::Ix } else { Reg16::Iy });
            prefix_cycles += 1;
            opcode = reader.next()?;
        }

        let mut decoded = match opcode {
            0xCB => match index {
                Some(reg) => self.decode_z80_indexed_cb(reader, reg)?,
                None => self.decode_z80_cb(reader)?,
            },
            0xED => self.decode_z80_ed(reader, instruction_start)?,
            _ => self.decode_z80_primary(opcode, reader, index)?,
        };
        decoded.machine_cycles += prefix_cycles;
        decoded.throttling_states += prefix_cycles * 4;
        Ok(decoded)
    }

    fn decode_z80_primary(
        &self,
        opcode: u8,
        reader: &mut ByteReader<'_>,
        index: Option<Reg16>,
    ) -> Result<Decoded, CoreError> {
        let hl = hl16(index);
        Ok(match opcode {
            // NOP — 4 T
            0x00 => d(Op::Nop, 1, 4),
            // HALT — 4 T
            0x76 => d(Op::Halt, 1, 4),

            // EX AF,AF' — 4 T
            0x08 => d(Op::ExchangeAfAf, 1, 4),
            // EXX — 4 T
            0xD9 => d(Op::ExchangeBanks, 1, 4),
            // EX DE,HL — 4 T (never index-substituted)
            0xEB => d(Op::ExchangeDeHl, 1, 4),
            // EX (SP),HL — 19 T
            0xE3 => d(Op::ExchangeSpIndirect(hl), 5, 19),

            // LD (BC)/(DE),A and back — 7 T
            0x02 => d(Op::Load8(Operand8::Ind(Reg16::Bc), Operand8::Reg(Reg8::A)), 2, 7),
            0x12 => d(Op::Load8(Operand8::Ind(Reg16::De), Operand8::Reg(Reg8::A)), 2, 7),
            0x0A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Ind(Reg16::Bc)), 2, 7),
            0x1A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Ind(Reg16::De)), 2, 7),

            // LD (nn),HL / LD HL,(nn) — 16 T
            0x22 => d(Op::Store16(reader.next_word()?, hl), 5, 16),
            0x2A => d(Op::Load16FromMemory(hl, reader.next_word()?), 5, 16),
            // LD (nn),A / LD A,(nn) — 13 T
            0x32 => d(Op::Load8(Operand8::Abs(reader.next_word()?), Operand8::Reg(Reg8::A)), 4, 13),
            0x3A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Abs(reader.next_word()?)), 4, 13),

            // LD SP,HL — 6 T
            0xF9 => d(Op::LoadSpFrom(hl), 1, 6),

            // Accumulator rotates — 4 T
            0x07 => d(Op::RotateALeftCircular, 1, 4),
            0x0F => d(Op::RotateARightCircular, 1, 4),
            0x17 => d(Op::RotateALeft, 1, 4),
            0x1F => d(Op::RotateARight, 1, 4),

            // Misc ALU — 4 T
            0x27 => d(Op::DecimalAdjust, 1, 4),
            0x2F => d(Op::Complement, 1, 4),
            0x37 => d(Op::SetCarryFlag, 1, 4),
            0x3F => d(Op::ComplementCarryFlag, 1, 4),

            // DJNZ e — 13/8 T, taken cost charged
            0x10 => {
                let offset = reader.next_displacement()?;
                d(Op::DecrementJumpNonZero(relative_target(reader, offset)), 3, 13)
            }
            // JR e — 12 T
            0x18 => {
                let offset = reader.next_displacement()?;
                d(Op::Jump(Condition::Always, relative_target(reader, offset)), 3, 12)
            }
            // JR cc,e — 12/7 T (NZ/Z/NC/C only)
            op if op & 0xE7 == 0x20 => {
                let offset = reader.next_displacement()?;
                d(
                    Op::Jump(condition(op >> 3 & 0x03), relative_target(reader, offset)),
                    3,
                    12,
                )
            }

            // JP nn — 10 T
            0xC3 => d(Op::Jump(Condition::Always, reader.next_word()?), 3, 10),
            // JP (HL) — 4 T
            0xE9 => d(Op::JumpIndirect(hl), 1, 4),
            // CALL nn — 17 T
            0xCD => {
                let target = reader.next_word()?;
                d(
                    Op::Call {
                        condition: Condition::Always,
                        target,
                        return_address: reader.address(),
                    },
                    5,
                    17,
                )
            }
            // RET — 10 T
            0xC9 => d(Op::Return(Condition::Always), 3, 10),

            // IN A,(n) / OUT (n),A — 11 T
            0xDB => d(Op::InputA(reader.next()?), 3, 11),
            0xD3 => d(Op::OutputA(reader.next()?), 3, 11),

            // DI / EI — 4 T
            0xF3 => d(Op::DisableInterrupts, 1, 4),
            0xFB => d(Op::EnableInterrupts, 1, 4),

            // LD rr,nn — 10 T
            op if op & 0xCF == 0x01 => {
                d(Op::Load16(register_pair(op >> 4 & 0x03, index), reader.next_word()?), 3, 10)
            }
            // ADD HL,rr — 11 T
            op if op & 0xCF == 0x09 => {
                d(Op::Add16(hl, register_pair(op >> 4 & 0x03, index)), 3, 11)
            }
            // INC rr / DEC rr — 6 T
            op if op & 0xCF == 0x03 => d(Op::Increment16(register_pair(op >> 4 & 0x03, index)), 1, 6),
            op if op & 0xCF == 0x0B => d(Op::Decrement16(register_pair(op >> 4 & 0x03, index)), 1, 6),

            // INC/DEC r — 4 T, (HL) 11 T, (IX+d) 23 T
            op if op & 0xC7 == 0x04 || op & 0xC7 == 0x05 => {
                let decrement = op & 0x01 != 0;
                let target = op >> 3 & 0x07;
                let (operand, extra_m, extra_t) = if target == 6 {
                    let (operand, m, t) = memory_operand(reader, index)?;
                    (operand, m + 2, t + 7)
                } else {
                    (Operand8::Reg(register8(target, index, false)), 0, 0)
                };
                let op = if decrement {
                    Op::Decrement8(operand)
                } else {
                    Op::Increment8(operand)
                };
                d(op, 1 + extra_m, 4 + extra_t)
            }

            // LD r,n — 7 T, LD (HL),n — 10 T, LD (IX+d),n — 19 T
            op if op & 0xC7 == 0x06 => {
                let target = op >> 3 & 0x07;
                if target == 6 {
                    match index {
                        Some(reg) => {
                            // Displacement precedes the immediate.
                            let displacement = reader.next_displacement()?;
                            let value = reader.next()?;
                            d(
                                Op::Load8(Operand8::Idx(reg, displacement), Operand8::Imm(value)),
                                4,
                                15,
                            )
                        }
                        None => d(
                            Op::Load8(Operand8::Ind(Reg16::Hl), Operand8::Imm(reader.next()?)),
                            3,
                            10,
                        ),
                    }
                } else {
                    let register = register8(target, index, false);
                    d(Op::Load8(Operand8::Reg(register), Operand8::Imm(reader.next()?)), 2, 7)
                }
            }

            // LD r,r' — 4 T, memory forms 7 T / 19 T indexed
            op if op & 0xC0 == 0x40 => {
                let dst = op >> 3 & 0x07;
                let src = op & 0x07;
                if dst == 6 {
                    let (operand, extra_m, extra_t) = memory_operand(reader, index)?;
                    let source = register8(src, index, true);
                    d(Op::Load8(operand, Operand8::Reg(source)), 2 + extra_m, 7 + extra_t)
                } else if src == 6 {
                    let (operand, extra_m, extra_t) = memory_operand(reader, index)?;
                    let target = register8(dst, index, true);
                    d(Op::Load8(Operand8::Reg(target), operand), 2 + extra_m, 7 + extra_t)
                } else {
                    d(
                        Op::Load8(
                            Operand8::Reg(register8(dst, index, false)),
                            Operand8::Reg(register8(src, index, false)),
                        ),
                        1,
                        4,
                    )
                }
            }

            // ALU A,r — 4 T, (HL) 7 T, (IX+d) 19 T
            op if op & 0xC0 == 0x80 => {
                let operation = alu_operation(op >> 3 & 0x07);
                let src = op & 0x07;
                let (operand, m, t) = if src == 6 {
                    let (operand, extra_m, extra_t) = memory_operand(reader, index)?;
                    (operand, 2 + extra_m, 7 + extra_t)
                } else {
                    (Operand8::Reg(register8(src, index, false)), 1, 4)
                };
                d(Op::Alu(operation, operand), m, t)
            }

            // ALU A,n — 7 T
            op if op & 0xC7 == 0xC6 => {
                d(Op::Alu(alu_operation(op >> 3 & 0x07), Operand8::Imm(reader.next()?)), 2, 7)
            }

            // PUSH/POP rr — 11/10 T
            op if op & 0xCF == 0xC5 => d(Op::Push(register_pair_af(op >> 4 & 0x03, index)), 3, 11),
            op if op & 0xCF == 0xC1 => d(Op::Pop(register_pair_af(op >> 4 & 0x03, index)), 3, 10),

            // JP cc,nn — 10 T
            op if op & 0xC7 == 0xC2 => {
                d(Op::Jump(condition(op >> 3 & 0x07), reader.next_word()?), 3, 10)
            }
            // CALL cc,nn — 17/10 T, taken cost charged
            op if op & 0xC7 == 0xC4 => {
                let target = reader.next_word()?;
                d(
                    Op::Call {
                        condition: condition(op >> 3 & 0x07),
                        target,
                        return_address: reader.address(),
                    },
                    5,
                    17,
                )
            }
            // RET cc — 11/5 T, taken cost charged
            op if op & 0xC7 == 0xC0 => d(Op::Return(condition(op >> 3 & 0x07)), 3, 11),
            // RST p — 11 T
            op if op & 0xC7 == 0xC7 => d(
                Op::Restart {
                    target: (op & 0x38) as u16,
                    return_address: reader.address(),
                },
                3,
                11,
            ),

            _ => unreachable!("z80 primary table is total, got {opcode:#04x}"),
        })
    }

    fn decode_z80_cb(&self, reader: &mut ByteReader<'_>) -> Result<Decoded, CoreError> {
        let opcode = reader.next()?;
        let family = opcode >> 6 & 0x03;
        let selector = opcode >> 3 & 0x07;
        let target = opcode & 0x07;
        let memory = target == 6;
        let operand = if memory {
            Operand8::Ind(Reg16::Hl)
        } else {
            Operand8::Reg(register8(target, None, false))
        };
        Ok(match family {
            // Rotate/shift — 8 T, (HL) 15 T
            0 => {
                let shift = shift_operation(selector, false);
                if memory {
                    d(Op::Shift(shift, operand, None), 4, 15)
                } else {
                    d(Op::Shift(shift, operand, None), 2, 8)
                }
            }
            // BIT — 8 T, (HL) 12 T
            1 => {
                if memory {
                    d(Op::BitTest(selector, operand), 3, 12)
                } else {
                    d(Op::BitTest(selector, operand), 2, 8)
                }
            }
            // RES/SET — 8 T, (HL) 15 T
            2 => {
                if memory {
                    d(Op::BitReset(selector, operand, None), 4, 15)
                } else {
                    d(Op::BitReset(selector, operand, None), 2, 8)
                }
            }
            _ => {
                if memory {
                    d(Op::BitSet(selector, operand, None), 4, 15)
                } else {
                    d(Op::BitSet(selector, operand, None), 2, 8)
                }
            }
        })
    }

    /// DD CB d op / FD CB d op. All forms operate on (IX+d); register targets
    /// additionally copy the result into the register (undocumented).
    fn decode_z80_indexed_cb(
        &self,
        reader: &mut ByteReader<'_>,
        index_register: Reg16,
    ) -> Result<Decoded, CoreError> {
        let displacement = reader.next_displacement()?;
        let opcode = reader.next()?;
        let family = opcode >> 6 & 0x03;
        let selector = opcode >> 3 & 0x07;
        let target = opcode & 0x07;
        let operand = Operand8::Idx(index_register, displacement);
        let copy = if target == 6 {
            None
        } else {
            Some(register8(target, None, false))
        };
        // Costs exclude the DD/FD prefix cycle charged by the caller:
        // read-modify-write 23 T total, BIT 20 T total.
        Ok(match family {
            0 => d(Op::Shift(shift_operation(selector, false), operand, copy), 5, 19),
            1 => d(Op::BitTest(selector, operand), 4, 16),
            2 => d(Op::BitReset(selector, operand, copy), 5, 19),
            _ => d(Op::BitSet(selector, operand, copy), 5, 19),
        })
    }

    fn decode_z80_ed(
        &self,
        reader: &mut ByteReader<'_>,
        instruction_start: u16,
    ) -> Result<Decoded, CoreError> {
        let opcode = reader.next()?;
        Ok(match opcode {
            // LD I,A / LD R,A / LD A,I / LD A,R — 9 T
            0x47 => d(Op::LoadIFromA, 2, 9),
            0x4F => d(Op::LoadRFromA, 2, 9),
            0x57 => d(Op::LoadAFromI, 2, 9),
            0x5F => d(Op::LoadAFromR, 2, 9),

            // RRD / RLD — 18 T
            0x67 => d(Op::RotateDigitRight, 5, 18),
            0x6F => d(Op::RotateDigitLeft, 5, 18),

            // Block transfer/compare/IO — 16 T, repeat forms 21 T charged
            0xA0 | 0xA8 => d(block_transfer(opcode, None), 4, 16),
            0xB0 | 0xB8 => d(block_transfer(opcode, Some(instruction_start)), 5, 21),
            0xA1 | 0xA9 => d(block_compare(opcode, None), 4, 16),
            0xB1 | 0xB9 => d(block_compare(opcode, Some(instruction_start)), 5, 21),
            0xA2 | 0xAA => d(block_input(opcode, None), 4, 16),
            0xB2 | 0xBA => d(block_input(opcode, Some(instruction_start)), 5, 21),
            0xA3 | 0xAB => d(block_output(opcode, None), 4, 16),
            0xB3 | 0xBB => d(block_output(opcode, Some(instruction_start)), 5, 21),

            // IN r,(C) / IN (C) — 12 T
            op if op & 0xC7 == 0x40 => {
                let target = op >> 3 & 0x07;
                let register = (target != 6).then(|| register8(target, None, false));
                d(Op::InputReg(register), 3, 12)
            }
            // OUT (C),r / OUT (C),0 — 12 T
            op if op & 0xC7 == 0x41 => {
                let source = op >> 3 & 0x07;
                let register = (source != 6).then(|| register8(source, None, false));
                d(Op::OutputReg(register), 3, 12)
            }
            // SBC/ADC HL,rr — 15 T
            op if op & 0xCF == 0x42 => d(Op::Subtract16WithCarry(register_pair(op >> 4 & 0x03, None)), 4, 15),
            op if op & 0xCF == 0x4A => d(Op::Add16WithCarry(register_pair(op >> 4 & 0x03, None)), 4, 15),
            // LD (nn),rr / LD rr,(nn) — 20 T
            op if op & 0xCF == 0x43 => {
                d(Op::Store16(reader.next_word()?, register_pair(op >> 4 & 0x03, None)), 6, 20)
            }
            op if op & 0xCF == 0x4B => {
                d(Op::Load16FromMemory(register_pair(op >> 4 & 0x03, None), reader.next_word()?), 6, 20)
            }
            // NEG (and mirrors) — 8 T
            op if op & 0xC7 == 0x44 => d(Op::Negate, 2, 8),
            // RETI / RETN (and mirrors) — 14 T
            0x4D => d(Op::ReturnFromInterrupt { enable_interrupts: false }, 4, 14),
            op if op & 0xC7 == 0x45 => d(Op::ReturnFromNonMaskable, 4, 14),
            // IM 0/1/2 (and mirrors) — 8 T
            op if op & 0xC7 == 0x46 => d(Op::SetInterruptMode(interrupt_mode(op)), 2, 8),

            // Remaining ED opcodes act as two-M1 NOPs.
            _ => d(Op::Nop, 2, 8),
        })
    }

    // =====================================================================
    // Intel 8080
    // =====================================================================

    /// The prefix-free 8080 table. Opcode holes (0x08 family, 0xCB, 0xD9,
    /// 0xDD/0xED/0xFD) follow the undefined-instruction policy.
    fn decode_intel8080(&self, reader: &mut ByteReader<'_>) -> Result<Decoded, CoreError> {
        let instruction_start = reader.address();
        let opcode = reader.next()?;
        Ok(match opcode {
            0x00 => d(Op::Nop, 1, 4),
            0x76 => d(Op::Halt, 1, 7),

            // Holes in the 8080 table.
            0x08 | 0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38 | 0xCB | 0xD9 | 0xDD | 0xED | 0xFD => {
                return self.undefined(instruction_start, opcode);
            }

            // STAX/LDAX — 7 T
            0x02 => d(Op::Load8(Operand8::Ind(Reg16::Bc), Operand8::Reg(Reg8::A)), 2, 7),
            0x12 => d(Op::Load8(Operand8::Ind(Reg16::De), Operand8::Reg(Reg8::A)), 2, 7),
            0x0A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Ind(Reg16::Bc)), 2, 7),
            0x1A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Ind(Reg16::De)), 2, 7),

            // SHLD/LHLD — 16 T
            0x22 => d(Op::Store16(reader.next_word()?, Reg16::Hl), 5, 16),
            0x2A => d(Op::Load16FromMemory(Reg16::Hl, reader.next_word()?), 5, 16),
            // STA/LDA — 13 T
            0x32 => d(Op::Load8(Operand8::Abs(reader.next_word()?), Operand8::Reg(Reg8::A)), 4, 13),
            0x3A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Abs(reader.next_word()?)), 4, 13),

            // Rotates — 4 T
            0x07 => d(Op::RotateALeftCircular, 1, 4),
            0x0F => d(Op::RotateARightCircular, 1, 4),
            0x17 => d(Op::RotateALeft, 1, 4),
            0x1F => d(Op::RotateARight, 1, 4),

            0x27 => d(Op::DecimalAdjust, 1, 4),
            0x2F => d(Op::Complement, 1, 4),
            0x37 => d(Op::SetCarryFlag, 1, 4),
            0x3F => d(Op::ComplementCarryFlag, 1, 4),

            // XCHG/XTHL/SPHL/PCHL
            0xEB => d(Op::ExchangeDeHl, 1, 5),
            0xE3 => d(Op::ExchangeSpIndirect(Reg16::Hl), 5, 18),
            0xF9 => d(Op::LoadSpFrom(Reg16::Hl), 1, 5),
            0xE9 => d(Op::JumpIndirect(Reg16::Hl), 1, 5),

            // JMP/CALL/RET — 10/17/10 T
            0xC3 => d(Op::Jump(Condition::Always, reader.next_word()?), 3, 10),
            0xCD => {
                let target = reader.next_word()?;
                d(
                    Op::Call {
                        condition: Condition::Always,
                        target,
                        return_address: reader.address(),
                    },
                    5,
                    17,
                )
            }
            0xC9 => d(Op::Return(Condition::Always), 3, 10),

            // IN/OUT — 10 T
            0xDB => d(Op::InputA(reader.next()?), 3, 10),
            0xD3 => d(Op::OutputA(reader.next()?), 3, 10),

            // DI/EI — 4 T
            0xF3 => d(Op::DisableInterrupts, 1, 4),
            0xFB => d(Op::EnableInterrupts, 1, 4),

            // LXI — 10 T
            op if op & 0xCF == 0x01 => {
                d(Op::Load16(register_pair(op >> 4 & 0x03, None), reader.next_word()?), 3, 10)
            }
            // DAD — 10 T
            op if op & 0xCF == 0x09 => {
                d(Op::Add16(Reg16::Hl, register_pair(op >> 4 & 0x03, None)), 3, 10)
            }
            // INX/DCX — 5 T
            op if op & 0xCF == 0x03 => d(Op::Increment16(register_pair(op >> 4 & 0x03, None)), 1, 5),
            op if op & 0xCF == 0x0B => d(Op::Decrement16(register_pair(op >> 4 & 0x03, None)), 1, 5),

            // INR/DCR — 5 T, M forms 10 T
            op if op & 0xC7 == 0x04 || op & 0xC7 == 0x05 => {
                let decrement = op & 0x01 != 0;
                let target = op >> 3 & 0x07;
                let (operand, m, t) = if target == 6 {
                    (Operand8::Ind(Reg16::Hl), 3, 10)
                } else {
                    (Operand8::Reg(register8(target, None, false)), 1, 5)
                };
                let op = if decrement {
                    Op::Decrement8(operand)
                } else {
                    Op::Increment8(operand)
                };
                d(op, m, t)
            }

            // MVI — 7 T, M form 10 T
            op if op & 0xC7 == 0x06 => {
                let target = op >> 3 & 0x07;
                if target == 6 {
                    d(Op::Load8(Operand8::Ind(Reg16::Hl), Operand8::Imm(reader.next()?)), 3, 10)
                } else {
                    d(
                        Op::Load8(
                            Operand8::Reg(register8(target, None, false)),
                            Operand8::Imm(reader.next()?),
                        ),
                        2,
                        7,
                    )
                }
            }

            // MOV — 5 T, memory forms 7 T
            op if op & 0xC0 == 0x40 => {
                let dst = op >> 3 & 0x07;
                let src = op & 0x07;
                if dst == 6 {
                    d(
                        Op::Load8(Operand8::Ind(Reg16::Hl), Operand8::Reg(register8(src, None, false))),
                        2,
                        7,
                    )
                } else if src == 6 {
                    d(
                        Op::Load8(Operand8::Reg(register8(dst, None, false)), Operand8::Ind(Reg16::Hl)),
                        2,
                        7,
                    )
                } else {
                    d(
                        Op::Load8(
                            Operand8::Reg(register8(dst, None, false)),
                            Operand8::Reg(register8(src, None, false)),
                        ),
                        1,
                        5,
                    )
                }
            }

            // ALU r — 4 T, M 7 T
            op if op & 0xC0 == 0x80 => {
                let operation = alu_operation(op >> 3 & 0x07);
                let src = op & 0x07;
                let (operand, m, t) = if src == 6 {
                    (Operand8::Ind(Reg16::Hl), 2, 7)
                } else {
                    (Operand8::Reg(register8(src, None, false)), 1, 4)
                };
                d(Op::Alu(operation, operand), m, t)
            }
            // ALU imm — 7 T
            op if op & 0xC7 == 0xC6 => {
                d(Op::Alu(alu_operation(op >> 3 & 0x07), Operand8::Imm(reader.next()?)), 2, 7)
            }

            // PUSH/POP — 11/10 T
            op if op & 0xCF == 0xC5 => d(Op::Push(register_pair_af(op >> 4 & 0x03, None)), 3, 11),
            op if op & 0xCF == 0xC1 => d(Op::Pop(register_pair_af(op >> 4 & 0x03, None)), 3, 10),

            // Jcc/Ccc/Rcc — taken cost charged
            op if op & 0xC7 == 0xC2 => {
                d(Op::Jump(condition(op >> 3 & 0x07), reader.next_word()?), 3, 10)
            }
            op if op & 0xC7 == 0xC4 => {
                let target = reader.next_word()?;
                d(
                    Op::Call {
                        condition: condition(op >> 3 & 0x07),
                        target,
                        return_address: reader.address(),
                    },
                    5,
                    17,
                )
            }
            op if op & 0xC7 == 0xC0 => d(Op::Return(condition(op >> 3 & 0x07)), 3, 11),
            // RST — 11 T
            op if op & 0xC7 == 0xC7 => d(
                Op::Restart {
                    target: (op & 0x38) as u16,
                    return_address: reader.address(),
                },
                3,
                11,
            ),

            _ => unreachable!("8080 table is total, got {opcode:#04x}"),
        })
    }

    // =====================================================================
    // GameBoy (SM83 opcode-table variant)
    // =====================================================================

    fn decode_gameboy(&self, reader: &mut ByteReader<'_>) -> Result<Decoded, CoreError> {
        let instruction_start = reader.address();
        let opcode = reader.next()?;
        Ok(match opcode {
            0x00 => d(Op::Nop, 1, 4),
            0x76 => d(Op::Halt, 1, 4),
            // STOP skips its padding byte and halts peripherals too.
            0x10 => {
                let _ = reader.next()?;
                d(Op::Stop, 1, 4)
            }

            // Removed opcodes.
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                return self.undefined(instruction_start, opcode);
            }

            0xCB => self.decode_gameboy_cb(reader)?,

            // LD (nn),SP — 20 T
            0x08 => d(Op::Store16(reader.next_word()?, Reg16::Sp), 5, 20),

            // LD (BC)/(DE),A and back — 8 T
            0x02 => d(Op::Load8(Operand8::Ind(Reg16::Bc), Operand8::Reg(Reg8::A)), 2, 8),
            0x12 => d(Op::Load8(Operand8::Ind(Reg16::De), Operand8::Reg(Reg8::A)), 2, 8),
            0x0A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Ind(Reg16::Bc)), 2, 8),
            0x1A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Ind(Reg16::De)), 2, 8),

            // LD (HL±),A / LD A,(HL±) — 8 T
            0x22 => d(Op::Load8(Operand8::HlPostInc, Operand8::Reg(Reg8::A)), 2, 8),
            0x2A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::HlPostInc), 2, 8),
            0x32 => d(Op::Load8(Operand8::HlPostDec, Operand8::Reg(Reg8::A)), 2, 8),
            0x3A => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::HlPostDec), 2, 8),

            // LDH (n),A / LDH A,(n) — 12 T
            0xE0 => d(Op::Load8(Operand8::High(reader.next()?), Operand8::Reg(Reg8::A)), 3, 12),
            0xF0 => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::High(reader.next()?)), 3, 12),
            // LD (C),A / LD A,(C) — 8 T
            0xE2 => d(Op::Load8(Operand8::HighC, Operand8::Reg(Reg8::A)), 2, 8),
            0xF2 => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::HighC), 2, 8),
            // LD (nn),A / LD A,(nn) — 16 T
            0xEA => d(Op::Load8(Operand8::Abs(reader.next_word()?), Operand8::Reg(Reg8::A)), 4, 16),
            0xFA => d(Op::Load8(Operand8::Reg(Reg8::A), Operand8::Abs(reader.next_word()?)), 4, 16),

            // ADD SP,e / LD HL,SP+e — 16/12 T
            0xE8 => d(Op::AddSp(reader.next_displacement()?), 4, 16),
            0xF8 => d(Op::LoadHlSpDisplaced(reader.next_displacement()?), 3, 12),
            // LD SP,HL — 8 T
            0xF9 => d(Op::LoadSpFrom(Reg16::Hl), 2, 8),

            // Rotates — 4 T
            0x07 => d(Op::RotateALeftCircular, 1, 4),
            0x0F => d(Op::RotateARightCircular, 1, 4),
            0x17 => d(Op::RotateALeft, 1, 4),
            0x1F => d(Op::RotateARight, 1, 4),

            0x27 => d(Op::DecimalAdjust, 1, 4),
            0x2F => d(Op::Complement, 1, 4),
            0x37 => d(Op::SetCarryFlag, 1, 4),
            0x3F => d(Op::ComplementCarryFlag, 1, 4),

            // JR e — 12 T; JR cc,e — 12/8 T, taken cost charged
            0x18 => {
                let offset = reader.next_displacement()?;
                d(Op::Jump(Condition::Always, relative_target(reader, offset)), 3, 12)
            }
            op if op & 0xE7 == 0x20 => {
                let offset = reader.next_displacement()?;
                d(
                    Op::Jump(condition(op >> 3 & 0x03), relative_target(reader, offset)),
                    3,
                    12,
                )
            }

            // JP nn — 16 T; JP (HL) — 4 T
            0xC3 => d(Op::Jump(Condition::Always, reader.next_word()?), 4, 16),
            0xE9 => d(Op::JumpIndirect(Reg16::Hl), 1, 4),
            // CALL nn — 24 T
            0xCD => {
                let target = reader.next_word()?;
                d(
                    Op::Call {
                        condition: Condition::Always,
                        target,
                        return_address: reader.address(),
                    },
                    6,
                    24,
                )
            }
            // RET — 16 T; RETI — 16 T, re-enables interrupts
            0xC9 => d(Op::Return(Condition::Always), 4, 16),
            0xD9 => d(Op::ReturnFromInterrupt { enable_interrupts: true }, 4, 16),

            // DI/EI — 4 T
            0xF3 => d(Op::DisableInterrupts, 1, 4),
            0xFB => d(Op::EnableInterrupts, 1, 4),

            // LD rr,nn — 12 T
            op if op & 0xCF == 0x01 => {
                d(Op::Load16(register_pair(op >> 4 & 0x03, None), reader.next_word()?), 3, 12)
            }
            // ADD HL,rr — 8 T
            op if op & 0xCF == 0x09 => {
                d(Op::Add16(Reg16::Hl, register_pair(op >> 4 & 0x03, None)), 2, 8)
            }
            // INC/DEC rr — 8 T
            op if op & 0xCF == 0x03 => d(Op::Increment16(register_pair(op >> 4 & 0x03, None)), 2, 8),
            op if op & 0xCF == 0x0B => d(Op::Decrement16(register_pair(op >> 4 & 0x03, None)), 2, 8),

            // INC/DEC r — 4 T, (HL) 12 T
            op if op & 0xC7 == 0x04 || op & 0xC7 == 0x05 => {
                let decrement = op & 0x01 != 0;
                let target = op >> 3 & 0x07;
                let (operand, m, t) = if target == 6 {
                    (Operand8::Ind(Reg16::Hl), 3, 12)
                } else {
                    (Operand8::Reg(register8(target, None, false)), 1, 4)
                };
                let op = if decrement {
                    Op::Decrement8(operand)
                } else {
                    Op::Increment8(operand)
                };
                d(op, m, t)
            }

            // LD r,n — 8 T, (HL) 12 T
            op if op & 0xC7 == 0x06 => {
                let target = op >> 3 & 0x07;
                if target == 6 {
                    d(Op::Load8(Operand8::Ind(Reg16::Hl), Operand8::Imm(reader.next()?)), 3, 12)
                } else {
                    d(
                        Op::Load8(
                            Operand8::Reg(register8(target, None, false)),
                            Operand8::Imm(reader.next()?),
                        ),
                        2,
                        8,
                    )
                }
            }

            // LD r,r' — 4 T, memory forms 8 T
            op if op & 0xC0 == 0x40 => {
                let dst = op >> 3 & 0x07;
                let src = op & 0x07;
                if dst == 6 {
                    d(
                        Op::Load8(Operand8::Ind(Reg16::Hl), Operand8::Reg(register8(src, None, false))),
                        2,
                        8,
                    )
                } else if src == 6 {
                    d(
                        Op::Load8(Operand8::Reg(register8(dst, None, false)), Operand8::Ind(Reg16::Hl)),
                        2,
                        8,
                    )
                } else {
                    d(
                        Op::Load8(
                            Operand8::Reg(register8(dst, None, false)),
                            Operand8::Reg(register8(src, None, false)),
                        ),
                        1,
                        4,
                    )
                }
            }

            // ALU A,r — 4 T, (HL) 8 T
            op if op & 0xC0 == 0x80 => {
                let operation = alu_operation(op >> 3 & 0x07);
                let src = op & 0x07;
                let (operand, m, t) = if src == 6 {
                    (Operand8::Ind(Reg16::Hl), 2, 8)
                } else {
                    (Operand8::Reg(register8(src, None, false)), 1, 4)
                };
                d(Op::Alu(operation, operand), m, t)
            }
            // ALU A,n — 8 T
            op if op & 0xC7 == 0xC6 => {
                d(Op::Alu(alu_operation(op >> 3 & 0x07), Operand8::Imm(reader.next()?)), 2, 8)
            }

            // PUSH/POP — 16/12 T
            op if op & 0xCF == 0xC5 => d(Op::Push(register_pair_af(op >> 4 & 0x03, None)), 4, 16),
            op if op & 0xCF == 0xC1 => d(Op::Pop(register_pair_af(op >> 4 & 0x03, None)), 3, 12),

            // JP cc — 16/12 T; CALL cc — 24/12 T; RET cc — 20/8 T (taken charged)
            op if op & 0xE7 == 0xC2 => {
                d(Op::Jump(condition(op >> 3 & 0x03), reader.next_word()?), 4, 16)
            }
            op if op & 0xE7 == 0xC4 => {
                let target = reader.next_word()?;
                d(
                    Op::Call {
                        condition: condition(op >> 3 & 0x03),
                        target,
                        return_address: reader.address(),
                    },
                    6,
                    24,
                )
            }
            op if op & 0xE7 == 0xC0 => d(Op::Return(condition(op >> 3 & 0x03)), 5, 20),
            // RST — 16 T
            op if op & 0xC7 == 0xC7 => d(
                Op::Restart {
                    target: (op & 0x38) as u16,
                    return_address: reader.address(),
                },
                4,
                16,
            ),

            _ => unreachable!("gameboy table is total, got {opcode:#04x}"),
        })
    }

    fn decode_gameboy_cb(&self, reader: &mut ByteReader<'_>) -> Result<Decoded, CoreError> {
        let opcode = reader.next()?;
        let family = opcode >> 6 & 0x03;
        let selector = opcode >> 3 & 0x07;
        let target = opcode & 0x07;
        let memory = target == 6;
        let operand = if memory {
            Operand8::Ind(Reg16::Hl)
        } else {
            Operand8::Reg(register8(target, None, false))
        };
        Ok(match family {
            // Rotate/shift/SWAP — 8 T, (HL) 16 T
            0 => {
                let shift = shift_operation(selector, true);
                if memory {
                    d(Op::Shift(shift, operand, None), 4, 16)
                } else {
                    d(Op::Shift(shift, operand, None), 2, 8)
                }
            }
            // BIT — 8 T, (HL) 12 T
            1 => {
                if memory {
                    d(Op::BitTest(selector, operand), 3, 12)
                } else {
                    d(Op::BitTest(selector, operand), 2, 8)
                }
            }
            // RES/SET — 8 T, (HL) 16 T
            2 => {
                if memory {
                    d(Op::BitReset(selector, operand, None), 4, 16)
                } else {
                    d(Op::BitReset(selector, operand, None), 2, 8)
                }
            }
            _ => {
                if memory {
                    d(Op::BitSet(selector, operand, None), 4, 16)
                } else {
                    d(Op::BitSet(selector, operand, None), 2, 8)
                }
            }
        })
    }
}

// --- Table helpers ---

fn hl16(index: Option<Reg16>) -> Reg16 {
    index.unwrap_or(Reg16::Hl)
}

/// 16-bit register pair by table index (0=BC, 1=DE, 2=HL/IX/IY, 3=SP).
fn register_pair(bits: u8, index: Option<Reg16>) -> Reg16 {
    match bits {
        0 => Reg16::Bc,
        1 => Reg16::De,
        2 => hl16(index),
        _ => Reg16::Sp,
    }
}

/// PUSH/POP variant: 3 selects AF instead of SP.
fn register_pair_af(bits: u8, index: Option<Reg16>) -> Reg16 {
    match bits {
        0 => Reg16::Bc,
        1 => Reg16::De,
        2 => hl16(index),
        _ => Reg16::Af,
    }
}

/// 8-bit register by table index. Under a DD/FD prefix, H/L resolve to the
/// index-register halves unless the instruction also touches (IX+d)/(IY+d)
/// memory (`memory_form`), in which case they stay H/L.
fn register8(bits: u8, index: Option<Reg16>, memory_form: bool) -> Reg8 {
    match (bits, index) {
        (4, Some(Reg16::Ix)) if !memory_form => Reg8::IxH,
        (5, Some(Reg16::Ix)) if !memory_form => Reg8::IxL,
        (4, Some(Reg16::Iy)) if !memory_form => Reg8::IyH,
        (5, Some(Reg16::Iy)) if !memory_form => Reg8::IyL,
        (0, _) => Reg8::B,
        (1, _) => Reg8::C,
        (2, _) => Reg8::D,
        (3, _) => Reg8::E,
        (4, _) => Reg8::H,
        (5, _) => Reg8::L,
        (7, _) => Reg8::A,
        _ => unreachable!("register index 6 is a memory operand"),
    }
}

/// (HL), or (IX+d)/(IY+d) with the displacement read here. Returns the extra
/// cost of the indexed effective-address calculation.
fn memory_operand(
    reader: &mut ByteReader<'_>,
    index: Option<Reg16>,
) -> Result<(Operand8, u32, u32), MemoryError> {
    match index {
        Some(reg) => {
            let displacement = reader.next_displacement()?;
            Ok((Operand8::Idx(reg, displacement), 2, 8))
        }
        None => Ok((Operand8::Ind(Reg16::Hl), 0, 0)),
    }
}

fn alu_operation(bits: u8) -> AluOp {
    match bits {
        0 => AluOp::Add,
        1 => AluOp::AddWithCarry,
        2 => AluOp::Subtract,
        3 => AluOp::SubtractWithCarry,
        4 => AluOp::And,
        5 => AluOp::Xor,
        6 => AluOp::Or,
        _ => AluOp::Compare,
    }
}

fn shift_operation(bits: u8, gameboy: bool) -> ShiftOp {
    match bits {
        0 => ShiftOp::RotateLeftCircular,
        1 => ShiftOp::RotateRightCircular,
        2 => ShiftOp::RotateLeft,
        3 => ShiftOp::RotateRight,
        4 => ShiftOp::ShiftLeftArithmetic,
        5 => ShiftOp::ShiftRightArithmetic,
        // Slot 6 is undocumented SLL on the Z80, SWAP on the GameBoy.
        6 if gameboy => ShiftOp::Swap,
        6 => ShiftOp::ShiftLeftLogical,
        _ => ShiftOp::ShiftRightLogical,
    }
}

fn condition(bits: u8) -> Condition {
    match bits {
        0 => Condition::NonZero,
        1 => Condition::Zero,
        2 => Condition::NoCarry,
        3 => Condition::Carry,
        4 => Condition::ParityOdd,
        5 => Condition::ParityEven,
        6 => Condition::Positive,
        _ => Condition::Negative,
    }
}

fn interrupt_mode(opcode: u8) -> InterruptMode {
    match opcode >> 3 & 0x03 {
        2 => InterruptMode::Im1,
        3 => InterruptMode::Im2,
        _ => InterruptMode::Im0,
    }
}

fn relative_target(reader: &ByteReader<'_>, offset: i8) -> u16 {
    reader.address().wrapping_add(offset as i16 as u16)
}

fn block_transfer(opcode: u8, repeat_at: Option<u16>) -> Op {
    Op::BlockTransfer {
        decrement: opcode & 0x08 != 0,
        repeat_at,
    }
}

fn block_compare(opcode: u8, repeat_at: Option<u16>) -> Op {
    Op::BlockCompare {
        decrement: opcode & 0x08 != 0,
        repeat_at,
    }
}

fn block_input(opcode: u8, repeat_at: Option<u16>) -> Op {
    Op::BlockInput {
        decrement: opcode & 0x08 != 0,
        repeat_at,
    }
}

fn block_output(opcode: u8, repeat_at: Option<u16>) -> Op {
    Op::BlockOutput {
        decrement: opcode & 0x08 != 0,
        repeat_at,
    }
}
