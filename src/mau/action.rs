//! Instruction memory and action ALUs.
//!
//! Every PHV container has its own ALU and its own column of 64 instruction
//! words in `imem_subword8/16/32`. Running action address `A` executes word
//! `A` of every container at once (a nop leaves the container untouched).
//!
//! # Instruction Word
//!
//! ```text
//!  29  28    24 23        14 13         4 3      0
//! +---+--------+------------+------------+--------+
//! | - | shift  |    src2    |    src1    |   op   |
//! +---+--------+------------+------------+--------+
//!
//! operand: kind[9:8] | arg[7:0]
//!   0 PHV container   1 action bus byte offset
//!   2 immediate slice 3 sign-extended constant
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::device::phv::{ContainerId, ContainerWidth, Phv};
use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{block, field_by_block, ACTION_BUS_BYTES, IMEM_DEPTH};
use crate::error::{ConfigError, UndefinedSource};
use crate::mau::action_xbar::ActionBus;

/// ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Nop,
    Set,
    Add,
    Sub,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Min,
    Max,
    Not,
    SatAdd,
    SatSub,
}

impl AluOp {
    pub fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0 => AluOp::Nop,
            1 => AluOp::Set,
            2 => AluOp::Add,
            3 => AluOp::Sub,
            4 => AluOp::And,
            5 => AluOp::Or,
            6 => AluOp::Xor,
            7 => AluOp::Shl,
            8 => AluOp::Shr,
            9 => AluOp::Min,
            10 => AluOp::Max,
            11 => AluOp::Not,
            12 => AluOp::SatAdd,
            13 => AluOp::SatSub,
            _ => return None,
        })
    }

    pub fn bits(self) -> u8 {
        match self {
            AluOp::Nop => 0,
            AluOp::Set => 1,
            AluOp::Add => 2,
            AluOp::Sub => 3,
            AluOp::And => 4,
            AluOp::Or => 5,
            AluOp::Xor => 6,
            AluOp::Shl => 7,
            AluOp::Shr => 8,
            AluOp::Min => 9,
            AluOp::Max => 10,
            AluOp::Not => 11,
            AluOp::SatAdd => 12,
            AluOp::SatSub => 13,
        }
    }

    /// Operands read by the op.
    pub fn operands(self) -> usize {
        match self {
            AluOp::Nop => 0,
            AluOp::Set | AluOp::Not | AluOp::Shl | AluOp::Shr => 1,
            _ => 2,
        }
    }
}

/// Operand of an ALU instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandSource {
    Container(ContainerId),
    Bus(u8),
    Immediate(u8),
    Constant(i8),
}

impl OperandSource {
    /// Decode a 10-bit operand for an ALU of `width`.
    fn decode(bits: u16, width: ContainerWidth) -> Result<Self, &'static str> {
        let arg = (bits & 0xFF) as u8;
        match bits >> 8 {
            0 => ContainerId::new(arg as u16).map(OperandSource::Container).ok_or("operand container out of range"),
            1 => {
                if arg as usize + width.bytes() > ACTION_BUS_BYTES {
                    return Err("operand runs past the action bus");
                }
                Ok(OperandSource::Bus(arg))
            }
            2 => {
                if (arg as usize) >= 4 / width.bytes() {
                    return Err("immediate slice out of range");
                }
                Ok(OperandSource::Immediate(arg))
            }
            _ => Ok(OperandSource::Constant(arg as i8)),
        }
    }

    fn encode(self) -> u16 {
        match self {
            OperandSource::Container(id) => id.id() as u16,
            OperandSource::Bus(offset) => (1 << 8) | offset as u16,
            OperandSource::Immediate(slice) => (2 << 8) | slice as u16,
            OperandSource::Constant(c) => (3 << 8) | (c as u8) as u16,
        }
    }
}

impl fmt::Display for OperandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandSource::Container(id) => write!(f, "container {}", id),
            OperandSource::Bus(offset) => write!(f, "action bus byte {}", offset),
            OperandSource::Immediate(slice) => write!(f, "immediate slice {}", slice),
            OperandSource::Constant(c) => write!(f, "constant {}", c),
        }
    }
}

/// One decoded ALU instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: AluOp,
    pub src1: OperandSource,
    pub src2: OperandSource,
    pub shift: u8,
}

impl Instruction {
    pub fn new(op: AluOp, src1: OperandSource, src2: OperandSource, shift: u8) -> Self {
        Self { op, src1, src2, shift: shift & 0x1F }
    }

    pub fn decode(word: u32, width: ContainerWidth) -> Result<Self, &'static str> {
        let op = AluOp::from_bits((word & 0xF) as u8).ok_or("reserved opcode")?;
        Ok(Self {
            op,
            src1: OperandSource::decode(((word >> 4) & 0x3FF) as u16, width)?,
            src2: OperandSource::decode(((word >> 14) & 0x3FF) as u16, width)?,
            shift: ((word >> 24) & 0x1F) as u8,
        })
    }

    pub fn encode(&self) -> u32 {
        (self.op.bits() as u32)
            | ((self.src1.encode() as u32) << 4)
            | ((self.src2.encode() as u32) << 14)
            | ((self.shift as u32 & 0x1F) << 24)
    }

    fn eval(&self, a: u32, b: u32, width: ContainerWidth) -> u32 {
        let mask = width.mask();
        let (a, b) = (a & mask, b & mask);
        let shift = self.shift as u32;
        let r = match self.op {
            AluOp::Nop => a,
            AluOp::Set => a,
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Shl => a.checked_shl(shift).unwrap_or(0),
            AluOp::Shr => a.checked_shr(shift).unwrap_or(0),
            AluOp::Min => a.min(b),
            AluOp::Max => a.max(b),
            AluOp::Not => !a,
            AluOp::SatAdd => (a as u64 + b as u64).min(mask as u64) as u32,
            AluOp::SatSub => a.saturating_sub(b),
        };
        r & mask
    }
}

/// Write produced by one container's ALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerWrite {
    pub container: ContainerId,
    pub value: u32,
    pub valid: bool,
}

/// Decoded instruction memory: per action address, the non-nop words.
#[derive(Debug, Clone, Default)]
pub struct InstructionMemory {
    words: BTreeMap<u8, Vec<(ContainerId, Instruction)>>,
}

impl InstructionMemory {
    pub fn decode(regs: &RegisterFile) -> Result<Self, ConfigError> {
        let mut imem = Self::default();
        let banks = [
            (block::IMEM_SUBWORD8, ContainerWidth::W8, 8u8),
            (block::IMEM_SUBWORD16, ContainerWidth::W16, 16),
            (block::IMEM_SUBWORD32, ContainerWidth::W32, 32),
        ];

        for (blk, width, bits) in banks {
            let Some(spec) = field_by_block(blk) else { continue };
            for (addr, word) in regs.registers().filter(|(a, _)| a.block == blk) {
                let word = word as u32;
                let (slot, ia) = (addr.i0 as u8, addr.i1 as u8);
                debug_assert!(spec.contains(addr.i0, addr.i1, 0) && (ia as usize) < IMEM_DEPTH);
                let instr = Instruction::decode(word, width).map_err(|reason| ConfigError::InvalidInstruction {
                    width: bits,
                    slot,
                    addr: ia,
                    word,
                    reason,
                })?;
                if instr.op == AluOp::Nop {
                    continue;
                }
                let container = ContainerId::from_slot(width, slot).ok_or(ConfigError::InvalidContainer { container: slot as u16 })?;
                imem.words.entry(ia).or_default().push((container, instr));
            }
        }
        for list in imem.words.values_mut() {
            list.sort_by_key(|(c, _)| *c);
        }
        Ok(imem)
    }

    /// Instructions run by an action address.
    pub fn at(&self, addr: u8) -> &[(ContainerId, Instruction)] {
        self.words.get(&addr).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.words.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Runs action addresses against a PHV snapshot.
pub struct ActionEngine<'a> {
    imem: &'a InstructionMemory,
    bus: &'a ActionBus,
}

impl<'a> ActionEngine<'a> {
    pub fn new(imem: &'a InstructionMemory, bus: &'a ActionBus) -> Self {
        Self { imem, bus }
    }

    fn operand(&self, src: OperandSource, width: ContainerWidth, immediate: u32, phv: &Phv) -> Option<u32> {
        match src {
            OperandSource::Container(id) => phv.value(id),
            OperandSource::Bus(offset) => self.bus.read(offset as usize, width.bytes()),
            OperandSource::Immediate(slice) => {
                let bits = width.bits();
                Some(immediate.checked_shr(slice as u32 * bits).unwrap_or(0) & width.mask())
            }
            OperandSource::Constant(c) => Some(c as i32 as u32 & width.mask()),
        }
    }

    /// Execute one logical table's action address.
    ///
    /// Returns the container writes and any operand that read undefined data.
    pub fn execute(
        &self,
        logical_table: u8,
        addr: u8,
        immediate: u32,
        phv: &Phv,
    ) -> (Vec<ContainerWrite>, Vec<UndefinedSource>) {
        let mut writes = Vec::new();
        let mut undefined = Vec::new();

        for (dest, instr) in self.imem.at(addr) {
            let width = dest.width();
            let sources = [instr.src1, instr.src2];
            let mut values = [0u32; 2];
            let mut valid = true;

            for (i, src) in sources.iter().take(instr.op.operands()).enumerate() {
                match self.operand(*src, width, immediate, phv) {
                    Some(v) => values[i] = v,
                    None => {
                        valid = false;
                        undefined.push(UndefinedSource { logical_table, dest: *dest, operand: *src });
                    }
                }
            }

            let value = if valid { instr.eval(values[0], values[1], width) } else { 0 };
            log::trace!("table {} {:?} -> {} = 0x{:X} (valid {})", logical_table, instr.op, dest, value, valid);
            writes.push(ContainerWrite { container: *dest, value, valid });
        }
        (writes, undefined)
    }

    /// Execute one action and return the resulting PHV.
    pub fn apply(&self, addr: u8, immediate: u32, phv: &Phv) -> (Phv, Vec<UndefinedSource>) {
        let (writes, undefined) = self.execute(0, addr, immediate, phv);
        let mut out = phv.clone();
        for w in merge_writes(writes) {
            out.write_result(w.container, w.value, w.valid);
        }
        (out, undefined)
    }
}

/// Combine writes aimed at the same container: values OR, validity AND.
pub fn merge_writes(writes: impl IntoIterator<Item = ContainerWrite>) -> Vec<ContainerWrite> {
    let mut merged: BTreeMap<ContainerId, ContainerWrite> = BTreeMap::new();
    for w in writes {
        merged
            .entry(w.container)
            .and_modify(|m| {
                m.value |= w.value;
                m.valid &= w.valid;
            })
            .or_insert(w);
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mau::action_xbar::ActionHvXbarBuilder;

    fn c(id: u16) -> ContainerId {
        ContainerId::new(id).unwrap()
    }

    fn write_instr(regs: &mut RegisterFile, dest: ContainerId, addr: u16, instr: Instruction) {
        let name = match dest.width() {
            ContainerWidth::W8 => "imem_subword8",
            ContainerWidth::W16 => "imem_subword16",
            ContainerWidth::W32 => "imem_subword32",
        };
        regs.write_field(name, [dest.slot() as u16, addr, 0], instr.encode() as u128).unwrap();
    }

    #[test]
    fn test_instruction_round_trip() {
        let i = Instruction::new(AluOp::SatAdd, OperandSource::Container(c(130)), OperandSource::Constant(-3), 4);
        assert_eq!(Instruction::decode(i.encode(), ContainerWidth::W16), Ok(i));
        assert!(i.encode() < 1 << 30);
    }

    #[test]
    fn test_reserved_opcode_rejected() {
        let mut regs = RegisterFile::new();
        regs.write_field("imem_subword16", [2, 5, 0], 0xE).unwrap();
        assert_eq!(
            InstructionMemory::decode(&regs).unwrap_err(),
            ConfigError::InvalidInstruction { width: 16, slot: 2, addr: 5, word: 0xE, reason: "reserved opcode" }
        );
    }

    #[test]
    fn test_immediate_slice_checked() {
        let word = Instruction::new(AluOp::Set, OperandSource::Immediate(2), OperandSource::Constant(0), 0).encode();
        assert!(Instruction::decode(word, ContainerWidth::W8).is_ok());
        assert!(Instruction::decode(word, ContainerWidth::W16).is_err());
    }

    #[test]
    fn test_alu_ops() {
        let w8 = ContainerWidth::W8;
        let mk = |op| Instruction::new(op, OperandSource::Constant(0), OperandSource::Constant(0), 3);
        assert_eq!(mk(AluOp::Add).eval(0xF0, 0x20, w8), 0x10);
        assert_eq!(mk(AluOp::Sub).eval(0x01, 0x02, w8), 0xFF);
        assert_eq!(mk(AluOp::SatAdd).eval(0xF0, 0x20, w8), 0xFF);
        assert_eq!(mk(AluOp::SatSub).eval(0x01, 0x02, w8), 0x00);
        assert_eq!(mk(AluOp::Shl).eval(0x21, 0, w8), 0x08);
        assert_eq!(mk(AluOp::Shr).eval(0x21, 0, w8), 0x04);
        assert_eq!(mk(AluOp::Not).eval(0x0F, 0, w8), 0xF0);
        assert_eq!(mk(AluOp::Min).eval(7, 9, w8), 7);
        assert_eq!(mk(AluOp::Max).eval(7, 9, w8), 9);
        assert_eq!(mk(AluOp::Xor).eval(0xFF, 0x0F, w8), 0xF0);
    }

    #[test]
    fn test_execute_with_bus_and_immediate() {
        let mut regs = RegisterFile::new();
        // W5 = bus word 0 + immediate; H0 = immediate slice 1
        write_instr(&mut regs, c(5), 4, Instruction::new(AluOp::Add, OperandSource::Bus(0), OperandSource::Immediate(0), 0));
        write_instr(&mut regs, c(128), 4, Instruction::new(AluOp::Set, OperandSource::Immediate(1), OperandSource::Constant(0), 0));
        let imem = InstructionMemory::decode(&regs).unwrap();
        assert_eq!(imem.len(), 2);

        let mut b = ActionHvXbarBuilder::new();
        b.ctl_word(0, 0, 1).word_enable(0, 1);
        let mut phv = Phv::ingress();
        phv.set_id(1, 100).unwrap();
        let bus = b.commit().unwrap().assemble(&phv);

        let engine = ActionEngine::new(&imem, &bus);
        let (out, undefined) = engine.apply(4, 0x0007_0005, &phv);
        assert!(undefined.is_empty());
        assert_eq!(out.value(c(5)), Some(0x0007_0069));
        assert_eq!(out.value(c(128)), Some(0x0007));
        // unrelated containers untouched
        assert_eq!(out.value(c(1)), Some(100));
    }

    #[test]
    fn test_undefined_source_invalidates_dest() {
        let mut regs = RegisterFile::new();
        write_instr(&mut regs, c(2), 1, Instruction::new(AluOp::Add, OperandSource::Container(c(3)), OperandSource::Constant(1), 0));
        let imem = InstructionMemory::decode(&regs).unwrap();
        let bus = ActionBus::default();

        let mut phv = Phv::ingress();
        phv.set_id(2, 9).unwrap();
        let (out, undefined) = ActionEngine::new(&imem, &bus).apply(1, 0, &phv);
        assert_eq!(out.value(c(2)), None);
        assert_eq!(undefined, vec![UndefinedSource { logical_table: 0, dest: c(2), operand: OperandSource::Container(c(3)) }]);
        assert_eq!(undefined[0].to_string(), "logical table 0 wrote container W2 from undefined container W3");
    }

    #[test]
    fn test_merge_writes() {
        let merged = merge_writes([
            ContainerWrite { container: c(7), value: 0x0F, valid: true },
            ContainerWrite { container: c(7), value: 0xF0, valid: true },
            ContainerWrite { container: c(8), value: 1, valid: true },
            ContainerWrite { container: c(8), value: 2, valid: false },
        ]);
        assert_eq!(merged[0], ContainerWrite { container: c(7), value: 0xFF, valid: true });
        assert!(!merged[1].valid);
    }
}
