//! Error types for the stage model.
//!
//! Configuration problems are detected while registers are written or while
//! the typed stage configuration is decoded, and abort the load. Per-packet
//! anomalies are reported alongside the output PHV instead.

use thiserror::Error;

use crate::device::phv::ContainerId;
use crate::mau::action::OperandSource;
use crate::mau::action_xbar::LaneId;

/// Malformed or inconsistent stage configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Address does not decode to any register family.
    #[error("no register at address 0x{address:012X}")]
    UnknownRegister {
        /// Raw register address.
        address: u64,
    },

    /// Register name not present in the address map.
    #[error("no register named '{0}'")]
    UnknownField(String),

    /// Array index outside the register's dimensions.
    #[error("{name}[{i0}][{i1}][{i2}] outside dimensions {dims:?}")]
    IndexOutOfRange {
        name: &'static str,
        i0: u16,
        i1: u16,
        i2: u16,
        dims: [u16; 3],
    },

    /// Value does not fit the field width.
    #[error("{name}: value 0x{value:X} wider than {width} bits")]
    ValueOutOfRange {
        name: &'static str,
        value: u128,
        width: u8,
    },

    /// Register stream command with an unknown opcode.
    #[error("unknown register command opcode 0x{opcode:02X}")]
    UnknownCommand { opcode: u16 },

    /// Register stream command whose payload length is wrong or cut short.
    #[error("register command 0x{opcode:02X}: {found} payload words, expected {expected}")]
    MalformedCommand { opcode: u16, expected: usize, found: usize },

    /// Direct write aimed at a memory.
    #[error("{name} is a memory and needs an indirect write")]
    NotARegister { name: &'static str },

    /// Indirect write aimed at a plain register.
    #[error("{name} is a register and needs a direct write")]
    NotAMemory { name: &'static str },

    /// Crossbar byte slot selects a container or byte that does not exist.
    #[error("input xbar slot {slot}: container {container} has no byte {byte}")]
    InvalidXbarByte { slot: u16, container: u8, byte: u8 },

    /// Two chain heads of one logical table share a TCAM priority.
    #[error("logical table {logical_table}: TCAMs {first:?} and {second:?} both have priority {priority}")]
    AmbiguousTcamPriority {
        logical_table: u8,
        priority: u8,
        first: (u8, u8),
        second: (u8, u8),
    },

    /// TCAM row input selects a group or half-byte the crossbar does not have.
    #[error("TCAM ({row},{col}) selects group {group} / half-byte {halfbyte}")]
    InvalidTcamInput { row: u8, col: u8, group: u8, halfbyte: u8 },

    /// A TCAM chains into a row that does not exist or is disabled.
    #[error("TCAM ({row},{col}) chains into a missing or disabled TCAM")]
    BrokenTcamChain { row: u8, col: u8 },

    /// Two exact-match ways of one logical table share a priority.
    #[error("logical table {logical_table}: ways {first} and {second} both have priority {priority}")]
    AmbiguousWayPriority {
        logical_table: u8,
        priority: u8,
        first: u8,
        second: u8,
    },

    /// Way RAM selection reaches past the last SRAM column.
    #[error("way {way}: RAM unit ({row},{col}) outside the SRAM array")]
    RamUnitOutOfRange { way: u8, row: u8, col: u8 },

    /// Byte swizzle control is not a permutation.
    #[error("byte swizzle for row {row} bus {bus} is not a permutation")]
    SwizzleNotPermutation { row: u8, bus: u8 },

    /// Two ternary indirection buses claim the same logical table.
    #[error("logical table {logical_table}: tind buses {first} and {second} both claim it")]
    TindConflict {
        logical_table: u8,
        first: u8,
        second: u8,
    },

    /// Per-entry enable mux holds a reserved value.
    #[error("{kind} enable mux for logical table {logical_table}: reserved value {value}")]
    InvalidEnableMux {
        kind: &'static str,
        logical_table: u8,
        value: u8,
    },

    /// Container index outside the PHV.
    #[error("container {container} does not exist")]
    InvalidContainer { container: u16 },

    /// Lane enabled with no source selection programmed.
    #[error("action lane {lane} enabled without a source selection")]
    LaneWithoutSource { lane: LaneId },

    /// Lane source does not fit the source container.
    #[error("action lane {lane} cannot take its source from container {container}")]
    LaneWidthMismatch { lane: LaneId, container: u8 },

    /// Two enabled lanes drive the same action bus byte.
    #[error("action bus row {row} byte {byte} driven by both {first} and {second}")]
    LaneConflict {
        row: u8,
        byte: u8,
        first: LaneId,
        second: LaneId,
    },

    /// Instruction word cannot be decoded.
    #[error("imem_subword{width}[{slot}][{addr}] = 0x{word:08X}: {reason}")]
    InvalidInstruction {
        width: u8,
        slot: u8,
        addr: u8,
        word: u32,
        reason: &'static str,
    },

    /// Erratum name not recognized.
    #[error("unknown hardware erratum '{0}'")]
    UnknownErratum(String),
}

/// An action read a container (or bus byte) that was never written.
///
/// Reported per packet; the destination container is left invalid.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("logical table {logical_table} wrote container {dest} from undefined {operand}")]
pub struct UndefinedSource {
    /// Logical table whose action performed the read
    pub logical_table: u8,
    /// Destination container of the instruction
    pub dest: ContainerId,
    /// Operand that was undefined
    pub operand: OperandSource,
}
