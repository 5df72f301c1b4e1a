//! Register blob parser and writer.
//!
//! A register blob is a binary stream of register writes that programs one
//! stage. It is the on-disk form of a configuration fixture.
//!
//! # Format Overview
//!
//! ```text
//! +------------------------------------------+
//! | Header (20 bytes)                        |
//! |   NumWords: 4                            |
//! |   IdentWord: "MAUR"                      |
//! |   Version: 0x0100                        |
//! |   Length: words (excluding header)       |
//! |   CheckSum: one's complement             |
//! +------------------------------------------+
//! | Command stream                           |
//! |   Each command: [len:16|opcode:16] + payload
//! |   WRITE    addr_lo addr_hi v0 v1 v2 v3   |
//! |   INDIRECT addr_lo addr_hi w0[4] w1[4]   |
//! |   NOP      len padding words             |
//! |   END                                    |
//! +------------------------------------------+
//! ```
//!
//! 128-bit values are stored as four little-endian 32-bit words, least
//! significant word first.
//!
//! # Example
//!
//! ```
//! use mau_emu::parser::regblob::{RegBlob, RegBlobWriter, RegCommand};
//!
//! let mut w = RegBlobWriter::new();
//! w.write(0x1300_0000_0000, 100);
//! let bytes = w.finish();
//!
//! let blob = RegBlob::parse(&bytes)?;
//! let cmds: Vec<_> = blob.commands().collect();
//! assert_eq!(cmds[0], RegCommand::Write { address: 0x1300_0000_0000, value: 100 });
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::block;

/// Blob magic: "MAUR" in little-endian
pub const REGBLOB_MAGIC: u32 = 0x5255_414D;

/// Current format version
pub const REGBLOB_VERSION: u32 = 0x0100;

/// Header size in bytes
pub const REGBLOB_HEADER_SIZE: usize = 20;

const WRITE_PAYLOAD_WORDS: usize = 6;
const INDIRECT_PAYLOAD_WORDS: usize = 10;

/// Raw blob header (20 bytes)
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawRegBlobHeader {
    /// Number of remaining words in header (always 4)
    pub num_words: u32,
    /// Identification word: "MAUR"
    pub ident_word: u32,
    /// Format version
    pub version: u32,
    /// Length in 32-bit words (excluding header)
    pub length: u32,
    /// One's complement checksum of header fields
    pub checksum: u32,
}

impl RawRegBlobHeader {
    fn expected_checksum(&self) -> u32 {
        !(self
            .num_words
            .wrapping_add(self.ident_word)
            .wrapping_add(self.version)
            .wrapping_add(self.length))
    }
}

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegOpcode {
    Write,
    Indirect,
    Nop,
    End,
    Unknown(u16),
}

impl From<u16> for RegOpcode {
    fn from(v: u16) -> Self {
        match v {
            0x01 => Self::Write,
            0x02 => Self::Indirect,
            0x03 => Self::Nop,
            0x04 => Self::End,
            other => Self::Unknown(other),
        }
    }
}

impl RegOpcode {
    pub fn bits(self) -> u16 {
        match self {
            Self::Write => 0x01,
            Self::Indirect => 0x02,
            Self::Nop => 0x03,
            Self::End => 0x04,
            Self::Unknown(v) => v,
        }
    }
}

/// Decoded blob command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegCommand {
    /// Direct register write
    Write { address: u64, value: u128 },

    /// Two-word TCAM/SRAM write
    Indirect { address: u64, word0: u128, word1: u128 },

    /// Padding
    Nop { words: u16 },

    /// End of stream
    End,

    /// Unknown opcode
    Unknown { opcode: u16, payload: Vec<u32> },

    /// Known opcode with a wrong or truncated payload
    Malformed { opcode: u16, expected: usize, found: usize },
}

impl RegCommand {
    /// Target address for write commands
    pub fn address(&self) -> Option<u64> {
        match self {
            Self::Write { address, .. } | Self::Indirect { address, .. } => Some(*address),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Write { .. } => "WRITE",
            Self::Indirect { .. } => "INDIRECT",
            Self::Nop { .. } => "NOP",
            Self::End => "END",
            Self::Unknown { .. } => "UNKNOWN",
            Self::Malformed { .. } => "MALFORMED",
        }
    }
}

fn read_u128(words: &[u32]) -> u128 {
    words.iter().rev().fold(0u128, |acc, &w| (acc << 32) | w as u128)
}

fn read_address(lo: u32, hi: u32) -> u64 {
    ((hi as u64) << 32) | lo as u64
}

/// Parsed register blob
pub struct RegBlob<'a> {
    data: &'a [u8],
    pub header: RawRegBlobHeader,
}

impl<'a> RegBlob<'a> {
    /// Parse a blob from raw bytes
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < REGBLOB_HEADER_SIZE {
            bail!("register blob too small: {} bytes (minimum {})", data.len(), REGBLOB_HEADER_SIZE);
        }

        let (header, _) = RawRegBlobHeader::read_from_prefix(data)
            .map_err(|e| anyhow!("failed to parse register blob header: {:?}", e))?;

        if header.ident_word != REGBLOB_MAGIC {
            bail!("invalid register blob magic: 0x{:08X} (expected 0x{:08X})", header.ident_word, REGBLOB_MAGIC);
        }
        if header.version >> 8 != REGBLOB_VERSION >> 8 {
            bail!("unsupported register blob version 0x{:04X}", header.version);
        }

        let computed = header.expected_checksum();
        if header.checksum != computed {
            bail!("register blob checksum mismatch: expected 0x{:08X}, got 0x{:08X}", computed, header.checksum);
        }

        let available = (data.len() - REGBLOB_HEADER_SIZE) / 4;
        if header.length as usize > available {
            bail!("register blob truncated: header claims {} words, {} present", header.length, available);
        }

        Ok(Self { data, header })
    }

    /// Length of the command stream in words
    pub fn length_words(&self) -> usize {
        self.header.length as usize
    }

    /// Raw command bytes
    pub fn command_data(&self) -> &'a [u8] {
        &self.data[REGBLOB_HEADER_SIZE..REGBLOB_HEADER_SIZE + self.length_words() * 4]
    }

    /// Iterate over all commands
    pub fn commands(&self) -> RegCommandIterator<'a> {
        RegCommandIterator { data: self.command_data(), offset: 0 }
    }

    /// Count commands by type
    pub fn command_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for cmd in self.commands() {
            let key = match &cmd {
                RegCommand::Unknown { opcode, .. } => format!("UNKNOWN(0x{:02X})", opcode),
                RegCommand::Malformed { opcode, .. } => format!("MALFORMED(0x{:02X})", opcode),
                other => other.name().to_string(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// Print a summary of the blob contents
    pub fn print_summary(&self) {
        println!("Register Blob Summary");
        println!("=====================");
        println!("Version: 0x{:04X}", self.header.version);
        println!("Length: {} words ({} bytes)", self.length_words(), self.length_words() * 4);
        println!();
        println!("Command counts:");
        let counts = self.command_counts();
        let mut sorted: Vec<_> = counts.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1));
        for (name, count) in sorted {
            println!("  {}: {}", name, count);
        }
    }
}

/// Iterator over blob commands
pub struct RegCommandIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for RegCommandIterator<'a> {
    type Item = RegCommand;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + 4 > self.data.len() {
            return None;
        }

        // [31:16] = payload length, [15:0] = opcode
        let cmd_word = LittleEndian::read_u32(&self.data[self.offset..]);
        self.offset += 4;

        let raw_opcode = (cmd_word & 0xFFFF) as u16;
        let opcode = RegOpcode::from(raw_opcode);
        let payload_len = (cmd_word >> 16) as usize;
        let payload_bytes = payload_len * 4;
        if self.offset + payload_bytes > self.data.len() {
            let found = (self.data.len() - self.offset) / 4;
            self.offset = self.data.len();
            return Some(RegCommand::Malformed { opcode: raw_opcode, expected: payload_len, found });
        }

        let mut payload = vec![0u32; payload_len];
        LittleEndian::read_u32_into(&self.data[self.offset..self.offset + payload_bytes], &mut payload);
        self.offset += payload_bytes;

        let cmd = match opcode {
            RegOpcode::Write if payload_len == WRITE_PAYLOAD_WORDS => RegCommand::Write {
                address: read_address(payload[0], payload[1]),
                value: read_u128(&payload[2..6]),
            },
            RegOpcode::Indirect if payload_len == INDIRECT_PAYLOAD_WORDS => RegCommand::Indirect {
                address: read_address(payload[0], payload[1]),
                word0: read_u128(&payload[2..6]),
                word1: read_u128(&payload[6..10]),
            },
            RegOpcode::Write => {
                RegCommand::Malformed { opcode: raw_opcode, expected: WRITE_PAYLOAD_WORDS, found: payload_len }
            }
            RegOpcode::Indirect => {
                RegCommand::Malformed { opcode: raw_opcode, expected: INDIRECT_PAYLOAD_WORDS, found: payload_len }
            }
            RegOpcode::Nop => RegCommand::Nop { words: payload_len as u16 },
            RegOpcode::End => RegCommand::End,
            RegOpcode::Unknown(_) => RegCommand::Unknown { opcode: raw_opcode, payload },
        };
        Some(cmd)
    }
}

/// Builds a register blob.
#[derive(Debug, Default)]
pub struct RegBlobWriter {
    words: Vec<u32>,
}

impl RegBlobWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize every written register and memory word of a register file.
    pub fn from_registers(regs: &RegisterFile) -> Self {
        let mut w = Self::new();
        for (addr, value) in regs.registers() {
            w.write(addr.raw(), value);
        }
        for mem in [block::TCAM, block::SRAM] {
            for (addr, (w0, w1)) in regs.memory_words(mem) {
                w.indirect(addr.raw(), w0, w1);
            }
        }
        w.end();
        w
    }

    fn command(&mut self, opcode: RegOpcode, payload_len: usize) {
        self.words.push(((payload_len as u32) << 16) | opcode.bits() as u32);
    }

    fn push_address(&mut self, address: u64) {
        self.words.push(address as u32);
        self.words.push((address >> 32) as u32);
    }

    fn push_u128(&mut self, value: u128) {
        for i in 0..4 {
            self.words.push((value >> (32 * i)) as u32);
        }
    }

    pub fn write(&mut self, address: u64, value: u128) -> &mut Self {
        self.command(RegOpcode::Write, WRITE_PAYLOAD_WORDS);
        self.push_address(address);
        self.push_u128(value);
        self
    }

    pub fn indirect(&mut self, address: u64, word0: u128, word1: u128) -> &mut Self {
        self.command(RegOpcode::Indirect, INDIRECT_PAYLOAD_WORDS);
        self.push_address(address);
        self.push_u128(word0);
        self.push_u128(word1);
        self
    }

    pub fn nop(&mut self, words: u16) -> &mut Self {
        self.command(RegOpcode::Nop, words as usize);
        self.words.extend(std::iter::repeat(0).take(words as usize));
        self
    }

    pub fn end(&mut self) -> &mut Self {
        self.command(RegOpcode::End, 0);
        self
    }

    /// Command stream words written so far.
    pub fn len_words(&self) -> usize {
        self.words.len()
    }

    /// Emit header and command stream.
    pub fn finish(&self) -> Vec<u8> {
        let mut header = RawRegBlobHeader {
            num_words: 4,
            ident_word: REGBLOB_MAGIC,
            version: REGBLOB_VERSION,
            length: self.words.len() as u32,
            checksum: 0,
        };
        header.checksum = header.expected_checksum();

        let mut out = Vec::with_capacity(REGBLOB_HEADER_SIZE + self.words.len() * 4);
        for w in [header.num_words, header.ident_word, header.version, header.length, header.checksum]
            .into_iter()
            .chain(self.words.iter().copied())
        {
            // Writing into a Vec cannot fail
            let _ = out.write_u32::<LittleEndian>(w);
        }
        out
    }
}
