//! Hash generation.
//!
//! Each of the 16 hash tables owns a 64 x 52 Galois-field matrix: input bit
//! `b` of the table flips the output bits in `galois_field_matrix[t][b]`.
//! A hash group XORs the outputs of the tables selected in its
//! `hash_group_ctl`, keeps the bits in `parity_group_mask` and XORs in the
//! group seed.
//!
//! ```text
//! hash(g) = (XOR over t in ctl[g], b set in input[t] of matrix[t][b])
//!           & parity_group_mask[g] ^ hash_seed[g]
//! ```

use std::fmt;

use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{block, field_by_block, HASH_BITS, HASH_GROUPS, HASH_TABLES, HASH_TABLE_BITS};
use crate::error::ConfigError;
use crate::mau::input_xbar::MatchInput;

/// Mask of the 52 hash output bits.
pub const HASH_MASK: u64 = (1 << HASH_BITS) - 1;

/// A 52-bit hash value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HashValue(u64);

impl HashValue {
    pub fn new(bits: u64) -> Self {
        Self(bits & HASH_MASK)
    }

    #[inline]
    pub fn bits(self) -> u64 {
        self.0
    }

    /// `width` bits starting at `shift`.
    #[inline]
    pub fn field(self, shift: u8, width: u8) -> u64 {
        if shift >= 64 {
            return 0;
        }
        let v = self.0 >> shift;
        if width >= 64 {
            v
        } else {
            v & ((1u64 << width) - 1)
        }
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:013X}", self.0)
    }
}

/// One hash group's selection, mask and seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashGroup {
    pub tables: u16,
    pub parity_mask: u64,
    pub seed: u64,
}

impl Default for HashGroup {
    fn default() -> Self {
        Self { tables: 0, parity_mask: HASH_MASK, seed: 0 }
    }
}

/// Decoded hash generation registers.
#[derive(Debug, Clone)]
pub struct HashConfig {
    matrix: Vec<[u64; HASH_TABLE_BITS]>,
    groups: [HashGroup; HASH_GROUPS],
}

impl Default for HashConfig {
    fn default() -> Self {
        Self { matrix: vec![[0; HASH_TABLE_BITS]; HASH_TABLES], groups: [HashGroup::default(); HASH_GROUPS] }
    }
}

impl HashConfig {
    pub fn decode(regs: &RegisterFile) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(spec) = field_by_block(block::GALOIS_FIELD_MATRIX) {
            for (t, column) in config.matrix.iter_mut().enumerate() {
                for (b, out) in column.iter_mut().enumerate() {
                    *out = regs.get_u64(spec, t, b, 0);
                }
            }
        }

        let specs = (
            field_by_block(block::HASH_GROUP_CTL),
            field_by_block(block::PARITY_GROUP_MASK),
            field_by_block(block::HASH_SEED),
        );
        if let (Some(ctl), Some(mask), Some(seed)) = specs {
            for (g, group) in config.groups.iter_mut().enumerate() {
                *group = HashGroup {
                    tables: regs.get(ctl, g, 0, 0) as u16,
                    parity_mask: regs.get_u64(mask, g, 0, 0),
                    seed: regs.get_u64(seed, g, 0, 0),
                };
            }
        }
        Ok(config)
    }

    pub fn group(&self, g: usize) -> &HashGroup {
        &self.groups[g]
    }

    /// Matrix contribution of one table for the given input bits.
    pub fn table_hash(&self, t: usize, bits: u64) -> u64 {
        let column = &self.matrix[t];
        let mut acc = 0u64;
        let mut rest = bits;
        while rest != 0 {
            let b = rest.trailing_zeros() as usize;
            acc ^= column[b];
            rest &= rest - 1;
        }
        acc
    }

    /// Hash of one group over per-table input bits.
    pub fn compute_hash(&self, group: usize, inputs: &[u64; HASH_TABLES]) -> HashValue {
        let g = &self.groups[group];
        let mixed = (0..HASH_TABLES)
            .filter(|t| g.tables & (1 << t) != 0)
            .fold(0u64, |acc, t| acc ^ self.table_hash(t, inputs[t]));
        HashValue::new((mixed & g.parity_mask) ^ g.seed)
    }

    /// Hash of one group over a gathered match input.
    pub fn compute(&self, group: usize, input: &MatchInput) -> HashValue {
        self.compute_hash(group, &input.hash_inputs())
    }
}
