//! MAU stage register address specification.
//!
//! Every register family of one match-action stage is listed here with its
//! block number, array dimensions, bit width and reset value. This module
//! centralizes the memory map so the rest of the model never deals with raw
//! block numbers.

// ============================================================================
// Address Encoding
// ============================================================================

/// Block number shift (bits 47:40)
pub const BLOCK_SHIFT: u32 = 40;

/// First index shift (bits 39:28)
pub const I0_SHIFT: u32 = 28;

/// Second index shift (bits 27:16)
pub const I1_SHIFT: u32 = 16;

/// First and second index mask (12 bits each)
pub const I0_MASK: u64 = 0xFFF;
pub const I1_MASK: u64 = 0xFFF;

/// Third index mask (bits 15:0)
pub const I2_MASK: u64 = 0xFFFF;

// ============================================================================
// Stage Geometry
// ============================================================================

/// Logical tables per stage
pub const LOGICAL_TABLES: usize = 16;

/// TCAM array: 12 rows x 2 columns of 512-entry TCAMs
pub const TCAM_ROWS: usize = 12;
pub const TCAM_COLS: usize = 2;
pub const TCAM_ENTRIES: usize = 512;

/// TCAM word width (payload + 44 key bits + 2 version bits)
pub const TCAM_WORD_BITS: u8 = 47;

/// SRAM array: 8 rows x 12 columns of 1024 x 128-bit units
pub const SRAM_ROWS: usize = 8;
pub const SRAM_COLS: usize = 12;
pub const SRAM_ENTRIES: usize = 1024;

/// Exact-match input crossbar bytes (8 groups of 16)
pub const EXACT_XBAR_BYTES: usize = 128;
pub const EXACT_MATCH_GROUPS: usize = 8;
pub const EXACT_GROUP_BYTES: usize = 16;

/// TCAM input crossbar bytes: 12 groups of 5 bytes, then 6 midbytes
pub const TCAM_XBAR_BYTES: usize = 66;
pub const TCAM_GROUPS: usize = 12;
pub const TCAM_GROUP_BYTES: usize = 5;
pub const TCAM_MIDBYTE_BASE: usize = 60;

/// Nibbles reachable through the half-byte mux (two per midbyte)
pub const TCAM_HALFBYTES: usize = 12;

/// Hash generation: 16 tables of 64 input bits, 8 groups of 52 output bits
pub const HASH_TABLES: usize = 16;
pub const HASH_TABLE_BITS: usize = 64;
pub const HASH_GROUPS: usize = 8;
pub const HASH_BITS: u8 = 52;

/// Exact-match ways
pub const EXACT_WAYS: usize = 16;

/// Vertical/horizontal buses per SRAM row carrying swizzled match words
pub const SWIZZLE_BUSES: usize = 2;

/// Ternary indirection buses
pub const TIND_BUSES: usize = 8;

/// Action bus: 8 rows of 32 bytes
pub const ACTION_ROWS: usize = 8;
pub const ACTION_ROW_BYTES: usize = 32;
pub const ACTION_BUS_BYTES: usize = ACTION_ROWS * ACTION_ROW_BYTES;

/// Lanes per action row at each granularity
pub const ACTION_BYTE_LANES: usize = 32;
pub const ACTION_HALF_LANES: usize = 16;
pub const ACTION_WORD_LANES: usize = 8;

/// Instruction memory depth (instruction addresses per container)
pub const IMEM_DEPTH: usize = 64;

/// Instruction word width
pub const IMEM_WORD_BITS: u8 = 30;

/// Next-table map entries per logical table
pub const NEXT_TABLE_MAP_ENTRIES: usize = 8;

// ============================================================================
// Block Numbers
// ============================================================================

pub mod block {
    //! Block numbers (address bits 47:40).

    // Match input crossbar
    pub const MATCH_INPUT_XBAR_EXACT_CTL: u8 = 0x01;
    pub const MATCH_INPUT_XBAR_TCAM_CTL: u8 = 0x02;

    // TCAM control
    pub const TCAM_ROW_INPUT_CTL: u8 = 0x03;
    pub const TCAM_TABLE_PROP: u8 = 0x04;
    pub const TIND_BUS_PROP: u8 = 0x05;

    // Hash generation
    pub const GALOIS_FIELD_MATRIX: u8 = 0x06;
    pub const HASH_GROUP_CTL: u8 = 0x07;
    pub const HASH_SEED: u8 = 0x08;
    pub const PARITY_GROUP_MASK: u8 = 0x09;

    // Exact match
    pub const EXACT_WAY_CTL: u8 = 0x0A;
    pub const EXACT_MATCH_BYTEMASK: u8 = 0x0B;
    pub const EXACTMATCH_BYTESWIZZLE_CTL: u8 = 0x0C;

    // Logical table control
    pub const NEXT_TABLE_MAP_EN: u8 = 0x10;
    pub const NEXT_TABLE_MAP_DATA: u8 = 0x11;
    pub const LOGICAL_TABLE_THREAD: u8 = 0x12;
    pub const LRT_THRESHOLD: u8 = 0x13;
    pub const LRT_UPDATE_INTERVAL: u8 = 0x14;

    // TCAM hit routing into address distribution
    pub const TCAM_MATCH_ADR_OXBAR_OUTPUTMAP: u8 = 0x18;
    pub const TCAM_HIT_IXBAR_OUTPUTMAP: u8 = 0x19;

    // Action-HV crossbar
    pub const ACTION_HV_XBAR_CTL_BYTE: u8 = 0x20;
    pub const ACTION_HV_XBAR_CTL_BYTE_ENABLE: u8 = 0x21;
    pub const ACTION_HV_XBAR_CTL_HALF: u8 = 0x22;
    pub const ACTION_HV_XBAR_CTL_HALF_ENABLE: u8 = 0x23;
    pub const ACTION_HV_XBAR_CTL_WORD: u8 = 0x24;
    pub const ACTION_HV_XBAR_CTL_WORD_ENABLE: u8 = 0x25;

    // Instruction memory
    pub const IMEM_SUBWORD8: u8 = 0x28;
    pub const IMEM_SUBWORD16: u8 = 0x29;
    pub const IMEM_SUBWORD32: u8 = 0x2A;

    /// Resource address registers: 8 blocks per resource kind starting here
    pub const RESOURCE_BASE: u8 = 0x40;
    pub const RESOURCE_STRIDE: u8 = 0x08;

    // Memories (indirect writes only)
    pub const TCAM: u8 = 0xF0;
    pub const SRAM: u8 = 0xF1;
}

pub mod resource_reg {
    //! Register offsets within a resource kind's block range.

    pub const PER_ENTRY_EN_MUX_CTL: u8 = 0;
    pub const DEFAULT: u8 = 1;
    pub const MISS_VALUE: u8 = 2;
    pub const TCAM_SHIFTCOUNT: u8 = 3;
    pub const EXACT_SHIFTCOUNT: u8 = 4;
    pub const MASK: u8 = 5;
    pub const TCAM_ACTIONBIT_MAP_EN: u8 = 6;
    pub const TCAM_ACTIONBIT_MAP_DATA: u8 = 7;
}

pub mod resource_kind {
    //! Resource kind numbers; block = RESOURCE_BASE + kind * RESOURCE_STRIDE.

    pub const STATS: u8 = 0;
    pub const METER: u8 = 1;
    pub const IDLETIME: u8 = 2;
    pub const ACTION_DATA: u8 = 3;
    pub const ACTION_INSTRUCTION: u8 = 4;
    pub const IMMEDIATE_DATA: u8 = 5;
    pub const NEXT_TABLE: u8 = 6;
}

// ============================================================================
// Field Specifications
// ============================================================================

/// Shape and reset behavior of one register family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Register name
    pub name: &'static str,
    /// Block number
    pub block: u8,
    /// Array dimensions (unused dimensions are 1)
    pub dims: [u16; 3],
    /// Value width in bits
    pub width: u8,
    /// Reset value
    pub reset: u128,
    /// Written with indirect (two-word) writes
    pub memory: bool,
}

impl FieldSpec {
    pub const fn reg(name: &'static str, block: u8, dims: [u16; 3], width: u8, reset: u128) -> Self {
        Self { name, block, dims, width, reset, memory: false }
    }

    pub const fn mem(name: &'static str, block: u8, dims: [u16; 3], width: u8) -> Self {
        Self { name, block, dims, width, reset: 0, memory: true }
    }

    /// Largest value the field can hold.
    pub const fn max_value(&self) -> u128 {
        if self.width >= 128 {
            u128::MAX
        } else {
            (1u128 << self.width) - 1
        }
    }

    /// Check whether `[i0][i1][i2]` is inside the field's dimensions.
    pub fn contains(&self, i0: u16, i1: u16, i2: u16) -> bool {
        i0 < self.dims[0] && i1 < self.dims[1] && i2 < self.dims[2]
    }

    /// Number of elements in the array.
    pub fn element_count(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }
}

const fn ones(width: u8) -> u128 {
    (1u128 << width) - 1
}

/// Stage control registers.
pub const STAGE_FIELDS: &[FieldSpec] = &[
    FieldSpec::reg("match_input_xbar_exact_ctl", block::MATCH_INPUT_XBAR_EXACT_CTL, [EXACT_XBAR_BYTES as u16, 1, 1], 11, 0),
    FieldSpec::reg("match_input_xbar_tcam_ctl", block::MATCH_INPUT_XBAR_TCAM_CTL, [TCAM_XBAR_BYTES as u16, 1, 1], 11, 0),
    FieldSpec::reg("tcam_row_input_ctl", block::TCAM_ROW_INPUT_CTL, [TCAM_ROWS as u16, TCAM_COLS as u16, 1], 9, 0),
    FieldSpec::reg("tcam_table_prop", block::TCAM_TABLE_PROP, [TCAM_ROWS as u16, TCAM_COLS as u16, 1], 10, 0),
    FieldSpec::reg("tind_bus_prop", block::TIND_BUS_PROP, [TIND_BUSES as u16, 1, 1], 12, 0),
    FieldSpec::reg("galois_field_matrix", block::GALOIS_FIELD_MATRIX, [HASH_TABLES as u16, HASH_TABLE_BITS as u16, 1], HASH_BITS, 0),
    FieldSpec::reg("hash_group_ctl", block::HASH_GROUP_CTL, [HASH_GROUPS as u16, 1, 1], 16, 0),
    FieldSpec::reg("hash_seed", block::HASH_SEED, [HASH_GROUPS as u16, 1, 1], HASH_BITS, 0),
    FieldSpec::reg("parity_group_mask", block::PARITY_GROUP_MASK, [HASH_GROUPS as u16, 1, 1], HASH_BITS, ones(HASH_BITS)),
    FieldSpec::reg("exact_way_ctl", block::EXACT_WAY_CTL, [EXACT_WAYS as u16, 1, 1], 37, 0),
    FieldSpec::reg("exact_match_bytemask", block::EXACT_MATCH_BYTEMASK, [EXACT_WAYS as u16, 1, 1], 16, 0xFFFF),
    FieldSpec::reg(
        "exactmatch_row_vh_xbar_byteswizzle_ctl",
        block::EXACTMATCH_BYTESWIZZLE_CTL,
        [SRAM_ROWS as u16, SWIZZLE_BUSES as u16, EXACT_GROUP_BYTES as u16],
        4,
        0,
    ),
    FieldSpec::reg("next_table_map_en", block::NEXT_TABLE_MAP_EN, [1, 1, 1], 16, 0),
    FieldSpec::reg("next_table_map_data", block::NEXT_TABLE_MAP_DATA, [LOGICAL_TABLES as u16, NEXT_TABLE_MAP_ENTRIES as u16, 1], 8, 0),
    FieldSpec::reg("mau_logical_table_thread", block::LOGICAL_TABLE_THREAD, [1, 1, 1], 16, 0),
    FieldSpec::reg("lrt_threshold", block::LRT_THRESHOLD, [LOGICAL_TABLES as u16, 1, 1], 32, 0),
    FieldSpec::reg("lrt_update_interval", block::LRT_UPDATE_INTERVAL, [LOGICAL_TABLES as u16, 1, 1], 32, 0),
    FieldSpec::reg(
        "tcam_match_adr_to_physical_oxbar_outputmap",
        block::TCAM_MATCH_ADR_OXBAR_OUTPUTMAP,
        [TCAM_ROWS as u16, TCAM_COLS as u16, 1],
        6,
        0,
    ),
    FieldSpec::reg(
        "tcam_hit_to_logical_table_ixbar_outputmap",
        block::TCAM_HIT_IXBAR_OUTPUTMAP,
        [LOGICAL_TABLES as u16, 1, 1],
        5,
        0,
    ),
    FieldSpec::reg("action_hv_xbar_ctl_byte", block::ACTION_HV_XBAR_CTL_BYTE, [ACTION_ROWS as u16, ACTION_BYTE_LANES as u16, 1], 10, 0),
    FieldSpec::reg("action_hv_xbar_ctl_byte_enable", block::ACTION_HV_XBAR_CTL_BYTE_ENABLE, [ACTION_ROWS as u16, 1, 1], 32, 0),
    FieldSpec::reg("action_hv_xbar_ctl_half", block::ACTION_HV_XBAR_CTL_HALF, [ACTION_ROWS as u16, ACTION_HALF_LANES as u16, 1], 9, 0),
    FieldSpec::reg("action_hv_xbar_ctl_half_enable", block::ACTION_HV_XBAR_CTL_HALF_ENABLE, [ACTION_ROWS as u16, 1, 1], 16, 0),
    FieldSpec::reg("action_hv_xbar_ctl_word", block::ACTION_HV_XBAR_CTL_WORD, [ACTION_ROWS as u16, ACTION_WORD_LANES as u16, 1], 8, 0),
    FieldSpec::reg("action_hv_xbar_ctl_word_enable", block::ACTION_HV_XBAR_CTL_WORD_ENABLE, [ACTION_ROWS as u16, 1, 1], 8, 0),
    FieldSpec::reg("imem_subword8", block::IMEM_SUBWORD8, [64, IMEM_DEPTH as u16, 1], IMEM_WORD_BITS, 0),
    FieldSpec::reg("imem_subword16", block::IMEM_SUBWORD16, [96, IMEM_DEPTH as u16, 1], IMEM_WORD_BITS, 0),
    FieldSpec::reg("imem_subword32", block::IMEM_SUBWORD32, [64, IMEM_DEPTH as u16, 1], IMEM_WORD_BITS, 0),
];

/// TCAM and SRAM memories.
pub const MEMORY_FIELDS: &[FieldSpec] = &[
    FieldSpec::mem("tcam", block::TCAM, [TCAM_ROWS as u16, TCAM_COLS as u16, TCAM_ENTRIES as u16], TCAM_WORD_BITS),
    FieldSpec::mem("sram", block::SRAM, [SRAM_ROWS as u16, SRAM_COLS as u16, SRAM_ENTRIES as u16], 128),
];

/// The eight address-distribution registers of one resource kind.
macro_rules! resource_fields {
    ($kind:literal, $index:expr, $width:expr) => {
        [
            FieldSpec::reg(
                concat!("mau_", $kind, "_adr_per_entry_en_mux_ctl"),
                block::RESOURCE_BASE + $index * block::RESOURCE_STRIDE + resource_reg::PER_ENTRY_EN_MUX_CTL,
                [LOGICAL_TABLES as u16, 1, 1],
                2,
                0,
            ),
            FieldSpec::reg(
                concat!("mau_", $kind, "_adr_default"),
                block::RESOURCE_BASE + $index * block::RESOURCE_STRIDE + resource_reg::DEFAULT,
                [LOGICAL_TABLES as u16, 1, 1],
                $width,
                0,
            ),
            FieldSpec::reg(
                concat!("mau_", $kind, "_adr_miss_value"),
                block::RESOURCE_BASE + $index * block::RESOURCE_STRIDE + resource_reg::MISS_VALUE,
                [LOGICAL_TABLES as u16, 1, 1],
                $width,
                0,
            ),
            FieldSpec::reg(
                concat!("mau_", $kind, "_adr_tcam_shiftcount"),
                block::RESOURCE_BASE + $index * block::RESOURCE_STRIDE + resource_reg::TCAM_SHIFTCOUNT,
                [LOGICAL_TABLES as u16, 1, 1],
                6,
                0,
            ),
            FieldSpec::reg(
                concat!("mau_", $kind, "_adr_exact_shiftcount"),
                block::RESOURCE_BASE + $index * block::RESOURCE_STRIDE + resource_reg::EXACT_SHIFTCOUNT,
                [LOGICAL_TABLES as u16, 1, 1],
                6,
                0,
            ),
            FieldSpec::reg(
                concat!("mau_", $kind, "_adr_mask"),
                block::RESOURCE_BASE + $index * block::RESOURCE_STRIDE + resource_reg::MASK,
                [LOGICAL_TABLES as u16, 1, 1],
                $width,
                ones($width),
            ),
            FieldSpec::reg(
                concat!("mau_", $kind, "_adr_tcam_actionbit_map_en"),
                block::RESOURCE_BASE + $index * block::RESOURCE_STRIDE + resource_reg::TCAM_ACTIONBIT_MAP_EN,
                [1, 1, 1],
                16,
                0,
            ),
            FieldSpec::reg(
                concat!("mau_", $kind, "_adr_tcam_actionbit_map_data"),
                block::RESOURCE_BASE + $index * block::RESOURCE_STRIDE + resource_reg::TCAM_ACTIONBIT_MAP_DATA,
                [LOGICAL_TABLES as u16, TCAM_COLS as u16, 1],
                16,
                0,
            ),
        ]
    };
}

pub const STATS_FIELDS: [FieldSpec; 8] = resource_fields!("stats", resource_kind::STATS, 19);
pub const METER_FIELDS: [FieldSpec; 8] = resource_fields!("meter", resource_kind::METER, 23);
pub const IDLETIME_FIELDS: [FieldSpec; 8] = resource_fields!("idletime", resource_kind::IDLETIME, 20);
pub const ACTION_DATA_FIELDS: [FieldSpec; 8] = resource_fields!("action_data", resource_kind::ACTION_DATA, 22);
pub const ACTION_INSTRUCTION_FIELDS: [FieldSpec; 8] =
    resource_fields!("action_instruction", resource_kind::ACTION_INSTRUCTION, 6);
pub const IMMEDIATE_DATA_FIELDS: [FieldSpec; 8] = resource_fields!("immediate_data", resource_kind::IMMEDIATE_DATA, 32);
pub const NEXT_TABLE_FIELDS: [FieldSpec; 8] = resource_fields!("next_table", resource_kind::NEXT_TABLE, 8);

/// All field tables, searched in order.
pub const FIELD_TABLES: &[&[FieldSpec]] = &[
    STAGE_FIELDS,
    MEMORY_FIELDS,
    &STATS_FIELDS,
    &METER_FIELDS,
    &IDLETIME_FIELDS,
    &ACTION_DATA_FIELDS,
    &ACTION_INSTRUCTION_FIELDS,
    &IMMEDIATE_DATA_FIELDS,
    &NEXT_TABLE_FIELDS,
];

/// Find the field occupying a block number.
pub fn field_by_block(block: u8) -> Option<&'static FieldSpec> {
    FIELD_TABLES
        .iter()
        .flat_map(|table| table.iter())
        .find(|f| f.block == block)
}

/// Find a field by register name.
pub fn field_by_name(name: &str) -> Option<&'static FieldSpec> {
    FIELD_TABLES
        .iter()
        .flat_map(|table| table.iter())
        .find(|f| f.name == name)
}

/// Resource register block for a kind and register offset.
pub const fn resource_block(kind: u8, reg: u8) -> u8 {
    block::RESOURCE_BASE + kind * block::RESOURCE_STRIDE + reg
}
