//! End-to-end stage scenarios built with `FixtureBuilder`.

use crate::device::phv::{ContainerId, Direction, Phv};
use crate::device::state::StageState;
use crate::error::ConfigError;
use crate::mau::action::{AluOp, Instruction, OperandSource};
use crate::mau::address_dist::{EnableMux, MatchOutcome, Overhead, ResourceKind};
use crate::mau::exact::{Swizzle, WayConfig};
use crate::mau::sram::ExactEntry;
use crate::mau::tcam::TcamEntry;
use crate::mau::{HardwareErratum, MauStage};
use crate::parser::regblob::{RegBlob, RegBlobWriter};
use crate::testing::fixture::FixtureBuilder;

fn c(name: &str) -> ContainerId {
    name.parse().unwrap()
}

fn phv(values: &[(&str, u32)]) -> Phv {
    let mut phv = Phv::ingress();
    for (name, v) in values {
        phv.set(c(name), *v).unwrap();
    }
    phv
}

fn set_const(value: i8) -> Instruction {
    Instruction::new(AluOp::Set, OperandSource::Constant(value), OperandSource::Constant(0), 0)
}

/// TCAM group 0 from W1 bytes 0..3 and B0, midbyte 0 from B1.
fn wire_tcam_group0(f: &mut FixtureBuilder) {
    f.tcam_key_word(0, c("W1")).tcam_xbar(4, c("B0"), 0).tcam_xbar(60, c("B1"), 0);
}

/// 40-bit key `0xc6_7f52_c321` with nibble 9.
fn key_280(low: u8) -> Phv {
    phv(&[("W1", 0x7f52_c300 | low as u32), ("B0", 0xc6), ("B1", 0x9)])
}

#[test]
fn test_tcam_index_280_uses_default_instruction() {
    let mut f = FixtureBuilder::new();
    wire_tcam_group0(&mut f);
    f.tcam_row(0, 0, 0, Some(0))
        .tcam_table(0, 0, 3, 1, false)
        .tcam_entry(0, 0, 280, TcamEntry::new(0x0000_0c73_015a_79bd, 0x0000_138c_fea5_8643))
        .resource(ResourceKind::ActionInstruction, 3, EnableMux::Disabled, 0x15, 0x3)
        .instruction(c("W2"), 0x15, set_const(7));
    let mut stage = f.build_stage(&[]).unwrap();

    let out = stage.process(&key_280(0x21));
    let t = out.table(3).unwrap();
    match t.outcome {
        MatchOutcome::Tcam { hit, .. } => {
            assert_eq!((hit.row, hit.col, hit.index), (0, 0, 280));
            assert_eq!(hit.priority, (1 << 9) | 280);
            assert_eq!(hit.version, 0);
        }
        other => panic!("expected a TCAM hit, got {}", other),
    }
    assert_eq!(t.addresses.get(ResourceKind::ActionInstruction), 0x15);
    assert_eq!(out.phv.value(c("W2")), Some(7));

    // the disabled mux also drives the default on a miss
    let out = stage.process(&key_280(0x20));
    assert!(!out.table(3).unwrap().outcome.is_hit());
    assert_eq!(out.table(3).unwrap().addresses.get(ResourceKind::ActionInstruction), 0x15);
}

#[test]
fn test_actionbit_map_gates_stats_address() {
    let mut f = FixtureBuilder::new();
    f.tcam_key_word(0, c("W1"))
        .tcam_table(0, 0, 12, 0, false)
        .tcam_entry(0, 0, 0x0ef, TcamEntry::from_value_mask(0x22 << 1, 0xFF << 1, 0))
        .tcam_entry(0, 0, 0x110, TcamEntry::from_value_mask(0x11 << 1, 0xFF << 1, 0))
        .resource(ResourceKind::Stats, 12, EnableMux::Always, 0, 0x4d)
        .actionbit_map(ResourceKind::Stats, 12, 0, 0xf110);
    let regs = f.build().unwrap();
    assert_eq!(regs.read_field("mau_stats_adr_tcam_actionbit_map_en", [0, 0, 0]), Ok(0x1000));
    let mut stage = MauStage::configure(&regs, &[]).unwrap();

    // 0x110 & 0xf110 != 0: address comes from the match address
    let out = stage.process(&phv(&[("W1", 0x11)]));
    assert_eq!(out.table(12).unwrap().addresses.get(ResourceKind::Stats), 0x110);

    // 0x0ef & 0xf110 == 0: miss value
    let out = stage.process(&phv(&[("W1", 0x22)]));
    assert!(out.table(12).unwrap().outcome.is_hit());
    assert_eq!(out.table(12).unwrap().addresses.get(ResourceKind::Stats), 0x4d);

    assert_eq!(stage.stats().counter(12, 0x110).total(), 1);
    assert_eq!(stage.stats().counter(12, 0x4d).total(), 1);
}

#[test]
fn test_tcam_output_maps() {
    let mut f = FixtureBuilder::new();
    f.tcam_key_word(0, c("W1"))
        .tcam_row(3, 1, 0, None)
        .tcam_table(3, 1, 6, 0, false)
        .tcam_entry(3, 1, 0x005, TcamEntry::from_value_mask(0x33 << 1, 0xFF << 1, 0))
        .resource(ResourceKind::Stats, 6, EnableMux::Always, 0, 0x7f)
        .resource(ResourceKind::NextTable, 6, EnableMux::Always, 0, 0)
        .tcam_oxbar_outputmap(3, 1, 1)
        .tcam_ixbar_outputmap(6, 8)
        .next_table_map(8, [0x50, 0x51, 0x52, 0x53, 0x54, 0x55, 0x56, 0x57]);
    let mut stage = f.build_stage(&[]).unwrap();

    let out = stage.process(&phv(&[("W1", 0x33)]));
    let t = out.table(6).unwrap();
    assert_eq!(t.outcome.match_adr(), Some((1 << 13) | (3 << 9) | 5));
    assert_eq!(t.addresses.get(ResourceKind::Stats), 0x205);
    assert_eq!(t.next_table(), 0x50);
    assert_eq!(stage.stats().counter(6, 0x205).total(), 1);

    // misses keep table 6's own (disabled) next-table map
    let out = stage.process(&phv(&[("W1", 0x34)]));
    assert_eq!(out.table(6).unwrap().next_table(), 0);
    assert_eq!(out.table(6).unwrap().addresses.get(ResourceKind::Stats), 0x7f);
}

/// Exact way for logical table 5: key W1, identity hash, unit (2,3).
fn exact_fixture(f: &mut FixtureBuilder, seed: u64) {
    let way = WayConfig { way: 0, logical_table: 5, ram_row: 2, ram_col: 3, bytemask: 0x000F, ..Default::default() };
    f.exact_key(0, c("W1")).hash_identity(0).hash_group(0, 0b1, seed).exact_way(&way);
    for (key, instr) in [(0x1234_5678u32, 9u8), (0xAAAA_0001, 9)] {
        let mut match_bytes = [0u8; 16];
        match_bytes[..4].copy_from_slice(&key.to_le_bytes());
        let entry = ExactEntry { match_bytes, valid: true, version: 0, overhead: Overhead::build(instr, 0, &[], 0) };
        f.exact_entry(2, 3, (key & 0x3FF) as u16, &entry);
    }
    f.resource(ResourceKind::ActionInstruction, 5, EnableMux::Always, 0, 0x3);
}

#[test]
fn test_tcam_takes_precedence_over_exact() {
    let mut f = FixtureBuilder::new();
    exact_fixture(&mut f, 0);
    f.tcam_key_word(0, c("W1"))
        .tcam_table(0, 0, 5, 0, false)
        .tcam_entry(0, 0, 4, TcamEntry::from_value_mask(0x1234_5678 << 1, 0xFFFF_FFFF << 1, 0))
        .tind_bus(0, 5, 4, 0)
        .tind_overhead(4, 0, 4, Overhead::build(11, 0, &[], 0));
    let mut stage = f.build_stage(&[]).unwrap();

    let out = stage.process(&phv(&[("W1", 0x1234_5678)]));
    let t = out.table(5).unwrap();
    assert!(matches!(t.outcome, MatchOutcome::Tcam { .. }));
    assert_eq!(t.addresses.get(ResourceKind::ActionInstruction), 11);

    let out = stage.process(&phv(&[("W1", 0xAAAA_0001)]));
    let t = out.table(5).unwrap();
    assert!(matches!(t.outcome, MatchOutcome::Exact { .. }));
    assert_eq!(t.addresses.get(ResourceKind::ActionInstruction), 9);

    let out = stage.process(&phv(&[("W1", 0x5)]));
    assert_eq!(out.table(5).unwrap().outcome, MatchOutcome::Miss);
    assert_eq!(out.table(5).unwrap().addresses.get(ResourceKind::ActionInstruction), 0x3);
}

#[test]
fn test_hash_seed_moves_entries() {
    let mut f = FixtureBuilder::new();
    exact_fixture(&mut f, 0);
    let mut stage = f.build_stage(&[]).unwrap();
    let out = stage.process(&phv(&[("W1", 0x1234_5678)]));
    match out.table(5).unwrap().outcome {
        MatchOutcome::Exact { hit } => {
            assert_eq!(hit.hash.bits(), 0x1234_5678);
            assert_eq!(hit.match_adr, (2 << 14) | (3 << 10) | 0x278);
        }
        other => panic!("expected an exact hit, got {}", other),
    }

    // a seed flips index bits, so the entry is no longer where the hash points
    let mut f = FixtureBuilder::new();
    exact_fixture(&mut f, 0x1);
    let mut stage = f.build_stage(&[]).unwrap();
    assert_eq!(stage.process(&phv(&[("W1", 0x1234_5678)])).table(5).unwrap().outcome, MatchOutcome::Miss);
}

#[test]
fn test_evaluation_is_deterministic() {
    let mut f = FixtureBuilder::new();
    exact_fixture(&mut f, 0);
    f.instruction(c("H0"), 9, Instruction::new(AluOp::Add, OperandSource::Container(c("H1")), OperandSource::Constant(1), 0));
    let regs = f.build().unwrap();
    let a = MauStage::configure(&regs, &[]).unwrap();
    let b = MauStage::configure(&regs, &[]).unwrap();

    let input = phv(&[("W1", 0x1234_5678), ("H1", 0xFFFF)]);
    let first = a.config().evaluate(&input);
    assert_eq!(first, a.config().evaluate(&input));
    assert_eq!(first, b.config().evaluate(&input));
    assert_eq!(first.phv.value(c("H0")), Some(0));
}

#[test]
fn test_next_table_map() {
    let mut f = FixtureBuilder::new();
    exact_fixture(&mut f, 0);
    f.resource(ResourceKind::NextTable, 5, EnableMux::Always, 0, 2)
        .next_table_map(5, [0x40, 0x41, 0x45, 0x43, 0x44, 0x45, 0x46, 0x47]);
    let mut stage = f.build_stage(&[]).unwrap();

    // miss value 2 selects map entry 2
    assert_eq!(stage.process(&phv(&[("W1", 0x5)])).table(5).unwrap().next_table(), 0x45);
    // hit: the overhead next-table field (0) selects entry 0
    assert_eq!(stage.process(&phv(&[("W1", 0x1234_5678)])).table(5).unwrap().next_table(), 0x40);
}

#[test]
fn test_swizzled_exact_match() {
    let swizzle = Swizzle::new([3, 2, 1, 0, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    let key = 0x0000_0155u32;

    let mut f = FixtureBuilder::new();
    let way = WayConfig { way: 1, logical_table: 2, ram_row: 6, ram_col: 0, bytemask: 0x000F, ..Default::default() };
    f.exact_key(0, c("W7")).hash_identity(0).hash_group(0, 0b1, 0).exact_way(&way).swizzle(6, 0, &swizzle);

    let mut group = [0u8; 16];
    group[..4].copy_from_slice(&key.to_le_bytes());
    let stored = ExactEntry { match_bytes: swizzle.apply(&group), valid: true, version: 1, overhead: Overhead::default() };
    f.exact_entry(6, 0, 0x155, &stored);
    let mut stage = f.build_stage(&[]).unwrap();

    assert!(stage.process(&phv(&[("W7", key)])).table(2).unwrap().outcome.is_hit());
    assert_eq!(swizzle.invert().apply(&stored.match_bytes), group);
}

#[test]
fn test_unused_swizzle_needs_erratum() {
    let mut ctl = *Swizzle::identity().ctl();
    ctl[0] = 1;
    let mut f = FixtureBuilder::new();
    f.swizzle(7, 1, &Swizzle::new(ctl));
    let regs = f.build().unwrap();

    assert_eq!(
        MauStage::configure(&regs, &[]).err(),
        Some(ConfigError::SwizzleNotPermutation { row: 7, bus: 1 })
    );
    assert!(MauStage::configure(&regs, &[HardwareErratum::UnusedSwizzleIdentity]).is_ok());
}

#[test]
fn test_undefined_source_invalidates_destination() {
    let mut f = FixtureBuilder::new();
    f.tcam_key_word(0, c("W1"))
        .tcam_table(0, 0, 0, 0, false)
        .tcam_entry(0, 0, 0, TcamEntry::from_value_mask(0, 0, 0))
        .instruction(c("W2"), 0, Instruction::new(AluOp::Add, OperandSource::Container(c("W3")), OperandSource::Container(c("W4")), 0));
    let mut stage = f.build_stage(&[]).unwrap();

    let out = stage.process(&phv(&[("W1", 1), ("W2", 5), ("W3", 3)]));
    assert_eq!(out.phv.value(c("W2")), None);
    assert_eq!(out.undefined.len(), 1);
    assert_eq!(out.undefined[0].operand, OperandSource::Container(c("W4")));

    // processing continues normally for the next packet
    let out = stage.process(&phv(&[("W1", 1), ("W3", 3), ("W4", 4)]));
    assert_eq!(out.phv.value(c("W2")), Some(7));
    assert!(out.undefined.is_empty());
}

#[test]
fn test_action_bus_and_merged_writes() {
    let mut f = FixtureBuilder::new();
    f.tcam_key_word(0, c("W1"))
        .tcam_table(0, 0, 0, 0, false)
        .tcam_table(1, 0, 1, 0, false)
        .tcam_entry(0, 0, 0, TcamEntry::from_value_mask(0, 0, 0))
        .tcam_entry(1, 0, 0, TcamEntry::from_value_mask(0, 0, 0))
        .resource(ResourceKind::ActionInstruction, 0, EnableMux::Disabled, 1, 0)
        .resource(ResourceKind::ActionInstruction, 1, EnableMux::Disabled, 2, 0)
        .instruction(c("W5"), 1, Instruction::new(AluOp::Set, OperandSource::Bus(0), OperandSource::Constant(0), 0))
        .instruction(c("B2"), 1, set_const(0x0F))
        .instruction(c("B2"), 2, set_const(0x30));
    f.action_xbar().ctl_word(0, 0, 3).word_enable(0, 0b1);
    let mut stage = f.build_stage(&[]).unwrap();

    let out = stage.process(&phv(&[("W1", 0), ("W3", 0xCAFE_F00D)]));
    assert_eq!(out.phv.value(c("W5")), Some(0xCAFE_F00D));
    assert_eq!(out.phv.value(c("B2")), Some(0x3F));
}

#[test]
fn test_egress_tables_ignore_ingress_phv() {
    let mut f = FixtureBuilder::new();
    f.tcam_key_word(0, c("W1"))
        .tcam_table(0, 0, 4, 0, false)
        .tcam_entry(0, 0, 0, TcamEntry::from_value_mask(0, 0, 0))
        .thread(4, Direction::Egress);
    let mut stage = f.build_stage(&[]).unwrap();

    assert!(stage.process(&phv(&[("W1", 0)])).table(4).is_none());
    let mut egress = Phv::egress();
    egress.set(c("W1"), 0).unwrap();
    assert!(stage.process(&egress).table(4).unwrap().outcome.is_hit());
}

#[test]
fn test_lrt_evicts_stats() {
    let mut f = FixtureBuilder::new();
    f.tcam_key_word(0, c("W1"))
        .tcam_table(0, 0, 6, 0, false)
        .tcam_entry(0, 0, 9, TcamEntry::from_value_mask(0, 0, 0))
        .resource(ResourceKind::Stats, 6, EnableMux::Always, 0, 0)
        .lrt(6, 2, 4);
    let mut stage = f.build_stage(&[]).unwrap();

    let p = phv(&[("W1", 0)]);
    for _ in 0..8 {
        stage.process(&p);
    }
    // over threshold at cycle 2; the next eviction waits for the interval
    let ev: Vec<_> = stage.stats().evictions().iter().map(|e| (e.cycle, e.count)).collect();
    assert_eq!(ev, vec![(2, 3), (6, 4)]);
    let counter = stage.stats().counter(6, 9);
    assert_eq!(counter.total(), 8);
    assert_eq!(counter.resident, 1);
}

#[test]
fn test_blob_round_trip_preserves_behavior() {
    let mut f = FixtureBuilder::new();
    exact_fixture(&mut f, 0);
    f.instruction(c("B9"), 9, set_const(0x5A));
    let regs = f.build().unwrap();

    let bytes = RegBlobWriter::from_registers(&regs).finish();
    let blob = RegBlob::parse(&bytes).unwrap();
    let mut state = StageState::new();
    state.apply_blob(&blob).unwrap();
    assert_eq!(state.stats.writes + state.stats.indirect_writes, regs.len());

    let input = phv(&[("W1", 0xAAAA_0001)]);
    let direct = MauStage::configure(&regs, &[]).unwrap().config().evaluate(&input);
    let loaded = state.build_stage(&[]).unwrap().config().evaluate(&input);
    assert_eq!(direct, loaded);
    assert_eq!(loaded.phv.value(c("B9")), Some(0x5A));
}
