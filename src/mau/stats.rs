//! Statistics, meter and idletime wrappers.
//!
//! Counters are keyed by logical table and resolved stats address, so two
//! tables resolving to one address keep separate counts under their own LRT
//! settings.
//!
//! Each logical table has an LRT (leaky-rate threshold) setting: once a
//! counter's resident count passes `lrt_threshold` and at least
//! `lrt_update_interval` packet cycles have gone by since its last eviction,
//! the resident count is moved to the eviction log and the counter starts
//! again from zero.

use std::collections::{BTreeMap, BTreeSet};

use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{block, field_by_block, LOGICAL_TABLES};
use crate::mau::address_dist::ResourceKind;
use crate::mau::TableResult;

/// LRT setting of one logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LrtConfig {
    pub threshold: u32,
    pub interval: u32,
}

impl LrtConfig {
    pub fn decode_all(regs: &RegisterFile) -> [LrtConfig; LOGICAL_TABLES] {
        let mut out = [LrtConfig::default(); LOGICAL_TABLES];
        if let (Some(th), Some(iv)) = (field_by_block(block::LRT_THRESHOLD), field_by_block(block::LRT_UPDATE_INTERVAL)) {
            for (lt, lrt) in out.iter_mut().enumerate() {
                *lrt = LrtConfig { threshold: regs.get_u32(th, lt, 0, 0), interval: regs.get_u32(iv, lt, 0, 0) };
            }
        }
        out
    }
}

/// One stats counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counter {
    pub resident: u64,
    pub evicted: u64,
    last_eviction: Option<u64>,
}

impl Counter {
    pub fn total(&self) -> u64 {
        self.resident + self.evicted
    }
}

/// A resident count moved out by LRT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub cycle: u64,
    pub logical_table: u8,
    pub address: u32,
    pub count: u64,
}

/// Resource state accumulated across packets.
#[derive(Debug, Clone, Default)]
pub struct StatsWrapper {
    counters: BTreeMap<(u8, u32), Counter>,
    evictions: Vec<Eviction>,
    meters: BTreeMap<u32, u64>,
    idle_active: BTreeSet<u32>,
}

impl StatsWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one packet's table results.
    pub fn record(&mut self, cycle: u64, tables: &[TableResult], lrt: &[LrtConfig; LOGICAL_TABLES]) {
        for t in tables {
            if t.addresses.is_active(ResourceKind::Stats) {
                self.count(cycle, t.logical_table, t.addresses.get(ResourceKind::Stats), lrt[t.logical_table as usize]);
            }
            if t.addresses.is_active(ResourceKind::Meter) {
                *self.meters.entry(t.addresses.get(ResourceKind::Meter)).or_default() += 1;
            }
            if t.addresses.is_active(ResourceKind::Idletime) {
                self.idle_active.insert(t.addresses.get(ResourceKind::Idletime));
            }
        }
    }

    fn count(&mut self, cycle: u64, logical_table: u8, address: u32, lrt: LrtConfig) {
        let counter = self.counters.entry((logical_table, address)).or_default();
        counter.resident += 1;

        if lrt.threshold == 0 || counter.resident <= lrt.threshold as u64 {
            return;
        }
        let due = counter.last_eviction.map_or(true, |last| cycle - last >= lrt.interval as u64);
        if !due {
            return;
        }

        log::debug!("lrt evict table {} stats 0x{:X}: {} at cycle {}", logical_table, address, counter.resident, cycle);
        self.evictions.push(Eviction { cycle, logical_table, address, count: counter.resident });
        counter.evicted += counter.resident;
        counter.resident = 0;
        counter.last_eviction = Some(cycle);
    }

    pub fn counter(&self, logical_table: u8, address: u32) -> Counter {
        self.counters.get(&(logical_table, address)).copied().unwrap_or_default()
    }

    /// Counters as `((logical_table, address), counter)`.
    pub fn counters(&self) -> impl Iterator<Item = ((u8, u32), &Counter)> {
        self.counters.iter().map(|(k, c)| (*k, c))
    }

    pub fn evictions(&self) -> &[Eviction] {
        &self.evictions
    }

    /// Packets that addressed a meter.
    pub fn meter_hits(&self, address: u32) -> u64 {
        self.meters.get(&address).copied().unwrap_or(0)
    }

    pub fn is_idle_active(&self, address: u32) -> bool {
        self.idle_active.contains(&address)
    }

    /// Clear idletime activity, as an idle sweep does.
    pub fn sweep_idle(&mut self) -> BTreeSet<u32> {
        std::mem::take(&mut self.idle_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lrt(lt: usize, threshold: u32, interval: u32) -> [LrtConfig; LOGICAL_TABLES] {
        let mut out = [LrtConfig::default(); LOGICAL_TABLES];
        out[lt] = LrtConfig { threshold, interval };
        out
    }

    #[test]
    fn test_no_threshold_never_evicts() {
        let mut s = StatsWrapper::new();
        let cfg = lrt(0, 0, 0);
        for cycle in 0..100 {
            s.count(cycle, 0, 5, cfg[0]);
        }
        assert_eq!(s.counter(0, 5).resident, 100);
        assert!(s.evictions().is_empty());
    }

    #[test]
    fn test_threshold_and_interval() {
        let mut s = StatsWrapper::new();
        let cfg = lrt(3, 2, 10)[3];
        // third count crosses the threshold: first eviction is always due
        for cycle in 0..3 {
            s.count(cycle, 3, 7, cfg);
        }
        assert_eq!(s.evictions(), &[Eviction { cycle: 2, logical_table: 3, address: 7, count: 3 }]);
        assert_eq!(s.counter(3, 7).resident, 0);

        // over threshold again at cycle 5, but interval not elapsed until 12
        for cycle in 3..12 {
            s.count(cycle, 3, 7, cfg);
        }
        assert_eq!(s.evictions().len(), 1);
        s.count(12, 3, 7, cfg);
        assert_eq!(s.evictions().len(), 2);
        assert_eq!(s.evictions()[1].count, 10);
        assert_eq!(s.counter(3, 7).total(), 13);
    }

    #[test]
    fn test_shared_address_counts_per_table() {
        let mut cfg = lrt(1, 1, 0);
        cfg[2] = LrtConfig { threshold: 0, interval: 0 };
        let mut s = StatsWrapper::new();
        for cycle in 0..4 {
            s.count(cycle, 1, 0x40, cfg[1]);
            s.count(cycle, 2, 0x40, cfg[2]);
        }

        // table 1 evicts under its own threshold; table 2 never does
        assert_eq!(s.evictions().len(), 2);
        assert!(s.evictions().iter().all(|e| e.logical_table == 1));
        assert_eq!(s.counter(1, 0x40).total(), 4);
        assert_eq!(s.counter(2, 0x40), Counter { resident: 4, evicted: 0, last_eviction: None });
        assert_eq!(s.counters().count(), 2);
    }

    #[test]
    fn test_meter_and_idletime() {
        use crate::mau::address_dist::{AddressMapConfig, EnableMux, MatchOutcome};

        let mut map = AddressMapConfig::default();
        for (kind, miss) in [(ResourceKind::Meter, 0x40), (ResourceKind::Idletime, 0x81)] {
            let rule = map.rule_mut(kind, 2);
            rule.mux = EnableMux::Always;
            rule.miss_value = miss;
        }
        let result = TableResult {
            logical_table: 2,
            outcome: MatchOutcome::Miss,
            addresses: map.resolve(2, &MatchOutcome::Miss),
        };

        let mut s = StatsWrapper::new();
        let cfg = lrt(0, 0, 0);
        s.record(0, std::slice::from_ref(&result), &cfg);
        s.record(1, std::slice::from_ref(&result), &cfg);

        // stats mux left disabled: nothing counted
        assert_eq!(s.counters().count(), 0);
        assert_eq!(s.meter_hits(0x40), 2);
        assert!(s.is_idle_active(0x81));
        assert_eq!(s.sweep_idle().into_iter().collect::<Vec<_>>(), vec![0x81]);
        assert!(!s.is_idle_active(0x81));
    }

    #[test]
    fn test_decode_lrt() {
        let mut regs = RegisterFile::new();
        regs.write_field("lrt_threshold", [4, 0, 0], 100).unwrap();
        regs.write_field("lrt_update_interval", [4, 0, 0], 8).unwrap();
        let cfg = LrtConfig::decode_all(&regs);
        assert_eq!(cfg[4], LrtConfig { threshold: 100, interval: 8 });
        assert_eq!(cfg[0], LrtConfig::default());
    }
}
