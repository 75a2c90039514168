/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-task hardware counter statistics and their aggregation rules.

use std::collections::HashMap;

/// A bundle of scalar counters sampled over one control interval, or
/// accumulated across many.
///
/// Aggregation (see [`Stats::merge`]) follows one rule per field:
/// extensive quantities (elapsed time, retired instructions, cycles, energy,
/// named events) are plain sums; rate-like quantities (`rel_freq`,
/// `act_rel_freq`, `l3_kbytes_occ`) are weighted means using invariant
/// cycles as the weight; `ipc`/`ipnc` are not carried forward at all — they
/// are recomputed from the summed instructions/cycles after every merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub us: u64,
    pub instructions: u64,
    pub cycles: u64,
    pub invariant_cycles: u64,
    pub ipc: f64,
    pub ipnc: f64,
    pub rel_freq: f64,
    pub act_rel_freq: f64,
    pub l3_kbytes_occ: f64,
    pub mc_gbytes_rd: f64,
    pub mc_gbytes_wt: f64,
    pub proc_energy: f64,
    pub dram_energy: f64,
    /// Named hardware event counters (e.g. `cycle_activity.stalls_total`),
    /// each a running sum.
    pub events: HashMap<String, u64>,
}

impl Stats {
    /// Merge `other` into `self` following the aggregation invariants of
    /// the data model: plain sums for extensive fields, an invariant-cycles
    /// weighted mean for the three rate fields, and a post-hoc recomputation
    /// of `ipc`/`ipnc`.
    pub fn merge(&mut self, other: &Stats) {
        let w_self = self.invariant_cycles as f64;
        let w_other = other.invariant_cycles as f64;
        let total_weight = w_self + w_other;

        if total_weight > 0.0 {
            self.rel_freq = (self.rel_freq * w_self + other.rel_freq * w_other) / total_weight;
            self.act_rel_freq =
                (self.act_rel_freq * w_self + other.act_rel_freq * w_other) / total_weight;
            self.l3_kbytes_occ =
                (self.l3_kbytes_occ * w_self + other.l3_kbytes_occ * w_other) / total_weight;
        }

        self.us += other.us;
        self.instructions += other.instructions;
        self.cycles += other.cycles;
        self.invariant_cycles += other.invariant_cycles;
        self.mc_gbytes_rd += other.mc_gbytes_rd;
        self.mc_gbytes_wt += other.mc_gbytes_wt;
        self.proc_energy += other.proc_energy;
        self.dram_energy += other.dram_energy;

        for (name, value) in &other.events {
            *self.events.entry(name.clone()).or_insert(0) += value;
        }

        self.ipc = if self.cycles > 0 {
            self.instructions as f64 / self.cycles as f64
        } else {
            0.0
        };
        self.ipnc = if self.invariant_cycles > 0 {
            self.instructions as f64 / self.invariant_cycles as f64
        } else {
            0.0
        };
    }

    /// Value of a named hardware event, or `None` if it was never recorded —
    /// the caller surfaces `MetricMissing` in that case.
    pub fn event(&self, name: &str) -> Option<u64> {
        self.events.get(name).copied()
    }

    /// Diagnostic-only sanity check: flags windows with physically
    /// implausible values. Never blocks aggregation or policy decisions —
    /// callers only log the result.
    pub fn is_plausible(&self) -> bool {
        const MAX_FREQ_GHZ: f64 = 10.0;
        const MAX_L3_KBYTES: f64 = 1024.0 * 1024.0;

        if self.rel_freq < 0.0 || self.act_rel_freq < 0.0 {
            return false;
        }
        if self.rel_freq > MAX_FREQ_GHZ || self.act_rel_freq > MAX_FREQ_GHZ {
            return false;
        }
        if !(0.0..=100.0).contains(&self.ipc) || !(0.0..=100.0).contains(&self.ipnc) {
            return false;
        }
        if self.l3_kbytes_occ < 0.0 || self.l3_kbytes_occ > MAX_L3_KBYTES {
            return false;
        }
        if self.mc_gbytes_rd < 0.0 || self.mc_gbytes_wt < 0.0 {
            return false;
        }
        if self.proc_energy < 0.0 || self.dram_energy < 0.0 {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(instructions: u64, cycles: u64, invariant_cycles: u64) -> Stats {
        Stats {
            instructions,
            cycles,
            invariant_cycles,
            ..Default::default()
        }
    }

    #[test]
    fn merge_sums_extensive_fields() {
        let mut a = sample(100, 50, 50);
        let b = sample(200, 100, 100);
        a.merge(&b);
        assert_eq!(a.instructions, 300);
        assert_eq!(a.cycles, 150);
        assert_eq!(a.invariant_cycles, 150);
    }

    #[test]
    fn merge_recomputes_ipc_and_ipnc_from_sums() {
        let mut a = sample(100, 50, 100);
        let b = sample(100, 50, 100);
        a.merge(&b);
        assert!((a.ipc - 2.0).abs() < 1e-9); // 200 instr / 100 cycles
        assert!((a.ipnc - 1.0).abs() < 1e-9); // 200 instr / 200 invariant cycles
    }

    #[test]
    fn merge_weights_rate_fields_by_invariant_cycles() {
        let mut a = Stats {
            invariant_cycles: 100,
            rel_freq: 2.0,
            ..Default::default()
        };
        let b = Stats {
            invariant_cycles: 300,
            rel_freq: 4.0,
            ..Default::default()
        };
        a.merge(&b);
        // weighted mean: (2*100 + 4*300) / 400 = 3.5
        assert!((a.rel_freq - 3.5).abs() < 1e-9);
    }

    #[test]
    fn merge_on_zero_weight_leaves_rate_fields_untouched() {
        let mut a = Stats::default();
        let b = Stats::default();
        a.merge(&b);
        assert_eq!(a.rel_freq, 0.0);
    }

    #[test]
    fn merge_sums_named_events_across_both_sides() {
        let mut a = Stats::default();
        a.events.insert("cycle_activity.stalls_total".into(), 10);
        let mut b = Stats::default();
        b.events.insert("cycle_activity.stalls_total".into(), 5);
        b.events.insert("llc_misses".into(), 2);
        a.merge(&b);
        assert_eq!(a.event("cycle_activity.stalls_total"), Some(15));
        assert_eq!(a.event("llc_misses"), Some(2));
    }

    #[test]
    fn event_missing_returns_none() {
        let s = Stats::default();
        assert_eq!(s.event("nonexistent"), None);
    }

    #[test]
    fn is_plausible_rejects_negative_extensive_fields() {
        let mut s = Stats::default();
        s.mc_gbytes_rd = -1.0;
        assert!(!s.is_plausible());
    }

    #[test]
    fn is_plausible_rejects_ipc_out_of_range() {
        let mut s = Stats::default();
        s.ipc = 150.0;
        assert!(!s.is_plausible());
    }

    #[test]
    fn is_plausible_accepts_a_fresh_default() {
        assert!(Stats::default().is_plausible());
    }
}
