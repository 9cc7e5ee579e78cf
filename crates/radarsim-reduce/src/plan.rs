//! Work-group sizing and pass-2 strategy selection
//!
//! Everything here is a pure function of (scatterer count, requested group
//! size, gate count, local-memory budget), so the CPU mirror and the GPU
//! pipeline always agree on the shape of the reduction.

use crate::gpu_types::{Pass1Params, Pass2Params};
use radarsim_core::constants::TUPLE_BYTES;
use radarsim_core::{GateSpec, RangeWeightTable, SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest work-group size any kernel uses
pub const MAX_GROUP_SIZE: u32 = 256;

/// Upper bound on pass-1 work-groups; larger populations stride over them
pub const MAX_PASS1_GROUPS: u32 = 256;

/// Work-group size of the range-parallel and segmented pass-2 kernels
pub const RANGE_SIZE: u32 = 64;

/// Local memory guaranteed by every wgpu device (`max_compute_workgroup_storage_size`)
pub const DEFAULT_LOCAL_MEM_BUDGET: u32 = 16 * 1024;

/// How pass 2 folds the `(gate, group)` partial sums into one tuple per gate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReductionStrategy {
    /// One invocation per gate scanning every group in order
    RangeParallel,
    /// One work-group per gate, tree reduction across groups in local memory
    GroupParallel,
    /// Pairwise segmented reduction in global memory, one dispatch per round
    Universal,
}

impl fmt::Display for ReductionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReductionStrategy::RangeParallel => "range-parallel",
            ReductionStrategy::GroupParallel => "group-parallel",
            ReductionStrategy::Universal => "universal",
        };
        f.write_str(name)
    }
}

/// Pass-1 work-groups for `entry_count` scatterers
pub fn group_count(entry_count: usize, group_size: u32) -> u32 {
    let group_size = group_size.max(1) as usize;
    let groups = entry_count.div_ceil(group_size);
    groups.clamp(1, MAX_PASS1_GROUPS as usize) as u32
}

/// Work-group size of the group-parallel kernel for `groups` partial sums
pub fn group_parallel_width(groups: u32) -> u32 {
    groups.max(1).next_power_of_two().min(MAX_GROUP_SIZE)
}

/// Choose the pass-2 strategy
///
/// Range-parallel whenever there are at least as many gates as groups; else
/// group-parallel if one gate's worth of group lanes fits the local budget;
/// otherwise the universal segmented reduction.
pub fn select_strategy(
    scatterer_count: usize,
    group_size: u32,
    gate_count: u32,
    local_mem_budget: u32,
) -> ReductionStrategy {
    let groups = group_count(scatterer_count, group_size);
    if gate_count >= groups {
        return ReductionStrategy::RangeParallel;
    }
    let lanes_bytes = group_parallel_width(groups) as u64 * TUPLE_BYTES;
    if lanes_bytes <= local_mem_budget as u64 {
        ReductionStrategy::GroupParallel
    } else {
        ReductionStrategy::Universal
    }
}

/// Largest power-of-two group size not above `requested` whose pass-1
/// partial-sum tile (`gates × group_size` tuples) fits the local budget
pub fn fit_group_size(requested: u32, gate_count: u32, local_mem_budget: u32) -> SimResult<u32> {
    if requested == 0 {
        return Err(SimError::config("Work-group size must be positive"));
    }
    let mut size = prev_power_of_two(requested.min(MAX_GROUP_SIZE));
    while size > 1 && pass1_local_bytes(gate_count, size) > local_mem_budget as u64 {
        size /= 2;
    }
    if pass1_local_bytes(gate_count, size) > local_mem_budget as u64 {
        return Err(SimError::config(format!(
            "{} gates need {} bytes of local memory, budget is {}",
            gate_count,
            pass1_local_bytes(gate_count, 1),
            local_mem_budget
        )));
    }
    Ok(size)
}

fn pass1_local_bytes(gate_count: u32, group_size: u32) -> u64 {
    gate_count as u64 * group_size as u64 * TUPLE_BYTES
}

fn prev_power_of_two(x: u32) -> u32 {
    1 << (31 - x.leading_zeros())
}

/// One pairwise round of the universal strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentRound {
    pub active: u32,
    pub half: u32,
}

impl SegmentRound {
    /// Lane pairs folded per gate in this round
    pub fn pairs(&self) -> u32 {
        self.active - self.half
    }
}

/// Rounds that fold `groups` lanes down to one
pub fn segment_rounds(groups: u32) -> Vec<SegmentRound> {
    let mut rounds = Vec::new();
    let mut active = groups.max(1);
    while active > 1 {
        let half = active.div_ceil(2);
        rounds.push(SegmentRound { active, half });
        active = half;
    }
    rounds
}

/// Global/local sizing of both passes for one pulse
#[derive(Clone, Debug, PartialEq)]
pub struct MakePulsePlan {
    pub entry_count: usize,
    pub gates: GateSpec,
    /// Pass-1 work-group size
    pub group_size: u32,
    /// Pass-1 work-groups, also the lanes per gate in the work buffer
    pub group_count: u32,
    pub strategy: ReductionStrategy,
    pub local_mem_budget: u32,
}

impl MakePulsePlan {
    pub fn new(
        entry_count: usize,
        requested_group_size: u32,
        gates: GateSpec,
        local_mem_budget: u32,
    ) -> SimResult<Self> {
        if entry_count > u32::MAX as usize {
            return Err(SimError::config(format!("{} scatterers exceed a single dispatch", entry_count)));
        }
        let group_size = fit_group_size(requested_group_size, gates.count, local_mem_budget)?;
        let group_count = group_count(entry_count, group_size);
        let strategy = select_strategy(entry_count, group_size, gates.count, local_mem_budget);
        Ok(Self {
            entry_count,
            gates,
            group_size,
            group_count,
            strategy,
            local_mem_budget,
        })
    }

    /// Same sizing with an explicit pass-2 strategy
    pub fn with_strategy(mut self, strategy: ReductionStrategy) -> SimResult<Self> {
        if strategy == ReductionStrategy::GroupParallel {
            let bytes = group_parallel_width(self.group_count) as u64 * TUPLE_BYTES;
            if bytes > self.local_mem_budget as u64 {
                return Err(SimError::config(format!(
                    "Group-parallel reduction needs {} bytes of local memory, budget is {}",
                    bytes, self.local_mem_budget
                )));
            }
        }
        self.strategy = strategy;
        Ok(self)
    }

    pub fn gate_count(&self) -> u32 {
        self.gates.count
    }

    /// Tuples in the `(gate, group)` work buffer
    pub fn work_len(&self) -> usize {
        self.gates.len() * self.group_count as usize
    }

    pub fn pass1_global(&self) -> u32 {
        self.group_count * self.group_size
    }

    pub fn pass1_local_bytes(&self) -> u64 {
        pass1_local_bytes(self.gates.count, self.group_size)
    }

    /// Work-group size of the pass-2 kernel
    pub fn pass2_local(&self) -> u32 {
        match self.strategy {
            ReductionStrategy::GroupParallel => group_parallel_width(self.group_count),
            ReductionStrategy::RangeParallel | ReductionStrategy::Universal => RANGE_SIZE,
        }
    }

    pub fn pass2_global(&self) -> u32 {
        match self.strategy {
            ReductionStrategy::GroupParallel => self.gates.count * self.pass2_local(),
            ReductionStrategy::RangeParallel | ReductionStrategy::Universal => {
                self.gates.count.div_ceil(RANGE_SIZE) * RANGE_SIZE
            }
        }
    }

    pub fn pass2_local_bytes(&self) -> u64 {
        match self.strategy {
            ReductionStrategy::GroupParallel => self.pass2_local() as u64 * TUPLE_BYTES,
            ReductionStrategy::RangeParallel | ReductionStrategy::Universal => 0,
        }
    }

    pub fn segment_rounds(&self) -> Vec<SegmentRound> {
        segment_rounds(self.group_count)
    }

    pub fn pass1_params(&self, weights: &RangeWeightTable) -> Pass1Params {
        Pass1Params {
            range_start: self.gates.range_start,
            range_delta: self.gates.range_delta,
            table_x0: weights.x0(),
            table_dx: weights.dx(),
            table_xm: weights.xm(),
            range_count: self.gates.count,
            group_count: self.group_count,
            entry_count: self.entry_count as u32,
        }
    }

    pub fn pass2_params(&self, round: Option<SegmentRound>) -> Pass2Params {
        let (active, half) = round.map(|r| (r.active, r.half)).unwrap_or((self.group_count, 0));
        Pass2Params {
            range_count: self.gates.count,
            group_count: self.group_count,
            active,
            half,
        }
    }
}

impl fmt::Display for MakePulsePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Pass 1   global={:6}   local={:3}   groups={:3}   entries={:8}   local_mem={:6} ({} x {} tuples)",
            self.pass1_global(),
            self.group_size,
            self.group_count,
            self.entry_count,
            self.pass1_local_bytes(),
            self.gates.count,
            self.group_size
        )?;
        write!(
            f,
            "Pass 2   global={:6}   local={:3}   strategy={}   local_mem={:6}",
            self.pass2_global(),
            self.pass2_local(),
            self.strategy,
            self.pass2_local_bytes()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gates(count: u32) -> GateSpec {
        GateSpec::new(0.0, 15.0, count).unwrap()
    }

    #[test]
    fn test_group_count() {
        assert_eq!(group_count(0, 64), 1);
        assert_eq!(group_count(1, 64), 1);
        assert_eq!(group_count(65, 64), 2);
        assert_eq!(group_count(10_000_000, 64), MAX_PASS1_GROUPS);
    }

    #[test]
    fn test_fit_group_size() {
        // 8 gates x 64 lanes x 16 bytes = 8 KiB
        assert_eq!(fit_group_size(64, 8, 16 * 1024).unwrap(), 64);
        // 100 gates: 100 x 8 x 16 = 12800
        assert_eq!(fit_group_size(64, 100, 16 * 1024).unwrap(), 8);
        // Non power of two requests round down
        assert_eq!(fit_group_size(100, 1, 16 * 1024).unwrap(), 64);
        assert!(fit_group_size(64, 512, 4096).is_err());
        assert!(fit_group_size(0, 1, 4096).is_err());
    }

    #[test]
    fn test_strategy_selection() {
        // 16 groups, 100 gates
        assert_eq!(select_strategy(1000, 64, 100, 16 * 1024), ReductionStrategy::RangeParallel);
        // Tie goes to range-parallel
        assert_eq!(select_strategy(64 * 100, 64, 100, 16 * 1024), ReductionStrategy::RangeParallel);
        // 256 groups, 100 gates, 256 lanes x 16 = 4 KiB
        assert_eq!(select_strategy(1_000_000, 8, 100, 16 * 1024), ReductionStrategy::GroupParallel);
        assert_eq!(select_strategy(1_000_000, 8, 100, 2048), ReductionStrategy::Universal);
        // Deterministic
        for _ in 0..3 {
            assert_eq!(select_strategy(777_777, 16, 40, 3000), select_strategy(777_777, 16, 40, 3000));
        }
    }

    #[test]
    fn test_segment_rounds() {
        assert!(segment_rounds(1).is_empty());
        let rounds = segment_rounds(5);
        assert_eq!(
            rounds,
            vec![
                SegmentRound { active: 5, half: 3 },
                SegmentRound { active: 3, half: 2 },
                SegmentRound { active: 2, half: 1 },
            ]
        );
        assert_eq!(rounds[0].pairs(), 2);
    }

    #[test]
    fn test_plan_sizes() {
        let plan = MakePulsePlan::new(1_000_000, 64, gates(100), DEFAULT_LOCAL_MEM_BUDGET).unwrap();
        assert_eq!(plan.group_size, 8);
        assert_eq!(plan.group_count, 256);
        assert_eq!(plan.strategy, ReductionStrategy::GroupParallel);
        assert_eq!(plan.work_len(), 25_600);
        assert_eq!(plan.pass2_local(), 256);
        assert_eq!(plan.pass2_global(), 25_600);

        let forced = plan.clone().with_strategy(ReductionStrategy::Universal).unwrap();
        assert_eq!(forced.pass2_global(), 128);
        assert_eq!(forced.segment_rounds().len(), 8);
    }

    #[test]
    fn test_forced_group_parallel_checks_budget() {
        let plan = MakePulsePlan::new(1_000_000, 1, gates(1), 1024).unwrap();
        assert_eq!(plan.strategy, ReductionStrategy::Universal);
        assert!(plan.with_strategy(ReductionStrategy::GroupParallel).is_err());
    }
}
