//! CPU mirror of the two-pass GPU reduction
//!
//! Same group partitioning, same grid-stride order inside a lane, same tree
//! shapes in both passes. Work-groups run as rayon tasks; the `(gate, group)`
//! work buffer is only read after every group has written it.

use crate::plan::{group_parallel_width, MakePulsePlan, ReductionStrategy, DEFAULT_LOCAL_MEM_BUDGET};
use crate::synth::{slots_exhausted, PulseFrame, PulseSynthesizer, FRAME_SLOTS};
use radarsim_core::constants::GROUP_ITEMS;
use radarsim_core::SimResult;
use rayon::prelude::*;
use std::collections::VecDeque;
use tracing::info;

type Tuple = [f32; 4];

#[inline]
fn add(a: &mut Tuple, b: &Tuple) {
    for c in 0..4 {
        a[c] += b[c];
    }
}

pub struct TiledSynthesizer {
    group_size: u32,
    local_mem_budget: u32,
    strategy: Option<ReductionStrategy>,
    last_plan: Option<MakePulsePlan>,
    pending: VecDeque<Vec<Tuple>>,
}

impl Default for TiledSynthesizer {
    fn default() -> Self {
        Self::new(GROUP_ITEMS, DEFAULT_LOCAL_MEM_BUDGET)
    }
}

impl TiledSynthesizer {
    pub fn new(group_size: u32, local_mem_budget: u32) -> Self {
        Self {
            group_size,
            local_mem_budget,
            strategy: None,
            last_plan: None,
            pending: VecDeque::new(),
        }
    }

    /// Always use `strategy` for pass 2 instead of the sized choice
    pub fn with_strategy(mut self, strategy: ReductionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn plan(&self, frame: &PulseFrame<'_>) -> SimResult<MakePulsePlan> {
        let plan = MakePulsePlan::new(frame.entry_count(), self.group_size, frame.gates, self.local_mem_budget)?;
        match self.strategy {
            Some(s) => plan.with_strategy(s),
            None => Ok(plan),
        }
    }

    pub fn last_plan(&self) -> Option<&MakePulsePlan> {
        self.last_plan.as_ref()
    }

    pub fn run(&mut self, frame: &PulseFrame<'_>) -> SimResult<Vec<Tuple>> {
        let plan = self.plan(frame)?;
        if self.last_plan.as_ref().map(|p| p.strategy) != Some(plan.strategy) {
            info!("Pass 2 strategy {} for {} groups of {}", plan.strategy, plan.group_count, plan.group_size);
        }
        let work = pass1(&plan, frame);
        let pulse = pass2(&plan, work);
        self.last_plan = Some(plan);
        Ok(pulse)
    }
}

/// Per-group partial sums laid out as `work[gate * group_count + group]`
fn pass1(plan: &MakePulsePlan, frame: &PulseFrame<'_>) -> Vec<Tuple> {
    let gs = plan.group_size as usize;
    let groups = plan.group_count as usize;
    let gates = plan.gates.len();
    let n = frame.entry_count();
    let stride = groups * gs;

    let per_group: Vec<Vec<Tuple>> = (0..groups)
        .into_par_iter()
        .map(|g| {
            let mut partial = vec![[0f32; 4]; gates * gs];
            for l in 0..gs {
                let mut i = g * gs + l;
                while i < n {
                    let s = frame.signal[i];
                    for k in 0..gates {
                        let w = frame.weight(i, k as u32);
                        let p = &mut partial[k * gs + l];
                        for c in 0..4 {
                            p[c] += s[c] * w;
                        }
                    }
                    i += stride;
                }
            }

            let mut offset = gs / 2;
            while offset > 0 {
                for l in 0..offset {
                    for k in 0..gates {
                        let upper = partial[k * gs + l + offset];
                        add(&mut partial[k * gs + l], &upper);
                    }
                }
                offset /= 2;
            }

            (0..gates).map(|k| partial[k * gs]).collect()
        })
        .collect();

    let mut work = vec![[0f32; 4]; gates * groups];
    for (g, sums) in per_group.into_iter().enumerate() {
        for (k, sum) in sums.into_iter().enumerate() {
            work[k * groups + g] = sum;
        }
    }
    work
}

fn pass2(plan: &MakePulsePlan, mut work: Vec<Tuple>) -> Vec<Tuple> {
    let groups = plan.group_count as usize;
    let gates = plan.gates.len();

    match plan.strategy {
        ReductionStrategy::RangeParallel => (0..gates)
            .into_par_iter()
            .map(|k| {
                let mut acc = [0f32; 4];
                for v in &work[k * groups..(k + 1) * groups] {
                    add(&mut acc, v);
                }
                acc
            })
            .collect(),

        ReductionStrategy::GroupParallel => {
            let width = group_parallel_width(plan.group_count) as usize;
            (0..gates)
                .into_par_iter()
                .map(|k| {
                    let mut lanes = vec![[0f32; 4]; width];
                    lanes[..groups].copy_from_slice(&work[k * groups..(k + 1) * groups]);
                    let mut offset = width / 2;
                    while offset > 0 {
                        for l in 0..offset {
                            let upper = lanes[l + offset];
                            add(&mut lanes[l], &upper);
                        }
                        offset /= 2;
                    }
                    lanes[0]
                })
                .collect()
        }

        ReductionStrategy::Universal => {
            for round in plan.segment_rounds() {
                let half = round.half as usize;
                work.par_chunks_mut(groups).for_each(|segment| {
                    for j in 0..round.pairs() as usize {
                        let upper = segment[j + half];
                        add(&mut segment[j], &upper);
                    }
                });
            }
            (0..gates).map(|k| work[k * groups]).collect()
        }
    }
}

impl PulseSynthesizer for TiledSynthesizer {
    fn name(&self) -> &str {
        "cpu-tiled"
    }

    fn submit(&mut self, frame: &PulseFrame<'_>) -> SimResult<()> {
        if self.pending.len() >= FRAME_SLOTS {
            return Err(slots_exhausted(self.name()));
        }
        let pulse = self.run(frame)?;
        self.pending.push_back(pulse);
        Ok(())
    }

    fn collect(&mut self) -> SimResult<Option<Vec<Tuple>>> {
        Ok(self.pending.pop_front())
    }

    fn in_flight(&self) -> usize {
        self.pending.len()
    }
}
