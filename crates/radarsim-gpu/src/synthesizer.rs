//! GPU pulse synthesizer
//!
//! One submission per pulse: upload the per-scatterer arrays, run pass 1 and
//! the planned pass-2 strategy, copy the pulse into a staging buffer and
//! request the map. `collect` waits on the oldest submission only, so the
//! next frame can be uploaded and dispatched while the previous one drains.

use crate::context::GpuContext;
use crate::kernels::KernelCache;
use radarsim_core::constants::{GROUP_ITEMS, TUPLE_BYTES};
use radarsim_core::{SimError, SimResult};
use radarsim_reduce::plan::RANGE_SIZE;
use radarsim_reduce::synth::slots_exhausted;
use radarsim_reduce::{MakePulsePlan, Pass1Params, Pass2Params, PulseFrame, PulseSynthesizer, ReductionStrategy, FRAME_SLOTS};
use std::collections::VecDeque;
use std::sync::mpsc;
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

type MapResult = Result<(), wgpu::BufferAsyncError>;

/// Storage buffer that is recreated only when a frame outgrows it
struct GrowableBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: wgpu::Buffer,
}

impl GrowableBuffer {
    fn new(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages) -> Self {
        let buffer = Self::allocate(device, label, usage, TUPLE_BYTES);
        Self { label, usage, buffer }
    }

    fn allocate(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Make room for at least `size` bytes; never shrinks
    fn reserve(&mut self, device: &wgpu::Device, size: u64) {
        let size = size.max(TUPLE_BYTES);
        if self.buffer.size() < size {
            trace!("Growing {} to {} bytes", self.label, size);
            self.buffer = Self::allocate(device, self.label, self.usage, size.next_power_of_two());
        }
    }
}

struct InFlight {
    staging: wgpu::Buffer,
    gate_count: usize,
    submission: wgpu::SubmissionIndex,
    mapped: mpsc::Receiver<MapResult>,
}

pub struct GpuSynthesizer {
    ctx: GpuContext,
    kernels: KernelCache,
    group_size: u32,
    strategy: Option<ReductionStrategy>,
    last_plan: Option<MakePulsePlan>,

    signal: GrowableBuffer,
    attenuation: GrowableBuffer,
    work: GrowableBuffer,
    pulse: GrowableBuffer,
    range_weight: GrowableBuffer,
    pass1_params: wgpu::Buffer,
    pass2_params: wgpu::Buffer,

    in_flight: VecDeque<InFlight>,
    /// Unmapped staging buffers ready for reuse
    spare: Vec<wgpu::Buffer>,
}

impl GpuSynthesizer {
    pub fn new(ctx: GpuContext) -> Self {
        Self::with_group_size(ctx, GROUP_ITEMS)
    }

    pub fn with_group_size(ctx: GpuContext, group_size: u32) -> Self {
        let device = &ctx.device;
        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let uniform = |label, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Self {
            kernels: KernelCache::new(device),
            group_size,
            strategy: None,
            last_plan: None,
            signal: GrowableBuffer::new(device, "Signal", storage),
            attenuation: GrowableBuffer::new(device, "Attenuation", storage),
            work: GrowableBuffer::new(device, "Work", wgpu::BufferUsages::STORAGE),
            pulse: GrowableBuffer::new(device, "Pulse", wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC),
            range_weight: GrowableBuffer::new(device, "Range Weight", storage),
            pass1_params: uniform("Pass 1 Params", Pass1Params::SIZE),
            pass2_params: uniform("Pass 2 Params", Pass2Params::SIZE),
            in_flight: VecDeque::new(),
            spare: Vec::new(),
            ctx,
        }
    }

    /// Always use `strategy` for pass 2 instead of the sized choice
    pub fn with_strategy(mut self, strategy: ReductionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn plan(&self, frame: &PulseFrame<'_>) -> SimResult<MakePulsePlan> {
        let plan = MakePulsePlan::new(frame.entry_count(), self.group_size, frame.gates, self.ctx.local_mem_budget())?;
        match self.strategy {
            Some(s) => plan.with_strategy(s),
            None => Ok(plan),
        }
    }

    pub fn last_plan(&self) -> Option<&MakePulsePlan> {
        self.last_plan.as_ref()
    }

    fn check_binding(&self, what: &str, bytes: u64) -> SimResult<()> {
        if bytes > self.ctx.max_storage_binding() {
            return Err(SimError::Accelerator(format!(
                "{} needs {} bytes, device binding limit is {}",
                what,
                bytes,
                self.ctx.max_storage_binding()
            )));
        }
        Ok(())
    }

    fn staging_buffer(&mut self, size: u64) -> wgpu::Buffer {
        if let Some(pos) = self.spare.iter().position(|b| b.size() >= size) {
            return self.spare.swap_remove(pos);
        }
        self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pulse Staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
    }

    fn upload(&mut self, plan: &MakePulsePlan, frame: &PulseFrame<'_>) -> SimResult<()> {
        let entry_bytes = frame.entry_count() as u64 * TUPLE_BYTES;
        let work_bytes = plan.work_len() as u64 * TUPLE_BYTES;
        self.check_binding("Scatterer arrays", entry_bytes)?;
        self.check_binding("Work buffer", work_bytes)?;

        let device = &self.ctx.device;
        let queue = &self.ctx.queue;
        let table = frame.weights.table().data();

        self.signal.reserve(device, entry_bytes);
        self.attenuation.reserve(device, entry_bytes);
        self.work.reserve(device, work_bytes);
        self.pulse.reserve(device, plan.gates.len() as u64 * TUPLE_BYTES);
        self.range_weight.reserve(device, (table.len() * 4) as u64);

        if !frame.signal.is_empty() {
            queue.write_buffer(&self.signal.buffer, 0, bytemuck::cast_slice(frame.signal));
            queue.write_buffer(&self.attenuation.buffer, 0, bytemuck::cast_slice(frame.attenuation));
        }
        queue.write_buffer(&self.range_weight.buffer, 0, bytemuck::cast_slice(table));
        queue.write_buffer(&self.pass1_params, 0, bytemuck::bytes_of(&plan.pass1_params(frame.weights)));
        queue.write_buffer(&self.pass2_params, 0, bytemuck::bytes_of(&plan.pass2_params(None)));
        Ok(())
    }

    /// Pass-2 reduce width the module is specialised for
    fn reduce_size(plan: &MakePulsePlan) -> u32 {
        match plan.strategy {
            ReductionStrategy::GroupParallel => plan.pass2_local(),
            ReductionStrategy::RangeParallel | ReductionStrategy::Universal => 1,
        }
    }

    fn encode(&self, plan: &MakePulsePlan, encoder: &mut wgpu::CommandEncoder) -> SimResult<()> {
        let device = &self.ctx.device;
        let gates = plan.gate_count();

        // === Pass 1: per-group partial sums ===
        let pass1 = self.kernels.pass1(plan.group_size, gates)?;
        let pass1_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pass 1 Bind Group"),
            layout: &self.kernels.pass1_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.work.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.signal.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.attenuation.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.range_weight.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.pass1_params.as_entire_binding(),
                },
            ],
        });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Pass 1"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pass1);
            pass.set_bind_group(0, &pass1_bind_group, &[]);
            pass.dispatch_workgroups(plan.group_count, 1, 1);
        }

        // === Pass 2: fold groups into gates ===
        let kernel = self.kernels.pass2(Self::reduce_size(plan))?;
        let pass2_bind_group = |params: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Pass 2 Bind Group"),
                layout: &self.kernels.pass2_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.pulse.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.work.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        let base_bind_group = pass2_bind_group(&self.pass2_params);
        let range_groups = gates.div_ceil(RANGE_SIZE);

        let mut dispatch = |label: &str, pipeline: &wgpu::ComputePipeline, bind_group: &wgpu::BindGroup, groups: u32| {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        };

        match plan.strategy {
            ReductionStrategy::RangeParallel => {
                dispatch("Reduce Range Pass", &kernel.reduce_range, &base_bind_group, range_groups);
            }
            ReductionStrategy::GroupParallel => {
                dispatch("Reduce Local Pass", &kernel.reduce_local, &base_bind_group, gates);
            }
            ReductionStrategy::Universal => {
                // One uniform per round; every round is its own pass so each
                // sees the previous round's writes
                for round in plan.segment_rounds() {
                    let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Segment Round Params"),
                        contents: bytemuck::bytes_of(&plan.pass2_params(Some(round))),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                    let bind_group = pass2_bind_group(&params);
                    let groups = (gates * round.pairs()).div_ceil(RANGE_SIZE);
                    dispatch("Reduce Segment Pass", &kernel.reduce_segment, &bind_group, groups);
                }
                dispatch("Finalize Segment Pass", &kernel.finalize_segment, &base_bind_group, range_groups);
            }
        }
        Ok(())
    }
}

impl PulseSynthesizer for GpuSynthesizer {
    fn name(&self) -> &str {
        "gpu"
    }

    fn submit(&mut self, frame: &PulseFrame<'_>) -> SimResult<()> {
        if self.in_flight.len() >= FRAME_SLOTS {
            return Err(slots_exhausted(self.name()));
        }
        let plan = self.plan(frame)?;
        self.kernels.prepare_pass1(&self.ctx.device, plan.group_size, plan.gate_count())?;
        self.kernels.prepare_pass2(&self.ctx.device, Self::reduce_size(&plan))?;
        self.upload(&plan, frame)?;

        let pulse_bytes = plan.gates.len() as u64 * TUPLE_BYTES;
        let staging = self.staging_buffer(pulse_bytes);

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Make Pulse Encoder"),
        });
        self.encode(&plan, &mut encoder)?;
        encoder.copy_buffer_to_buffer(&self.pulse.buffer, 0, &staging, 0, pulse_bytes);
        let submission = self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        staging.slice(..pulse_bytes).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        debug!(
            "Submitted pulse: {} scatterers, {} groups of {}, {}",
            plan.entry_count, plan.group_count, plan.group_size, plan.strategy
        );
        self.in_flight.push_back(InFlight {
            staging,
            gate_count: plan.gates.len(),
            submission,
            mapped: rx,
        });
        self.last_plan = Some(plan);
        Ok(())
    }

    fn collect(&mut self) -> SimResult<Option<Vec<[f32; 4]>>> {
        let Some(frame) = self.in_flight.pop_front() else {
            return Ok(None);
        };
        self.ctx.device.poll(wgpu::Maintain::WaitForSubmissionIndex(frame.submission));
        frame
            .mapped
            .recv()
            .map_err(|_| SimError::Accelerator("Map callback dropped".into()))?
            .map_err(|e| SimError::Accelerator(format!("Pulse readback failed: {}", e)))?;

        let pulse_bytes = frame.gate_count as u64 * TUPLE_BYTES;
        let pulse = {
            let data = frame.staging.slice(..pulse_bytes).get_mapped_range();
            bytemuck::cast_slice::<u8, [f32; 4]>(&data).to_vec()
        };
        frame.staging.unmap();
        self.spare.push(frame.staging);
        Ok(Some(pulse))
    }

    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuOptions;
    use radarsim_core::{GateSpec, RangeWeightTable};
    use radarsim_reduce::reference_pulse;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// None when the machine has no usable adapter
    fn gpu() -> Option<GpuContext> {
        match GpuContext::new(GpuOptions::default()) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                eprintln!("skipping GPU test: {}", e);
                None
            }
        }
    }

    fn spread(n: usize, gates: &GateSpec, seed: u64) -> (Vec<[f32; 4]>, Vec<[f32; 4]>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let far = gates.gate_center(gates.count - 1);
        let sig = (0..n).map(|_| [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.5, -0.5]).collect();
        let att = (0..n).map(|_| [rng.gen_range(gates.range_start..far), 1.0, 0.0, 0.0]).collect();
        (sig, att)
    }

    fn assert_close(reference: &[[f32; 4]], candidate: &[[f32; 4]]) {
        assert_eq!(reference.len(), candidate.len());
        for (k, (r, c)) in reference.iter().zip(candidate).enumerate() {
            for i in 0..4 {
                let err = (r[i] - c[i]).abs() / r[i].abs().max(1.0);
                assert!(err <= 1e-3, "gate {} component {}: {} vs {}", k, i, r[i], c[i]);
            }
        }
    }

    #[test]
    fn test_gpu_matches_reference_for_every_strategy() {
        let Some(ctx) = gpu() else { return };
        let gates = GateSpec::new(1_000.0, 15.0, 24).unwrap();
        let weights = RangeWeightTable::triangle(15.0).unwrap();
        let (sig, att) = spread(20_000, &gates, 3);
        let frame = PulseFrame::new(&sig, &att, gates, &weights).unwrap();
        let reference = reference_pulse(&frame);

        let mut synth = GpuSynthesizer::new(ctx);
        for strategy in [ReductionStrategy::RangeParallel, ReductionStrategy::GroupParallel, ReductionStrategy::Universal] {
            synth.strategy = Some(strategy);
            let pulse = synth.synthesize(&frame).unwrap();
            assert_eq!(synth.last_plan().unwrap().strategy, strategy);
            assert_close(&reference, &pulse);
        }
    }

    #[test]
    fn test_gpu_pipelined_frames_in_order() {
        let Some(ctx) = gpu() else { return };
        let gates = GateSpec::new(500.0, 30.0, 16).unwrap();
        let weights = RangeWeightTable::triangle(30.0).unwrap();
        let (sig_a, att_a) = spread(3_000, &gates, 1);
        let (sig_b, att_b) = spread(70, &gates, 2);
        let a = PulseFrame::new(&sig_a, &att_a, gates, &weights).unwrap();
        let b = PulseFrame::new(&sig_b, &att_b, gates, &weights).unwrap();

        let mut synth = GpuSynthesizer::new(ctx);
        synth.submit(&a).unwrap();
        synth.submit(&b).unwrap();
        assert!(synth.submit(&a).is_err());
        assert_eq!(synth.in_flight(), 2);

        assert_close(&reference_pulse(&a), &synth.collect().unwrap().unwrap());
        assert_close(&reference_pulse(&b), &synth.collect().unwrap().unwrap());
        assert!(synth.collect().unwrap().is_none());
    }

    #[test]
    fn test_gpu_empty_frame_is_zero() {
        let Some(ctx) = gpu() else { return };
        let gates = GateSpec::new(100.0, 10.0, 5).unwrap();
        let weights = RangeWeightTable::triangle(10.0).unwrap();
        let frame = PulseFrame::new(&[], &[], gates, &weights).unwrap();
        let pulse = GpuSynthesizer::new(ctx).synthesize(&frame).unwrap();
        assert_eq!(pulse, vec![[0.0; 4]; 5]);
    }
}
