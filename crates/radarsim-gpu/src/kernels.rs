//! Compute pipelines for the two reduction passes
//!
//! Kernel sources are specialised by host-prepended constants, so a pipeline
//! is compiled per (group size, gate count) for pass 1 and per reduce width
//! for pass 2, and cached for the life of the synthesizer.

use radarsim_core::{SimError, SimResult};
use radarsim_reduce::shaders;
use std::collections::HashMap;
use tracing::debug;

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Pass-2 entry points, all compiled from one module
pub struct Pass2Kernel {
    pub reduce_range: wgpu::ComputePipeline,
    pub reduce_local: wgpu::ComputePipeline,
    pub reduce_segment: wgpu::ComputePipeline,
    pub finalize_segment: wgpu::ComputePipeline,
}

pub struct KernelCache {
    pub pass1_layout: wgpu::BindGroupLayout,
    pub pass2_layout: wgpu::BindGroupLayout,
    pass1_pipeline_layout: wgpu::PipelineLayout,
    pass2_pipeline_layout: wgpu::PipelineLayout,
    pass1: HashMap<(u32, u32), wgpu::ComputePipeline>,
    pass2: HashMap<u32, Pass2Kernel>,
}

impl KernelCache {
    pub fn new(device: &wgpu::Device) -> Self {
        let pass1_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass 1 Bind Group Layout"),
            entries: &[
                // (gate, group) partial sums
                storage_entry(0, false),
                // Signal tuples
                storage_entry(1, true),
                // Attenuation tuples
                storage_entry(2, true),
                // Range-weight table
                storage_entry(3, true),
                uniform_entry(4),
            ],
        });

        let pass2_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass 2 Bind Group Layout"),
            entries: &[
                // Output pulse
                storage_entry(0, false),
                // (gate, group) partial sums, folded in place by the segmented kernel
                storage_entry(1, false),
                uniform_entry(2),
            ],
        });

        let pass1_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pass 1 Pipeline Layout"),
            bind_group_layouts: &[&pass1_layout],
            push_constant_ranges: &[],
        });
        let pass2_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pass 2 Pipeline Layout"),
            bind_group_layouts: &[&pass2_layout],
            push_constant_ranges: &[],
        });

        Self {
            pass1_layout,
            pass2_layout,
            pass1_pipeline_layout,
            pass2_pipeline_layout,
            pass1: HashMap::new(),
            pass2: HashMap::new(),
        }
    }

    /// Compile the pass-1 pipeline for this shape unless it is cached
    pub fn prepare_pass1(&mut self, device: &wgpu::Device, group_size: u32, gate_count: u32) -> SimResult<()> {
        let key = (group_size, gate_count);
        if self.pass1.contains_key(&key) {
            return Ok(());
        }
        debug!("Compiling pass 1 for group size {} and {} gates", group_size, gate_count);
        let source = shaders::pass1_source(group_size, gate_count);
        let layout = &self.pass1_pipeline_layout;
        let pipeline = with_validation(device, "pass 1", || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Pass 1 Shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            compute_pipeline(device, layout, &module, "Pass 1 Pipeline", "main")
        })?;
        self.pass1.insert(key, pipeline);
        Ok(())
    }

    /// Compile the pass-2 kernels for this reduce width unless they are cached
    pub fn prepare_pass2(&mut self, device: &wgpu::Device, reduce_size: u32) -> SimResult<()> {
        if self.pass2.contains_key(&reduce_size) {
            return Ok(());
        }
        debug!("Compiling pass 2 for reduce width {}", reduce_size);
        let source = shaders::pass2_source(reduce_size);
        let layout = &self.pass2_pipeline_layout;
        let kernel = with_validation(device, "pass 2", || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Pass 2 Shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            Pass2Kernel {
                reduce_range: compute_pipeline(device, layout, &module, "Reduce Range Pipeline", "reduce_range"),
                reduce_local: compute_pipeline(device, layout, &module, "Reduce Local Pipeline", "reduce_local"),
                reduce_segment: compute_pipeline(device, layout, &module, "Reduce Segment Pipeline", "reduce_segment"),
                finalize_segment: compute_pipeline(device, layout, &module, "Finalize Segment Pipeline", "finalize_segment"),
            }
        })?;
        self.pass2.insert(reduce_size, kernel);
        Ok(())
    }

    pub fn pass1(&self, group_size: u32, gate_count: u32) -> SimResult<&wgpu::ComputePipeline> {
        self.pass1
            .get(&(group_size, gate_count))
            .ok_or_else(|| SimError::AcceleratorInit(format!("Pass 1 not compiled for group size {}", group_size)))
    }

    pub fn pass2(&self, reduce_size: u32) -> SimResult<&Pass2Kernel> {
        self.pass2
            .get(&reduce_size)
            .ok_or_else(|| SimError::AcceleratorInit(format!("Pass 2 not compiled for reduce width {}", reduce_size)))
    }

    /// Pipelines compiled so far
    pub fn len(&self) -> usize {
        self.pass1.len() + self.pass2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    label: &str,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Run `build` inside a validation error scope so a kernel that fails to
/// compile surfaces as an error instead of a device panic
fn with_validation<T>(device: &wgpu::Device, what: &str, build: impl FnOnce() -> T) -> SimResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let built = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(SimError::AcceleratorInit(format!("Failed to build {} kernel: {}", what, err))),
        None => Ok(built),
    }
}
