//! Headless wgpu device for compute work

use radarsim_core::{SimError, SimResult};
use tracing::info;

/// Adapter selection for [`GpuContext::new`]
#[derive(Clone, Copy, Debug)]
pub struct GpuOptions {
    pub power_preference: wgpu::PowerPreference,
    /// Accept a software adapter when no hardware one is present
    pub force_fallback_adapter: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

/// Device, queue and the limits kernels are sized against
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

impl GpuContext {
    pub fn new(options: GpuOptions) -> SimResult<Self> {
        pollster::block_on(Self::new_async(options))
    }

    pub async fn new_async(options: GpuOptions) -> SimResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .ok_or_else(|| SimError::AcceleratorInit("No GPU adapter".into()))?;

        // Ask for everything the adapter offers; local memory and binding
        // sizes drive the reduction plan
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Radarsim Compute"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| SimError::AcceleratorInit(format!("Device request failed: {}", e)))?;

        let info = adapter.get_info();
        info!(
            "GPU {} ({:?}), {} bytes workgroup storage, {} bytes max storage binding",
            info.name, info.backend, limits.max_compute_workgroup_storage_size, limits.max_storage_buffer_binding_size
        );

        Ok(Self { device, queue, info, limits })
    }

    pub fn adapter_name(&self) -> &str {
        &self.info.name
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Local memory available to one work-group, in bytes
    pub fn local_mem_budget(&self) -> u32 {
        self.limits.max_compute_workgroup_storage_size
    }

    pub fn max_storage_binding(&self) -> u64 {
        self.limits.max_storage_buffer_binding_size as u64
    }
}
