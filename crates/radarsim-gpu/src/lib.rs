//! GPU pulse synthesis
//!
//! Runs the kernels from `radarsim_reduce::shaders` on a headless wgpu
//! device. Sizing and strategy selection come from the same
//! [`radarsim_reduce::MakePulsePlan`] the CPU back ends use.

pub mod context;
pub mod kernels;
pub mod synthesizer;

pub use context::{GpuContext, GpuOptions};
pub use synthesizer::GpuSynthesizer;
