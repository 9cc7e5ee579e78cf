//! Two-pass pulse reduction
//!
//! Pass 1 splits the illuminated scatterers over fixed-size work-groups; each
//! group accumulates range-weighted signal tuples for every gate in local
//! memory and flushes one partial sum per `(gate, group)`. Pass 2 folds the
//! partial sums into one tuple per gate with one of three strategies chosen
//! by [`plan::select_strategy`].
//!
//! This crate holds the sizing logic, the GPU parameter blocks, the WGSL
//! kernels and two CPU back ends: a sequential reference and a tiled mirror
//! of the GPU algorithm.

pub mod gpu_types;
pub mod plan;
pub mod reference;
pub mod synth;
pub mod tiled;


/// WGSL kernel sources
///
/// The kernels size their work-groups and local arrays from constants the
/// host prepends at compile time.
pub mod shaders {
    pub const PASS1: &str = include_str!("shaders/pass1.wgsl");
    pub const PASS2: &str = include_str!("shaders/pass2.wgsl");

    pub fn pass1_source(group_size: u32, gate_count: u32) -> String {
        format!(
            "const GROUP_SIZE: u32 = {}u;\nconst PARTIAL_LEN: u32 = {}u;\n{}",
            group_size,
            group_size * gate_count,
            PASS1
        )
    }

    pub fn pass2_source(reduce_size: u32) -> String {
        format!(
            "const RANGE_SIZE: u32 = {}u;\nconst REDUCE_SIZE: u32 = {}u;\n{}",
            crate::plan::RANGE_SIZE,
            reduce_size.max(1),
            PASS2
        )
    }
}

pub use gpu_types::*;
pub use plan::{select_strategy, MakePulsePlan, ReductionStrategy, SegmentRound, DEFAULT_LOCAL_MEM_BUDGET};
pub use reference::{reference_pulse, SequentialSynthesizer};
pub use synth::{PulseFrame, PulseSynthesizer, FRAME_SLOTS};
pub use tiled::TiledSynthesizer;
