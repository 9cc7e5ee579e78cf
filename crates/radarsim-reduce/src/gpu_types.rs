//! GPU-compatible parameter blocks for the pulse reduction kernels

use bytemuck::{Pod, Zeroable};

/// Uniform block of the pass-1 kernel
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Pass1Params {
    /// Centre of gate 0 in meters
    pub range_start: f32,      // offset 0
    /// Gate spacing in meters
    pub range_delta: f32,      // offset 4
    /// Range-weight table index of a zero offset
    pub table_x0: f32,         // offset 8
    /// Range-weight table indices per meter
    pub table_dx: f32,         // offset 12
    /// Largest range-weight table index
    pub table_xm: f32,         // offset 16
    pub range_count: u32,      // offset 20
    pub group_count: u32,      // offset 24
    pub entry_count: u32,      // offset 28
    // Total: 32 bytes
}

impl Pass1Params {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Uniform block of the pass-2 kernels
///
/// `active` and `half` are only read by the segmented reduction, one block
/// per pairwise round.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Pass2Params {
    pub range_count: u32,
    pub group_count: u32,
    /// Lanes still holding partial sums in each gate's segment
    pub active: u32,
    /// Lane `j` absorbs lane `j + half`
    pub half: u32,
}

impl Pass2Params {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes() {
        // Uniform blocks must be multiples of 16 bytes
        assert_eq!(Pass1Params::SIZE, 32);
        assert_eq!(Pass2Params::SIZE, 16);
    }
}
