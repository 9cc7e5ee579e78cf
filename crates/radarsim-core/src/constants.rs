/// Speed of light in m/s
pub const C: f64 = 299_792_458.0;

/// Elevation padding above the scan elevation when trimming a suggested domain (degrees)
pub const DOMAIN_PAD: f32 = 2.0;

/// Beamwidths spanned in azimuth by the default suggested domain
pub const SUGGESTED_BEAMS: u32 = 16;

/// Maximum number of range gates in a pulse
pub const MAX_GATES: usize = 512;

/// Preferred work-group size for pulse synthesis
pub const GROUP_ITEMS: u32 = 64;

/// Scatterer categories: type 0 is precipitation, 1.. are debris
pub const MAX_SCATTERER_TYPES: usize = 8;

/// Hard per-type population ceiling
pub const MAX_SCATTERERS_PER_TYPE: usize = 1 << 24;

/// Maximum entries in a scan pattern
pub const MAX_SCAN_POSITIONS: usize = 64;

/// Standard gravity in m/s²
pub const GRAVITY: f32 = 9.80665;

/// Size of one gate tuple (4 × f32) in bytes
pub const TUPLE_BYTES: u64 = 16;
