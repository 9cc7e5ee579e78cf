use crate::coordinates::*;
use crate::error::{SimError, SimResult};
use crate::params::RadarParams;
use glam::Vec3;
use serde::{Serialize, Deserialize};

/// Range/azimuth/elevation box of the simulated volume
///
/// `origin` is the lower corner, `size` the extent and `resolution` the
/// resolution cell, each as (range m, azimuth °, elevation °).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainBox {
    pub origin: RadarPosition,
    pub size: RadarPosition,
    pub resolution: RadarPosition,
}

impl Default for DomainBox {
    fn default() -> Self {
        Self {
            origin: RadarPosition::new(10_000.0, -12.0, 0.0),
            size: RadarPosition::new(2_000.0, 24.0, 5.0),
            resolution: RadarPosition::new(15.0, 1.0, 1.0),
        }
    }
}

impl DomainBox {
    pub fn new(origin: RadarPosition, size: RadarPosition, resolution: RadarPosition) -> Self {
        Self { origin, size, resolution }
    }

    /// Build from (start, end, resolution) triples per dimension
    #[allow(clippy::too_many_arguments)]
    pub fn from_limits(
        range_start: f32, range_end: f32, range_res: f32,
        azimuth_start: f32, azimuth_end: f32, azimuth_res: f32,
        elevation_start: f32, elevation_end: f32, elevation_res: f32,
    ) -> Self {
        Self {
            origin: RadarPosition::new(range_start, azimuth_start, elevation_start),
            size: RadarPosition::new(
                range_end - range_start,
                azimuth_end - azimuth_start,
                elevation_end - elevation_start,
            ),
            resolution: RadarPosition::new(range_res, azimuth_res, elevation_res),
        }
    }

    /// Suggest a box spanning `beams` beamwidths in azimuth around north
    ///
    /// Elevation starts at the horizon and spans half as many beamwidths.
    pub fn suggest(radar: &RadarParams, beams: u32, range_start: f32, range_extent: f32) -> Self {
        let beams = beams.max(1) as f32;
        let azimuth_extent = beams * radar.beamwidth_deg;
        let elevation_extent = 0.5 * beams * radar.beamwidth_deg;
        Self {
            origin: RadarPosition::new(range_start, -0.5 * azimuth_extent, 0.0),
            size: RadarPosition::new(range_extent, azimuth_extent, elevation_extent),
            resolution: RadarPosition::new(radar.gate_spacing, radar.beamwidth_deg, radar.beamwidth_deg),
        }
    }

    /// Lower the top of the box to `top` degrees elevation; a box already
    /// below it is unchanged
    pub fn trim_elevation(&mut self, top: f32) {
        if self.end().elevation > top {
            self.size.elevation = top - self.origin.elevation;
        }
    }

    /// Reject non-positive or non-finite extents before anything is built on the box
    pub fn validate(&self) -> SimResult<()> {
        let dims = [
            ("range", self.size.range, self.resolution.range),
            ("azimuth", self.size.azimuth, self.resolution.azimuth),
            ("elevation", self.size.elevation, self.resolution.elevation),
        ];
        for (name, extent, resolution) in dims {
            if !(extent.is_finite() && extent > 0.0) {
                return Err(SimError::config(format!("Domain {} extent must be positive, got {}", name, extent)));
            }
            if !(resolution.is_finite() && resolution > 0.0) {
                return Err(SimError::config(format!("Domain {} resolution must be positive, got {}", name, resolution)));
            }
        }
        if self.origin.range < 0.0 {
            return Err(SimError::config("Domain range origin must be non-negative"));
        }
        if self.size.azimuth > 360.0 {
            return Err(SimError::config("Domain azimuth extent exceeds 360 degrees"));
        }
        if self.origin.elevation < -90.0 || self.origin.elevation + self.size.elevation > 90.0 {
            return Err(SimError::config("Domain elevation must stay within [-90, 90] degrees"));
        }
        Ok(())
    }

    pub fn end(&self) -> RadarPosition {
        RadarPosition::new(
            self.origin.range + self.size.range,
            self.origin.azimuth + self.size.azimuth,
            self.origin.elevation + self.size.elevation,
        )
    }

    pub fn center(&self) -> RadarPosition {
        RadarPosition::new(
            self.origin.range + 0.5 * self.size.range,
            self.origin.azimuth + 0.5 * self.size.azimuth,
            self.origin.elevation + 0.5 * self.size.elevation,
        )
    }

    /// Offset of an azimuth from the box origin, unwrapped around the box centre
    fn azimuth_offset(&self, azimuth: f32) -> f32 {
        let offset = azimuth - self.origin.azimuth;
        if (0.0..self.size.azimuth).contains(&offset) {
            return offset;
        }
        let half = 0.5 * self.size.azimuth;
        wrap_degrees(offset - half) + half
    }

    /// Half-open containment test in all three dimensions
    pub fn contains(&self, p: &RadarPosition) -> bool {
        let dr = p.range - self.origin.range;
        let da = self.azimuth_offset(p.azimuth);
        let de = p.elevation - self.origin.elevation;
        (0.0..self.size.range).contains(&dr)
            && (0.0..self.size.azimuth).contains(&da)
            && (0.0..self.size.elevation).contains(&de)
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.contains(&RadarPosition::from_cartesian(p))
    }

    /// Periodic re-entry: a coordinate that leaves through one face comes back through the opposite face
    pub fn wrap(&self, p: &RadarPosition) -> RadarPosition {
        fn fold(offset: f32, extent: f32) -> f32 {
            let v = offset.rem_euclid(extent);
            if v >= extent { 0.0 } else { v }
        }
        RadarPosition::new(
            self.origin.range + fold(p.range - self.origin.range, self.size.range),
            self.origin.azimuth + fold(self.azimuth_offset(p.azimuth), self.size.azimuth),
            self.origin.elevation + fold(p.elevation - self.origin.elevation, self.size.elevation),
        )
    }

    /// Map unit-cube coordinates to a point uniformly distributed in volume
    pub fn sample_uniform(&self, u: [f32; 3]) -> RadarPosition {
        let r0 = self.origin.range.max(0.0) as f64;
        let r1 = r0 + self.size.range as f64;
        let range = (u[0] as f64 * (r1.powi(3) - r0.powi(3)) + r0.powi(3)).cbrt() as f32;

        let azimuth = self.origin.azimuth + u[1] * self.size.azimuth;

        let s0 = self.origin.elevation.to_radians().sin();
        let s1 = (self.origin.elevation + self.size.elevation).to_radians().sin();
        let elevation = (s0 + u[2] * (s1 - s0)).clamp(-1.0, 1.0).asin().to_degrees();

        self.clamp_inside(&RadarPosition::new(range, azimuth, elevation))
    }

    /// Pull a position a hair inside the box, away from every face
    ///
    /// Keeps rounding at the upper faces (and in spherical/Cartesian round
    /// trips) from leaving the half-open box.
    pub fn clamp_inside(&self, p: &RadarPosition) -> RadarPosition {
        let inside = |offset: f32, extent: f32| offset.clamp(extent * 1e-5, extent * (1.0 - 1e-5));
        RadarPosition::new(
            self.origin.range + inside(p.range - self.origin.range, self.size.range),
            self.origin.azimuth + inside(self.azimuth_offset(p.azimuth), self.size.azimuth),
            self.origin.elevation + inside(p.elevation - self.origin.elevation, self.size.elevation),
        )
    }

    /// Number of resolution cells in the box
    pub fn resolution_cells(&self) -> f64 {
        (self.size.range / self.resolution.range) as f64
            * (self.size.azimuth / self.resolution.azimuth) as f64
            * (self.size.elevation / self.resolution.elevation) as f64
    }
}
