use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Radar-centric spherical position
///
/// Range in meters, azimuth in degrees clockwise from north, elevation in
/// degrees above the horizon. The radar sits at the origin of a local
/// east/north/up frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarPosition {
    pub range: f32,
    pub azimuth: f32,
    pub elevation: f32,
}

impl RadarPosition {
    pub fn new(range: f32, azimuth: f32, elevation: f32) -> Self {
        Self { range, azimuth, elevation }
    }

    pub fn from_cartesian(p: Vec3) -> Self {
        let range = p.length();
        let horizontal = (p.x * p.x + p.y * p.y).sqrt();
        let azimuth = p.x.atan2(p.y).to_degrees();
        let elevation = if range > 0.0 { p.z.atan2(horizontal).to_degrees() } else { 0.0 };
        Self { range, azimuth, elevation }
    }

    pub fn to_cartesian(&self) -> Vec3 {
        unit_vector(self.azimuth, self.elevation) * self.range
    }
}

/// Unit line-of-sight vector for a pointing direction in degrees
pub fn unit_vector(azimuth_deg: f32, elevation_deg: f32) -> Vec3 {
    let (sin_az, cos_az) = azimuth_deg.to_radians().sin_cos();
    let (sin_el, cos_el) = elevation_deg.to_radians().sin_cos();
    Vec3::new(cos_el * sin_az, cos_el * cos_az, sin_el)
}

/// Wrap an angle into [-180, 180)
pub fn wrap_degrees(angle: f32) -> f32 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// Angle between two directions in radians
pub fn angle_between(a: Vec3, b: Vec3) -> f32 {
    let denom = a.length() * b.length();
    if denom <= 0.0 {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos()
}
