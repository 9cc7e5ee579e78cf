use crate::constants::MAX_SCATTERER_TYPES;
use crate::coordinates::RadarPosition;
use crate::error::{SimError, SimResult};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scatterer category. Type 0 is precipitation, 1.. are debris kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScattererType(u8);

impl ScattererType {
    pub const PRECIPITATION: ScattererType = ScattererType(0);

    pub fn new(index: usize) -> SimResult<Self> {
        if index >= MAX_SCATTERER_TYPES {
            return Err(SimError::config(format!(
                "Scatterer type {} outside 0..{}", index, MAX_SCATTERER_TYPES
            )));
        }
        Ok(Self(index as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_debris(self) -> bool {
        self.0 != 0
    }

    /// Every configurable category in ascending order
    pub fn all() -> impl Iterator<Item = ScattererType> {
        (0..MAX_SCATTERER_TYPES as u8).map(ScattererType)
    }
}

impl fmt::Display for ScattererType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "precipitation")
        } else {
            write!(f, "debris{}", self.0)
        }
    }
}

/// One point scatterer in the local east/north/up frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scatterer {
    pub kind: ScattererType,
    /// Position in meters
    pub position: Vec3,
    /// Velocity in m/s
    pub velocity: Vec3,
    pub orientation: Quat,
    /// Intrinsic polarimetric tuple: hh (I, Q), vv (I, Q)
    pub signal: [f32; 4],
}

impl Scatterer {
    pub fn new(kind: ScattererType, position: Vec3) -> Self {
        Self {
            kind,
            position,
            velocity: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            signal: [1.0, 0.0, 1.0, 0.0],
        }
    }

    pub fn radar_position(&self) -> RadarPosition {
        RadarPosition::from_cartesian(self.position)
    }

    /// Long axis of the body in world coordinates
    pub fn body_axis(&self) -> Vec3 {
        self.orientation * Vec3::X
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_bounds() {
        assert!(ScattererType::new(0).is_ok());
        assert!(ScattererType::new(MAX_SCATTERER_TYPES - 1).is_ok());
        assert!(ScattererType::new(MAX_SCATTERER_TYPES).is_err());
        assert_eq!(ScattererType::all().count(), MAX_SCATTERER_TYPES);
        assert!(!ScattererType::PRECIPITATION.is_debris());
    }
}
