//! Lookup tables and the provider contract
//!
//! A table is a run of samples plus a linear map from a physical attribute to
//! a fractional index: `index = attribute * scale + offset`. Lookups clamp the
//! index to `[0, len - 1]` and interpolate between the two bracketing samples.

use crate::error::{SimError, SimResult};
use crate::scatterer::ScattererType;
use std::collections::HashMap;
use std::fmt;

/// Identity of a table attached to the simulation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableId {
    /// East wind component (m/s) vs altitude (m)
    WindU,
    /// North wind component (m/s) vs altitude (m)
    WindV,
    /// Vertical wind component (m/s) vs altitude (m)
    WindW,
    /// Drag coefficient (1/s) vs relative airspeed (m/s)
    Drag(ScattererType),
    /// Tumble rate (rad/s) vs relative airspeed (m/s)
    Spin(ScattererType),
    /// Backscatter amplitude vs aspect angle (degrees)
    CrossSection(ScattererType),
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableId::WindU => write!(f, "wind-u"),
            TableId::WindV => write!(f, "wind-v"),
            TableId::WindW => write!(f, "wind-w"),
            TableId::Drag(t) => write!(f, "drag[{}]", t),
            TableId::Spin(t) => write!(f, "spin[{}]", t),
            TableId::CrossSection(t) => write!(f, "cross-section[{}]", t),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    data: Vec<f32>,
    scale: f32,
    offset: f32,
}

impl Table {
    pub fn new(data: Vec<f32>, scale: f32, offset: f32) -> SimResult<Self> {
        if data.is_empty() {
            return Err(SimError::config("Table needs at least one sample"));
        }
        if !(scale.is_finite() && offset.is_finite()) {
            return Err(SimError::config("Table index mapping must be finite"));
        }
        Ok(Self { data, scale, offset })
    }

    /// Samples at `start, start + delta, ...`
    pub fn from_range(data: Vec<f32>, start: f32, delta: f32) -> SimResult<Self> {
        if !(delta.is_finite() && delta > 0.0) {
            return Err(SimError::config(format!("Table spacing must be positive, got {}", delta)));
        }
        Self::new(data, 1.0 / delta, -start / delta)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Largest valid fractional index
    pub fn max_index(&self) -> f32 {
        (self.data.len() - 1) as f32
    }

    /// Fractional index of an attribute, clamped into the table
    pub fn index_of(&self, attribute: f32) -> f32 {
        let x = attribute * self.scale + self.offset;
        if x.is_nan() {
            return 0.0;
        }
        x.clamp(0.0, self.max_index())
    }

    pub fn lookup(&self, attribute: f32) -> f32 {
        let x = self.index_of(attribute);
        let i0 = x.floor() as usize;
        let i1 = (i0 + 1).min(self.data.len() - 1);
        let frac = x - i0 as f32;
        self.data[i0] + (self.data[i1] - self.data[i0]) * frac
    }
}

/// Short symmetric range-weighting kernel applied per (scatterer, gate) pair
#[derive(Clone, Debug, PartialEq)]
pub struct RangeWeightTable {
    table: Table,
}

impl RangeWeightTable {
    /// `{0, 1, 0}` over `[-delta, delta]`: full weight at the gate centre,
    /// linear fall-off to zero at the neighbouring gate centres
    pub fn triangle(delta: f32) -> SimResult<Self> {
        let table = Table::from_range(vec![0.0, 1.0, 0.0], -delta, delta)?;
        Ok(Self { table })
    }

    pub fn from_table(table: Table) -> Self {
        Self { table }
    }

    /// Weight for a scatterer `offset` meters from a gate centre
    pub fn weight(&self, offset: f32) -> f32 {
        self.table.lookup(offset)
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Attribute-to-index scale (`dx`)
    pub fn dx(&self) -> f32 {
        self.table.scale
    }

    /// Index of a zero offset (`x0`)
    pub fn x0(&self) -> f32 {
        self.table.offset
    }

    /// Largest index (`xm`)
    pub fn xm(&self) -> f32 {
        self.table.max_index()
    }
}

/// Read-only source of lookup tables shared across a step
pub trait TableProvider: Send + Sync {
    fn table(&self, id: TableId) -> Option<&Table>;

    fn sample(&self, id: TableId, attribute: f32) -> Option<f32> {
        self.table(id).map(|t| t.lookup(attribute))
    }

    fn require(&self, id: TableId) -> SimResult<&Table> {
        self.table(id).ok_or(SimError::MissingTable(id))
    }
}

#[derive(Clone, Debug, Default)]
pub struct TableSet {
    tables: HashMap<TableId, Table>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TableId, table: Table) -> Option<Table> {
        self.tables.insert(id, table)
    }

    pub fn remove(&mut self, id: TableId) -> Option<Table> {
        self.tables.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Synthetic tables covering every id the time stepper asks for
    ///
    /// A sheared westerly wind profile, light updraft, and a small debris
    /// catalogue (leaf, board, plate) cycled over types 1..
    pub fn builtin() -> Self {
        let mut set = Self::new();

        // 0..10 km every 500 m
        let altitudes = (0..21).map(|i| i as f32 * 500.0);
        let u: Vec<f32> = altitudes.clone().map(|z| 5.0 + 15.0 * (z / 10_000.0)).collect();
        let v: Vec<f32> = altitudes.clone().map(|z| 2.0 + 3.0 * (z / 10_000.0)).collect();
        let w: Vec<f32> = altitudes.map(|z| 0.5 * (-z / 3_000.0).exp()).collect();
        set.insert(TableId::WindU, uniform(u, 0.0, 500.0));
        set.insert(TableId::WindV, uniform(v, 0.0, 500.0));
        set.insert(TableId::WindW, uniform(w, 0.0, 500.0));

        for kind in ScattererType::all() {
            let profile = DebrisProfile::for_type(kind);

            // Relative airspeed 0..50 m/s every 5 m/s
            let airspeeds = (0..11).map(|i| i as f32 * 5.0);
            let drag: Vec<f32> = airspeeds.clone()
                .map(|s| profile.drag * (1.0 + 0.004 * s))
                .collect();
            let spin: Vec<f32> = airspeeds.map(|s| profile.spin * s).collect();
            set.insert(TableId::Drag(kind), uniform(drag, 0.0, 5.0));
            set.insert(TableId::Spin(kind), uniform(spin, 0.0, 5.0));

            // Aspect 0..90 degrees every 10 degrees
            let sigma: Vec<f32> = (0..10)
                .map(|i| {
                    let aspect = (i as f32 * 10.0).to_radians();
                    profile.broadside * aspect.sin().abs() + profile.end_on * aspect.cos().abs()
                })
                .collect();
            set.insert(TableId::CrossSection(kind), uniform(sigma, 0.0, 10.0));
        }

        set
    }
}

impl TableProvider for TableSet {
    fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }
}

fn uniform(data: Vec<f32>, start: f32, delta: f32) -> Table {
    Table { data, scale: 1.0 / delta, offset: -start / delta }
}

/// Aerodynamic and scattering character of a built-in category
struct DebrisProfile {
    drag: f32,
    spin: f32,
    broadside: f32,
    end_on: f32,
}

impl DebrisProfile {
    fn for_type(kind: ScattererType) -> Self {
        if !kind.is_debris() {
            // Raindrop: ~5 m/s terminal velocity, isotropic
            return Self { drag: 2.0, spin: 0.0, broadside: 1.0e-3, end_on: 1.0e-3 };
        }
        match (kind.index() - 1) % 3 {
            0 => Self { drag: 1.5, spin: 0.8, broadside: 0.02, end_on: 0.004 },
            1 => Self { drag: 0.3, spin: 0.2, broadside: 0.30, end_on: 0.02 },
            _ => Self { drag: 0.6, spin: 0.4, broadside: 0.15, end_on: 0.05 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lookup_interpolates() {
        let t = Table::from_range(vec![0.0, 10.0, 20.0], 100.0, 50.0).unwrap();
        assert_relative_eq!(t.lookup(100.0), 0.0);
        assert_relative_eq!(t.lookup(125.0), 5.0);
        assert_relative_eq!(t.lookup(200.0), 20.0);
    }

    #[test]
    fn test_lookup_clamps() {
        let t = Table::from_range(vec![1.0, 2.0, 3.0], 0.0, 1.0).unwrap();
        assert_relative_eq!(t.lookup(-100.0), 1.0);
        assert_relative_eq!(t.lookup(1e9), 3.0);
        assert_relative_eq!(t.lookup(f32::NAN), 1.0);
        assert_relative_eq!(t.index_of(f32::INFINITY), 2.0);
    }

    #[test]
    fn test_single_sample_table() {
        let t = Table::new(vec![7.0], 1.0, 0.0).unwrap();
        assert_relative_eq!(t.lookup(3.0), 7.0);
        assert!(Table::new(vec![], 1.0, 0.0).is_err());
    }

    #[test]
    fn test_triangle_weights() {
        let w = RangeWeightTable::triangle(25.0).unwrap();
        assert_relative_eq!(w.x0(), 1.0);
        assert_relative_eq!(w.dx(), 0.04);
        assert_relative_eq!(w.xm(), 2.0);
        assert_relative_eq!(w.weight(0.0), 1.0);
        assert_relative_eq!(w.weight(12.5), 0.5);
        assert_relative_eq!(w.weight(-12.5), 0.5);
        assert_relative_eq!(w.weight(25.0), 0.0);
        assert_relative_eq!(w.weight(-80.0), 0.0);
    }

    #[test]
    fn test_builtin_complete() {
        let set = TableSet::builtin();
        for id in [TableId::WindU, TableId::WindV, TableId::WindW] {
            assert!(set.require(id).is_ok());
        }
        for kind in ScattererType::all() {
            assert!(set.require(TableId::Drag(kind)).is_ok());
            assert!(set.require(TableId::Spin(kind)).is_ok());
            assert!(set.require(TableId::CrossSection(kind)).is_ok());
        }
    }

    #[test]
    fn test_missing_table() {
        let mut set = TableSet::builtin();
        set.remove(TableId::WindV);
        assert!(matches!(set.require(TableId::WindV), Err(SimError::MissingTable(TableId::WindV))));
        assert_eq!(set.sample(TableId::WindV, 0.0), None);
    }
}
