//! Time stepper: wind, drag, tumble and backscatter refresh per scatterer
//!
//! Each scatterer is updated from its own state and the shared read-only
//! tables only, so the whole population is one parallel map.

use crate::population::DomainState;
use radarsim_core::constants::{GRAVITY, MAX_SCATTERER_TYPES};
use radarsim_core::coordinates::angle_between;
use radarsim_core::{DomainBox, RadarPosition, Scatterer, SimError, SimResult, Table, TableId, TableProvider};
use glam::{Quat, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a scatterer that leaves the domain box comes back in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReinjectionPolicy {
    /// Periodic re-entry through the opposite face of the box
    #[default]
    Wrap,
    /// Fresh uniform position drawn from a hash of (seed, step, index)
    Respawn,
}

/// Tables for one scatterer type
#[derive(Clone, Copy)]
struct TypeTables<'a> {
    drag: &'a Table,
    spin: &'a Table,
    cross_section: &'a Table,
}

struct StepTables<'a> {
    wind: [&'a Table; 3],
    per_type: [Option<TypeTables<'a>>; MAX_SCATTERER_TYPES],
}

impl<'a> StepTables<'a> {
    /// Resolve every table the population needs, failing before any mutation
    fn resolve(state: &DomainState, tables: &'a dyn TableProvider) -> SimResult<Self> {
        let wind = [
            tables.require(TableId::WindU)?,
            tables.require(TableId::WindV)?,
            tables.require(TableId::WindW)?,
        ];
        let mut per_type = [None; MAX_SCATTERER_TYPES];
        for kind in state.present_types() {
            per_type[kind.index()] = Some(TypeTables {
                drag: tables.require(TableId::Drag(kind))?,
                spin: tables.require(TableId::Spin(kind))?,
                cross_section: tables.require(TableId::CrossSection(kind))?,
            });
        }
        Ok(Self { wind, per_type })
    }

    fn wind_at(&self, altitude: f32) -> Vec3 {
        Vec3::new(
            self.wind[0].lookup(altitude),
            self.wind[1].lookup(altitude),
            self.wind[2].lookup(altitude),
        )
    }
}

#[derive(Clone, Debug)]
pub struct TimeStepper {
    policy: ReinjectionPolicy,
    seed: u64,
    step: u64,
}

impl TimeStepper {
    pub fn new(policy: ReinjectionPolicy, seed: u64) -> Self {
        Self { policy, seed, step: 0 }
    }

    pub fn policy(&self) -> ReinjectionPolicy {
        self.policy
    }

    /// Steps taken so far
    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Advance every scatterer by `dt` seconds
    ///
    /// Fails with `MissingTable` before touching the population if any table
    /// the present types need is absent.
    pub fn advance(&mut self, state: &mut DomainState, tables: &dyn TableProvider, dt: f32) -> SimResult<()> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SimError::config(format!("Time step must be finite and non-negative, got {}", dt)));
        }
        let resolved = StepTables::resolve(state, tables)?;
        let domain = *state.domain();
        let (policy, seed, step) = (self.policy, self.seed, self.step);

        let reinjected: usize = state
            .scatterers
            .par_iter_mut()
            .enumerate()
            .map(|(i, s)| {
                let Some(own) = resolved.per_type[s.kind.index()] else {
                    return 0;
                };
                integrate(s, &resolved, &own, dt);
                if domain.contains_point(s.position) {
                    return 0;
                }
                s.position = reinject(&domain, s.position, policy, seed, step, i as u64);
                1
            })
            .sum();

        if reinjected > 0 {
            debug!("Step {}: re-injected {} scatterers", step, reinjected);
        }
        self.step += 1;
        Ok(())
    }
}

fn integrate(s: &mut Scatterer, tables: &StepTables<'_>, own: &TypeTables<'_>, dt: f32) {
    let wind = tables.wind_at(s.position.z);
    let air = wind - s.velocity;
    let airspeed = air.length();

    if dt > 0.0 {
        // Linear drag toward the local wind plus gravity, integrated exactly
        // over the step: velocity relaxes toward the terminal velocity
        let k = own.drag.lookup(airspeed).max(0.0);
        if k > 0.0 {
            let terminal = wind - Vec3::Z * (GRAVITY / k);
            s.velocity = terminal + (s.velocity - terminal) * (-k * dt).exp();
        } else {
            s.velocity -= Vec3::Z * (GRAVITY * dt);
        }
        s.position += s.velocity * dt;

        // Tumble about the horizontal axis normal to the relative flow
        let angle = own.spin.lookup(airspeed) * dt;
        if angle != 0.0 {
            if let Some(axis) = air.cross(Vec3::Z).try_normalize() {
                s.orientation = (Quat::from_axis_angle(axis, angle) * s.orientation).normalize();
            }
        }
    }

    // Aspect between the body axis and the line of sight, folded into [0, 90]
    let aspect = angle_between(s.body_axis(), s.position).to_degrees() % 180.0;
    let aspect = if aspect > 90.0 { 180.0 - aspect } else { aspect };
    let hh = own.cross_section.lookup(aspect);
    let vv = own.cross_section.lookup(90.0 - aspect);
    s.signal = [hh, 0.0, vv, 0.0];
}

fn reinject(domain: &DomainBox, position: Vec3, policy: ReinjectionPolicy, seed: u64, step: u64, index: u64) -> Vec3 {
    let candidate = match policy {
        ReinjectionPolicy::Wrap => domain.wrap(&RadarPosition::from_cartesian(position)),
        ReinjectionPolicy::Respawn => {
            let mut h = splitmix64(seed ^ splitmix64(step ^ splitmix64(index)));
            let mut unit = || {
                h = splitmix64(h);
                (h >> 40) as f32 / (1u64 << 24) as f32
            };
            domain.sample_uniform([unit(), unit(), unit()])
        }
    };
    let p = candidate.to_cartesian();
    if domain.contains_point(p) {
        return p;
    }
    let clamped = domain.clamp_inside(&candidate).to_cartesian();
    if clamped.is_finite() {
        clamped
    } else {
        domain.center().to_cartesian()
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{populate, PopulationConfig};
    use radarsim_core::{ScattererType, TableSet};

    fn state() -> DomainState {
        let domain = DomainBox::from_limits(3_000.0, 3_300.0, 15.0, -4.0, 4.0, 1.0, 0.0, 3.0, 1.0);
        let config = PopulationConfig::empty()
            .with_count(ScattererType::PRECIPITATION, 800)
            .with_count(ScattererType::new(1).unwrap(), 64)
            .with_count(ScattererType::new(2).unwrap(), 64);
        populate(&config, &domain, 5).unwrap()
    }

    #[test]
    fn test_zero_step_is_identity() {
        let tables = TableSet::builtin();
        let mut s = state();
        let before = s.scatterers().to_vec();
        TimeStepper::new(ReinjectionPolicy::Wrap, 0).advance(&mut s, &tables, 0.0).unwrap();
        for (a, b) in before.iter().zip(s.scatterers()) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.velocity, b.velocity);
            assert_eq!(a.orientation, b.orientation);
        }
    }

    #[test]
    fn test_missing_table_leaves_state_untouched() {
        let mut tables = TableSet::builtin();
        tables.remove(TableId::Spin(ScattererType::new(2).unwrap()));
        let mut s = state();
        let before = s.scatterers().to_vec();
        let result = TimeStepper::new(ReinjectionPolicy::Wrap, 0).advance(&mut s, &tables, 0.01);
        assert!(matches!(result, Err(SimError::MissingTable(TableId::Spin(_)))));
        assert_eq!(before, s.scatterers());
    }

    #[test]
    fn test_tables_for_absent_types_not_required() {
        let mut tables = TableSet::builtin();
        tables.remove(TableId::Drag(ScattererType::new(7).unwrap()));
        let mut s = state();
        assert!(TimeStepper::new(ReinjectionPolicy::Wrap, 0).advance(&mut s, &tables, 0.01).is_ok());
    }

    #[test]
    fn test_population_constant_under_reinjection() {
        let tables = TableSet::builtin();
        for policy in [ReinjectionPolicy::Wrap, ReinjectionPolicy::Respawn] {
            let mut s = state();
            let counts = s.type_histogram();
            let mut stepper = TimeStepper::new(policy, 17);
            // 5 s steps carry everything far outside a 300 m box
            for _ in 0..40 {
                stepper.advance(&mut s, &tables, 5.0).unwrap();
                assert_eq!(s.type_histogram(), counts);
                assert_eq!(s.select_in_box(s.domain()).len(), s.len(), "{:?}", policy);
            }
            assert_eq!(stepper.steps(), 40);
        }
    }

    #[test]
    fn test_precipitation_falls() {
        let tables = TableSet::builtin();
        let mut s = state();
        let mut stepper = TimeStepper::new(ReinjectionPolicy::Wrap, 0);
        for _ in 0..200 {
            stepper.advance(&mut s, &tables, 0.01).unwrap();
        }
        let drop = s.scatterers().iter().find(|d| d.kind == ScattererType::PRECIPITATION).unwrap();
        assert!(drop.velocity.z < -1.0, "{:?}", drop.velocity);
        assert_eq!(drop.signal[1], 0.0);
        assert!(drop.signal[0] > 0.0);
    }

    #[test]
    fn test_negative_step_rejected() {
        let tables = TableSet::builtin();
        let mut s = state();
        assert!(TimeStepper::new(ReinjectionPolicy::Wrap, 0).advance(&mut s, &tables, -1.0).is_err());
        assert!(TimeStepper::new(ReinjectionPolicy::Wrap, 0).advance(&mut s, &tables, f32::NAN).is_err());
    }
}
