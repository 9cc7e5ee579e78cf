//! Scatterer domain: initial population and spatial queries

use radarsim_core::constants::{MAX_SCATTERERS_PER_TYPE, MAX_SCATTERER_TYPES};
use radarsim_core::{DomainBox, Scatterer, ScattererType, SimError, SimResult};
use glam::{EulerRot, Quat};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Requested scatterer count per category
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub counts: [usize; MAX_SCATTERER_TYPES],
}

impl Default for PopulationConfig {
    fn default() -> Self {
        let mut counts = [0; MAX_SCATTERER_TYPES];
        counts[0] = 10_000;
        Self { counts }
    }
}

impl PopulationConfig {
    pub fn empty() -> Self {
        Self { counts: [0; MAX_SCATTERER_TYPES] }
    }

    pub fn with_count(mut self, kind: ScattererType, count: usize) -> Self {
        self.counts[kind.index()] = count;
        self
    }

    /// Precipitation at `density` scatterers per resolution volume of `domain`
    pub fn with_density(mut self, domain: &DomainBox, density: f64) -> Self {
        let count = (density.max(0.0) * domain.resolution_cells()).ceil();
        self.counts[0] = count.min(MAX_SCATTERERS_PER_TYPE as f64) as usize;
        self
    }

    /// Round every nonzero debris count up to a multiple of `group_size`
    pub fn revise_to_group_multiple(mut self, group_size: usize) -> Self {
        let group_size = group_size.max(1);
        let cap = MAX_SCATTERERS_PER_TYPE / group_size * group_size;
        for count in self.counts.iter_mut().skip(1) {
            if *count > 0 {
                *count = count.div_ceil(group_size).saturating_mul(group_size).min(cap);
            }
        }
        self
    }

    pub fn count(&self, kind: ScattererType) -> usize {
        self.counts[kind.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn validate(&self) -> SimResult<()> {
        for (k, &count) in self.counts.iter().enumerate() {
            if count > MAX_SCATTERERS_PER_TYPE {
                return Err(SimError::config(format!(
                    "Type {} requests {} scatterers, limit is {}",
                    k, count, MAX_SCATTERERS_PER_TYPE
                )));
            }
        }
        Ok(())
    }
}

/// Live scatterer population and the bounds it lives in
#[derive(Clone, Debug)]
pub struct DomainState {
    domain: DomainBox,
    pub(crate) scatterers: Vec<Scatterer>,
    counts: [usize; MAX_SCATTERER_TYPES],
}

impl DomainState {
    pub fn domain(&self) -> &DomainBox {
        &self.domain
    }

    pub fn scatterers(&self) -> &[Scatterer] {
        &self.scatterers
    }

    /// Mutable access for tests and drivers that seed custom states
    pub fn scatterers_mut(&mut self) -> &mut [Scatterer] {
        &mut self.scatterers
    }

    pub fn len(&self) -> usize {
        self.scatterers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scatterers.is_empty()
    }

    /// Configured count per type, fixed for the life of the run
    pub fn counts(&self) -> [usize; MAX_SCATTERER_TYPES] {
        self.counts
    }

    /// Types with a nonzero population
    pub fn present_types(&self) -> impl Iterator<Item = ScattererType> + '_ {
        ScattererType::all().filter(move |t| self.counts[t.index()] > 0)
    }

    /// Count scatterers per type by walking the population
    pub fn type_histogram(&self) -> [usize; MAX_SCATTERER_TYPES] {
        let mut histogram = [0; MAX_SCATTERER_TYPES];
        for s in &self.scatterers {
            histogram[s.kind.index()] += 1;
        }
        histogram
    }

    /// Indices of scatterers inside `query`, in population order
    pub fn select_in_box(&self, query: &DomainBox) -> Vec<usize> {
        self.scatterers
            .par_iter()
            .enumerate()
            .filter(|(_, s)| query.contains_point(s.position))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Create the initial population
///
/// Positions are uniform in volume over the domain box; debris start with a
/// random orientation, precipitation with the identity. Everything is
/// validated before any scatterer is created.
pub fn populate(config: &PopulationConfig, domain: &DomainBox, seed: u64) -> SimResult<DomainState> {
    domain.validate()?;
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut scatterers = Vec::with_capacity(config.total());

    for kind in ScattererType::all() {
        for _ in 0..config.count(kind) {
            let u = [rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>()];
            let position = domain.sample_uniform(u).to_cartesian();
            let mut s = Scatterer::new(kind, position);
            if kind.is_debris() {
                let (a, b, c) = (rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>());
                s.orientation = Quat::from_euler(
                    EulerRot::ZYX,
                    a * std::f32::consts::TAU,
                    (b - 0.5) * std::f32::consts::PI,
                    c * std::f32::consts::TAU,
                );
            }
            scatterers.push(s);
        }
    }

    info!(
        "Populated {} scatterers ({} precipitation, {} debris) in {:.0} resolution cells",
        scatterers.len(),
        config.counts[0],
        config.total() - config.counts[0],
        domain.resolution_cells()
    );

    Ok(DomainState {
        domain: *domain,
        scatterers,
        counts: config.counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_box() -> DomainBox {
        DomainBox::from_limits(5_000.0, 5_600.0, 15.0, -5.0, 5.0, 1.0, 0.0, 4.0, 1.0)
    }

    #[test]
    fn test_populate_counts_exact() {
        let config = PopulationConfig::empty()
            .with_count(ScattererType::PRECIPITATION, 1500)
            .with_count(ScattererType::new(1).unwrap(), 64)
            .with_count(ScattererType::new(3).unwrap(), 7);

        // Same answer every time it is re-run
        for _ in 0..2 {
            let state = populate(&config, &small_box(), 9).unwrap();
            assert_eq!(state.type_histogram(), config.counts);
            assert_eq!(state.len(), 1571);
        }
    }

    #[test]
    fn test_population_inside_box() {
        let domain = small_box();
        let state = populate(&PopulationConfig::default(), &domain, 1).unwrap();
        let inside = state.select_in_box(&domain);
        assert_eq!(inside.len(), state.len());
        assert!(inside.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_select_sub_box() {
        let domain = small_box();
        let state = populate(&PopulationConfig::default(), &domain, 2).unwrap();
        let half = DomainBox::from_limits(5_000.0, 5_600.0, 15.0, -5.0, 0.0, 1.0, 0.0, 4.0, 1.0);
        let selected = state.select_in_box(&half);
        assert!(!selected.is_empty() && selected.len() < state.len());
        for &i in &selected {
            assert!(state.scatterers()[i].radar_position().azimuth < 0.0);
        }
    }

    #[test]
    fn test_populate_rejects_before_work() {
        let too_many = PopulationConfig::empty()
            .with_count(ScattererType::new(2).unwrap(), MAX_SCATTERERS_PER_TYPE + 1);
        assert!(matches!(populate(&too_many, &small_box(), 0), Err(SimError::Configuration(_))));

        let flat = DomainBox::from_limits(5_000.0, 5_000.0, 15.0, -5.0, 5.0, 1.0, 0.0, 4.0, 1.0);
        assert!(matches!(populate(&PopulationConfig::default(), &flat, 0), Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_density_and_group_multiple() {
        let domain = small_box();
        // 40 x 10 x 4 cells
        let config = PopulationConfig::empty().with_density(&domain, 2.0);
        assert_eq!(config.counts[0], 3200);

        let revised = PopulationConfig::empty()
            .with_count(ScattererType::new(1).unwrap(), 1)
            .with_count(ScattererType::new(2).unwrap(), 128)
            .with_count(ScattererType::PRECIPITATION, 5)
            .revise_to_group_multiple(64);
        assert_eq!(revised.counts[1], 64);
        assert_eq!(revised.counts[2], 128);
        assert_eq!(revised.counts[3], 0);
        // Precipitation is left alone
        assert_eq!(revised.counts[0], 5);
    }
}
