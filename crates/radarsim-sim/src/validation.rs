//! Divergence between a reference pulse and an accelerated one
//!
//! The parallel reduction sums in a different order than the sequential
//! reference, so pulses are compared against a relative tolerance rather than
//! for equality.

use radarsim_core::{SimError, SimResult};
use serde::{Deserialize, Serialize};

/// Per-component bound: `|ref - cand| / max(|ref|, floor * peak) <= relative`
///
/// `peak` is the largest component magnitude of the reference pulse, so the
/// bound holds its meaning whatever the absolute scale of the echo.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub relative: f32,
    /// Fraction of the reference peak below which the error is measured
    /// against the floor instead of the value
    pub floor: f32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { relative: 1e-3, floor: 1.0 }
    }
}

impl Tolerance {
    pub fn error(&self, reference: f32, candidate: f32, peak: f32) -> f32 {
        let scale = reference.abs().max(self.floor * peak).max(f32::MIN_POSITIVE);
        (reference - candidate).abs() / scale
    }
}

/// Largest component magnitude in a pulse
pub fn peak_magnitude(pulse: &[[f32; 4]]) -> f32 {
    pulse.iter().flatten().fold(0.0, |m, v| m.max(v.abs()))
}

/// Worst component of one gate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateDivergence {
    pub gate: usize,
    pub component: usize,
    pub reference: f32,
    pub candidate: f32,
    pub error: f32,
}

/// Comparison of two pulses
#[derive(Clone, Debug)]
pub struct DivergenceReport {
    pub tolerance: Tolerance,
    /// Worst component error per gate
    pub gates: Vec<GateDivergence>,
    pub mean_error: f64,
    pub max_error: f32,
}

impl DivergenceReport {
    pub fn within_tolerance(&self) -> bool {
        self.max_error <= self.tolerance.relative
    }

    /// Gate with the largest error
    pub fn worst(&self) -> Option<&GateDivergence> {
        self.gates.iter().max_by(|a, b| a.error.total_cmp(&b.error))
    }

    pub fn failing(&self) -> impl Iterator<Item = &GateDivergence> {
        let limit = self.tolerance.relative;
        self.gates.iter().filter(move |g| g.error > limit)
    }
}

/// Compare a candidate pulse against the reference gate by gate
pub fn compare_pulses(reference: &[[f32; 4]], candidate: &[[f32; 4]], tolerance: Tolerance) -> SimResult<DivergenceReport> {
    if reference.len() != candidate.len() {
        return Err(SimError::config(format!(
            "Pulse lengths differ: reference {} gates, candidate {}",
            reference.len(),
            candidate.len()
        )));
    }

    let peak = peak_magnitude(reference);
    let gates: Vec<GateDivergence> = reference
        .iter()
        .zip(candidate)
        .enumerate()
        .map(|(gate, (r, c))| {
            (0..4)
                .map(|component| GateDivergence {
                    gate,
                    component,
                    reference: r[component],
                    candidate: c[component],
                    error: tolerance.error(r[component], c[component], peak),
                })
                .max_by(|a, b| a.error.total_cmp(&b.error))
                .unwrap_or(GateDivergence { gate, component: 0, reference: 0.0, candidate: 0.0, error: 0.0 })
        })
        .collect();

    let n = gates.len().max(1);
    let mean_error = gates.iter().map(|g| g.error as f64).sum::<f64>() / n as f64;
    let max_error = gates.iter().map(|g| g.error).fold(0.0, f32::max);

    Ok(DivergenceReport { tolerance, gates, mean_error, max_error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identical_pulses() {
        let pulse = vec![[1.0, -2.0, 3.0, 0.0]; 4];
        let report = compare_pulses(&pulse, &pulse, Tolerance::default()).unwrap();
        assert!(report.within_tolerance());
        assert_eq!(report.max_error, 0.0);
        assert_eq!(report.failing().count(), 0);
    }

    #[test]
    fn test_floor_scales_with_peak() {
        let tol = Tolerance { relative: 1e-3, floor: 0.01 };
        // 1e-4 off a 1e-3 value, measured against 1% of a peak of 1
        assert_relative_eq!(tol.error(1e-3, 1.1e-3, 1.0), 1e-2, epsilon = 1e-7);
        assert_relative_eq!(tol.error(100.0, 100.05, 100.0), 5e-4, epsilon = 1e-6);
        assert_eq!(tol.error(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_weak_echo_divergence_detected() {
        // Illuminated pulses sit many orders of magnitude below one
        let reference = vec![[2e-7, -1e-7, 5e-8, 0.0], [1e-7, 1e-7, 0.0, 0.0]];
        let close: Vec<[f32; 4]> = reference.iter().map(|g| g.map(|v| v * (1.0 + 1e-5))).collect();
        let off: Vec<[f32; 4]> = reference.iter().map(|g| g.map(|v| v * 1.1)).collect();

        assert!(compare_pulses(&reference, &close, Tolerance::default()).unwrap().within_tolerance());
        let report = compare_pulses(&reference, &off, Tolerance::default()).unwrap();
        assert!(!report.within_tolerance());
        assert_relative_eq!(report.max_error, 0.1, max_relative = 1e-3);
        assert_eq!(report.failing().count(), 2);
    }

    #[test]
    fn test_worst_gate_reported() {
        let reference = vec![[10.0, 0.0, 0.0, 0.0], [10.0, 0.0, 0.0, 0.0]];
        let candidate = vec![[10.0, 0.0, 0.0, 0.0], [10.0, 0.0, 0.5, 0.0]];
        let report = compare_pulses(&reference, &candidate, Tolerance::default()).unwrap();
        assert!(!report.within_tolerance());
        let worst = report.worst().unwrap();
        assert_eq!((worst.gate, worst.component), (1, 2));
        // 0.5 off a zero component, against the peak of 10
        assert_relative_eq!(worst.error, 0.05);
        assert!(compare_pulses(&reference, &candidate[..1], Tolerance::default()).is_err());
    }
}
