//! Beam illumination: which scatterers the beam sees and what they send back

use crate::population::DomainState;
use radarsim_core::coordinates::{angle_between, unit_vector};
use radarsim_core::{DomainBox, RadarParams, RadarPosition};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Box around the beam axis, `span` beamwidths each side, over the domain's range window
pub fn illumination_box(domain: &DomainBox, radar: &RadarParams, azimuth: f32, elevation: f32, span: f32) -> DomainBox {
    let half = span * radar.beamwidth_deg;
    let el_lo = (elevation - half).max(-90.0);
    let el_hi = (elevation + half).min(90.0);
    DomainBox::new(
        RadarPosition::new(domain.origin.range, azimuth - half, el_lo),
        RadarPosition::new(domain.size.range, (2.0 * half).min(360.0), el_hi - el_lo),
        domain.resolution,
    )
}

/// Two-way Gaussian antenna pattern for an off-axis angle (radians)
pub fn antenna_weight(off_axis: f32, beamwidth_rad: f32) -> f32 {
    let x = off_axis / beamwidth_rad;
    (-8.0 * std::f32::consts::LN_2 * x * x).exp()
}

/// Per-scatterer arrays fed to pulse synthesis, reused between pulses
#[derive(Clone, Debug, Default)]
pub struct IlluminationFrame {
    /// Received polarimetric tuple: hh (I, Q), vv (I, Q)
    pub signal: Vec<[f32; 4]>,
    /// (range, antenna weight, 0, 0)
    pub attenuation: Vec<[f32; 4]>,
}

impl IlluminationFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    /// Fill the arrays for the scatterers at `indices` under a beam pointed at (azimuth, elevation)
    ///
    /// Each intrinsic tuple is scaled by the radar equation (1/r² in voltage)
    /// and rotated by the round-trip phase -4πr/λ. The antenna weight goes
    /// into the attenuation tuple so the reduction applies it.
    pub fn illuminate(
        &mut self,
        state: &DomainState,
        indices: &[usize],
        radar: &RadarParams,
        azimuth: f32,
        elevation: f32,
    ) {
        let axis = unit_vector(azimuth, elevation);
        let scale = radar.amplitude_scale();
        let beamwidth = radar.beamwidth_deg.to_radians();
        let wavenumber = 4.0 * PI / radar.wavelength as f64;
        let scatterers = state.scatterers();

        let (signal, attenuation): (Vec<_>, Vec<_>) = indices
            .par_iter()
            .map(|&i| {
                let s = &scatterers[i];
                let p = s.position.as_dvec3();
                let range = p.length();
                let amplitude = if range > 0.0 { scale / (range * range) as f32 } else { 0.0 };

                let phase = (-wavenumber * range).rem_euclid(2.0 * PI);
                let (sin, cos) = (phase.sin() as f32, phase.cos() as f32);
                let rotate = |re: f32, im: f32| (amplitude * (re * cos - im * sin), amplitude * (re * sin + im * cos));
                let (hh_i, hh_q) = rotate(s.signal[0], s.signal[1]);
                let (vv_i, vv_q) = rotate(s.signal[2], s.signal[3]);

                let weight = antenna_weight(angle_between(s.position, axis), beamwidth);
                ([hh_i, hh_q, vv_i, vv_q], [range as f32, weight, 0.0, 0.0])
            })
            .unzip();

        self.signal = signal;
        self.attenuation = attenuation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{populate, PopulationConfig};
    use approx::assert_relative_eq;

    #[test]
    fn test_antenna_weight() {
        let bw = 1.0_f32.to_radians();
        assert_relative_eq!(antenna_weight(0.0, bw), 1.0);
        // Half power each way at half the beamwidth off axis
        assert_relative_eq!(antenna_weight(0.5 * bw, bw), 0.25, epsilon = 1e-6);
        assert!(antenna_weight(2.0 * bw, bw) < 1e-9);
    }

    #[test]
    fn test_illumination_box() {
        let radar = RadarParams::default();
        let domain = DomainBox::default();
        let b = illumination_box(&domain, &radar, 3.0, 1.0, 2.0);
        assert_relative_eq!(b.origin.azimuth, 1.0);
        assert_relative_eq!(b.size.azimuth, 4.0);
        assert_relative_eq!(b.origin.elevation, -1.0);
        assert_relative_eq!(b.size.elevation, 4.0);
        assert_relative_eq!(b.size.range, domain.size.range);
    }

    #[test]
    fn test_illuminate_on_axis() {
        let radar = RadarParams::default();
        let domain = DomainBox::from_limits(1_000.0, 1_300.0, 15.0, -3.0, 3.0, 1.0, 0.0, 3.0, 1.0);
        let state = populate(&PopulationConfig::default(), &domain, 3).unwrap();
        let indices: Vec<usize> = (0..state.len()).collect();

        let mut frame = IlluminationFrame::new();
        frame.illuminate(&state, &indices, &radar, 0.0, 1.5);
        assert_eq!(frame.len(), state.len());

        for (i, (sig, att)) in frame.signal.iter().zip(&frame.attenuation).enumerate() {
            let s = &state.scatterers()[i];
            assert_relative_eq!(att[0], s.position.length(), max_relative = 1e-5);
            assert!(att[1] > 0.0 && att[1] <= 1.0);
            // Rotation keeps the magnitude of each channel
            let r = att[0];
            let expected = radar.amplitude_scale() / (r * r);
            assert_relative_eq!((sig[0] * sig[0] + sig[1] * sig[1]).sqrt(), expected, max_relative = 1e-4);
        }
    }
}
