//! Radar system parameters and range-gate layout

use crate::constants::{C, MAX_GATES};
use crate::domain_box::DomainBox;
use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};

/// Transmitter, antenna and timing parameters of the simulated radar
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadarParams {
    /// Carrier wavelength in meters
    pub wavelength: f32,
    /// Antenna 3-dB beamwidth in degrees
    pub beamwidth_deg: f32,
    /// Antenna gain in dBi
    pub gain_dbi: f32,
    /// Transmit pulse width in seconds
    pub pulse_width_s: f32,
    /// Peak transmit power in watts
    pub tx_power_w: f32,
    /// Pulse repetition time in seconds
    pub prt_s: f32,
    /// Range gate spacing in meters
    pub gate_spacing: f32,
}

impl Default for RadarParams {
    fn default() -> Self {
        Self {
            wavelength: 0.1,
            beamwidth_deg: 1.0,
            gain_dbi: 44.5,
            pulse_width_s: 0.2e-6,
            tx_power_w: 50.0e3,
            prt_s: 1.0e-3,
            gate_spacing: 15.0,
        }
    }
}

impl RadarParams {
    pub fn validate(&self) -> SimResult<()> {
        let positive = [
            ("wavelength", self.wavelength),
            ("beamwidth_deg", self.beamwidth_deg),
            ("pulse_width_s", self.pulse_width_s),
            ("tx_power_w", self.tx_power_w),
            ("prt_s", self.prt_s),
            ("gate_spacing", self.gate_spacing),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::config(format!("{} must be positive, got {}", name, value)));
            }
        }
        if !self.gain_dbi.is_finite() {
            return Err(SimError::config("gain_dbi must be finite"));
        }
        Ok(())
    }

    /// Range resolution implied by the pulse width (c·τ/2)
    pub fn range_resolution(&self) -> f32 {
        (C * self.pulse_width_s as f64 / 2.0) as f32
    }

    /// Linear antenna gain
    pub fn gain_linear(&self) -> f32 {
        10.0_f32.powf(self.gain_dbi / 10.0)
    }

    /// Voltage-domain radar constant: sqrt(Pt·G²·λ² / (4π)³)
    ///
    /// Multiply by sqrt(σ)/r² to get a received amplitude.
    pub fn amplitude_scale(&self) -> f32 {
        let g = self.gain_linear() as f64;
        let lambda = self.wavelength as f64;
        let four_pi_cubed = (4.0 * std::f64::consts::PI).powi(3);
        ((self.tx_power_w as f64 * g * g * lambda * lambda) / four_pi_cubed).sqrt() as f32
    }
}

/// Centers of the range gates of one pulse
///
/// Gate `k` is centred at `range_start + k * range_delta`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateSpec {
    pub range_start: f32,
    pub range_delta: f32,
    pub count: u32,
}

impl GateSpec {
    pub fn new(range_start: f32, range_delta: f32, count: u32) -> SimResult<Self> {
        if !(range_delta.is_finite() && range_delta > 0.0) {
            return Err(SimError::config(format!("Gate spacing must be positive, got {}", range_delta)));
        }
        if count == 0 || count as usize > MAX_GATES {
            return Err(SimError::config(format!(
                "Gate count {} outside 1..={}", count, MAX_GATES
            )));
        }
        Ok(Self { range_start, range_delta, count })
    }

    /// Gates covering the range extent of a domain box
    pub fn for_box(domain: &DomainBox, range_delta: f32) -> SimResult<Self> {
        if !(range_delta.is_finite() && range_delta > 0.0) {
            return Err(SimError::config(format!("Gate spacing must be positive, got {}", range_delta)));
        }
        let count = (domain.size.range / range_delta).ceil() as u32;
        Self::new(domain.origin.range, range_delta, count)
    }

    pub fn gate_center(&self, k: u32) -> f32 {
        self.range_start + k as f32 * self.range_delta
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_params_valid() {
        let params = RadarParams::default();
        assert!(params.validate().is_ok());
        // 0.2 us pulse -> 30 m
        assert_relative_eq!(params.range_resolution(), 29.979_246, epsilon = 1e-3);
    }

    #[test]
    fn test_invalid_params() {
        let params = RadarParams { prt_s: 0.0, ..Default::default() };
        assert!(matches!(params.validate(), Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_gate_limits() {
        assert!(GateSpec::new(0.0, 15.0, 0).is_err());
        assert!(GateSpec::new(0.0, 15.0, MAX_GATES as u32 + 1).is_err());
        assert!(GateSpec::new(0.0, -1.0, 4).is_err());

        let gates = GateSpec::new(1000.0, 15.0, 4).unwrap();
        assert_relative_eq!(gates.gate_center(3), 1045.0);
    }
}
