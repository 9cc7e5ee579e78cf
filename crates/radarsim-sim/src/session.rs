//! Session context: owns the domain, tables, stepper, pointing and synthesizer
//!
//! Per pulse: point the beam, select the illuminated scatterers, advance the
//! domain by one PRT, build the per-scatterer arrays and hand them to the
//! synthesizer. Pulses are either produced one at a time (`make_pulse`) or
//! pipelined with `submit_pulse` / `collect_pulse` so the readback of one
//! frame overlaps the dispatch of the next.

use crate::clock::SimClock;
use crate::illumination::{illumination_box, IlluminationFrame};
use crate::population::{populate, DomainState, PopulationConfig};
use crate::stepper::{ReinjectionPolicy, TimeStepper};
use radarsim_core::constants::{DOMAIN_PAD, GROUP_ITEMS, MAX_SCATTERER_TYPES, SUGGESTED_BEAMS};
use radarsim_core::{
    DomainBox, GateSpec, Pulse, PulseSink, RadarParams, RangeWeightTable, RunHeader, RunParams,
    ScanPattern, SimError, SimResult, TableProvider,
};
use radarsim_reduce::{PulseFrame, PulseSynthesizer};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};

/// Range window of the suggested domain (m)
const SUGGESTED_RANGE_START: f32 = 10_000.0;
const SUGGESTED_RANGE_EXTENT: f32 = 2_000.0;

/// Everything needed to start a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub radar: RadarParams,
    pub domain: DomainBox,
    pub population: PopulationConfig,
    /// Scan pattern string; `None` sweeps azimuth at `elevation`
    pub scan: Option<String>,
    /// Beam elevation in degrees when no scan pattern is given
    pub elevation: f32,
    pub reinjection: ReinjectionPolicy,
    pub seed: u64,
    /// Requested pass-1 work-group size
    pub group_size: u32,
    /// Illumination half-width in beamwidths
    pub beam_span: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let radar = RadarParams::default();
        Self {
            domain: suggested_domain(&radar),
            radar,
            population: PopulationConfig::default(),
            scan: None,
            elevation: 3.0,
            reinjection: ReinjectionPolicy::default(),
            seed: 0,
            group_size: GROUP_ITEMS,
            beam_span: 2.0,
        }
    }
}

impl SessionConfig {
    /// Load from a JSON file; missing fields take their defaults
    ///
    /// Without a `domain` the box is suggested from the file's radar.
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> SimResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let has_domain = value.get("domain").is_some();
        let mut config: Self = serde_json::from_value(value)?;
        if !has_domain {
            config.domain = suggested_domain(&config.radar);
        }
        Ok(config)
    }

    /// Drop the part of the domain above the beam plus `DOMAIN_PAD`,
    /// which is never illuminated
    pub fn trim_to_beam(&mut self) {
        self.domain.trim_elevation(self.elevation + DOMAIN_PAD);
    }

    pub fn validate(&self) -> SimResult<()> {
        self.radar.validate()?;
        self.domain.validate()?;
        self.population.validate()?;
        if self.group_size == 0 {
            return Err(SimError::config("Work-group size must be positive"));
        }
        if !(self.beam_span.is_finite() && self.beam_span > 0.0) {
            return Err(SimError::config("Beam span must be positive"));
        }
        Ok(())
    }

    pub fn gates(&self) -> SimResult<GateSpec> {
        GateSpec::for_box(&self.domain, self.radar.gate_spacing)
    }
}

fn suggested_domain(radar: &RadarParams) -> DomainBox {
    DomainBox::suggest(radar, SUGGESTED_BEAMS, SUGGESTED_RANGE_START, SUGGESTED_RANGE_EXTENT)
}

/// Azimuth sweep used when no scan pattern is configured
///
/// Steps from `low` by `step` degrees and wraps within `[low, high)`.
#[derive(Clone, Debug, PartialEq)]
pub struct AzimuthSweep {
    pub low: f32,
    pub high: f32,
    pub step: f32,
    pub elevation: f32,
    azimuth: f32,
}

impl AzimuthSweep {
    pub fn new(low: f32, high: f32, step: f32, elevation: f32) -> Self {
        Self { low, high, step, elevation, azimuth: low }
    }

    /// The driver default: -12° to 12° in 0.01° steps
    pub fn standard(elevation: f32) -> Self {
        Self::new(-12.0, 12.0, 0.01, elevation)
    }

    pub fn next_angles(&mut self) -> (f32, f32) {
        let angles = (self.azimuth, self.elevation);
        self.azimuth += self.step;
        if self.azimuth >= self.high {
            self.azimuth = self.low + (self.azimuth - self.high);
        }
        angles
    }
}

/// Where the beam goes for each pulse
#[derive(Clone, Debug)]
pub enum Pointing {
    Scan(ScanPattern),
    Sweep(AzimuthSweep),
}

impl Pointing {
    fn from_config(config: &SessionConfig) -> Self {
        match &config.scan {
            Some(text) => Pointing::Scan(ScanPattern::parse_or_empty(text)),
            None => Pointing::Sweep(AzimuthSweep::standard(config.elevation)),
        }
    }

    /// Next angles, or `None` to hold the previous pointing
    fn next(&mut self) -> Option<(f32, f32)> {
        match self {
            Pointing::Scan(pattern) => pattern.next(),
            Pointing::Sweep(sweep) => Some(sweep.next_angles()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PulseMeta {
    time: f64,
    azimuth: f32,
    elevation: f32,
}

pub struct Session {
    config: SessionConfig,
    state: DomainState,
    tables: Box<dyn TableProvider>,
    stepper: TimeStepper,
    pointing: Pointing,
    beam: (f32, f32),
    clock: SimClock,
    gates: GateSpec,
    weights: RangeWeightTable,
    synth: Box<dyn PulseSynthesizer>,
    frame: IlluminationFrame,
    pending: VecDeque<PulseMeta>,
}

impl Session {
    /// Validate, populate and wire up a run
    pub fn new(
        config: SessionConfig,
        tables: Box<dyn TableProvider>,
        synth: Box<dyn PulseSynthesizer>,
    ) -> SimResult<Self> {
        config.validate()?;
        let gates = config.gates()?;
        let weights = RangeWeightTable::triangle(config.radar.gate_spacing)?;
        let state = populate(&config.population, &config.domain, config.seed)?;
        let pointing = Pointing::from_config(&config);
        let beam = (config.domain.center().azimuth, config.elevation);

        info!(
            "Session ready: {} gates from {:.0} m every {:.1} m, synthesizer {}",
            gates.count,
            gates.range_start,
            gates.range_delta,
            synth.name()
        );

        Ok(Self {
            stepper: TimeStepper::new(config.reinjection, config.seed),
            clock: SimClock::new(config.radar.prt_s as f64),
            config,
            state,
            tables,
            pointing,
            beam,
            gates,
            weights,
            synth,
            frame: IlluminationFrame::new(),
            pending: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &DomainState {
        &self.state
    }

    pub fn gates(&self) -> &GateSpec {
        &self.gates
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Current beam (azimuth, elevation)
    pub fn beam(&self) -> (f32, f32) {
        self.beam
    }

    pub fn synthesizer_name(&self) -> &str {
        self.synth.name()
    }

    pub fn set_pointing(&mut self, pointing: Pointing) {
        self.pointing = pointing;
    }

    pub fn set_prt(&mut self, prt: f64) {
        self.clock.set_prt(prt);
    }

    pub fn run_header(&self) -> RunHeader {
        let mut population = [0u32; MAX_SCATTERER_TYPES];
        for (count, n) in population.iter_mut().zip(self.state.counts()) {
            *count = n as u32;
        }
        let params = RunParams {
            radar: self.config.radar.clone(),
            gates: self.gates,
            domain: self.config.domain,
            seed: self.config.seed,
        };
        RunHeader::new(params, population)
    }

    /// Advance the domain without synthesis or recording
    pub fn warm_up(&mut self, steps: u64) -> SimResult<()> {
        let dt = self.clock.prt() as f32;
        for _ in 0..steps {
            self.stepper.advance(&mut self.state, self.tables.as_ref(), dt)?;
            self.clock.tick();
        }
        Ok(())
    }

    /// Synthesize one pulse and wait for it
    pub fn make_pulse(&mut self) -> SimResult<Pulse> {
        if !self.pending.is_empty() {
            return Err(SimError::Accelerator(format!(
                "{} pipelined pulses still pending",
                self.pending.len()
            )));
        }
        self.submit_pulse()?;
        self.collect_pulse()?
            .ok_or_else(|| SimError::Accelerator("Submitted pulse never came back".into()))
    }

    /// Queue the next pulse without waiting for its result
    pub fn submit_pulse(&mut self) -> SimResult<()> {
        if let Some(angles) = self.pointing.next() {
            self.beam = angles;
        }
        let (azimuth, elevation) = self.beam;

        let lit = illumination_box(&self.config.domain, &self.config.radar, azimuth, elevation, self.config.beam_span);
        let indices = self.state.select_in_box(&lit);

        let dt = self.clock.prt() as f32;
        self.stepper.advance(&mut self.state, self.tables.as_ref(), dt)?;
        self.frame.illuminate(&self.state, &indices, &self.config.radar, azimuth, elevation);

        let frame = PulseFrame::new(&self.frame.signal, &self.frame.attenuation, self.gates, &self.weights)?;
        self.synth.submit(&frame)?;

        let time = self.clock.tick();
        debug!("Pulse at t={:.4} az={:.2} el={:.2}: {} scatterers lit", time, azimuth, elevation, indices.len());
        self.pending.push_back(PulseMeta { time, azimuth, elevation });
        Ok(())
    }

    /// Oldest submitted pulse, or `None` if nothing is pending
    pub fn collect_pulse(&mut self) -> SimResult<Option<Pulse>> {
        let Some(gates) = self.synth.collect()? else {
            return Ok(None);
        };
        let meta = self
            .pending
            .pop_front()
            .ok_or_else(|| SimError::Accelerator("Synthesizer returned an unrequested pulse".into()))?;
        Pulse::new(meta.time, meta.azimuth, meta.elevation, gates).map(Some)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Produce `frames` pulses into `sink`, calling `progress` after each
    ///
    /// In pipelined mode one frame is kept in flight while the previous one
    /// is recorded.
    pub fn run(
        &mut self,
        frames: u64,
        pipelined: bool,
        sink: &mut dyn PulseSink,
        mut progress: impl FnMut(&Pulse),
    ) -> SimResult<u64> {
        let mut recorded = 0;
        if pipelined {
            for _ in 0..frames {
                self.submit_pulse()?;
                if self.pending.len() > 1 {
                    if let Some(pulse) = self.collect_pulse()? {
                        sink.record(&pulse)?;
                        progress(&pulse);
                        recorded += 1;
                    }
                }
            }
            while let Some(pulse) = self.collect_pulse()? {
                sink.record(&pulse)?;
                progress(&pulse);
                recorded += 1;
            }
        } else {
            for _ in 0..frames {
                let pulse = self.make_pulse()?;
                sink.record(&pulse)?;
                progress(&pulse);
                recorded += 1;
            }
        }
        Ok(recorded)
    }
}
