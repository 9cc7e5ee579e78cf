//! Pulse synthesizer interface shared by the CPU and GPU back ends

use radarsim_core::{GateSpec, RangeWeightTable, SimError, SimResult};

/// Frames that may be submitted before the oldest is collected
pub const FRAME_SLOTS: usize = 2;

/// Inputs of one pulse reduction
///
/// `signal[i]` is the illuminated scatterer's polarimetric tuple and
/// `attenuation[i]` carries `(range, gain, _, _)`: the gate weight of a
/// scatterer is the range-weight table at `range - gate_centre` times `gain`.
#[derive(Clone, Copy, Debug)]
pub struct PulseFrame<'a> {
    pub signal: &'a [[f32; 4]],
    pub attenuation: &'a [[f32; 4]],
    pub gates: GateSpec,
    pub weights: &'a RangeWeightTable,
}

impl<'a> PulseFrame<'a> {
    pub fn new(
        signal: &'a [[f32; 4]],
        attenuation: &'a [[f32; 4]],
        gates: GateSpec,
        weights: &'a RangeWeightTable,
    ) -> SimResult<Self> {
        if signal.len() != attenuation.len() {
            return Err(SimError::config(format!(
                "Signal has {} entries but attenuation has {}",
                signal.len(),
                attenuation.len()
            )));
        }
        Ok(Self { signal, attenuation, gates, weights })
    }

    pub fn entry_count(&self) -> usize {
        self.signal.len()
    }

    /// Weight of entry `i` for gate `k`
    #[inline]
    pub fn weight(&self, i: usize, k: u32) -> f32 {
        let a = self.attenuation[i];
        self.weights.weight(a[0] - self.gates.gate_center(k)) * a[1]
    }
}

/// Turns per-scatterer arrays into one tuple per range gate
///
/// `submit` queues a frame and returns immediately when the back end can
/// overlap work; `collect` blocks for the oldest submitted frame. At most
/// [`FRAME_SLOTS`] frames are in flight.
pub trait PulseSynthesizer: Send {
    fn name(&self) -> &str;

    fn submit(&mut self, frame: &PulseFrame<'_>) -> SimResult<()>;

    /// Oldest in-flight pulse, or `None` when nothing is pending
    fn collect(&mut self) -> SimResult<Option<Vec<[f32; 4]>>>;

    fn in_flight(&self) -> usize;

    /// Blocking submit + collect
    fn synthesize(&mut self, frame: &PulseFrame<'_>) -> SimResult<Vec<[f32; 4]>> {
        if self.in_flight() > 0 {
            return Err(SimError::Accelerator(format!(
                "{} frames still in flight, collect them before a blocking synthesis",
                self.in_flight()
            )));
        }
        self.submit(frame)?;
        self.collect()?
            .ok_or_else(|| SimError::Accelerator("Submitted frame produced no pulse".into()))
    }
}

pub fn slots_exhausted(name: &str) -> SimError {
    SimError::Accelerator(format!("{}: all {} frame slots are in flight", name, FRAME_SLOTS))
}
