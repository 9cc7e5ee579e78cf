//! Sequential reference pulse synthesis

use crate::synth::{slots_exhausted, PulseFrame, PulseSynthesizer, FRAME_SLOTS};
use radarsim_core::SimResult;
use std::collections::VecDeque;

/// Straight double loop over gates and scatterers, accumulated in f64
#[derive(Debug, Default)]
pub struct SequentialSynthesizer {
    pending: VecDeque<Vec<[f32; 4]>>,
}

impl SequentialSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Reference pulse for a frame
pub fn reference_pulse(frame: &PulseFrame<'_>) -> Vec<[f32; 4]> {
    (0..frame.gates.count)
        .map(|k| {
            let mut acc = [0f64; 4];
            for (i, s) in frame.signal.iter().enumerate() {
                let w = frame.weight(i, k) as f64;
                for c in 0..4 {
                    acc[c] += s[c] as f64 * w;
                }
            }
            acc.map(|v| v as f32)
        })
        .collect()
}

impl PulseSynthesizer for SequentialSynthesizer {
    fn name(&self) -> &str {
        "sequential"
    }

    fn submit(&mut self, frame: &PulseFrame<'_>) -> SimResult<()> {
        if self.pending.len() >= FRAME_SLOTS {
            return Err(slots_exhausted(self.name()));
        }
        self.pending.push_back(reference_pulse(frame));
        Ok(())
    }

    fn collect(&mut self) -> SimResult<Option<Vec<[f32; 4]>>> {
        Ok(self.pending.pop_front())
    }

    fn in_flight(&self) -> usize {
        self.pending.len()
    }
}
