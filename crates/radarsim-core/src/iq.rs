//! Pulse records and the IQ file layout
//!
//! A recorded run is one fixed-size run header followed by one record per
//! pulse. Everything is little endian.
//!
//! Run header (4096 bytes, zero padded):
//! ```text
//! magic "RSIQ" | version u32 | population counts 8 x u32 | params_len u32 | RunParams JSON
//! ```
//! Pulse record:
//! ```text
//! time f64 | azimuth f32 | elevation f32 | gate_count x [f32; 4]
//! ```

use crate::constants::{MAX_GATES, MAX_SCATTERER_TYPES};
use crate::domain_box::DomainBox;
use crate::error::{SimError, SimResult};
use crate::params::{GateSpec, RadarParams};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

pub const IQ_MAGIC: [u8; 4] = *b"RSIQ";
pub const IQ_VERSION: u32 = 1;
pub const RUN_HEADER_SIZE: usize = 4096;
pub const PULSE_HEADER_SIZE: usize = 16;

/// Per-gate signal tuples of one transmit/receive cycle
#[derive(Clone, Debug, PartialEq)]
pub struct Pulse {
    pub time: f64,
    pub azimuth: f32,
    pub elevation: f32,
    gates: Vec<[f32; 4]>,
}

impl Pulse {
    pub fn new(time: f64, azimuth: f32, elevation: f32, gates: Vec<[f32; 4]>) -> SimResult<Self> {
        if gates.is_empty() || gates.len() > MAX_GATES {
            return Err(SimError::config(format!(
                "Pulse gate count {} outside 1..={}", gates.len(), MAX_GATES
            )));
        }
        Ok(Self { time, azimuth, elevation, gates })
    }

    pub fn gates(&self) -> &[[f32; 4]] {
        &self.gates
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn into_gates(self) -> Vec<[f32; 4]> {
        self.gates
    }

    /// Total power over all gates (|hh|² + |vv|²)
    pub fn power(&self) -> f64 {
        self.gates.iter()
            .map(|g| g.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>())
            .sum()
    }
}

/// Global parameters of a recorded run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub radar: RadarParams,
    pub gates: GateSpec,
    pub domain: DomainBox,
    pub seed: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunHeader {
    pub params: RunParams,
    pub population: [u32; MAX_SCATTERER_TYPES],
}

impl RunHeader {
    pub fn new(params: RunParams, population: [u32; MAX_SCATTERER_TYPES]) -> Self {
        Self { params, population }
    }

    pub fn to_bytes(&self) -> SimResult<Vec<u8>> {
        let params_json = serde_json::to_vec(&self.params)?;
        let fixed = 4 + 4 + 4 * MAX_SCATTERER_TYPES + 4;
        if fixed + params_json.len() > RUN_HEADER_SIZE {
            return Err(SimError::config(format!(
                "Run parameters need {} bytes, header holds {}",
                params_json.len(), RUN_HEADER_SIZE - fixed
            )));
        }

        let mut bytes = Vec::with_capacity(RUN_HEADER_SIZE);
        bytes.extend_from_slice(&IQ_MAGIC);
        bytes.extend_from_slice(&IQ_VERSION.to_le_bytes());
        for count in self.population {
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        bytes.extend_from_slice(&(params_json.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&params_json);
        bytes.resize(RUN_HEADER_SIZE, 0);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> SimResult<Self> {
        if bytes.len() < RUN_HEADER_SIZE {
            return Err(SimError::config("Run header truncated"));
        }
        if bytes[0..4] != IQ_MAGIC {
            return Err(SimError::config("Not an IQ file (bad magic)"));
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        let version = word(4);
        if version != IQ_VERSION {
            return Err(SimError::config(format!("Unsupported IQ version {}", version)));
        }

        let mut population = [0u32; MAX_SCATTERER_TYPES];
        for (k, count) in population.iter_mut().enumerate() {
            *count = word(8 + 4 * k);
        }

        let len_at = 8 + 4 * MAX_SCATTERER_TYPES;
        let params_len = word(len_at) as usize;
        let start = len_at + 4;
        if start + params_len > RUN_HEADER_SIZE {
            return Err(SimError::config("Run parameters overrun the header"));
        }
        let params = serde_json::from_slice(&bytes[start..start + params_len])?;

        Ok(Self { params, population })
    }
}

/// Fixed-size prefix of each pulse record
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PulseHeader {
    pub time: f64,
    pub azimuth: f32,
    pub elevation: f32,
}

impl PulseHeader {
    pub fn to_bytes(&self) -> [u8; PULSE_HEADER_SIZE] {
        let mut bytes = [0u8; PULSE_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.time.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.azimuth.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.elevation.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; PULSE_HEADER_SIZE]) -> Self {
        let mut time = [0u8; 8];
        time.copy_from_slice(&bytes[0..8]);
        let mut azimuth = [0u8; 4];
        azimuth.copy_from_slice(&bytes[8..12]);
        let mut elevation = [0u8; 4];
        elevation.copy_from_slice(&bytes[12..16]);
        Self {
            time: f64::from_le_bytes(time),
            azimuth: f32::from_le_bytes(azimuth),
            elevation: f32::from_le_bytes(elevation),
        }
    }
}

/// Destination for synthesized pulses
pub trait PulseSink {
    fn record(&mut self, pulse: &Pulse) -> SimResult<()>;
}

impl PulseSink for Vec<Pulse> {
    fn record(&mut self, pulse: &Pulse) -> SimResult<()> {
        self.push(pulse.clone());
        Ok(())
    }
}

/// Streams a run header and pulse records to a writer
pub struct IqWriter<W: Write> {
    writer: W,
    gate_count: usize,
    pulses: u64,
}

impl<W: Write> IqWriter<W> {
    pub fn create(mut writer: W, header: &RunHeader) -> SimResult<Self> {
        writer.write_all(&header.to_bytes()?)?;
        Ok(Self {
            writer,
            gate_count: header.params.gates.len(),
            pulses: 0,
        })
    }

    pub fn pulses_written(&self) -> u64 {
        self.pulses
    }

    pub fn finish(mut self) -> SimResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> PulseSink for IqWriter<W> {
    fn record(&mut self, pulse: &Pulse) -> SimResult<()> {
        if pulse.gate_count() != self.gate_count {
            return Err(SimError::config(format!(
                "Pulse has {} gates, run header declares {}",
                pulse.gate_count(), self.gate_count
            )));
        }
        let header = PulseHeader {
            time: pulse.time,
            azimuth: pulse.azimuth,
            elevation: pulse.elevation,
        };
        self.writer.write_all(&header.to_bytes())?;
        for gate in pulse.gates() {
            for v in gate {
                self.writer.write_all(&v.to_le_bytes())?;
            }
        }
        self.pulses += 1;
        Ok(())
    }
}

/// Reads back a recorded run
pub struct IqReader<R: Read> {
    reader: R,
    header: RunHeader,
}

impl<R: Read> IqReader<R> {
    pub fn open(mut reader: R) -> SimResult<Self> {
        let mut bytes = vec![0u8; RUN_HEADER_SIZE];
        reader.read_exact(&mut bytes)?;
        let header = RunHeader::from_bytes(&bytes)?;
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &RunHeader {
        &self.header
    }

    /// Next pulse, or `None` at a clean end of file
    pub fn next_pulse(&mut self) -> SimResult<Option<Pulse>> {
        let mut prefix = [0u8; PULSE_HEADER_SIZE];
        match self.reader.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let header = PulseHeader::from_bytes(&prefix);

        let gate_count = self.header.params.gates.len();
        let mut raw = vec![0u8; gate_count * 16];
        self.reader.read_exact(&mut raw)?;
        let gates = raw
            .chunks_exact(16)
            .map(|chunk| {
                let mut gate = [0f32; 4];
                for (v, b) in gate.iter_mut().zip(chunk.chunks_exact(4)) {
                    *v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
                gate
            })
            .collect();

        Pulse::new(header.time, header.azimuth, header.elevation, gates).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> RunHeader {
        let params = RunParams {
            radar: RadarParams::default(),
            gates: GateSpec::new(10_000.0, 15.0, 3).unwrap(),
            domain: DomainBox::default(),
            seed: 42,
        };
        RunHeader::new(params, [1000, 64, 0, 0, 0, 0, 0, 0])
    }

    #[test]
    fn test_run_header_layout() {
        let bytes = header().to_bytes().unwrap();
        assert_eq!(bytes.len(), RUN_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"RSIQ");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), IQ_VERSION);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 1000);
        assert_eq!(*bytes.last().unwrap(), 0);
        assert_eq!(RunHeader::from_bytes(&bytes).unwrap(), header());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = header().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(RunHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_pulse_records() {
        let mut writer = IqWriter::create(Vec::new(), &header()).unwrap();
        let gates = vec![[1.0, 2.0, 3.0, 4.0], [0.5, 0.0, -0.5, 0.0], [0.0; 4]];
        let pulse = Pulse::new(0.25, -12.0, 3.0, gates).unwrap();
        writer.record(&pulse).unwrap();
        writer.record(&pulse).unwrap();
        assert_eq!(writer.pulses_written(), 2);

        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len(), RUN_HEADER_SIZE + 2 * (PULSE_HEADER_SIZE + 3 * 16));

        let mut reader = IqReader::open(bytes.as_slice()).unwrap();
        assert_eq!(reader.header().population[1], 64);
        assert_eq!(reader.next_pulse().unwrap(), Some(pulse.clone()));
        assert_eq!(reader.next_pulse().unwrap(), Some(pulse));
        assert_eq!(reader.next_pulse().unwrap(), None);
    }

    #[test]
    fn test_gate_count_mismatch() {
        let mut writer = IqWriter::create(Vec::new(), &header()).unwrap();
        let pulse = Pulse::new(0.0, 0.0, 0.0, vec![[0.0; 4]; 5]).unwrap();
        assert!(writer.record(&pulse).is_err());
        assert!(Pulse::new(0.0, 0.0, 0.0, Vec::new()).is_err());
    }
}
