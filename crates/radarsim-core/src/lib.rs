//! Core types for the radar scatterer simulator
//!
//! Domain geometry, lookup tables and their provider contract, scatterer
//! records, radar parameters, the scan sequencer and the IQ record layout.
//! Nothing here touches an accelerator.

pub mod constants;
pub mod coordinates;
pub mod domain_box;
pub mod error;
pub mod iq;
pub mod params;
pub mod scan;
pub mod scatterer;
pub mod table;

#[cfg(test)]
mod tests;

pub use coordinates::{RadarPosition, unit_vector, wrap_degrees, angle_between};
pub use domain_box::DomainBox;
pub use error::{SimError, SimResult};
pub use iq::{IqReader, IqWriter, Pulse, PulseHeader, PulseSink, RunHeader, RunParams};
pub use params::{GateSpec, RadarParams};
pub use scan::{ScanMode, ScanPattern, ScanPosition};
pub use scatterer::{Scatterer, ScattererType};
pub use table::{RangeWeightTable, Table, TableId, TableProvider, TableSet};
