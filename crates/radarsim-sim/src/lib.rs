//! Scatterer simulation
//!
//! A [`Session`] owns a populated [`DomainState`], advances it one pulse
//! repetition time per pulse with the [`TimeStepper`], selects what the beam
//! illuminates and hands the resulting arrays to a pulse synthesizer.

pub mod clock;
pub mod illumination;
pub mod population;
pub mod session;
pub mod stepper;
pub mod validation;

pub use clock::{rates, SimClock};
pub use illumination::{antenna_weight, illumination_box, IlluminationFrame};
pub use population::{populate, DomainState, PopulationConfig};
pub use session::{AzimuthSweep, Pointing, Session, SessionConfig};
pub use stepper::{ReinjectionPolicy, TimeStepper};
pub use validation::{compare_pulses, peak_magnitude, DivergenceReport, GateDivergence, Tolerance};
