//! Simulation clock driven by the pulse repetition time

/// Simulated time in seconds, advanced one PRT per step
#[derive(Clone, Debug, PartialEq)]
pub struct SimClock {
    /// Current simulation time
    current: f64,
    /// Seconds per step
    prt: f64,
    /// Steps taken since the clock was created
    ticks: u64,
}

impl SimClock {
    pub fn new(prt: f64) -> Self {
        Self { current: 0.0, prt, ticks: 0 }
    }

    /// Current simulation time
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn prt(&self) -> f64 {
        self.prt
    }

    /// Change the step length; time already elapsed is kept
    pub fn set_prt(&mut self, prt: f64) {
        self.prt = prt;
    }

    /// Pulse repetition frequency in Hz
    pub fn prf(&self) -> f64 {
        if self.prt > 0.0 { 1.0 / self.prt } else { 0.0 }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance by one PRT. Returns the time before the step.
    pub fn tick(&mut self) -> f64 {
        let t = self.current;
        self.current += self.prt;
        self.ticks += 1;
        t
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(1.0e-3)
    }
}

/// Preset step lengths
pub mod rates {
    /// Warm-up step: one display frame at 60 Hz
    pub const WARM_UP_PRT: f64 = 1.0 / 60.0;
    /// Default pulse repetition time
    pub const DEFAULT_PRT: f64 = 1.0e-3;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tick_returns_previous_time() {
        let mut clock = SimClock::new(0.5);
        assert_relative_eq!(clock.tick(), 0.0);
        assert_relative_eq!(clock.tick(), 0.5);
        assert_relative_eq!(clock.current(), 1.0);
        clock.set_prt(rates::DEFAULT_PRT);
        clock.tick();
        assert_relative_eq!(clock.current(), 1.001);
        assert_eq!(clock.ticks(), 3);
        assert_relative_eq!(clock.prf(), 1000.0);
    }
}
