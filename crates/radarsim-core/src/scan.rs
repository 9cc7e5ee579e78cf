//! Beam-pointing scan sequencer
//!
//! Pattern grammar: `<mode>[':' az,el,count ('/' az,el,count)*]`, where the
//! mode character is `P`/`p` (PPI), `R`/`r` (RHI) or `D`/`d` (dwell beam
//! steering, colon required). The sequence is infinite: after the last
//! repetition of the last entry it starts over at the first entry.

use crate::constants::MAX_SCAN_POSITIONS;
use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Plan position indicator: sweep in azimuth
    Ppi,
    /// Range height indicator: sweep in elevation
    Rhi,
    /// Dwell beam steering: hold each position for a number of pulses
    Dwell,
}

impl ScanMode {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'P' | 'p' => Some(ScanMode::Ppi),
            'R' | 'r' => Some(ScanMode::Rhi),
            'D' | 'd' => Some(ScanMode::Dwell),
            _ => None,
        }
    }
}

/// One pointing target held for `count` pulses
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanPosition {
    pub azimuth: f32,
    pub elevation: f32,
    pub count: u32,
    /// Repetitions already emitted, always in `0..count`
    pub index: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanPattern {
    mode: Option<ScanMode>,
    positions: Vec<ScanPosition>,
    index: usize,
}

impl ScanPattern {
    /// Pattern that never produces a pointing; the beam stays where it is
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> SimResult<Self> {
        let text = text.trim();
        let mut chars = text.chars();
        let mode_char = chars.next()
            .ok_or_else(|| SimError::Parse("empty scan pattern".into()))?;
        let mode = ScanMode::from_char(mode_char)
            .ok_or_else(|| SimError::Parse(format!("unknown scan mode '{}'", mode_char)))?;

        let rest = chars.as_str();
        let list = match rest.strip_prefix(':') {
            Some(list) => list,
            None if rest.is_empty() && mode != ScanMode::Dwell => "",
            None => {
                return Err(SimError::Parse(format!(
                    "expected ':' after scan mode '{}'", mode_char
                )))
            }
        };

        let mut positions = Vec::new();
        for token in list.split('/').map(str::trim).filter(|t| !t.is_empty()) {
            if positions.len() == MAX_SCAN_POSITIONS {
                return Err(SimError::Parse(format!(
                    "more than {} scan positions", MAX_SCAN_POSITIONS
                )));
            }
            positions.push(parse_position(token)?);
        }

        if mode == ScanMode::Dwell && positions.is_empty() {
            return Err(SimError::Parse("dwell pattern has no positions".into()));
        }

        tracing::debug!("Parsed {:?} scan pattern with {} positions", mode, positions.len());
        Ok(Self { mode: Some(mode), positions, index: 0 })
    }

    /// Parse, degrading to the empty pattern with a warning on malformed input
    pub fn parse_or_empty(text: &str) -> Self {
        match Self::parse(text) {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::warn!("Ignoring scan pattern '{}': {}", text, e);
                Self::empty()
            }
        }
    }

    pub fn mode(&self) -> Option<ScanMode> {
        self.mode
    }

    pub fn positions(&self) -> &[ScanPosition] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Pulses in one full cycle of the pattern
    pub fn total_repeats(&self) -> u64 {
        self.positions.iter().map(|p| p.count as u64).sum()
    }

    /// (entry, repetition) cursors
    pub fn cursor(&self) -> (usize, u32) {
        match self.positions.get(self.index) {
            Some(p) => (self.index, p.index),
            None => (0, 0),
        }
    }

    /// Rewind both cursors to the first repetition of the first entry
    pub fn reset(&mut self) {
        self.index = 0;
        for p in &mut self.positions {
            p.index = 0;
        }
    }

    /// Angles of the current entry, then advance the cursors
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(f32, f32)> {
        let count = self.positions.len();
        let position = self.positions.get_mut(self.index)?;
        let angles = (position.azimuth, position.elevation);

        position.index += 1;
        if position.index >= position.count {
            position.index = 0;
            self.index = (self.index + 1) % count;
        }
        Some(angles)
    }
}

impl FromStr for ScanPattern {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        Self::parse(s)
    }
}

fn parse_position(token: &str) -> SimResult<ScanPosition> {
    let fields: Vec<&str> = token.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(SimError::Parse(format!(
            "expected az,el,count but got '{}'", token
        )));
    }
    let number = |s: &str| -> SimResult<f32> {
        s.parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| SimError::Parse(format!("invalid number '{}' in '{}'", s, token)))
    };
    let azimuth = number(fields[0])?;
    let elevation = number(fields[1])?;
    let count = number(fields[2])?;
    if count < 1.0 || count.fract() != 0.0 || count > u32::MAX as f32 {
        return Err(SimError::Parse(format!(
            "repeat count must be a positive integer in '{}'", token
        )));
    }
    Ok(ScanPosition { azimuth, elevation, count: count as u32, index: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dwell() {
        let pattern = ScanPattern::parse("D:0,3,5/10,3,5/20,3,10").unwrap();
        assert_eq!(pattern.mode(), Some(ScanMode::Dwell));
        let counts: Vec<u32> = pattern.positions().iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![5, 5, 10]);
        assert_eq!(pattern.total_repeats(), 20);
    }

    #[test]
    fn test_dwell_visit_order() {
        let mut pattern = ScanPattern::parse("D:0,3,5/10,3,5/20,3,10").unwrap();
        let azimuths: Vec<f32> = (0..20).map(|_| pattern.next().unwrap().0).collect();
        assert!(azimuths[..5].iter().all(|&a| a == 0.0));
        assert!(azimuths[5..10].iter().all(|&a| a == 10.0));
        assert!(azimuths[10..].iter().all(|&a| a == 20.0));
        // Cycle restarts at the first entry
        assert_eq!(pattern.next(), Some((0.0, 3.0)));
    }

    #[test]
    fn test_cycle_returns_to_start() {
        for text in ["d:1,2,1", "D:5,1,3/6,2,1", "p:0,0.5,2/90,0.5,4/180,0.5,1", "R:45,10,7"] {
            let mut pattern = ScanPattern::parse(text).unwrap();
            let n = pattern.total_repeats() as usize;
            let first = pattern.next();
            for _ in 1..n {
                pattern.next();
            }
            assert_eq!(pattern.cursor(), (0, 0), "{}", text);
            assert_eq!(pattern.next(), first, "{}", text);
        }
    }

    #[test]
    fn test_cursor_bounds() {
        let mut pattern = ScanPattern::parse("D:0,1,2/1,1,3").unwrap();
        for _ in 0..50 {
            let (entry, rep) = pattern.cursor();
            assert!(entry < pattern.len());
            assert!(rep < pattern.positions()[entry].count);
            pattern.next();
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(ScanPattern::parse("X:0,1,1"), Err(SimError::Parse(_))));
        assert!(matches!(ScanPattern::parse("D0,1,1"), Err(SimError::Parse(_))));
        assert!(matches!(ScanPattern::parse("D:0,1"), Err(SimError::Parse(_))));
        assert!(matches!(ScanPattern::parse("D:a,1,1"), Err(SimError::Parse(_))));
        assert!(matches!(ScanPattern::parse("D:0,1,0"), Err(SimError::Parse(_))));
        assert!(matches!(ScanPattern::parse("D:"), Err(SimError::Parse(_))));
        assert!(matches!(ScanPattern::parse(""), Err(SimError::Parse(_))));

        let too_many = format!("D:{}", vec!["0,1,1"; MAX_SCAN_POSITIONS + 1].join("/"));
        assert!(ScanPattern::parse(&too_many).is_err());
    }

    #[test]
    fn test_empty_pattern_is_noop() {
        let mut pattern = ScanPattern::parse_or_empty("Q:1,2,3");
        assert!(pattern.is_empty());
        assert_eq!(pattern.mode(), None);
        assert_eq!(pattern.next(), None);

        // Mode without positions is valid but never moves the beam
        let mut ppi = ScanPattern::parse("P").unwrap();
        assert_eq!(ppi.mode(), Some(ScanMode::Ppi));
        assert_eq!(ppi.next(), None);
    }
}
