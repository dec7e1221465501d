//! Loop region derived from the timeline

use crate::columns::MacrobeatSpan;
use crate::grid::{BoundaryStyle, RhythmStructure};
use crate::modulation::ModulationAdjuster;
use crate::time_map::TimeMap;

/// Shortest loop allowed regardless of tempo
pub const DEFAULT_MIN_LOOP_DURATION: f64 = 1e-3;

/// Playback loop region in seconds; always `end > start`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopBounds {
    pub start: f64,
    pub end: f64,
}

impl LoopBounds {
    pub fn new(start: f64, end: f64, floor: f64) -> Self {
        let start = if start.is_finite() { start } else { 0.0 };
        let end = if end.is_finite() && end > start { end } else { start + floor };
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Adjusted bounds for the whole timeline, starting after any pickup
    pub fn from_timeline(
        rhythm: &RhythmStructure,
        spans: &[MacrobeatSpan],
        time_map: &TimeMap,
        adjuster: &ModulationAdjuster,
        min_loop_duration: f64,
    ) -> Self {
        let start = match anacrusis_start_column(rhythm, spans) {
            Some(column) => {
                let base = time_map.time_at(column).unwrap_or(0.0);
                adjuster.schedule_time_for(base, column)
            }
            None => 0.0,
        };
        let floor = time_map.microbeat().max(min_loop_duration);
        Self::new(start, adjuster.adjusted_total(), floor)
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Canvas column where the first full measure begins after a pickup
pub fn anacrusis_start_column(rhythm: &RhythmStructure, spans: &[MacrobeatSpan]) -> Option<usize> {
    if !rhythm.has_anacrusis {
        return None;
    }
    let solid = rhythm
        .boundary_styles
        .iter()
        .position(|&s| s == BoundaryStyle::Solid)?;
    spans.get(solid + 1).map(|s| s.start)
}

/// Unmodulated start time of the first full measure, or 0 without a pickup
pub fn anacrusis_start(rhythm: &RhythmStructure, spans: &[MacrobeatSpan], time_map: &TimeMap) -> f64 {
    anacrusis_start_column(rhythm, spans)
        .and_then(|c| time_map.time_at(c))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::columns::macrobeat_spans;
    use crate::grid::ModulationMarker;

    fn pickup_rhythm() -> RhythmStructure {
        RhythmStructure::new(vec![2, 2, 2, 2]).with_boundaries(
            vec![BoundaryStyle::Anacrusis, BoundaryStyle::Solid, BoundaryStyle::Dashed],
            true,
        )
    }

    #[test]
    fn test_floor_applies() {
        let b = LoopBounds::new(1.0, 1.0, 0.25);
        assert_eq!(b.end, 1.25);
        let b = LoopBounds::new(f64::NAN, f64::INFINITY, 0.5);
        assert_eq!(b, LoopBounds { start: 0.0, end: 0.5 });
        assert!(LoopBounds::new(0.0, 2.0, 0.5).duration() > 0.0);
    }

    #[test]
    fn test_no_anacrusis_starts_at_zero() {
        let rhythm = RhythmStructure::new(vec![2, 2]);
        let map = TimeMap::build(&[1; 4], 120.0, &BTreeSet::new()).unwrap();
        let spans = macrobeat_spans(&rhythm.macrobeat_groupings, &BTreeSet::new());
        assert_eq!(anacrusis_start(&rhythm, &spans, &map), 0.0);
    }

    #[test]
    fn test_anacrusis_skips_pickup() {
        let rhythm = pickup_rhythm();
        let map = TimeMap::build(&[1; 8], 120.0, &BTreeSet::new()).unwrap();
        let spans = macrobeat_spans(&rhythm.macrobeat_groupings, &BTreeSet::new());
        // solid boundary after macrobeat 1, so the loop starts at column 4
        assert_eq!(anacrusis_start_column(&rhythm, &spans), Some(4));
        assert_eq!(anacrusis_start(&rhythm, &spans, &map), 1.0);

        let bounds = LoopBounds::from_timeline(&rhythm, &spans, &map, &ModulationAdjuster::new(&map, &[], &spans), 1e-3);
        assert_eq!(bounds, LoopBounds { start: 1.0, end: 2.0 });
    }

    #[test]
    fn test_anacrusis_without_solid_boundary() {
        let rhythm = RhythmStructure::new(vec![2, 2]).with_boundaries(vec![BoundaryStyle::Anacrusis], true);
        let map = TimeMap::build(&[1; 4], 120.0, &BTreeSet::new()).unwrap();
        let spans = macrobeat_spans(&rhythm.macrobeat_groupings, &BTreeSet::new());
        assert_eq!(anacrusis_start(&rhythm, &spans, &map), 0.0);
    }

    #[test]
    fn test_bounds_follow_modulation() {
        let rhythm = RhythmStructure::new(vec![2, 2]);
        let map = TimeMap::build(&[1; 4], 120.0, &BTreeSet::new()).unwrap();
        let spans = macrobeat_spans(&rhythm.macrobeat_groupings, &BTreeSet::new());
        let marker = ModulationMarker::new("m", 0, 2.0).unwrap();
        let adjuster = ModulationAdjuster::new(&map, &[marker], &spans);
        let bounds = LoopBounds::from_timeline(&rhythm, &spans, &map, &adjuster, 1e-3);
        assert_eq!(bounds.start, 0.0);
        assert_eq!(bounds.end, 1.5);
    }

    #[test]
    fn test_empty_timeline_gets_floor() {
        let rhythm = RhythmStructure::new(vec![]);
        let map = TimeMap::build(&[], 120.0, &BTreeSet::new()).unwrap();
        let bounds = LoopBounds::from_timeline(&rhythm, &[], &map, &ModulationAdjuster::new(&map, &[], &[]), 1e-3);
        assert_eq!(bounds, LoopBounds { start: 0.0, end: 0.25 });
    }
}
