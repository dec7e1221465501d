//! Schedule-time remapping for tempo modulation markers

use tracing::warn;

use crate::columns::MacrobeatSpan;
use crate::grid::ModulationMarker;
use crate::time_map::TimeMap;

/// An active marker resolved onto the canvas
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModulation {
    pub marker_id: String,
    pub measure_index: usize,
    pub ratio: f64,
    /// First canvas column after the boundary; it and everything later is
    /// rescaled
    pub boundary_column: usize,
    /// Unmodulated time of the boundary
    pub boundary_time: f64,
    pub x_position: Option<f64>,
}

/// Maps unmodulated column times to the times they are actually played at
#[derive(Debug, Clone)]
pub struct ModulationAdjuster {
    resolved: Vec<ResolvedModulation>,
    total: f64,
}

impl ModulationAdjuster {
    pub fn new(time_map: &TimeMap, markers: &[ModulationMarker], spans: &[MacrobeatSpan]) -> Self {
        let mut active: Vec<&ModulationMarker> = markers
            .iter()
            .filter(|m| m.active && m.ratio.is_finite() && m.ratio > 0.0)
            .collect();
        active.sort_by_key(|m| m.measure_index);

        let mut resolved = Vec::with_capacity(active.len());
        for marker in active {
            let Some(span) = spans.get(marker.measure_index) else {
                warn!(marker = %marker.id, measure = marker.measure_index, "Modulation marker measure not found, ignoring");
                continue;
            };
            let Some(boundary_time) = time_map.time_at(span.end) else {
                warn!(marker = %marker.id, column = span.end, "Modulation boundary outside time map, ignoring");
                continue;
            };
            resolved.push(ResolvedModulation {
                marker_id: marker.id.clone(),
                measure_index: marker.measure_index,
                ratio: marker.ratio,
                boundary_column: span.end,
                boundary_time,
                x_position: marker.x_position,
            });
        }

        let mut adjuster = Self { resolved, total: 0.0 };
        adjuster.total = adjuster.schedule_time_for(time_map.total_duration(), time_map.column_count());
        adjuster
    }

    pub fn resolved(&self) -> &[ResolvedModulation] {
        &self.resolved
    }

    pub fn is_identity(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Actual schedule time for `base_time`, which lies at canvas `column`.
    ///
    /// Each marker rescales the remainder past its own boundary, measured on
    /// the timeline already adjusted by the markers before it.
    pub fn schedule_time_for(&self, base_time: f64, column: usize) -> f64 {
        let mut adjusted = base_time;
        // adjusted position of the previous boundary, for composing markers
        let mut prev_base = 0.0;
        let mut prev_adjusted = 0.0;
        let mut scale = 1.0;

        for m in &self.resolved {
            if column < m.boundary_column {
                break;
            }
            let boundary_adjusted = prev_adjusted + (m.boundary_time - prev_base) * scale;
            scale *= m.ratio;
            adjusted = boundary_adjusted + (base_time - m.boundary_time) * scale;
            prev_base = m.boundary_time;
            prev_adjusted = boundary_adjusted;
        }

        adjusted
    }

    /// Schedule time for a base time anywhere on the grid, not just on a
    /// column start
    pub fn adjust_time(&self, time_map: &TimeMap, base_time: f64) -> f64 {
        let column = time_map
            .column_for_time(base_time)
            .unwrap_or(time_map.column_count());
        self.schedule_time_for(base_time, column)
    }

    /// Inverse of `schedule_time_for`
    pub fn base_time_for(&self, adjusted_time: f64) -> f64 {
        let mut base = adjusted_time;
        let mut prev_base = 0.0;
        let mut prev_adjusted = 0.0;
        let mut scale = 1.0;

        for m in &self.resolved {
            let boundary_adjusted = prev_adjusted + (m.boundary_time - prev_base) * scale;
            if adjusted_time < boundary_adjusted {
                break;
            }
            scale *= m.ratio;
            base = m.boundary_time + (adjusted_time - boundary_adjusted) / scale;
            prev_base = m.boundary_time;
            prev_adjusted = boundary_adjusted;
        }

        base
    }

    /// Modulation-adjusted end of the grid
    pub fn adjusted_total(&self) -> f64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::columns::macrobeat_spans;
    use crate::grid::EXPANSION_3_2;

    fn uniform(columns: usize) -> TimeMap {
        TimeMap::build(&vec![1; columns], 120.0, &BTreeSet::new()).unwrap()
    }

    #[test]
    fn test_no_markers_is_identity() {
        let map = uniform(4);
        let adj = ModulationAdjuster::new(&map, &[], &macrobeat_spans(&[2, 2], &BTreeSet::new()));
        assert!(adj.is_identity());
        assert_eq!(adj.schedule_time_for(0.75, 3), 0.75);
        assert_eq!(adj.adjusted_total(), 1.0);
    }

    #[test]
    fn test_single_marker_total() {
        let map = uniform(4);
        let spans = macrobeat_spans(&[2, 2], &BTreeSet::new());
        let marker = ModulationMarker::new("m", 0, 2.0).unwrap();
        let adj = ModulationAdjuster::new(&map, &[marker], &spans);
        assert_eq!(adj.resolved()[0].boundary_column, 2);
        assert_eq!(adj.adjusted_total(), 1.5);
    }

    #[test]
    fn test_deltas_scale_after_boundary_only() {
        let map = uniform(8);
        let spans = macrobeat_spans(&[2, 2, 2, 2], &BTreeSet::new());
        let marker = ModulationMarker::new("m", 1, 1.5).unwrap();
        let adj = ModulationAdjuster::new(&map, &[marker], &spans);
        let b = 4;

        for c in 0..=b {
            let base = map.time_at(c).unwrap();
            assert_eq!(adj.schedule_time_for(base, c), base);
        }
        for a in (b + 1)..=8 {
            for c in (a + 1)..=8 {
                let base_a = map.time_at(a).unwrap();
                let base_c = map.time_at(c).unwrap();
                let adjusted_delta = adj.schedule_time_for(base_c, c) - adj.schedule_time_for(base_a, a);
                assert!((adjusted_delta - 1.5 * (base_c - base_a)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_markers_compose_and_stay_monotonic() {
        let map = uniform(12);
        let spans = macrobeat_spans(&[2; 6], &BTreeSet::new());
        let markers = vec![
            ModulationMarker::new("a", 0, 0.5).unwrap(),
            ModulationMarker::new("b", 2, 0.5).unwrap(),
            ModulationMarker::new("c", 4, 0.5).unwrap(),
        ];
        let adj = ModulationAdjuster::new(&map, &markers, &spans);
        let mut last = -1.0;
        for c in 0..=12 {
            let t = adj.schedule_time_for(map.time_at(c).unwrap(), c);
            assert!(t > last, "column {} went backwards", c);
            last = t;
        }
        // 0.5 + 1.0*0.5 + 1.0*0.25 + 0.5*0.125
        assert!((adj.adjusted_total() - 1.3125).abs() < 1e-12);
    }

    #[test]
    fn test_base_time_inverts_schedule_time() {
        let map = uniform(12);
        let spans = macrobeat_spans(&[2; 6], &BTreeSet::new());
        let markers = vec![
            ModulationMarker::new("a", 1, EXPANSION_3_2).unwrap(),
            ModulationMarker::new("b", 3, 0.5).unwrap(),
        ];
        let adj = ModulationAdjuster::new(&map, &markers, &spans);
        for i in 0..=120 {
            let base = i as f64 * 0.025;
            let adjusted = adj.adjust_time(&map, base);
            assert!((adj.base_time_for(adjusted) - base).abs() < 1e-9, "base {}", base);
        }
        assert!((adj.base_time_for(adj.adjusted_total()) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_inactive_and_unresolvable_markers_ignored() {
        let map = uniform(4);
        let spans = macrobeat_spans(&[2, 2], &BTreeSet::new());
        let mut inactive = ModulationMarker::new("off", 0, 2.0).unwrap();
        inactive.active = false;
        let missing = ModulationMarker::new("missing", 9, 2.0).unwrap();
        let adj = ModulationAdjuster::new(&map, &[inactive, missing], &spans);
        assert!(adj.is_identity());
        assert_eq!(adj.adjusted_total(), 1.0);
    }
}
