//! Derived timing data for one grid snapshot

use std::collections::BTreeSet;

use tracing::debug;

use crate::columns::{macrobeat_spans, MacrobeatSpan};
use crate::error::Result;
use crate::grid::Grid;
use crate::loop_bounds::LoopBounds;
use crate::modulation::ModulationAdjuster;
use crate::time_map::TimeMap;

/// Time map, macrobeat spans, modulation and loop region, rebuilt together
/// whenever widths, tempo or tonic placement change
#[derive(Debug, Clone)]
pub struct Timeline {
    pub time_map: TimeMap,
    pub spans: Vec<MacrobeatSpan>,
    pub adjuster: ModulationAdjuster,
    pub loop_bounds: LoopBounds,
    tonic_columns: BTreeSet<usize>,
}

impl Timeline {
    pub fn build(grid: &Grid, min_loop_duration: f64) -> Result<Self> {
        let tonic_columns = grid.tonic_columns();
        let time_map = TimeMap::build(&grid.column_widths, grid.tempo, &tonic_columns)?;
        let spans = macrobeat_spans(&grid.rhythm.macrobeat_groupings, &tonic_columns);
        let adjuster = ModulationAdjuster::new(&time_map, &grid.modulation_markers, &spans);
        let loop_bounds = LoopBounds::from_timeline(&grid.rhythm, &spans, &time_map, &adjuster, min_loop_duration);

        debug!(
            tempo = grid.tempo,
            total_secs = adjuster.adjusted_total(),
            loop_start = loop_bounds.start,
            loop_end = loop_bounds.end,
            "Rebuilt timeline"
        );

        Ok(Self {
            time_map,
            spans,
            adjuster,
            loop_bounds,
            tonic_columns,
        })
    }

    pub fn tonic_columns(&self) -> &BTreeSet<usize> {
        &self.tonic_columns
    }

    /// Modulated playing length of the grid
    pub fn duration_secs(&self) -> f64 {
        self.adjuster.adjusted_total()
    }

    /// Schedule seconds back to base (unmodulated) seconds, for placing
    /// the playhead on the time map
    pub fn to_base(&self, adjusted: f64) -> f64 {
        self.adjuster.base_time_for(adjusted)
    }
}
