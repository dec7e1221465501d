//! Mapping between visual columns (legends, tonics, microbeats) and
//! time-bearing column indices

use std::collections::BTreeSet;

use crate::grid::{RhythmStructure, TonicMarker};

/// Legend columns on each side of the musical area
pub const LEGEND_COLUMNS: usize = 2;
/// Visual columns consumed by one tonic group
pub const TONIC_GROUP_COLUMNS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    LegendLeft,
    LegendRight,
    Tonic,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnEntry {
    pub visual_index: usize,
    pub kind: ColumnKind,
    pub time_index: Option<usize>,
}

/// Classified visual column sequence
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    entries: Vec<ColumnEntry>,
    /// visual index for each time index
    time_to_visual: Vec<usize>,
}

impl ColumnMap {
    pub fn build(rhythm: &RhythmStructure, tonic_markers: &[TonicMarker]) -> Self {
        let mut sorted: Vec<&TonicMarker> = tonic_markers.iter().collect();
        // None (before first macrobeat) sorts first
        sorted.sort_by_key(|t| t.pre_macrobeat.map_or(0, |m| m + 1));

        let mut map = Self::default();
        let mut cursor = 0;

        for _ in 0..LEGEND_COLUMNS {
            map.push(ColumnKind::LegendLeft);
        }
        map.push_tonics_for(None, &sorted, &mut cursor);

        for (mb_idx, &beats) in rhythm.macrobeat_groupings.iter().enumerate() {
            for _ in 0..beats {
                map.push(ColumnKind::Time);
            }
            map.push_tonics_for(Some(mb_idx), &sorted, &mut cursor);
        }

        for _ in 0..LEGEND_COLUMNS {
            map.push(ColumnKind::LegendRight);
        }

        map
    }

    fn push(&mut self, kind: ColumnKind) {
        let visual_index = self.entries.len();
        let time_index = if kind == ColumnKind::Time {
            self.time_to_visual.push(visual_index);
            Some(self.time_to_visual.len() - 1)
        } else {
            None
        };
        self.entries.push(ColumnEntry {
            visual_index,
            kind,
            time_index,
        });
    }

    fn push_tonics_for(&mut self, pre_macrobeat: Option<usize>, sorted: &[&TonicMarker], cursor: &mut usize) {
        while let Some(tonic) = sorted.get(*cursor) {
            if tonic.pre_macrobeat != pre_macrobeat {
                break;
            }

            for _ in 0..TONIC_GROUP_COLUMNS {
                self.push(ColumnKind::Tonic);
            }

            // consume the whole group so it is not emitted twice
            match tonic.group {
                Some(group) => {
                    *cursor += 1;
                    while sorted.get(*cursor).is_some_and(|t| t.group == Some(group)) {
                        *cursor += 1;
                    }
                }
                None => *cursor += 1,
            }
        }
    }

    pub fn entries(&self) -> &[ColumnEntry] {
        &self.entries
    }

    pub fn total_time_columns(&self) -> usize {
        self.time_to_visual.len()
    }

    pub fn visual_to_time(&self, visual_index: usize) -> Option<usize> {
        self.entries.get(visual_index)?.time_index
    }

    pub fn time_to_visual(&self, time_index: usize) -> Option<usize> {
        self.time_to_visual.get(time_index).copied()
    }

    /// Visual index of a canvas (musical-area) column
    pub fn canvas_to_visual(&self, canvas_index: usize) -> Option<usize> {
        let visual = canvas_index + LEGEND_COLUMNS;
        match self.entries.get(visual)?.kind {
            ColumnKind::Time | ColumnKind::Tonic => Some(visual),
            _ => None,
        }
    }

    /// Number of time columns up to and including macrobeat `macrobeat_index`
    pub fn time_boundary_after_macrobeat(rhythm: &RhythmStructure, macrobeat_index: usize) -> usize {
        rhythm
            .macrobeat_groupings
            .iter()
            .take(macrobeat_index + 1)
            .map(|&g| g as usize)
            .sum()
    }
}

/// Canvas column range `[start, end)` of one macrobeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacrobeatSpan {
    pub start: usize,
    pub end: usize,
}

/// Resolve every macrobeat to its canvas columns, stepping over tonic columns
pub fn macrobeat_spans(groupings: &[u32], tonic_columns: &BTreeSet<usize>) -> Vec<MacrobeatSpan> {
    let mut spans = Vec::with_capacity(groupings.len());
    let mut column = 0;

    for &beats in groupings {
        while tonic_columns.contains(&column) {
            column += 1;
        }
        let start = column;
        let mut remaining = beats;
        while remaining > 0 {
            if !tonic_columns.contains(&column) {
                remaining -= 1;
            }
            column += 1;
        }
        spans.push(MacrobeatSpan { start, end: column });
    }

    spans
}
