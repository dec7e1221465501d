//! Absolute start time of every canvas column at the current tempo

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Result, TonegridError};

/// Seconds per microbeat (two microbeats per beat)
pub fn microbeat_duration(tempo: f64) -> f64 {
    60.0 / (tempo * 2.0)
}

/// Column start times in seconds; `starts[len]` is the total duration
#[derive(Debug, Clone, PartialEq)]
pub struct TimeMap {
    starts: Vec<f64>,
    tonic_columns: BTreeSet<usize>,
    microbeat: f64,
    tempo: f64,
}

impl TimeMap {
    pub fn build(column_widths: &[u32], tempo: f64, tonic_columns: &BTreeSet<usize>) -> Result<Self> {
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(TonegridError::InvalidTempo(tempo));
        }

        let microbeat = microbeat_duration(tempo);
        let mut starts = Vec::with_capacity(column_widths.len() + 1);
        let mut running = 0.0;

        for (i, &width) in column_widths.iter().enumerate() {
            starts.push(running);
            if !tonic_columns.contains(&i) {
                running += width as f64 * microbeat;
            }
        }
        starts.push(running);

        debug!(
            columns = column_widths.len(),
            tonic_columns = tonic_columns.len(),
            tempo,
            total_secs = running,
            "Built time map"
        );

        Ok(Self {
            starts,
            tonic_columns: tonic_columns.clone(),
            microbeat,
            tempo,
        })
    }

    pub fn starts(&self) -> &[f64] {
        &self.starts
    }

    /// Start time of `column`; `column == column_count()` gives the end time
    pub fn time_at(&self, column: usize) -> Option<f64> {
        self.starts.get(column).copied()
    }

    pub fn column_count(&self) -> usize {
        self.starts.len() - 1
    }

    pub fn total_duration(&self) -> f64 {
        self.starts.last().copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.total_duration() <= 0.0
    }

    pub fn is_tonic(&self, column: usize) -> bool {
        self.tonic_columns.contains(&column)
    }

    pub fn microbeat(&self) -> f64 {
        self.microbeat
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Column containing `time` and the fraction of the way through it.
    ///
    /// Zero-duration columns never contain a time, so a tonic column is
    /// never returned.
    pub fn locate(&self, time: f64) -> Option<(usize, f64)> {
        // first index whose start is > time
        let upper = self.starts.partition_point(|&s| s <= time);
        if upper == 0 || upper >= self.starts.len() {
            return None;
        }
        let column = upper - 1;
        let start = self.starts[column];
        let duration = self.starts[upper] - start;
        let fraction = if duration > 0.0 { (time - start) / duration } else { 0.0 };
        Some((column, fraction))
    }

    /// Canvas column whose span contains `time`, for mapping a time offset
    /// back onto the grid
    pub fn column_for_time(&self, time: f64) -> Option<usize> {
        self.locate(time).map(|(column, _)| column)
    }
}
