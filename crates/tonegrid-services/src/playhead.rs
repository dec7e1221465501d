//! Per-frame playhead task: position, tonic skipping and the tempo heard
//! under modulation
//!
//! Frames only read the clock. Skipping or throttling them never changes
//! when audio is dispatched.

use tonegrid_core::{ColumnMap, Timeline, TransportState};
use tracing::{debug, info};

use crate::clock::TransportClock;
use crate::config::PlayheadConfig;
use crate::layout::ColumnLayout;
use crate::sound::PlayheadSurface;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub x: f64,
    /// Tempo heard at the playhead, nominal tempo scaled by passed markers
    pub bpm: f64,
    pub canvas_column: usize,
    pub visual_column: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Drew a frame; keep the task running
    Continue(FrameInfo),
    /// Paused or stopped; position is frozen
    Idle,
    /// Non-looping playback hit the end; the engine should stop
    ReachedEnd,
    /// Renderer is disarmed
    Halted,
}

/// Everything one frame reads or drives
pub struct PlayheadFrame<'a> {
    pub state: TransportState,
    pub looping: bool,
    pub clock: &'a TransportClock,
    pub timeline: &'a Timeline,
    pub columns: &'a ColumnMap,
    pub layout: &'a dyn ColumnLayout,
    pub surface: &'a mut dyn PlayheadSurface,
}

#[derive(Debug)]
pub struct PlayheadRenderer {
    config: PlayheadConfig,
    should_continue: bool,
    last_multiplier: f64,
    last_frame: Option<FrameInfo>,
}

impl PlayheadRenderer {
    pub fn new(config: PlayheadConfig) -> Self {
        Self {
            config,
            should_continue: false,
            last_multiplier: 1.0,
            last_frame: None,
        }
    }

    pub fn arm(&mut self) {
        self.should_continue = true;
    }

    /// Stop the task and forget the tempo it applied
    pub fn disarm(&mut self) {
        self.should_continue = false;
        self.last_multiplier = 1.0;
        self.last_frame = None;
    }

    pub fn is_armed(&self) -> bool {
        self.should_continue
    }

    pub fn last_frame(&self) -> Option<FrameInfo> {
        self.last_frame
    }

    /// Multiplier from the markers the playhead has passed
    pub fn tempo_multiplier(&self) -> f64 {
        self.last_multiplier
    }

    /// Forget the applied multiplier after the nominal tempo changed
    pub fn reset_tempo(&mut self) {
        self.last_multiplier = 1.0;
    }

    pub fn render(&mut self, frame: PlayheadFrame<'_>) -> FrameOutcome {
        if !self.should_continue {
            return FrameOutcome::Halted;
        }
        if frame.state != TransportState::Started {
            return FrameOutcome::Idle;
        }

        let bounds = frame.timeline.loop_bounds;
        let mut secs = frame.clock.seconds();

        if !frame.looping && secs >= bounds.end - self.config.end_tolerance {
            info!(secs, end = bounds.end, "Playback reached end");
            return FrameOutcome::ReachedEnd;
        }

        if frame.looping && secs >= bounds.end {
            secs = bounds.start + (secs - bounds.start) % bounds.duration();
        }

        let time_map = &frame.timeline.time_map;
        let base = frame.timeline.to_base(secs);
        let (column, fraction) = match time_map.locate(base) {
            Some(found) => found,
            None if base > 0.0 && time_map.column_count() > 0 => (time_map.column_count() - 1, 1.0),
            None => (0, 0.0),
        };

        // zero-width columns never come back from locate, so the line jumps
        // straight past tonic columns
        let col_x = frame.layout.column_start_x(column).unwrap_or(0.0);
        let col_width = frame.layout.column_width(column).unwrap_or(0.0);
        let x = (col_x + fraction * col_width).clamp(0.0, frame.layout.musical_width());

        self.update_multiplier(x, frame.timeline, frame.layout);

        frame.surface.clear();
        frame.surface.draw_playhead(x);

        let info = FrameInfo {
            x,
            bpm: frame.clock.bpm() * self.last_multiplier,
            canvas_column: column,
            visual_column: frame.columns.canvas_to_visual(column),
        };
        self.last_frame = Some(info);
        FrameOutcome::Continue(info)
    }

    fn update_multiplier(&mut self, x: f64, timeline: &Timeline, layout: &dyn ColumnLayout) {
        let mut markers: Vec<(f64, f64)> = timeline
            .adjuster
            .resolved()
            .iter()
            .map(|m| {
                let marker_x = m
                    .x_position
                    .or_else(|| layout.column_start_x(m.boundary_column))
                    .unwrap_or_else(|| layout.musical_width());
                (marker_x, m.ratio)
            })
            .collect();
        markers.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut multiplier: f64 = markers
            .iter()
            .take_while(|(marker_x, _)| x + self.config.marker_pass_epsilon_px >= *marker_x)
            .map(|(_, ratio)| 1.0 / ratio)
            .product();
        if !multiplier.is_finite() || multiplier <= 0.0 {
            multiplier = 1.0;
        }

        if (multiplier - self.last_multiplier).abs() > self.config.tempo_epsilon {
            self.last_multiplier = multiplier;
            debug!(multiplier, x, "Tempo multiplier updated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ColumnPositions;
    use tonegrid_core::{Grid, ModulationMarker, RhythmStructure, TonicMarker};

    #[derive(Default)]
    struct RecordingSurface {
        clears: usize,
        lines: Vec<f64>,
    }

    impl PlayheadSurface for RecordingSurface {
        fn clear(&mut self) {
            self.clears += 1;
        }

        fn draw_playhead(&mut self, x: f64) {
            self.lines.push(x);
        }
    }

    struct Fixture {
        grid: Grid,
        timeline: Timeline,
        columns: ColumnMap,
        layout: ColumnPositions,
        clock: TransportClock,
        surface: RecordingSurface,
    }

    impl Fixture {
        fn new(grid: Grid) -> Self {
            let timeline = Timeline::build(&grid, 1e-3).unwrap();
            let columns = ColumnMap::build(&grid.rhythm, &grid.tonic_markers);
            let layout = ColumnPositions::new(&grid.column_widths, 10.0);
            let mut clock = TransportClock::new(grid.tempo, 1e-4);
            clock.set_loop_region(timeline.loop_bounds);
            Self {
                grid,
                timeline,
                columns,
                layout,
                clock,
                surface: RecordingSurface::default(),
            }
        }

        fn at(&mut self, secs: f64) -> &mut Self {
            self.clock.start_at(secs * self.grid.tempo / 60.0, 0.0);
            self
        }

        fn render(&mut self, renderer: &mut PlayheadRenderer, state: TransportState) -> FrameOutcome {
            renderer.render(PlayheadFrame {
                state,
                looping: self.grid.looping,
                clock: &self.clock,
                timeline: &self.timeline,
                columns: &self.columns,
                layout: &self.layout,
                surface: &mut self.surface,
            })
        }
    }

    fn armed() -> PlayheadRenderer {
        let mut r = PlayheadRenderer::new(PlayheadConfig::default());
        r.arm();
        r
    }

    fn frame(outcome: FrameOutcome) -> FrameInfo {
        match outcome {
            FrameOutcome::Continue(info) => info,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn test_disarmed_and_idle() {
        let mut fx = Fixture::new(Grid::new(vec![1; 4], 120.0));
        let mut renderer = PlayheadRenderer::new(PlayheadConfig::default());
        assert_eq!(fx.render(&mut renderer, TransportState::Started), FrameOutcome::Halted);
        renderer.arm();
        assert_eq!(fx.render(&mut renderer, TransportState::Paused), FrameOutcome::Idle);
        assert!(fx.surface.lines.is_empty());
    }

    #[test]
    fn test_interpolates_within_column() {
        let mut fx = Fixture::new(Grid::new(vec![1; 4], 120.0));
        let mut renderer = armed();
        let info = frame(fx.at(0.375).render(&mut renderer, TransportState::Started));
        assert_eq!(info.canvas_column, 1);
        assert!((info.x - 15.0).abs() < 1e-9);
        assert_eq!(info.visual_column, Some(3));
        assert_eq!(fx.surface.lines, vec![info.x]);
        assert_eq!(fx.surface.clears, 1);
    }

    #[test]
    fn test_skips_tonic_column() {
        let mut grid = Grid::new(vec![1; 4], 120.0);
        grid.tonic_markers = vec![TonicMarker::new(1, Some(0))];
        let mut fx = Fixture::new(grid);
        let mut renderer = armed();
        // 0.25s is where column 1 would start; it has no duration
        let info = frame(fx.at(0.25).render(&mut renderer, TransportState::Started));
        assert_eq!(info.canvas_column, 2);
        assert_eq!(info.x, 20.0);
    }

    #[test]
    fn test_reached_end_when_not_looping() {
        let mut fx = Fixture::new(Grid::new(vec![1; 4], 120.0));
        let mut renderer = armed();
        assert_eq!(fx.at(0.9995).render(&mut renderer, TransportState::Started), FrameOutcome::ReachedEnd);
    }

    #[test]
    fn test_looping_wraps_position() {
        let mut grid = Grid::new(vec![1; 4], 120.0);
        grid.looping = true;
        let mut fx = Fixture::new(grid);
        let mut renderer = armed();
        let info = frame(fx.at(1.125).render(&mut renderer, TransportState::Started));
        assert_eq!(info.canvas_column, 0);
        assert!((info.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_multiplier_after_marker() {
        let mut grid = Grid::new(vec![1; 4], 120.0);
        grid.rhythm = RhythmStructure::new(vec![2, 2]);
        grid.modulation_markers = vec![ModulationMarker::new("m", 0, 2.0).unwrap()];
        let mut fx = Fixture::new(grid);
        let mut renderer = armed();

        let before = frame(fx.at(0.25).render(&mut renderer, TransportState::Started));
        assert_eq!(before.bpm, 120.0);

        // marker sits at the start of column 2, x = 20
        let after = frame(fx.at(0.5).render(&mut renderer, TransportState::Started));
        assert_eq!(after.bpm, 60.0);
        assert_eq!(renderer.tempo_multiplier(), 0.5);
        assert_eq!(fx.clock.bpm(), 120.0);

        // schedule second 1.0 lands on base 0.75, the start of column 3
        let inside = frame(fx.at(1.0).render(&mut renderer, TransportState::Started));
        assert_eq!(inside.canvas_column, 3);
        assert!((inside.x - 30.0).abs() < 1e-9);

        // x_position from the editor wins over the layout
        fx.grid.modulation_markers[0] = ModulationMarker::new("m", 0, 2.0).unwrap().with_x_position(35.0);
        fx.timeline = Timeline::build(&fx.grid, 1e-3).unwrap();
        let moved = frame(fx.at(0.5).render(&mut renderer, TransportState::Started));
        assert_eq!(moved.bpm, 120.0);
    }
}
