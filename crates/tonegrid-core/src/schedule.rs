//! Event scheduler: grid events to absolute attack/release times

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grid::{DrumHit, Grid, Pitch, PitchGamut, PlacedEvent, PlacedNote};
use crate::loop_bounds::{LoopBounds, DEFAULT_MIN_LOOP_DURATION};
use crate::modulation::ModulationAdjuster;
use crate::rhythm::{quarter_duration, stamp_sub_events, triplet_sub_events, Expansion};
use crate::time_map::TimeMap;
use crate::timeline::Timeline;

/// Scheduling tolerances
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum gap between two starts on the same drum track
    pub drum_start_epsilon: f64,
    /// Releases are kept this far inside the loop end
    pub release_margin: f64,
    pub min_loop_duration: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drum_start_epsilon: 1e-4,
            release_margin: 1e-3,
            min_loop_duration: DEFAULT_MIN_LOOP_DURATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Voice {
    Pitched(Pitch),
    Drum(u8),
}

/// Concrete playback instruction for one attack/release pair
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub attack_time: f64,
    pub release_time: f64,
    pub voice: Voice,
    /// Voice color for pitched events
    pub color: Option<String>,
    pub payload_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    BeforeLoopStart,
    AfterLoopEnd,
    NotIsolated,
    UnresolvedColumn(usize),
    MissingPitch(i64),
    UnknownShape(String),
}

impl SkipReason {
    /// Bad grid data, as opposed to an event that is simply out of range
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedColumn(_) | Self::MissingPitch(_) | Self::UnknownShape(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEvent {
    pub payload_id: String,
    pub reason: SkipReason,
}

/// Result of one scheduling pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulePass {
    /// Sorted by `(attack_time, payload_id)`
    pub events: Vec<ScheduledEvent>,
    pub skipped: Vec<SkippedEvent>,
}

impl SchedulePass {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Everything a pass reads besides the events themselves
#[derive(Debug, Clone, Copy)]
pub struct ScheduleContext<'a> {
    pub time_map: &'a TimeMap,
    pub adjuster: &'a ModulationAdjuster,
    pub loop_bounds: LoopBounds,
    pub gamut: &'a PitchGamut,
    pub isolation: Option<&'a HashSet<String>>,
}

impl<'a> ScheduleContext<'a> {
    pub fn new(timeline: &'a Timeline, gamut: &'a PitchGamut, isolation: Option<&'a HashSet<String>>) -> Self {
        Self {
            time_map: &timeline.time_map,
            adjuster: &timeline.adjuster,
            loop_bounds: timeline.loop_bounds,
            gamut,
            isolation,
        }
    }

    fn adjusted(&self, column: usize) -> Result<f64, SkipReason> {
        let base = self
            .time_map
            .time_at(column)
            .ok_or(SkipReason::UnresolvedColumn(column))?;
        Ok(self.adjuster.schedule_time_for(base, column))
    }

    /// Adjusted time of the column boundary right after `end_column`
    fn adjusted_after(&self, end_column: usize) -> Result<f64, SkipReason> {
        let column = end_column
            .checked_add(1)
            .ok_or(SkipReason::UnresolvedColumn(end_column))?;
        self.adjusted(column)
    }

    /// Adjust a time that falls inside some column rather than on its start
    fn adjusted_free(&self, base: f64) -> f64 {
        self.adjuster.adjust_time(self.time_map, base)
    }

    fn pitch(&self, row: i64) -> Result<Pitch, SkipReason> {
        self.gamut.pitch_for_row(row).ok_or(SkipReason::MissingPitch(row))
    }
}

/// Resolved but not yet range-checked event
struct Candidate {
    attack: f64,
    release: f64,
    voice: Voice,
    color: Option<String>,
    payload_id: String,
}

fn by_attack(a_time: f64, a_id: &str, b_time: f64, b_id: &str) -> Ordering {
    a_time.total_cmp(&b_time).then_with(|| a_id.cmp(b_id))
}

/// Turns grid events into scheduled events. Owns the per-track drum start
/// bookkeeping, which is cleared at the start of every pass.
#[derive(Debug, Default)]
pub struct EventScheduler {
    config: SchedulerConfig,
    last_drum_start: HashMap<u8, f64>,
}

impl EventScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            last_drum_start: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.last_drum_start.clear();
    }

    pub fn schedule(&mut self, ctx: &ScheduleContext<'_>, events: &[PlacedEvent]) -> SchedulePass {
        self.reset();
        let mut pass = SchedulePass::default();

        if ctx.time_map.is_empty() {
            debug!("Time map has zero duration, nothing to schedule");
            return pass;
        }

        let quarter = quarter_duration(ctx.time_map.tempo());
        let mut candidates = Vec::with_capacity(events.len());
        for event in events {
            if ctx.isolation.is_some_and(|ids| !ids.contains(event.id())) {
                pass.skipped.push(SkippedEvent {
                    payload_id: event.id().to_string(),
                    reason: SkipReason::NotIsolated,
                });
                continue;
            }

            match event {
                PlacedEvent::Note(note) => {
                    collect(resolve_note(ctx, note), &note.id, &mut candidates, &mut pass);
                }
                PlacedEvent::Drum(hit) => {
                    collect(resolve_drum(ctx, hit), &hit.id, &mut candidates, &mut pass);
                }
                PlacedEvent::Stamp(stamp) => {
                    let cell = Cell {
                        id: &stamp.id,
                        start_column: stamp.start_column,
                        row: stamp.row,
                        color: &stamp.color,
                    };
                    resolve_cell(ctx, cell, stamp_sub_events(stamp, quarter), &mut candidates, &mut pass);
                }
                PlacedEvent::Triplet(triplet) => {
                    let Some(start_column) = triplet.start_column() else {
                        skip_data_error(&mut pass, triplet.id.clone(), SkipReason::UnresolvedColumn(triplet.start_cell));
                        continue;
                    };
                    let cell = Cell {
                        id: &triplet.id,
                        start_column,
                        row: triplet.row,
                        color: &triplet.color,
                    };
                    resolve_cell(ctx, cell, triplet_sub_events(triplet, quarter), &mut candidates, &mut pass);
                }
            }
        }

        // drum nudging must see hits in attack order
        candidates.sort_by(|a, b| by_attack(a.attack, &a.payload_id, b.attack, &b.payload_id));

        let bounds = ctx.loop_bounds;
        let margin = self.config.release_margin;

        for mut c in candidates {
            if c.attack < bounds.start {
                pass.skipped.push(SkippedEvent {
                    payload_id: c.payload_id,
                    reason: SkipReason::BeforeLoopStart,
                });
                continue;
            }

            if let Voice::Drum(track) = c.voice {
                c.attack = self.safe_drum_start(track, c.attack);
            }

            if c.attack >= bounds.end - margin {
                pass.skipped.push(SkippedEvent {
                    payload_id: c.payload_id,
                    reason: SkipReason::AfterLoopEnd,
                });
                continue;
            }

            if c.release >= bounds.end {
                c.release = (c.attack + margin).max(bounds.end - margin);
            }
            if c.release <= c.attack {
                c.release = c.attack + margin;
            }

            pass.events.push(ScheduledEvent {
                attack_time: c.attack,
                release_time: c.release,
                voice: c.voice,
                color: c.color,
                payload_id: c.payload_id,
            });
        }

        pass.events
            .sort_by(|a, b| by_attack(a.attack_time, &a.payload_id, b.attack_time, &b.payload_id));

        debug!(
            scheduled = pass.events.len(),
            skipped = pass.skipped.len(),
            loop_start = bounds.start,
            loop_end = bounds.end,
            "Scheduled pass"
        );
        pass
    }

    /// Start time for a drum hit that is strictly after the previous hit on
    /// the same track
    fn safe_drum_start(&mut self, track: u8, attack: f64) -> f64 {
        let start = match self.last_drum_start.get(&track) {
            Some(&last) if attack <= last => last + self.config.drum_start_epsilon,
            _ => attack,
        };
        self.last_drum_start.insert(track, start);
        start
    }
}

fn collect(
    resolved: Result<Candidate, SkipReason>,
    id: &str,
    candidates: &mut Vec<Candidate>,
    pass: &mut SchedulePass,
) {
    match resolved {
        Ok(c) => candidates.push(c),
        Err(reason) => skip_data_error(pass, id.to_string(), reason),
    }
}

fn skip_data_error(pass: &mut SchedulePass, payload_id: String, reason: SkipReason) {
    warn!(event = %payload_id, ?reason, "Skipping event with bad grid data");
    pass.skipped.push(SkippedEvent { payload_id, reason });
}

fn resolve_note(ctx: &ScheduleContext<'_>, note: &PlacedNote) -> Result<Candidate, SkipReason> {
    let attack = ctx.adjusted(note.start_column)?;
    let release = ctx.adjusted_after(note.end_column)?;
    let pitch = ctx.pitch(note.row as i64)?;
    Ok(Candidate {
        attack,
        release,
        voice: Voice::Pitched(pitch),
        color: Some(note.color.clone()),
        payload_id: note.id.clone(),
    })
}

fn resolve_drum(ctx: &ScheduleContext<'_>, hit: &DrumHit) -> Result<Candidate, SkipReason> {
    Ok(Candidate {
        attack: ctx.adjusted(hit.start_column)?,
        release: ctx.adjusted_after(hit.end_column)?,
        voice: Voice::Drum(hit.track),
        color: None,
        payload_id: hit.id.clone(),
    })
}

/// Anchor of a composite placement
struct Cell<'a> {
    id: &'a str,
    start_column: usize,
    row: usize,
    color: &'a str,
}

fn resolve_cell(
    ctx: &ScheduleContext<'_>,
    cell: Cell<'_>,
    expansion: Expansion,
    candidates: &mut Vec<Candidate>,
    pass: &mut SchedulePass,
) {
    let Cell { id, start_column, row, color } = cell;

    for key in expansion.invalid {
        skip_data_error(pass, format!("{}-{}", id, key), SkipReason::UnknownShape(key));
    }

    let Some(cell_start) = ctx.time_map.time_at(start_column) else {
        skip_data_error(pass, id.to_string(), SkipReason::UnresolvedColumn(start_column));
        return;
    };

    for sub in expansion.events {
        let payload_id = format!("{}-{}", id, sub.shape_key);
        let pitch_row = (row as i64).saturating_add(sub.row_offset as i64);
        let pitch = match ctx.pitch(pitch_row) {
            Ok(p) => p,
            Err(reason) => {
                skip_data_error(pass, payload_id, reason);
                continue;
            }
        };
        let base = cell_start + sub.offset;
        candidates.push(Candidate {
            attack: ctx.adjusted_free(base),
            release: ctx.adjusted_free(base + sub.duration),
            voice: Voice::Pitched(pitch),
            color: Some(color.to_string()),
            payload_id,
        });
    }
}

/// Schedule every event of `grid` against its rebuilt timeline
pub fn schedule_grid(scheduler: &mut EventScheduler, timeline: &Timeline, grid: &Grid) -> SchedulePass {
    let ctx = ScheduleContext::new(timeline, &grid.gamut, grid.isolation.as_ref());
    scheduler.schedule(&ctx, &grid.events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{
        ModulationMarker, PitchRow, RhythmStructure, StampPlacement, StampShape, StampShapeKind,
        TripletHit, TripletPlacement, TripletSpan,
    };

    fn gamut() -> PitchGamut {
        PitchGamut::new(
            ["C5", "B\u{266d}4", "A4", "G4"]
                .iter()
                .map(|n| PitchRow { tone_note: n.to_string(), hex: "#888".into() })
                .collect(),
        )
    }

    fn note(id: &str, row: usize, start: usize, end: usize) -> PlacedEvent {
        PlacedEvent::Note(PlacedNote {
            id: id.into(),
            row,
            start_column: start,
            end_column: end,
            shape: Default::default(),
            color: "#4a90e2".into(),
        })
    }

    fn drum(id: &str, track: u8, column: usize) -> PlacedEvent {
        PlacedEvent::Drum(DrumHit {
            id: id.into(),
            track,
            start_column: column,
            end_column: column,
        })
    }

    fn grid(events: Vec<PlacedEvent>) -> Grid {
        let mut g = Grid::new(vec![1, 1, 1, 1], 120.0);
        g.gamut = gamut();
        g.events = events;
        g
    }

    fn run(g: &Grid) -> SchedulePass {
        let timeline = Timeline::build(g, 1e-3).unwrap();
        let mut scheduler = EventScheduler::new(SchedulerConfig::default());
        schedule_grid(&mut scheduler, &timeline, g)
    }

    #[test]
    fn test_note_attack_and_release() {
        let pass = run(&grid(vec![note("n1", 1, 0, 1)]));
        assert_eq!(pass.events.len(), 1);
        let e = &pass.events[0];
        assert_eq!(e.attack_time, 0.0);
        assert_eq!(e.release_time, 0.5);
        assert_eq!(e.voice, Voice::Pitched(Pitch::new("Bb4")));
        assert_eq!(e.color.as_deref(), Some("#4a90e2"));
    }

    #[test]
    fn test_drum_hits_strictly_increase_per_track() {
        let pass = run(&grid(vec![drum("d1", 0, 1), drum("d2", 0, 1), drum("d3", 1, 1)]));
        assert_eq!(pass.events.len(), 3);
        let track0: Vec<f64> = pass
            .events
            .iter()
            .filter(|e| e.voice == Voice::Drum(0))
            .map(|e| e.attack_time)
            .collect();
        assert_eq!(track0[0], 0.25);
        assert!(track0[1] > track0[0]);
        assert!((track0[1] - 0.25 - 1e-4).abs() < 1e-12);

        let track1 = pass.events.iter().find(|e| e.voice == Voice::Drum(1)).unwrap();
        assert_eq!(track1.attack_time, 0.25);
    }

    #[test]
    fn test_release_clamped_inside_loop() {
        let pass = run(&grid(vec![note("long", 0, 0, 3)]));
        let e = &pass.events[0];
        assert!(e.release_time < 1.0);
        assert!((e.release_time - 0.999).abs() < 1e-12);
    }

    #[test]
    fn test_attack_near_loop_end_suppressed() {
        let g = grid(vec![note("a", 0, 0, 0), note("b", 0, 3, 3)]);
        let timeline = Timeline::build(&g, 1e-3).unwrap();
        let mut ctx = ScheduleContext::new(&timeline, &g.gamut, None);
        ctx.loop_bounds = LoopBounds::new(0.0, 0.7505, 1e-3);
        let pass = EventScheduler::new(SchedulerConfig::default()).schedule(&ctx, &g.events);

        assert_eq!(pass.events.len(), 1);
        assert_eq!(pass.skipped, vec![SkippedEvent {
            payload_id: "b".into(),
            reason: SkipReason::AfterLoopEnd,
        }]);
    }

    #[test]
    fn test_before_loop_start_skipped() {
        let g = grid(vec![note("early", 0, 0, 0), note("late", 0, 2, 2)]);
        let timeline = Timeline::build(&g, 1e-3).unwrap();
        let mut ctx = ScheduleContext::new(&timeline, &g.gamut, None);
        ctx.loop_bounds = LoopBounds::new(0.5, 1.0, 1e-3);
        let pass = EventScheduler::new(SchedulerConfig::default()).schedule(&ctx, &g.events);

        assert_eq!(pass.events[0].payload_id, "late");
        assert_eq!(pass.skipped[0].reason, SkipReason::BeforeLoopStart);
    }

    #[test]
    fn test_data_errors_skip_and_continue() {
        let pass = run(&grid(vec![
            note("no-pitch", 9, 0, 0),
            note("bad-column", 0, 2, 40),
            note("ok", 2, 1, 1),
        ]));
        assert_eq!(pass.events.len(), 1);
        assert_eq!(pass.events[0].payload_id, "ok");
        let reasons: Vec<_> = pass.skipped.iter().map(|s| s.reason.clone()).collect();
        assert!(reasons.contains(&SkipReason::MissingPitch(9)));
        assert!(reasons.contains(&SkipReason::UnresolvedColumn(41)));
        assert!(reasons.iter().all(SkipReason::is_data_error));
    }

    #[test]
    fn test_column_overflow_is_skipped() {
        let pass = run(&grid(vec![
            note("huge-end", 0, 0, usize::MAX),
            PlacedEvent::Drum(DrumHit {
                id: "huge-drum".into(),
                track: 1,
                start_column: 0,
                end_column: usize::MAX,
            }),
            PlacedEvent::Triplet(TripletPlacement {
                id: "huge-cell".into(),
                start_cell: usize::MAX,
                span: TripletSpan::Eighth,
                row: 0,
                color: "#000".into(),
                hits: vec![TripletHit { slot: 0, row_offset: 0 }],
            }),
            note("ok", 1, 0, 0),
        ]));
        assert_eq!(pass.events.len(), 1);
        assert_eq!(pass.events[0].payload_id, "ok");
        let reasons: Vec<_> = pass.skipped.iter().map(|s| s.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::UnresolvedColumn(usize::MAX),
                SkipReason::UnresolvedColumn(usize::MAX),
                SkipReason::UnresolvedColumn(usize::MAX),
            ]
        );
    }

    #[test]
    fn test_isolation_filters_events() {
        let mut g = grid(vec![note("a", 0, 0, 0), note("b", 0, 1, 1)]);
        g.isolation = Some(HashSet::from(["b".to_string()]));
        let pass = run(&g);
        assert_eq!(pass.events.len(), 1);
        assert_eq!(pass.events[0].payload_id, "b");
        assert_eq!(pass.skipped[0].reason, SkipReason::NotIsolated);
    }

    #[test]
    fn test_empty_time_map_gives_empty_pass() {
        let mut g = Grid::new(vec![], 120.0);
        g.events = vec![note("n", 0, 0, 0)];
        assert!(run(&g).is_empty());
    }

    #[test]
    fn test_stamp_sub_events_scheduled() {
        let g = grid(vec![PlacedEvent::Stamp(StampPlacement {
            id: "s".into(),
            start_column: 2,
            row: 1,
            color: "#e24a4a".into(),
            shapes: vec![
                StampShape { kind: StampShapeKind::Oval, slot: 0, row_offset: 0 },
                StampShape { kind: StampShapeKind::Diamond, slot: 2, row_offset: 1 },
                StampShape { kind: StampShapeKind::Diamond, slot: 5, row_offset: 0 },
            ],
        })]);
        let pass = run(&g);
        let ids: Vec<&str> = pass.events.iter().map(|e| e.payload_id.as_str()).collect();
        assert_eq!(ids, vec!["s-oval_0", "s-diamond_2"]);
        assert_eq!(pass.events[0].attack_time, 0.5);
        assert_eq!(pass.events[0].release_time, 0.75);
        assert_eq!(pass.events[1].attack_time, 0.75);
        assert_eq!(pass.events[1].voice, Voice::Pitched(Pitch::new("A4")));
        assert_eq!(pass.skipped[0].reason, SkipReason::UnknownShape("diamond_5".into()));
    }

    #[test]
    fn test_triplet_under_modulation() {
        let mut g = Grid::new(vec![1; 8], 120.0);
        g.gamut = gamut();
        g.rhythm = RhythmStructure::new(vec![2, 2, 2, 2]);
        g.modulation_markers = vec![ModulationMarker::new("m", 0, 2.0).unwrap()];
        g.events = vec![PlacedEvent::Triplet(TripletPlacement {
            id: "t".into(),
            start_cell: 1,
            span: TripletSpan::Eighth,
            row: 0,
            color: "#000".into(),
            hits: vec![TripletHit { slot: 0, row_offset: 0 }],
        })];
        let pass = run(&g);
        // cell 1 starts at column 2, exactly on the boundary
        assert_eq!(pass.events[0].attack_time, 0.5);
        // 1/6 s of material after the boundary, doubled
        assert!((pass.events[0].release_time - (0.5 + 2.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_repeat_pass_is_identical() {
        let g = grid(vec![drum("d1", 0, 0), drum("d2", 0, 0), note("n", 0, 1, 2)]);
        let timeline = Timeline::build(&g, 1e-3).unwrap();
        let mut scheduler = EventScheduler::new(SchedulerConfig::default());
        let first = schedule_grid(&mut scheduler, &timeline, &g);
        let second = schedule_grid(&mut scheduler, &timeline, &g);
        assert_eq!(first, second);
    }

    #[test]
    fn test_output_sorted_and_inside_loop() {
        let g = grid(vec![
            note("z", 0, 2, 3),
            note("a", 1, 2, 2),
            drum("d", 3, 0),
            note("m", 3, 1, 3),
        ]);
        let pass = run(&g);
        for pair in pass.events.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(by_attack(a.attack_time, &a.payload_id, b.attack_time, &b.payload_id).is_le());
        }
        for e in &pass.events {
            assert!(e.release_time > e.attack_time);
            assert!(e.release_time < 1.0);
        }
    }
}
