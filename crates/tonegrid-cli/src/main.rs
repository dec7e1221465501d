//! tonegrid: headless grid player
//!
//! Plays a demo grid through a logging sound engine, driving the audio and
//! frame contexts from a simulated clock.

use std::collections::HashSet;

use anyhow::{bail, Context};
use tonegrid_core::{
    grid::COMPRESSION_2_3, DrumHit, Grid, ModulationMarker, Pitch, PitchGamut, PitchRow, PlacedEvent,
    PlacedNote, RhythmStructure, StampPlacement, StampShape, StampShapeKind, TonicMarker, TransportState,
    TripletHit, TripletPlacement, TripletSpan,
};
use tonegrid_services::{
    load_config, notification_channel, ColumnPositions, FrameOutcome, PlaybackEngine, PlaybackEvent,
    PlayheadSurface, SharedEngine, SoundEngine, SoundEngineError,
};
use tracing::{debug, info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK_FRAMES: f64 = 256.0;
/// Audio blocks per playhead frame (~32ms)
const BLOCKS_PER_FRAME: usize = 6;
const CELL_WIDTH_PX: f64 = 24.0;

#[derive(Debug)]
struct Options {
    tempo: f64,
    looping: bool,
    seconds: f64,
    tempo_change: Option<f64>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut options = Self {
            tempo: 90.0,
            looping: false,
            seconds: 12.0,
            tempo_change: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--loop" => options.looping = true,
                "--tempo" => options.tempo = number(&arg, args.next())?,
                "--seconds" => options.seconds = number(&arg, args.next())?,
                "--change-tempo" => options.tempo_change = Some(number(&arg, args.next())?),
                other => bail!("unknown argument '{other}'"),
            }
        }
        Ok(options)
    }
}

fn number(flag: &str, value: Option<String>) -> anyhow::Result<f64> {
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    value.parse().with_context(|| format!("invalid value for {flag}: {value}"))
}

/// Sound engine that only logs what it would play
#[derive(Default)]
struct LoggingSound {
    sounding: HashSet<Pitch>,
}

impl SoundEngine for LoggingSound {
    fn ensure_ready(&mut self) -> Result<(), SoundEngineError> {
        Ok(())
    }

    fn trigger_attack(&mut self, pitch: &Pitch, color: &str, at: f64) -> Result<(), SoundEngineError> {
        info!(%pitch, color, at, "attack");
        self.sounding.insert(pitch.clone());
        Ok(())
    }

    fn trigger_release(&mut self, pitch: &Pitch, _color: &str, at: f64) -> Result<(), SoundEngineError> {
        debug!(%pitch, at, "release");
        self.sounding.remove(pitch);
        Ok(())
    }

    fn trigger_drum(&mut self, track: u8, at: f64) -> Result<(), SoundEngineError> {
        info!(track, at, "drum");
        Ok(())
    }

    fn release_all(&mut self) {
        if !self.sounding.is_empty() {
            debug!(voices = self.sounding.len(), "release all");
        }
        self.sounding.clear();
    }
}

struct TracingSurface;

impl PlayheadSurface for TracingSurface {
    fn clear(&mut self) {}

    fn draw_playhead(&mut self, x: f64) {
        trace!(x, "playhead");
    }
}

fn demo_grid(options: &Options) -> anyhow::Result<Grid> {
    // tonic column first, then 2+2 | 3+2 microbeats
    let mut grid = Grid::new(vec![1; 10], options.tempo);
    grid.looping = options.looping;
    grid.tonic_markers = vec![TonicMarker::new(0, None)];
    grid.rhythm = RhythmStructure::new(vec![2, 2, 3, 2]);
    grid.modulation_markers = vec![ModulationMarker::new("mod-1", 1, COMPRESSION_2_3)?];
    grid.gamut = PitchGamut::new(
        ["C5", "B4", "A4", "G4", "F4", "E4", "D4", "C4"]
            .iter()
            .map(|name| PitchRow {
                tone_note: name.to_string(),
                hex: "#6b8e23".into(),
            })
            .collect(),
    );

    let note = |id: &str, row, start_column, end_column| {
        PlacedEvent::Note(PlacedNote {
            id: id.into(),
            row,
            start_column,
            end_column,
            shape: Default::default(),
            color: "#4a90e2".into(),
        })
    };
    let kick = |id: &str, column| {
        PlacedEvent::Drum(DrumHit {
            id: id.into(),
            track: 0,
            start_column: column,
            end_column: column,
        })
    };

    grid.events = vec![
        note("n1", 7, 1, 2),
        note("n2", 5, 3, 4),
        note("n3", 3, 5, 7),
        kick("k1", 1),
        kick("k2", 5),
        PlacedEvent::Stamp(StampPlacement {
            id: "s1".into(),
            start_column: 8,
            row: 4,
            color: "#e94b3c".into(),
            shapes: vec![
                StampShape { kind: StampShapeKind::Oval, slot: 0, row_offset: 0 },
                StampShape { kind: StampShapeKind::Diamond, slot: 2, row_offset: -1 },
                StampShape { kind: StampShapeKind::Diamond, slot: 3, row_offset: -2 },
            ],
        }),
        PlacedEvent::Triplet(TripletPlacement {
            id: "t1".into(),
            start_cell: 3,
            span: TripletSpan::Eighth,
            row: 1,
            color: "#f5a623".into(),
            hits: (0..3).map(|slot| TripletHit { slot, row_offset: slot as i32 }).collect(),
        }),
    ];
    Ok(grid)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("tonegrid=debug".parse()?))
        .init();

    let options = Options::parse(std::env::args().skip(1))?;
    let config = load_config();
    let grid = demo_grid(&options)?;
    info!(?options, events = grid.events.len(), "Starting tonegrid player");

    let (notifier, notifications) = notification_channel(config.transport.notification_capacity);
    let layout = ColumnPositions::new(&grid.column_widths, CELL_WIDTH_PX);
    let engine = PlaybackEngine::new(
        grid,
        config,
        Box::new(LoggingSound::default()),
        Box::new(TracingSurface),
        Box::new(layout),
        notifier,
    )?;
    let shared = SharedEngine::new(engine);

    shared.with(|engine| engine.start()).context("engine lock poisoned")??;
    if let Some(pass) = shared.with(|engine| engine.last_pass().clone()) {
        for skipped in &pass.skipped {
            info!(event = %skipped.payload_id, reason = ?skipped.reason, "not scheduled");
        }
    }

    let block_secs = BLOCK_FRAMES / SAMPLE_RATE;
    let total_blocks = (options.seconds / block_secs).ceil() as usize;
    let change_at = total_blocks / 2;

    for block in 0..total_blocks {
        shared.process_audio(block_secs);

        if block == change_at {
            if let Some(bpm) = options.tempo_change {
                shared.with(|engine| engine.set_tempo(bpm)).context("engine lock poisoned")??;
            }
        }

        if block % BLOCKS_PER_FRAME == 0 {
            if let Some(FrameOutcome::Continue(frame)) = shared.render_frame() {
                trace!(x = frame.x, bpm = frame.bpm, column = ?frame.visual_column, "frame");
            }
        }

        for event in notifications.try_iter() {
            match event {
                PlaybackEvent::Failed(reason) => bail!("playback failed: {reason}"),
                PlaybackEvent::Stopped => info!("Reached end of grid"),
                other => debug!(?other, "notification"),
            }
        }

        if shared.with(|engine| engine.state()) == Some(TransportState::Stopped) {
            break;
        }
    }

    shared.with(|engine| engine.stop());
    info!("Done");
    Ok(())
}
