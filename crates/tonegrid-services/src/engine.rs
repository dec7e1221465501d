//! Playback engine: transport lifecycle, live resync and audio dispatch

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tonegrid_core::{
    schedule_grid, ColumnMap, EventScheduler, Grid, InvalidTransition, MusicalPosition, SchedulePass, Timeline,
    TonegridError, Transport, TransportCommand, TransportState,
};
use tracing::{debug, info, trace, warn};

use crate::clock::TransportClock;
use crate::config::EngineConfig;
use crate::event_queue::{EventQueue, QueuedAction};
use crate::layout::ColumnLayout;
use crate::notify::{Notifier, PlaybackEvent};
use crate::playhead::{FrameOutcome, PlayheadFrame, PlayheadRenderer};
use crate::sound::{PlayheadSurface, SoundEngine, SoundEngineError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Sound engine error: {0}")]
    Audio(#[from] SoundEngineError),
    #[error(transparent)]
    Core(#[from] TonegridError),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Grid playback engine. Owns the clock, the dispatch queue and the
/// scheduler; drives the sound engine and the playhead surface.
pub struct PlaybackEngine {
    config: EngineConfig,
    grid: Grid,
    timeline: Timeline,
    columns: ColumnMap,
    transport: Transport,
    clock: TransportClock,
    queue: EventQueue,
    scheduler: EventScheduler,
    renderer: PlayheadRenderer,
    last_pass: SchedulePass,
    sound: Box<dyn SoundEngine>,
    surface: Box<dyn PlayheadSurface>,
    layout: Box<dyn ColumnLayout>,
    notifier: Notifier,
}

impl PlaybackEngine {
    pub fn new(
        grid: Grid,
        config: EngineConfig,
        sound: Box<dyn SoundEngine>,
        surface: Box<dyn PlayheadSurface>,
        layout: Box<dyn ColumnLayout>,
        notifier: Notifier,
    ) -> Result<Self, EngineError> {
        let timeline = Timeline::build(&grid, config.scheduling.min_loop_duration)?;
        let columns = ColumnMap::build(&grid.rhythm, &grid.tonic_markers);
        let mut transport = Transport::new(grid.tempo);
        transport.looping = grid.looping;
        transport.loop_bounds = Some(timeline.loop_bounds);

        let mut clock = TransportClock::new(grid.tempo, config.transport.loop_epsilon);
        clock.set_looping(grid.looping);
        clock.set_loop_region(timeline.loop_bounds);

        Ok(Self {
            scheduler: EventScheduler::new(config.scheduling),
            renderer: PlayheadRenderer::new(config.playhead.clone()),
            config,
            grid,
            timeline,
            columns,
            transport,
            clock,
            queue: EventQueue::new(),
            last_pass: SchedulePass::default(),
            sound,
            surface,
            layout,
            notifier,
        })
    }

    pub fn state(&self) -> TransportState {
        self.transport.state
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn position(&self) -> MusicalPosition {
        self.clock.position()
    }

    /// Result of the most recent scheduling pass
    pub fn last_pass(&self) -> &SchedulePass {
        &self.last_pass
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn set_layout(&mut self, layout: Box<dyn ColumnLayout>) {
        self.layout = layout;
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        // validate before touching the audio context
        self.transport.state.apply(TransportCommand::Start)?;

        if let Err(e) = self.sound.ensure_ready() {
            warn!(error = %e, "Sound engine not ready, playback not started");
            self.transport.apply(TransportCommand::Stop)?;
            self.notifier.send(PlaybackEvent::Failed(e.to_string()));
            return Err(e.into());
        }

        self.rebuild(self.grid.clone())?;
        self.reschedule();

        self.clock.set_bpm(self.grid.tempo);
        self.clock.set_looping(self.grid.looping);
        self.clock.set_loop_region(self.timeline.loop_bounds);
        self.clock.start_at(0.0, self.config.transport.start_latency_secs);

        self.renderer.arm();
        self.transport.apply(TransportCommand::Start)?;

        info!(
            bpm = self.grid.tempo,
            events = self.last_pass.events.len(),
            duration = self.timeline.duration_secs(),
            loop_start = self.timeline.loop_bounds.start,
            loop_end = self.timeline.loop_bounds.end,
            "Playback started"
        );
        self.notifier.send(PlaybackEvent::Started);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.transport.apply(TransportCommand::Pause)?;
        self.clock.pause();
        info!(beats = self.clock.beats(), "Playback paused");
        self.notifier.send(PlaybackEvent::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.transport.state.apply(TransportCommand::Resume)?;

        if let Err(e) = self.sound.ensure_ready() {
            self.fail(e.clone());
            return Err(e.into());
        }

        self.clock.resume();
        self.transport.apply(TransportCommand::Resume)?;
        info!(beats = self.clock.beats(), "Playback resumed");
        self.notifier.send(PlaybackEvent::Resumed);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.halt();
        info!("Playback stopped");
        self.notifier.send(PlaybackEvent::Stopped);
    }

    /// Unrecoverable audio failure: stop everything and report it once
    pub fn fail(&mut self, err: SoundEngineError) {
        warn!(error = %err, "Playback failed");
        self.halt();
        self.notifier.send(PlaybackEvent::Failed(err.to_string()));
    }

    fn halt(&mut self) {
        self.clock.halt();
        self.queue.cancel_all();
        self.scheduler.reset();
        self.sound.release_all();
        self.surface.clear();
        self.renderer.disarm();
        // Stop is valid from every state
        let _ = self.transport.apply(TransportCommand::Stop);
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), EngineError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(TonegridError::InvalidTempo(bpm).into());
        }
        let mut grid = self.grid.clone();
        grid.tempo = bpm;
        info!(bpm, state = %self.transport.state, "Tempo changed");
        self.apply_grid(grid)
    }

    /// Replace the grid after an edit
    pub fn update_grid(&mut self, grid: Grid) -> Result<(), EngineError> {
        debug!(events = grid.events.len(), state = %self.transport.state, "Grid updated");
        self.apply_grid(grid)
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.grid.looping = looping;
        self.transport.looping = looping;
        self.clock.set_looping(looping);
        self.clock.set_loop_region(self.timeline.loop_bounds);
        debug!(looping, "Looping changed");
    }

    fn apply_grid(&mut self, grid: Grid) -> Result<(), EngineError> {
        match self.transport.state {
            TransportState::Started => self.resync(grid),
            TransportState::Paused => {
                self.rebuild(grid)?;
                self.reschedule();
                Ok(())
            }
            TransportState::Stopped => self.rebuild(grid),
        }
    }

    /// Re-time everything while playing without losing the musical position
    fn resync(&mut self, grid: Grid) -> Result<(), EngineError> {
        let beats = self.clock.beats();
        let delay = self.clock.pending_delay();
        self.clock.pause();

        if let Err(e) = self.rebuild(grid) {
            self.clock.resume();
            return Err(e);
        }
        self.queue.cancel_all();
        self.reschedule();
        self.clock.start_at(beats, delay);

        info!(beats, bpm = self.grid.tempo, events = self.last_pass.events.len(), "Resynchronized transport");
        Ok(())
    }

    /// Rebuild derived timing for `grid`; nothing changes on error
    fn rebuild(&mut self, grid: Grid) -> Result<(), EngineError> {
        let timeline = Timeline::build(&grid, self.config.scheduling.min_loop_duration)?;
        self.columns = ColumnMap::build(&grid.rhythm, &grid.tonic_markers);
        self.timeline = timeline;

        self.transport.set_tempo(grid.tempo);
        self.transport.looping = grid.looping;
        self.transport.loop_bounds = Some(self.timeline.loop_bounds);

        self.clock.set_bpm(grid.tempo);
        self.clock.set_looping(grid.looping);
        self.clock.set_loop_region(self.timeline.loop_bounds);
        self.renderer.reset_tempo();

        self.grid = grid;
        Ok(())
    }

    fn reschedule(&mut self) {
        self.last_pass = schedule_grid(&mut self.scheduler, &self.timeline, &self.grid);
        self.queue.load_pass(&self.last_pass);
    }

    /// Advance the clock by one audio block and dispatch everything that
    /// falls inside it. Returns the number of dispatched actions.
    pub fn process_audio(&mut self, real_dt: f64) -> usize {
        let spans = self.clock.advance(real_dt);
        if self.transport.state != TransportState::Started {
            return 0;
        }

        let mut dispatched = 0;
        let mut failure = None;

        'spans: for span in spans {
            for entry in self.queue.due(span.start, span.end) {
                let at = span.context_time_of(entry.time);
                let result = match &entry.action {
                    QueuedAction::Attack { event_id, pitch, color } => {
                        trace!(event = %event_id, %pitch, at, "Attack");
                        self.notifier.send(PlaybackEvent::NoteAttack {
                            event_id: event_id.clone(),
                            color: color.clone(),
                        });
                        self.sound.trigger_attack(pitch, color, at)
                    }
                    QueuedAction::Release { event_id, pitch, color } => {
                        trace!(event = %event_id, %pitch, at, "Release");
                        self.notifier.send(PlaybackEvent::NoteRelease {
                            event_id: event_id.clone(),
                            color: color.clone(),
                        });
                        self.sound.trigger_release(pitch, color, at)
                    }
                    QueuedAction::Drum { event_id, track } => {
                        trace!(event = %event_id, track, at, "Drum hit");
                        self.notifier.send(PlaybackEvent::DrumHit {
                            event_id: event_id.clone(),
                            track: *track,
                        });
                        self.sound.trigger_drum(*track, at)
                    }
                };

                if let Err(e) = result {
                    failure = Some(e);
                    break 'spans;
                }
                dispatched += 1;
            }
        }

        if let Some(e) = failure {
            self.fail(e);
        }
        dispatched
    }

    /// Run one playhead frame
    pub fn render_frame(&mut self) -> FrameOutcome {
        let outcome = self.renderer.render(PlayheadFrame {
            state: self.transport.state,
            looping: self.grid.looping,
            clock: &self.clock,
            timeline: &self.timeline,
            columns: &self.columns,
            layout: self.layout.as_ref(),
            surface: self.surface.as_mut(),
        });

        match outcome {
            FrameOutcome::ReachedEnd => self.stop(),
            FrameOutcome::Continue(info) => self.transport.effective_bpm = info.bpm,
            FrameOutcome::Idle | FrameOutcome::Halted => {}
        }
        outcome
    }
}

/// Engine shared between the audio context and the frame context
#[derive(Clone)]
pub struct SharedEngine(Arc<Mutex<PlaybackEngine>>);

impl SharedEngine {
    pub fn new(engine: PlaybackEngine) -> Self {
        Self(Arc::new(Mutex::new(engine)))
    }

    /// Run `f` under the engine lock; `None` if the lock is poisoned
    pub fn with<R>(&self, f: impl FnOnce(&mut PlaybackEngine) -> R) -> Option<R> {
        self.0.lock().ok().map(|mut engine| f(&mut engine))
    }

    /// Audio context entry point
    pub fn process_audio(&self, real_dt: f64) -> usize {
        self.with(|engine| engine.process_audio(real_dt)).unwrap_or(0)
    }

    /// Frame context entry point; `None` means the frame was skipped
    /// because the audio side holds the lock
    pub fn render_frame(&self) -> Option<FrameOutcome> {
        let mut engine = self.0.try_lock().ok()?;
        Some(engine.render_frame())
    }
}
