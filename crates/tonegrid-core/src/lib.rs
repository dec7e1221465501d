//! tonegrid-core: Grid model and timing for the tonegrid sequencer

pub mod columns;
mod error;
pub mod grid;
pub mod loop_bounds;
pub mod modulation;
pub mod rhythm;
pub mod schedule;
pub mod time_map;
mod timeline;
mod transport;

pub use columns::{macrobeat_spans, ColumnKind, ColumnMap, MacrobeatSpan};
pub use error::{Result, TonegridError};
pub use grid::{
    BoundaryStyle, DrumHit, Grid, ModulationMarker, NoteShape, Pitch, PitchGamut, PitchRow, PlacedEvent,
    PlacedNote, RhythmStructure, StampPlacement, StampShape, StampShapeKind, TonicMarker, TripletHit,
    TripletPlacement, TripletSpan,
};
pub use loop_bounds::LoopBounds;
pub use modulation::ModulationAdjuster;
pub use schedule::{
    schedule_grid, EventScheduler, ScheduleContext, ScheduledEvent, SchedulePass, SchedulerConfig, SkipReason,
    SkippedEvent, Voice,
};
pub use time_map::TimeMap;
pub use timeline::Timeline;
pub use transport::{InvalidTransition, MusicalPosition, Transport, TransportCommand, TransportState};
