//! tonegrid-services: Playback engine, transport clock and collaborators

pub mod clock;
pub mod config;
pub mod engine;
pub mod event_queue;
pub mod layout;
pub mod notify;
pub mod playhead;
pub mod sound;

pub use clock::{ClockSpan, TransportClock};
pub use config::{load_config, ConfigError, EngineConfig, PlayheadConfig, TransportConfig};
pub use engine::{EngineError, PlaybackEngine, SharedEngine};
pub use event_queue::{EventQueue, QueuedAction, QueuedEntry};
pub use layout::{ColumnLayout, ColumnPositions};
pub use notify::{notification_channel, Notifier, PlaybackEvent};
pub use playhead::{FrameInfo, FrameOutcome, PlayheadFrame, PlayheadRenderer};
pub use sound::{PlayheadSurface, SoundEngine, SoundEngineError};
