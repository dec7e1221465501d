//! Collaborators the engine drives: the synthesizer and the drawing surface

use thiserror::Error;
use tonegrid_core::Pitch;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SoundEngineError {
    #[error("Audio context unavailable: {0}")]
    Unavailable(String),
    #[error("Audio device error: {0}")]
    Device(String),
}

/// Sound synthesis backend. Times are in audio context seconds.
pub trait SoundEngine: Send {
    /// Resume or create the audio context; called before start and resume
    fn ensure_ready(&mut self) -> Result<(), SoundEngineError>;
    fn trigger_attack(&mut self, pitch: &Pitch, color: &str, at: f64) -> Result<(), SoundEngineError>;
    fn trigger_release(&mut self, pitch: &Pitch, color: &str, at: f64) -> Result<(), SoundEngineError>;
    fn trigger_drum(&mut self, track: u8, at: f64) -> Result<(), SoundEngineError>;
    /// Silence every sounding voice immediately
    fn release_all(&mut self);
}

/// Overlay the playhead is drawn on
pub trait PlayheadSurface: Send {
    fn clear(&mut self);
    fn draw_playhead(&mut self, x: f64);
}
