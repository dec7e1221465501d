//! Transport state machine and musical position

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loop_bounds::LoopBounds;

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Started,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportCommand {
    Start,
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Started => "started",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot {command:?} while {from}")]
pub struct InvalidTransition {
    pub from: TransportState,
    pub command: TransportCommand,
}

impl TransportState {
    /// Next state for `command`. Stop is accepted from anywhere.
    pub fn apply(self, command: TransportCommand) -> Result<Self, InvalidTransition> {
        use TransportCommand::*;
        use TransportState::*;

        match (self, command) {
            (Stopped, Start) => Ok(Started),
            (Started, Pause) => Ok(Paused),
            (Paused, Resume) => Ok(Started),
            (_, Stop) => Ok(Stopped),
            (from, command) => Err(InvalidTransition { from, command }),
        }
    }
}

/// Transport controls and tempo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transport {
    pub state: TransportState,
    /// Tempo set by the user, BPM
    pub nominal_bpm: f64,
    /// Tempo currently heard, after modulation
    pub effective_bpm: f64,
    pub looping: bool,
    #[serde(skip)]
    pub loop_bounds: Option<LoopBounds>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl Transport {
    pub fn new(bpm: f64) -> Self {
        Self {
            state: TransportState::Stopped,
            nominal_bpm: bpm,
            effective_bpm: bpm,
            looping: false,
            loop_bounds: None,
        }
    }

    pub fn apply(&mut self, command: TransportCommand) -> Result<TransportState, InvalidTransition> {
        self.state = self.state.apply(command)?;
        if self.state == TransportState::Stopped {
            self.effective_bpm = self.nominal_bpm;
        }
        Ok(self.state)
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Started
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.nominal_bpm = bpm;
        self.effective_bpm = bpm;
    }

    /// effective / nominal
    pub fn tempo_multiplier(&self) -> f64 {
        self.effective_bpm / self.nominal_bpm
    }

    /// Format seconds as MM:SS.ss
    pub fn format_time(secs: f64) -> String {
        let secs = secs.max(0.0);
        let mins = (secs / 60.0) as u32;
        let secs_rem = secs % 60.0;
        format!("{:02}:{:05.2}", mins, secs_rem)
    }
}

/// Elapsed beats; independent of tempo
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct MusicalPosition {
    pub beats: f64,
}

impl MusicalPosition {
    pub fn from_seconds(secs: f64, bpm: f64) -> Self {
        Self { beats: secs * bpm / 60.0 }
    }

    pub fn to_seconds(self, bpm: f64) -> f64 {
        self.beats * 60.0 / bpm
    }
}
