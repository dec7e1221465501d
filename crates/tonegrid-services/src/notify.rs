//! Playback notifications for the UI

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Paused,
    Resumed,
    Stopped,
    Failed(String),
    NoteAttack { event_id: String, color: String },
    NoteRelease { event_id: String, color: String },
    DrumHit { event_id: String, track: u8 },
}

/// Non-blocking sender side of the notification channel
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<PlaybackEvent>,
}

impl Notifier {
    /// Drops the event if the channel is full or nobody is listening
    pub fn send(&self, event: PlaybackEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!(?event, "Notification channel full, dropping"),
            Err(TrySendError::Disconnected(event)) => trace!(?event, "No notification listener, dropping"),
        }
    }
}

pub fn notification_channel(capacity: usize) -> (Notifier, Receiver<PlaybackEvent>) {
    let (tx, rx) = bounded(capacity);
    (Notifier { tx }, rx)
}
