//! Time-ordered dispatch queue between the scheduler and the audio context

use tonegrid_core::{Pitch, SchedulePass, Voice};

#[derive(Debug, Clone, PartialEq)]
pub enum QueuedAction {
    Attack { event_id: String, pitch: Pitch, color: String },
    Release { event_id: String, pitch: Pitch, color: String },
    Drum { event_id: String, track: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEntry {
    /// Timeline seconds
    pub time: f64,
    seq: u64,
    pub action: QueuedAction,
}

/// Scheduled actions sorted by `(time, seq)`. Entries are not consumed by
/// dispatch, so a looping transport replays them every pass.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    entries: Vec<QueuedEntry>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueuedEntry] {
        &self.entries
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    /// Swap in a whole new set of actions
    pub fn replace_all(&mut self, actions: impl IntoIterator<Item = (f64, QueuedAction)>) {
        self.entries.clear();
        for (time, action) in actions {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.push(QueuedEntry { time, seq, action });
        }
        self.entries
            .sort_by(|a, b| a.time.total_cmp(&b.time).then(a.seq.cmp(&b.seq)));
    }

    /// Queue the attacks and releases of a schedule pass
    pub fn load_pass(&mut self, pass: &SchedulePass) {
        let mut actions = Vec::with_capacity(pass.events.len() * 2);
        for event in &pass.events {
            let event_id = event.payload_id.clone();
            match &event.voice {
                Voice::Pitched(pitch) => {
                    let color = event.color.clone().unwrap_or_default();
                    actions.push((
                        event.attack_time,
                        QueuedAction::Attack {
                            event_id: event_id.clone(),
                            pitch: pitch.clone(),
                            color: color.clone(),
                        },
                    ));
                    actions.push((
                        event.release_time,
                        QueuedAction::Release {
                            event_id,
                            pitch: pitch.clone(),
                            color,
                        },
                    ));
                }
                Voice::Drum(track) => {
                    actions.push((event.attack_time, QueuedAction::Drum { event_id, track: *track }));
                }
            }
        }
        self.replace_all(actions);
    }

    /// Entries with `start <= time < end`
    pub fn due(&self, start: f64, end: f64) -> &[QueuedEntry] {
        let lo = self.entries.partition_point(|e| e.time < start);
        let hi = self.entries.partition_point(|e| e.time < end);
        &self.entries[lo..hi.max(lo)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonegrid_core::ScheduledEvent;

    fn drum(id: &str) -> QueuedAction {
        QueuedAction::Drum { event_id: id.into(), track: 0 }
    }

    #[test]
    fn test_due_is_half_open_and_ordered() {
        let mut q = EventQueue::new();
        q.replace_all(vec![(0.5, drum("c")), (0.0, drum("a")), (0.25, drum("b")), (0.25, drum("b2"))]);
        let due: Vec<_> = q.due(0.0, 0.5).iter().map(|e| e.action.clone()).collect();
        assert_eq!(due, vec![drum("a"), drum("b"), drum("b2")]);
        assert_eq!(q.due(0.5, 1.0).len(), 1);
        assert!(q.due(0.6, 0.7).is_empty());
    }

    #[test]
    fn test_due_does_not_consume() {
        let mut q = EventQueue::new();
        q.replace_all(vec![(0.1, drum("a"))]);
        assert_eq!(q.due(0.0, 1.0).len(), 1);
        assert_eq!(q.due(0.0, 1.0).len(), 1);
        q.cancel_all();
        assert!(q.is_empty());
    }

    #[test]
    fn test_load_pass_splits_attack_and_release() {
        let pass = SchedulePass {
            events: vec![ScheduledEvent {
                attack_time: 0.0,
                release_time: 0.5,
                voice: Voice::Pitched(Pitch::new("C4")),
                color: Some("#f00".into()),
                payload_id: "n".into(),
            }],
            skipped: vec![],
        };
        let mut q = EventQueue::new();
        q.load_pass(&pass);
        assert_eq!(q.len(), 2);
        assert!(matches!(q.entries()[0].action, QueuedAction::Attack { .. }));
        assert_eq!(q.entries()[1].time, 0.5);
    }
}
