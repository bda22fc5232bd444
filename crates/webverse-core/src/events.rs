use crate::docker::DockerStatus;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Change notifications published by [`crate::state::AppState`].
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    LabsChanged,
    FilterChanged(String),
    SelectedChanged(Option<String>),
    RunningChanged(Option<String>),
    DockerChanged(DockerStatus),
    /// Progress or notes were written; cached views are stale.
    ProgressChanged,
    /// One lab's solved state changed (badges, detail view).
    LabStateChanged(String),
    Log(String),
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<AppEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<AppEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber, dropping the ones whose receiver is gone.
    pub fn emit(&mut self, event: AppEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
