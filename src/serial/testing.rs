//! Shared helpers for the worker and manager tests.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::listener::{DataListener, ListenerSlot};

/// Upper bound for waiting on an event that is expected to arrive.
pub(crate) const WAIT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Received(Vec<u8>),
    Sent(Vec<u8>),
    Error(io::ErrorKind),
}

/// Data listener that forwards every callback into a channel.
pub(crate) struct Recorder {
    rx: Receiver<Event>,
}

struct Forwarder {
    tx: Sender<Event>,
}

impl DataListener for Forwarder {
    fn on_data_received(&self, bytes: &[u8]) {
        let _ = self.tx.send(Event::Received(bytes.to_vec()));
    }

    fn on_data_sent(&self, bytes: &[u8]) {
        let _ = self.tx.send(Event::Sent(bytes.to_vec()));
    }

    fn on_error(&self, error: &io::Error) {
        let _ = self.tx.send(Event::Error(error.kind()));
    }
}

impl Recorder {
    pub(crate) fn new() -> (Arc<dyn DataListener>, Self) {
        let (tx, rx) = unbounded();
        let listener: Arc<dyn DataListener> = Arc::new(Forwarder { tx });
        (listener, Self { rx })
    }

    /// A listener slot already holding a forwarder.
    pub(crate) fn slot() -> (Arc<ListenerSlot<dyn DataListener>>, Self) {
        let (listener, recorder) = Self::new();
        let slot: Arc<ListenerSlot<dyn DataListener>> = Arc::new(ListenerSlot::default());
        slot.replace(Some(listener));
        (slot, recorder)
    }

    pub(crate) fn next(&self, timeout: Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// `true` if nothing arrives within `window`.
    pub(crate) fn quiet(&self, window: Duration) -> bool {
        self.rx.recv_timeout(window).is_err()
    }
}
