//! Serialized writer.
//!
//! One thread drains a FIFO queue and writes each message to the device in
//! order. Results go to the data listener; a failed write does not stop the
//! worker.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use super::encoding::hex_preview;
use super::listener::{DataListener, ListenerSlot};

enum SendCommand {
    Write(Vec<u8>),
    Stop,
}

/// Producer side of the send queue. Cheap to clone.
#[derive(Clone)]
pub(crate) struct SendQueue {
    tx: Sender<SendCommand>,
    running: Arc<AtomicBool>,
}

impl SendQueue {
    /// Enqueues one message. `false` when the worker is no longer running.
    pub(crate) fn enqueue(&self, bytes: Vec<u8>) -> bool {
        self.is_running() && self.tx.send(SendCommand::Write(bytes)).is_ok()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

pub(crate) struct SendWorker {
    queue: SendQueue,
    handle: Option<JoinHandle<()>>,
}

impl SendWorker {
    pub(crate) fn start(
        name: &str,
        writer: Box<dyn Write + Send>,
        listener: Arc<ListenerSlot<dyn DataListener>>,
    ) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name(format!("serial-send-{name}"))
            .spawn(move || send_loop(writer, rx, thread_running, listener))?;
        Ok(Self {
            queue: SendQueue { tx, running },
            handle: Some(handle),
        })
    }

    pub(crate) fn queue(&self) -> SendQueue {
        self.queue.clone()
    }

    /// Stops the worker and waits for it. Messages still queued are dropped.
    pub(crate) fn stop(&mut self) {
        self.queue.running.store(false, Ordering::Release);
        let _ = self.queue.tx.send(SendCommand::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // stopped from one of our own callbacks; the loop exits on return
                return;
            }
            if handle.join().is_err() {
                warn!("Send worker panicked");
            }
        }
    }
}

impl Drop for SendWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_loop(
    mut writer: Box<dyn Write + Send>,
    rx: Receiver<SendCommand>,
    running: Arc<AtomicBool>,
    listener: Arc<ListenerSlot<dyn DataListener>>,
) {
    debug!("Send worker started");
    while let Ok(SendCommand::Write(bytes)) = rx.recv() {
        if !running.load(Ordering::Acquire) {
            break;
        }
        if bytes.is_empty() {
            continue;
        }
        match writer.write_all(&bytes) {
            Ok(()) => {
                debug!("TX {} bytes: {}", bytes.len(), hex_preview(&bytes));
                listener.notify("on_data_sent", |l| l.on_data_sent(&bytes));
            }
            Err(e) => {
                warn!("Serial write of {} bytes failed: {e}", bytes.len());
                listener.notify("on_error", |l| l.on_error(&e));
            }
        }
    }
    let discarded = rx
        .try_iter()
        .filter(|cmd| matches!(cmd, SendCommand::Write(_)))
        .count();
    if discarded > 0 {
        debug!("Send worker discarded {discarded} queued messages");
    }
    debug!("Send worker stopped");
}
