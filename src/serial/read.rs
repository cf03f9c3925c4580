//! Continuous reader.
//!
//! One thread blocks on the readable side and hands every chunk to the data
//! listener unmodified. A read error is reported once and ends the loop.

use log::{debug, error};
use std::io::{self, ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use super::encoding::hex_preview;
use super::listener::{DataListener, ListenerSlot};

pub(crate) struct ReadWorker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReadWorker {
    pub(crate) fn start(
        name: &str,
        reader: Box<dyn Read + Send>,
        buffer_size: usize,
        listener: Arc<ListenerSlot<dyn DataListener>>,
    ) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name(format!("serial-read-{name}"))
            .spawn(move || read_loop(reader, buffer_size, thread_running, listener))?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// `false` once stopped or once the loop ended on its own.
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Requests a stop and waits for the loop to observe it.
    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Read worker panicked");
            }
        }
    }
}

impl Drop for ReadWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    buffer_size: usize,
    running: Arc<AtomicBool>,
    listener: Arc<ListenerSlot<dyn DataListener>>,
) {
    debug!("Read worker started");
    let mut buffer = vec![0u8; buffer_size];
    while running.load(Ordering::Acquire) {
        match reader.read(&mut buffer) {
            Ok(0) => {
                debug!("Serial stream reached end of file");
                break;
            }
            Ok(n) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                let chunk = &buffer[..n];
                debug!("RX {n} bytes: {}", hex_preview(chunk));
                listener.notify("on_data_received", |l| l.on_data_received(chunk));
            }
            Err(e) if is_idle(&e) => continue,
            Err(e) => {
                // errors caused by our own shutdown are not reported
                if running.load(Ordering::Acquire) {
                    error!("Serial read failed: {e}");
                    listener.notify("on_error", |l| l.on_error(&e));
                }
                break;
            }
        }
    }
    running.store(false, Ordering::Release);
    debug!("Read worker stopped");
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::testing::{Event, Recorder, WAIT};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays a script of read results, then idles.
    struct ScriptedReader {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => {
                    thread::sleep(Duration::from_millis(2));
                    Err(io::Error::new(ErrorKind::TimedOut, "idle"))
                }
            }
        }
    }

    fn start(script: Vec<io::Result<Vec<u8>>>, buffer_size: usize) -> (ReadWorker, Recorder) {
        let (slot, recorder) = Recorder::slot();
        let worker =
            ReadWorker::start("test", Box::new(ScriptedReader::new(script)), buffer_size, slot)
                .unwrap();
        (worker, recorder)
    }

    #[test]
    fn test_chunks_passed_through_exactly() {
        let (mut worker, recorder) = start(vec![Ok(vec![0x01, 0x02, 0x03]), Ok(vec![0x04])], 8);
        assert_eq!(
            recorder.next(WAIT),
            Some(Event::Received(vec![0x01, 0x02, 0x03]))
        );
        assert_eq!(recorder.next(WAIT), Some(Event::Received(vec![0x04])));
        assert!(worker.is_running());
        worker.stop();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_full_buffer_chunk() {
        let (mut worker, recorder) = start(vec![Ok(vec![0xAA; 4])], 4);
        assert_eq!(recorder.next(WAIT), Some(Event::Received(vec![0xAA; 4])));
        worker.stop();
    }

    #[test]
    fn test_timeouts_are_not_errors() {
        let timeout = || Err(io::Error::new(ErrorKind::TimedOut, "idle"));
        let (mut worker, recorder) = start(
            vec![timeout(), timeout(), Err(ErrorKind::Interrupted.into()), Ok(b"ok".to_vec())],
            8,
        );
        assert_eq!(recorder.next(WAIT), Some(Event::Received(b"ok".to_vec())));
        worker.stop();
    }

    #[test]
    fn test_read_error_is_fatal() {
        let (mut worker, recorder) = start(
            vec![
                Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")),
                Ok(b"never".to_vec()),
            ],
            8,
        );
        assert_eq!(
            recorder.next(WAIT),
            Some(Event::Error(ErrorKind::BrokenPipe))
        );
        assert!(recorder.quiet(Duration::from_millis(50)));
        assert!(!worker.is_running());
        worker.stop();
    }

    #[test]
    fn test_end_of_stream_exits_silently() {
        let (mut worker, recorder) = start(vec![Ok(Vec::new())], 8);
        assert!(recorder.quiet(Duration::from_millis(50)));
        assert!(!worker.is_running());
        worker.stop();
    }
}
