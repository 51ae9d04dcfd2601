//! Decode worker: a named thread fed by a bounded frame queue.
//!
//! The network thread enqueues without blocking; when the queue is full the
//! frame is dropped. Stopping is cooperative: [`DecodeWorker::terminate`]
//! raises the stop flag, wakes the thread and joins it with a deadline. A
//! worker that misses the deadline is detached and exits on its own once
//! its current call returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{PlayerError, Result};
use crate::media::Frame;

enum Message {
    Frame(Frame),
    Interrupt,
}

/// Worker-side view: frame queue plus stop flag.
pub(crate) struct WorkerContext {
    rx: Receiver<Message>,
    stop: Arc<AtomicBool>,
}

impl WorkerContext {
    /// Block for the next frame. `None` once the worker must exit.
    pub(crate) fn next_frame(&self) -> Option<Frame> {
        if self.is_stopped() {
            return None;
        }
        match self.rx.recv() {
            Ok(Message::Frame(frame)) if !self.is_stopped() => Some(frame),
            _ => None,
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

pub(crate) struct DecodeWorker {
    name: String,
    tx: Option<SyncSender<Message>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    /// Spawn `body` on a thread named `name`.
    pub(crate) fn spawn<F>(name: &str, capacity: usize, body: F) -> Result<Self>
    where
        F: FnOnce(WorkerContext) + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            rx,
            stop: stop.clone(),
        };
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(ctx))
            .map_err(|e| PlayerError::Worker(e.to_string()))?;
        tracing::debug!(worker = name, "decode worker started");
        Ok(Self {
            name: name.to_string(),
            tx: Some(tx),
            stop,
            handle: Some(handle),
        })
    }

    /// Enqueue without blocking. Returns `false` if the frame was dropped.
    pub(crate) fn push(&self, frame: Frame) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(Message::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(Message::Frame(frame))) => {
                tracing::warn!(worker = %self.name, len = frame.len(), "frame queue full, dropping frame");
                false
            }
            Err(_) => false,
        }
    }

    /// Raise the stop flag without waiting.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop, wake and join within `timeout`. Returns `true` if the thread
    /// finished in time.
    pub(crate) fn terminate(&mut self, timeout: Duration) -> bool {
        self.request_stop();
        if let Some(tx) = self.tx.take() {
            // Queue may be full; dropping the sender still wakes the worker
            // once it drains.
            let _ = tx.try_send(Message::Interrupt);
        }
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(worker = %self.name, ?timeout, "decode worker did not stop in time, abandoning");
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if handle.join().is_err() {
            tracing::warn!(worker = %self.name, "decode worker panicked");
        }
        tracing::debug!(worker = %self.name, "decode worker stopped");
        true
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.terminate(Duration::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn processes_frames_in_order_then_stops() {
        let (seen_tx, seen_rx) = mpsc::channel();
        let mut worker = DecodeWorker::spawn("test-worker", 8, move |ctx| {
            while let Some(frame) = ctx.next_frame() {
                seen_tx.send(frame.presentation_time_us).unwrap();
            }
        })
        .unwrap();

        for pts in 0..3 {
            assert!(worker.push(Frame::new(vec![1], pts)));
        }
        let got: Vec<u64> = (0..3).map(|_| seen_rx.recv().unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2]);

        assert!(worker.terminate(Duration::from_millis(500)));
        assert!(!worker.is_alive());
        assert!(!worker.push(Frame::new(vec![1], 9)));
    }

    #[test]
    fn idle_worker_wakes_on_terminate() {
        let mut worker = DecodeWorker::spawn("idle-worker", 1, |ctx| while ctx.next_frame().is_some() {}).unwrap();
        assert!(worker.is_alive());
        assert!(worker.terminate(Duration::from_millis(500)));
        assert!(!worker.is_alive());
    }

    #[test]
    fn full_queue_drops() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        let mut worker = DecodeWorker::spawn("blocked-worker", 1, move |ctx| {
            let _ = gate_rx.recv();
            while ctx.next_frame().is_some() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        assert!(worker.push(Frame::new(vec![1], 0)));
        assert!(!worker.push(Frame::new(vec![2], 1)));
        gate_tx.send(()).unwrap();
        assert!(worker.terminate(Duration::from_millis(500)));
        assert!(handled.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn stuck_worker_is_abandoned() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let mut worker = DecodeWorker::spawn("stuck-worker", 1, move |_ctx| {
            let _ = gate_rx.recv();
        })
        .unwrap();
        assert!(!worker.terminate(Duration::from_millis(20)));
        gate_tx.send(()).unwrap();
    }
}
