//! Bounded frame queue between the driver and the user-mode service.
//!
//! The driver side never blocks: a full or closed queue is a hand-off
//! failure reported to the dispatch routine, which rolls the request back.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("event queue full ({0} frames)")]
    Full(usize),
    #[error("event queue closed")]
    Closed,
}

/// Create a connected queue pair holding at most `capacity` frames.
pub fn event_queue(capacity: usize) -> (EventQueue, EventReceiver) {
    let (tx, rx) = bounded(capacity);
    (
        EventQueue { tx: Mutex::new(Some(tx)), capacity },
        EventReceiver { rx },
    )
}

/// Driver end.
#[derive(Debug)]
pub struct EventQueue {
    tx: Mutex<Option<Sender<Vec<u8>>>>,
    capacity: usize,
}

impl EventQueue {
    /// Hand one frame to the service without waiting.
    pub fn notify(&self, frame: Vec<u8>) -> Result<(), QueueError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or(QueueError::Closed)?;
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full(self.capacity),
            TrySendError::Disconnected(_) => QueueError::Closed,
        })
    }

    /// Stop accepting frames; the receiver sees the end once it drains.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn len(&self) -> usize {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Sender::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Service end. Cloneable so several readers can share the load.
#[derive(Debug, Clone)]
pub struct EventReceiver {
    rx: Receiver<Vec<u8>>,
}

impl EventReceiver {
    /// Blocks until a frame arrives; `None` once the driver closed the queue.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.rx.recv().ok()
    }

    /// `Ok(None)` on timeout, `Err` once the queue is closed and empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, QueueError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Closed),
        }
    }

    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_rejects_without_blocking() {
        let (queue, rx) = event_queue(1);
        queue.notify(vec![1]).unwrap();
        assert_eq!(queue.notify(vec![2]), Err(QueueError::Full(1)));
        assert_eq!(rx.try_recv(), Some(vec![1]));
    }

    #[test]
    fn close_ends_the_stream_after_drain() {
        let (queue, rx) = event_queue(4);
        queue.notify(vec![1]).unwrap();
        queue.close();
        assert_eq!(queue.notify(vec![2]), Err(QueueError::Closed));
        assert_eq!(rx.recv(), Some(vec![1]));
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn dropped_receiver_is_closed() {
        let (queue, rx) = event_queue(4);
        drop(rx);
        assert_eq!(queue.notify(vec![1]), Err(QueueError::Closed));
    }
}
