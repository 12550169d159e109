//! Per-connection outbound queue
//!
//! Each connection owns one outbox with a bounded queue per subscribed path.
//! A full queue drops its oldest frame: live clients care about the most
//! recent state, not about every intermediate value. The connection task is
//! the single consumer and waits on [`Outbox::recv`].

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Notify;

use super::messages::LiveFrame;

#[derive(Default)]
struct PathQueue {
    frames: VecDeque<LiveFrame>,
    dropped: u64,
    last_seq: Option<u64>,
}

#[derive(Default)]
struct OutboxState {
    queues: HashMap<String, PathQueue>,
    closed: bool,
}

/// Bounded, drop-oldest queue of frames waiting to be written to one client
pub struct Outbox {
    state: Mutex<OutboxState>,
    notify: Notify,
    capacity: usize,
}

impl Outbox {
    /// Create an outbox holding at most `capacity` frames per path
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(OutboxState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue a frame
    ///
    /// Returns false once the outbox is closed. A frame older than one
    /// already queued for the same path is superseded and skipped.
    pub fn push(&self, frame: LiveFrame) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }

            let queue = state.queues.entry(frame.path.clone()).or_default();
            if queue.last_seq.map_or(false, |last| last >= frame.seq) {
                return true;
            }
            queue.last_seq = Some(frame.seq);
            queue.frames.push_back(frame);
            if queue.frames.len() > self.capacity {
                queue.frames.pop_front();
                queue.dropped += 1;
            }
        }
        self.notify.notify_one();
        true
    }

    /// Wait for frames and take everything queued, oldest first
    ///
    /// Returns `None` once the outbox is closed and drained.
    pub async fn recv(&self) -> Option<Vec<LiveFrame>> {
        loop {
            if let Some(frames) = self.drain() {
                return Some(frames);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn drain(&self) -> Option<Vec<LiveFrame>> {
        let mut state = self.state.lock();
        let mut out = Vec::new();
        for queue in state.queues.values_mut() {
            let dropped = std::mem::take(&mut queue.dropped);
            let start = out.len();
            out.extend(queue.frames.drain(..));
            if dropped > 0 {
                if let Some(first) = out.get_mut(start) {
                    first.dropped = Some(dropped);
                }
            }
        }
        if out.is_empty() {
            return None;
        }
        out.sort_by_key(|f| f.seq);
        Some(out)
    }

    /// Stop accepting frames and wake the consumer
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Discard the queue of a path that is no longer subscribed
    pub fn remove_path(&self, path: &str) {
        self.state.lock().queues.remove(path);
    }

    /// Number of frames waiting
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .queues
            .values()
            .map(|q| q.frames.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchable::{Agent, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(seq: u64, path: &str, value: i64) -> LiveFrame {
        LiveFrame {
            seq,
            path: path.to_string(),
            value: Value::Int(value),
            old_value: Value::Int(value - 1),
            timestamp: 0,
            agent: Agent::App,
            dropped: None,
        }
    }

    #[tokio::test]
    async fn test_fifo_across_paths() {
        let outbox = Outbox::new(8);
        outbox.push(frame(1, "/a", 1));
        outbox.push(frame(2, "/b", 1));
        outbox.push(frame(3, "/a", 2));

        let frames = outbox.recv().await.unwrap();
        let seqs: Vec<u64> = frames.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(outbox.pending(), 0);
    }

    #[tokio::test]
    async fn test_drop_oldest_when_full() {
        let outbox = Outbox::new(2);
        for seq in 1..=5 {
            outbox.push(frame(seq, "/a", seq as i64));
        }
        let frames = outbox.recv().await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].value, Value::Int(4));
        assert_eq!(frames[0].dropped, Some(3));
        assert_eq!(frames[1].value, Value::Int(5));
        assert_eq!(frames[1].dropped, None);
    }

    #[tokio::test]
    async fn test_queues_are_per_path() {
        let outbox = Outbox::new(1);
        outbox.push(frame(1, "/a", 1));
        outbox.push(frame(2, "/b", 1));
        let frames = outbox.recv().await.unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.dropped.is_none()));
    }

    #[test]
    fn test_stale_frame_skipped() {
        let outbox = Outbox::new(4);
        outbox.push(frame(5, "/a", 5));
        assert!(outbox.push(frame(4, "/a", 4)));
        assert_eq!(outbox.pending(), 1);
    }

    #[tokio::test]
    async fn test_recv_waits_for_push() {
        let outbox = Arc::new(Outbox::new(4));
        let producer = Arc::clone(&outbox);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(frame(1, "/a", 1));
        });

        let frames = tokio::time::timeout(Duration::from_secs(1), outbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_recv() {
        let outbox = Outbox::new(4);
        outbox.push(frame(1, "/a", 1));
        outbox.close();
        assert!(!outbox.push(frame(2, "/a", 2)));

        // queued frames are still handed out before the end
        assert_eq!(outbox.recv().await.map(|f| f.len()), Some(1));
        assert!(outbox.recv().await.is_none());
    }

    #[test]
    fn test_remove_path() {
        let outbox = Outbox::new(4);
        outbox.push(frame(1, "/a", 1));
        outbox.push(frame(2, "/b", 1));
        outbox.remove_path("/a");
        assert_eq!(outbox.pending(), 1);
    }
}
