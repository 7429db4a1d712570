//! Best-effort evidence offload.
//!
//! `UploadQueue` is a bounded queue drained by one background worker. The
//! render thread enqueues with `try_enqueue`, which never blocks: a full queue
//! rejects the frame. The worker encodes each frame, hands it to a
//! `Notifier`, logs the outcome and discards the item either way.
//!
//! Delivery is not guaranteed:
//! - no retry, no backoff, no dead-letter queue
//! - frames still queued at shutdown are discarded
//! - nothing is persisted across restarts

mod encode;
mod notifier;

pub use encode::{FrameEncoder, JpegFrameEncoder, DEFAULT_JPEG_QUALITY};
pub use notifier::{
    multipart_body, Delivery, HttpNotifier, Notifier, DEFAULT_UPLOAD_TIMEOUT, UPLOAD_FIELD,
    UPLOAD_FILENAME,
};

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::frame::Frame;

pub const DEFAULT_UPLOAD_CAPACITY: usize = 10;
/// Worker wait between shutdown checks while the queue is empty.
pub const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Owned copy of a frame taken at alert time.
pub struct UploadItem {
    frame: Frame,
    enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct UploadCounters {
    enqueued: AtomicU64,
    dropped_full: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    encode_failed: AtomicU64,
    discarded: AtomicU64,
}

impl UploadCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> UploadStats {
        UploadStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            encode_failed: self.encode_failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time upload counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub enqueued: u64,
    /// Rejected by `try_enqueue` because the queue was full.
    pub dropped_full: u64,
    pub delivered: u64,
    /// Notifier reported failure.
    pub failed: u64,
    pub encode_failed: u64,
    /// Still queued when the worker stopped.
    pub discarded: u64,
}

impl UploadStats {
    /// Items the worker has finished with, whatever the outcome.
    pub fn completed(&self) -> u64 {
        self.delivered + self.failed + self.encode_failed
    }
}

/// Cloneable producer side of an `UploadQueue`.
#[derive(Clone)]
pub struct UploadSender {
    tx: SyncSender<UploadItem>,
    counters: Arc<UploadCounters>,
}

impl UploadSender {
    /// Queue `frame` without blocking. Returns false if the queue is full or
    /// the worker is gone; the queue is left unchanged in that case.
    pub fn try_enqueue(&self, frame: Frame) -> bool {
        let item = UploadItem {
            frame,
            enqueued_at: Instant::now(),
        };
        match self.tx.try_send(item) {
            Ok(()) => {
                UploadCounters::bump(&self.counters.enqueued);
                true
            }
            Err(TrySendError::Full(_)) => {
                UploadCounters::bump(&self.counters.dropped_full);
                log::debug!("upload queue full; evidence frame dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn stats(&self) -> UploadStats {
        self.counters.snapshot()
    }
}

/// Bounded upload queue and its worker thread.
pub struct UploadQueue {
    sender: UploadSender,
    capacity: usize,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl UploadQueue {
    pub fn start<E, N>(capacity: usize, encoder: E, notifier: N) -> Result<Self>
    where
        E: FrameEncoder + 'static,
        N: Notifier + 'static,
    {
        Self::start_with_idle_timeout(capacity, WORKER_IDLE_TIMEOUT, encoder, notifier)
    }

    pub fn start_with_idle_timeout<E, N>(
        capacity: usize,
        idle_timeout: Duration,
        encoder: E,
        notifier: N,
    ) -> Result<Self>
    where
        E: FrameEncoder + 'static,
        N: Notifier + 'static,
    {
        if capacity == 0 {
            return Err(anyhow!("upload queue capacity must be >= 1"));
        }
        let (tx, rx) = mpsc::sync_channel(capacity);
        let counters = Arc::new(UploadCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            rx,
            encoder: Box::new(encoder),
            notifier: Box::new(notifier),
            counters: counters.clone(),
            shutdown: shutdown.clone(),
            idle_timeout,
        };
        let join = std::thread::Builder::new()
            .name("upload-worker".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            sender: UploadSender { tx, counters },
            capacity,
            shutdown,
            worker: Some(join),
        })
    }

    pub fn try_enqueue(&self, frame: Frame) -> bool {
        self.sender.try_enqueue(frame)
    }

    pub fn sender(&self) -> UploadSender {
        self.sender.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> UploadStats {
        self.sender.stats()
    }

    /// Signal the worker and wait for it. An upload in flight completes first;
    /// anything still queued is discarded.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.worker.take() {
            join.join().map_err(|_| anyhow!("upload worker thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

struct Worker {
    rx: Receiver<UploadItem>,
    encoder: Box<dyn FrameEncoder>,
    notifier: Box<dyn Notifier>,
    counters: Arc<UploadCounters>,
    shutdown: Arc<AtomicBool>,
    idle_timeout: Duration,
}

impl Worker {
    fn run(mut self) {
        log::info!("upload worker started; endpoint={}", self.notifier.endpoint());
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.rx.recv_timeout(self.idle_timeout) {
                Ok(item) => self.handle(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let discarded = self.rx.try_iter().count() as u64;
        if discarded > 0 {
            self.counters.discarded.fetch_add(discarded, Ordering::Relaxed);
            log::info!("upload worker stopping; discarded {} queued frames", discarded);
        }
        log::debug!("upload worker stopped");
    }

    fn handle(&mut self, item: UploadItem) {
        let digest = item.frame.digest_hex();
        let image = match self.encoder.encode(&item.frame) {
            Ok(image) => image,
            Err(err) => {
                UploadCounters::bump(&self.counters.encode_failed);
                log::warn!("evidence frame {} encode failed: {:#}", digest, err);
                return;
            }
        };
        drop(item.frame);

        let outcome = self.notifier.deliver(&image, self.encoder.content_type());
        let endpoint = self.notifier.endpoint();
        match outcome {
            Ok(delivery) => {
                UploadCounters::bump(&self.counters.delivered);
                log::info!(
                    "evidence frame {} uploaded to {} ({} bytes, queued {} ms): {}",
                    digest,
                    endpoint,
                    image.len(),
                    item.enqueued_at.elapsed().as_millis(),
                    delivery.body
                );
            }
            Err(err) => {
                UploadCounters::bump(&self.counters.failed);
                log::warn!("evidence frame {} upload to {} failed: {:#}", digest, endpoint, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Encodes a frame as its first pixel byte; byte 0 fails.
    struct FirstByteEncoder;

    impl FrameEncoder for FirstByteEncoder {
        fn content_type(&self) -> &'static str {
            "application/octet-stream"
        }

        fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
            match frame.pixels()[0] {
                0 => Err(anyhow!("unencodable frame")),
                b => Ok(vec![b]),
            }
        }
    }

    struct ScriptedNotifier {
        statuses: VecDeque<u16>,
        accepted: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Notifier for ScriptedNotifier {
        fn endpoint(&self) -> &str {
            "scripted://"
        }

        fn deliver(&mut self, image: &[u8], _content_type: &str) -> Result<Delivery> {
            let status = self.statuses.pop_front().unwrap_or(200);
            if status != 200 {
                return Err(anyhow!("server returned status {}", status));
            }
            self.accepted.lock().unwrap().push(image.to_vec());
            Ok(Delivery {
                status,
                body: json!({"status": "ok"}),
            })
        }
    }

    /// Reports each delivery start, then blocks until released.
    struct GateNotifier {
        started: mpsc::Sender<()>,
        release: Receiver<()>,
    }

    impl Notifier for GateNotifier {
        fn endpoint(&self) -> &str {
            "gate://"
        }

        fn deliver(&mut self, _image: &[u8], _content_type: &str) -> Result<Delivery> {
            let _ = self.started.send(());
            self.release.recv().map_err(|_| anyhow!("gate dropped"))?;
            Ok(Delivery {
                status: 200,
                body: json!({}),
            })
        }
    }

    fn frame(byte: u8) -> Frame {
        Frame::new(vec![byte; 12], 2, 2).unwrap()
    }

    fn wait_for(queue: &UploadQueue, done: impl Fn(&UploadStats) -> bool) -> UploadStats {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let stats = queue.stats();
            if done(&stats) || Instant::now() > deadline {
                return stats;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn scripted(statuses: &[u16]) -> (ScriptedNotifier, Arc<Mutex<Vec<Vec<u8>>>>) {
        let accepted = Arc::new(Mutex::new(Vec::new()));
        let notifier = ScriptedNotifier {
            statuses: statuses.iter().copied().collect(),
            accepted: accepted.clone(),
        };
        (notifier, accepted)
    }

    #[test]
    fn failed_then_successful_delivery() {
        let (notifier, accepted) = scripted(&[500, 200]);
        let queue = UploadQueue::start_with_idle_timeout(
            DEFAULT_UPLOAD_CAPACITY,
            Duration::from_millis(20),
            FirstByteEncoder,
            notifier,
        )
        .unwrap();

        assert!(queue.try_enqueue(frame(b'A')));
        assert!(queue.try_enqueue(frame(b'B')));
        let stats = wait_for(&queue, |s| s.completed() == 2);

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(*accepted.lock().unwrap(), vec![vec![b'B']]);
        queue.stop().unwrap();
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let queue = UploadQueue::start_with_idle_timeout(
            2,
            Duration::from_millis(20),
            FirstByteEncoder,
            GateNotifier {
                started: started_tx,
                release: release_rx,
            },
        )
        .unwrap();

        // First item moves into the worker and parks there.
        assert!(queue.try_enqueue(frame(1)));
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker picked up first item");

        assert!(queue.try_enqueue(frame(2)));
        assert!(queue.try_enqueue(frame(3)));
        let started = Instant::now();
        assert!(!queue.try_enqueue(frame(4)));
        assert!(started.elapsed() < Duration::from_millis(500));

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.dropped_full, 1);

        for _ in 0..3 {
            release_tx.send(()).unwrap();
        }
        let stats = wait_for(&queue, |s| s.completed() == 3);
        assert_eq!(stats.delivered, 3);
        queue.stop().unwrap();
    }

    #[test]
    fn encode_failure_does_not_stop_worker() {
        let (notifier, accepted) = scripted(&[]);
        let queue = UploadQueue::start_with_idle_timeout(
            4,
            Duration::from_millis(20),
            FirstByteEncoder,
            notifier,
        )
        .unwrap();

        assert!(queue.try_enqueue(frame(0)));
        assert!(queue.try_enqueue(frame(9)));
        let stats = wait_for(&queue, |s| s.completed() == 2);

        assert_eq!(stats.encode_failed, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(*accepted.lock().unwrap(), vec![vec![9]]);
        queue.stop().unwrap();
    }

    #[test]
    fn stop_returns_within_idle_timeout() {
        let (notifier, _) = scripted(&[]);
        let queue = UploadQueue::start_with_idle_timeout(
            1,
            Duration::from_millis(50),
            FirstByteEncoder,
            notifier,
        )
        .unwrap();
        let started = Instant::now();
        queue.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn stop_finishes_in_flight_upload_and_discards_queued() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let queue = UploadQueue::start_with_idle_timeout(
            4,
            Duration::from_millis(20),
            FirstByteEncoder,
            GateNotifier {
                started: started_tx,
                release: release_rx,
            },
        )
        .unwrap();
        let sender = queue.sender();

        assert!(queue.try_enqueue(frame(1)));
        assert!(queue.try_enqueue(frame(2)));
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker picked up first item");

        // Release the parked delivery only after stop() has raised the flag.
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            let _ = release_tx.send(());
        });
        queue.stop().unwrap();
        releaser.join().unwrap();

        let stats = sender.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.discarded, 1);
        assert!(!sender.try_enqueue(frame(3)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let (notifier, _) = scripted(&[]);
        assert!(UploadQueue::start(0, FirstByteEncoder, notifier).is_err());
    }
}
