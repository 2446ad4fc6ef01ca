//! Background image write queue.
//!
//! PNG encoding is the slowest per-question step; queueing it on a small
//! thread pool lets the pipeline move to the next question while the
//! previous composite is still being encoded. Each queued item owns its
//! image and target path outright, so workers never read pipeline state.
//! `regions.json` and the JSONL append stay synchronous.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

use image::GrayImage;
use tracing::error;

use crate::error::{ExtractError, Result};

use super::writer::write_png_atomic;

#[derive(Default)]
struct QueueState {
    pending: usize,
    failures: Vec<String>,
}

/// Bounded-worker queue for composite and mark-scheme image writes.
pub struct WriteQueue {
    pool: rayon::ThreadPool,
    state: Arc<(Mutex<QueueState>, Condvar)>,
}

impl WriteQueue {
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("qslice-write-{i}"))
            .build()
            .map_err(|e| ExtractError::WriteQueue(e.to_string()))?;
        Ok(Self {
            pool,
            state: Arc::new((Mutex::new(QueueState::default()), Condvar::new())),
        })
    }

    /// Queues one atomic PNG write. The image is moved to the worker.
    pub fn queue_png(&self, image: GrayImage, path: PathBuf) {
        {
            let (lock, _) = &*self.state;
            lock.lock().unwrap_or_else(|e| e.into_inner()).pending += 1;
        }
        let state = Arc::clone(&self.state);
        self.pool.spawn(move || {
            let outcome = write_png_atomic(&image, &path);
            let (lock, cvar) = &*state;
            let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = outcome {
                error!(path = %path.display(), error = %e, "background image write failed");
                guard.failures.push(format!("{}: {e}", path.display()));
            }
            guard.pending -= 1;
            cvar.notify_all();
        });
    }

    /// Blocks until every queued write has finished. Returns the failure
    /// messages accumulated since the last drain.
    pub fn wait_all(&self) -> Vec<String> {
        let (lock, cvar) = &*self.state;
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        while guard.pending > 0 {
            guard = cvar.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        std::mem::take(&mut guard.failures)
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        let failures = self.wait_all();
        for failure in failures {
            error!(%failure, "write failed during queue shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn writes_complete_before_wait_returns() {
        let dir = tempfile::tempdir().unwrap();
        let queue = WriteQueue::new(2).unwrap();
        for i in 0..6 {
            let image = GrayImage::from_pixel(20, 20, Luma([i * 40]));
            queue.queue_png(image, dir.path().join(format!("img_{i}.png")));
        }
        let failures = queue.wait_all();
        assert!(failures.is_empty());
        for i in 0..6 {
            assert!(dir.path().join(format!("img_{i}.png")).exists());
        }
    }

    #[test]
    fn failures_are_reported_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("not-a-dir");
        std::fs::write(&blocked, b"file in the way").unwrap();
        let queue = WriteQueue::new(1).unwrap();
        queue.queue_png(
            GrayImage::from_pixel(4, 4, Luma([0])),
            blocked.join("img.png"),
        );
        let failures = queue.wait_all();
        assert_eq!(failures.len(), 1);
    }
}
