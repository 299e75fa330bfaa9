//! Callback dispatch queue.
//!
//! Native callbacks arrive on the library's own thread, possibly while another
//! thread is blocked inside the library holding the gate. Running consumer
//! code there could re-enter the library and deadlock, so callbacks only wrap
//! their arguments in an [`EventWorkItem`] and [`enqueue`](DispatchQueue::enqueue)
//! it. A dedicated thread per session delivers the items in FIFO order.

mod work_item;

pub use work_item::{EventTarget, EventWorkItem};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::{CoreError, Result};
use work_item::Delivery;

/// Delivery counters for one session queue.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchStats {
    /// Items whose handler ran and succeeded.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Items whose handler returned an error or panicked.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    /// Items swallowed because the target was gone or the queue was abandoned.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }
}

/// Single-consumer FIFO queue plus the thread that drains it.
pub(crate) struct DispatchQueue {
    /// Sequence counter and sender share a lock so seq order is send order.
    sender: Mutex<Option<(u64, mpsc::UnboundedSender<EventWorkItem>)>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    abandon: Arc<AtomicBool>,
    stats: Arc<DispatchStats>,
}

impl DispatchQueue {
    pub(crate) fn start(config: &SessionConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let abandon = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(DispatchStats::default());

        let worker = thread::Builder::new()
            .name(config.dispatch_thread_name.clone())
            .spawn({
                let abandon = Arc::clone(&abandon);
                let stats = Arc::clone(&stats);
                let catch_panics = config.catch_handler_panics;
                move || run(rx, &abandon, &stats, catch_panics)
            })
            .map_err(CoreError::DispatchSpawn)?;
        let worker_id = worker.thread().id();

        Ok(Self {
            sender: Mutex::new(Some((0, tx))),
            worker: Mutex::new(Some(worker)),
            worker_id,
            abandon,
            stats,
        })
    }

    /// Queue `item` behind everything already enqueued. Never blocks on
    /// delivery, so it is safe to call from the native callback thread.
    pub(crate) fn enqueue(&self, item: EventWorkItem) -> Result<u64> {
        let mut sender = self.sender.lock();
        let Some((next_seq, tx)) = sender.as_mut() else {
            return Err(CoreError::SessionClosed);
        };
        *next_seq += 1;
        let seq = *next_seq;
        tx.send(item.sequenced(seq))
            .map_err(|_| CoreError::SessionClosed)?;
        Ok(seq)
    }

    /// Block until every item enqueued before this call has been delivered.
    pub(crate) fn flush(&self) -> Result<()> {
        if self.is_dispatch_thread() {
            return Err(CoreError::ReentrantFlush);
        }
        let (tx, rx) = std_mpsc::channel();
        self.enqueue(EventWorkItem::barrier(tx))?;
        rx.recv().map_err(|_| CoreError::SessionClosed)
    }

    pub(crate) fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub(crate) fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Stop accepting items and wait for the thread to finish. With `drain`
    /// the remaining items are delivered first, otherwise they are dropped.
    pub(crate) fn close(&self, drain: bool) {
        if !drain {
            self.abandon.store(true, Ordering::Release);
        }
        drop(self.sender.lock().take());

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if self.is_dispatch_thread() {
            tracing::debug!("dispatch queue closed from its own thread, not joining");
            return;
        }
        if worker.join().is_err() {
            tracing::warn!("dispatch thread panicked");
        }
    }
}

fn run(
    mut rx: mpsc::UnboundedReceiver<EventWorkItem>,
    abandon: &AtomicBool,
    stats: &DispatchStats,
    catch_panics: bool,
) {
    tracing::debug!("dispatch thread started");
    while let Some(item) = rx.blocking_recv() {
        let seq = item.seq();
        let event = item.event_name();

        if abandon.load(Ordering::Acquire) {
            stats.dropped.fetch_add(1, Ordering::AcqRel);
            tracing::trace!(seq, event, "queue abandoned, dropping event");
            continue;
        }

        let outcome = if catch_panics {
            catch_unwind(AssertUnwindSafe(move || item.deliver())).unwrap_or_else(|panic| {
                Delivery::Handled(Err(anyhow::anyhow!(
                    "handler panicked: {}",
                    panic_message(&*panic)
                )))
            })
        } else {
            item.deliver()
        };

        match outcome {
            Delivery::Handled(Ok(())) => {
                stats.delivered.fetch_add(1, Ordering::AcqRel);
                tracing::trace!(seq, event, "event delivered");
            }
            Delivery::Handled(Err(err)) => {
                stats.failed.fetch_add(1, Ordering::AcqRel);
                let failure = CoreError::DispatchHandlerFailure {
                    seq,
                    event,
                    reason: format!("{err:#}"),
                };
                tracing::error!(error = %failure, "event handler failed, continuing");
            }
            Delivery::TargetGone => {
                stats.dropped.fetch_add(1, Ordering::AcqRel);
                tracing::trace!(seq, event, "target disposed, event swallowed");
            }
            Delivery::Barrier => {}
        }
    }
    tracing::debug!("dispatch thread stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
