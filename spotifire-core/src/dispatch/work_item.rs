//! A typed event bound to the handler that will receive it.

use std::fmt;
use std::sync::{mpsc, Arc, Weak};

/// Receiver of events raised by native callbacks.
///
/// `deliver` always runs on the session's dispatch thread, never on the native
/// callback thread, so it may take the native call gate.
pub trait EventTarget: Send + Sync + 'static {
    /// Payload type, usually an enum with one variant per callback.
    type Event: Send + 'static;

    fn deliver(&self, event: Self::Event) -> anyhow::Result<()>;
}

/// One deferred delivery, created on the native thread and consumed in
/// enqueue order by the dispatch thread.
///
/// Holds the target weakly: if the target is gone by the time the item is
/// dequeued, the event is swallowed.
pub struct EventWorkItem {
    seq: u64,
    event: &'static str,
    job: Box<dyn Deliver>,
}

pub(crate) enum Delivery {
    Handled(anyhow::Result<()>),
    TargetGone,
    Barrier,
}

trait Deliver: Send {
    fn deliver(self: Box<Self>) -> Delivery;
}

struct Targeted<T: EventTarget> {
    target: Weak<T>,
    event: T::Event,
}

impl<T: EventTarget> Deliver for Targeted<T> {
    fn deliver(self: Box<Self>) -> Delivery {
        let Targeted { target, event } = *self;
        match target.upgrade() {
            Some(target) => Delivery::Handled(target.deliver(event)),
            None => Delivery::TargetGone,
        }
    }
}

struct Barrier(mpsc::Sender<()>);

impl Deliver for Barrier {
    fn deliver(self: Box<Self>) -> Delivery {
        let _ = self.0.send(());
        Delivery::Barrier
    }
}

impl EventWorkItem {
    /// Bind `event` to `target`.
    pub fn new<T: EventTarget>(target: &Arc<T>, event: T::Event) -> Self {
        Self::for_weak(Arc::downgrade(target), event)
    }

    /// Bind `event` to a target that may already be gone.
    pub fn for_weak<T: EventTarget>(target: Weak<T>, event: T::Event) -> Self {
        Self {
            seq: 0,
            event: std::any::type_name::<T::Event>(),
            job: Box::new(Targeted { target, event }),
        }
    }

    /// Item that signals `tx` once everything queued before it is delivered.
    pub(crate) fn barrier(tx: mpsc::Sender<()>) -> Self {
        Self {
            seq: 0,
            event: "barrier",
            job: Box::new(Barrier(tx)),
        }
    }

    /// Position in the session queue; 0 until enqueued.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Type name of the payload, for logs.
    pub fn event_name(&self) -> &'static str {
        self.event
    }

    pub(crate) fn sequenced(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub(crate) fn deliver(self) -> Delivery {
        self.job.deliver()
    }
}

impl fmt::Debug for EventWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWorkItem")
            .field("seq", &self.seq)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}
