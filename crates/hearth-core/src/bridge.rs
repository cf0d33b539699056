use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::event::Event;
use crate::queue::{EventQueue, RunSignal};

/// Producer-side handle onto the event queue. Clone freely and hand one to
/// every async subsystem; producers never see the guest or the scheduler.
///
/// Handles stay valid across a machine restart but go dead: the old queue's
/// signal has left `Running`, so every send is refused and the result is
/// silently dropped. That is the documented fate of work that completes
/// after shutdown.
#[derive(Clone)]
pub struct EventSender {
    queue: Arc<EventQueue>,
}

impl EventSender {
    pub(crate) fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    /// Enqueues an already-built event. Returns whether it was accepted.
    pub fn send(&self, event: Event) -> bool {
        self.queue.push(event)
    }

    /// Invokes `produce` exactly once, synchronously, at enqueue time, and
    /// appends its event. `produce` must only build plain data. A panicking
    /// producer loses its event, not the process.
    pub fn send_with<F>(&self, produce: F) -> bool
    where
        F: FnOnce() -> Event,
    {
        if self.queue.signal() != RunSignal::Running {
            return false;
        }
        match catch_unwind(AssertUnwindSafe(produce)) {
            Ok(event) => self.queue.push(event),
            Err(_) => {
                log::warn!("event producer panicked; dropping its event");
                false
            }
        }
    }

    /// False once the machine this sender fed has shut down or restarted.
    pub fn is_live(&self) -> bool {
        self.queue.signal() == RunSignal::Running
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::EventSender;
    use crate::event::Event;
    use crate::queue::{EventQueue, RunSignal};

    #[test]
    fn send_with_builds_at_enqueue_time() {
        let queue = Arc::new(EventQueue::new());
        let sender = EventSender::new(Arc::clone(&queue));
        assert!(sender.send_with(|| Event::tagged("built")));
        assert_eq!(queue.try_pop().unwrap().tag, "built");
    }

    #[test]
    fn send_refused_after_shutdown() {
        let queue = Arc::new(EventQueue::new());
        let sender = EventSender::new(Arc::clone(&queue));
        queue.set_signal(RunSignal::Shutdown);
        assert!(!sender.is_live());
        assert!(!sender.send(Event::tagged("late")));
        assert!(!sender.send_with(|| Event::tagged("later")));
        assert!(queue.is_empty());
    }

    #[test]
    fn panicking_producer_drops_only_its_event() {
        let queue = Arc::new(EventQueue::new());
        let sender = EventSender::new(Arc::clone(&queue));
        assert!(!sender.send_with(|| panic!("producer bug")));
        assert!(queue.is_empty());
        assert!(sender.send(Event::tagged("after")));
        assert_eq!(queue.len(), 1);
    }
}
