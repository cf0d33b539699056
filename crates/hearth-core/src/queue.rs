use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::event::Event;

/// Run signal shared between the consumer loop and every producer handle.
/// Anything other than `Running` makes `next_event` return immediately and
/// producer pushes get refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    Running,
    Shutdown,
    Restart,
}

struct State {
    events: VecDeque<Event>,
    signal: RunSignal,
}

/// FIFO of events plus the run signal, behind one mutex. The only structure
/// shared between producer threads and the consumer loop; the producer-side
/// critical section is a single push.
pub struct EventQueue {
    state: Mutex<State>,
    wake: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                events: VecDeque::new(),
                signal: RunSignal::Running,
            }),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Payloads are plain data; a poisoned lock still holds a consistent
        // queue, so recover rather than take the whole machine down.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event. Returns false (and drops the event) once the run
    /// signal has left `Running`.
    pub fn push(&self, event: Event) -> bool {
        let mut st = self.lock();
        if st.signal != RunSignal::Running {
            return false;
        }
        st.events.push_back(event);
        self.wake.notify_all();
        true
    }

    pub fn try_pop(&self) -> Option<Event> {
        self.lock().events.pop_front()
    }

    /// Blocks until the queue is non-empty, the run signal changes, or
    /// `timeout` elapses.
    pub fn wait(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        while st.events.is_empty() && st.signal == RunSignal::Running {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let (guard, res) = self
                .wake
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            st = guard;
            if res.timed_out() {
                return;
            }
        }
    }

    pub fn signal(&self) -> RunSignal {
        self.lock().signal
    }

    pub fn set_signal(&self, signal: RunSignal) {
        let mut st = self.lock();
        st.signal = signal;
        self.wake.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{EventQueue, RunSignal};
    use crate::event::Event;

    #[test]
    fn dequeue_order_matches_enqueue_order() {
        let q = EventQueue::new();
        assert!(q.push(Event::tagged("a")));
        assert!(q.push(Event::tagged("b")));
        assert!(q.push(Event::tagged("c")));
        assert_eq!(q.try_pop().unwrap().tag, "a");
        assert_eq!(q.try_pop().unwrap().tag, "b");
        assert_eq!(q.try_pop().unwrap().tag, "c");
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn push_refused_after_shutdown() {
        let q = EventQueue::new();
        q.set_signal(RunSignal::Shutdown);
        assert!(!q.push(Event::tagged("late")));
        assert!(q.is_empty());
    }

    #[test]
    fn wait_wakes_on_push_from_another_thread() {
        let q = Arc::new(EventQueue::new());
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                q.push(Event::tagged("ping"));
            })
        };
        let start = Instant::now();
        q.wait(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(q.try_pop().unwrap().tag, "ping");
        producer.join().unwrap();
    }

    #[test]
    fn wait_wakes_on_signal_change() {
        let q = Arc::new(EventQueue::new());
        let stopper = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                q.set_signal(RunSignal::Shutdown);
            })
        };
        let start = Instant::now();
        q.wait(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }
}
