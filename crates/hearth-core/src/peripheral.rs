use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::bridge::EventSender;
use crate::event::{tags, Event, Value};

/// Capability-set interface for attached devices. Device behavior lives
/// with the implementor; the core only routes calls, drives periodic
/// updates, and announces attachment changes on the event queue.
pub trait Peripheral: Send {
    fn type_name(&self) -> &str;

    fn call(&mut self, method: &str, args: &[Value]) -> Result<Vec<Value>, String>;

    /// Periodic housekeeping driven by [`spawn_ticker`].
    fn update(&mut self) {}

    fn list_methods(&self) -> Vec<String>;
}

/// Devices keyed by side name. Attach and detach surface to the guest as
/// `"peripheral"` / `"peripheral_detach"` events carrying the side.
pub struct PeripheralRegistry {
    sender: EventSender,
    slots: Mutex<BTreeMap<String, Box<dyn Peripheral>>>,
}

impl PeripheralRegistry {
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender,
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Box<dyn Peripheral>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False if the side is already occupied.
    pub fn attach(&self, side: impl Into<String>, peripheral: Box<dyn Peripheral>) -> bool {
        let side = side.into();
        {
            let mut slots = self.lock();
            if slots.contains_key(&side) {
                return false;
            }
            slots.insert(side.clone(), peripheral);
        }
        self.sender
            .send(Event::new(tags::PERIPHERAL, vec![Value::Str(side)]));
        true
    }

    pub fn detach(&self, side: &str) -> bool {
        let removed = self.lock().remove(side).is_some();
        if removed {
            self.sender.send(Event::new(
                tags::PERIPHERAL_DETACH,
                vec![Value::Str(side.to_string())],
            ));
        }
        removed
    }

    pub fn is_present(&self, side: &str) -> bool {
        self.lock().contains_key(side)
    }

    pub fn sides(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn type_of(&self, side: &str) -> Option<String> {
        self.lock().get(side).map(|p| p.type_name().to_string())
    }

    pub fn methods(&self, side: &str) -> Option<Vec<String>> {
        self.lock().get(side).map(|p| p.list_methods())
    }

    pub fn call(&self, side: &str, method: &str, args: &[Value]) -> Result<Vec<Value>, String> {
        let mut slots = self.lock();
        let Some(peripheral) = slots.get_mut(side) else {
            return Err(format!("{side}: No peripheral attached"));
        };
        peripheral.call(method, args)
    }

    /// One update pass over every device. False once the machine is gone,
    /// which is the ticker's cue to stop.
    pub fn update_all(&self) -> bool {
        for peripheral in self.lock().values_mut() {
            peripheral.update();
        }
        self.sender.is_live()
    }
}

/// Drives `update()` on every registered peripheral at a fixed cadence
/// until the machine shuts down.
pub fn spawn_ticker(
    registry: Arc<PeripheralRegistry>,
    period: Duration,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("hearth-periph".to_string())
        .spawn(move || loop {
            thread::sleep(period);
            if !registry.update_all() {
                return;
            }
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Peripheral, PeripheralRegistry};
    use crate::bridge::EventSender;
    use crate::event::{tags, Value};
    use crate::queue::EventQueue;

    struct Counter {
        ticks: u32,
    }

    impl Peripheral for Counter {
        fn type_name(&self) -> &str {
            "counter"
        }

        fn call(&mut self, method: &str, _args: &[Value]) -> Result<Vec<Value>, String> {
            match method {
                "ticks" => Ok(vec![Value::Int(self.ticks as i64)]),
                other => Err(format!("counter: no method {other}")),
            }
        }

        fn update(&mut self) {
            self.ticks += 1;
        }

        fn list_methods(&self) -> Vec<String> {
            vec!["ticks".to_string()]
        }
    }

    #[test]
    fn attach_detach_announce_on_the_queue() {
        let queue = Arc::new(EventQueue::new());
        let registry = PeripheralRegistry::new(EventSender::new(Arc::clone(&queue)));

        assert!(registry.attach("left", Box::new(Counter { ticks: 0 })));
        assert!(!registry.attach("left", Box::new(Counter { ticks: 0 })));
        assert!(registry.is_present("left"));
        assert_eq!(registry.type_of("left").as_deref(), Some("counter"));

        registry.update_all();
        registry.update_all();
        let result = registry.call("left", "ticks", &[]).unwrap();
        assert_eq!(result, vec![Value::Int(2)]);
        assert!(registry.call("left", "nope", &[]).is_err());
        assert!(registry.call("top", "ticks", &[]).is_err());

        assert!(registry.detach("left"));
        assert!(!registry.detach("left"));

        let attach_ev = queue.try_pop().unwrap();
        assert_eq!(attach_ev.tag, tags::PERIPHERAL);
        assert_eq!(attach_ev.payload, vec![Value::Str("left".to_string())]);
        let detach_ev = queue.try_pop().unwrap();
        assert_eq!(detach_ev.tag, tags::PERIPHERAL_DETACH);
    }
}
