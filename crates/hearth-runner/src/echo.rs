use hearth_core::{tags, Event, GuestTask, Machine, Resume};

/// Smoke-test guest: echoes every event it is handed to stdout, shuts the
/// machine down on `"terminate"`, and optionally returns after a fixed
/// number of events. Stands in for a real language runtime when exercising
/// the scheduler end to end.
pub struct EchoGuest {
    limit: Option<u64>,
    seen: u64,
}

impl EchoGuest {
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, seen: 0 }
    }
}

impl GuestTask for EchoGuest {
    fn resume(&mut self, machine: &Machine, event: Option<&Event>) -> Resume {
        let Some(event) = event else {
            // First entry: announce and ask for the first event.
            let label = machine.label().unwrap_or_else(|| "hearth".to_string());
            println!("{label} ready");
            return Resume::Yield { filter: None };
        };
        if event.tag == tags::TERMINATE {
            return Resume::ShutdownRequested;
        }
        let payload = serde_json::to_string(&event.payload).unwrap_or_else(|_| "[]".to_string());
        println!("{} {payload}", event.tag);
        self.seen += 1;
        if let Some(limit) = self.limit {
            if self.seen >= limit {
                return Resume::Returned;
            }
        }
        Resume::Yield { filter: None }
    }
}
