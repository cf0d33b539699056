use std::time::Instant;

/// Index-addressed countdown timers. A timer's id is its slot index, so slots
/// are never shifted: cancelling the last slot truncates, cancelling any
/// earlier slot leaves a tombstone (`None`). Trailing tombstones are popped
/// lazily, one per sweep, which is the only way an id is ever reissued.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    slots: Vec<Option<Instant>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn start(&mut self, deadline: Instant) -> usize {
        self.slots.push(Some(deadline));
        self.slots.len() - 1
    }

    pub fn cancel(&mut self, id: usize) {
        if id + 1 == self.slots.len() {
            self.slots.pop();
        } else if let Some(slot) = self.slots.get_mut(id) {
            *slot = None;
        }
    }

    /// Fires every timer whose deadline has passed: tombstones the slot and
    /// returns its id. Also drops at most one trailing tombstone.
    pub fn sweep(&mut self, now: Instant) -> Vec<usize> {
        if matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        let mut fired = Vec::new();
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if let Some(deadline) = *slot {
                if now >= deadline {
                    fired.push(id);
                    *slot = None;
                }
            }
        }
        fired
    }

    pub fn nearest(&self) -> Option<Instant> {
        self.slots.iter().flatten().copied().min()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Wall-clock alarms, same slot discipline as [`TimerRegistry`]. The target
/// is a time of day in fractional hours (`0.0..24.0`); an alarm fires when
/// the current time of day compares exactly equal to its target at sweep
/// time. Sweeps that skip the matching second miss the alarm entirely; this
/// mirrors the system being emulated and is intentionally not a threshold
/// comparison.
#[derive(Debug, Default)]
pub struct AlarmRegistry {
    slots: Vec<Option<f64>>,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn set(&mut self, time_of_day: f64) -> usize {
        self.slots.push(Some(time_of_day));
        self.slots.len() - 1
    }

    pub fn cancel(&mut self, id: usize) {
        if id + 1 == self.slots.len() {
            self.slots.pop();
        } else if let Some(slot) = self.slots.get_mut(id) {
            *slot = None;
        }
    }

    pub fn sweep(&mut self, time_of_day: f64) -> Vec<usize> {
        if matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        let mut fired = Vec::new();
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if let Some(target) = *slot {
                if time_of_day == target {
                    fired.push(id);
                    *slot = None;
                }
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{AlarmRegistry, TimerRegistry};

    #[test]
    fn ids_are_sequential_slot_indices() {
        let mut reg = TimerRegistry::new();
        let now = Instant::now();
        assert_eq!(reg.start(now), 0);
        assert_eq!(reg.start(now), 1);
        assert_eq!(reg.start(now), 2);
    }

    #[test]
    fn cancel_last_truncates_and_reissues_the_id() {
        let mut reg = TimerRegistry::new();
        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(reg.start(later), 0);
        assert_eq!(reg.start(later), 1);
        reg.cancel(1);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.start(later), 1);
    }

    #[test]
    fn cancel_earlier_tombstones_and_never_reissues() {
        let mut reg = TimerRegistry::new();
        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(reg.start(later), 0);
        assert_eq!(reg.start(later), 1);
        reg.cancel(0);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.start(later), 2);
        assert_eq!(reg.pending(), 2);
    }

    #[test]
    fn sweep_fires_due_timers_once() {
        let mut reg = TimerRegistry::new();
        let now = Instant::now();
        reg.start(now);
        reg.start(now + Duration::from_secs(60));
        assert_eq!(reg.sweep(now), vec![0]);
        assert_eq!(reg.sweep(now), Vec::<usize>::new());
        assert_eq!(reg.pending(), 1);
    }

    #[test]
    fn trailing_tombstone_is_popped_one_per_sweep() {
        let mut reg = TimerRegistry::new();
        let later = Instant::now() + Duration::from_secs(60);
        reg.start(later);
        reg.start(later);
        reg.start(later);
        reg.cancel(1);
        reg.cancel(2);
        assert_eq!(reg.len(), 2);
        let now = Instant::now();
        reg.sweep(now);
        assert_eq!(reg.len(), 1);
        // id 1 is reachable again only now that the tail slot is gone
        assert_eq!(reg.start(later), 1);
    }

    #[test]
    fn nearest_ignores_tombstones() {
        let mut reg = TimerRegistry::new();
        let now = Instant::now();
        let near = now + Duration::from_secs(1);
        let far = now + Duration::from_secs(60);
        reg.start(far);
        reg.start(near);
        assert_eq!(reg.nearest(), Some(near));
        reg.cancel(1);
        assert_eq!(reg.nearest(), Some(far));
    }

    #[test]
    fn alarm_fires_only_on_exact_equality() {
        let mut reg = AlarmRegistry::new();
        let id = reg.set(13.5);
        assert_eq!(reg.sweep(13.499_999), Vec::<usize>::new());
        assert_eq!(reg.sweep(13.500_001), Vec::<usize>::new());
        assert_eq!(reg.sweep(13.5), vec![id]);
        // tombstoned after firing
        assert_eq!(reg.sweep(13.5), Vec::<usize>::new());
    }

    #[test]
    fn alarm_compaction_matches_timer_compaction() {
        let mut reg = AlarmRegistry::new();
        assert_eq!(reg.set(1.0), 0);
        assert_eq!(reg.set(2.0), 1);
        reg.cancel(1);
        assert_eq!(reg.set(3.0), 1);
        reg.cancel(0);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.set(4.0), 2);
    }
}
