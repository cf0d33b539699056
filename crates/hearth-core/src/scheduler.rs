use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::bridge::EventSender;
use crate::clock::{Clock, TimeScale};
use crate::config::MachineConfig;
use crate::event::{tags, Event, Value};
use crate::queue::{EventQueue, RunSignal};
use crate::task::{GuestTask, Resume};
use crate::timers::{AlarmRegistry, TimerRegistry};
use crate::vfs::Sandbox;

/// Longest the consumer sleeps between sweeps when nothing is due. Alarm
/// checks only happen on wakeups, so this also bounds how often an alarm
/// target gets compared.
const MAX_POLL_WAIT: Duration = Duration::from_secs(5);

/// How one guest session ended, before exit-code mapping.
#[derive(Debug, Clone, PartialEq)]
enum SessionEnd {
    Returned,
    Shutdown,
    Restart,
    Fault(String),
}

/// Lifecycle of the scheduler loop. Every exit transition runs the same
/// teardown; `Restarting` loops back into a fresh machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MachineState {
    Init,
    Running,
    Restarting,
    Terminated,
}

/// Process-level outcome of [`run`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExitStatus {
    Clean,
    Fault(String),
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Fault(_) => 1,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, ExitStatus::Clean)
    }
}

/// One emulated computer: the scheduler context object. Owns the event
/// queue, the timer and alarm registries, the filesystem sandbox and the
/// wall clock; every component reaches shared state through a reference to
/// this. There are no globals, and a restart simply builds a new one.
pub struct Machine {
    queue: Arc<EventQueue>,
    timers: Mutex<TimerRegistry>,
    alarms: Mutex<AlarmRegistry>,
    sandbox: Sandbox,
    clock: Clock,
    label: Mutex<Option<String>>,
    abort: Arc<AtomicBool>,
    http_enable: bool,
    abort_timeout: Duration,
}

impl Machine {
    pub fn new(config: &MachineConfig) -> anyhow::Result<Self> {
        let sandbox = Sandbox::from_config(config)?;
        Ok(Self {
            queue: Arc::new(EventQueue::new()),
            timers: Mutex::new(TimerRegistry::new()),
            alarms: Mutex::new(AlarmRegistry::new()),
            sandbox,
            clock: Clock::new(),
            label: Mutex::new(config.label.clone()),
            abort: Arc::new(AtomicBool::new(false)),
            http_enable: config.http_enable,
            abort_timeout: Duration::from_millis(config.abort_timeout_ms),
        })
    }

    /// Producer handle onto this machine's queue. Clone at will.
    pub fn sender(&self) -> EventSender {
        EventSender::new(Arc::clone(&self.queue))
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn http_enabled(&self) -> bool {
        self.http_enable
    }

    pub fn abort_timeout(&self) -> Duration {
        self.abort_timeout
    }

    /// Flag an external watchdog arms to ask the guest runtime to bail out
    /// of a computation that never yields. The machine never sets it itself.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn label(&self) -> Option<String> {
        self.lock_label().clone()
    }

    pub fn set_label(&self, label: Option<String>) {
        *self.lock_label() = label;
    }

    pub fn run_signal(&self) -> RunSignal {
        self.queue.signal()
    }

    /// Asks the loop to stop after the current resumption.
    pub fn shutdown(&self) {
        self.queue.set_signal(RunSignal::Shutdown);
    }

    /// Asks the loop to tear everything down and boot a fresh machine.
    pub fn restart(&self) {
        self.queue.set_signal(RunSignal::Restart);
    }

    pub fn start_timer(&self, duration: Duration) -> usize {
        self.lock_timers().start(Instant::now() + duration)
    }

    /// Best-effort: a timer whose event is already queued still fires.
    pub fn cancel_timer(&self, id: usize) {
        self.lock_timers().cancel(id);
    }

    pub fn set_alarm(&self, time_of_day: f64) -> usize {
        self.lock_alarms().set(time_of_day)
    }

    pub fn cancel_alarm(&self, id: usize) {
        self.lock_alarms().cancel(id);
    }

    /// Guest-initiated synthetic event; same path as any producer.
    pub fn queue_event(&self, tag: impl Into<String>, payload: Vec<Value>) -> bool {
        self.queue.push(Event::new(tag, payload))
    }

    /// Pulls the next event for the guest. Each pass sweeps due timers,
    /// then due alarms, then takes the queue head; under a non-empty filter,
    /// non-matching events are discarded permanently. Returns `None` the
    /// moment the run signal leaves `Running`; that is loop exit, not an
    /// error.
    pub fn next_event(&self, filter: Option<&str>) -> Option<Event> {
        let filter = filter.filter(|f| !f.is_empty());
        loop {
            if self.queue.signal() != RunSignal::Running {
                return None;
            }
            let now = Instant::now();
            let fired = self.lock_timers().sweep(now);
            for id in fired {
                self.queue
                    .push(Event::new(tags::TIMER, vec![Value::Int(id as i64)]));
            }
            let time_of_day = self.clock.time_of_day(TimeScale::Local);
            let fired = self.lock_alarms().sweep(time_of_day);
            for id in fired {
                self.queue
                    .push(Event::new(tags::ALARM, vec![Value::Int(id as i64)]));
            }
            if let Some(event) = self.queue.try_pop() {
                match filter {
                    Some(f) if event.tag != f => {
                        log::trace!("filter {f:?} discards event {:?}", event.tag);
                        continue;
                    }
                    _ => return Some(event),
                }
            }
            self.queue.wait(self.wait_budget(now));
        }
    }

    /// Counters the restart property is stated over.
    pub fn pending_timers(&self) -> usize {
        self.lock_timers().pending()
    }

    pub fn pending_alarms(&self) -> usize {
        self.lock_alarms().pending()
    }

    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    pub fn open_handles(&self) -> usize {
        self.sandbox.open_handles()
    }

    fn wait_budget(&self, now: Instant) -> Duration {
        match self.lock_timers().nearest() {
            Some(deadline) if deadline > now => (deadline - now).min(MAX_POLL_WAIT),
            Some(_) => Duration::ZERO,
            None => MAX_POLL_WAIT,
        }
    }

    fn clear_registries(&self) {
        self.queue.clear();
        self.lock_timers().clear();
        self.lock_alarms().clear();
    }

    fn lock_timers(&self) -> MutexGuard<'_, TimerRegistry> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_alarms(&self) -> MutexGuard<'_, AlarmRegistry> {
        self.alarms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_label(&self) -> MutexGuard<'_, Option<String>> {
        self.label.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives guest sessions until one terminates the process. `guest_factory`
/// is called once per boot so a restart starts from the guest's initial
/// entry point with no carryover; `wire` runs against every fresh machine
/// and is where the embedder attaches producers.
pub fn run<F, W>(config: &MachineConfig, mut guest_factory: F, mut wire: W) -> anyhow::Result<ExitStatus>
where
    F: FnMut() -> Box<dyn GuestTask>,
    W: FnMut(&Machine),
{
    let mut state = MachineState::Init;
    let mut status = ExitStatus::Clean;
    while state != MachineState::Terminated {
        // Init and Restarting enter the same way: a fresh machine, a fresh
        // guest.
        let machine = Machine::new(config)?;
        wire(&machine);
        let mut guest = guest_factory();
        state = MachineState::Running;
        log::debug!("guest session starting");
        let end = run_session(&machine, guest.as_mut());
        teardown(guest, &machine);
        state = match end {
            SessionEnd::Restart => MachineState::Restarting,
            SessionEnd::Returned | SessionEnd::Shutdown => MachineState::Terminated,
            SessionEnd::Fault(message) => {
                log::error!("guest fault: {message}");
                status = ExitStatus::Fault(message);
                MachineState::Terminated
            }
        };
    }
    Ok(status)
}

fn run_session(machine: &Machine, guest: &mut dyn GuestTask) -> SessionEnd {
    let mut outcome = guest.resume(machine, None);
    loop {
        match outcome {
            Resume::Yield { filter } => {
                let Some(event) = machine.next_event(filter.as_deref()) else {
                    return match machine.run_signal() {
                        RunSignal::Restart => SessionEnd::Restart,
                        _ => SessionEnd::Shutdown,
                    };
                };
                outcome = guest.resume(machine, Some(&event));
            }
            Resume::Returned => return SessionEnd::Returned,
            Resume::Errored(message) => return SessionEnd::Fault(message),
            Resume::ShutdownRequested => return SessionEnd::Shutdown,
            Resume::RestartRequested => return SessionEnd::Restart,
        }
    }
}

/// Single exit path for every session, whatever ended it. Order matters:
/// the guest drops first (closing every file handle it owns), the signal
/// flip detaches outstanding producer work, and the registries are cleared
/// so nothing fires into a dead queue.
fn teardown(guest: Box<dyn GuestTask>, machine: &Machine) {
    drop(guest);
    if machine.run_signal() == RunSignal::Running {
        machine.shutdown();
    }
    machine.clear_registries();
    log::debug!(
        "teardown complete (open handles: {}, queued events: {})",
        machine.open_handles(),
        machine.queued_events()
    );
}
