use crate::event::Event;
use crate::scheduler::Machine;

/// What a guest resumption produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// The guest wants the next event, optionally only one with this tag.
    /// While waiting under a filter, non-matching events are discarded for
    /// good.
    Yield { filter: Option<String> },
    /// The guest finished normally.
    Returned,
    /// The guest hit an unrecoverable fault. Fatal to the process.
    Errored(String),
    ShutdownRequested,
    RestartRequested,
}

/// The single cooperative continuation the scheduler drives. The first
/// resumption carries no event; every later one carries the event that
/// satisfied the previous yield. Implementations run entirely on the
/// scheduler thread and reach the OS surface through the machine reference.
pub trait GuestTask {
    fn resume(&mut self, machine: &Machine, event: Option<&Event>) -> Resume;
}
