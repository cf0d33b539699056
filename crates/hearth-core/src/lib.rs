//! OS layer for a single-threaded emulated computer.
//!
//! Guest programs observe the world through exactly two doors: a pull-style
//! event queue (input, timers, wall-clock alarms, completed network fetches,
//! peripheral changes) drained by one cooperative continuation, and a
//! virtual filesystem sandbox that mediates every storage access. This crate
//! is that layer: the scheduler/resumption protocol and the sandbox, with
//! the guest runtime, rendering, and device bodies kept behind narrow trait
//! seams.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod input;
pub mod peripheral;
pub mod queue;
pub mod scheduler;
pub mod task;
pub mod timers;
pub mod vfs;

pub use bridge::EventSender;
pub use clock::{Clock, TimeScale};
pub use config::{MachineConfig, MountSpec};
pub use error::{FsError, FsResult};
pub use event::{tags, Event, Value};
pub use queue::{EventQueue, RunSignal};
pub use scheduler::{run, ExitStatus, Machine};
pub use task::{GuestTask, Resume};
pub use vfs::{FileHandle, OpenMode, Sandbox};
