use std::io::{self, BufRead as _};
use std::thread;

use crate::bridge::EventSender;
use crate::event::{tags, Event, Value};

/// Feeds stdin into the machine: one `"paste"` event per line. End of input
/// means the terminal went away, which is delivered as a `"terminate"`
/// event for the guest to act on. The thread exits on its own once the
/// machine shuts down.
pub fn spawn_stdin_poller(sender: EventSender) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("hearth-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(text) => {
                        let accepted = sender.send(Event::new(tags::PASTE, vec![Value::Str(text)]));
                        if !accepted {
                            return;
                        }
                    }
                    Err(err) => {
                        log::warn!("stdin poller: {err}");
                        break;
                    }
                }
            }
            sender.send(Event::tagged(tags::TERMINATE));
        })
}
