use std::{
    io::{self, BufRead},
    thread,
};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    /// Save the networks under the current step's suffix.
    Save,
}

/// Receiving end of run-control events. The trainer drains it without
/// blocking at step boundaries. Clones share one queue.
#[derive(Clone)]
pub struct ControlChannel {
    receiver: Receiver<ControlEvent>,
}

#[derive(Clone)]
pub struct ControlSender {
    sender: Sender<ControlEvent>,
}

pub fn control_channel() -> (ControlSender, ControlChannel) {
    let (sender, receiver) = channel::unbounded();
    (ControlSender { sender }, ControlChannel { receiver })
}

impl ControlSender {
    /// Returns false once the channel is gone.
    pub fn send(&self, event: ControlEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

impl ControlChannel {

    pub fn poll(&self) -> Vec<ControlEvent> {
        self.receiver.try_iter().collect()
    }

}

/// Parses one line of operator input.
pub fn parse_control_line(line: &str) -> Option<ControlEvent> {
    if line.contains("save") {
        Some(ControlEvent::Save)
    } else {
        None
    }
}

/// Forwards `save` lines typed on stdin as [`ControlEvent::Save`]. The
/// listener exits at end of input or once the channel is dropped.
pub fn spawn_stdin_listener() -> ControlChannel {
    let (sender, channel) = control_channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            if let Some(event) = parse_control_line(&line) {
                info!("save requested");
                if !sender.send(event) {
                    break;
                }
            }
        }
        debug!("stdin listener stopped");
    });
    channel
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_poll_drains_without_blocking() {
        let (sender, channel) = control_channel();
        assert!(channel.poll().is_empty());
        assert!(sender.send(ControlEvent::Save));
        assert!(sender.send(ControlEvent::Save));
        assert_eq!(channel.poll(), vec![ControlEvent::Save, ControlEvent::Save]);
        assert!(channel.poll().is_empty());
        drop(channel);
        assert!(!sender.send(ControlEvent::Save));
    }

    #[test]
    fn test_parse_control_line() {
        assert_eq!(parse_control_line("please save now"), Some(ControlEvent::Save));
        assert_eq!(parse_control_line("status"), None);
    }

}
