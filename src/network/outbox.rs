//! Outbox - the single outbound lane.
//!
//! Every component (login, query correlator, commands, send helpers) writes
//! through one `Outbox`. It forwards lines to whichever connection session
//! is currently attached; the connection's writer task applies the
//! inter-message delay. While no session is attached, sends are dropped.

use std::sync::Arc;

use parking_lot::RwLock;
use ps_proto::Outbound;
use tokio::sync::mpsc;
use tracing::debug;

/// Cloneable handle to the outbound queue of the current session.
#[derive(Clone, Default)]
pub struct Outbox {
    lane: Arc<RwLock<Option<mpsc::UnboundedSender<String>>>>,
}

impl Outbox {
    /// An outbox attached to a fresh channel. The receiver sees every line
    /// sent while attached.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbox = Self::default();
        outbox.attach(tx);
        (outbox, rx)
    }

    /// Route sends to a new session.
    pub fn attach(&self, sender: mpsc::UnboundedSender<String>) {
        *self.lane.write() = Some(sender);
    }

    /// Stop routing sends; later sends are dropped.
    pub fn detach(&self) {
        self.lane.write().take();
    }

    pub fn is_attached(&self) -> bool {
        self.lane
            .read()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Queue a line. Returns `false` if it was dropped.
    pub fn send(&self, line: Outbound) -> bool {
        self.send_raw(line.to_string())
    }

    /// Queue an already-encoded `ROOM|TEXT` line.
    pub fn send_raw(&self, raw: String) -> bool {
        let lane = self.lane.read();
        match lane.as_ref() {
            Some(tx) => match tx.send(raw) {
                Ok(()) => true,
                Err(mpsc::error::SendError(raw)) => {
                    debug!(line = %raw, "Outbound lane closed, dropping line");
                    false
                }
            },
            None => {
                debug!(line = %raw, "No session attached, dropping line");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_receives_in_order() {
        let (outbox, mut rx) = Outbox::channel();
        assert!(outbox.send(Outbound::join("lobby")));
        assert!(outbox.send(Outbound::room("lobby", "hi")));
        assert_eq!(rx.try_recv().unwrap(), "|/join lobby");
        assert_eq!(rx.try_recv().unwrap(), "lobby|hi");
    }

    #[test]
    fn detached_drops() {
        let (outbox, mut rx) = Outbox::channel();
        outbox.detach();
        assert!(!outbox.is_attached());
        assert!(!outbox.send(Outbound::global("lost")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clones_share_the_lane() {
        let outbox = Outbox::default();
        let clone = outbox.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        outbox.attach(tx);
        assert!(clone.send_raw("|x".to_string()));
        assert_eq!(rx.try_recv().unwrap(), "|x");
    }

    #[test]
    fn closed_receiver_reports_drop() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        assert!(!outbox.is_attached());
        assert!(!outbox.send(Outbound::global("x")));
    }
}
