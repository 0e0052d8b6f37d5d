//! # Transport Layer
//!
//! Outbound command queue between the sync logic and the host's sockets.
//!
//! ## Design
//!
//! - The sync logic never blocks: commands are queued with `try_send`
//! - A full or disconnected queue drops the command and counts it; the next
//!   tick produces a fresher state anyway
//! - The host drains the paired [`Receiver`] on its own schedule

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::protocol::PlayerId;

/// Command for the host's I/O side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkCommand {
    /// Deliver to one connection (server side).
    Send {
        /// Target connection.
        player: PlayerId,
        /// Encoded envelope.
        data: Vec<u8>,
    },
    /// Deliver to the relay (client side).
    Upload {
        /// Encoded envelope.
        data: Vec<u8>,
    },
}

impl NetworkCommand {
    /// Encoded envelope bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match self {
            Self::Send { data, .. } | Self::Upload { data } => data,
        }
    }
}

/// Outbox statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutboxStats {
    /// Commands queued.
    pub commands_sent: u64,
    /// Bytes queued.
    pub bytes_sent: u64,
    /// Commands dropped because the queue was full.
    pub dropped_full: u64,
    /// Commands dropped because the host hung up.
    pub dropped_disconnected: u64,
}

/// Sending half of the command queue.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: Sender<NetworkCommand>,
    stats: OutboxStats,
}

impl Outbox {
    /// Creates a bounded queue, returning the outbox and the host's end.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<NetworkCommand>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                stats: OutboxStats::default(),
            },
            rx,
        )
    }

    /// Queues a command. Returns false if it was dropped.
    pub fn push(&mut self, command: NetworkCommand) -> bool {
        let len = command.data().len() as u64;
        match self.tx.try_send(command) {
            Ok(()) => {
                self.stats.commands_sent += 1;
                self.stats.bytes_sent += len;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped_full += 1;
                tracing::warn!("Outbox full, dropping {} byte command", len);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped_disconnected += 1;
                tracing::warn!("Outbox disconnected, dropping {} byte command", len);
                false
            }
        }
    }

    /// Returns statistics.
    #[must_use]
    pub const fn stats(&self) -> &OutboxStats {
        &self.stats
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = OutboxStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_drain() {
        let (mut outbox, rx) = Outbox::bounded(4);

        assert!(outbox.push(NetworkCommand::Upload { data: vec![1, 2, 3] }));
        assert!(outbox.push(NetworkCommand::Send { player: PlayerId(2), data: vec![4] }));

        let drained: Vec<_> = rx.try_iter().collect();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].data(), &[1, 2, 3]);
        assert_eq!(outbox.stats().commands_sent, 2);
        assert_eq!(outbox.stats().bytes_sent, 4);
    }

    #[test]
    fn test_full_queue_drops() {
        let (mut outbox, _rx) = Outbox::bounded(1);

        assert!(outbox.push(NetworkCommand::Upload { data: vec![0] }));
        assert!(!outbox.push(NetworkCommand::Upload { data: vec![0] }));
        assert_eq!(outbox.stats().dropped_full, 1);
    }

    #[test]
    fn test_disconnected_queue_drops() {
        let (mut outbox, rx) = Outbox::bounded(1);
        drop(rx);

        assert!(!outbox.push(NetworkCommand::Upload { data: vec![0] }));
        assert_eq!(outbox.stats().dropped_disconnected, 1);

        outbox.reset_stats();
        assert_eq!(*outbox.stats(), OutboxStats::default());
    }
}
