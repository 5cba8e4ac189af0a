use tokio::sync::mpsc::{self, error::TrySendError};

/// Result of [`Enqueuer::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// A reload was scheduled.
    Queued,
    /// A reload was already pending; this trigger was folded into it.
    Coalesced,
    /// The controller has stopped and accepts no more triggers.
    Closed,
}

/// Handle used to request a reload, e.g. from a file watcher.
///
/// Triggers are deduplicated: at most one reload is pending at any time, no matter
/// how often `enqueue` is called before the worker picks it up. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Enqueuer {
    tx: mpsc::Sender<()>,
}

impl Enqueuer {
    /// Requests a reload. Never blocks.
    pub fn enqueue(&self) -> Enqueued {
        match self.tx.try_send(()) {
            Ok(()) => Enqueued::Queued,
            Err(TrySendError::Full(())) => Enqueued::Coalesced,
            Err(TrySendError::Closed(())) => Enqueued::Closed,
        }
    }

    /// Returns `true` once the controller no longer accepts triggers.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Creates the capacity-1 trigger queue.
pub(super) fn work_queue() -> (Enqueuer, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (Enqueuer { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_collapse_into_one() {
        let (enqueuer, mut rx) = work_queue();

        assert_eq!(enqueuer.enqueue(), Enqueued::Queued);
        assert_eq!(enqueuer.enqueue(), Enqueued::Coalesced);
        assert_eq!(enqueuer.clone().enqueue(), Enqueued::Coalesced);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        assert_eq!(enqueuer.enqueue(), Enqueued::Queued);
    }

    #[test]
    fn closed_after_receiver_is_closed() {
        let (enqueuer, mut rx) = work_queue();
        rx.close();

        assert!(enqueuer.is_closed());
        assert_eq!(enqueuer.enqueue(), Enqueued::Closed);
    }
}
