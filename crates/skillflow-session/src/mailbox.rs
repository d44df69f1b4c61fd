//! Single-slot rendezvous for a user response.
//!
//! At most one wait is registered per session. Registering a new wait
//! replaces the old one, and the old waiter is told so with
//! [`WaitError::Superseded`] rather than being left to hang.

use tokio::sync::oneshot;

use crate::session::WaitError;

type Slot = oneshot::Sender<Result<String, WaitError>>;

/// Pending-response slot of one session.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Option<Slot>,
}

impl Mailbox {
    /// Register a wait, replacing any earlier one.
    pub fn open(&mut self) -> ResponseWaiter {
        let (tx, rx) = oneshot::channel();
        if let Some(previous) = self.slot.replace(tx) {
            let _ = previous.send(Err(WaitError::Superseded));
        }
        ResponseWaiter { rx }
    }

    /// Deliver a response. Returns `false` if nothing was waiting.
    pub fn deliver(&mut self, response: String) -> bool {
        match self.slot.take() {
            Some(tx) if !tx.is_closed() => tx.send(Ok(response)).is_ok(),
            _ => false,
        }
    }

    /// Reject the pending wait, if any.
    pub fn reject(&mut self, reason: WaitError) -> bool {
        self.slot
            .take()
            .is_some_and(|tx| tx.send(Err(reason)).is_ok())
    }

    /// Whether a live waiter is registered.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Future side of a registered wait.
#[derive(Debug)]
pub struct ResponseWaiter {
    rx: oneshot::Receiver<Result<String, WaitError>>,
}

impl ResponseWaiter {
    /// Wait for the response.
    ///
    /// # Errors
    /// Returns why the wait ended without a response.
    pub async fn recv(self) -> Result<String, WaitError> {
        self.rx.await.unwrap_or(Err(WaitError::Closed))
    }
}
