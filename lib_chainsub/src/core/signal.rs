//! # Single-Slot Signals
//!
//! A mailbox that holds at most one value. Producers never block: `offer`
//! either parks the value in the empty slot or reports that one is already
//! waiting (or that nobody will ever read it). Dropping either end closes the
//! signal, which is how the read loop releases anyone still waiting on it.

use tokio::sync::mpsc;

/// Producer half of a single-slot signal.
#[derive(Debug)]
pub struct SlotSender<T> {
    tx: mpsc::Sender<T>,
}

/// Consumer half of a single-slot signal.
#[derive(Debug)]
pub struct SlotReceiver<T> {
    rx: mpsc::Receiver<T>,
}

/// Creates a connected sender/receiver pair with room for exactly one value.
pub fn single_slot<T>() -> (SlotSender<T>, SlotReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (SlotSender { tx }, SlotReceiver { rx })
}

impl<T> SlotSender<T> {
    /// Parks `value` if the slot is empty. Returns `false`, dropping the
    /// value, when a value is already pending or the receiver is gone.
    pub fn offer(&self, value: T) -> bool {
        self.tx.try_send(value).is_ok()
    }

    /// `true` while a value sits in the slot unread.
    pub fn is_pending(&self) -> bool {
        !self.tx.is_closed() && self.tx.capacity() == 0
    }

    /// `true` once the receiver has been dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> SlotReceiver<T> {
    /// Waits for the next value; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Takes the pending value, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Refuses further values; a pending one can still be taken.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_offer_is_suppressed_while_one_is_pending() {
        let (tx, mut rx) = single_slot::<()>();
        assert!(!tx.is_pending());
        assert!(tx.offer(()));
        assert!(tx.is_pending());
        assert!(!tx.offer(()));
        assert!(!tx.offer(()));

        assert_eq!(rx.try_recv(), Some(()));
        assert_eq!(rx.try_recv(), None);
        assert!(!tx.is_pending());
        assert!(tx.offer(()));
    }

    #[test]
    fn offers_fail_once_the_receiver_is_gone() {
        let (tx, rx) = single_slot::<u8>();
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.offer(7));
        assert!(!tx.is_pending());
    }

    #[tokio::test]
    async fn dropping_the_sender_releases_a_waiting_receiver() {
        let (tx, mut rx) = single_slot::<()>();
        let waiter = tokio::spawn(async move { rx.recv().await });
        drop(tx);
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn closing_keeps_the_pending_value() {
        let (tx, mut rx) = single_slot::<&str>();
        assert!(tx.offer("reconnected"));
        rx.close();
        assert!(!tx.offer("again"));
        assert_eq!(rx.recv().await, Some("reconnected"));
        assert_eq!(rx.recv().await, None);
    }
}
