//! Delivery targets for decoded events

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Why a non-blocking delivery did not happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The consumer's buffer is full
    Full,
    /// The consumer went away
    Closed,
}

/// A bounded, non-blocking delivery target.
///
/// `try_deliver` must return immediately; the dispatcher calls it from the
/// receive loop.
pub trait EventSink<T>: Send + Sync {
    fn try_deliver(&self, event: T) -> Result<(), DeliveryError>;
}

impl<T: Send> EventSink<T> for mpsc::Sender<T> {
    fn try_deliver(&self, event: T) -> Result<(), DeliveryError> {
        self.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = mpsc::channel::<u32>(1);

        assert_eq!(tx.try_deliver(1), Ok(()));
        assert_eq!(tx.try_deliver(2), Err(DeliveryError::Full));
        assert_eq!(rx.recv().await, Some(1));

        drop(rx);
        assert_eq!(tx.try_deliver(3), Err(DeliveryError::Closed));
    }
}
