//! Notification handling for the client role
//! Forwards characteristic notifications from the server into the link
//! manager and reports the link as dropped when the stream ends.

use bluest::Characteristic;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::errors::RadioError;
use crate::core::bluetooth::radio::{LinkStatus, RadioEvent, RadioEventSender};
use crate::core::bluetooth::types::PeerIdentity;

/// Owns the notification forwarding task of the current link
pub struct NotificationHandler {
    events: RadioEventSender,
    cancel: Mutex<Option<CancellationToken>>,
}

impl NotificationHandler {
    pub fn new(events: RadioEventSender) -> Self {
        Self {
            events,
            cancel: Mutex::new(None),
        }
    }

    /// Subscribes to `characteristic` and returns once the subscription is live
    pub async fn setup_notifications(
        &self,
        characteristic: Characteristic,
        peer: PeerIdentity,
    ) -> Result<(), RadioError> {
        self.stop().await;

        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let events = self.events.clone();
        let task_cancel = cancel.clone();

        info!("Subscribing to notifications...");
        tokio::spawn(async move {
            Self::process_notifications(characteristic, peer, events, task_cancel, ready_tx).await;
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                *self.cancel.lock().await = Some(cancel);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RadioError::Platform(
                "notification task ended before subscribing".to_string(),
            )),
        }
    }

    /// Ends the forwarding task without reporting a dropped link
    pub async fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
    }

    async fn process_notifications(
        characteristic: Characteristic,
        peer: PeerIdentity,
        events: RadioEventSender,
        cancel: CancellationToken,
        ready: oneshot::Sender<Result<(), RadioError>>,
    ) {
        let mut notifications = match characteristic.notify().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = ready.send(Err(e.into()));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        info!("Listening for notifications from {}...", peer);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Notification task for {} cancelled", peer);
                    return;
                }
                next = notifications.next() => match next {
                    Some(Ok(value)) => {
                        debug!("Received notification: {:?}", value);
                        events.send(RadioEvent::CharacteristicChanged {
                            peer: peer.clone(),
                            value,
                        });
                    }
                    Some(Err(e)) => {
                        error!("Error in notification stream: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }

        info!("Notification stream ended");
        events.send(RadioEvent::ConnectionStateChanged {
            peer,
            status: LinkStatus::Disconnected,
        });
    }
}
