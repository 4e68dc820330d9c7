use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use gmind_model::{ClientId, GreenhouseSnapshot};

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("no open channel for client {0}")]
    Closed(ClientId),
    #[error("delivery to client {0} timed out")]
    Timeout(ClientId),
}

/// Trait for the per-client transport used during fan-out. The real
/// deployment backs this with whatever realtime mechanism the gateway
/// speaks; tests inject fakes to exercise failure isolation.
#[async_trait::async_trait]
pub trait ClientChannel: Send + Sync {
    async fn deliver(
        &self,
        client: &ClientId,
        snapshot: &GreenhouseSnapshot,
    ) -> Result<(), ChannelError>;
}

/// [`ClientMailboxes`] is the in-process [`ClientChannel`]: one
/// unbounded queue per connected client, opened when the session
/// connects and torn down on disconnect. The gateway drains the
/// receiving half into the client's socket.
#[derive(Default)]
pub struct ClientMailboxes {
    senders: Mutex<HashMap<ClientId, UnboundedSender<GreenhouseSnapshot>>>,
}

impl ClientMailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a mailbox for the client, returning the receiving half.
    /// Reconnects replace the previous mailbox; the old receiver
    /// just stops getting sends
    pub fn open(&self, client: ClientId) -> UnboundedReceiver<GreenhouseSnapshot> {
        let (tx, rx) = unbounded_channel();
        let mut senders = self.senders.lock().expect("mailbox lock poisoned");
        if senders.insert(client.clone(), tx).is_some() {
            log::debug!("client {client:} reopened its mailbox");
        }
        rx
    }

    pub fn close(&self, client: &ClientId) {
        let mut senders = self.senders.lock().expect("mailbox lock poisoned");
        if senders.remove(client).is_none() {
            log::warn!("closing mailbox for client {client:} that had none");
        }
    }
}

#[async_trait::async_trait]
impl ClientChannel for ClientMailboxes {
    async fn deliver(
        &self,
        client: &ClientId,
        snapshot: &GreenhouseSnapshot,
    ) -> Result<(), ChannelError> {
        // Clone the sender out so the map lock is never held across
        // the send
        let sender = {
            let senders = self.senders.lock().expect("mailbox lock poisoned");
            senders.get(client).cloned()
        };

        match sender {
            Some(tx) => tx
                .send(snapshot.clone())
                .map_err(|_| ChannelError::Closed(client.clone())),
            None => Err(ChannelError::Closed(client.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot(greenhouse: &str) -> GreenhouseSnapshot {
        GreenhouseSnapshot::new(
            greenhouse.to_string(),
            "tomato house".to_string(),
            NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn deliver_reaches_open_mailbox() {
        let mailboxes = ClientMailboxes::new();
        let mut rx = mailboxes.open("a".to_string());

        mailboxes
            .deliver(&"a".to_string(), &snapshot("g1"))
            .await
            .unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.greenhouse, "g1");
    }

    #[tokio::test]
    async fn deliver_after_close_errs() {
        let mailboxes = ClientMailboxes::new();
        let _rx = mailboxes.open("a".to_string());
        mailboxes.close(&"a".to_string());

        let res = mailboxes.deliver(&"a".to_string(), &snapshot("g1")).await;
        assert!(matches!(res, Err(ChannelError::Closed(_))));
    }

    #[tokio::test]
    async fn deliver_with_dropped_receiver_errs() {
        let mailboxes = ClientMailboxes::new();
        drop(mailboxes.open("a".to_string()));

        let res = mailboxes.deliver(&"a".to_string(), &snapshot("g1")).await;
        assert!(matches!(res, Err(ChannelError::Closed(_))));
    }
}
