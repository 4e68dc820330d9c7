use actix::{Actor, Addr};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Duration;

use crate::{
    broadcast::Broadcaster,
    channel::{ClientChannel, ClientMailboxes},
    registry::{
        Connect, Disconnect, IsConnected, RegistryError, SessionRegistry, Subscribe,
        SubscribersOf, Unsubscribe, UnsubscribeAll,
    },
};
use gmind_model::{ClientId, GreenhouseId, GreenhouseSnapshot};

/// [`GreenhouseSessions`] is the handle request handlers hold on to:
/// it starts the [`SessionRegistry`] actor once per process and wraps
/// its mailbox with the connect/subscribe/publish surfaces. Cloning
/// the handle shares the same registry and mailboxes.
///
/// The subscribe protocol of the mobile app sends the client's
/// complete desired greenhouse set, so [`Self::set_subscriptions`]
/// clears earlier subscriptions first; [`Self::subscribe`] is the
/// additive primitive underneath it.
#[derive(Clone)]
pub struct GreenhouseSessions {
    registry: Addr<SessionRegistry>,
    mailboxes: Arc<ClientMailboxes>,
    delivery_timeout: Duration,
}

impl GreenhouseSessions {
    /// Constructed once per process; dropping every clone tears the
    /// registry down with the actix system
    pub fn start(delivery_timeout: Duration) -> Self {
        let registry = SessionRegistry::new().start();
        Self {
            registry,
            mailboxes: Arc::new(ClientMailboxes::new()),
            delivery_timeout,
        }
    }

    /// Registers the client and opens its update mailbox. The
    /// returned receiver is the stream the gateway drains into the
    /// client's socket
    pub async fn connect(
        &self,
        client: ClientId,
    ) -> Result<UnboundedReceiver<GreenhouseSnapshot>, RegistryError> {
        let rx = self.mailboxes.open(client.clone());
        self.registry.send(Connect { client }).await?;
        Ok(rx)
    }

    /// Cascade completes inside the registry before this returns, so
    /// a broadcast initiated afterwards can never reach the client's
    /// channel
    pub async fn disconnect(&self, client: ClientId) -> Result<(), RegistryError> {
        self.registry
            .send(Disconnect {
                client: client.clone(),
            })
            .await?;
        self.mailboxes.close(&client);
        Ok(())
    }

    pub async fn is_connected(&self, client: &ClientId) -> Result<bool, RegistryError> {
        self.registry
            .send(IsConnected {
                client: client.clone(),
            })
            .await?
    }

    /// Replace-all surface: drops the client's earlier subscriptions,
    /// then subscribes to each requested greenhouse
    pub async fn set_subscriptions(
        &self,
        client: &ClientId,
        greenhouses: Vec<GreenhouseId>,
    ) -> Result<(), RegistryError> {
        self.registry
            .send(UnsubscribeAll {
                client: client.clone(),
            })
            .await?;
        self.subscribe(client, greenhouses).await
    }

    /// Additive subscribe to each requested greenhouse
    pub async fn subscribe(
        &self,
        client: &ClientId,
        greenhouses: Vec<GreenhouseId>,
    ) -> Result<(), RegistryError> {
        for greenhouse in greenhouses {
            self.registry
                .send(Subscribe {
                    client: client.clone(),
                    greenhouse,
                })
                .await?;
        }
        Ok(())
    }

    pub async fn unsubscribe(
        &self,
        client: &ClientId,
        greenhouses: Vec<GreenhouseId>,
    ) -> Result<(), RegistryError> {
        for greenhouse in greenhouses {
            self.registry
                .send(Unsubscribe {
                    client: client.clone(),
                    greenhouse,
                })
                .await??;
        }
        Ok(())
    }

    pub async fn subscribers_of(
        &self,
        greenhouse: &GreenhouseId,
    ) -> Result<Vec<ClientId>, RegistryError> {
        self.registry
            .send(SubscribersOf {
                greenhouse: greenhouse.clone(),
            })
            .await?
    }

    /// Update-trigger surface backed by the per-client mailboxes
    pub fn publisher(&self) -> Broadcaster {
        self.publisher_with_channel(self.mailboxes.clone())
    }

    /// Same surface with an injected channel, for gateways with
    /// their own transport (and for tests)
    pub fn publisher_with_channel(&self, channel: Arc<dyn ClientChannel>) -> Broadcaster {
        Broadcaster::new(self.registry.clone(), channel, self.delivery_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn snapshot(greenhouse: &str) -> GreenhouseSnapshot {
        GreenhouseSnapshot::new(
            greenhouse.to_string(),
            "pepper house".to_string(),
            Local::now().naive_local(),
        )
    }

    #[actix::test]
    async fn subscriber_gets_exactly_one_update_nonsubscriber_none() {
        let sessions = GreenhouseSessions::start(Duration::from_millis(500));

        let mut a_rx = sessions.connect("a".to_string()).await.unwrap();
        let mut b_rx = sessions.connect("b".to_string()).await.unwrap();
        sessions
            .set_subscriptions(&"a".to_string(), vec!["g1".to_string()])
            .await
            .unwrap();

        let report = sessions
            .publisher()
            .publish(&"g1".to_string(), snapshot("g1"))
            .await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered(), 1);

        let got = a_rx.recv().await.unwrap();
        assert_eq!(got.greenhouse, "g1");
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());
    }

    #[actix::test]
    async fn set_subscriptions_replaces_earlier_set() {
        let sessions = GreenhouseSessions::start(Duration::from_millis(500));
        let mut rx = sessions.connect("a".to_string()).await.unwrap();

        sessions
            .set_subscriptions(&"a".to_string(), vec!["g1".to_string()])
            .await
            .unwrap();
        sessions
            .set_subscriptions(&"a".to_string(), vec!["g2".to_string()])
            .await
            .unwrap();

        assert!(sessions
            .subscribers_of(&"g1".to_string())
            .await
            .unwrap()
            .is_empty());

        sessions
            .publisher()
            .publish(&"g1".to_string(), snapshot("g1"))
            .await;
        sessions
            .publisher()
            .publish(&"g2".to_string(), snapshot("g2"))
            .await;

        let got = rx.recv().await.unwrap();
        assert_eq!(got.greenhouse, "g2");
    }

    #[actix::test]
    async fn disconnect_stops_later_broadcasts() {
        let sessions = GreenhouseSessions::start(Duration::from_millis(500));
        let mut rx = sessions.connect("a".to_string()).await.unwrap();
        sessions
            .subscribe(&"a".to_string(), vec!["g1".to_string()])
            .await
            .unwrap();

        sessions.disconnect("a".to_string()).await.unwrap();
        assert!(!sessions.is_connected(&"a".to_string()).await.unwrap());

        let report = sessions
            .publisher()
            .publish(&"g1".to_string(), snapshot("g1"))
            .await;
        assert_eq!(report.attempted, 0);
        assert!(rx.try_recv().is_err());
    }

    #[actix::test]
    async fn unsubscribe_untracked_greenhouse_propagates() {
        let sessions = GreenhouseSessions::start(Duration::from_millis(500));
        sessions.connect("a".to_string()).await.unwrap();

        let res = sessions
            .unsubscribe(&"a".to_string(), vec!["never-tracked".to_string()])
            .await;
        assert!(matches!(res, Err(RegistryError::NotSubscribed(_))));
    }
}
