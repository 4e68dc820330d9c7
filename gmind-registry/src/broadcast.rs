use actix::Addr;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::Duration;

use crate::{
    channel::{ChannelError, ClientChannel},
    registry::{SessionRegistry, SubscribersOf},
};
use gmind_model::{ClientId, GreenhouseId, GreenhouseSnapshot};

/// Outcome of one fan-out. Failures are collected here for the
/// operator instead of being surfaced to the publisher; `publish`
/// itself never errors.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub attempted: usize,
    pub failures: Vec<(ClientId, ChannelError)>,
}

impl FanoutReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failures.len()
    }
}

/// [`Broadcaster`] is the update-trigger surface: given a greenhouse
/// and its new state, it resolves the current subscriber set from the
/// [`SessionRegistry`] and attempts one delivery per subscriber
/// through the injected [`ClientChannel`]. Delivery happens entirely
/// outside the registry actor, so a slow client never stalls
/// registry traffic, and each attempt is bounded by the configured
/// timeout so a hung channel never stalls the fan-out.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Addr<SessionRegistry>,
    channel: Arc<dyn ClientChannel>,
    delivery_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        registry: Addr<SessionRegistry>,
        channel: Arc<dyn ClientChannel>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            channel,
            delivery_timeout,
        }
    }

    /// Fire-and-forget fan-out: always returns once every delivery
    /// attempt has completed, even if all of them failed. No retry
    /// here; retry policy belongs to the channel implementation
    pub async fn publish(
        &self,
        greenhouse: &GreenhouseId,
        snapshot: GreenhouseSnapshot,
    ) -> FanoutReport {
        let subscribers = match self
            .registry
            .send(SubscribersOf {
                greenhouse: greenhouse.clone(),
            })
            .await
        {
            Ok(Ok(subscribers)) => subscribers,
            Ok(Err(e)) => {
                log::error!("subscriber lookup failed for greenhouse {greenhouse:}: {e:}");
                return FanoutReport::default();
            }
            Err(e) => {
                log::error!("registry mailbox error during publish: {e:}");
                return FanoutReport::default();
            }
        };

        let attempted = subscribers.len();
        log::debug!("publishing greenhouse {greenhouse:} update to {attempted:} subscribers");

        let attempts = subscribers.into_iter().map(|client| {
            let channel = self.channel.clone();
            let snapshot = snapshot.clone();
            let timeout = self.delivery_timeout;
            async move {
                match tokio::time::timeout(timeout, channel.deliver(&client, &snapshot)).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => {
                        log::error!("delivery to client {client:} failed: {e:}");
                        Some((client, e))
                    }
                    Err(_) => {
                        log::error!("delivery to client {client:} timed out");
                        let err = ChannelError::Timeout(client.clone());
                        Some((client, err))
                    }
                }
            }
        });

        let failures = join_all(attempts).await.into_iter().flatten().collect();

        FanoutReport {
            attempted,
            failures,
        }
    }
}
