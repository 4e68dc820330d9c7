use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::time::Duration;

use crate::config::MqttConfig;
use gmind_model::GreenhouseSnapshot;
use gmind_registry::Broadcaster;

/// [`UpdateFeed`] bridges the data service's MQTT state-change
/// stream into the fan-out layer: every state payload received on
/// the feed topic is decoded as a [`GreenhouseSnapshot`] and handed
/// to the [`Broadcaster`]. Undecodable payloads and delivery
/// failures are logged and never stop the feed.
pub struct UpdateFeed {
    feed_handle: Option<tokio::task::JoinHandle<()>>,
}

impl UpdateFeed {
    pub fn start(config: &MqttConfig, publisher: Broadcaster) -> Self {
        let mut options = MqttOptions::new(&config.feed_client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(5));

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let topic = config.feed_topic.clone();

        let feed_handle = tokio::spawn(async move {
            if let Err(e) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                log::error!("unable to subscribe to update feed {topic:}: {e:}");
                return;
            }
            log::info!("update feed subscribed to {topic:}");

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match serde_json::from_slice::<GreenhouseSnapshot>(&publish.payload) {
                            Ok(snapshot) => {
                                let greenhouse = snapshot.greenhouse.clone();
                                let report = publisher.publish(&greenhouse, snapshot).await;
                                if !report.failures.is_empty() {
                                    log::warn!(
                                        "greenhouse {} update: {} of {} deliveries failed",
                                        greenhouse,
                                        report.failures.len(),
                                        report.attempted
                                    );
                                }
                            }
                            Err(e) => {
                                log::error!(
                                    "undecodable state payload on {}: {e:}",
                                    publish.topic
                                );
                            }
                        }
                    }
                    Ok(event) => log::trace!("feed event {event:?}"),
                    Err(e) => {
                        log::warn!("feed connection error {e:}, reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            feed_handle: Some(feed_handle),
        }
    }
}

impl Drop for UpdateFeed {
    fn drop(&mut self) {
        if let Some(feed) = &self.feed_handle {
            feed.abort();
        }
    }
}
