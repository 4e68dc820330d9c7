use rumqttc::{AsyncClient, MqttOptions, QoS};
use thiserror::Error;
use tokio::time::Duration;

use gmind_model::{Device, DeviceAction, FieldId, GreenhouseId};

#[derive(Error, Debug)]
pub enum DeviceControlError {
    #[error("MQTT client Error")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("control rejected: {0}")]
    Rejected(String),
}

/// Device-control seam. Calls are potentially blocking I/O against
/// an external, unreliable service; the dispatcher bounds each call
/// with its own timeout and treats failures as retryable.
#[async_trait::async_trait]
pub trait DeviceClient: Send + Sync {
    async fn control(
        &self,
        greenhouse: &GreenhouseId,
        field: FieldId,
        device: Device,
        action: DeviceAction,
    ) -> Result<(), DeviceControlError>;
}

/// MQTT-backed [`DeviceClient`]: publishes on the
/// `{greenhouse}.{field}-{device}` topics the control service
/// listens on, payload 1/0. Dashes in greenhouse ids are folded to
/// underscores to match the service's topic naming
pub struct MqttDeviceClient {
    client: AsyncClient,
    poll_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MqttDeviceClient {
    pub fn new(client_id: &str, host: &str, port: u16) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(5));

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        // The eventloop must be polled for publishes to make
        // progress; connection errors here are retried, publish
        // failures surface at the call site
        let poll_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => log::trace!("mqtt event {event:?}"),
                    Err(e) => {
                        log::warn!("mqtt connection error {e:}, reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            poll_handle: Some(poll_handle),
        }
    }

    fn control_topic(greenhouse: &GreenhouseId, field: FieldId, device: Device) -> String {
        format!("{}.{}-{}", greenhouse.replace('-', "_"), field, device)
    }
}

#[async_trait::async_trait]
impl DeviceClient for MqttDeviceClient {
    async fn control(
        &self,
        greenhouse: &GreenhouseId,
        field: FieldId,
        device: Device,
        action: DeviceAction,
    ) -> Result<(), DeviceControlError> {
        let topic = Self::control_topic(greenhouse, field, device);
        let payload = action.wire_value().to_string().into_bytes();

        log::debug!("publishing control {topic:} <- {action:}");
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

impl Drop for MqttDeviceClient {
    fn drop(&mut self) {
        if let Some(poll) = &self.poll_handle {
            poll.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_topic_matches_service_naming() {
        let topic = MqttDeviceClient::control_topic(
            &"c670e06e-afa8-4d4f".to_string(),
            2,
            Device::Pump,
        );
        assert_eq!(topic, "c670e06e_afa8_4d4f.2-pump");
    }
}
