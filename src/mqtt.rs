use std::time::Duration;

use log::{debug, error, info};
use rumqttc::{MqttOptions, QoS};

use crate::config;
use crate::sink::ReportSink;

/// Published retained so a subscriber joining late still sees the state.
const RETAINED_REPORTS: &[&str] = &["lock"];

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    publisher_id: String,
    topic_path: String,
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .as_ref()
            .unwrap_or(&"lockwatch-rs".to_string())
            .to_string();

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                publisher_id,
                topic_path: config.topic_path.clone().unwrap_or("lockwatch".to_string()),
            },
            eventloop,
        )
    }

    /// Drives the connection. Publishes only leave the process while this runs.
    pub async fn event_loop(eventloop: &mut rumqttc::EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(notification) => match notification {
                    rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
                        info!("Connected to MQTT broker");
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::PubAck(_)) => {
                        debug!("Publish acknowledged");
                    }
                    _ => {}
                },
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    // the event loop reconnects on the next poll
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub fn topic(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.topic_path,
            self.publisher_id,
            sanitize_name(name)
        )
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

impl ReportSink for MqttClient {
    fn report(&mut self, name: &str, value: &str) {
        let topic = self.topic(name);
        let retain = RETAINED_REPORTS.contains(&name);
        debug!("Publishing {} to {}", value, topic);
        if let Err(err) = self
            .client
            .try_publish(topic, QoS::AtMostOnce, retain, value.as_bytes().to_vec())
        {
            error!("Error publishing {}={}: {:?}", name, value, err);
        }
    }
}

fn sanitize_name(name: &str) -> String {
    // Remove any non-alphanumeric characters and replace spaces with underscores
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
}
