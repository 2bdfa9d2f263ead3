use crate::config::MqttConfig;
use crate::models::MeteringData;
use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use std::io::Error;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};

pub fn telegram_topic(base_topic: &str) -> String {
    format!("{}/telegram", base_topic)
}

pub fn device_topic(base_topic: &str, meter_name: &str) -> String {
    /* '/', '+' and '#' have a meaning in MQTT topics */
    let name: String = meter_name
        .chars()
        .map(|c| if matches!(c, '/' | '+' | '#' | '\\') { '_' } else { c })
        .collect();
    format!("{}/devs/{}", base_topic, name)
}

pub struct MqttManager {
    rx: Receiver<MeteringData>,
    exit_thread: bool,
    client: AsyncClient,
    base_topic: String,
}

impl MqttManager {
    pub fn new(config: &MqttConfig) -> Result<(Self, Sender<MeteringData>), Error> {
        let (mtx, mrx) = tokio::sync::mpsc::channel(100);

        info!("MQTT connection to {}:{} starting up", config.host, config.port);
        let status_topic = format!("{}/status", config.base_topic);
        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        mqttoptions.set_last_will(LastWill::new(status_topic.clone(), "offline", QoS::AtLeastOnce, true));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        let status_client = client.clone();
        tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        let client = status_client.clone();
                        let topic = status_topic.clone();
                        tokio::spawn(async move {
                            let _ = client.publish(topic, QoS::AtLeastOnce, true, "online").await;
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok((
            MqttManager {
                rx: mrx,
                exit_thread: false,
                client,
                base_topic: config.base_topic.clone(),
            },
            mtx,
        ))
    }

    pub async fn start_thread(&mut self) {
        while !self.exit_thread {
            let data = match self.rx.recv().await {
                Some(data) => data,
                None => {
                    debug!("Reading returned none, we exit now");
                    self.exit_thread = true;
                    continue;
                }
            };

            debug!("Metering data received: {}", data.id);
            let payload = match serde_json::to_string(&data) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Unable to serialize telegram: {}", e);
                    continue;
                }
            };
            match self.client.publish(telegram_topic(&self.base_topic), QoS::AtLeastOnce, false, payload).await {
                Err(e) => error!("Error sending: {}", e),
                Ok(_) => debug!("Send successfully"),
            }

            if let Ok(values) = serde_json::to_string(&data.metered_values) {
                if let Err(e) = self
                    .client
                    .publish(device_topic(&self.base_topic, &data.meter_name), QoS::AtLeastOnce, false, values)
                    .await
                {
                    error!("Error sending device values: {}", e);
                }
            }
        }

        info!("MQTT thread exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(telegram_topic("dsmr2mqtt"), "dsmr2mqtt/telegram");
        assert_eq!(device_topic("dsmr2mqtt", "ISk5\\2MT382-1000"), "dsmr2mqtt/devs/ISk5_2MT382-1000");
        assert_eq!(device_topic("p1", "KFM5KAIFA/METER#1"), "p1/devs/KFM5KAIFA_METER_1");
    }
}
