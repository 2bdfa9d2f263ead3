use dsmr2mqtt::config::{Config, SourceConfig};
use dsmr2mqtt::metering_p1::meter_definitions::MeterDescriptor;
use dsmr2mqtt::{ConfigHolder, MeteringData, P1Error, P1Manager, P1Pipeline, Telegram};
use log::{error, info, warn};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> Result<(), P1Error> {
    // Initialize logging
    let default_filter = env::var("P1_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let path = env::args().nth(1);
    let config = match ConfigHolder::load(path.as_deref()) {
        Ok(holder) => holder.config,
        Err(e) => {
            error!("{}", e);
            return Err(e);
        }
    };
    let descriptor = config.meter.descriptor()?;
    info!("Reading {} telegrams", descriptor.description());

    // The reader hands telegrams to the publisher through this channel
    let (sender, receiver) = tokio::sync::mpsc::channel(16);
    let publisher = spawn_publisher(&config, receiver)?;

    read_source(&config, descriptor, sender).await?;

    info!("Source finished, waiting for the publisher");
    let _ = publisher.await;
    Ok(())
}

fn spawn_publisher(config: &Config, mut receiver: Receiver<Telegram>) -> Result<JoinHandle<()>, P1Error> {
    let family = config.meter.family.clone();
    let utc_offset = config.meter.utc_offset;

    #[cfg(feature = "mqtt")]
    {
        use dsmr2mqtt::mqtt::MqttManager;

        if let Some(mqtt_config) = &config.mqtt {
            let (mut mqtt, mqtt_sender) = MqttManager::new(mqtt_config)?;
            let mqtt_thread = tokio::spawn(async move {
                mqtt.start_thread().await;
            });

            return Ok(tokio::spawn(async move {
                while let Some(telegram) = receiver.recv().await {
                    let data = MeteringData::from_telegram(&telegram, &family, utc_offset);
                    if mqtt_sender.send(data).await.is_err() {
                        error!("MQTT thread is gone");
                        break;
                    }
                }
                drop(mqtt_sender);
                let _ = mqtt_thread.await;
            }));
        }
    }

    #[cfg(not(feature = "mqtt"))]
    if config.mqtt.is_some() {
        warn!("Built without MQTT support, writing telegrams to stdout");
    }

    Ok(tokio::spawn(async move {
        while let Some(telegram) = receiver.recv().await {
            let data = MeteringData::from_telegram(&telegram, &family, utc_offset);
            match serde_json::to_string(&data) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Unable to serialize telegram: {}", e),
            }
        }
    }))
}

async fn read_source(config: &Config, descriptor: Arc<MeterDescriptor>, sender: Sender<Telegram>) -> Result<(), P1Error> {
    /* a fresh pipeline per connection, nothing carries over a reconnect */
    let new_manager = || {
        let pipeline = P1Pipeline::new(descriptor.clone(), config.meter.pipeline_options());
        P1Manager::new(sender.clone(), pipeline, config.meter.failure_threshold)
    };

    match &config.source {
        SourceConfig::Tcp { host, port, reconnect_delay } => loop {
            if sender.is_closed() {
                return Ok(());
            }

            info!("Connecting to {}:{}", host, port);
            match tokio::net::TcpStream::connect((host.as_str(), *port)).await {
                Ok(stream) => {
                    if let Err(e) = new_manager().run(stream).await {
                        warn!("P1 connection lost: {}", e);
                    }
                }
                Err(e) => warn!("Unable to connect to {}:{}: {}", host, port, e),
            }

            tokio::time::sleep(Duration::from_secs(*reconnect_delay)).await;
        },
        SourceConfig::File { path } => {
            let file = tokio::fs::File::open(path).await?;
            new_manager().run(file).await
        }
        SourceConfig::Stdin => new_manager().run(tokio::io::stdin()).await,
    }
}
