use crate::metering_p1::meter_definitions::{get_meter_descriptor_by_name, parse_extra_entry, MeterDescriptor};
use crate::metering_p1::{P1Error, PipelineOptions};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;

fn source_reconnect_delay_default() -> u64 { 10 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Serial to network bridge (ser2net, ESP-Link, ...)
    Tcp {
        host: String,
        port: u16,
        #[serde(default="source_reconnect_delay_default")]
        reconnect_delay: u64,
    },
    /// Serial device node or recorded telegram file
    File { path: String },
    Stdin,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ExtraObisConfig {
    pub obis: String,
    pub channel: String,
    pub values: Vec<String>,
}

fn meter_max_line_length_default() -> usize { 1024 }
fn meter_max_telegram_length_default() -> usize { 16 * 1024 }
fn meter_failure_threshold_default() -> usize { 10 }
fn meter_utc_offset_default() -> i32 { 3600 }
fn meter_extra_obis_default() -> Vec<ExtraObisConfig> { Vec::new() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MeterConfig {
    pub family: String,
    #[serde(default="meter_max_line_length_default")]
    pub max_line_length: usize,
    #[serde(default="meter_max_telegram_length_default")]
    pub max_telegram_length: usize,
    #[serde(default="meter_failure_threshold_default")]
    pub failure_threshold: usize,
    /// Standard (winter) offset of the meter clock in seconds
    #[serde(default="meter_utc_offset_default")]
    pub utc_offset: i32,
    #[serde(default="meter_extra_obis_default")]
    pub extra_obis: Vec<ExtraObisConfig>,
}

impl MeterConfig {
    /// Descriptor of the configured family, extended by `extra_obis`
    pub fn descriptor(&self) -> Result<Arc<MeterDescriptor>, P1Error> {
        let descriptor = get_meter_descriptor_by_name(&self.family)?;
        if self.extra_obis.is_empty() {
            return Ok(descriptor);
        }

        let extra = self
            .extra_obis
            .iter()
            .map(|e| parse_extra_entry(&e.obis, &e.channel, &e.values))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Adding {} OBIS entries to {}", extra.len(), descriptor.description());
        Ok(Arc::new(descriptor.with_extra(extra)))
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            max_line_length: self.max_line_length,
            max_telegram_length: self.max_telegram_length,
        }
    }
}

fn mqtt_port_default() -> u16 { 1883 }
fn mqtt_client_name_default() -> String { "dsmr2mqtt".to_string() }
fn mqtt_base_topic_default() -> String { "dsmr2mqtt".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_base_topic_default")]
    pub base_topic: String,
}

fn source_default() -> SourceConfig { SourceConfig::Stdin }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default="source_default")]
    pub source: SourceConfig,
    pub meter: MeterConfig,
    /// Telegrams go to stdout as JSON lines when no broker is configured
    pub mqtt: Option<MqttConfig>,
}

impl Config {
    pub fn parse(contents: &str) -> Result<Self, P1Error> {
        let config: Config = serde_yml::from_str(contents).map_err(|e| P1Error::Config(e.to_string()))?;
        /* fail early on a bad meter section instead of at the first connection */
        config.meter.descriptor()?;
        Ok(config)
    }
}

pub struct ConfigHolder {
    pub config: Config,
    pub path: String,
}

const CONFIG_PATHS: [&str; 2] = ["config/p1.yaml", "p1.yaml"];

impl ConfigHolder {
    /// Loads the given file, or the first of `config/p1.yaml` and `p1.yaml`
    pub fn load(path: Option<&str>) -> Result<Self, P1Error> {
        let path = match path {
            Some(path) => path.to_string(),
            None => CONFIG_PATHS
                .iter()
                .find(|p| fs::metadata(p).is_ok())
                .map(|p| p.to_string())
                .ok_or_else(|| P1Error::Config("Unable to find config/p1.yaml or p1.yaml".to_string()))?,
        };

        let contents = fs::read_to_string(&path)
            .map_err(|e| P1Error::Config(format!("Unable to read {}: {}", path, e)))?;
        let config = Config::parse(&contents)?;
        info!("Loaded config from {}", path);

        Ok(ConfigHolder { config, path })
    }
}
