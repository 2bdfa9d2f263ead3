//! DSMR P1 smart meter reader
//!
//! This library turns the byte stream of a P1 port into checksum validated
//! telegrams and typed COSEM objects, and flattens them for publishing.

pub mod config;
pub mod metering_p1;
pub mod models;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod obis_utils;

// Re-export common types for easier access
pub use config::{Config, ConfigHolder};
pub use metering_p1::{P1Error, P1Manager, P1Pipeline, PipelineOptions, TelegramReader};
pub use metering_p1::structs::{CosemObject, CosemValue, Telegram, TelegramState};
pub use models::MeteringData;

pub fn get_unix_ts() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn get_id(protocol: String, meter_name: &String) -> String {
    return format!("{}-{}-{:?}", protocol, meter_name, get_unix_ts());
}
