use super::structs::Unit;
use super::P1Error;
use crate::obis_utils::{ObisCode, ObisPattern};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterFamily {
    Dsmr22,
    Dsmr40,
    Dsmr42,
    Dsmr50,
    Smarty,
    Fluvius,
    EasyMeter,
    Ebz,
}

pub const ALL_FAMILIES: [MeterFamily; 8] = [
    MeterFamily::Dsmr22,
    MeterFamily::Dsmr40,
    MeterFamily::Dsmr42,
    MeterFamily::Dsmr50,
    MeterFamily::Smarty,
    MeterFamily::Fluvius,
    MeterFamily::EasyMeter,
    MeterFamily::Ebz,
];

impl fmt::Display for MeterFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MeterFamily::Dsmr22 => "dsmr22",
            MeterFamily::Dsmr40 => "dsmr40",
            MeterFamily::Dsmr42 => "dsmr42",
            MeterFamily::Dsmr50 => "dsmr50",
            MeterFamily::Smarty => "smarty",
            MeterFamily::Fluvius => "fluvius",
            MeterFamily::EasyMeter => "easymeter",
            MeterFamily::Ebz => "ebz",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MeterFamily {
    type Err = P1Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        /* "DSMR 5.0", "dsmr_5.0" and "dsmr50" all mean the same */
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "dsmr22" | "dsmr2" => Ok(MeterFamily::Dsmr22),
            "dsmr40" | "dsmr4" => Ok(MeterFamily::Dsmr40),
            "dsmr42" => Ok(MeterFamily::Dsmr42),
            "dsmr50" | "dsmr5" => Ok(MeterFamily::Dsmr50),
            "smarty" | "luxembourg" => Ok(MeterFamily::Smarty),
            "fluvius" | "flu5" | "emucs" | "belgium" => Ok(MeterFamily::Fluvius),
            "easymeter" | "esy" | "q3d" => Ok(MeterFamily::EasyMeter),
            "ebz" | "dd3" => Ok(MeterFamily::Ebz),
            _ => Err(P1Error::UnknownMeterFamily(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// Decimal number, the unit fills in when the meter leaves it out
    Number(Option<Unit>),
    Text,
    Timestamp,
    /// Hex digit field of a fixed width
    Flags(usize),
    Any,
}

impl FromStr for ValueKind {
    type Err = P1Error;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match kind.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (kind.trim(), None),
        };

        match (name.to_ascii_lowercase().as_str(), arg) {
            ("number", None) => Ok(ValueKind::Number(None)),
            ("number", Some(unit)) => Ok(ValueKind::Number(Some(Unit::parse(unit)))),
            ("text", None) => Ok(ValueKind::Text),
            ("timestamp", None) => Ok(ValueKind::Timestamp),
            ("flags", Some(width)) => match width.parse::<usize>() {
                Ok(w) if (1..=8).contains(&w) => Ok(ValueKind::Flags(w)),
                _ => Err(P1Error::Config(format!("Invalid flags width in '{}'", kind))),
            },
            ("any", None) => Ok(ValueKind::Any),
            _ => Err(P1Error::Config(format!("Unknown value kind '{}'", kind))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueLayout {
    Fixed(Vec<ValueKind>),
    /// Event logs: a fixed head followed by any number of items
    Repeated { head: Vec<ValueKind>, item: Vec<ValueKind> },
}

impl ValueLayout {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            ValueLayout::Fixed(kinds) => kinds.len() == count,
            ValueLayout::Repeated { head, item } => {
                if count < head.len() {
                    return false;
                }
                if item.is_empty() {
                    return count == head.len();
                }
                (count - head.len()) % item.len() == 0
            }
        }
    }

    pub fn kind_at(&self, index: usize) -> Option<&ValueKind> {
        match self {
            ValueLayout::Fixed(kinds) => kinds.get(index),
            ValueLayout::Repeated { head, item } => {
                if index < head.len() {
                    return head.get(index);
                }
                if item.is_empty() {
                    return None;
                }
                item.get((index - head.len()) % item.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObisDescriptor {
    pub pattern: ObisPattern,
    pub channel: String,
    pub layout: ValueLayout,
}

/// OBIS table of one meter family. Never changed after construction.
#[derive(Debug, Clone)]
pub struct MeterDescriptor {
    family: MeterFamily,
    description: String,
    manufacturer_codes: Vec<String>,
    entries: Vec<ObisDescriptor>,
    index: HashMap<ObisPattern, usize>,
}

impl MeterDescriptor {
    pub fn new(family: MeterFamily, description: &str, manufacturer_codes: &[&str], entries: Vec<ObisDescriptor>) -> Self {
        let mut index = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            index.insert(entry.pattern, i);
        }

        MeterDescriptor {
            family,
            description: description.to_string(),
            manufacturer_codes: manufacturer_codes.iter().map(|c| c.to_string()).collect(),
            entries,
            index,
        }
    }

    pub fn family(&self) -> MeterFamily {
        self.family
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn entries(&self) -> &[ObisDescriptor] {
        &self.entries
    }

    /// Exact match first, then an entry for any M-Bus channel. Channel 0 is
    /// the meter itself and never matches a channel wildcard.
    pub fn lookup(&self, code: &ObisCode) -> Option<&ObisDescriptor> {
        self.index
            .get(&ObisPattern::exact(code))
            .or_else(|| match code.channel() {
                0 => None,
                _ => self.index.get(&ObisPattern::any_channel(code)),
            })
            .map(|i| &self.entries[*i])
    }

    pub fn matches_manufacturer(&self, manufacturer: &str) -> bool {
        if self.manufacturer_codes.is_empty() {
            return true;
        }
        let manufacturer = manufacturer.to_uppercase();
        self.manufacturer_codes.iter().any(|c| *c == manufacturer)
    }

    /// Copy of this descriptor with additional entries, later entries win
    pub fn with_extra(&self, extra: Vec<ObisDescriptor>) -> MeterDescriptor {
        let mut entries = self.entries.clone();
        entries.extend(extra);
        let codes: Vec<&str> = self.manufacturer_codes.iter().map(String::as_str).collect();
        MeterDescriptor::new(self.family, &self.description, &codes, entries)
    }
}

const COUNT: ValueKind = ValueKind::Number(None);

fn num(unit: Unit) -> ValueKind {
    ValueKind::Number(Some(unit))
}

const fn obis(a: u8, b: u8, c: u8, d: u8, e: u8) -> ObisPattern {
    ObisPattern { a, b: Some(b), c, d, e }
}

const fn mbus(c: u8, d: u8, e: u8) -> ObisPattern {
    ObisPattern { a: 0, b: None, c, d, e }
}

fn entry(pattern: ObisPattern, channel: &str, kinds: &[ValueKind]) -> ObisDescriptor {
    ObisDescriptor {
        pattern,
        channel: channel.to_string(),
        layout: ValueLayout::Fixed(kinds.to_vec()),
    }
}

pub fn parse_extra_entry(obis: &str, channel: &str, values: &[String]) -> Result<ObisDescriptor, P1Error> {
    let pattern = obis
        .parse::<ObisPattern>()
        .map_err(|e| P1Error::Config(e.to_string()))?;
    let kinds = values
        .iter()
        .map(|v| v.parse::<ValueKind>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entry(pattern, channel, &kinds))
}

fn energy_tariff_entries() -> Vec<ObisDescriptor> {
    vec![
        entry(obis(1, 0, 1, 8, 1), "energy_consumed_t1", &[num(Unit::KWh)]),
        entry(obis(1, 0, 1, 8, 2), "energy_consumed_t2", &[num(Unit::KWh)]),
        entry(obis(1, 0, 2, 8, 1), "energy_delivered_t1", &[num(Unit::KWh)]),
        entry(obis(1, 0, 2, 8, 2), "energy_delivered_t2", &[num(Unit::KWh)]),
    ]
}

fn phase_entries(voltage: bool) -> Vec<ObisDescriptor> {
    let mut entries = vec![
        entry(obis(1, 0, 31, 7, 0), "current_l1", &[num(Unit::A)]),
        entry(obis(1, 0, 51, 7, 0), "current_l2", &[num(Unit::A)]),
        entry(obis(1, 0, 71, 7, 0), "current_l3", &[num(Unit::A)]),
        entry(obis(1, 0, 21, 7, 0), "power_consumed_l1", &[num(Unit::KW)]),
        entry(obis(1, 0, 41, 7, 0), "power_consumed_l2", &[num(Unit::KW)]),
        entry(obis(1, 0, 61, 7, 0), "power_consumed_l3", &[num(Unit::KW)]),
        entry(obis(1, 0, 22, 7, 0), "power_delivered_l1", &[num(Unit::KW)]),
        entry(obis(1, 0, 42, 7, 0), "power_delivered_l2", &[num(Unit::KW)]),
        entry(obis(1, 0, 62, 7, 0), "power_delivered_l3", &[num(Unit::KW)]),
    ];
    if voltage {
        entries.push(entry(obis(1, 0, 32, 7, 0), "voltage_l1", &[num(Unit::V)]));
        entries.push(entry(obis(1, 0, 52, 7, 0), "voltage_l2", &[num(Unit::V)]));
        entries.push(entry(obis(1, 0, 72, 7, 0), "voltage_l3", &[num(Unit::V)]));
    }
    entries
}

fn power_quality_entries() -> Vec<ObisDescriptor> {
    vec![
        entry(obis(0, 0, 96, 7, 21), "power_failures", &[COUNT]),
        entry(obis(0, 0, 96, 7, 9), "long_power_failures", &[COUNT]),
        ObisDescriptor {
            pattern: obis(1, 0, 99, 97, 0),
            channel: "power_failure_log".to_string(),
            layout: ValueLayout::Repeated {
                head: vec![COUNT, ValueKind::Text],
                item: vec![ValueKind::Timestamp, num(Unit::S)],
            },
        },
        entry(obis(1, 0, 32, 32, 0), "voltage_sags_l1", &[COUNT]),
        entry(obis(1, 0, 52, 32, 0), "voltage_sags_l2", &[COUNT]),
        entry(obis(1, 0, 72, 32, 0), "voltage_sags_l3", &[COUNT]),
        entry(obis(1, 0, 32, 36, 0), "voltage_swells_l1", &[COUNT]),
        entry(obis(1, 0, 52, 36, 0), "voltage_swells_l2", &[COUNT]),
        entry(obis(1, 0, 72, 36, 0), "voltage_swells_l3", &[COUNT]),
    ]
}

fn mbus_entries() -> Vec<ObisDescriptor> {
    vec![
        entry(mbus(24, 1, 0), "mbus_device_type", &[COUNT]),
        entry(mbus(96, 1, 0), "mbus_equipment_id", &[ValueKind::Text]),
        entry(mbus(24, 2, 1), "mbus_reading", &[ValueKind::Timestamp, num(Unit::M3)]),
    ]
}

fn dsmr_common_entries() -> Vec<ObisDescriptor> {
    let mut entries = vec![
        entry(obis(1, 3, 0, 2, 8), "p1_version", &[ValueKind::Text]),
        entry(obis(0, 0, 1, 0, 0), "timestamp", &[ValueKind::Timestamp]),
        entry(obis(0, 0, 96, 1, 1), "equipment_id", &[ValueKind::Text]),
        entry(obis(0, 0, 96, 14, 0), "tariff_indicator", &[ValueKind::Text]),
        entry(obis(1, 0, 1, 7, 0), "power_consumed", &[num(Unit::KW)]),
        entry(obis(1, 0, 2, 7, 0), "power_delivered", &[num(Unit::KW)]),
        entry(obis(0, 0, 96, 13, 0), "text_message", &[ValueKind::Text]),
    ];
    entries.extend(energy_tariff_entries());
    entries.extend(power_quality_entries());
    entries.extend(mbus_entries());
    entries
}

pub fn get_dsmr22_definition() -> MeterDescriptor {
    let mut entries = vec![
        entry(obis(0, 0, 96, 1, 1), "equipment_id", &[ValueKind::Text]),
        entry(obis(0, 0, 96, 14, 0), "tariff_indicator", &[ValueKind::Text]),
        entry(obis(1, 0, 1, 7, 0), "power_consumed", &[num(Unit::KW)]),
        entry(obis(1, 0, 2, 7, 0), "power_delivered", &[num(Unit::KW)]),
        entry(obis(0, 0, 17, 0, 0), "threshold", &[num(Unit::KW)]),
        entry(obis(0, 0, 96, 3, 10), "switch_position", &[ValueKind::Flags(1)]),
        entry(obis(0, 0, 96, 13, 1), "text_message_code", &[ValueKind::Text]),
        entry(obis(0, 0, 96, 13, 0), "text_message", &[ValueKind::Text]),
        entry(mbus(24, 1, 0), "mbus_device_type", &[COUNT]),
        entry(mbus(96, 1, 0), "mbus_equipment_id", &[ValueKind::Text]),
        // Capture time, period, interval, unit and the reading on the next line
        entry(mbus(24, 3, 0), "mbus_reading", &[
            ValueKind::Timestamp,
            ValueKind::Text,
            COUNT,
            COUNT,
            ValueKind::Text,
            ValueKind::Text,
            num(Unit::M3),
        ]),
        entry(mbus(24, 4, 0), "mbus_valve_position", &[ValueKind::Flags(1)]),
    ];
    entries.extend(energy_tariff_entries());

    MeterDescriptor::new(MeterFamily::Dsmr22, "DSMR 2.2", &[], entries)
}

const DSMR_MANUFACTURERS: [&str; 8] = ["ISK", "KFM", "XMX", "KMP", "LGB", "SAG", "ELL", "EST"];

pub fn get_dsmr40_definition() -> MeterDescriptor {
    let mut entries = dsmr_common_entries();
    entries.push(entry(obis(0, 0, 96, 13, 1), "text_message_code", &[ValueKind::Text]));
    entries.extend(phase_entries(false));

    MeterDescriptor::new(MeterFamily::Dsmr40, "DSMR 4.0", &DSMR_MANUFACTURERS, entries)
}

pub fn get_dsmr42_definition() -> MeterDescriptor {
    let mut entries = dsmr_common_entries();
    entries.push(entry(obis(0, 0, 96, 13, 1), "text_message_code", &[ValueKind::Text]));
    entries.extend(phase_entries(false));

    MeterDescriptor::new(MeterFamily::Dsmr42, "DSMR 4.2", &DSMR_MANUFACTURERS, entries)
}

pub fn get_dsmr50_definition() -> MeterDescriptor {
    let mut entries = dsmr_common_entries();
    entries.extend(phase_entries(true));

    MeterDescriptor::new(MeterFamily::Dsmr50, "DSMR 5.0", &DSMR_MANUFACTURERS, entries)
}

pub fn get_smarty_definition() -> MeterDescriptor {
    let mut entries = vec![
        entry(obis(1, 3, 0, 2, 8), "p1_version", &[ValueKind::Text]),
        entry(obis(0, 0, 1, 0, 0), "timestamp", &[ValueKind::Timestamp]),
        entry(obis(0, 0, 42, 0, 0), "logical_device_name", &[ValueKind::Text]),
        entry(obis(1, 0, 1, 8, 0), "energy_consumed", &[num(Unit::KWh)]),
        entry(obis(1, 0, 2, 8, 0), "energy_delivered", &[num(Unit::KWh)]),
        entry(obis(1, 0, 3, 8, 0), "reactive_energy_consumed", &[num(Unit::Kvarh)]),
        entry(obis(1, 0, 4, 8, 0), "reactive_energy_delivered", &[num(Unit::Kvarh)]),
        entry(obis(1, 0, 1, 7, 0), "power_consumed", &[num(Unit::KW)]),
        entry(obis(1, 0, 2, 7, 0), "power_delivered", &[num(Unit::KW)]),
        entry(obis(1, 0, 3, 7, 0), "reactive_power_consumed", &[num(Unit::Kvar)]),
        entry(obis(1, 0, 4, 7, 0), "reactive_power_delivered", &[num(Unit::Kvar)]),
        entry(obis(0, 0, 17, 0, 0), "threshold", &[num(Unit::KVA)]),
        entry(obis(0, 0, 96, 3, 10), "breaker_state", &[ValueKind::Flags(1)]),
        entry(obis(0, 0, 96, 13, 0), "text_message", &[ValueKind::Text]),
    ];
    entries.extend(power_quality_entries());
    entries.extend(phase_entries(true));
    entries.extend(mbus_entries());

    MeterDescriptor::new(MeterFamily::Smarty, "Smarty (Luxembourg)", &["LUX", "SAG"], entries)
}

pub fn get_fluvius_definition() -> MeterDescriptor {
    let mut entries = vec![
        entry(obis(0, 0, 96, 1, 4), "p1_version", &[ValueKind::Text]),
        entry(obis(0, 0, 96, 1, 1), "equipment_id", &[ValueKind::Text]),
        entry(obis(0, 0, 1, 0, 0), "timestamp", &[ValueKind::Timestamp]),
        entry(obis(0, 0, 96, 14, 0), "tariff_indicator", &[ValueKind::Text]),
        entry(obis(1, 0, 1, 7, 0), "power_consumed", &[num(Unit::KW)]),
        entry(obis(1, 0, 2, 7, 0), "power_delivered", &[num(Unit::KW)]),
        entry(obis(1, 0, 1, 4, 0), "average_demand", &[num(Unit::KW)]),
        entry(obis(1, 0, 1, 6, 0), "max_demand_month", &[ValueKind::Timestamp, num(Unit::KW)]),
        entry(obis(0, 0, 96, 3, 10), "breaker_state", &[ValueKind::Flags(1)]),
        entry(obis(0, 0, 17, 0, 0), "limiter_threshold", &[num(Unit::KW)]),
        entry(obis(1, 0, 31, 4, 0), "fuse_supervision_threshold", &[num(Unit::A)]),
        entry(obis(0, 0, 96, 13, 0), "text_message", &[ValueKind::Text]),
        entry(mbus(24, 1, 0), "mbus_device_type", &[COUNT]),
        entry(mbus(96, 1, 1), "mbus_equipment_id", &[ValueKind::Text]),
        entry(mbus(24, 4, 0), "mbus_valve_position", &[ValueKind::Flags(1)]),
        entry(mbus(24, 2, 3), "mbus_reading", &[ValueKind::Timestamp, num(Unit::M3)]),
    ];
    entries.extend(energy_tariff_entries());
    entries.extend(phase_entries(true));

    MeterDescriptor::new(MeterFamily::Fluvius, "Fluvius e-MUCS (Belgium)", &["FLU"], entries)
}

pub fn get_easymeter_definition() -> MeterDescriptor {
    let mut entries = vec![
        entry(obis(0, 0, 1, 0, 0), "timestamp", &[ValueKind::Timestamp]),
        entry(obis(1, 0, 0, 0, 0), "equipment_id", &[ValueKind::Text]),
        entry(obis(1, 0, 1, 8, 0), "total_energy_consumed", &[num(Unit::KWh)]),
        entry(obis(1, 0, 2, 8, 0), "total_energy_delivered", &[num(Unit::KWh)]),
        entry(obis(1, 0, 15, 7, 0), "current_power", &[num(Unit::KW)]),
        entry(obis(1, 0, 32, 7, 0), "voltage_l1", &[num(Unit::V)]),
        entry(obis(1, 0, 52, 7, 0), "voltage_l2", &[num(Unit::V)]),
        entry(obis(1, 0, 72, 7, 0), "voltage_l3", &[num(Unit::V)]),
        entry(obis(1, 0, 31, 7, 0), "current_l1", &[num(Unit::A)]),
        entry(obis(1, 0, 51, 7, 0), "current_l2", &[num(Unit::A)]),
        entry(obis(1, 0, 71, 7, 0), "current_l3", &[num(Unit::A)]),
        entry(obis(1, 0, 14, 7, 0), "frequency", &[num(Unit::Hz)]),
        // EasyMeter specific codes
        entry(obis(1, 0, 32, 32, 0), "voltage_sags_l1", &[COUNT]),
        entry(obis(1, 0, 52, 32, 0), "voltage_sags_l2", &[COUNT]),
        entry(obis(1, 0, 72, 32, 0), "voltage_sags_l3", &[COUNT]),
    ];
    entries.extend(energy_tariff_entries());

    MeterDescriptor::new(MeterFamily::EasyMeter, "EasyMeter Q3D", &["ESY", "EAS"], entries)
}

pub fn get_ebz_definition() -> MeterDescriptor {
    let mut entries = vec![
        entry(obis(0, 0, 1, 0, 0), "timestamp", &[ValueKind::Timestamp]),
        entry(obis(0, 0, 0, 0, 0), "device_id", &[ValueKind::Text]),
        entry(obis(1, 0, 15, 8, 0), "absolute_energy_total", &[num(Unit::KWh)]),
        // Power measurements
        entry(obis(1, 0, 16, 7, 0), "sum_active_power", &[num(Unit::KW)]),
        entry(obis(1, 0, 36, 7, 0), "sum_reactive_power", &[num(Unit::Kvar)]),
        entry(obis(1, 0, 21, 7, 0), "active_power_l1", &[num(Unit::KW)]),
        entry(obis(1, 0, 41, 7, 0), "active_power_l2", &[num(Unit::KW)]),
        entry(obis(1, 0, 61, 7, 0), "active_power_l3", &[num(Unit::KW)]),
        // Voltage and current measurements
        entry(obis(1, 0, 32, 7, 0), "voltage_l1", &[num(Unit::V)]),
        entry(obis(1, 0, 52, 7, 0), "voltage_l2", &[num(Unit::V)]),
        entry(obis(1, 0, 72, 7, 0), "voltage_l3", &[num(Unit::V)]),
        entry(obis(1, 0, 31, 7, 0), "current_l1", &[num(Unit::A)]),
        entry(obis(1, 0, 51, 7, 0), "current_l2", &[num(Unit::A)]),
        entry(obis(1, 0, 71, 7, 0), "current_l3", &[num(Unit::A)]),
        // Power factor and frequency
        entry(obis(1, 0, 13, 7, 0), "power_factor", &[COUNT]),
        entry(obis(1, 0, 14, 7, 0), "frequency", &[num(Unit::Hz)]),
    ];
    entries.extend(energy_tariff_entries());

    MeterDescriptor::new(MeterFamily::Ebz, "EBZ DD3", &["EBZ"], entries)
}

fn build_definition(family: MeterFamily) -> MeterDescriptor {
    match family {
        MeterFamily::Dsmr22 => get_dsmr22_definition(),
        MeterFamily::Dsmr40 => get_dsmr40_definition(),
        MeterFamily::Dsmr42 => get_dsmr42_definition(),
        MeterFamily::Dsmr50 => get_dsmr50_definition(),
        MeterFamily::Smarty => get_smarty_definition(),
        MeterFamily::Fluvius => get_fluvius_definition(),
        MeterFamily::EasyMeter => get_easymeter_definition(),
        MeterFamily::Ebz => get_ebz_definition(),
    }
}

lazy_static! {
    static ref METER_DESCRIPTORS: HashMap<MeterFamily, Arc<MeterDescriptor>> = ALL_FAMILIES
        .iter()
        .map(|family| (*family, Arc::new(build_definition(*family))))
        .collect();
}

/// Shared, read only descriptor of a meter family
pub fn get_meter_descriptor(family: MeterFamily) -> Arc<MeterDescriptor> {
    match METER_DESCRIPTORS.get(&family) {
        Some(descriptor) => descriptor.clone(),
        None => Arc::new(build_definition(family)),
    }
}

pub fn get_meter_descriptor_by_name(name: &str) -> Result<Arc<MeterDescriptor>, P1Error> {
    let family = name.parse::<MeterFamily>()?;
    Ok(get_meter_descriptor(family))
}
