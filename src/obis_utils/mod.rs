use lazy_static::lazy_static;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid OBIS code '{0}'")]
pub struct InvalidObisCode(pub String);

/// OBIS identifier `A-B:C.D.E` with the optional storage group `F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObisCode {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: Option<u8>,
}

impl ObisCode {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8) -> Self {
        ObisCode { a, b, c, d, e, f: None }
    }

    /// Group B carries the M-Bus channel for sub meters (gas, water, heat)
    pub fn channel(&self) -> u8 {
        self.b
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}.{}.{}", self.a, self.b, self.c, self.d, self.e)?;
        if let Some(storage) = self.f {
            write!(f, ".{}", storage)?;
        }
        Ok(())
    }
}

impl Serialize for ObisCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn parse_group(part: &str) -> Option<u8> {
    /* Only plain decimal digits, u8::from_str would accept a leading '+' */
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse::<u8>().ok()
}

/* Splits "A-B:C.D.E[.F|*F]" into its raw groups, B may be '*' for patterns */
fn split_groups(code: &str) -> Option<(&str, &str, Vec<&str>)> {
    let (ab, rest) = code.split_once(':')?;
    let (a, b) = ab.split_once('-')?;
    let groups: Vec<&str> = rest.split(|c| c == '.' || c == '*').collect();
    if groups.len() != 3 && groups.len() != 4 {
        return None;
    }
    Some((a, b, groups))
}

impl FromStr for ObisCode {
    type Err = InvalidObisCode;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_obis_code(code);
        let err = || InvalidObisCode(code.to_string());
        let (a, b, groups) = split_groups(&normalized).ok_or_else(err)?;

        let f = match groups.get(3) {
            Some(storage) => Some(parse_group(storage).ok_or_else(err)?),
            None => None,
        };

        Ok(ObisCode {
            a: parse_group(a).ok_or_else(err)?,
            b: parse_group(b).ok_or_else(err)?,
            c: parse_group(groups[0]).ok_or_else(err)?,
            d: parse_group(groups[1]).ok_or_else(err)?,
            e: parse_group(groups[2]).ok_or_else(err)?,
            f,
        })
    }
}

/// Descriptor key. `b == None` matches every M-Bus channel, the storage group
/// is not part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObisPattern {
    pub a: u8,
    pub b: Option<u8>,
    pub c: u8,
    pub d: u8,
    pub e: u8,
}

impl ObisPattern {
    pub fn exact(code: &ObisCode) -> Self {
        ObisPattern { a: code.a, b: Some(code.b), c: code.c, d: code.d, e: code.e }
    }

    pub fn any_channel(code: &ObisCode) -> Self {
        ObisPattern { b: None, ..Self::exact(code) }
    }
}

impl fmt::Display for ObisPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.b {
            Some(b) => write!(f, "{}-{}:{}.{}.{}", self.a, b, self.c, self.d, self.e),
            None => write!(f, "{}-*:{}.{}.{}", self.a, self.c, self.d, self.e),
        }
    }
}

impl FromStr for ObisPattern {
    type Err = InvalidObisCode;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_obis_code(code);
        let err = || InvalidObisCode(code.to_string());
        let (a, b, groups) = split_groups(&normalized).ok_or_else(err)?;
        if groups.len() != 3 {
            return Err(err());
        }

        let b = match b {
            "*" | "n" => None,
            other => Some(parse_group(other).ok_or_else(err)?),
        };

        Ok(ObisPattern {
            a: parse_group(a).ok_or_else(err)?,
            b,
            c: parse_group(groups[0]).ok_or_else(err)?,
            d: parse_group(groups[1]).ok_or_else(err)?,
            e: parse_group(groups[2]).ok_or_else(err)?,
        })
    }
}

lazy_static! {
    static ref OBIS_DESCRIPTIONS: HashMap<&'static str, &'static str> = get_standard_obis_descriptions();
}

pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    OBIS_DESCRIPTIONS.get(obis_code).copied()
}

pub fn get_standard_obis_descriptions() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();

    // Header and identification
    map.insert("1-3:0.2.8", "P1 version information");
    map.insert("0-0:96.1.4", "P1 version information (e-MUCS)");
    map.insert("0-0:1.0.0", "Date and time");
    map.insert("0-0:96.1.1", "Equipment identifier");
    map.insert("0-0:42.0.0", "Logical device name");
    map.insert("0-0:0.0.0", "Device ID");
    map.insert("1-0:0.0.0", "Equipment identifier");

    // Energy values
    map.insert("1-0:1.8.0", "Active energy + (total)");
    map.insert("1-0:1.8.1", "Active energy + (tariff 1)");
    map.insert("1-0:1.8.2", "Active energy + (tariff 2)");
    map.insert("1-0:2.8.0", "Active energy - (total)");
    map.insert("1-0:2.8.1", "Active energy - (tariff 1)");
    map.insert("1-0:2.8.2", "Active energy - (tariff 2)");
    map.insert("1-0:3.8.0", "Reactive energy + (total)");
    map.insert("1-0:4.8.0", "Reactive energy - (total)");
    map.insert("1-0:15.8.0", "Absolute active energy total");
    map.insert("0-0:96.14.0", "Tariff indicator");

    // Power values
    map.insert("1-0:1.7.0", "Active power + (total)");
    map.insert("1-0:2.7.0", "Active power - (total)");
    map.insert("1-0:3.7.0", "Reactive power + (total)");
    map.insert("1-0:4.7.0", "Reactive power - (total)");
    map.insert("1-0:15.7.0", "Absolute active instantaneous power");
    map.insert("1-0:16.7.0", "Sum active instantaneous power");
    map.insert("1-0:36.7.0", "Sum reactive instantaneous power");
    map.insert("1-0:21.7.0", "Active power + (L1)");
    map.insert("1-0:41.7.0", "Active power + (L2)");
    map.insert("1-0:61.7.0", "Active power + (L3)");
    map.insert("1-0:22.7.0", "Active power - (L1)");
    map.insert("1-0:42.7.0", "Active power - (L2)");
    map.insert("1-0:62.7.0", "Active power - (L3)");
    map.insert("1-0:1.4.0", "Current average demand");
    map.insert("1-0:1.6.0", "Maximum demand of the running month");
    map.insert("0-0:17.0.0", "Actual threshold");

    // Voltage and current values
    map.insert("1-0:32.7.0", "Voltage (L1)");
    map.insert("1-0:52.7.0", "Voltage (L2)");
    map.insert("1-0:72.7.0", "Voltage (L3)");
    map.insert("1-0:31.7.0", "Current (L1)");
    map.insert("1-0:51.7.0", "Current (L2)");
    map.insert("1-0:71.7.0", "Current (L3)");
    map.insert("1-0:31.4.0", "Current limiter threshold");
    map.insert("1-0:13.7.0", "Power factor");
    map.insert("1-0:14.7.0", "Supply frequency");

    // Quality
    map.insert("0-0:96.7.21", "Number of power failures");
    map.insert("0-0:96.7.9", "Number of long power failures");
    map.insert("1-0:99.97.0", "Power failure event log");
    map.insert("1-0:32.32.0", "Number of voltage sags (L1)");
    map.insert("1-0:52.32.0", "Number of voltage sags (L2)");
    map.insert("1-0:72.32.0", "Number of voltage sags (L3)");
    map.insert("1-0:32.36.0", "Number of voltage swells (L1)");
    map.insert("1-0:52.36.0", "Number of voltage swells (L2)");
    map.insert("1-0:72.36.0", "Number of voltage swells (L3)");
    map.insert("0-0:96.3.10", "Breaker state");
    map.insert("0-0:96.13.0", "Text message");
    map.insert("0-0:96.13.1", "Text message code");

    map
}

pub fn normalize_obis_code(code: &str) -> String {
    code.trim().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_obis_code() {
        assert!("0-0:1.0.0".parse::<ObisCode>().is_ok());
        assert!("invalid".parse::<ObisCode>().is_err());
        assert!("1:2.3.4".parse::<ObisCode>().is_err());
        assert!("1-0:1.8".parse::<ObisCode>().is_err());
        assert!("1-0:256.8.0".parse::<ObisCode>().is_err());
        assert_eq!("1-0:+1.8.0".parse::<ObisCode>(), Err(InvalidObisCode("1-0:+1.8.0".to_string())));
    }

    #[test]
    fn test_obis_code_display() {
        let code: ObisCode = " 1-0:1.8.1 ".parse().unwrap();
        assert_eq!(code, ObisCode::new(1, 0, 1, 8, 1));
        assert_eq!(code.to_string(), "1-0:1.8.1");

        let code: ObisCode = "1-0:1.8.0*255".parse().unwrap();
        assert_eq!(code.f, Some(255));
        assert_eq!(code.to_string(), "1-0:1.8.0.255");
    }

    #[test]
    fn test_obis_pattern() {
        let pattern: ObisPattern = "0-*:24.2.1".parse().unwrap();
        assert_eq!(pattern.b, None);
        let gas: ObisCode = "0-4:24.2.1".parse().unwrap();
        assert_eq!(ObisPattern::any_channel(&gas), pattern);
        assert_eq!(pattern.to_string(), "0-*:24.2.1");

        let exact: ObisPattern = "1-0:1.8.1".parse().unwrap();
        assert_eq!(ObisPattern::exact(&ObisCode::new(1, 0, 1, 8, 1)), exact);
        assert_ne!(ObisPattern::exact(&ObisCode::new(1, 1, 1, 8, 1)), exact);
        assert!("1-0:1.8.1.255".parse::<ObisPattern>().is_err());
    }

    #[test]
    fn test_get_obis_description() {
        assert_eq!(get_obis_description("1-0:1.8.1"), Some("Active energy + (tariff 1)"));
        assert_eq!(get_obis_description("1-0:15.7.0"), Some("Absolute active instantaneous power"));
        assert_eq!(get_obis_description("nonexistent"), None);
    }

    #[test]
    fn test_normalize_obis_code() {
        assert_eq!(normalize_obis_code("  1-0:1.8.1  "), "1-0:1.8.1");
        assert_eq!(normalize_obis_code("1-0: 15.7.0"), "1-0:15.7.0");
    }
}
