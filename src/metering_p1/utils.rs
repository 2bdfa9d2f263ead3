use super::structs::DeviceIdentification;
use crc16::{State, ARC};
use log::debug;

pub fn parse_identification_line(line: &str) -> Option<DeviceIdentification> {
    // Example formats:
    // /ISk5\2MT382-1000
    // /KFM5KAIFA-METER
    // /ESY5Q3D\@V5.3 (EasyMeter, '@' is not a mode digit)

    let content = line.strip_prefix('/')?;
    let mut chars = content.chars();

    // Manufacturer (three characters, the third one lower case means short reaction time)
    let manufacturer: String = chars.by_ref().take(3).collect();
    if manufacturer.chars().count() != 3 {
        return None;
    }
    let baud_rate_id = chars.next()?;

    let rest = chars.as_str();
    let (enhanced_id, model) = match rest.strip_prefix('\\') {
        Some(after) => match after.chars().next() {
            Some(c) if c.is_ascii_digit() => (Some(c), after[c.len_utf8()..].to_string()),
            _ => (None, rest.to_string()),
        },
        None => (None, rest.to_string()),
    };

    debug!("Parsed identification - Manufacturer: {}, Baud: {}, Model: {}",
           manufacturer, baud_rate_id, model);

    Some(DeviceIdentification {
        manufacturer,
        baud_rate_id,
        enhanced_id,
        model,
    })
}

/// CRC16 as used by DSMR P1: polynomial 0x8005 reflected (0xA001), initial value 0
pub fn calculate_checksum(data: &[u8]) -> u16 {
    State::<ARC>::calculate(data)
}

/// Parses the hex digits of a `!XXXX` line, case insensitive
pub fn parse_checksum_field(field: &str) -> Option<u16> {
    if field.len() != 4 || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(field, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identification_line() {
        let device_info = parse_identification_line("/ISk5\\2MT382-1000").unwrap();
        assert_eq!(device_info.manufacturer, "ISk");
        assert_eq!(device_info.baud_rate_id, '5');
        assert_eq!(device_info.enhanced_id, Some('2'));
        assert_eq!(device_info.model, "MT382-1000");

        let device_info = parse_identification_line("/ESY5Q3D\\@V5.3").unwrap();
        assert_eq!(device_info.manufacturer, "ESY");
        assert_eq!(device_info.enhanced_id, None);
        assert_eq!(device_info.model, "Q3D\\@V5.3");

        let device_info = parse_identification_line("/KFM5KAIFA-METER").unwrap();
        assert_eq!(device_info.model, "KAIFA-METER");
    }

    #[test]
    fn test_parse_identification_line_rejects_short() {
        assert!(parse_identification_line("/IS").is_none());
        assert!(parse_identification_line("/ISK").is_none());
        assert!(parse_identification_line("ISK5MT382").is_none());
    }

    #[test]
    fn test_checksum_reference_value() {
        assert_eq!(calculate_checksum(b"123456789"), 0xBB3D);
        assert_eq!(calculate_checksum(b""), 0);
    }

    #[test]
    fn test_parse_checksum_field() {
        assert_eq!(parse_checksum_field("BB3D"), Some(0xBB3D));
        assert_eq!(parse_checksum_field("bb3d"), Some(0xBB3D));
        assert_eq!(parse_checksum_field("BB3"), None);
        assert_eq!(parse_checksum_field("+B3D"), None);
        assert_eq!(parse_checksum_field("BB3D0"), None);
    }
}
