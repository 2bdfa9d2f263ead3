use super::{CosemValueParseError, P1Error};
use crate::obis_utils::ObisCode;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Cr,
    Lf,
    CrLf,
    /// Partial line flushed at the end of the stream
    None,
}

impl LineEnding {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
            LineEnding::None => b"",
        }
    }
}

/// One line as received, terminator kept apart so the checksum can be
/// computed over the exact bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    content: Vec<u8>,
    ending: LineEnding,
}

impl RawLine {
    pub fn new(content: Vec<u8>, ending: LineEnding) -> Self {
        RawLine { content, ending }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn ending(&self) -> LineEnding {
        self.ending
    }

    pub fn as_str(&self) -> Result<&str, P1Error> {
        Ok(std::str::from_utf8(&self.content)?)
    }

    pub fn starts_with(&self, marker: u8) -> bool {
        self.content.first() == Some(&marker)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn len(&self) -> usize {
        self.content.len() + self.ending.as_bytes().len()
    }

    /// Appends content and terminator to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.content);
        out.extend_from_slice(self.ending.as_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelegramState {
    Ok,
    ChecksumError,
    Invalid,
}

impl fmt::Display for TelegramState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TelegramState::Ok => "OK",
            TelegramState::ChecksumError => "CHECKSUM_ERROR",
            TelegramState::Invalid => "INVALID",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Normal,
    /// OBIS id not present in the descriptor of the active meter family
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Unit {
    Wh,
    KWh,
    W,
    KW,
    Var,
    Kvar,
    Varh,
    Kvarh,
    VA,
    KVA,
    V,
    A,
    Hz,
    M3,
    GJ,
    S,
    Other(String),
}

impl Unit {
    pub fn parse(unit: &str) -> Unit {
        match unit.to_ascii_lowercase().as_str() {
            "wh" => Unit::Wh,
            "kwh" => Unit::KWh,
            "w" => Unit::W,
            "kw" => Unit::KW,
            "var" => Unit::Var,
            "kvar" => Unit::Kvar,
            "varh" => Unit::Varh,
            "kvarh" => Unit::Kvarh,
            "va" => Unit::VA,
            "kva" => Unit::KVA,
            "v" => Unit::V,
            "a" => Unit::A,
            "hz" => Unit::Hz,
            "m3" | "m\u{b3}" => Unit::M3,
            "gj" => Unit::GJ,
            "s" => Unit::S,
            _ => Unit::Other(unit.to_string()),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::Wh => "Wh",
            Unit::KWh => "kWh",
            Unit::W => "W",
            Unit::KW => "kW",
            Unit::Var => "var",
            Unit::Kvar => "kvar",
            Unit::Varh => "varh",
            Unit::Kvarh => "kvarh",
            Unit::VA => "VA",
            Unit::KVA => "kVA",
            Unit::V => "V",
            Unit::A => "A",
            Unit::Hz => "Hz",
            Unit::M3 => "m3",
            Unit::GJ => "GJ",
            Unit::S => "s",
            Unit::Other(other) => other,
        };
        write!(f, "{}", s)
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Decimal number kept as mantissa and scale, `001.230` stays three decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosemNumber {
    raw: String,
    mantissa: i64,
    scale: u32,
}

impl CosemNumber {
    pub fn parse(raw: &str) -> Option<CosemNumber> {
        let unsigned = raw.strip_prefix(|c| c == '+' || c == '-').unwrap_or(raw);
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (unsigned, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if unsigned.contains('.') && (frac_part.is_empty() || !frac_part.bytes().all(|b| b.is_ascii_digit())) {
            return None;
        }

        let digits = format!("{}{}", int_part, frac_part);
        let mut mantissa = digits.parse::<i64>().ok()?;
        if raw.starts_with('-') {
            mantissa = -mantissa;
        }

        Some(CosemNumber {
            raw: raw.to_string(),
            mantissa,
            scale: frac_part.len() as u32,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    /// Number of decimal places as transmitted
    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn as_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }
}

impl fmt::Display for CosemNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        if self.scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }

        let scale = self.scale as usize;
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

/// `YYMMDDhhmmssX` where X is `S` (summer time) or `W` (winter time).
/// Older meters leave the flag out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosemTimestamp {
    raw: String,
    local: NaiveDateTime,
    dst: Option<bool>,
}

impl CosemTimestamp {
    pub fn has_shape(raw: &str) -> bool {
        let bytes = raw.as_bytes();
        match bytes.len() {
            12 => bytes.iter().all(|b| b.is_ascii_digit()),
            13 => bytes[..12].iter().all(|b| b.is_ascii_digit()) && matches!(bytes[12], b'S' | b'W'),
            _ => false,
        }
    }

    pub fn parse(raw: &str) -> Option<CosemTimestamp> {
        if !Self::has_shape(raw) {
            return None;
        }

        let field = |start: usize| raw[start..start + 2].parse::<u32>().ok();
        let date = NaiveDate::from_ymd_opt(2000 + field(0)? as i32, field(2)?, field(4)?)?;
        let local = date.and_hms_opt(field(6)?, field(8)?, field(10)?)?;
        let dst = match raw.as_bytes().get(12) {
            Some(b'S') => Some(true),
            Some(b'W') => Some(false),
            _ => None,
        };

        Some(CosemTimestamp { raw: raw.to_string(), local, dst })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    pub fn is_dst(&self) -> Option<bool> {
        self.dst
    }

    /// Resolves the local time with the meter's standard offset, one hour is
    /// added for summer time stamps.
    pub fn to_fixed_offset(&self, standard_offset_secs: i32) -> Option<DateTime<FixedOffset>> {
        let secs = match self.dst {
            Some(true) => standard_offset_secs + 3600,
            _ => standard_offset_secs,
        };
        let offset = FixedOffset::east_opt(secs)?;
        self.local.and_local_timezone(offset).single()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CosemValue {
    Number { value: CosemNumber, unit: Option<Unit> },
    Text(String),
    Timestamp(CosemTimestamp),
    Flags { raw: String, bits: u32 },
}

impl CosemValue {
    pub fn unit(&self) -> Option<&Unit> {
        match self {
            CosemValue::Number { unit, .. } => unit.as_ref(),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&CosemNumber> {
        match self {
            CosemValue::Number { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(CosemNumber::as_f64)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CosemValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&CosemTimestamp> {
        match self {
            CosemValue::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn as_flags(&self) -> Option<u32> {
        match self {
            CosemValue::Flags { bits, .. } => Some(*bits),
            _ => None,
        }
    }

    /// Equipment identifiers and text messages are hex encoded ASCII
    pub fn decode_hex_text(&self) -> Option<String> {
        let bytes = hex::decode(self.as_text()?).ok()?;
        String::from_utf8(bytes).ok()
    }
}

impl fmt::Display for CosemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CosemValue::Number { value, unit: Some(unit) } => write!(f, "{}*{}", value.raw(), unit),
            CosemValue::Number { value, unit: None } => write!(f, "{}", value.raw()),
            CosemValue::Text(text) => write!(f, "{}", text),
            CosemValue::Timestamp(ts) => write!(f, "{}", ts.raw()),
            CosemValue::Flags { raw, .. } => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosemObject {
    pub(crate) obis: ObisCode,
    pub(crate) channel: Option<String>,
    pub(crate) msg_type: MessageType,
    pub(crate) values: Vec<Result<CosemValue, CosemValueParseError>>,
    pub(crate) line_number: usize,
}

impl CosemObject {
    pub fn obis(&self) -> &ObisCode {
        &self.obis
    }

    /// Channel name from the meter descriptor, `None` when the OBIS id is not listed
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn is_unknown(&self) -> bool {
        self.msg_type == MessageType::Unknown
    }

    pub fn values(&self) -> &[Result<CosemValue, CosemValueParseError>] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&CosemValue> {
        self.values.get(index)?.as_ref().ok()
    }

    pub fn valid_values(&self) -> impl Iterator<Item = &CosemValue> {
        self.values.iter().filter_map(|v| v.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = &CosemValueParseError> {
        self.values.iter().filter_map(|v| v.as_ref().err())
    }

    /// Position of the source line inside the telegram body
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentification {
    pub manufacturer: String,
    pub baud_rate_id: char,
    pub enhanced_id: Option<char>,
    pub model: String,
}

impl DeviceIdentification {
    /// IEC 62056-21 baud rate characters '0'..'6' (mode C/D)
    pub fn baud_rate(&self) -> Option<u32> {
        let n = self.baud_rate_id.to_digit(10)?;
        if n > 6 {
            return None;
        }
        Some(300 << n)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelegramDiagnostics {
    pub unknown_objects: usize,
    pub value_errors: usize,
    pub skipped_lines: usize,
    pub decode_errors: usize,
}

/// One assembled and decoded telegram. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    pub(crate) identification: String,
    pub(crate) device: Option<DeviceIdentification>,
    pub(crate) lines: Vec<RawLine>,
    pub(crate) checksum_line: Option<RawLine>,
    pub(crate) received_crc: Option<u16>,
    pub(crate) calculated_crc: Option<u16>,
    pub(crate) state: TelegramState,
    pub(crate) objects: Vec<CosemObject>,
    pub(crate) diagnostics: TelegramDiagnostics,
}

impl Telegram {
    pub fn state(&self) -> TelegramState {
        self.state
    }

    pub fn is_ok(&self) -> bool {
        self.state == TelegramState::Ok
    }

    /// Header text after the `/` marker
    pub fn identification(&self) -> &str {
        &self.identification
    }

    pub fn device(&self) -> Option<&DeviceIdentification> {
        self.device.as_ref()
    }

    pub fn lines(&self) -> &[RawLine] {
        &self.lines
    }

    pub fn checksum_line(&self) -> Option<&RawLine> {
        self.checksum_line.as_ref()
    }

    pub fn received_crc(&self) -> Option<u16> {
        self.received_crc
    }

    pub fn calculated_crc(&self) -> Option<u16> {
        self.calculated_crc
    }

    pub fn cosem_objects(&self) -> &[CosemObject] {
        &self.objects
    }

    pub fn known_objects(&self) -> impl Iterator<Item = &CosemObject> {
        self.objects.iter().filter(|o| !o.is_unknown())
    }

    pub fn unknown_objects(&self) -> impl Iterator<Item = &CosemObject> {
        self.objects.iter().filter(|o| o.is_unknown())
    }

    pub fn find(&self, obis: &ObisCode) -> Option<&CosemObject> {
        self.objects.iter().find(|o| o.obis == *obis)
    }

    pub fn find_channel(&self, channel: &str) -> Option<&CosemObject> {
        self.objects.iter().find(|o| o.channel() == Some(channel))
    }

    /// Number of value slots over all objects, failed ones included
    pub fn value_count(&self) -> usize {
        self.objects.iter().map(|o| o.values.len()).sum()
    }

    pub fn diagnostics(&self) -> &TelegramDiagnostics {
        &self.diagnostics
    }
}
