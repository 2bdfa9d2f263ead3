use super::assembler::RawTelegram;
use super::meter_definitions::{MeterDescriptor, ValueKind};
use super::structs::{
    CosemNumber, CosemObject, CosemTimestamp, CosemValue, MessageType, RawLine, Telegram, TelegramDiagnostics, Unit,
};
use super::utils::parse_identification_line;
use super::{CosemValueParseError, ValueErrorKind};
use crate::obis_utils::{get_obis_description, ObisCode};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    // 1-0:1.8.1(000123.456*kWh)
    // 0-1:24.2.1(170124210000W)(00671.790*m3)
    static ref OBIS_LINE: Regex =
        Regex::new(r"^\s*(\d{1,3}-\d{1,3}:\d{1,3}\.\d{1,3}\.\d{1,3}(?:[.*]\d{1,3})?)((?:\([^()]*\))+)\s*$").unwrap();
    // (00001.001), the reading of a DSMR 2.2 gas meter on its own line
    static ref CONTINUATION_LINE: Regex = Regex::new(r"^\s*((?:\([^()]*\))+)\s*$").unwrap();
    static ref VALUE_GROUP: Regex = Regex::new(r"\(([^()]*)\)").unwrap();
}

pub enum ParsedLine {
    Object { obis: ObisCode, tokens: Vec<String> },
    Continuation(Vec<String>),
    Empty,
    Skipped,
}

fn value_tokens(groups: &str) -> Vec<String> {
    VALUE_GROUP
        .captures_iter(groups)
        .map(|c| c[1].to_string())
        .collect()
}

/// Splits a data line into OBIS id and raw value tokens
pub fn parse_obis_line(line: &str) -> ParsedLine {
    if line.trim().is_empty() {
        return ParsedLine::Empty;
    }

    if let Some(captures) = OBIS_LINE.captures(line) {
        return match captures[1].parse::<ObisCode>() {
            Ok(obis) => ParsedLine::Object {
                obis,
                tokens: value_tokens(&captures[2]),
            },
            Err(e) => {
                debug!("{}", e);
                ParsedLine::Skipped
            }
        };
    }

    if let Some(captures) = CONTINUATION_LINE.captures(line) {
        return ParsedLine::Continuation(value_tokens(&captures[1]));
    }

    ParsedLine::Skipped
}

fn parse_number(token: &str, default_unit: Option<&Unit>) -> Option<CosemValue> {
    let (number, unit) = match token.split_once('*') {
        Some((number, unit)) => (number, Some(Unit::parse(unit))),
        None => (token, default_unit.cloned()),
    };
    let value = CosemNumber::parse(number)?;
    Some(CosemValue::Number { value, unit })
}

fn parse_flags(token: &str, width: usize) -> Option<CosemValue> {
    if token.len() != width || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let bits = u32::from_str_radix(token, 16).ok()?;
    Some(CosemValue::Flags { raw: token.to_string(), bits })
}

/// Classifies a token by its shape alone
pub fn classify_value(token: &str) -> Result<CosemValue, ValueErrorKind> {
    if token.is_empty() {
        return Ok(CosemValue::Text(String::new()));
    }

    if token.contains('*') {
        return parse_number(token, None).ok_or(ValueErrorKind::InvalidNumber);
    }

    if token.len() == 13 && CosemTimestamp::has_shape(token) {
        return CosemTimestamp::parse(token)
            .map(CosemValue::Timestamp)
            .ok_or(ValueErrorKind::InvalidTimestamp);
    }

    if token.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        if let Some(value) = parse_number(token, None) {
            return Ok(value);
        }
    }

    Ok(CosemValue::Text(token.to_string()))
}

/// Parses a token, a descriptor hint overrides the shape where they disagree
pub fn parse_value(token: &str, hint: Option<&ValueKind>) -> Result<CosemValue, ValueErrorKind> {
    match hint {
        Some(ValueKind::Text) => Ok(CosemValue::Text(token.to_string())),
        Some(_) if token.is_empty() => Ok(CosemValue::Text(String::new())),
        Some(ValueKind::Number(unit)) => parse_number(token, unit.as_ref()).ok_or(ValueErrorKind::InvalidNumber),
        Some(ValueKind::Timestamp) => CosemTimestamp::parse(token)
            .map(CosemValue::Timestamp)
            .ok_or(ValueErrorKind::InvalidTimestamp),
        Some(ValueKind::Flags(width)) => match parse_flags(token, *width) {
            Some(flags) => Ok(flags),
            None => classify_value(token),
        },
        Some(ValueKind::Any) | None => classify_value(token),
    }
}

struct PendingObject {
    obis: ObisCode,
    tokens: Vec<String>,
    line_number: usize,
}

/// Decodes the body lines of assembled telegrams against one meter descriptor.
///
/// The descriptor is shared read only, any number of parsers may use the
/// same one.
#[derive(Clone)]
pub struct CosemParser {
    descriptor: Arc<MeterDescriptor>,
}

impl CosemParser {
    pub fn new(descriptor: Arc<MeterDescriptor>) -> Self {
        CosemParser { descriptor }
    }

    pub fn descriptor(&self) -> &MeterDescriptor {
        &self.descriptor
    }

    pub fn parse(&self, raw: RawTelegram) -> Telegram {
        let mut diagnostics = TelegramDiagnostics::default();

        let header = match raw.identification.as_str() {
            Ok(header) => header.to_string(),
            Err(_) => {
                diagnostics.decode_errors += 1;
                String::from_utf8_lossy(raw.identification.content()).into_owned()
            }
        };
        let device = parse_identification_line(&header);
        let identification = header.strip_prefix('/').unwrap_or(&header).to_string();

        let mut objects = Vec::new();
        let mut pending: Option<PendingObject> = None;

        for (line_number, line) in raw.lines.iter().enumerate() {
            let parsed = match line.as_str() {
                Ok(text) => parse_obis_line(text),
                Err(e) => {
                    warn!("Line {} of telegram '{}': {}", line_number, identification, e);
                    diagnostics.decode_errors += 1;
                    ParsedLine::Skipped
                }
            };

            match parsed {
                ParsedLine::Object { obis, tokens } => {
                    if let Some(previous) = pending.take() {
                        objects.push(self.build_object(previous, &mut diagnostics));
                    }
                    pending = Some(PendingObject { obis, tokens, line_number });
                }
                ParsedLine::Continuation(tokens) => match pending.as_mut() {
                    Some(previous) => previous.tokens.extend(tokens),
                    None => {
                        debug!("Value line without object: {}", describe(line));
                        diagnostics.skipped_lines += 1;
                    }
                },
                ParsedLine::Empty => {}
                ParsedLine::Skipped => {
                    if let Some(previous) = pending.take() {
                        objects.push(self.build_object(previous, &mut diagnostics));
                    }
                    debug!("Skipping line: {}", describe(line));
                    diagnostics.skipped_lines += 1;
                }
            }
        }
        if let Some(previous) = pending.take() {
            objects.push(self.build_object(previous, &mut diagnostics));
        }

        if diagnostics.unknown_objects > 0 {
            debug!("{} OBIS ids not known to {}", diagnostics.unknown_objects, self.descriptor.description());
        }

        Telegram {
            identification,
            device,
            lines: raw.lines,
            checksum_line: raw.checksum_line,
            received_crc: raw.received_crc,
            calculated_crc: raw.calculated_crc,
            state: raw.state,
            objects,
            diagnostics,
        }
    }

    fn build_object(&self, pending: PendingObject, diagnostics: &mut TelegramDiagnostics) -> CosemObject {
        let descriptor = self.descriptor.lookup(&pending.obis);
        let layout = descriptor
            .map(|d| &d.layout)
            .filter(|layout| layout.accepts(pending.tokens.len()));

        if descriptor.is_some() && layout.is_none() {
            debug!("{} carries {} values, not the declared layout", pending.obis, pending.tokens.len());
        }
        let obis_text = pending.obis.to_string();
        if descriptor.is_none() {
            debug!("Unknown OBIS id {} ({})", obis_text, get_obis_description(&obis_text).unwrap_or("no description"));
        }

        let values: Vec<Result<CosemValue, CosemValueParseError>> = pending
            .tokens
            .into_iter()
            .enumerate()
            .map(|(index, token)| {
                let hint = layout.and_then(|l| l.kind_at(index));
                parse_value(&token, hint).map_err(|kind| CosemValueParseError {
                    obis: obis_text.clone(),
                    index,
                    token,
                    kind,
                })
            })
            .collect();

        let mut failed = false;
        for error in values.iter().filter_map(|v| v.as_ref().err()) {
            warn!("{}", error);
            diagnostics.value_errors += 1;
            failed = true;
        }

        /* a declared object whose values do not decode is not trusted as a reading */
        let msg_type = if descriptor.is_some() && !failed { MessageType::Normal } else { MessageType::Unknown };
        if msg_type == MessageType::Unknown {
            diagnostics.unknown_objects += 1;
        }

        CosemObject {
            obis: pending.obis,
            channel: descriptor.map(|d| d.channel.clone()),
            msg_type,
            values,
            line_number: pending.line_number,
        }
    }
}

fn describe(line: &RawLine) -> String {
    String::from_utf8_lossy(line.content()).into_owned()
}
