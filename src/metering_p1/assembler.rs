use super::structs::{LineEnding, RawLine, TelegramState};
use super::utils::{calculate_checksum, parse_checksum_field};
use log::{debug, warn};

pub const DEFAULT_MAX_TELEGRAM_LENGTH: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Waiting for a `/` start marker
    Idle,
    Collecting,
    /// `!` seen, the checksum field is being checked
    AwaitingChecksum,
}

/// Framed telegram before the COSEM objects are decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTelegram {
    /// Header line starting at the `/` marker, empty for an orphan terminator
    pub identification: RawLine,
    pub lines: Vec<RawLine>,
    pub checksum_line: Option<RawLine>,
    pub state: TelegramState,
    pub received_crc: Option<u16>,
    pub calculated_crc: Option<u16>,
}

/// Groups lines into telegrams framed by `/` and `!XXXX`.
pub struct TelegramAssembler {
    state: AssemblerState,
    identification: Option<RawLine>,
    lines: Vec<RawLine>,
    /* exact bytes from the '/' marker on, input of the CRC */
    crc_data: Vec<u8>,
    max_telegram_length: usize,
    discarded: usize,
    overflowed: bool,
}

impl TelegramAssembler {
    pub fn new(max_telegram_length: usize) -> Self {
        TelegramAssembler {
            state: AssemblerState::Idle,
            identification: None,
            lines: Vec::new(),
            crc_data: Vec::new(),
            max_telegram_length,
            discarded: 0,
            overflowed: false,
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Feeds one line, returns a telegram when the line closed one
    pub fn push_line(&mut self, line: RawLine) -> Option<RawTelegram> {
        match self.state {
            AssemblerState::Idle | AssemblerState::AwaitingChecksum => self.idle(line),
            AssemblerState::Collecting => {
                if let Some(offset) = restart_offset(&line) {
                    warn!("Start marker inside a telegram, dropping {} collected lines", self.lines.len());
                    let invalid = self.take_invalid();
                    self.start(line, offset);
                    return Some(invalid);
                }

                if line.starts_with(b'!') {
                    self.state = AssemblerState::AwaitingChecksum;
                    return Some(self.complete(line));
                }

                line.write_to(&mut self.crc_data);
                self.lines.push(line);

                if self.crc_data.len() > self.max_telegram_length {
                    warn!("Telegram exceeds {} bytes without end marker, dropping it", self.max_telegram_length);
                    let invalid = self.take_invalid();
                    self.overflowed = true;
                    return Some(invalid);
                }
                None
            }
        }
    }

    /// End of stream: a telegram still collecting is missing its end marker
    pub fn finish(&mut self) -> Option<RawTelegram> {
        self.overflowed = false;
        self.discarded = 0;
        match self.state {
            AssemblerState::Idle => None,
            _ => {
                debug!("Stream ended inside a telegram");
                Some(self.take_invalid())
            }
        }
    }

    fn idle(&mut self, line: RawLine) -> Option<RawTelegram> {
        if let Some(offset) = line.content().iter().position(|b| *b == b'/') {
            if offset > 0 {
                debug!("Dropped {} bytes before the start marker", offset);
            }
            self.start(line, offset);
            return None;
        }

        if line.starts_with(b'!') {
            if std::mem::replace(&mut self.overflowed, false) {
                self.discarded = 0;
                return None;
            }
            if self.discarded > 0 {
                warn!("End marker without start marker after {} discarded lines", self.discarded);
                self.discarded = 0;
                return Some(RawTelegram {
                    identification: RawLine::new(Vec::new(), line.ending()),
                    lines: Vec::new(),
                    checksum_line: Some(line),
                    state: TelegramState::Invalid,
                    received_crc: None,
                    calculated_crc: None,
                });
            }
            return None;
        }

        if !line.is_empty() {
            self.discarded += 1;
        }
        None
    }

    fn start(&mut self, line: RawLine, offset: usize) {
        let identification = if offset > 0 {
            RawLine::new(line.content()[offset..].to_vec(), line.ending())
        } else {
            line
        };

        self.crc_data.clear();
        identification.write_to(&mut self.crc_data);
        self.identification = Some(identification);
        self.lines.clear();
        self.discarded = 0;
        self.overflowed = false;
        self.state = AssemblerState::Collecting;
    }

    fn complete(&mut self, checksum_line: RawLine) -> RawTelegram {
        self.crc_data.push(b'!');
        let calculated = calculate_checksum(&self.crc_data);

        let field = String::from_utf8_lossy(&checksum_line.content()[1..]).trim().to_string();
        let (state, received) = if field.is_empty() {
            /* meters before DSMR 4 send no checksum */
            (TelegramState::Ok, None)
        } else {
            match parse_checksum_field(&field) {
                Some(received) if received == calculated => (TelegramState::Ok, Some(received)),
                Some(received) => {
                    warn!("Checksum mismatch: received {:04X}, calculated {:04X}", received, calculated);
                    (TelegramState::ChecksumError, Some(received))
                }
                None => {
                    warn!("Malformed checksum field '{}'", field);
                    (TelegramState::ChecksumError, None)
                }
            }
        };

        let telegram = RawTelegram {
            identification: self.identification.take().unwrap_or_else(|| RawLine::new(Vec::new(), checksum_line.ending())),
            lines: std::mem::take(&mut self.lines),
            checksum_line: Some(checksum_line),
            state,
            received_crc: received,
            calculated_crc: Some(calculated),
        };
        self.reset();
        debug!("Telegram complete with {} lines, state {}", telegram.lines.len(), telegram.state);
        telegram
    }

    fn take_invalid(&mut self) -> RawTelegram {
        let telegram = RawTelegram {
            identification: self.identification.take().unwrap_or_else(|| RawLine::new(Vec::new(), LineEnding::None)),
            lines: std::mem::take(&mut self.lines),
            checksum_line: None,
            state: TelegramState::Invalid,
            received_crc: None,
            calculated_crc: None,
        };
        self.reset();
        telegram
    }

    fn reset(&mut self) {
        self.state = AssemblerState::Idle;
        self.identification = None;
        self.lines.clear();
        self.crc_data.clear();
    }
}

/* Inside a telegram only line noise may precede a new start marker, a '/'
 * behind printable text is part of the value. */
fn restart_offset(line: &RawLine) -> Option<usize> {
    let content = line.content();
    let offset = content.iter().position(|b| *b == b'/')?;
    if content[..offset].iter().any(|b| b.is_ascii_graphic() || *b == b' ') {
        return None;
    }
    Some(offset)
}

impl Default for TelegramAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TELEGRAM_LENGTH)
    }
}
