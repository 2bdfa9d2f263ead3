use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::Sender;

pub mod assembler;
pub mod line_reader;
pub mod meter_definitions;
pub mod obis_parser;
pub mod structs;
pub mod utils;

use assembler::{TelegramAssembler, DEFAULT_MAX_TELEGRAM_LENGTH};
use line_reader::{LineReader, DEFAULT_MAX_LINE_LENGTH};
use meter_definitions::{get_meter_descriptor_by_name, MeterDescriptor};
use obis_parser::CosemParser;
use structs::Telegram;

const READ_CHUNK_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum P1Error {
    #[error("Line is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),
    #[error("Line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("Unknown meter family '{0}'")]
    UnknownMeterFamily(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueErrorKind {
    InvalidNumber,
    InvalidTimestamp,
}

/// Failure of a single value, the other values of the object stay usable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{obis} value {index} '{token}': {kind:?}")]
pub struct CosemValueParseError {
    pub obis: String,
    pub index: usize,
    pub token: String,
    pub kind: ValueErrorKind,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub max_line_length: usize,
    pub max_telegram_length: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_telegram_length: DEFAULT_MAX_TELEGRAM_LENGTH,
        }
    }
}

/// Line reader, assembler and parser of one connection.
///
/// Bytes go in with [`P1Pipeline::push`], telegrams come out of the
/// `Iterator` implementation in the order their end marker was received.
pub struct P1Pipeline {
    reader: LineReader,
    assembler: TelegramAssembler,
    parser: CosemParser,
}

impl P1Pipeline {
    pub fn new(descriptor: Arc<MeterDescriptor>, options: PipelineOptions) -> Self {
        P1Pipeline {
            reader: LineReader::new(options.max_line_length),
            assembler: TelegramAssembler::new(options.max_telegram_length),
            parser: CosemParser::new(descriptor),
        }
    }

    pub fn for_family(family: &str) -> Result<Self, P1Error> {
        let descriptor = get_meter_descriptor_by_name(family)?;
        Ok(Self::new(descriptor, PipelineOptions::default()))
    }

    pub fn descriptor(&self) -> &MeterDescriptor {
        self.parser.descriptor()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.reader.push(chunk);
    }

    pub fn has_more(&self) -> bool {
        self.reader.has_more()
    }

    /// Flushes the partial last line and the telegram still being collected
    pub fn finish(&mut self) -> Vec<Telegram> {
        let mut telegrams = Vec::new();
        while let Some(result) = self.next() {
            match result {
                Ok(telegram) => telegrams.push(telegram),
                Err(e) => debug!("Dropped at end of stream: {}", e),
            }
        }

        if let Some(line) = self.reader.finish() {
            if let Some(raw) = self.assembler.push_line(line) {
                telegrams.push(self.parser.parse(raw));
            }
        }
        if let Some(raw) = self.assembler.finish() {
            telegrams.push(self.parser.parse(raw));
        }
        telegrams
    }
}

impl Iterator for P1Pipeline {
    type Item = Result<Telegram, P1Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.reader.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            if let Some(raw) = self.assembler.push_line(line) {
                return Some(Ok(self.parser.parse(raw)));
            }
        }
    }
}

/// Blocking pull reader over any `std::io::Read` (serial port, file, socket)
pub struct TelegramReader<R: Read> {
    source: R,
    pipeline: P1Pipeline,
    buffer: Vec<u8>,
    flushed: VecDeque<Telegram>,
    eof: bool,
}

impl<R: Read> TelegramReader<R> {
    pub fn new(source: R, pipeline: P1Pipeline) -> Self {
        TelegramReader {
            source,
            pipeline,
            buffer: vec![0; READ_CHUNK_SIZE],
            flushed: VecDeque::new(),
            eof: false,
        }
    }
}

impl<R: Read> Iterator for TelegramReader<R> {
    type Item = Result<Telegram, P1Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(telegram) = self.flushed.pop_front() {
                return Some(Ok(telegram));
            }
            if self.eof {
                return None;
            }
            if let Some(result) = self.pipeline.next() {
                return Some(result);
            }

            match self.source.read(&mut self.buffer) {
                Ok(0) => {
                    self.eof = true;
                    self.flushed.extend(self.pipeline.finish());
                }
                Ok(n) => self.pipeline.push(&self.buffer[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.eof = true;
                    self.flushed.extend(self.pipeline.finish());
                    return Some(Err(P1Error::Io(e)));
                }
            }
        }
    }
}

/// Reads a P1 stream in a tokio task and sends every telegram to `sender`
pub struct P1Manager {
    sender: Sender<Telegram>,
    pipeline: P1Pipeline,
    failure_threshold: usize,
    consecutive_failures: usize,
    manufacturer_checked: bool,
}

impl P1Manager {
    pub fn new(sender: Sender<Telegram>, pipeline: P1Pipeline, failure_threshold: usize) -> Self {
        Self {
            sender,
            pipeline,
            failure_threshold,
            consecutive_failures: 0,
            manufacturer_checked: false,
        }
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Runs until the source ends or the receiver is dropped
    pub async fn run<S: AsyncRead + Unpin>(&mut self, mut source: S) -> Result<(), P1Error> {
        info!("Starting P1 reader for {}", self.pipeline.descriptor().description());
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = source.read(&mut buffer).await?;
            if n == 0 {
                for telegram in self.pipeline.finish() {
                    if !self.dispatch(telegram).await {
                        break;
                    }
                }
                info!("P1 stream closed");
                return Ok(());
            }

            self.pipeline.push(&buffer[..n]);
            while let Some(result) = self.pipeline.next() {
                match result {
                    Ok(telegram) => {
                        if !self.dispatch(telegram).await {
                            info!("Telegram receiver closed, stopping P1 reader");
                            return Ok(());
                        }
                    }
                    Err(e) => warn!("P1 stream: {}", e),
                }
            }
        }
    }

    async fn dispatch(&mut self, telegram: Telegram) -> bool {
        self.check_manufacturer(&telegram);
        debug!(
            "Telegram {}: {} known objects, {} values",
            telegram.identification(),
            telegram.known_objects().count(),
            telegram.value_count()
        );

        if telegram.is_ok() {
            if self.consecutive_failures >= self.failure_threshold {
                info!("P1 telegrams valid again after {} failures", self.consecutive_failures);
            }
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            debug!("Telegram state {} ({} in a row)", telegram.state(), self.consecutive_failures);
            if self.consecutive_failures == self.failure_threshold {
                error!(
                    "{} consecutive P1 telegrams failed, check the connection and the meter family",
                    self.consecutive_failures
                );
            }
        }

        self.sender.send(telegram).await.is_ok()
    }

    fn check_manufacturer(&mut self, telegram: &Telegram) {
        if self.manufacturer_checked {
            return;
        }
        if let Some(device) = telegram.device() {
            self.manufacturer_checked = true;
            match device.baud_rate() {
                Some(baud) => info!("Meter {} {} announces {} baud", device.manufacturer, device.model, baud),
                None => info!("Meter {} {}", device.manufacturer, device.model),
            }

            let descriptor = self.pipeline.descriptor();
            if !descriptor.matches_manufacturer(&device.manufacturer) {
                warn!(
                    "Meter manufacturer '{}' is unusual for {}, check the configured meter family",
                    device.manufacturer,
                    descriptor.description()
                );
            }
        }
    }
}
