use super::structs::{LineEnding, RawLine};
use super::P1Error;
use log::{debug, warn};

pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Splits an unbounded byte stream into lines terminated by CR, LF or CRLF.
///
/// Chunks of any size are appended with [`LineReader::push`], complete lines
/// are pulled through the `Iterator` implementation. Iteration returns `None`
/// when the buffered input holds no complete line, pushing more bytes makes
/// it yield again. A trailing CR is held back until the next byte shows
/// whether it belongs to a CRLF pair.
///
/// The end line of a telegram (`!` and its checksum) is the exception: it
/// closes at its CR with [`LineEnding::Cr`] so a meter that terminates lines
/// with CR alone is not held back until its next telegram. A LF directly
/// behind such a line is swallowed.
pub struct LineReader {
    buffer: Vec<u8>,
    start: usize,
    max_line_length: usize,
    discarding: bool,
    skip_lf: bool,
}

impl LineReader {
    pub fn new(max_line_length: usize) -> Self {
        LineReader {
            buffer: Vec::new(),
            start: 0,
            max_line_length,
            discarding: false,
            skip_lf: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 && self.start == self.buffer.len() {
            self.buffer.clear();
            self.start = 0;
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet returned as a line
    pub fn has_more(&self) -> bool {
        let swallowed = self.skip_lf && self.buffer.get(self.start) == Some(&b'\n');
        self.buffer.len() - self.start > usize::from(swallowed)
    }

    /// Returns the unterminated rest of the stream, if any
    pub fn finish(&mut self) -> Option<RawLine> {
        let mut rest = self.buffer.split_off(self.start);
        self.buffer.clear();
        self.start = 0;

        let discarding = std::mem::replace(&mut self.discarding, false);
        if std::mem::replace(&mut self.skip_lf, false) && rest.first() == Some(&b'\n') {
            rest.remove(0);
        }
        if rest.is_empty() || discarding {
            return None;
        }

        match rest.split_last() {
            Some((b'\r', content)) => Some(RawLine::new(content.to_vec(), LineEnding::Cr)),
            _ => Some(RawLine::new(rest, LineEnding::None)),
        }
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
    }

    fn too_long(&self, length: usize) -> P1Error {
        warn!("Line exceeds {} bytes ({} buffered), dropping it", self.max_line_length, length);
        P1Error::LineTooLong { limit: self.max_line_length }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Iterator for LineReader {
    type Item = Result<RawLine, P1Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.skip_lf && self.start < self.buffer.len() {
                self.skip_lf = false;
                if self.buffer[self.start] == b'\n' {
                    self.start += 1;
                }
            }

            let unread = &self.buffer[self.start..];
            let position = unread.iter().position(|b| *b == b'\r' || *b == b'\n');

            let (end, ending) = match position {
                None => {
                    let length = unread.len();
                    if self.discarding {
                        /* still inside the oversized line */
                        self.start = self.buffer.len();
                        self.compact();
                        return None;
                    }
                    if length > self.max_line_length {
                        self.start = self.buffer.len();
                        self.compact();
                        self.discarding = true;
                        return Some(Err(self.too_long(length)));
                    }
                    self.compact();
                    return None;
                }
                Some(i) if unread[i] == b'\n' => (i, LineEnding::Lf),
                Some(i) if unread.first() == Some(&b'!') => {
                    self.skip_lf = true;
                    (i, LineEnding::Cr)
                }
                Some(i) => match unread.get(i + 1) {
                    Some(b'\n') => (i, LineEnding::CrLf),
                    Some(_) => (i, LineEnding::Cr),
                    None => {
                        /* CR is the last byte so far, wait for the next one */
                        self.compact();
                        return None;
                    }
                },
            };

            let content = unread[..end].to_vec();
            self.start += end + ending.as_bytes().len();

            if self.discarding {
                debug!("Dropped the tail of an oversized line ({} bytes)", content.len());
                self.discarding = false;
                continue;
            }

            if content.len() > self.max_line_length {
                return Some(Err(self.too_long(content.len())));
            }

            return Some(Ok(RawLine::new(content, ending)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(reader: &mut LineReader) -> Vec<RawLine> {
        reader.by_ref().map(|l| l.unwrap()).collect()
    }

    fn line(content: &str, ending: LineEnding) -> RawLine {
        RawLine::new(content.as_bytes().to_vec(), ending)
    }

    #[test]
    fn test_line_endings() {
        let mut reader = LineReader::default();
        reader.push(b"a\r\nb\nc\rd\r\n\r\n");
        let lines = collect(&mut reader);
        assert_eq!(lines, vec![
            line("a", LineEnding::CrLf),
            line("b", LineEnding::Lf),
            line("c", LineEnding::Cr),
            line("d", LineEnding::CrLf),
            line("", LineEnding::CrLf),
        ]);
        assert!(!reader.has_more());
    }

    #[test]
    fn test_partial_line_is_kept() {
        let mut reader = LineReader::default();
        reader.push(b"1-0:1.8");
        assert!(reader.next().is_none());
        assert!(reader.has_more());
        reader.push(b".1(000123.456*kWh)\r\n");
        assert_eq!(collect(&mut reader), vec![line("1-0:1.8.1(000123.456*kWh)", LineEnding::CrLf)]);
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let mut reader = LineReader::default();
        reader.push(b"abc\r");
        assert!(reader.next().is_none());
        reader.push(b"\ndef\r\n");
        assert_eq!(collect(&mut reader), vec![line("abc", LineEnding::CrLf), line("def", LineEnding::CrLf)]);
    }

    #[test]
    fn test_byte_by_byte_matches_single_chunk() {
        let input = b"/ISK5\\2MT382-1000\r\n\r\n1-0:1.8.1(1*kWh)\r\n!1234\r\nnoise\rmore\n";

        let mut whole = LineReader::default();
        whole.push(input);
        let mut expected = collect(&mut whole);
        expected.extend(whole.finish());

        let mut split = LineReader::default();
        let mut lines = Vec::new();
        for b in input.iter() {
            split.push(std::slice::from_ref(b));
            lines.extend(collect(&mut split));
        }
        lines.extend(split.finish());

        assert_eq!(lines, expected);
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_end_line_closes_at_cr() {
        let mut reader = LineReader::default();
        reader.push(b"1-0:1.8.1(1*kWh)\r!A1B2\r");
        assert_eq!(collect(&mut reader), vec![
            line("1-0:1.8.1(1*kWh)", LineEnding::Cr),
            line("!A1B2", LineEnding::Cr),
        ]);
        assert!(!reader.has_more());

        reader.push(b"/ISK5\r");
        assert!(reader.next().is_none());
        assert_eq!(reader.finish(), Some(line("/ISK5", LineEnding::Cr)));
    }

    #[test]
    fn test_lf_behind_end_line_is_swallowed() {
        let mut reader = LineReader::default();
        reader.push(b"!A1B2\r");
        assert_eq!(collect(&mut reader), vec![line("!A1B2", LineEnding::Cr)]);
        reader.push(b"\n");
        assert!(!reader.has_more());
        assert!(reader.next().is_none());
        reader.push(b"/ISK5\r\n");
        assert_eq!(collect(&mut reader), vec![line("/ISK5", LineEnding::CrLf)]);

        let mut whole = LineReader::default();
        whole.push(b"!A1B2\r\n\n");
        assert_eq!(collect(&mut whole), vec![line("!A1B2", LineEnding::Cr), line("", LineEnding::Lf)]);
    }

    #[test]
    fn test_finish_flushes_partial() {
        let mut reader = LineReader::default();
        reader.push(b"abc\r\n!12");
        assert_eq!(collect(&mut reader).len(), 1);
        assert_eq!(reader.finish(), Some(line("!12", LineEnding::None)));
        assert_eq!(reader.finish(), None);

        reader.push(b"xyz\r");
        assert!(reader.next().is_none());
        assert_eq!(reader.finish(), Some(line("xyz", LineEnding::Cr)));
    }

    #[test]
    fn test_line_too_long_then_resync() {
        let mut reader = LineReader::new(8);
        reader.push(b"0123456789");
        assert!(matches!(reader.next(), Some(Err(P1Error::LineTooLong { limit: 8 }))));
        assert!(reader.next().is_none());
        reader.push(b"abc\r\nok\r\n");
        assert_eq!(collect(&mut reader), vec![line("ok", LineEnding::CrLf)]);
    }

    #[test]
    fn test_line_too_long_in_one_chunk() {
        let mut reader = LineReader::new(4);
        reader.push(b"toolong\r\nok\r\n");
        assert!(matches!(reader.next(), Some(Err(P1Error::LineTooLong { limit: 4 }))));
        assert_eq!(reader.next().unwrap().unwrap(), line("ok", LineEnding::CrLf));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_control_bytes_pass_through() {
        let mut reader = LineReader::default();
        reader.push(b"a\x00\xffb\r\n");
        let lines = collect(&mut reader);
        assert_eq!(lines[0].content(), b"a\x00\xffb");
        assert!(lines[0].as_str().is_err());
    }
}
