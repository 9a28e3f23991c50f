//! mboxrd record encoding and decoding
//!
//! A record is a synthesized `From <address> <date>` line followed by the raw
//! message with every `^>*From ` line quoted by one more `>`. Records in a
//! file are joined by a single `\n`.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

const FROM_PREFIX: &[u8] = b"From ";

/// One message in mboxrd form, From-line included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MboxRecord(Vec<u8>);

impl MboxRecord {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for MboxRecord {
    /// Wrap bytes that are already in mboxrd form
    fn from(bytes: Vec<u8>) -> Self {
        MboxRecord(bytes)
    }
}

/// Encode one raw message as an mboxrd record
pub fn encode_record(raw_message: &[u8], author: &str, date: DateTime<Utc>) -> MboxRecord {
    let mut bytes = from_line(author, date);
    bytes.reserve(raw_message.len() + raw_message.len() / 64);
    escape_from_lines_into(raw_message, &mut bytes);
    MboxRecord(bytes)
}

/// `From <address> <RFC 1123 date>\n`, each char truncated to one byte
pub fn from_line(author: &str, date: DateTime<Utc>) -> Vec<u8> {
    let line = format!(
        "From {} {}\n",
        normalize_sender(author),
        date.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    latin1_bytes(&line)
}

/// Bare address for the From-line.
///
/// Falls back to quoting the display name when the first parse yields no
/// address, and finally to the raw header value.
pub fn normalize_sender(author: &str) -> String {
    if let Some(address) = parse_address(author) {
        return address;
    }

    if let Some((display, rest)) = author.split_once('<') {
        let quoted = format!("\"{}\" <{}", display.trim().replace('"', "\\\""), rest);
        if let Some(address) = parse_address(&quoted) {
            return address;
        }
    }

    author.to_string()
}

fn parse_address(value: &str) -> Option<String> {
    let header = format!("From: {}\r\n\r\n", value);
    let message = MessageParser::default().parse(header.as_bytes())?;
    let address = message.from()?.first()?.address()?.trim();

    // Bare local parts are only trusted when they came from an angle-addr
    let usable = !address.is_empty()
        && (address.contains('@') || value.contains(&format!("<{}>", address)));
    usable.then(|| address.to_string())
}

/// Low 8 bits of each character code
pub fn latin1_bytes(value: &str) -> Vec<u8> {
    value.chars().map(|c| c as u32 as u8).collect()
}

/// Quote every `^>*From ` line with one more `>`
pub fn escape_from_lines(raw_message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw_message.len());
    escape_from_lines_into(raw_message, &mut out);
    out
}

fn escape_from_lines_into(raw_message: &[u8], out: &mut Vec<u8>) {
    for (i, line) in raw_message.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        if is_from_line(line, 0) {
            out.push(b'>');
        }
        out.extend_from_slice(line);
    }
}

/// Undo [`escape_from_lines`]: drop one `>` from every `^>+From ` line
pub fn unescape_from_lines(escaped: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped.len());
    for (i, line) in escaped.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        if is_from_line(line, 1) {
            out.extend_from_slice(&line[1..]);
        } else {
            out.extend_from_slice(line);
        }
    }
    out
}

/// `line` is at least `min_quotes` `>` followed by `From `
fn is_from_line(line: &[u8], min_quotes: usize) -> bool {
    let quotes = line.iter().take_while(|&&b| b == b'>').count();
    quotes >= min_quotes && line[quotes..].starts_with(FROM_PREFIX)
}

/// A message read back out of an mboxrd file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MboxMessage {
    /// Address field of the From-line
    pub from: String,
    /// Date field of the From-line
    pub date: Option<DateTime<Utc>>,
    /// Unescaped raw message
    pub content: Vec<u8>,
}

impl MboxMessage {
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Splits mboxrd bytes back into messages
pub struct MboxReader<'a> {
    data: &'a [u8],
    pos: usize,
    message_count: u64,
}

impl<'a> MboxReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            message_count: 0,
        }
    }

    /// Next message, or `None` once the buffer is exhausted
    pub fn read_message(&mut self) -> Option<MboxMessage> {
        // Skip anything before the first From-line
        while self.pos < self.data.len() && !self.data[self.pos..].starts_with(FROM_PREFIX) {
            self.pos = next_line_start(self.data, self.pos);
        }
        if self.pos >= self.data.len() {
            return None;
        }

        let header_end = next_line_start(self.data, self.pos);
        let header = &self.data[self.pos..header_end];
        let header = header.strip_suffix(b"\n").unwrap_or(header);
        let (from, date) = parse_from_line(&String::from_utf8_lossy(header));

        let body_start = header_end;
        let mut cursor = body_start;
        while cursor < self.data.len() && !self.data[cursor..].starts_with(FROM_PREFIX) {
            cursor = next_line_start(self.data, cursor);
        }

        let mut body = &self.data[body_start..cursor];
        if cursor < self.data.len() {
            // The separator newline belongs to the file, not the message
            body = body.strip_suffix(b"\n").unwrap_or(body);
        }
        self.pos = cursor;
        self.message_count += 1;

        Some(MboxMessage {
            from,
            date,
            content: unescape_from_lines(body),
        })
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }
}

impl Iterator for MboxReader<'_> {
    type Item = MboxMessage;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_message()
    }
}

fn next_line_start(data: &[u8], from: usize) -> usize {
    match data[from..].iter().position(|&b| b == b'\n') {
        Some(offset) => from + offset + 1,
        None => data.len(),
    }
}

/// Parse `From <address> <date>`
fn parse_from_line(line: &str) -> (String, Option<DateTime<Utc>>) {
    let rest = line.strip_prefix("From ").unwrap_or(line);
    let Some((address, date)) = rest.split_once(' ') else {
        return (rest.to_string(), None);
    };

    (address.to_string(), parse_mbox_date(date))
}

/// RFC 1123 dates as written by [`from_line`], or the classic asctime form
fn parse_mbox_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();
    DateTime::parse_from_rfc2822(&date_str.replace("GMT", "+0000"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(date_str, "%a %b %e %H:%M:%S %Y")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 25, 9, 5, 3).unwrap()
    }

    #[test]
    fn test_escape_quotes_one_more_level() {
        let raw = b"Subject: x\n\nFrom here\n>From there\n>>From everywhere\nFrom\nFromage\n From indented";
        let escaped = escape_from_lines(raw);
        assert_eq!(
            escaped,
            b"Subject: x\n\n>From here\n>>From there\n>>>From everywhere\nFrom\nFromage\n From indented".to_vec()
        );
    }

    #[test]
    fn test_escape_applies_to_every_line_and_buffer_start() {
        let raw = b"From a\r\nFrom b\r\n";
        assert_eq!(escape_from_lines(raw), b">From a\r\n>From b\r\n".to_vec());
    }

    #[test]
    fn test_escape_is_case_sensitive() {
        let raw = b"from lowercase\nFROM upper\n";
        assert_eq!(escape_from_lines(raw), raw.to_vec());
    }

    #[test]
    fn test_unescape_restores_original() {
        let samples: [&[u8]; 5] = [
            b"Subject: a\n\nFrom me\n>From you\n>>>From them\n",
            b"no newline at end\nFrom x",
            b"",
            b"\n\n\n",
            b"From \n>\n>From\n",
        ];
        for raw in samples {
            assert_eq!(unescape_from_lines(&escape_from_lines(raw)), raw.to_vec());
        }
    }

    #[test]
    fn test_from_line_format() {
        let line = from_line("Jane Doe <jane@example.com>", date());
        assert_eq!(line, b"From jane@example.com Wed, 25 Dec 2024 09:05:03 GMT\n".to_vec());
    }

    #[test]
    fn test_normalize_sender_fallbacks() {
        assert_eq!(normalize_sender("jane@example.com"), "jane@example.com");
        assert_eq!(normalize_sender("Jane Doe <jane@example.com>"), "jane@example.com");
        assert_eq!(normalize_sender("Doe, Jane <jane@example.com>"), "jane@example.com");
        assert_eq!(normalize_sender("Cron Daemon <root>"), "root");
        assert_eq!(normalize_sender("<MAILER-DAEMON>"), "MAILER-DAEMON");
        assert_eq!(normalize_sender("Undisclosed sender"), "Undisclosed sender");
        assert_eq!(normalize_sender(""), "");
    }

    #[test]
    fn test_latin1_truncation() {
        assert_eq!(latin1_bytes("é"), vec![0xe9]);
        assert_eq!(latin1_bytes("\u{0141}"), vec![0x41]);
    }

    #[test]
    fn test_record_keeps_binary_body() {
        let raw: Vec<u8> = vec![b'S', b':', b' ', 0xff, 0x00, b'\n', b'\n', 0x80, 0xfe];
        let record = encode_record(&raw, "a@example.com", date());
        assert!(record.as_bytes().ends_with(&raw));
        assert!(record.as_bytes().starts_with(b"From a@example.com "));
    }

    #[test]
    fn test_reader_splits_joined_records() {
        let first = encode_record(b"Subject: 1\n\nFrom the start\n", "one@example.com", date());
        let second = encode_record(b"Subject: 2\n\nno trailing newline", "two@example.com", date());
        let mut file = first.into_bytes();
        file.push(b'\n');
        file.extend_from_slice(second.as_bytes());

        let messages: Vec<MboxMessage> = MboxReader::new(&file).collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].from, "one@example.com");
        assert_eq!(messages[0].date, Some(date()));
        assert_eq!(messages[0].content, b"Subject: 1\n\nFrom the start\n".to_vec());
        assert_eq!(messages[1].content, b"Subject: 2\n\nno trailing newline".to_vec());
    }

    #[test]
    fn test_local_part_sender_reads_back() {
        let record = encode_record(b"Subject: x\n\nhi\n", "Cron Daemon <root>", date());
        assert!(record.as_bytes().starts_with(b"From root Wed, 25 Dec 2024 09:05:03 GMT\n"));

        let message = MboxReader::new(record.as_bytes()).read_message().unwrap();
        assert_eq!(message.from, "root");
        assert_eq!(message.date, Some(date()));
        assert_eq!(message.content, b"Subject: x\n\nhi\n".to_vec());
    }

    #[test]
    fn test_reader_parses_asctime_dates() {
        let file = b"From test@example.com Wed Dec 25 12:00:00 2024\nSubject: x\n\nhi\n";
        let message = MboxReader::new(file).read_message().unwrap();
        assert_eq!(
            message.date,
            Some(Utc.with_ymd_and_hms(2024, 12, 25, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_reader_on_empty_input() {
        let mut reader = MboxReader::new(b"");
        assert!(reader.read_message().is_none());
        assert_eq!(reader.message_count(), 0);
    }
}
