//! STOMP 1.2 frame codec.
//!
//! One frame travels per WebSocket text message:
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! \n
//! body\0
//! ```
//!
//! Lines may end in `\r\n`. Header values are escaped (`\\`, `\n`, `\r`,
//! `\c`) in every frame except CONNECT and CONNECTED. When a frame carries
//! `content-length`, exactly that many body bytes are read.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("frame headers are not terminated by a blank line")]
    UnterminatedHeaders,

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    #[error("frame body is not terminated by NUL")]
    MissingNul,
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header; the first occurrence wins
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// ERROR frame with a short message header and a detail body
    pub fn error(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Command::Error)
            .header("message", message)
            .header("content-type", "text/plain")
            .with_body(detail)
    }

    pub fn receipt(receipt_id: impl Into<String>) -> Self {
        Self::new(Command::Receipt).header("receipt-id", receipt_id)
    }

    /// Parse one frame.
    ///
    /// Returns `Ok(None)` for a heart-beat (only end-of-line characters).
    pub fn parse(input: &str) -> Result<Option<Frame>, FrameError> {
        let input = input.trim_start_matches(['\r', '\n']);
        if input.is_empty() {
            return Ok(None);
        }

        let mut offset = 0;
        let mut lines = Vec::new();
        loop {
            let end = input[offset..]
                .find('\n')
                .map(|i| offset + i)
                .ok_or(FrameError::UnterminatedHeaders)?;
            let line = &input[offset..end];
            let line = line.strip_suffix('\r').unwrap_or(line);
            offset = end + 1;
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }

        let mut lines = lines.into_iter();
        let command: Command = lines
            .next()
            .ok_or(FrameError::UnterminatedHeaders)?
            .parse()?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let rest = &input[offset..];
        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.trim().parse::<usize>().map_err(|_| FrameError::InvalidContentLength(v.clone())))
            .transpose()?;

        let body = match content_length {
            Some(len) => {
                let body = rest
                    .get(..len)
                    .ok_or_else(|| FrameError::InvalidContentLength(len.to_string()))?;
                if !rest[len..].starts_with('\0') {
                    return Err(FrameError::MissingNul);
                }
                body
            }
            None => {
                let end = rest.find('\0').ok_or(FrameError::MissingNul)?;
                &rest[..end]
            }
        };

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_string(),
        }))
    }

    /// Serialize to wire text, adding content-length for non-empty bodies
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        let escape_headers = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_frame() {
        let frame = Frame::parse("SEND\ndestination:/app/hello\n\nWorld\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Send);
        assert_eq!(frame.get("destination"), Some("/app/hello"));
        assert_eq!(frame.body, "World");
    }

    #[test]
    fn test_parse_crlf_and_trailing_eol() {
        let frame = Frame::parse("SUBSCRIBE\r\nid:sub-0\r\ndestination:/topic/greetings\r\n\r\n\0\n")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Subscribe);
        assert_eq!(frame.get("id"), Some("sub-0"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_heartbeat_is_not_a_frame() {
        assert_eq!(Frame::parse("\n").unwrap(), None);
        assert_eq!(Frame::parse("\r\n").unwrap(), None);
    }

    #[test]
    fn test_content_length_allows_nul_in_body() {
        let frame = Frame::parse("SEND\ndestination:/topic/a\ncontent-length:3\n\na\0b\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn test_first_header_occurrence_wins() {
        let frame = Frame::parse("SEND\ndestination:/topic/a\ndestination:/topic/b\n\n\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.get("destination"), Some("/topic/a"));
    }

    #[test]
    fn test_header_unescaping() {
        let frame = Frame::parse("SEND\nkey:a\\cb\\nc\\\\d\n\n\0").unwrap().unwrap();
        assert_eq!(frame.get("key"), Some("a:b\nc\\d"));
    }

    #[test]
    fn test_connect_headers_are_verbatim() {
        let frame = Frame::parse("CONNECT\nlogin:a\\c\n\n\0").unwrap().unwrap();
        assert_eq!(frame.get("login"), Some("a\\c"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Frame::parse("HELLO\n\n\0"),
            Err(FrameError::UnknownCommand("HELLO".to_string()))
        );
        assert_eq!(Frame::parse("SEND\ndestination:/a"), Err(FrameError::UnterminatedHeaders));
        assert_eq!(
            Frame::parse("SEND\nnocolon\n\n\0"),
            Err(FrameError::MalformedHeader("nocolon".to_string()))
        );
        assert_eq!(Frame::parse("SEND\n\nbody"), Err(FrameError::MissingNul));
        assert!(matches!(
            Frame::parse("SEND\nkey:\\t\n\n\0"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            Frame::parse("SEND\ncontent-length:abc\n\n\0"),
            Err(FrameError::InvalidContentLength(_))
        ));
        assert!(matches!(
            Frame::parse("SEND\ncontent-length:10\n\nabc\0"),
            Err(FrameError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn test_encode_message_frame() {
        let frame = Frame::new(Command::Message)
            .header("subscription", "sub-0")
            .header("destination", "/topic/greetings")
            .with_body("Hello: World");

        assert_eq!(
            frame.encode(),
            "MESSAGE\nsubscription:sub-0\ndestination:/topic/greetings\ncontent-length:12\n\nHello: World\0"
        );
    }

    #[test]
    fn test_encode_escapes_header_values() {
        let frame = Frame::new(Command::Error).header("message", "bad:thing\nhappened");
        assert_eq!(frame.encode(), "ERROR\nmessage:bad\\cthing\\nhappened\n\n\0");
    }

    #[test]
    fn test_encoded_frame_parses_back() {
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/a:b")
            .with_body("multi\nline");
        let parsed = Frame::parse(&frame.encode()).unwrap().unwrap();
        assert_eq!(parsed.get("destination"), Some("/topic/a:b"));
        assert_eq!(parsed.body, "multi\nline");
    }
}
