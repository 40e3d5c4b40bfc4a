//! STOMP 1.2 text frames: commands, headers, encoding and decoding.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub const CONNECT: &str = "CONNECT";
pub const CONNECTED: &str = "CONNECTED";
pub const SUBSCRIBE: &str = "SUBSCRIBE";
pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
pub const SEND: &str = "SEND";
pub const MESSAGE: &str = "MESSAGE";
pub const RECEIPT: &str = "RECEIPT";
pub const ERROR: &str = "ERROR";
pub const DISCONNECT: &str = "DISCONNECT";

pub const STOMP_VERSION: &str = "1.2";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has no command line")]
    MissingCommand,
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header")]
    BadEscape,
    #[error("invalid content-length")]
    BadContentLength,
    #[error("frame is not NUL-terminated")]
    Unterminated,
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup. When a header repeats, the first occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    /// CONNECT frame offering `heart_beat` as (outgoing ms, incoming ms).
    pub fn connect(host: &str, heart_beat: (u64, u64)) -> Self {
        Self::new(CONNECT)
            .header("accept-version", STOMP_VERSION)
            .header("host", host)
            .header("heart-beat", format!("{},{}", heart_beat.0, heart_beat.1))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(SUBSCRIBE)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(UNSUBSCRIBE).header("id", id)
    }

    pub fn send(destination: &str, json_body: String) -> Self {
        Self::new(SEND)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", json_body.len().to_string())
            .with_body(json_body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Self::new(DISCONNECT).header("receipt", receipt)
    }

    // CONNECT and CONNECTED headers are sent verbatim for 1.0 compatibility.
    fn escapes_headers(&self) -> bool {
        !(self.is(CONNECT) || self.is(CONNECTED))
    }

    pub fn encode(&self) -> String {
        let escape = self.escapes_headers();
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// What a chunk of socket text decoded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A bare end-of-line: the peer's heart-beat.
    Heartbeat,
    Frame(Frame),
}

/// Decode every frame and heart-beat in one WebSocket text message.
pub fn decode(data: &str) -> Result<Vec<Incoming>, FrameError> {
    let mut out = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("\r\n") {
            out.push(Incoming::Heartbeat);
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix('\n') {
            out.push(Incoming::Heartbeat);
            rest = after;
            continue;
        }
        let (frame, after) = decode_frame(rest)?;
        out.push(Incoming::Frame(frame));
        rest = after;
    }

    Ok(out)
}

fn decode_frame(input: &str) -> Result<(Frame, &str), FrameError> {
    let (command, mut rest) = split_line(input).ok_or(FrameError::Unterminated)?;
    if command.is_empty() {
        return Err(FrameError::MissingCommand);
    }
    let unescape = !(command == CONNECT || command == CONNECTED);

    let mut headers = Vec::new();
    loop {
        let (line, after) = split_line(rest).ok_or(FrameError::Unterminated)?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if unescape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| v.trim().parse::<usize>())
        .transpose()
        .map_err(|_| FrameError::BadContentLength)?;

    let (body, after) = match content_length {
        Some(len) => {
            let body = rest.get(..len).ok_or(FrameError::BadContentLength)?;
            let after = rest[len..]
                .strip_prefix('\0')
                .ok_or(FrameError::Unterminated)?;
            (body, after)
        }
        None => {
            let end = rest.find('\0').ok_or(FrameError::Unterminated)?;
            (&rest[..end], &rest[end + 1..])
        }
    };

    let frame = Frame {
        command: command.to_string(),
        headers,
        body: body.to_string(),
    };
    Ok((frame, after))
}

/// Split off one line, accepting `\n` or `\r\n`.
fn split_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = &input[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &input[idx + 1..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::BadEscape),
        }
    }
    Ok(out)
}
