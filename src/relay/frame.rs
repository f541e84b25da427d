//! Relay wire frames
//!
//! One frame is one line of UTF-8 JSON terminated by `\n`. Parsing is
//! lenient: unknown commands and fields are ignored, missing booleans read
//! as `false`.

use crate::error::{UplinkError, UplinkResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 768;

/// Commands sent from the main unit to the companion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd")]
pub enum RelayCommand {
    #[serde(rename = "pub")]
    Publish { data: Value },
    #[serde(rename = "status")]
    StatusQuery,
}

/// Connectivity report sent by the companion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayStatusFrame {
    pub status: String,
    pub wifi: bool,
    pub mqtt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl RelayStatusFrame {
    pub fn ok(wifi: bool, mqtt: bool, ip: Option<String>) -> Self {
        Self {
            status: "ok".to_string(),
            wifi,
            mqtt,
            ip,
        }
    }
}

/// Any frame a reader may receive
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Command(RelayCommand),
    Status(RelayStatusFrame),
    /// Well-formed JSON we have no use for
    Ignored,
}

/// Serialize a frame without its terminator, enforcing the length cap
pub fn encode_frame<T: Serialize>(frame: &T, max_len: usize) -> UplinkResult<String> {
    let line = serde_json::to_string(frame)
        .map_err(|e| UplinkError::frame_malformed(format!("encode failed: {e}")))?;
    if line.len() > max_len {
        return Err(UplinkError::payload_too_large(line.len(), max_len));
    }
    Ok(line)
}

/// Parse one received line
pub fn parse_frame(line: &str) -> UplinkResult<InboundFrame> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| UplinkError::frame_malformed(format!("invalid JSON: {e}")))?;
    let Value::Object(ref fields) = value else {
        return Err(UplinkError::frame_malformed("frame is not a JSON object"));
    };

    if let Some(cmd) = fields.get("cmd") {
        return Ok(match cmd.as_str() {
            Some("pub") => match fields.get("data") {
                Some(data @ Value::Object(_)) => {
                    InboundFrame::Command(RelayCommand::Publish { data: data.clone() })
                }
                _ => return Err(UplinkError::frame_malformed("pub frame without data object")),
            },
            Some("status") => InboundFrame::Command(RelayCommand::StatusQuery),
            other => {
                debug!("Ignoring unknown relay command {:?}", other);
                InboundFrame::Ignored
            }
        });
    }

    if fields.contains_key("status") {
        let status: RelayStatusFrame = serde_json::from_value(value)
            .map_err(|e| UplinkError::frame_malformed(format!("bad status frame: {e}")))?;
        return Ok(InboundFrame::Status(status));
    }

    Ok(InboundFrame::Ignored)
}

fn is_json(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok()
}

#[derive(Debug)]
enum ReadMode {
    Normal,
    /// Skipping the rest of an oversized line
    Discarding,
    /// Buffering after a `{` seen while discarding; offsets of every `{` in the buffer
    Resync(Vec<usize>),
}

/// Byte-at-a-time line assembler with a hard length cap
///
/// After an oversized line is discarded, buffering restarts at the next `{`.
/// Braces from the garbage may still precede the real frame, so when that
/// line ends it is cut at the earliest `{` whose remainder is valid JSON.
#[derive(Debug)]
pub struct LineAccumulator {
    buffer: Vec<u8>,
    max_len: usize,
    mode: ReadMode,
    dropped: u32,
}

impl LineAccumulator {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_len),
            max_len,
            mode: ReadMode::Normal,
            dropped: 0,
        }
    }

    /// Feed one byte; returns a complete line when a terminator arrives
    pub fn push(&mut self, byte: u8) -> Option<String> {
        if matches!(self.mode, ReadMode::Discarding) {
            self.skip(byte);
            return None;
        }

        match byte {
            b'\r' => None,
            b'\n' => self.finish_line(),
            _ => {
                if self.buffer.len() >= self.max_len && !self.slide() {
                    warn!("Relay frame exceeded {} bytes, discarding", self.max_len);
                    self.buffer.clear();
                    self.mode = ReadMode::Discarding;
                    self.dropped += 1;
                    return None;
                }
                if byte == b'{' {
                    if let ReadMode::Resync(starts) = &mut self.mode {
                        starts.push(self.buffer.len());
                    }
                }
                self.buffer.push(byte);
                None
            }
        }
    }

    fn skip(&mut self, byte: u8) {
        match byte {
            b'\n' => self.mode = ReadMode::Normal,
            b'{' => {
                self.buffer.clear();
                self.buffer.push(byte);
                self.mode = ReadMode::Resync(vec![0]);
            }
            _ => {}
        }
    }

    /// Make room while resyncing by dropping everything before the second `{`
    fn slide(&mut self) -> bool {
        let ReadMode::Resync(starts) = &mut self.mode else {
            return false;
        };
        if starts.len() < 2 {
            return false;
        }
        let cut = starts[1];
        self.buffer.drain(..cut);
        starts.remove(0);
        for start in starts.iter_mut() {
            *start -= cut;
        }
        true
    }

    fn finish_line(&mut self) -> Option<String> {
        let mode = std::mem::replace(&mut self.mode, ReadMode::Normal);
        if self.buffer.is_empty() {
            return None;
        }

        let mut bytes = std::mem::take(&mut self.buffer);
        if let ReadMode::Resync(starts) = mode {
            if let Some(&start) = starts.iter().find(|&&start| is_json(&bytes[start..])) {
                bytes.drain(..start);
            }
        }

        match String::from_utf8(bytes) {
            Ok(line) => Some(line),
            Err(_) => {
                warn!("Discarding relay frame with invalid UTF-8");
                self.dropped += 1;
                None
            }
        }
    }

    /// Feed a chunk; returns every line completed by it
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Frames thrown away for length or encoding
    pub fn dropped_frames(&self) -> u32 {
        self.dropped
    }
}
