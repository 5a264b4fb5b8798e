//! Incremental server-sent-events parsing.
//!
//! The provider streams `data:` events separated by blank lines. Network
//! chunks can split an event anywhere, so the parser buffers bytes and yields
//! complete payloads as they become available.

/// Push parser for an SSE byte stream.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    pos: usize,
}

impl SseParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete `data:` payload, if one is buffered.
    ///
    /// Comment lines and events without a data field are skipped. Payloads
    /// are returned verbatim, including the `[DONE]` sentinel; terminating
    /// is the caller's call.
    pub fn next_data(&mut self) -> Option<String> {
        loop {
            let (event_end, consumed) = find_event_boundary(&self.buffer[self.pos..])?;
            let start = self.pos;
            let event = &self.buffer[start..start + event_end];
            let data = std::str::from_utf8(event).ok().and_then(extract_data);
            self.pos = start + consumed;

            // Reclaim buffer space once the consumed prefix dominates.
            if self.buffer.len() > 8192 && self.pos > self.buffer.len() / 2 {
                self.buffer.drain(..self.pos);
                self.pos = 0;
            }

            if data.is_some() {
                return data;
            }
        }
    }
}

/// Locate the blank line ending the next event.
///
/// Lines may end in LF or CRLF, mixed freely within one stream. Returns the
/// event's end index and the offset just past the blank line.
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    for (i, byte) in buf.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        match (buf.get(i + 1), buf.get(i + 2)) {
            (Some(b'\n'), _) => return Some((i, i + 2)),
            (Some(b'\r'), Some(b'\n')) => return Some((i, i + 3)),
            _ => {}
        }
    }
    None
}

fn extract_data(event: &str) -> Option<String> {
    for line in event.lines() {
        let line = line.trim();
        if line.starts_with(':') {
            continue;
        }
        if let Some(payload) = line.strip_prefix("data:") {
            let payload = payload.trim();
            if !payload.is_empty() {
                return Some(payload.to_string());
            }
        }
    }
    None
}
