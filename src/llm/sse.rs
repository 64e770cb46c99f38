//! Line-oriented decoding shared by the streaming providers.
//!
//! Both SSE (`data: {...}` lines) and NDJSON (one JSON object per line)
//! arrive as arbitrary byte chunks; this buffers partial lines across chunks
//! and hands complete trimmed lines to the caller.

/// Accumulates raw bytes and yields complete lines.
pub(crate) struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Feed a chunk of bytes from the wire.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Pop the next complete line, trimmed. Returns `None` until a newline
    /// arrives.
    pub fn next_line(&mut self) -> Option<String> {
        let line_end = self.buf.find('\n')?;
        let line = self.buf[..line_end].trim().to_string();
        self.buf = self.buf[line_end + 1..].to_string();
        Some(line)
    }
}

/// Strip the SSE `data: ` prefix, returning the JSON payload of a data line.
/// Comment lines, event names and blank keep-alives return `None`.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))
}
