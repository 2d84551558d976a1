//! Line assembly over a raw byte stream

use bytes::{Buf, BytesMut};
use tracing::warn;

/// Longest line kept before the buffer is considered garbage
const DEFAULT_MAX_LINE: usize = 4096;

/// Splits a byte stream into `\n`-terminated lines
///
/// Partial input is kept across `push` calls. Trailing `\r` is removed and
/// empty lines are skipped.
#[derive(Debug)]
pub struct LineAssembler {
    buf: BytesMut,
    max_line: usize,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            max_line,
        }
    }

    /// Append raw bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > self.max_line && !self.buf.contains(&b'\n') {
            warn!(
                buffered = self.buf.len(),
                "No line terminator within limit, discarding buffered bytes"
            );
            self.buf.clear();
        }
    }

    /// Pop the next complete line, if any
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.buf.iter().position(|b| *b == b'\n')?;
            let raw = self.buf.split_to(pos + 1);
            let text = String::from_utf8_lossy(&raw[..pos]);
            let line = text.trim_end_matches('\r');
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buf.remaining()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_lines_across_pushes() {
        let mut asm = LineAssembler::new();
        asm.push(b"$GPGGA,1,2");
        assert_eq!(asm.next_line(), None);
        asm.push(b",3*00\r\n$GPRMC");
        assert_eq!(asm.next_line().as_deref(), Some("$GPGGA,1,2,3*00"));
        assert_eq!(asm.next_line(), None);
        assert_eq!(asm.pending(), 6);
    }

    #[test]
    fn test_skips_empty_lines() {
        let mut asm = LineAssembler::new();
        asm.push(b"\r\n\na\n\r\nb\n");
        assert_eq!(asm.next_line().as_deref(), Some("a"));
        assert_eq!(asm.next_line().as_deref(), Some("b"));
        assert_eq!(asm.next_line(), None);
    }

    #[test]
    fn test_overflow_discards_garbage() {
        let mut asm = LineAssembler::with_max_line(8);
        asm.push(b"0123456789");
        assert_eq!(asm.pending(), 0);
        asm.push(b"ok\n");
        assert_eq!(asm.next_line().as_deref(), Some("ok"));
    }

    #[test]
    fn test_random_chunking_yields_same_lines() {
        use rand::Rng;

        let stream: Vec<u8> = (0..50)
            .flat_map(|i| format!("*{i},1.0,2.0@\r\n").into_bytes())
            .collect();
        let mut rng = rand::rng();
        let mut asm = LineAssembler::new();
        let mut lines = Vec::new();
        let mut rest = &stream[..];
        while !rest.is_empty() {
            let n = rng.random_range(1..=rest.len().min(7));
            asm.push(&rest[..n]);
            rest = &rest[n..];
            while let Some(line) = asm.next_line() {
                lines.push(line);
            }
        }
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[49], "*49,1.0,2.0@");
    }
}
