//! Lines — physical line splitting over any byte stream.
//!
//! A line ends at `\n`, `\r\n` or a lone `\r`. Bytes beyond the configured
//! maximum are dropped and the line is flagged as truncated.

use std::io::{self, BufRead, BufReader, Read};

use crate::parser::detector::decode_ascii;

/// One physical line, terminator stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    /// 1-based line number
    pub number: usize,
    pub text: String,
    /// Length before truncation
    pub len: usize,
    pub truncated: bool,
}

pub struct LineReader<R> {
    inner: BufReader<R>,
    max_len: usize,
    buf: Vec<u8>,
    /// Previous line ended in `\r`; a leading `\n` belongs to it.
    skip_lf: bool,
    line_no: usize,
}

fn append(buf: &mut Vec<u8>, max_len: usize, chunk: &[u8]) {
    let room = max_len.saturating_sub(buf.len());
    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
}

impl<R: Read> LineReader<R> {
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_len,
            buf: Vec::new(),
            skip_lf: false,
            line_no: 0,
        }
    }

    /// Number of the last line returned.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    pub fn next_line(&mut self) -> io::Result<Option<RawLine>> {
        self.buf.clear();
        let mut len = 0usize;
        let mut started = false;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(started.then(|| self.finish_line(len)));
            }
            if self.skip_lf {
                self.skip_lf = false;
                if available[0] == b'\n' {
                    self.inner.consume(1);
                    continue;
                }
            }
            started = true;

            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(idx) => {
                    let terminator = available[idx];
                    append(&mut self.buf, self.max_len, &available[..idx]);
                    len += idx;
                    self.inner.consume(idx + 1);
                    self.skip_lf = terminator == b'\r';
                    return Ok(Some(self.finish_line(len)));
                }
                None => {
                    let n = available.len();
                    append(&mut self.buf, self.max_len, available);
                    len += n;
                    self.inner.consume(n);
                }
            }
        }
    }

    fn finish_line(&mut self, len: usize) -> RawLine {
        self.line_no += 1;
        RawLine {
            number: self.line_no,
            text: decode_ascii(&self.buf),
            len,
            truncated: len > self.max_len,
        }
    }
}
