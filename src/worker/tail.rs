//! Line reader over a file that another process is still appending to.

use std::io::{self, BufRead, BufReader, Read};

/// Reads complete lines from a growing file.
///
/// A read that hits end-of-file in the middle of a line keeps the fragment
/// and returns `None`; the rest of the line is picked up on a later call
/// once the writer has appended it. When the writer is known to be done,
/// `take_remainder()` hands out whatever fragment is left.
pub struct LineTail<R> {
    reader: BufReader<R>,
    partial: Vec<u8>,
}

impl<R: Read> LineTail<R> {
    pub fn new(inner: R) -> Self {
        LineTail {
            reader: BufReader::new(inner),
            partial: Vec::new(),
        }
    }

    /// Next complete line without its terminator, or `None` at the current
    /// end of data. Invalid UTF-8 is replaced, not rejected.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.partial)?;
        if read == 0 || self.partial.last() != Some(&b'\n') {
            return Ok(None);
        }
        self.partial.pop();
        if self.partial.last() == Some(&b'\r') {
            self.partial.pop();
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        Ok(Some(line))
    }

    /// Unterminated fragment at the end of the data, if any.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        Some(line)
    }
}
