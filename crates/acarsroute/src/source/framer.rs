use tracing::{debug, warn};

/// Records larger than this are considered garbage and dropped
pub const MAX_RECORD_SIZE: usize = 1 << 20;

/// Reconstruct discrete JSON records from an unbounded byte stream.
///
/// Framers never fail: what cannot be framed is dropped and framing
/// resumes with a cleared buffer.
pub trait Framer: Send {
    /// Feed a chunk of bytes, get back every record completed by it.
    fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>>;

    /// Flush what is left in the buffer once the stream is over.
    fn finish(&mut self) -> Option<Vec<u8>> {
        None
    }
}

/// Frame records by counting balanced braces.
///
/// Anything before the first `{` is discarded. Braces inside JSON string
/// literals are not counted. A newline inside a string literal can only
/// come from a truncated record: framing resumes after it. The scanning state is kept between calls so
/// that a large record arriving in many chunks is only scanned once.
#[derive(Debug, Default)]
pub struct BraceFramer {
    buffer: Vec<u8>,
    /// How much of the buffer has been scanned already
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl BraceFramer {
    pub fn new() -> Self {
        BraceFramer::default()
    }

    fn reset(&mut self) {
        self.scanned = 0;
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }

    /// Scan the record opened at offset 0 for its closing brace.
    fn closing(&mut self) -> Scan {
        while self.scanned < self.buffer.len() {
            let i = self.scanned;
            let c = self.buffer[i];
            self.scanned += 1;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == b'\\' {
                    self.escaped = true;
                } else if c == b'"' {
                    self.in_string = false;
                } else if c == b'\n' {
                    // raw newlines are not valid within JSON strings
                    return Scan::Broken(i);
                }
                continue;
            }
            match c {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Scan::Complete(i);
                    }
                }
                _ => {}
            }
        }
        Scan::Incomplete
    }
}

enum Scan {
    /// The record ends at this offset
    Complete(usize),
    /// The record is truncated, garbage goes up to this offset
    Broken(usize),
    Incomplete,
}

impl Framer for BraceFramer {
    fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);
        let mut records = Vec::new();
        loop {
            if self.scanned == 0 {
                match self.buffer.iter().position(|&c| c == b'{') {
                    Some(0) => {}
                    Some(i) => {
                        debug!("skipping {} bytes before record", i);
                        self.buffer.drain(..i);
                    }
                    None => {
                        if !self.buffer.is_empty() {
                            debug!("no opening brace in {} bytes", self.buffer.len());
                        }
                        self.buffer.clear();
                        break;
                    }
                }
            }
            match self.closing() {
                Scan::Complete(end) => {
                    let rest = self.buffer.split_off(end + 1);
                    records.push(std::mem::replace(&mut self.buffer, rest));
                    self.reset();
                }
                Scan::Broken(end) => {
                    debug!("dropping {} bytes of a truncated record", end + 1);
                    self.buffer.drain(..=end);
                    self.reset();
                }
                Scan::Incomplete => {
                    if self.buffer.len() > MAX_RECORD_SIZE {
                        warn!(
                            "dropping {} bytes without a complete record",
                            self.buffer.len()
                        );
                        self.buffer.clear();
                        self.reset();
                    }
                    break;
                }
            }
        }
        records
    }
}

/// Frame one record per line.
///
/// Nothing is carried from one line to the next: a line which is not a
/// valid record is simply dropped downstream.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        LineFramer::default()
    }
}

fn line(mut bytes: Vec<u8>) -> Option<Vec<u8>> {
    while bytes.last().is_some_and(|c| c.is_ascii_whitespace()) {
        bytes.pop();
    }
    (!bytes.is_empty()).then_some(bytes)
}

impl Framer for LineFramer {
    fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);
        let mut records = Vec::new();
        while let Some(i) = self.buffer.iter().position(|&c| c == b'\n') {
            let rest = self.buffer.split_off(i + 1);
            let current = std::mem::replace(&mut self.buffer, rest);
            records.extend(line(current));
        }
        if self.buffer.len() > MAX_RECORD_SIZE {
            warn!("dropping a {} bytes line", self.buffer.len());
            self.buffer.clear();
        }
        records
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        line(std::mem::take(&mut self.buffer))
    }
}
