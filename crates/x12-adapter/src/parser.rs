//! Streaming segment scanner
//!
//! [`SegmentScanner`] pulls one segment at a time from a [`BufRead`], so a
//! large interchange never has to sit in memory. [`BatchScanner`] groups the
//! stream into fixed-size batches for consumers that prefer to work in bulk,
//! and [`X12Parser`] is the all-in-memory convenience on top of both.

use std::io::{BufRead, Cursor, Read};

use tracing::{debug, trace};
use x12_ir::{CancellationToken, Delimiters, Document, RawSegment};

use crate::syntax::{detect_delimiters, DETECT_WINDOW};
use crate::{Error, Result};

/// Lazy scanner producing [`RawSegment`]s in source order
///
/// The scanner owns its reader until [`SegmentScanner::into_inner`] or drop.
pub struct SegmentScanner<R> {
    reader: R,
    delimiters: Delimiters,
    index: usize,
    cancel: Option<CancellationToken>,
    buffer: Vec<u8>,
    finished: bool,
}

impl<R: BufRead> SegmentScanner<R> {
    pub fn new(reader: R, delimiters: Delimiters) -> Self {
        Self {
            reader,
            delimiters,
            index: 0,
            cancel: None,
            buffer: Vec::with_capacity(256),
            finished: false,
        }
    }

    /// Stop between segments once the token is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Number of segments emitted so far
    pub fn scanned(&self) -> usize {
        self.index
    }

    /// Give the reader back
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next segment
    ///
    /// Returns `None` at end of input. After a cancellation or IO error the
    /// scanner is finished and keeps returning `None`.
    pub fn next_segment(&mut self) -> Option<Result<RawSegment>> {
        loop {
            if self.finished {
                return None;
            }
            if self
                .cancel
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
            {
                self.finished = true;
                debug!(segments = self.index, "scan cancelled");
                return Some(Err(Error::Cancelled {
                    segments: self.index,
                }));
            }

            self.buffer.clear();
            let read = match self
                .reader
                .read_until(self.delimiters.segment, &mut self.buffer)
            {
                Ok(n) => n,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(Error::Io(err)));
                }
            };
            if read == 0 {
                self.finished = true;
                return None;
            }
            if self.buffer.last() == Some(&self.delimiters.segment) {
                self.buffer.pop();
            }

            let raw = normalize_line_endings(&self.buffer);
            let trimmed = raw.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }

            let index = self.index;
            self.index += 1;
            return Some(split_segment(trimmed, &self.delimiters, index));
        }
    }
}

impl<R: BufRead> Iterator for SegmentScanner<R> {
    type Item = Result<RawSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment()
    }
}

fn normalize_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().peekable();
    while let Some(&byte) = iter.next() {
        if byte == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(byte);
    }
    out
}

/// Split one terminator-free segment into tag, elements and components
fn split_segment(bytes: &[u8], delimiters: &Delimiters, index: usize) -> Result<RawSegment> {
    let text = String::from_utf8_lossy(bytes);
    let mut tokens = text.split(delimiters.element_char());
    let tag = tokens.next().unwrap_or_default().trim();

    if !(2..=3).contains(&tag.len()) || !tag.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Error::scan(index, format!("invalid segment tag '{tag}'")));
    }

    // ISA16 is the component separator itself
    let split_components = !tag.eq_ignore_ascii_case("ISA");
    let component = delimiters.component_char();
    let elements = tokens
        .map(|token| {
            if split_components && token.contains(component) {
                token.split(component).map(str::to_string).collect()
            } else {
                vec![token.to_string()]
            }
        })
        .collect();

    let segment = RawSegment::from_components(tag, elements, index);
    trace!(index, tag = %segment.tag, elements = segment.element_count(), "scanned segment");
    Ok(segment)
}

/// Accumulates scanned segments and hands them to a consumer in batches
///
/// Scanning pauses while the consumer runs, so the batch size bounds the
/// number of segments held in memory.
pub struct BatchScanner<R> {
    scanner: SegmentScanner<R>,
    batch_size: usize,
}

impl<R: BufRead> BatchScanner<R> {
    /// A batch size of zero is treated as one.
    pub fn new(scanner: SegmentScanner<R>, batch_size: usize) -> Self {
        Self {
            scanner,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Scan to the end, calling `consumer` once per batch
    ///
    /// Returns the number of segments delivered. On cancellation the partial
    /// batch is delivered before the error is returned.
    ///
    /// # Errors
    ///
    /// Propagates scanner errors (converted into `E`) and consumer errors.
    pub fn scan<F, E>(&mut self, mut consumer: F) -> std::result::Result<usize, E>
    where
        F: FnMut(&[RawSegment]) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut delivered = 0;

        while let Some(next) = self.scanner.next_segment() {
            match next {
                Ok(segment) => {
                    batch.push(segment);
                    if batch.len() == self.batch_size {
                        consumer(&batch)?;
                        delivered += batch.len();
                        batch.clear();
                    }
                }
                Err(err) => {
                    if matches!(err, Error::Cancelled { .. }) && !batch.is_empty() {
                        consumer(&batch)?;
                    }
                    return Err(err.into());
                }
            }
        }

        if !batch.is_empty() {
            consumer(&batch)?;
            delivered += batch.len();
        }
        debug!(delivered, batch_size = self.batch_size, "batch scan complete");
        Ok(delivered)
    }

    pub fn into_inner(self) -> SegmentScanner<R> {
        self.scanner
    }
}

/// Detect-then-scan parser for whole interchanges
#[derive(Debug, Clone, Default)]
pub struct X12Parser {
    cancel: Option<CancellationToken>,
}

impl X12Parser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Detect delimiters from the ISA header and scan every segment
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DelimiterDetect`] for input that does not start
    /// with a usable ISA header, or with the first scan error.
    pub fn parse(&self, data: &[u8]) -> Result<Document> {
        let delimiters = detect_delimiters(data)?;
        self.parse_with(data, delimiters)
    }

    /// Scan with known delimiters
    ///
    /// # Errors
    ///
    /// Returns the first scan error or [`Error::Cancelled`].
    pub fn parse_with(&self, data: &[u8], delimiters: Delimiters) -> Result<Document> {
        self.scan_reader(Cursor::new(data), delimiters)
    }

    /// Detect and scan from a reader
    ///
    /// # Errors
    ///
    /// Same as [`X12Parser::parse`], plus IO errors from the reader.
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> Result<Document> {
        let mut header = Vec::with_capacity(DETECT_WINDOW);
        (&mut reader)
            .take(DETECT_WINDOW as u64)
            .read_to_end(&mut header)?;
        let delimiters = detect_delimiters(&header)?;
        self.scan_reader(Cursor::new(header).chain(reader), delimiters)
    }

    fn scan_reader<R: BufRead>(&self, reader: R, delimiters: Delimiters) -> Result<Document> {
        let mut scanner = SegmentScanner::new(reader, delimiters);
        if let Some(token) = &self.cancel {
            scanner = scanner.with_cancellation(token.clone());
        }
        let segments = scanner.collect::<Result<Vec<_>>>()?;
        debug!(segments = segments.len(), "interchange scanned");
        Ok(Document::new(segments, delimiters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240101*1200*U*00401*000000001*0*P*>~\
GS*SM*SENDER*RECEIVER*20240101*1200*1*X*004010~\
ST*204*0001~\
B2**TEST**SHIP123**PP~\
N1*SH*ACME>WEST~\
SE*4*0001~\
GE*1*1~\
IEA*1*000000001~";

    fn scan(input: &str) -> Vec<RawSegment> {
        let delimiters = Delimiters::default();
        SegmentScanner::new(Cursor::new(input.as_bytes()), delimiters)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_scan_sample() {
        let segments = scan(SAMPLE);
        assert_eq!(segments.len(), 8);
        assert_eq!(segments[0].tag, "ISA");
        assert_eq!(segments[7].tag, "IEA");
        let indexes: Vec<usize> = segments.iter().map(|s| s.index).collect();
        assert_eq!(indexes, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_elements_preserved() {
        let segments = scan(SAMPLE);
        let b2 = &segments[3];
        assert_eq!(b2.element_count(), 6);
        assert_eq!(b2.element(1), "");
        assert_eq!(b2.element(2), "TEST");
        assert_eq!(b2.element(3), "");
        assert_eq!(b2.element(6), "PP");
    }

    #[test]
    fn test_components_split_outside_isa() {
        let segments = scan(SAMPLE);
        assert_eq!(segments[0].element(16), ">");
        assert!(segments[4].is_composite(2));
        assert_eq!(segments[4].component(2, 2), "WEST");
    }

    #[test]
    fn test_trailing_terminators_and_whitespace() {
        let segments = scan("ST*204*0001~\r\n  SE*2*0001~\n~~\r\n");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].element(2), "0001");
    }

    #[test]
    fn test_crlf_as_terminator() {
        let delimiters = Delimiters::new(b'*', b'>', b'\n').unwrap();
        let input = "ST*204*0001\r\nSE*2*0001\r\n";
        let segments: Vec<_> = SegmentScanner::new(Cursor::new(input), delimiters)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].element(2), "0001");
    }

    #[test]
    fn test_invalid_tag_is_reported() {
        let delimiters = Delimiters::default();
        let mut scanner = SegmentScanner::new(Cursor::new("ST*1~*X~SE*1~"), delimiters);
        assert!(scanner.next().unwrap().is_ok());
        assert!(matches!(
            scanner.next().unwrap(),
            Err(Error::Scan { index: 1, .. })
        ));
    }

    #[test]
    fn test_cancellation_stops_scan() {
        let token = CancellationToken::new();
        let mut scanner = SegmentScanner::new(Cursor::new(SAMPLE), Delimiters::default())
            .with_cancellation(token.clone());
        assert!(scanner.next().unwrap().is_ok());
        token.cancel();
        assert!(matches!(
            scanner.next().unwrap(),
            Err(Error::Cancelled { segments: 1 })
        ));
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_batches() {
        let scanner = SegmentScanner::new(Cursor::new(SAMPLE), Delimiters::default());
        let mut batcher = BatchScanner::new(scanner, 3);
        let mut sizes = Vec::new();
        let total = batcher
            .scan(|batch| {
                sizes.push(batch.len());
                Ok::<_, Error>(())
            })
            .unwrap();
        assert_eq!(total, 8);
        assert_eq!(sizes, vec![3, 3, 2]);
    }

    #[test]
    fn test_batch_consumer_error_stops_scan() {
        let scanner = SegmentScanner::new(Cursor::new(SAMPLE), Delimiters::default());
        let mut batcher = BatchScanner::new(scanner, 2);
        let mut calls = 0;
        let result = batcher.scan(|_| {
            calls += 1;
            Err(Error::envelope("stop"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_parser_detects_and_extracts_metadata() {
        let doc = X12Parser::new().parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.len(), 8);
        assert_eq!(doc.metadata.isa_control_number, "000000001");
        assert_eq!(doc.metadata.transaction_set_id, "204");
        assert!(doc.check_framing().is_ok());
    }

    #[test]
    fn test_parse_reader_matches_parse() {
        let from_slice = X12Parser::new().parse(SAMPLE.as_bytes()).unwrap();
        let from_reader = X12Parser::new()
            .parse_reader(Cursor::new(SAMPLE.as_bytes()))
            .unwrap();
        assert_eq!(from_slice.segments, from_reader.segments);
    }

    #[test]
    fn test_parser_rejects_non_x12() {
        let err = X12Parser::new().parse(b"HELLO").unwrap_err();
        assert!(matches!(err, Error::DelimiterDetect { .. }));
    }
}
