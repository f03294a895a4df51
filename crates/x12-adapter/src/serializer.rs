//! Segment writer
//!
//! X12 has no release character, so a value containing the element,
//! component or segment separator cannot be written and is rejected.
//! Repetition separators pass through, since repeated elements stay joined
//! in a scanned value.

use std::io::Write;

use x12_ir::{Delimiters, RawSegment};

use crate::{Error, Result};

/// Writes segments with a fixed separator set
#[derive(Debug, Clone)]
pub struct X12Serializer {
    delimiters: Delimiters,
    line_ending: String,
    trim_trailing_spaces: bool,
}

impl X12Serializer {
    pub fn new(delimiters: Delimiters) -> Self {
        Self {
            delimiters,
            line_ending: String::new(),
            trim_trailing_spaces: false,
        }
    }

    /// Text written after each segment terminator (`""`, `"\n"`, `"\r\n"`)
    ///
    /// Ignored when the terminator is itself a line feed.
    #[must_use]
    pub fn with_line_ending(mut self, line_ending: impl Into<String>) -> Self {
        self.line_ending = line_ending.into();
        self
    }

    /// Strip trailing spaces from element values (ISA keeps its fixed widths)
    #[must_use]
    pub fn with_trim_trailing_spaces(mut self, trim: bool) -> Self {
        self.trim_trailing_spaces = trim;
        self
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Append one segment, terminator and line ending to `out`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialize`] when a value contains an active separator.
    pub fn write_segment(&self, segment: &RawSegment, out: &mut String) -> Result<()> {
        let is_isa = segment.is("ISA");
        let mut prepared = segment.clone();
        for (position, components) in prepared.elements.iter_mut().enumerate() {
            for value in components.iter_mut() {
                if self.trim_trailing_spaces && !is_isa {
                    value.truncate(value.trim_end_matches(' ').len());
                }
                // ISA16 carries the component separator itself
                if is_isa && position == 15 {
                    continue;
                }
                if let Some(byte) = value.bytes().find(|&b| self.collides(b)) {
                    return Err(Error::Serialize {
                        tag: segment.tag.clone(),
                        index: segment.index,
                        message: format!(
                            "element {} contains separator '{}'",
                            position + 1,
                            byte.escape_ascii()
                        ),
                    });
                }
            }
        }

        out.push_str(&prepared.encode(&self.delimiters));
        out.push(self.delimiters.segment_char());
        if self.delimiters.segment != b'\n' {
            out.push_str(&self.line_ending);
        }
        Ok(())
    }

    fn collides(&self, byte: u8) -> bool {
        byte == self.delimiters.element
            || byte == self.delimiters.component
            || byte == self.delimiters.segment
    }

    /// Write a segment list into one string
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Serialize`].
    pub fn serialize(&self, segments: &[RawSegment]) -> Result<String> {
        let mut out = String::with_capacity(segments.len() * 48);
        for segment in segments {
            self.write_segment(segment, &mut out)?;
        }
        Ok(out)
    }

    /// Stream a segment list into a writer
    ///
    /// # Errors
    ///
    /// Serialization errors and IO errors from the writer.
    pub fn write_to<W: Write>(&self, segments: &[RawSegment], mut writer: W) -> Result<()> {
        let mut line = String::new();
        for segment in segments {
            line.clear();
            self.write_segment(segment, &mut line)?;
            writer.write_all(line.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Default for X12Serializer {
    fn default() -> Self {
        Self::new(Delimiters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::X12Parser;

    const SAMPLE: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240101*1200*U*00401*000000001*0*P*>~\
GS*SM*SENDER*RECEIVER*20240101*1200*1*X*004010~\
ST*204*0001~\
B2**TEST**SHIP123**PP~\
N1*SH*ACME>WEST~\
SE*4*0001~\
GE*1*1~\
IEA*1*000000001~";

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let doc = X12Parser::new().parse(SAMPLE.as_bytes()).unwrap();
        let written = X12Serializer::new(doc.delimiters)
            .serialize(&doc.segments)
            .unwrap();
        assert_eq!(written, SAMPLE);
    }

    #[test]
    fn test_line_endings() {
        let segs = vec![
            RawSegment::new("ST", ["204", "0001"], 0),
            RawSegment::new("SE", ["2", "0001"], 1),
        ];
        let out = X12Serializer::default()
            .with_line_ending("\r\n")
            .serialize(&segs)
            .unwrap();
        assert_eq!(out, "ST*204*0001~\r\nSE*2*0001~\r\n");

        let newline = Delimiters::new(b'*', b'>', b'\n').unwrap();
        let out = X12Serializer::new(newline)
            .with_line_ending("\n")
            .serialize(&segs)
            .unwrap();
        assert_eq!(out, "ST*204*0001\nSE*2*0001\n");
    }

    #[test]
    fn test_trim_trailing_spaces() {
        let seg = RawSegment::new("N1", ["SH", "ACME   "], 3);
        let mut out = String::new();
        X12Serializer::default()
            .with_trim_trailing_spaces(true)
            .write_segment(&seg, &mut out)
            .unwrap();
        assert_eq!(out, "N1*SH*ACME~");
    }

    #[test]
    fn test_separator_in_value_rejected() {
        let seg = RawSegment::new("N1", ["SH", "A*B"], 3);
        let err = X12Serializer::default()
            .serialize(std::slice::from_ref(&seg))
            .unwrap_err();
        assert!(matches!(err, Error::Serialize { index: 3, .. }));
    }

    #[test]
    fn test_write_to() {
        let segs = vec![RawSegment::new("GE", ["1", "1"], 0)];
        let mut buf = Vec::new();
        X12Serializer::default().write_to(&segs, &mut buf).unwrap();
        assert_eq!(buf, b"GE*1*1~");
    }
}
