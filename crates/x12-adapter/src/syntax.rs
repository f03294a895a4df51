//! Delimiter detection
//!
//! X12 carries its separators inside the fixed-layout ISA header: the byte
//! after `ISA` is the element separator, ISA16 is the component separator
//! and the byte after ISA16 terminates the segment. From 00501 on, ISA11
//! may carry a repetition separator instead of the `U` standards id.

use tracing::{debug, trace};
use x12_ir::Delimiters;

use crate::{Error, Result};

/// Bytes inspected when looking for the ISA header
pub const DETECT_WINDOW: usize = 200;

/// Number of element separators inside an ISA segment
pub const ISA_SEPARATOR_COUNT: usize = 16;

/// First interchange version that carries a repetition separator in ISA11
pub const REPETITION_VERSION: &str = "00501";

/// Detect the separator set from the start of an interchange
///
/// Only the first [`DETECT_WINDOW`] bytes are examined.
///
/// # Errors
///
/// Returns [`Error::DelimiterDetect`] when the buffer is shorter than four
/// bytes, does not start with `ISA`, or no component and segment separator
/// can be resolved.
pub fn detect_delimiters(data: &[u8]) -> Result<Delimiters> {
    if data.len() < 4 {
        return Err(Error::delimiter_detect(format!(
            "input too short ({} bytes) to hold an ISA header",
            data.len()
        )));
    }
    if !data.starts_with(b"ISA") {
        return Err(Error::delimiter_detect(
            "input does not start with an ISA segment",
        ));
    }

    let window = &data[..data.len().min(DETECT_WINDOW)];
    let element = window[3];
    if element.is_ascii_alphanumeric() || element.is_ascii_whitespace() {
        return Err(Error::delimiter_detect(format!(
            "'{}' cannot be an element separator",
            element.escape_ascii()
        )));
    }

    let (component, segment, end) = match structured_scan(window, element) {
        Some(found) => found,
        None => {
            debug!("ISA header not fully framed, falling back to terminator scan");
            fallback_scan(window, element).ok_or_else(|| {
                Error::delimiter_detect("could not resolve component and segment separators")
            })?
        }
    };

    let mut delimiters = Delimiters::new(element, component, segment)
        .map_err(|err| Error::delimiter_detect(err.to_string()))?;

    if let Some(repetition) = repetition_separator(&window[..end], element) {
        match delimiters.with_repetition(repetition) {
            Ok(with_rep) => delimiters = with_rep,
            Err(err) => debug!(%err, "ignoring ISA11 repetition separator"),
        }
    }

    trace!(
        element = %delimiters.element_char(),
        component = %delimiters.component_char(),
        segment = %delimiters.segment.escape_ascii(),
        "detected delimiters"
    );
    Ok(delimiters)
}

/// Count separators across the fixed ISA layout; returns component,
/// segment and the terminator offset
fn structured_scan(window: &[u8], element: u8) -> Option<(u8, u8, usize)> {
    let mut seen = 0;
    for (offset, &byte) in window.iter().enumerate().skip(3) {
        if byte != element {
            continue;
        }
        seen += 1;
        if seen == ISA_SEPARATOR_COUNT {
            let component = *window.get(offset + 1)?;
            let terminator_at = offset + 2;
            let segment = resolve_terminator(window, terminator_at)?;
            let plausible = !component.is_ascii_alphanumeric()
                && component != element
                && segment != element
                && segment != component;
            return plausible.then_some((component, segment, terminator_at));
        }
    }
    None
}

/// First `~`, LF or CR, with ISA16 right before it and an element
/// separator before that
fn fallback_scan(window: &[u8], element: u8) -> Option<(u8, u8, usize)> {
    let at = window
        .iter()
        .skip(4)
        .position(|b| matches!(b, b'~' | b'\n' | b'\r'))?
        + 4;
    if at < 2 || window[at - 2] != element {
        return None;
    }
    let component = window[at - 1];
    let segment = resolve_terminator(window, at)?;
    Some((component, segment, at))
}

/// A CR immediately followed by LF terminates on the LF, since the scanner
/// folds CRLF into LF
fn resolve_terminator(window: &[u8], at: usize) -> Option<u8> {
    let byte = *window.get(at)?;
    if byte == b'\r' && window.get(at + 1) == Some(&b'\n') {
        return Some(b'\n');
    }
    Some(byte)
}

fn repetition_separator(header: &[u8], element: u8) -> Option<u8> {
    let fields: Vec<&[u8]> = header.split(|&b| b == element).collect();
    let isa11 = fields.get(11)?;
    let isa12 = fields.get(12)?;
    if isa12.len() != 5 || isa12 < &REPETITION_VERSION.as_bytes() {
        return None;
    }
    match isa11 {
        [byte] if !byte.is_ascii_alphanumeric() && !byte.is_ascii_whitespace() => Some(*byte),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISA_4010: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240101*1200*U*00401*000000001*0*P*>~";
    const ISA_5010: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240101*1200*^*00501*000000001*0*P*:~";

    #[test]
    fn test_standard_header() {
        assert_eq!(ISA_4010.len(), 106);
        let d = detect_delimiters(ISA_4010.as_bytes()).unwrap();
        assert_eq!(d.element, b'*');
        assert_eq!(d.component, b'>');
        assert_eq!(d.segment, b'~');
        assert_eq!(d.repetition, None);
    }

    #[test]
    fn test_custom_delimiters() {
        let isa = ISA_4010.replace('*', "`").replace('>', "<");
        let input = format!("{isa}GS`SM`A`B~");
        let d = detect_delimiters(input.as_bytes()).unwrap();
        assert_eq!(d.element, b'`');
        assert_eq!(d.component, b'<');
        assert_eq!(d.segment, b'~');
    }

    #[test]
    fn test_repetition_separator_from_5010() {
        let d = detect_delimiters(ISA_5010.as_bytes()).unwrap();
        assert_eq!(d.repetition, Some(b'^'));
        assert_eq!(d.component, b':');
    }

    #[test]
    fn test_standards_id_is_not_repetition() {
        let isa = ISA_5010.replace("*^*", "*U*");
        let d = detect_delimiters(isa.as_bytes()).unwrap();
        assert_eq!(d.repetition, None);
    }

    #[test]
    fn test_newline_terminator() {
        let isa = ISA_4010.replace('~', "\n");
        let d = detect_delimiters(isa.as_bytes()).unwrap();
        assert_eq!(d.segment, b'\n');
    }

    #[test]
    fn test_crlf_terminator_resolves_to_lf() {
        let input = ISA_4010.replace('~', "\r\n");
        let d = detect_delimiters(input.as_bytes()).unwrap();
        assert_eq!(d.segment, b'\n');
    }

    #[test]
    fn test_not_isa() {
        let err = detect_delimiters(b"HELLO").unwrap_err();
        assert!(matches!(err, Error::DelimiterDetect { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_short_prefixes_fail() {
        for len in 0..16 {
            let prefix = &ISA_4010.as_bytes()[..len];
            assert!(
                matches!(detect_delimiters(prefix), Err(Error::DelimiterDetect { .. })),
                "prefix of {len} bytes should not detect"
            );
        }
    }

    #[test]
    fn test_fallback_when_layout_is_shifted() {
        // sender id carries a stray separator, shifting the fixed layout
        let input = b"ISA*00**00**ZZ*S*X*ZZ*R*240101*1200*U*00401*1*0*P*>~GS*FA~";
        let d = detect_delimiters(input).unwrap();
        assert_eq!(d.component, b'>');
        assert_eq!(d.segment, b'~');
    }

    #[test]
    fn test_truncated_header_without_terminator() {
        let truncated = &ISA_4010.as_bytes()[..100];
        assert!(detect_delimiters(truncated).is_err());
    }
}
