//! Parse cursor and the lexical primitives every grammar is built from.
//!
//! A [`ParseCursor`] is created per physical line and passed by `&mut` into
//! each primitive. Primitives advance the cursor on success and leave it
//! untouched on failure, so a grammar can try one shape and fall back to
//! another without bookkeeping. Failure is an ordinary [`LexError`] value.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use super::units;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("no timestamp")]
    NoTimestamp,
    #[error("no date stamp")]
    NoDatestamp,
    #[error("no type name")]
    NoTypeName,
    #[error("no number")]
    NoNumber,
    #[error("no memory information")]
    NoMemory,
    #[error("unterminated memory information")]
    UnterminatedMemory,
    #[error("no pause")]
    NoPause,
    #[error("unterminated pause")]
    UnterminatedPause,
    #[error("unbalanced bracket")]
    UnbalancedBracket,
}

/// Byte offset into the current line plus the physical line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseCursor {
    pos: usize,
    line: usize,
}

impl ParseCursor {
    pub fn new(line: usize) -> Self {
        Self { pos: 0, line }
    }

    pub fn at(pos: usize, line: usize) -> Self {
        Self { pos, line }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    #[inline]
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Remaining text from the cursor onwards.
    #[inline]
    pub fn rest<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.pos..).unwrap_or("")
    }

    #[inline]
    pub fn peek(&self, text: &str) -> Option<u8> {
        text.as_bytes().get(self.pos).copied()
    }

    #[inline]
    pub fn is_at_end(&self, text: &str) -> bool {
        self.pos >= text.len()
    }

    pub fn skip_whitespace(&mut self, text: &str) {
        let bytes = text.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Skip any run of the given separator bytes (`, ` between fields etc).
    pub fn skip_any(&mut self, text: &str, set: &[u8]) {
        let bytes = text.as_bytes();
        while self.pos < bytes.len() && set.contains(&bytes[self.pos]) {
            self.pos += 1;
        }
    }

    /// Consume `literal` if the remaining text starts with it.
    pub fn eat(&mut self, text: &str, literal: &str) -> bool {
        if self.rest(text).starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    /// Move just past the next occurrence of `literal`.
    pub fn seek_past(&mut self, text: &str, literal: &str) -> bool {
        match self.rest(text).find(literal) {
            Some(idx) => {
                self.pos += idx + literal.len();
                true
            }
            None => false,
        }
    }

    /// Move onto (not past) the next occurrence of `literal`.
    pub fn seek_to(&mut self, text: &str, literal: &str) -> bool {
        match self.rest(text).find(literal) {
            Some(idx) => {
                self.pos += idx;
                true
            }
            None => false,
        }
    }
}

/// `before->after(capacity)` in kilobytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTriple {
    pub before_kb: u64,
    pub after_kb: u64,
    pub capacity_kb: Option<u64>,
    /// Parenthetical directly after the before-value (G1 `10M(10M)->...`).
    pub capacity_before_kb: Option<u64>,
}

/// Scan an unsigned decimal at `start`. A `,` between digits is accepted as
/// decimal separator (logs written under a comma locale).
fn scan_number(bytes: &[u8], start: usize) -> Option<(f64, usize)> {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return None;
    }
    let int_end = end;
    let mut frac_end = end;
    if end + 1 < bytes.len()
        && (bytes[end] == b'.' || bytes[end] == b',')
        && bytes[end + 1].is_ascii_digit()
    {
        frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
    }
    // Digits only, so the slices are ASCII.
    let int_part = std::str::from_utf8(&bytes[start..int_end]).ok()?;
    let value = if frac_end > int_end {
        let frac = std::str::from_utf8(&bytes[int_end + 1..frac_end]).ok()?;
        format!("{}.{}", int_part, frac).parse::<f64>().ok()?
    } else {
        int_part.parse::<f64>().ok()?
    };
    Some((value, frac_end))
}

/// Read a bare decimal number.
pub fn read_number(text: &str, cur: &mut ParseCursor) -> Result<f64, LexError> {
    let mut probe = *cur;
    probe.skip_whitespace(text);
    let (value, end) = scan_number(text.as_bytes(), probe.pos).ok_or(LexError::NoNumber)?;
    cur.pos = end;
    Ok(value)
}

/// Read `12.345:` (optionally `12.345s:`) and leave the cursor after the colon
/// and any following whitespace.
pub fn read_timestamp(text: &str, cur: &mut ParseCursor) -> Result<f64, LexError> {
    let bytes = text.as_bytes();
    let mut probe = *cur;
    probe.skip_whitespace(text);
    let (value, mut end) = scan_number(bytes, probe.pos).ok_or(LexError::NoTimestamp)?;
    if bytes.get(end) == Some(&b's') {
        end += 1;
    }
    if bytes.get(end) != Some(&b':') {
        return Err(LexError::NoTimestamp);
    }
    cur.pos = end + 1;
    cur.skip_whitespace(text);
    Ok(value)
}

/// Read an ISO-8601 date stamp prefix such as `2012-04-18T14:23:46.175+0200: `.
pub fn read_datestamp(text: &str, cur: &mut ParseCursor) -> Result<DateTime<FixedOffset>, LexError> {
    let mut probe = *cur;
    probe.skip_whitespace(text);
    let rest = probe.rest(text).as_bytes();
    if rest.len() < 11 || !rest[..4].iter().all(u8::is_ascii_digit) || rest[4] != b'-' || rest[10] != b'T' {
        return Err(LexError::NoDatestamp);
    }
    let token_len = rest
        .iter()
        .position(|b| b.is_ascii_whitespace() || *b == b'[')
        .unwrap_or(rest.len());
    let token = &probe.rest(text)[..token_len];
    let stamp = token.strip_suffix(':').ok_or(LexError::NoDatestamp)?;
    let parsed = DateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S%.f%z")
        .map_err(|_| LexError::NoDatestamp)?;
    cur.pos = probe.pos + token_len;
    cur.skip_whitespace(text);
    Ok(parsed)
}

/// Read a free-text type phrase. The phrase ends at `[`, `]`, `,` or a token
/// starting with a digit; terminators inside parentheses do not count.
pub fn read_type_name<'a>(text: &'a str, cur: &mut ParseCursor) -> Result<&'a str, LexError> {
    let bytes = text.as_bytes();
    let mut probe = *cur;
    probe.skip_whitespace(text);
    let start = probe.pos;
    let mut depth = 0usize;
    let mut end = start;
    while end < bytes.len() {
        let b = bytes[end];
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'[' | b']' | b',' if depth == 0 => break,
            b'0'..=b'9' if depth == 0 && (end == start || bytes[end - 1] == b' ') => break,
            _ => {}
        }
        end += 1;
    }
    let name = text[start..end].trim_end();
    if name.is_empty() {
        return Err(LexError::NoTypeName);
    }
    cur.pos = end;
    Ok(name)
}

/// Read one `value[unit]` component. Returns the kilobyte value and whether a
/// unit letter was present.
fn read_sized(bytes: &[u8], start: usize) -> Option<(u64, bool, usize)> {
    let (value, mut end) = scan_number(bytes, start)?;
    match bytes.get(end) {
        Some(&unit) if unit.is_ascii_alphabetic() => {
            let mut unit_end = end + 1;
            // KB / MB / GB spelling
            if unit != b'B' && matches!(bytes.get(unit_end), Some(b'B')) {
                unit_end += 1;
            }
            // `ms`, `secs`: a duration word, not a unit letter
            if bytes.get(unit_end).is_some_and(u8::is_ascii_alphabetic) {
                return Some((units::to_kilobytes(value, b'K'), false, end));
            }
            Some((units::to_kilobytes(value, unit), true, unit_end))
        }
        _ => Some((units::to_kilobytes(value, b'K'), false, end)),
    }
}

/// Read `(value[unit])` at `start`, tolerating one leading space.
fn read_paren_sized(bytes: &[u8], start: usize) -> Result<Option<(u64, usize)>, LexError> {
    let mut open = start;
    if bytes.get(open) == Some(&b' ') && bytes.get(open + 1) == Some(&b'(') {
        open += 1;
    }
    if bytes.get(open) != Some(&b'(') || !bytes.get(open + 1).is_some_and(u8::is_ascii_digit) {
        return Ok(None);
    }
    let (kb, _, end) = read_sized(bytes, open + 1).ok_or(LexError::UnterminatedMemory)?;
    if bytes.get(end) != Some(&b')') {
        return Err(LexError::UnterminatedMemory);
    }
    Ok(Some((kb, end + 1)))
}

/// Read a `before->after(capacity)` memory triple.
pub fn read_memory(text: &str, cur: &mut ParseCursor) -> Result<MemoryTriple, LexError> {
    let bytes = text.as_bytes();
    let mut probe = *cur;
    probe.skip_whitespace(text);
    let (first, had_unit, mut pos) = read_sized(bytes, probe.pos).ok_or(LexError::NoMemory)?;

    let paren_before = read_paren_sized(bytes, pos)?;
    if let Some((_, end)) = paren_before {
        pos = end;
    }

    if bytes[pos..].starts_with(b"->") {
        let (after, _, end) = read_sized(bytes, pos + 2).ok_or(LexError::UnterminatedMemory)?;
        pos = end;
        let capacity = read_paren_sized(bytes, pos)?;
        if let Some((_, end)) = capacity {
            pos = end;
        }
        cur.pos = pos;
        return Ok(MemoryTriple {
            before_kb: first,
            after_kb: after,
            capacity_kb: capacity.map(|(kb, _)| kb),
            capacity_before_kb: paren_before.map(|(kb, _)| kb),
        });
    }

    if paren_before.is_none() && !had_unit {
        return Err(LexError::NoMemory);
    }
    cur.pos = pos;
    Ok(MemoryTriple {
        before_kb: first,
        after_kb: first,
        capacity_kb: paren_before.map(|(kb, _)| kb),
        capacity_before_kb: None,
    })
}

/// Classify the unit word after a pause number. Returns the divisor to reach
/// seconds and how many bytes the unit occupies.
fn pause_unit(rest: &[u8]) -> Option<(f64, usize)> {
    let word_len = rest.iter().take_while(|b| b.is_ascii_alphabetic()).count();
    match &rest[..word_len] {
        b"ms" => Some((1000.0, 2)),
        b"secs" | b"sec" | b"s" => Some((1.0, word_len)),
        b"" if rest.first() == Some(&b']') => Some((1.0, 0)),
        _ => None,
    }
}

/// Read a pause (`0.012 secs`, `0.012]`, `3.688ms`, `3.688 ms`, `0.005 s`)
/// normalized to seconds. A closing `]` is left for the caller.
pub fn read_pause(text: &str, cur: &mut ParseCursor) -> Result<f64, LexError> {
    let bytes = text.as_bytes();
    let mut probe = *cur;
    probe.skip_any(text, b", ");
    let (value, mut end) = scan_number(bytes, probe.pos).ok_or(LexError::NoPause)?;
    while bytes.get(end) == Some(&b' ') {
        end += 1;
    }
    let (divisor, unit_len) = pause_unit(&bytes[end..]).ok_or(LexError::UnterminatedPause)?;
    cur.pos = end + unit_len;
    Ok(value / divisor)
}

/// Read a concurrent `0.123/0.456 secs` pair.
pub fn read_pause_pair(text: &str, cur: &mut ParseCursor) -> Result<(f64, f64), LexError> {
    let bytes = text.as_bytes();
    let mut probe = *cur;
    probe.skip_any(text, b", ");
    let (first, end) = scan_number(bytes, probe.pos).ok_or(LexError::NoPause)?;
    if bytes.get(end) != Some(&b'/') {
        return Err(LexError::NoPause);
    }
    let mut second_probe = ParseCursor::at(end + 1, cur.line);
    let second = read_pause(text, &mut second_probe)?;
    cur.pos = second_probe.pos;
    Ok((first, second))
}

/// Skip a balanced `[...]` group starting at the cursor. Iterative, so deeply
/// nested garbage cannot exhaust the stack.
pub fn skip_bracketed(text: &str, cur: &mut ParseCursor) -> Result<(), LexError> {
    let bytes = text.as_bytes();
    let mut probe = *cur;
    probe.skip_whitespace(text);
    if probe.peek(text) != Some(b'[') {
        return Err(LexError::UnbalancedBracket);
    }
    let mut depth = 0usize;
    for (idx, b) in bytes.iter().enumerate().skip(probe.pos) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    cur.pos = idx + 1;
                    return Ok(());
                }
            }
            _ => {}
        }
    }
    Err(LexError::UnbalancedBracket)
}

/// Value of an XML-ish attribute `name="value"` anywhere in `text`.
pub fn attribute<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(idx) = text[search..].find(name) {
        let start = search + idx;
        let after = start + name.len();
        let boundary = start == 0 || text.as_bytes()[start - 1].is_ascii_whitespace();
        if boundary && text[after..].starts_with("=\"") {
            let value_start = after + 2;
            let value_end = text[value_start..].find('"')? + value_start;
            return Some(&text[value_start..value_end]);
        }
        search = after;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cur() -> ParseCursor {
        ParseCursor::new(1)
    }

    // ── timestamps ──────────────────────────────────────────────

    #[test]
    fn test_read_timestamp() {
        let line = "12.345: [GC 100K->50K(200K), 0.0010 secs]";
        let mut c = cur();
        assert_eq!(read_timestamp(line, &mut c), Ok(12.345));
        assert_eq!(c.rest(line), "[GC 100K->50K(200K), 0.0010 secs]");
    }

    #[test]
    fn test_read_timestamp_comma_locale() {
        let line = "1,500: [GC";
        let mut c = cur();
        assert_eq!(read_timestamp(line, &mut c), Ok(1.5));
    }

    #[test]
    fn test_read_timestamp_absent_leaves_cursor() {
        let line = "[GC 100K->50K(200K), 0.0010 secs]";
        let mut c = cur();
        assert_eq!(read_timestamp(line, &mut c), Err(LexError::NoTimestamp));
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn test_read_datestamp() {
        let line = "2012-04-18T14:23:46.175+0200: 0.285: [GC";
        let mut c = cur();
        let stamp = read_datestamp(line, &mut c).unwrap();
        assert_eq!(stamp.to_rfc3339(), "2012-04-18T14:23:46.175+02:00");
        assert_eq!(read_timestamp(line, &mut c), Ok(0.285));
    }

    #[test]
    fn test_read_datestamp_rejects_plain_number() {
        let mut c = cur();
        assert_eq!(read_datestamp("0.285: [GC", &mut c), Err(LexError::NoDatestamp));
    }

    // ── type names ──────────────────────────────────────────────

    #[test]
    fn test_type_name_stops_at_number() {
        let line = "Full GC (System) 1234K->567K(2048K), 0.1 secs]";
        let mut c = cur();
        assert_eq!(read_type_name(line, &mut c), Ok("Full GC (System)"));
        assert!(c.rest(line).starts_with("1234K"));
    }

    #[test]
    fn test_type_name_keeps_digits_inside_words_and_parens() {
        let line = "GC pause (G1 Evacuation Pause) (young), 0.0123 secs]";
        let mut c = cur();
        assert_eq!(read_type_name(line, &mut c), Ok("GC pause (G1 Evacuation Pause) (young)"));
        assert_eq!(c.peek(line), Some(b','));
    }

    #[test]
    fn test_type_name_stops_at_bracket() {
        let line = "GC [PSYoungGen: 1K->1K(2K)]";
        let mut c = cur();
        assert_eq!(read_type_name(line, &mut c), Ok("GC"));
        assert_eq!(c.peek(line), Some(b'['));
    }

    #[test]
    fn test_type_name_empty() {
        let mut c = cur();
        assert_eq!(read_type_name("123K", &mut c), Err(LexError::NoTypeName));
    }

    // ── memory ──────────────────────────────────────────────────

    #[test]
    fn test_read_memory_triple() {
        let line = "8128K->1024K(126720K), 0.01 secs";
        let mut c = cur();
        let m = read_memory(line, &mut c).unwrap();
        assert_eq!((m.before_kb, m.after_kb, m.capacity_kb), (8128, 1024, Some(126720)));
        assert_eq!(c.rest(line), ", 0.01 secs");
    }

    #[test]
    fn test_read_memory_g1_preused() {
        let line = "10M(10M)->0B(9M) Survivors";
        let mut c = cur();
        let m = read_memory(line, &mut c).unwrap();
        assert_eq!(m.before_kb, 10240);
        assert_eq!(m.capacity_before_kb, Some(10240));
        assert_eq!(m.after_kb, 0);
        assert_eq!(m.capacity_kb, Some(9216));
    }

    #[test]
    fn test_read_memory_without_arrow_defaults_before() {
        let line = "6931K(7168K)]";
        let mut c = cur();
        let m = read_memory(line, &mut c).unwrap();
        assert_eq!((m.before_kb, m.after_kb, m.capacity_kb), (6931, 6931, Some(7168)));
    }

    #[test]
    fn test_read_memory_jrockit_spacing() {
        let line = "33232KB->8460KB (65536KB), 0.005 s";
        let mut c = cur();
        let m = read_memory(line, &mut c).unwrap();
        assert_eq!((m.before_kb, m.after_kb, m.capacity_kb), (33232, 8460, Some(65536)));
    }

    #[test]
    fn test_read_memory_unterminated() {
        let mut c = cur();
        assert_eq!(read_memory("100K->", &mut c), Err(LexError::UnterminatedMemory));
        assert_eq!(c.pos(), 0);
        assert_eq!(read_memory("100K->50K(200K", &mut c), Err(LexError::UnterminatedMemory));
    }

    #[test]
    fn test_read_memory_bare_number_is_not_memory() {
        let mut c = cur();
        assert_eq!(read_memory("0.0012 secs", &mut c), Err(LexError::NoMemory));
        assert_eq!(read_memory("3.388ms", &mut c), Err(LexError::NoMemory));
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn test_read_memory_unknown_unit_kept_as_kilobytes() {
        let mut c = cur();
        let m = read_memory("100X->50X(200X)", &mut c).unwrap();
        assert_eq!((m.before_kb, m.after_kb, m.capacity_kb), (100, 50, Some(200)));
    }

    // ── pauses ──────────────────────────────────────────────────

    #[test]
    fn test_read_pause_variants() {
        let cases: [(&str, f64); 6] = [
            (", 0.0123 secs]", 0.0123),
            ("0.5]", 0.5),
            ("3.688ms", 0.003688),
            ("1.021 ms", 0.001021),
            ("0.005 s, sum of pauses", 0.005),
            ("2 sec", 2.0),
        ];
        for (text, expected) in cases {
            let mut c = cur();
            let pause = read_pause(text, &mut c).unwrap();
            assert!((pause - expected).abs() < 1e-12, "{} -> {}", text, pause);
        }
    }

    #[test]
    fn test_read_pause_leaves_bracket() {
        let line = "0.0123 secs]";
        let mut c = cur();
        read_pause(line, &mut c).unwrap();
        assert_eq!(c.rest(line), "]");
    }

    #[test]
    fn test_read_pause_unterminated() {
        let mut c = cur();
        assert_eq!(read_pause("0.0123 parsecs", &mut c), Err(LexError::UnterminatedPause));
        assert_eq!(read_pause("abc", &mut c), Err(LexError::NoPause));
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn test_read_pause_pair() {
        let line = ": 0.123/0.456 secs]";
        let mut c = ParseCursor::at(1, 1);
        assert_eq!(read_pause_pair(line, &mut c), Ok((0.123, 0.456)));
        assert_eq!(c.rest(line), "]");
    }

    // ── brackets / attributes ───────────────────────────────────

    #[test]
    fn test_skip_bracketed_nested() {
        let line = "[Times: [a [b]] c] tail";
        let mut c = cur();
        skip_bracketed(line, &mut c).unwrap();
        assert_eq!(c.rest(line), " tail");
    }

    #[test]
    fn test_skip_bracketed_unbalanced() {
        let deep = "[".repeat(100_000);
        let mut c = cur();
        assert_eq!(skip_bracketed(&deep, &mut c), Err(LexError::UnbalancedBracket));
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn test_attribute() {
        let line = r#"<af type="tenured" id="12" totalid="3">"#;
        assert_eq!(attribute(line, "type"), Some("tenured"));
        assert_eq!(attribute(line, "id"), Some("12"));
        assert_eq!(attribute(line, "totalid"), Some("3"));
        assert_eq!(attribute(line, "missing"), None);
    }
}
