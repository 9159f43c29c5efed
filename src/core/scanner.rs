//! Delimiter scanning over UTF-8 markup using memchr
//!
//! All delimiters the tokenizer looks for are ASCII, so every position
//! returned here is a valid `str` boundary.

use memchr::{memchr, memmem};

/// Cursor over a UTF-8 input
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner positioned at the start of `input`
    #[inline]
    pub fn new(input: &'a str) -> Self {
        Scanner { input, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Input from the current position onward
    #[inline]
    pub fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Slice of the full input
    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.input[start..end]
    }

    /// Current byte without advancing
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    #[inline]
    pub fn starts_with(&self, needle: &str) -> bool {
        self.rest().starts_with(needle)
    }

    /// Skip XML whitespace (space, tab, CR, LF), returning how many bytes were skipped
    pub fn skip_whitespace(&mut self) -> usize {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && is_whitespace(bytes[self.pos]) {
            self.pos += 1;
        }
        self.pos - start
    }

    /// Absolute position of the next occurrence of `byte`
    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, self.rest().as_bytes()).map(|i| self.pos + i)
    }

    /// Absolute position of the next occurrence of `needle`
    #[inline]
    pub fn find(&self, needle: &str) -> Option<usize> {
        memmem::find(self.rest().as_bytes(), needle.as_bytes()).map(|i| self.pos + i)
    }

    /// Position of the `>` closing the current tag, skipping quoted attribute values
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let bytes = self.input.as_bytes();
        let mut quote: Option<u8> = None;
        for (i, &b) in bytes.iter().enumerate().skip(self.pos) {
            match (quote, b) {
                (None, b'"') | (None, b'\'') => quote = Some(b),
                (Some(q), _) if q == b => quote = None,
                (None, b'>') => return Some(i),
                _ => {}
            }
        }
        None
    }

    /// Read an XML name (QName characters, colon included)
    pub fn read_name(&mut self) -> Option<&'a str> {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        if start >= bytes.len() || !is_name_start_char(bytes[start]) {
            return None;
        }
        self.pos += 1;
        while self.pos < bytes.len() && is_name_char(bytes[self.pos]) {
            self.pos += 1;
        }
        Some(&self.input[start..self.pos])
    }
}

#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Name start byte; non-ASCII bytes are accepted as part of a UTF-8 sequence
#[inline]
pub fn is_name_start_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

#[inline]
pub fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b':') || b >= 0x80
}

/// Check a QName: non-empty NCName parts, at most one colon
pub fn is_qname(name: &str) -> bool {
    let mut parts = name.split(':');
    let first = parts.next();
    let second = parts.next();
    if parts.next().is_some() {
        return false;
    }
    let ncname = |s: &str| {
        let bytes = s.as_bytes();
        !bytes.is_empty()
            && is_name_start_char(bytes[0])
            && bytes[0] != b':'
            && bytes[1..].iter().all(|&b| is_name_char(b) && b != b':')
    };
    match (first, second) {
        (Some(local), None) => ncname(local),
        (Some(prefix), Some(local)) => ncname(prefix) && ncname(local),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_tag_end_quoted() {
        let scanner = Scanner::new("<a attr=\">test\">content");
        assert_eq!(scanner.find_tag_end_quoted(), Some(15));
    }

    #[test]
    fn test_find_tag_end_mixed_quotes() {
        let scanner = Scanner::new("<a b='\"' c=\"'>\">");
        assert_eq!(scanner.find_tag_end_quoted(), Some(15));
    }

    #[test]
    fn test_read_name() {
        let mut scanner = Scanner::new("rl:entry uri=");
        assert_eq!(scanner.read_name(), Some("rl:entry"));
        assert_eq!(scanner.position(), 8);
    }

    #[test]
    fn test_find_needle() {
        let mut scanner = Scanner::new("<!-- a -- b -->");
        scanner.advance(4);
        assert_eq!(scanner.find("-->"), Some(12));
        assert_eq!(scanner.find("--"), Some(7));
    }

    #[test]
    fn test_qname_validation() {
        assert!(is_qname("entry"));
        assert!(is_qname("rl:entry"));
        assert!(!is_qname("a:b:c"));
        assert!(!is_qname(":entry"));
        assert!(!is_qname("1entry"));
        assert!(!is_qname(""));
    }
}
