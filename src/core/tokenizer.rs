//! XML Markup Tokenizer
//!
//! Pull tokenizer that splits UTF-8 input into markup tokens while keeping
//! each token's exact source text. Every byte of the input belongs to exactly
//! one token, so concatenating token text reproduces the input.
//!
//! Validation is strict: comments, CDATA sections, processing instructions
//! and character data are checked against XML 1.0 here; element nesting and
//! document structure are checked by the tree builder.

use super::entities::{decode_text, validate_chars};
use super::scanner::Scanner;
use thiserror::Error;

/// Type of markup token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `<?xml ...?>` at the very start of the input
    XmlDeclaration,
    /// `<?target ...?>`
    ProcessingInstruction,
    /// `<!-- ... -->`
    Comment,
    /// `<![CDATA[ ... ]]>`
    CData,
    /// `<!DOCTYPE ...>`
    DocType,
    /// `<name ...>`
    StartTag,
    /// `<name .../>`
    EmptyTag,
    /// `</name>`
    EndTag,
    /// Character data between markup
    Text,
}

/// A markup token borrowing its source text
#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Raw span in input (start, end)
    pub span: (usize, usize),
    /// Exact source text of the token
    pub raw: &'a str,
    /// Element name for tags, target for processing instructions
    pub name: &'a str,
}

/// Well-formedness failure with its byte offset
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {position}")]
pub struct MarkupError {
    pub message: String,
    pub position: usize,
}

impl MarkupError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        MarkupError {
            message: message.into(),
            position,
        }
    }
}

/// Markup tokenizer over a UTF-8 input
pub struct Tokenizer<'a> {
    scanner: Scanner<'a>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokenizer {
            scanner: Scanner::new(input),
        }
    }

    /// Next token, `Ok(None)` at end of input
    pub fn next_token(&mut self) -> Result<Option<Token<'a>>, MarkupError> {
        if self.scanner.is_eof() {
            return Ok(None);
        }
        let start = self.scanner.position();
        let token = if self.scanner.peek() == Some(b'<') {
            self.read_markup(start)?
        } else {
            self.read_text(start)?
        };
        Ok(Some(token))
    }

    fn token(&self, kind: TokenKind, start: usize, end: usize, name: &'a str) -> Token<'a> {
        Token {
            kind,
            span: (start, end),
            raw: self.scanner.slice(start, end),
            name,
        }
    }

    fn read_text(&mut self, start: usize) -> Result<Token<'a>, MarkupError> {
        let end = self.scanner.find_byte(b'<').unwrap_or(start + self.scanner.rest().len());
        let raw = self.scanner.slice(start, end);
        if let Some(offset) = raw.find("]]>") {
            return Err(MarkupError::new("']]>' not allowed in character data", start + offset));
        }
        validate_chars(raw).map_err(|msg| MarkupError::new(msg, start))?;
        decode_text(raw).map_err(|msg| MarkupError::new(msg, start))?;
        self.scanner.set_position(end);
        Ok(self.token(TokenKind::Text, start, end, ""))
    }

    fn read_markup(&mut self, start: usize) -> Result<Token<'a>, MarkupError> {
        if self.scanner.starts_with("<?") {
            return self.read_processing_instruction(start);
        }
        if self.scanner.starts_with("<!--") {
            return self.read_delimited(start, 4, "-->", TokenKind::Comment);
        }
        if self.scanner.starts_with("<![CDATA[") {
            return self.read_delimited(start, 9, "]]>", TokenKind::CData);
        }
        if self.scanner.starts_with("<!DOCTYPE") {
            return self.read_doctype(start);
        }
        if self.scanner.starts_with("</") {
            return self.read_end_tag(start);
        }
        self.read_start_tag(start)
    }

    fn read_processing_instruction(&mut self, start: usize) -> Result<Token<'a>, MarkupError> {
        self.scanner.advance(2);
        let target = self
            .scanner
            .read_name()
            .ok_or_else(|| MarkupError::new("Processing instruction requires a target", start))?;
        let close = self
            .scanner
            .find("?>")
            .ok_or_else(|| MarkupError::new("Unterminated processing instruction", start))?;
        let end = close + 2;
        let raw = self.scanner.slice(start, end);
        validate_chars(raw).map_err(|msg| MarkupError::new(msg, start))?;
        let next = self.scanner.peek();
        if close > self.scanner.position() && !next.map(super::scanner::is_whitespace).unwrap_or(false) {
            return Err(MarkupError::new("Processing instruction target must be followed by whitespace", start));
        }
        self.scanner.set_position(end);

        if target == "xml" {
            if start != 0 {
                return Err(MarkupError::new("XML declaration allowed only at the start of the document", start));
            }
            return Ok(self.token(TokenKind::XmlDeclaration, start, end, target));
        }
        if target.eq_ignore_ascii_case("xml") {
            return Err(MarkupError::new("Reserved processing instruction target", start));
        }
        Ok(self.token(TokenKind::ProcessingInstruction, start, end, target))
    }

    fn read_delimited(&mut self, start: usize, open_len: usize, close: &str, kind: TokenKind) -> Result<Token<'a>, MarkupError> {
        self.scanner.advance(open_len);
        let content_start = self.scanner.position();
        let close_at = self
            .scanner
            .find(close)
            .ok_or_else(|| MarkupError::new(format!("Unterminated section, expected '{}'", close), start))?;
        let content = self.scanner.slice(content_start, close_at);
        if kind == TokenKind::Comment && (content.contains("--") || content.ends_with('-')) {
            return Err(MarkupError::new("'--' not allowed inside a comment", start));
        }
        validate_chars(content).map_err(|msg| MarkupError::new(msg, content_start))?;
        let end = close_at + close.len();
        self.scanner.set_position(end);
        Ok(self.token(kind, start, end, ""))
    }

    fn read_doctype(&mut self, start: usize) -> Result<Token<'a>, MarkupError> {
        // Internal subsets may contain '>' inside brackets and quoted literals
        let rest = self.scanner.rest().as_bytes();
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        for (i, &b) in rest.iter().enumerate() {
            match (quote, b) {
                (Some(q), _) if q == b => quote = None,
                (Some(_), _) => {}
                (None, b'"') | (None, b'\'') => quote = Some(b),
                (None, b'[') => depth += 1,
                (None, b']') => depth = depth.saturating_sub(1),
                (None, b'>') if depth == 0 => {
                    let end = start + i + 1;
                    self.scanner.set_position(end);
                    return Ok(self.token(TokenKind::DocType, start, end, ""));
                }
                _ => {}
            }
        }
        Err(MarkupError::new("Unterminated DOCTYPE declaration", start))
    }

    fn read_end_tag(&mut self, start: usize) -> Result<Token<'a>, MarkupError> {
        self.scanner.advance(2);
        let name = self
            .scanner
            .read_name()
            .ok_or_else(|| MarkupError::new("End tag requires an element name", start))?;
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'>') {
            return Err(MarkupError::new(format!("Malformed end tag </{}", name), start));
        }
        self.scanner.advance(1);
        Ok(self.token(TokenKind::EndTag, start, self.scanner.position(), name))
    }

    fn read_start_tag(&mut self, start: usize) -> Result<Token<'a>, MarkupError> {
        let close = self
            .scanner
            .find_tag_end_quoted()
            .ok_or_else(|| MarkupError::new("Unterminated start tag", start))?;
        self.scanner.advance(1);
        let name = self
            .scanner
            .read_name()
            .ok_or_else(|| MarkupError::new("Invalid character after '<'", start))?;
        let end = close + 1;
        let raw = self.scanner.slice(start, end);
        validate_chars(raw).map_err(|msg| MarkupError::new(msg, start))?;
        let kind = if raw.ends_with("/>") {
            TokenKind::EmptyTag
        } else {
            TokenKind::StartTag
        };
        self.scanner.set_position(end);
        Ok(self.token(kind, start, end, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut tokenizer = Tokenizer::new(input);
        let mut out = Vec::new();
        while let Some(token) = tokenizer.next_token().unwrap() {
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn test_token_sequence() {
        assert_eq!(
            kinds("<?xml version='1.0'?>\n<root><!-- c --><a/>text</root>"),
            vec![
                TokenKind::XmlDeclaration,
                TokenKind::Text,
                TokenKind::StartTag,
                TokenKind::Comment,
                TokenKind::EmptyTag,
                TokenKind::Text,
                TokenKind::EndTag,
            ]
        );
    }

    #[test]
    fn test_tokens_cover_input() {
        let input = "<?xml version=\"1.0\"?>\n<r a='1'>\n  <![CDATA[x<y]]><?pi data?></r>\n";
        let mut tokenizer = Tokenizer::new(input);
        let mut rebuilt = String::new();
        while let Some(token) = tokenizer.next_token().unwrap() {
            rebuilt.push_str(token.raw);
        }
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_names() {
        let mut tokenizer = Tokenizer::new("<rl:list name=\"x\"></rl:list >");
        assert_eq!(tokenizer.next_token().unwrap().unwrap().name, "rl:list");
        let end = tokenizer.next_token().unwrap().unwrap();
        assert_eq!(end.kind, TokenKind::EndTag);
        assert_eq!(end.name, "rl:list");
    }

    #[test]
    fn test_doctype_with_internal_subset() {
        assert_eq!(
            kinds("<!DOCTYPE r [<!ELEMENT r ANY>]><r/>"),
            vec![TokenKind::DocType, TokenKind::EmptyTag]
        );
    }

    #[test]
    fn test_strict_errors() {
        for input in [
            "<r><!-- a -- b --></r>",
            "<r>]]></r>",
            "<r>&bogus;</r>",
            "<r><![CDATA[open</r>",
            "<r></r",
            " <?xml version='1.0'?><r/>",
            "<r><?XML x?></r>",
            "<r a='1'",
        ] {
            let mut tokenizer = Tokenizer::new(input);
            let mut failed = false;
            loop {
                match tokenizer.next_token() {
                    Ok(Some(_)) => continue,
                    Ok(None) => break,
                    Err(_) => {
                        failed = true;
                        break;
                    }
                }
            }
            assert!(failed, "expected failure for {:?}", input);
        }
    }
}
