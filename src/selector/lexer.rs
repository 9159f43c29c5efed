//! Node Selector Lexer
//!
//! Splits a decoded node selector into steps and tokenizes a single step.

use crate::core::scanner::{is_name_char, is_name_start_char};

/// Step token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Star,         // *
    At,           // @
    Eq,           // =
    Minus,        // -
    DoubleColon,  // ::
    LeftBracket,  // [
    RightBracket, // ]

    /// Decimal digits, kept as text so overflow is reported by the parser
    Number(String),
    /// Quoted literal, quotes removed, entities still encoded
    String(String),
    /// QName (prefix:local or local)
    Name(String),

    /// Anything the grammar has no token for
    Invalid(char),
    /// Unterminated quoted literal
    Unterminated,

    Eof,
}

/// Split a selector on `/` outside quoted literals and predicates
///
/// A single leading `/` is skipped. Empty steps are kept so the parser can
/// reject them.
pub fn split_steps(selector: &str) -> Vec<&str> {
    let body = selector.strip_prefix('/').unwrap_or(selector);
    if body.is_empty() {
        return Vec::new();
    }
    let mut steps = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, b) in body.bytes().enumerate() {
        match (quote, b) {
            (Some(q), _) if q == b => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (None, b'[') => depth += 1,
            (None, b']') => depth = depth.saturating_sub(1),
            (None, b'/') if depth == 0 => {
                steps.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    steps.push(&body[start..]);
    steps
}

/// Lexer over one step
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        let c = match self.peek() {
            Some(c) => c,
            None => return Token::Eof,
        };

        match c {
            '*' => {
                self.advance(1);
                Token::Star
            }
            '@' => {
                self.advance(1);
                Token::At
            }
            '=' => {
                self.advance(1);
                Token::Eq
            }
            '-' => {
                self.advance(1);
                Token::Minus
            }
            '[' => {
                self.advance(1);
                Token::LeftBracket
            }
            ']' => {
                self.advance(1);
                Token::RightBracket
            }
            ':' if self.remaining().starts_with("::") => {
                self.advance(2);
                Token::DoubleColon
            }
            '"' | '\'' => self.read_string(c),
            '0'..='9' => self.read_number(),
            c if c.is_ascii() && is_name_start_char(c as u8) && c != ':' => self.read_name(),
            c if !c.is_ascii() => self.read_name(),
            c => {
                self.advance(c.len_utf8());
                Token::Invalid(c)
            }
        }
    }

    fn read_string(&mut self, quote: char) -> Token {
        self.advance(1);
        match self.remaining().find(quote) {
            Some(end) => {
                let value = self.remaining()[..end].to_string();
                self.advance(end + 1);
                Token::String(value)
            }
            None => {
                self.pos = self.input.len();
                Token::Unterminated
            }
        }
    }

    fn read_number(&mut self) -> Token {
        let len = self.remaining().bytes().take_while(u8::is_ascii_digit).count();
        let digits = self.remaining()[..len].to_string();
        self.advance(len);
        Token::Number(digits)
    }

    fn read_name(&mut self) -> Token {
        let rest = self.remaining().as_bytes();
        let mut len = 0;
        while len < rest.len() && is_name_char(rest[len]) {
            // `::` ends the name (`namespace::*`)
            if rest[len] == b':' && rest.get(len + 1) == Some(&b':') {
                break;
            }
            len += 1;
        }
        let name = self.remaining()[..len].to_string();
        self.advance(len);
        Token::Name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_split_steps() {
        assert_eq!(split_steps("/root/el1[@att=\"a/b\"]/@att"), vec!["root", "el1[@att=\"a/b\"]", "@att"]);
        assert_eq!(split_steps("root//el1"), vec!["root", "", "el1"]);
        assert_eq!(split_steps("/"), Vec::<&str>::new());
        assert_eq!(split_steps("root/"), vec!["root", ""]);
    }

    #[test]
    fn test_step_tokens() {
        assert_eq!(
            tokens("rl:entry[2][@uri='sip:a@b']"),
            vec![
                Token::Name("rl:entry".into()),
                Token::LeftBracket,
                Token::Number("2".into()),
                Token::RightBracket,
                Token::LeftBracket,
                Token::At,
                Token::Name("uri".into()),
                Token::Eq,
                Token::String("sip:a@b".into()),
                Token::RightBracket,
            ]
        );
    }

    #[test]
    fn test_namespace_axis_tokens() {
        assert_eq!(
            tokens("namespace::*"),
            vec![Token::Name("namespace".into()), Token::DoubleColon, Token::Star]
        );
    }

    #[test]
    fn test_negative_and_unterminated() {
        assert_eq!(tokens("[-1]")[1], Token::Minus);
        assert_eq!(tokens("[@a=\"x]").last(), Some(&Token::Unterminated));
    }
}
