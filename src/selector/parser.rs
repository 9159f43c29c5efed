//! Node Selector Parser
//!
//! Recursive descent parser for the RFC 4825 node selector grammar:
//!
//! ```text
//! node-selector = element-selector ["/" terminal-selector]
//! element-selector = step *( "/" step )
//! step = by-name / by-pos / by-attr / by-pos-attr / extension-selector
//! terminal-selector = attribute-selector / namespace-selector
//! ```

use super::lexer::{split_steps, Lexer, Token};
use super::{ParseError, ParseErrorKind};
use crate::core::entities::decode_text;
use crate::core::scanner::is_qname;
use std::fmt;

/// Qualified name as written in a selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local_name: String,
}

impl QName {
    /// Parse `prefix:local` or `local`
    pub fn parse(name: &str) -> Option<QName> {
        if !is_qname(name) {
            return None;
        }
        Some(match name.split_once(':') {
            Some((prefix, local)) => QName {
                prefix: Some(prefix.to_string()),
                local_name: local.to_string(),
            },
            None => QName {
                prefix: None,
                local_name: name.to_string(),
            },
        })
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

/// Name test of an element step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    Name(QName),
}

/// Step predicate, applied in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `[N]`, 1-based
    Position(usize),
    /// `[@name="value"]`, value entity-decoded
    AttributeEquals { name: QName, value: String },
}

/// Element selection step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementStep {
    pub name: NameTest,
    pub predicates: Vec<Predicate>,
}

impl ElementStep {
    /// First position predicate, the insertion slot on PUT
    pub fn position(&self) -> Option<usize> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Position(n) => Some(*n),
            Predicate::AttributeEquals { .. } => None,
        })
    }
}

/// A node selector step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Element(ElementStep),
    /// `@name`, terminal
    Attribute(QName),
    /// `namespace::*`, terminal
    NamespaceBindings,
    /// Unrecognized step text, kept verbatim
    Extension(String),
}

impl Step {
    fn is_terminal(&self) -> bool {
        matches!(self, Step::Attribute(_) | Step::NamespaceBindings)
    }
}

/// Parsed node selector; an empty one addresses the whole document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSelector {
    pub steps: Vec<Step>,
}

impl NodeSelector {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Every step but the last
    pub fn parent_steps(&self) -> &[Step] {
        match self.steps.split_last() {
            Some((_, parent)) => parent,
            None => &[],
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Position(n) => write!(f, "[{}]", n),
            Predicate::AttributeEquals { name, value } => write!(f, "[@{}=\"{}\"]", name, value),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Element(step) => {
                match &step.name {
                    NameTest::Any => f.write_str("*")?,
                    NameTest::Name(name) => write!(f, "{}", name)?,
                }
                step.predicates.iter().try_for_each(|p| write!(f, "{}", p))
            }
            Step::Attribute(name) => write!(f, "@{}", name),
            Step::NamespaceBindings => f.write_str("namespace::*"),
            Step::Extension(raw) => f.write_str(raw),
        }
    }
}

impl fmt::Display for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{}", step)?;
        }
        Ok(())
    }
}

/// Parse a percent-decoded node selector
pub fn parse_node_selector(input: &str, allow_extensions: bool) -> Result<NodeSelector, ParseError> {
    let mut steps = Vec::new();
    let raw_steps = split_steps(input);
    let count = raw_steps.len();

    for (index, raw) in raw_steps.into_iter().enumerate() {
        if raw.is_empty() {
            return Err(error(format!("empty step in '{}'", input)));
        }
        let step = parse_step(raw, allow_extensions)?;
        if step.is_terminal() && index == 0 {
            return Err(error(format!("'{}' cannot be the first step", raw)));
        }
        if step.is_terminal() && index + 1 != count {
            return Err(error(format!("'{}' must be the last step", raw)));
        }
        steps.push(step);
    }
    Ok(NodeSelector { steps })
}

fn error(message: String) -> ParseError {
    ParseError::new(ParseErrorKind::NodeSelector, message)
}

fn parse_step(raw: &str, allow_extensions: bool) -> Result<Step, ParseError> {
    if raw == "namespace::*" {
        return Ok(Step::NamespaceBindings);
    }
    if let Some(name) = raw.strip_prefix('@') {
        return QName::parse(name)
            .map(Step::Attribute)
            .ok_or_else(|| error(format!("invalid attribute selector '{}'", raw)));
    }
    match Parser::new(raw).parse_element_step() {
        Ok(step) => Ok(Step::Element(step)),
        Err(_) if allow_extensions => Ok(Step::Extension(raw.to_string())),
        Err(message) => Err(error(format!("{} in step '{}'", message, raw))),
    }
}

/// Element step parser
struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Parser { lexer, current }
    }

    fn advance(&mut self) -> Token {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        if self.current == expected {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", expected, self.current))
        }
    }

    fn parse_element_step(&mut self) -> Result<ElementStep, String> {
        let name = match self.advance() {
            Token::Star => NameTest::Any,
            Token::Name(name) => NameTest::Name(parse_qname(&name)?),
            other => return Err(format!("expected element name, found {:?}", other)),
        };

        let mut predicates = Vec::new();
        while self.current == Token::LeftBracket {
            self.advance();
            predicates.push(self.parse_predicate()?);
            self.expect(Token::RightBracket)?;
        }

        match self.current {
            Token::Eof => Ok(ElementStep { name, predicates }),
            ref other => Err(format!("unexpected {:?}", other)),
        }
    }

    fn parse_predicate(&mut self) -> Result<Predicate, String> {
        match self.advance() {
            Token::Number(digits) => digits
                .parse::<usize>()
                .map(Predicate::Position)
                .map_err(|_| format!("position {} out of range", digits)),
            Token::At => {
                let name = match self.advance() {
                    Token::Name(name) => parse_qname(&name)?,
                    other => return Err(format!("expected attribute name, found {:?}", other)),
                };
                self.expect(Token::Eq)?;
                match self.advance() {
                    Token::String(value) => {
                        let value = decode_text(&value).map_err(str::to_string)?.into_owned();
                        Ok(Predicate::AttributeEquals { name, value })
                    }
                    other => Err(format!("expected quoted value, found {:?}", other)),
                }
            }
            other => Err(format!("invalid predicate starting with {:?}", other)),
        }
    }
}

fn parse_qname(name: &str) -> Result<QName, String> {
    QName::parse(name).ok_or_else(|| format!("invalid name '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<NodeSelector, ParseError> {
        parse_node_selector(input, false)
    }

    fn element(step: &Step) -> &ElementStep {
        match step {
            Step::Element(e) => e,
            other => panic!("not an element step: {:?}", other),
        }
    }

    #[test]
    fn test_simple_path() {
        let sel = parse("/root/el1").unwrap();
        assert_eq!(sel.steps.len(), 2);
        assert_eq!(
            element(&sel.steps[1]).name,
            NameTest::Name(QName { prefix: None, local_name: "el1".into() })
        );
    }

    #[test]
    fn test_predicates() {
        let sel = parse("/root/el1[3][@att=\"third\"]").unwrap();
        let step = element(&sel.steps[1]);
        assert_eq!(step.position(), Some(3));
        assert_eq!(
            step.predicates[1],
            Predicate::AttributeEquals {
                name: QName::parse("att").unwrap(),
                value: "third".into(),
            }
        );
    }

    #[test]
    fn test_attribute_first_position_wins() {
        let sel = parse("root/*[@id='x'][2][1]").unwrap();
        let step = element(&sel.steps[1]);
        assert_eq!(step.name, NameTest::Any);
        assert_eq!(step.position(), Some(2));
    }

    #[test]
    fn test_entity_in_attribute_value() {
        let sel = parse("root/el[@name=\"a&amp;b\"]").unwrap();
        assert_eq!(
            element(&sel.steps[1]).predicates[0],
            Predicate::AttributeEquals {
                name: QName::parse("name").unwrap(),
                value: "a&b".into()
            }
        );
    }

    #[test]
    fn test_terminal_steps() {
        let sel = parse("/root/el1/@att").unwrap();
        assert_eq!(sel.last(), Some(&Step::Attribute(QName::parse("att").unwrap())));
        let sel = parse("/root/namespace::*").unwrap();
        assert_eq!(sel.last(), Some(&Step::NamespaceBindings));
        assert_eq!(sel.parent_steps().len(), 1);

        assert!(parse("/root/@att/el1").is_err());
        assert!(parse("/root/namespace::*/el1").is_err());
        assert!(parse("/@att").is_err());
    }

    #[test]
    fn test_zero_position_parses() {
        let sel = parse("root/*[0]").unwrap();
        assert_eq!(element(&sel.steps[1]).position(), Some(0));
    }

    #[test]
    fn test_syntax_errors() {
        for input in [
            "root/el1[-1]",
            "root//el1",
            "root/",
            "root/el1[@att=x]",
            "root/el1[@att=\"x\"",
            "root/el1[text()]",
            "root/el1 extra",
            "root/a:b:c",
            "root/el1[99999999999999999999999]",
        ] {
            let err = parse(input).unwrap_err();
            assert_eq!(err.kind, ParseErrorKind::NodeSelector, "{}", input);
        }
    }

    #[test]
    fn test_extension_steps() {
        assert!(parse("root/el1[text()]").is_err());
        let sel = parse_node_selector("root/el1[text()]", true).unwrap();
        assert_eq!(sel.steps[1], Step::Extension("el1[text()]".into()));
    }

    #[test]
    fn test_display() {
        let sel = parse("root/rl:entry[2][@uri='sip:a@b']/@name").unwrap();
        assert_eq!(sel.to_string(), "/root/rl:entry[2][@uri=\"sip:a@b\"]/@name");
    }
}
