//! Start Tag Parsing
//!
//! Splits a raw start tag (`<name a="1" b='2'/>`) into its element name,
//! attributes and trailing whitespace. Each attribute keeps its raw source
//! text, leading whitespace included, so an untouched attribute is written
//! back exactly as it was read.

use super::entities::decode_text;
use super::scanner::{is_qname, Scanner};
use crate::dom::XmlAttribute;

/// A parsed start tag
#[derive(Debug, Clone)]
pub struct StartTag<'a> {
    pub name: &'a str,
    pub attributes: Vec<XmlAttribute>,
    /// Whitespace between the last attribute and `>` or `/>`
    pub tail: &'a str,
    pub self_closing: bool,
}

/// Parse a complete raw start tag, `<` through `>`
pub fn parse_start_tag(raw: &str) -> Result<StartTag<'_>, &'static str> {
    if raw.len() < 3 || !raw.starts_with('<') || !raw.ends_with('>') {
        return Err("Malformed start tag");
    }
    let self_closing = raw.ends_with("/>");
    let body_end = if self_closing { raw.len() - 2 } else { raw.len() - 1 };

    let body = &raw[..body_end];
    let mut scanner = Scanner::new(body);
    scanner.advance(1);
    let name = scanner.read_name().ok_or("Start tag requires an element name")?;
    if !is_qname(name) {
        return Err("Invalid element name");
    }

    let mut attributes: Vec<XmlAttribute> = Vec::new();
    loop {
        let ws_start = scanner.position();
        let skipped = scanner.skip_whitespace();
        if scanner.is_eof() {
            return Ok(StartTag {
                name,
                attributes,
                tail: scanner.slice(ws_start, body.len()),
                self_closing,
            });
        }
        if skipped == 0 {
            return Err("Attributes must be separated by whitespace");
        }

        let attr_name = scanner.read_name().ok_or("Invalid attribute name")?;
        if !is_qname(attr_name) {
            return Err("Invalid attribute name");
        }
        scanner.skip_whitespace();
        if scanner.peek() != Some(b'=') {
            return Err("Attribute value required");
        }
        scanner.advance(1);
        scanner.skip_whitespace();

        let quote = match scanner.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err("Attribute value must be quoted"),
        };
        scanner.advance(1);
        let value_start = scanner.position();
        let value_end = scanner.find_byte(quote).ok_or("Attribute value has mismatched quotes")?;
        let raw_value = scanner.slice(value_start, value_end);
        if raw_value.contains('<') {
            return Err("Attribute value cannot contain '<'");
        }
        let value = decode_text(&normalize_attribute_value(raw_value))?.into_owned();
        scanner.set_position(value_end + 1);

        if attributes.iter().any(|a| a.name == attr_name) {
            return Err("Duplicate attribute");
        }
        attributes.push(XmlAttribute::parsed(
            attr_name,
            value,
            scanner.slice(ws_start, value_end + 1),
        ));
    }
}

/// Attribute-value normalization of literal whitespace (XML 1.0 §3.3.3, CDATA type).
/// Runs before reference decoding so `&#xA;` survives as a newline.
fn normalize_attribute_value(value: &str) -> String {
    value.replace("\r\n", " ").replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_attributes() {
        let tag = parse_start_tag("<entry uri=\"sip:joe@example.com\" id='1'>").unwrap();
        assert_eq!(tag.name, "entry");
        assert!(!tag.self_closing);
        assert_eq!(tag.attributes.len(), 2);
        assert_eq!(tag.attributes[0].name, "uri");
        assert_eq!(tag.attributes[0].value, "sip:joe@example.com");
        assert_eq!(tag.attributes[1].raw.as_deref(), Some(" id='1'"));
    }

    #[test]
    fn test_self_closing_with_tail() {
        let tag = parse_start_tag("<el1 att=\"first\" />").unwrap();
        assert!(tag.self_closing);
        assert_eq!(tag.tail, " ");
        assert_eq!(tag.attributes[0].raw.as_deref(), Some(" att=\"first\""));
    }

    #[test]
    fn test_entity_in_value() {
        let tag = parse_start_tag("<a title=\"&lt;hello&gt;\"/>").unwrap();
        assert_eq!(tag.attributes[0].value, "<hello>");
    }

    #[test]
    fn test_namespace_declarations() {
        let tag = parse_start_tag("<rl:list xmlns:rl=\"urn:ietf:params:xml:ns:resource-lists\">").unwrap();
        assert_eq!(tag.name, "rl:list");
        assert_eq!(tag.attributes[0].namespace_declaration(), Some(Some("rl")));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_start_tag("<a b=c>").is_err());
        assert!(parse_start_tag("<a b=\"1\"c=\"2\">").is_err());
        assert!(parse_start_tag("<a b=\"1\" b=\"2\">").is_err());
        assert!(parse_start_tag("<a b>").is_err());
        assert!(parse_start_tag("<1a>").is_err());
        assert!(parse_start_tag("<a b=\"<\">").is_err());
    }
}
