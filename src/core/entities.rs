//! XML Entity Codec
//!
//! Decoding handles the five predefined entities and numeric character
//! references; anything else is a well-formedness error since XCAP documents
//! carry no DTD-declared entities. Encoding escapes only what XML requires.
//!
//! Uses Cow so that the common entity-free case never allocates.

use memchr::{memchr, memchr3};
use std::borrow::Cow;

/// Decode entity and character references in text or attribute content
pub fn decode_text(input: &str) -> Result<Cow<'_, str>, &'static str> {
    if memchr(b'&', input.as_bytes()).is_none() {
        return Ok(Cow::Borrowed(input));
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        result.push_str(&rest[..amp]);
        rest = &rest[amp + 1..];
        let semi = rest.find(';').ok_or("Unterminated entity reference")?;
        result.push(decode_entity(&rest[..semi])?);
        rest = &rest[semi + 1..];
    }
    result.push_str(rest);
    Ok(Cow::Owned(result))
}

/// Decode a single reference (without `&` and `;`)
fn decode_entity(entity: &str) -> Result<char, &'static str> {
    match entity {
        "lt" => Ok('<'),
        "gt" => Ok('>'),
        "amp" => Ok('&'),
        "quot" => Ok('"'),
        "apos" => Ok('\''),
        _ => match entity.strip_prefix('#') {
            Some(numeric) => decode_numeric_entity(numeric),
            None => Err("Undeclared entity reference"),
        },
    }
}

fn decode_numeric_entity(entity: &str) -> Result<char, &'static str> {
    let codepoint = if let Some(hex) = entity.strip_prefix('x') {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err("Invalid character reference");
        }
        u32::from_str_radix(hex, 16).map_err(|_| "Invalid character reference")?
    } else {
        if entity.is_empty() || !entity.bytes().all(|b| b.is_ascii_digit()) {
            return Err("Invalid character reference");
        }
        entity.parse::<u32>().map_err(|_| "Invalid character reference")?
    };

    char::from_u32(codepoint)
        .filter(|&c| is_xml_char(c))
        .ok_or("Character reference to invalid XML character")
}

/// XML 1.0 `Char` production
#[inline]
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Check that raw markup contains only valid XML characters
pub fn validate_chars(input: &str) -> Result<(), &'static str> {
    if input.chars().all(is_xml_char) {
        Ok(())
    } else {
        Err("Invalid XML character in content")
    }
}

/// Escape a value for use inside a double-quoted attribute
pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    let bytes = value.as_bytes();
    if memchr3(b'&', b'<', b'"', bytes).is_none() && !bytes.iter().any(|&b| matches!(b, b'\t' | b'\n' | b'\r')) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            // Literal whitespace would be normalized away by the next parser
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_entities_borrows() {
        let decoded = decode_text("plain text").unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
    }

    #[test]
    fn test_predefined_entities() {
        assert_eq!(decode_text("&lt;a&gt; &amp; &quot;b&quot; &apos;c&apos;").unwrap(), "<a> & \"b\" 'c'");
    }

    #[test]
    fn test_numeric_references() {
        assert_eq!(decode_text("&#65;&#x42;&#x1F600;").unwrap(), "AB\u{1F600}");
    }

    #[test]
    fn test_rejects_unknown_entity() {
        assert!(decode_text("&nbsp;").is_err());
        assert!(decode_text("a & b").is_err());
        assert!(decode_text("&#0;").is_err());
        assert!(decode_text("&#xZZ;").is_err());
    }

    #[test]
    fn test_escape_attribute() {
        assert_eq!(escape_attribute("sip:joe@example.com"), "sip:joe@example.com");
        assert_eq!(escape_attribute("a\"<&b"), "a&quot;&lt;&amp;b");
        assert_eq!(escape_attribute("line\nbreak"), "line&#xA;break");
    }
}
