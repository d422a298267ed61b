//! Strict XML parser for the store's on-disk documents

use thiserror::Error;

use super::node::Element;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("line {line}: unexpected end of document")]
    UnexpectedEof { line: usize },

    #[error("line {line}: expected {expected}, found {found:?}")]
    Unexpected {
        line: usize,
        expected: &'static str,
        found: char,
    },

    #[error("line {line}: mismatched closing tag </{found}>, expected </{expected}>")]
    MismatchedTag {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("line {line}: invalid entity reference")]
    InvalidEntity { line: usize },

    #[error("document has no root element")]
    NoRoot,

    #[error("line {line}: content after root element")]
    TrailingContent { line: usize },
}

/// Parse a complete XML document into its root element.
///
/// Accepts an optional BOM, an optional `<?xml ...?>` declaration, and
/// comments outside the root. Anything else before or after the single
/// root element is an error.
pub fn parse_document(input: &str) -> Result<Element, ParseError> {
    let mut p = Parser::new(input);
    p.skip_prolog()?;
    let root = match p.peek() {
        Some('<') => p.parse_element()?,
        Some(c) => {
            return Err(ParseError::Unexpected {
                line: p.line,
                expected: "root element",
                found: c,
            })
        }
        None => return Err(ParseError::NoRoot),
    };
    p.skip_misc()?;
    if p.peek().is_some() {
        return Err(ParseError::TrailingContent { line: p.line });
    }
    Ok(root)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn expect(&mut self, want: char) -> Result<(), ParseError> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(ParseError::Unexpected {
                line: self.line,
                expected: "punctuation",
                found: c,
            }),
            None => Err(ParseError::UnexpectedEof { line: self.line }),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_ahead(i) == Some(c))
    }

    fn skip_str(&mut self, s: &str) {
        for _ in s.chars() {
            self.bump();
        }
    }

    /// Skip the XML declaration plus any comments/whitespace before the root
    fn skip_prolog(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.starts_with("<?") {
            while !self.starts_with("?>") {
                if self.bump().is_none() {
                    return Err(ParseError::UnexpectedEof { line: self.line });
                }
            }
            self.skip_str("?>");
        }
        self.skip_misc()
    }

    /// Skip whitespace and comments
    fn skip_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<!--") {
                self.skip_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_comment(&mut self) -> Result<(), ParseError> {
        self.skip_str("<!--");
        while !self.starts_with("-->") {
            if self.bump().is_none() {
                return Err(ParseError::UnexpectedEof { line: self.line });
            }
        }
        self.skip_str("-->");
        Ok(())
    }

    fn parse_name(&mut self) -> Result<String, ParseError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':') {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(ParseError::Unexpected {
                line: self.line,
                expected: "name",
                found: self.peek().unwrap_or('\0'),
            });
        }
        Ok(name)
    }

    fn parse_element(&mut self) -> Result<Element, ParseError> {
        self.expect('<')?;
        let name = self.parse_name()?;
        let mut element = Element::new(&name);

        // Attributes
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('/') => {
                    self.bump();
                    self.expect('>')?;
                    return Ok(element);
                }
                Some('>') => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    let attr_name = self.parse_name()?;
                    self.skip_whitespace();
                    self.expect('=')?;
                    self.skip_whitespace();
                    let value = self.parse_quoted()?;
                    element.attributes.push((attr_name, value));
                }
                None => return Err(ParseError::UnexpectedEof { line: self.line }),
            }
        }

        // Content: text, comments, and child elements until </name>
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('<') => {
                    if self.starts_with("<!--") {
                        self.skip_comment()?;
                    } else if self.peek_ahead(1) == Some('/') {
                        self.skip_str("</");
                        let closing = self.parse_name()?;
                        self.skip_whitespace();
                        self.expect('>')?;
                        if closing != name {
                            return Err(ParseError::MismatchedTag {
                                line: self.line,
                                expected: name,
                                found: closing,
                            });
                        }
                        break;
                    } else {
                        element.children.push(self.parse_element()?);
                    }
                }
                Some(_) => text.push(self.parse_char_data()?),
                None => return Err(ParseError::UnexpectedEof { line: self.line }),
            }
        }

        // Whitespace-only text between child elements is formatting, not data
        if element.children.is_empty() {
            element.text = text;
        } else if !text.trim().is_empty() {
            element.text = text.trim().to_string();
        }

        Ok(element)
    }

    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let quote = match self.bump() {
            Some(c @ ('"' | '\'')) => c,
            Some(c) => {
                return Err(ParseError::Unexpected {
                    line: self.line,
                    expected: "quote",
                    found: c,
                })
            }
            None => return Err(ParseError::UnexpectedEof { line: self.line }),
        };
        let mut value = String::new();
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some(_) => value.push(self.parse_char_data()?),
                None => return Err(ParseError::UnexpectedEof { line: self.line }),
            }
        }
    }

    /// One character of text content, decoding entity references
    fn parse_char_data(&mut self) -> Result<char, ParseError> {
        match self.bump() {
            Some('&') => self.parse_entity(),
            Some(c) => Ok(c),
            None => Err(ParseError::UnexpectedEof { line: self.line }),
        }
    }

    fn parse_entity(&mut self) -> Result<char, ParseError> {
        let mut body = String::new();
        loop {
            match self.bump() {
                Some(';') => break,
                Some(c) if body.len() < 8 => body.push(c),
                _ => return Err(ParseError::InvalidEntity { line: self.line }),
            }
        }
        match body.as_str() {
            "amp" => Ok('&'),
            "lt" => Ok('<'),
            "gt" => Ok('>'),
            "quot" => Ok('"'),
            "apos" => Ok('\''),
            _ => {
                let code = if let Some(hex) = body.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = body.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or(ParseError::InvalidEntity { line: self.line })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_document() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<audit-database version="1.0">
  <records>
    <record id="AUD1" created_at="2024-01-01 10:00:00">
      <field name="gender">female</field>
    </record>
  </records>
</audit-database>"#;

        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "audit-database");
        assert_eq!(root.attr("version"), Some("1.0"));

        let records = root.find_child("records").unwrap();
        let record = records.find_child("record").unwrap();
        assert_eq!(record.attr("id"), Some("AUD1"));
        assert_eq!(record.find_child("field").unwrap().text, "female");
    }

    #[test]
    fn test_parse_entities() {
        let root = parse_document("<f>a &amp; b &lt;tag&gt; &#65;</f>").unwrap();
        assert_eq!(root.text, "a & b <tag> A");
    }

    #[test]
    fn test_parse_self_closing_and_comments() {
        let root = parse_document("<!-- header --><r><a x='1'/><!-- mid --><b/></r>").unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].attr("x"), Some("1"));
    }

    #[test]
    fn test_mismatched_tag_is_error() {
        assert!(matches!(
            parse_document("<a><b></a></b>"),
            Err(ParseError::MismatchedTag { .. })
        ));
    }

    #[test]
    fn test_trailing_content_is_error() {
        assert!(parse_document("<a/><b/>").is_err());
    }

    #[test]
    fn test_invalid_entity_is_error() {
        assert!(matches!(
            parse_document("<a>&bogus;</a>"),
            Err(ParseError::InvalidEntity { .. })
        ));
    }
}
