//! Pretty-printing XML serializer

use super::node::Element;

/// Serialize a document: UTF-8 declaration plus the root element,
/// indented with two spaces, trailing newline.
pub fn write_document(root: &Element) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(root, 0, &mut out);
    out
}

fn write_element(el: &Element, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push('<');
    out.push_str(&el.name);
    for (name, value) in &el.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_text(value));
        out.push('"');
    }

    if el.children.is_empty() && el.text.is_empty() {
        out.push_str("/>\n");
        return;
    }

    out.push('>');
    if el.children.is_empty() {
        out.push_str(&escape_text(&el.text));
    } else {
        out.push('\n');
        for child in &el.children {
            write_element(child, depth + 1, out);
        }
        out.push_str(&indent);
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push_str(">\n");
}

/// Escape text for element content or attribute values.
///
/// Markup-significant characters become entity references. Control
/// characters other than tab/newline/CR cannot be represented in XML 1.0
/// at all and are dropped.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::xml::parse_document;

    #[test]
    fn test_write_and_reparse() {
        let mut root = Element::new("audit-database");
        root.set_attr("version", "1.0");
        let mut records = Element::new("records");
        let mut record = Element::new("record");
        record.set_attr("id", "AUD1");
        let mut field = Element::new("field");
        field.set_attr("name", "note");
        field.text = "a < b & \"c\"".to_string();
        record.children.push(field);
        records.children.push(record);
        root.children.push(records);

        let doc = write_document(&root);
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));

        let reparsed = parse_document(&doc).unwrap();
        let note = reparsed.descendants_named("field")[0];
        assert_eq!(note.text, "a < b & \"c\"");
    }

    #[test]
    fn test_escape_drops_raw_control_chars() {
        assert_eq!(escape_text("a\u{0}b"), "ab");
        assert_eq!(escape_text("a\nb"), "a&#10;b");
    }

    #[test]
    fn test_empty_element_self_closes() {
        let el = Element::new("records");
        assert_eq!(write_document(&el), "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<records/>\n");
    }
}
