//! Raw mode: strict XML parsing with quick-xml
//!
//! No recovery is attempted. Anything that is not a single well-formed
//! document element fails the whole parse.

use encoding_rs::Encoding;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sxd_document::dom::{Document, Element};
use tracing::warn;

use crate::error::{Result, ScrapeError};

/// The encoding named by a leading `<?xml ... encoding="..."?>`, if known
pub fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let mut reader = Reader::from_reader(bytes);
    let Ok(Event::Decl(decl)) = reader.read_event() else {
        return None;
    };
    let label = decl.encoding()?.ok()?;
    let encoding = Encoding::for_label(&label);
    if encoding.is_none() {
        warn!(label = %String::from_utf8_lossy(&label), "unknown encoding in XML declaration");
    }
    encoding
}

/// Parse `xml` and build it under the root of `document`
pub fn build(document: &Document<'_>, xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut open: Vec<Element<'_>> = vec![];
    let mut has_root = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_error(format!("{} at byte {}", e, reader.buffer_position())))?;

        match event {
            Event::Start(start) => {
                let element = create_element(document, &start)?;
                attach(document, &open, &mut has_root, element)?;
                open.push(element);
            }
            Event::Empty(start) => {
                let element = create_element(document, &start)?;
                attach(document, &open, &mut has_root, element)?;
            }
            Event::End(end) => {
                if open.pop().is_none() {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    return Err(parse_error(format!("unmatched end tag </{name}>")));
                }
            }
            Event::Text(text) => {
                let content = text.unescape().map_err(|e| parse_error(e.to_string()))?;
                append_text(document, &open, &content)?;
            }
            Event::CData(cdata) => {
                let content = String::from_utf8_lossy(&cdata).into_owned();
                append_text(document, &open, &content)?;
            }
            Event::Comment(comment) => {
                let content = String::from_utf8_lossy(&comment).into_owned();
                let node = document.create_comment(&content);
                match open.last() {
                    Some(parent) => parent.append_child(node),
                    None => document.root().append_child(node),
                }
            }
            Event::Eof => break,
            // declarations, doctypes and processing instructions
            _ => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = open.last() {
        return Err(parse_error(format!(
            "unclosed element <{}>",
            unclosed.name().local_part()
        )));
    }
    if !has_root {
        return Err(parse_error("no document element".to_string()));
    }

    Ok(())
}

fn create_element<'d>(document: &Document<'d>, start: &BytesStart<'_>) -> Result<Element<'d>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let element = document.create_element(name.as_str());

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| parse_error(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| parse_error(e.to_string()))?;
        element.set_attribute_value(key.as_str(), &value);
    }

    Ok(element)
}

fn attach<'d>(
    document: &Document<'d>,
    open: &[Element<'d>],
    has_root: &mut bool,
    element: Element<'d>,
) -> Result<()> {
    match open.last() {
        Some(parent) => parent.append_child(element),
        None if *has_root => {
            return Err(parse_error(format!(
                "extra content after the document element: <{}>",
                element.name().local_part()
            )))
        }
        None => {
            document.root().append_child(element);
            *has_root = true;
        }
    }
    Ok(())
}

fn append_text(document: &Document<'_>, open: &[Element<'_>], content: &str) -> Result<()> {
    match open.last() {
        Some(parent) => parent.append_child(document.create_text(content)),
        None if content.trim().is_empty() => {}
        None => {
            return Err(parse_error(format!(
                "text outside the document element: {:?}",
                content.trim()
            )))
        }
    }
    Ok(())
}

fn parse_error(message: String) -> ScrapeError {
    ScrapeError::Parse(message)
}

#[cfg(test)]
mod tests {
    use super::declared_encoding;
    use crate::document::{parse, ParseMode};
    use crate::error::ScrapeError;
    use crate::output::serialize;
    use pretty_assertions::assert_eq;

    fn select(xml: &str, xpath: &str) -> Result<Vec<String>, ScrapeError> {
        let document = parse(xml.as_bytes(), encoding_rs::UTF_8, ParseMode::Raw)?;
        let items = document.evaluate(xpath)?.map(|item| serialize(&item)).collect();
        Ok(items)
    }

    #[test]
    fn test_well_formed_document() {
        let xml = r#"<?xml version="1.0"?>
<!-- feed -->
<feed><entry id="1">A &amp; B</entry><entry id="2"><![CDATA[<raw>]]></entry><empty/></feed>"#;

        assert_eq!(
            select(xml, "//entry").unwrap(),
            vec![r#"<entry id="1">A &amp; B</entry>"#, r#"<entry id="2">&lt;raw&gt;</entry>"#]
        );
        assert_eq!(select(xml, "//empty").unwrap(), vec!["<empty/>"]);
    }

    #[test]
    fn test_context_is_the_document_element() {
        let xml = "<ul><li>A</li><li>B</li></ul>";
        assert_eq!(select(xml, "*").unwrap(), vec!["<li>A</li>", "<li>B</li>"]);
        assert_eq!(select(xml, "//li").unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_input_fails() {
        for xml in [
            "",
            "   ",
            "<ul><li>A</li>",
            "<ul><li>A</ul>",
            "<a></a><b></b>",
            "text<a/>",
            "<a x=1/>",
            "<a x='1' x='2'/>",
            "<p>&nbsp;</p>",
            "</a>",
        ] {
            let result = select(xml, "//*");
            assert!(
                matches!(result, Err(ScrapeError::Parse(_))),
                "{xml:?} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_declared_encoding() {
        assert_eq!(
            declared_encoding(br#"<?xml version="1.0" encoding="ISO-8859-1"?><a/>"#),
            Some(encoding_rs::WINDOWS_1252)
        );
        assert_eq!(
            declared_encoding(br#"<?xml version='1.0' encoding='Shift_JIS'?><a/>"#),
            Some(encoding_rs::SHIFT_JIS)
        );
        assert_eq!(declared_encoding(br#"<?xml version="1.0"?><a/>"#), None);
        assert_eq!(declared_encoding(br#"<?xml version="1.0" encoding="x-klingon"?><a/>"#), None);
        assert_eq!(declared_encoding(b"<a/>"), None);
    }
}
