//! Parsed documents and XPath evaluation
//!
//! Input bytes are decoded, parsed in one of two modes and stored as an
//! sxd-document tree, which the sxd-xpath engine evaluates expressions
//! against:
//! - lenient: HTML with full error recovery (scraper / html5ever)
//! - raw: strict XML, where malformed input is an error (quick-xml)

mod lenient;
mod strict;

use encoding_rs::Encoding;
use sxd_document::dom::{ChildOfRoot, Document};
use sxd_document::Package;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};
use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Tolerant HTML parsing; never fails
    #[default]
    Lenient,
    /// Strict XML parsing without HTML-specific recovery
    Raw,
}

/// A document owned for the duration of one invocation
pub struct ParsedDocument {
    package: Package,
    mode: ParseMode,
}

/// The encoding for input read without `-f`: the one named by an XML
/// declaration in raw mode, UTF-8 otherwise.
pub fn default_encoding(bytes: &[u8], mode: ParseMode) -> &'static Encoding {
    let declared = match mode {
        ParseMode::Raw => strict::declared_encoding(bytes),
        ParseMode::Lenient => None,
    };
    declared.unwrap_or(encoding_rs::UTF_8)
}

/// Decode `bytes` and build a queryable tree from them.
///
/// `encoding` is the declared input encoding; a byte order mark in the input
/// takes precedence over it. Only [`ParseMode::Raw`] can fail.
pub fn parse(bytes: &[u8], encoding: &'static Encoding, mode: ParseMode) -> Result<ParsedDocument> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if used != encoding {
        debug!(declared = encoding.name(), used = used.name(), "byte order mark overrides input encoding");
    }
    if had_errors {
        warn!(encoding = used.name(), "input has malformed sequences, replaced with U+FFFD");
    }
    debug!(bytes = bytes.len(), ?mode, "parsing document");

    let package = Package::new();
    {
        let document = package.as_document();
        match mode {
            ParseMode::Lenient => lenient::build(&document, &text),
            ParseMode::Raw => strict::build(&document, &text)?,
        }
    }

    Ok(ParsedDocument { package, mode })
}

impl ParsedDocument {
    /// Evaluate an XPath 1.0 expression.
    ///
    /// Lenient documents are queried from the document node, raw documents
    /// from their document element.
    pub fn evaluate(&self, xpath: &str) -> Result<Matches<'_>> {
        let factory = Factory::new();
        let compiled = factory
            .build(xpath)
            .map_err(|e| ScrapeError::XPath(format!("{xpath}: {e}")))?
            .ok_or_else(|| ScrapeError::XPath("empty expression".to_string()))?;

        let document = self.package.as_document();
        let context = Context::new();
        let value = compiled
            .evaluate(&context, self.context_node(&document))
            .map_err(|e| ScrapeError::XPath(format!("{xpath}: {e}")))?;

        Ok(Matches::from(value))
    }

    fn context_node<'d>(&self, document: &Document<'d>) -> Node<'d> {
        let root = document.root();
        if self.mode == ParseMode::Raw {
            for child in root.children() {
                if let ChildOfRoot::Element(element) = child {
                    return element.into();
                }
            }
        }
        root.into()
    }
}

/// One result of an evaluated expression
#[derive(Debug, Clone, PartialEq)]
pub enum Match<'d> {
    Node(Node<'d>),
    /// The string value of a number, string or boolean result
    Scalar(String),
}

impl<'d> Match<'d> {
    /// Value of the named attribute; only elements carry attributes
    pub fn attribute(&self, name: &str) -> Option<&'d str> {
        match self {
            Match::Node(Node::Element(element)) => element.attribute_value(name),
            _ => None,
        }
    }
}

/// Single-pass sequence of matches, in document order for node-sets
pub struct Matches<'d> {
    nodes: std::vec::IntoIter<Node<'d>>,
    scalar: Option<String>,
}

impl<'d> From<Value<'d>> for Matches<'d> {
    fn from(value: Value<'d>) -> Self {
        match value {
            Value::Nodeset(nodes) => Matches {
                nodes: nodes.document_order().into_iter(),
                scalar: None,
            },
            other => Matches {
                nodes: Vec::new().into_iter(),
                scalar: Some(other.string()),
            },
        }
    }
}

impl<'d> Iterator for Matches<'d> {
    type Item = Match<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(scalar) = self.scalar.take() {
            return Some(Match::Scalar(scalar));
        }
        self.nodes.next().map(Match::Node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIST: &str = r#"<ul><li class="a">A</li><li>B</li><li class="a">C</li></ul>"#;

    #[test]
    fn test_node_matches_in_document_order() {
        let document = parse(LIST.as_bytes(), encoding_rs::UTF_8, ParseMode::Lenient).unwrap();
        let matches: Vec<_> = document.evaluate("//li[@class] | //ul").unwrap().collect();
        assert_eq!(matches.len(), 3);
        assert!(matches!(matches[0], Match::Node(Node::Element(e)) if e.name().local_part() == "ul"));
        assert_eq!(matches[1].attribute("class"), Some("a"));
        assert_eq!(matches[2].attribute("id"), None);
    }

    #[test]
    fn test_scalar_results() {
        let document = parse(LIST.as_bytes(), encoding_rs::UTF_8, ParseMode::Lenient).unwrap();
        let count: Vec<_> = document.evaluate("count(//li)").unwrap().collect();
        assert_eq!(count, vec![Match::Scalar("3".to_string())]);
        let text: Vec<_> = document.evaluate("string(//li[2])").unwrap().collect();
        assert_eq!(text, vec![Match::Scalar("B".to_string())]);
        assert_eq!(text[0].attribute("class"), None);
    }

    #[test]
    fn test_empty_input_yields_no_matches() {
        let document = parse(b"", encoding_rs::UTF_8, ParseMode::Lenient).unwrap();
        assert_eq!(document.evaluate("//li").unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_xpath() {
        let document = parse(LIST.as_bytes(), encoding_rs::UTF_8, ParseMode::Lenient).unwrap();
        assert!(matches!(document.evaluate("//li["), Err(ScrapeError::XPath(_))));
        assert!(matches!(document.evaluate("nosuchfn()"), Err(ScrapeError::XPath(_))));
    }

    #[test]
    fn test_input_encoding() {
        let latin1 = b"<p>caf\xe9</p>";
        let label = Encoding::for_label(b"latin1").unwrap();
        let document = parse(latin1, label, ParseMode::Lenient).unwrap();
        let text: Vec<_> = document.evaluate("string(//p)").unwrap().collect();
        assert_eq!(text, vec![Match::Scalar("café".to_string())]);

        // malformed UTF-8 is replaced, not fatal
        let document = parse(latin1, encoding_rs::UTF_8, ParseMode::Lenient).unwrap();
        let text: Vec<_> = document.evaluate("string(//p)").unwrap().collect();
        assert_eq!(text, vec![Match::Scalar("caf\u{FFFD}".to_string())]);
    }

    #[test]
    fn test_default_encoding_follows_xml_declaration() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><p>caf\xe9</p>";
        assert_eq!(default_encoding(xml, ParseMode::Raw), encoding_rs::WINDOWS_1252);
        assert_eq!(default_encoding(xml, ParseMode::Lenient), encoding_rs::UTF_8);
        assert_eq!(default_encoding(b"<p/>", ParseMode::Raw), encoding_rs::UTF_8);

        let document = parse(xml, default_encoding(xml, ParseMode::Raw), ParseMode::Raw).unwrap();
        let text: Vec<_> = document.evaluate("string(.)").unwrap().collect();
        assert_eq!(text, vec![Match::Scalar("café".to_string())]);
    }

    #[test]
    fn test_raw_mode_rejects_html() {
        let truncated = b"<ul><li>A</li><li>B";
        assert!(parse(truncated, encoding_rs::UTF_8, ParseMode::Lenient).is_ok());
        assert!(matches!(
            parse(truncated, encoding_rs::UTF_8, ParseMode::Raw),
            Err(ScrapeError::Parse(_))
        ));
    }
}
