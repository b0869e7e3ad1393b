//! Output formatting
//!
//! Matches are serialized as markup (or reduced to one attribute value),
//! encoded with the requested output encoding and written one per line,
//! flushing after each so results show up immediately in a pipeline.

use std::fmt::Write as _;
use std::io::{self, Write};

use encoding_rs::Encoding;
use quick_xml::escape::{escape, partial_escape};
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element, ProcessingInstruction};
use sxd_xpath::nodeset::Node;
use tracing::{debug, trace};

use crate::document::Match;

const BODY_OPEN: &str = "<!DOCTYPE html>\n<html>\n<body>\n";
const BODY_CLOSE: &str = "</body>\n</html>\n";

/// Serialize a match: elements with their whole subtree as markup,
/// attribute/text/namespace nodes and scalars as their string value
pub fn serialize(item: &Match<'_>) -> String {
    match item {
        Match::Scalar(value) => value.clone(),
        Match::Node(node) => {
            let mut out = String::new();
            write_node(&mut out, *node);
            out
        }
    }
}

fn write_node(out: &mut String, node: Node<'_>) {
    match node {
        Node::Root(root) => {
            for child in root.children() {
                match child {
                    ChildOfRoot::Element(element) => write_element(out, element),
                    ChildOfRoot::Comment(comment) => write_comment(out, comment.text()),
                    ChildOfRoot::ProcessingInstruction(pi) => write_processing_instruction(out, pi),
                }
            }
        }
        Node::Element(element) => write_element(out, element),
        Node::Comment(comment) => write_comment(out, comment.text()),
        Node::ProcessingInstruction(pi) => write_processing_instruction(out, pi),
        Node::Attribute(_) | Node::Text(_) | Node::Namespace(_) => {
            out.push_str(&node.string_value())
        }
    }
}

fn write_element(out: &mut String, element: Element<'_>) {
    let name = element.name().local_part();
    out.push('<');
    out.push_str(name);
    for attribute in element.attributes() {
        let _ = write!(
            out,
            " {}=\"{}\"",
            attribute.name().local_part(),
            escape(attribute.value())
        );
    }

    let children = element.children();
    if children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in children {
        match child {
            ChildOfElement::Element(child) => write_element(out, child),
            ChildOfElement::Text(text) => out.push_str(&partial_escape(text.text())),
            ChildOfElement::Comment(comment) => write_comment(out, comment.text()),
            ChildOfElement::ProcessingInstruction(pi) => write_processing_instruction(out, pi),
        }
    }
    let _ = write!(out, "</{name}>");
}

fn write_comment(out: &mut String, text: &str) {
    let _ = write!(out, "<!--{text}-->");
}

fn write_processing_instruction(out: &mut String, pi: ProcessingInstruction<'_>) {
    match pi.value() {
        Some(value) => {
            let _ = write!(out, "<?{} {}?>", pi.target(), value);
        }
        None => {
            let _ = write!(out, "<?{}?>", pi.target());
        }
    }
}

/// Writes matches to an output stream
pub struct Emitter<W: Write> {
    writer: W,
    encoding: &'static Encoding,
    attribute: Option<String>,
    body: bool,
    written: usize,
    dropped: usize,
}

impl<W: Write> Emitter<W> {
    pub fn new(
        writer: W,
        encoding: &'static Encoding,
        attribute: Option<String>,
        body: bool,
    ) -> Self {
        Self {
            writer,
            encoding,
            attribute,
            body,
            written: 0,
            dropped: 0,
        }
    }

    /// Opens the `<html><body>` skeleton when body wrapping is on
    pub fn begin(&mut self) -> io::Result<()> {
        if self.body {
            self.write_skeleton(BODY_OPEN)?;
        }
        Ok(())
    }

    /// Write one match followed by a newline.
    ///
    /// A match without the requested attribute produces nothing. A failed
    /// write (typically a reader that closed the pipe early) is dropped and
    /// does not stop the caller from emitting the next match.
    pub fn emit(&mut self, item: &Match<'_>) {
        let line = match &self.attribute {
            None => serialize(item),
            Some(name) => match item.attribute(name) {
                Some(value) => value.to_string(),
                None => {
                    trace!(attribute = %name, "match has no such attribute");
                    return;
                }
            },
        };

        match self.write_line(&line) {
            Ok(()) => self.written += 1,
            Err(err) => {
                self.dropped += 1;
                debug!(%err, "output write failed, continuing");
            }
        }
    }

    /// Closes the skeleton and hands back the writer
    pub fn finish(mut self) -> io::Result<W> {
        if self.body {
            self.write_skeleton(BODY_CLOSE)?;
        }
        debug!(written = self.written, dropped = self.dropped, "output finished");
        Ok(self.writer)
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write_encoded(line)?;
        self.write_encoded("\n")?;
        self.writer.flush()
    }

    /// A closed pipe is not an error for the skeleton either; anything else is
    fn write_skeleton(&mut self, text: &str) -> io::Result<()> {
        let result = self
            .write_encoded(text)
            .and_then(|()| self.writer.flush());
        match result {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("output closed before the body skeleton was written");
                Ok(())
            }
            other => other,
        }
    }

    fn write_encoded(&mut self, text: &str) -> io::Result<()> {
        let (bytes, _, unmappable) = self.encoding.encode(text);
        if unmappable {
            trace!(
                encoding = self.encoding.output_encoding().name(),
                "unmappable characters written as numeric character references"
            );
        }
        self.writer.write_all(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse, ParseMode};
    use pretty_assertions::assert_eq;

    /// Accepts a fixed number of writes, then fails like a closed pipe
    struct ClosingPipe {
        data: Vec<u8>,
        writes_left: usize,
    }

    impl Write for ClosingPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes_left == 0 {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.writes_left -= 1;
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn emit_all(
        html: &str,
        xpath: &str,
        attribute: Option<&str>,
        body: bool,
        encoding: &'static Encoding,
    ) -> Vec<u8> {
        let document = parse(html.as_bytes(), encoding_rs::UTF_8, ParseMode::Lenient).unwrap();
        let mut emitter = Emitter::new(Vec::new(), encoding, attribute.map(String::from), body);
        emitter.begin().unwrap();
        for item in document.evaluate(xpath).unwrap() {
            emitter.emit(&item);
        }
        emitter.finish().unwrap()
    }

    fn emit_utf8(html: &str, xpath: &str, attribute: Option<&str>, body: bool) -> String {
        String::from_utf8(emit_all(html, xpath, attribute, body, encoding_rs::UTF_8)).unwrap()
    }

    #[test]
    fn test_one_line_per_match() {
        assert_eq!(
            emit_utf8("<ul><li>A</li><li>B</li></ul>", "//li", None, false),
            "<li>A</li>\n<li>B</li>\n"
        );
    }

    #[test]
    fn test_attribute_extraction_skips_missing() {
        let html = r#"<a href="http://x.test">t</a><a>none</a><a href="/y">y</a>"#;
        assert_eq!(
            emit_utf8(html, "//a", Some("href"), false),
            "http://x.test\n/y\n"
        );
    }

    #[test]
    fn test_body_wrapping() {
        assert_eq!(
            emit_utf8("<p>x</p>", "//p", None, true),
            "<!DOCTYPE html>\n<html>\n<body>\n<p>x</p>\n</body>\n</html>\n"
        );
        assert_eq!(
            emit_utf8("<p>x</p>", "//li", None, true),
            "<!DOCTYPE html>\n<html>\n<body>\n</body>\n</html>\n"
        );
    }

    #[test]
    fn test_escaping_and_empty_elements() {
        assert_eq!(
            emit_utf8(r#"<p title="a&quot;b">1 &lt; 2<br></p>"#, "//p", None, false),
            "<p title=\"a&quot;b\">1 &lt; 2<br/></p>\n"
        );
    }

    #[test]
    fn test_non_element_matches() {
        let html = r#"<a href="/x">link</a><!--c-->"#;
        assert_eq!(emit_utf8(html, "//a/@href", None, false), "/x\n");
        assert_eq!(emit_utf8(html, "//a/text()", None, false), "link\n");
        assert_eq!(emit_utf8(html, "//comment()", None, false), "<!--c-->\n");
        assert_eq!(emit_utf8(html, "count(//a)", None, false), "1\n");
        assert_eq!(emit_utf8(html, "count(//a)", Some("href"), false), "");
    }

    #[test]
    fn test_output_encoding() {
        let bytes = emit_all("<p>café €</p>", "string(//p)", None, false, encoding_rs::WINDOWS_1252);
        assert_eq!(bytes, b"caf\xe9 \x80\n".to_vec());

        let bytes = emit_all("<p>ĉ</p>", "string(//p)", None, false, encoding_rs::WINDOWS_1252);
        assert_eq!(bytes, b"&#265;\n".to_vec());
    }

    #[test]
    fn test_failed_writes_are_dropped() {
        let document = parse(
            b"<ul><li>A</li><li>B</li><li>C</li></ul>",
            encoding_rs::UTF_8,
            ParseMode::Lenient,
        )
        .unwrap();
        // a pipe closed before anything was written does not fail the skeleton
        let pipe = ClosingPipe {
            data: vec![],
            writes_left: 0,
        };
        let mut emitter = Emitter::new(pipe, encoding_rs::UTF_8, None, true);
        emitter.begin().unwrap();
        assert!(emitter.finish().is_ok());

        // room for the first line (text + newline) only
        let pipe = ClosingPipe {
            data: vec![],
            writes_left: 2,
        };
        let mut emitter = Emitter::new(pipe, encoding_rs::UTF_8, None, false);
        emitter.begin().unwrap();
        for item in document.evaluate("//li").unwrap() {
            emitter.emit(&item);
        }
        assert_eq!(emitter.written(), 1);
        let pipe = emitter.finish().unwrap();
        assert_eq!(String::from_utf8(pipe.data).unwrap(), "<li>A</li>\n");
    }
}
