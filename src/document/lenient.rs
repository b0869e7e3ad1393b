//! Lenient HTML parsing
//!
//! The page is parsed with scraper (html5ever), which recovers from any
//! malformed markup, and the resulting tree is copied into an XPath-queryable
//! document.

use scraper::{Html, Node};
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Document, Element, Root, Text};
use tracing::debug;

/// Where a copied node is attached
#[derive(Clone, Copy)]
enum Parent<'d> {
    Root(Root<'d>),
    Element(Element<'d>),
}

impl<'d> Parent<'d> {
    fn append<C>(self, child: C)
    where
        C: Into<ChildOfRoot<'d>> + Into<ChildOfElement<'d>>,
    {
        match self {
            Parent::Root(root) => root.append_child(child),
            Parent::Element(element) => element.append_child(child),
        }
    }

    /// Text directly under the document node has no place in the tree
    fn append_text(self, text: Text<'d>) {
        if let Parent::Element(element) = self {
            element.append_child(text);
        }
    }
}

/// Parse `html` and copy it under the root of `document`. Never fails.
pub fn build(document: &Document<'_>, html: &str) {
    let html = Html::parse_document(html);
    if !html.errors.is_empty() {
        debug!(count = html.errors.len(), "recovered from markup errors");
    }

    // Children of one node are appended together, in order, before any of
    // them is descended into; the explicit stack keeps deep nesting off the
    // call stack.
    let mut pending = vec![(html.tree.root(), Parent::Root(document.root()))];
    while let Some((source, parent)) = pending.pop() {
        for child in source.children() {
            match child.value() {
                Node::Element(element) => {
                    let target = document.create_element(element.name());
                    for (name, value) in element.attrs() {
                        target.set_attribute_value(name, value);
                    }
                    parent.append(target);
                    pending.push((child, Parent::Element(target)));
                }
                Node::Text(text) => parent.append_text(document.create_text(text)),
                Node::Comment(comment) => match cdata_content(comment) {
                    Some(content) => parent.append_text(document.create_text(content)),
                    None => parent.append(document.create_comment(comment)),
                },
                _ => {}
            }
        }
    }
}

/// html5ever reads `<![CDATA[...]]>` outside foreign content as a bogus
/// comment; returns the section's content for such comments.
fn cdata_content(comment: &str) -> Option<&str> {
    comment.strip_prefix("[CDATA[")?.strip_suffix("]]")
}
