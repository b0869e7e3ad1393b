//! CSS3 selector to XPath translation
//!
//! Selectors are tokenized by cssparser, arranged into a small AST and
//! rendered as XPath 1.0 expressions evaluated from the document (or
//! document element) downwards, following the classic cssselect rules.
//! Features without an XPath equivalent (pseudo-elements, namespace
//! prefixes) are rejected rather than approximated; see [`SelectorError`].

mod parser;
mod xpath;

use thiserror::Error;
use tracing::debug;

/// Why a selector could not be translated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected end of selector")]
    UnexpectedEnd,
    #[error("unexpected {found:?} at column {column}")]
    UnexpectedToken { found: String, column: u32 },
    #[error("pseudo-elements are not supported: ::{0}")]
    PseudoElement(String),
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("invalid an+b expression {0:?}")]
    InvalidNth(String),
}

/// Translate a CSS3 selector group into an equivalent XPath expression
pub fn css_to_xpath(css: &str) -> Result<String, SelectorError> {
    let group = parser::parse(css)?;
    let xpath = xpath::translate(&group)?;
    debug!(css, %xpath, "translated selector");
    Ok(xpath)
}
