//! scrape-html: extract HTML elements using an XPath query or CSS3 selector
//!
//! One linear pipeline per invocation:
//! - resolve the command line (`cli`)
//! - translate a CSS selector to XPath when needed (`selector`)
//! - parse the document, leniently or as strict XML (`document`)
//! - evaluate the query and write each match (`output`)

pub mod cli;
pub mod document;
pub mod error;
pub mod logger;
pub mod output;
pub mod selector;

use std::io::Write;

use tracing::debug;

pub use cli::{Cli, Invocation, QueryType};
pub use document::{parse, Match, ParseMode, ParsedDocument};
pub use error::{Result, ScrapeError};
pub use output::{serialize, Emitter};
pub use selector::{css_to_xpath, SelectorError};

/// Run a resolved invocation, writing results to `output`.
///
/// Returns the number of lines written for matches.
pub fn run<W: Write>(invocation: Invocation, output: W) -> Result<usize> {
    let Invocation {
        xpath,
        input,
        attribute,
        input_encoding,
        output_encoding,
        body,
        mode,
    } = invocation;

    let bytes = input.read_all()?;
    let encoding = input_encoding.unwrap_or_else(|| document::default_encoding(&bytes, mode));
    let document = parse(&bytes, encoding, mode)?;
    let matches = document.evaluate(&xpath)?;
    debug!(%xpath, "query evaluated");

    let mut emitter = Emitter::new(output, output_encoding, attribute, body);
    emitter.begin()?;
    for item in matches {
        emitter.emit(&item);
    }
    let written = emitter.written();
    emitter.finish()?;

    Ok(written)
}
