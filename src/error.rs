//! Error types for the extraction pipeline

use thiserror::Error;

use crate::selector::SelectorError;

/// Everything that can stop an invocation before or while it runs
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Bad command line, e.g. an input file that cannot be opened
    #[error("{0}")]
    Usage(String),

    #[error("invalid CSS selector: {0}")]
    Selector(#[from] SelectorError),

    /// Raw mode only; lenient parsing never fails on markup
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid XPath expression: {0}")]
    XPath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// Errors the command line front end reports along with usage text
    pub fn is_usage(&self) -> bool {
        matches!(self, ScrapeError::Usage(_) | ScrapeError::Selector(_))
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
