//! Command line arguments and their resolution into an [`Invocation`]

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, ValueEnum};
use encoding_rs::Encoding;
use tracing::debug;

use crate::document::ParseMode;
use crate::error::{Result, ScrapeError};
use crate::selector::css_to_xpath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum QueryType {
    #[default]
    Xpath,
    Css,
}

/// Extract HTML elements using an XPath query or CSS3 selector.
///
/// Example:
///   curl -s https://example.org | scrape-html -b css 'table.wikitable > tr > td > b > a'
#[derive(Parser, Debug)]
#[command(name = "scrape-html", version, verbatim_doc_comment)]
pub struct Cli {
    /// A query type
    #[arg(value_enum, default_value_t = QueryType::Xpath, value_name = "QUERY-TYPE")]
    pub query_type: QueryType,

    /// The query itself
    #[arg(default_value = "*", value_name = "QUERY")]
    pub query: String,

    /// A file containing HTML to query (default or '-': standard input)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// The argument to extract from tag
    #[arg(short = 'a', value_name = "ARGUMENT")]
    pub argument: Option<String>,

    /// Encoding with which to read the file [default: utf-8, or the XML
    /// declaration's with -r]
    #[arg(short = 'f', value_name = "CODE", value_parser = parse_encoding)]
    pub input_encoding: Option<&'static Encoding>,

    /// Encoding with which to write to stdout
    #[arg(short = 't', value_name = "CODE", default_value = "utf-8", value_parser = parse_encoding)]
    pub output_encoding: &'static Encoding,

    /// Enclose output with HTML and BODY tags
    #[arg(short, long)]
    pub body: bool,

    /// Do not parse HTML before feeding the XPath engine (strict XML)
    #[arg(short, long)]
    pub raw: bool,

    /// Log diagnostics to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

fn parse_encoding(label: &str) -> std::result::Result<&'static Encoding, String> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| format!("unknown encoding '{label}'"))
}

/// Where the document is read from
#[derive(Debug)]
pub enum Input {
    Stdin,
    File(PathBuf, File),
}

impl Input {
    /// Opens the input without reading it
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Input::Stdin),
            Some(path) if path.as_os_str() == "-" => Ok(Input::Stdin),
            Some(path) => match File::open(path).and_then(reject_directory) {
                Ok(file) => Ok(Input::File(path.to_path_buf(), file)),
                Err(err) => Err(ScrapeError::Usage(format!(
                    "can't open '{}': {}",
                    path.display(),
                    err
                ))),
            },
        }
    }

    /// Reads the whole input
    pub fn read_all(self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        match self {
            Input::Stdin => {
                io::stdin().lock().read_to_end(&mut bytes)?;
            }
            Input::File(path, mut file) => {
                debug!(path = %path.display(), "reading input file");
                file.read_to_end(&mut bytes)?;
            }
        }
        Ok(bytes)
    }
}

/// Opening a directory succeeds on some platforms; reading it never does
fn reject_directory(file: File) -> io::Result<File> {
    if file.metadata()?.is_dir() {
        return Err(io::Error::other("is a directory"));
    }
    Ok(file)
}

/// Everything one run needs, fixed once the command line is resolved
#[derive(Debug)]
pub struct Invocation {
    /// The query as XPath, translated already when given as CSS
    pub xpath: String,
    pub input: Input,
    /// Attribute to print instead of the serialized match
    pub attribute: Option<String>,
    /// `None` unless given with `-f`
    pub input_encoding: Option<&'static Encoding>,
    pub output_encoding: &'static Encoding,
    pub body: bool,
    pub mode: ParseMode,
}

impl Invocation {
    /// Open the input and translate the query.
    ///
    /// Fails with a usage error for an unopenable file and with a selector
    /// error for an invalid CSS selector.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let input = Input::open(cli.file.as_deref())?;

        let xpath = match cli.query_type {
            QueryType::Xpath => cli.query,
            QueryType::Css => css_to_xpath(&cli.query)?,
        };

        Ok(Invocation {
            xpath,
            input,
            attribute: cli.argument.filter(|name| !name.is_empty()),
            input_encoding: cli.input_encoding,
            output_encoding: cli.output_encoding,
            body: cli.body,
            mode: if cli.raw {
                ParseMode::Raw
            } else {
                ParseMode::Lenient
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("scrape-html").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = cli(&[]);
        assert_eq!(cli.query_type, QueryType::Xpath);
        assert_eq!(cli.query, "*");
        assert_eq!(cli.file, None);
        assert_eq!(cli.argument, None);
        assert_eq!(cli.input_encoding, None);
        assert_eq!(cli.output_encoding, encoding_rs::UTF_8);
        assert!(!cli.body && !cli.raw);

        let invocation = Invocation::resolve(cli).unwrap();
        assert_eq!(invocation.xpath, "*");
        assert!(matches!(invocation.input, Input::Stdin));
        assert_eq!(invocation.mode, ParseMode::Lenient);
    }

    #[test]
    fn test_all_options() {
        let cli = cli(&[
            "css", "a.x", "-", "-a", "href", "-f", "latin1", "-t", "UTF-8", "--body", "-r", "-vv",
        ]);
        assert_eq!(cli.input_encoding, Some(encoding_rs::WINDOWS_1252));
        assert_eq!(cli.verbose, 2);

        let invocation = Invocation::resolve(cli).unwrap();
        assert!(invocation.xpath.starts_with("descendant-or-self::a["));
        assert_eq!(invocation.attribute.as_deref(), Some("href"));
        assert!(invocation.body);
        assert_eq!(invocation.mode, ParseMode::Raw);
    }

    #[test]
    fn test_empty_attribute_means_none() {
        let invocation = Invocation::resolve(cli(&["-a", ""])).unwrap();
        assert_eq!(invocation.attribute, None);
    }

    #[test]
    fn test_rejected_arguments() {
        for args in [
            vec!["json"],
            vec!["//li"],
            vec!["-x"],
            vec!["-f", "no-such-charset"],
            vec!["xpath", "*", "a.html", "extra"],
        ] {
            let argv = std::iter::once("scrape-html").chain(args.iter().copied());
            assert!(Cli::try_parse_from(argv).is_err(), "{args:?} was accepted");
        }
    }

    #[test]
    fn test_resolution_errors() {
        let err = Invocation::resolve(cli(&["css", ":::bad:::"])).unwrap_err();
        assert!(matches!(err, ScrapeError::Selector(_)));
        assert!(err.is_usage());

        let err = Invocation::resolve(cli(&["xpath", "*", "/no/such/file.html"])).unwrap_err();
        assert!(matches!(err, ScrapeError::Usage(_)));
        assert!(err.to_string().contains("can't open"));
    }

    #[test]
    fn test_directory_is_not_an_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = Input::open(Some(dir.path())).unwrap_err();
        assert!(matches!(err, ScrapeError::Usage(_)));
        assert!(err.to_string().contains("is a directory"));
    }

    #[test]
    fn test_file_input_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<p>hi</p>").unwrap();
        let path = file.path().to_str().unwrap();

        let invocation = Invocation::resolve(cli(&["xpath", "//p", path])).unwrap();
        assert_eq!(invocation.input.read_all().unwrap(), b"<p>hi</p>".to_vec());
    }
}
